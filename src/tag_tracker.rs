//! Tag Tracker — per-zone latched UID state with insertion/removal
//! deduplication.
//!
//! The device re-announces a seated tag from time to time; this module
//! is the single place that turns "insert" notifications into a clean
//! `Added`/`Removed` stream and authoritative `ZoneSnapshot`.

use tokio::sync::broadcast;
use tracing::debug;

use crate::frame::RawTagEvent;
use crate::zone::{TagEvent, Uid, Zone, ZoneSnapshot};

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct TagTracker {
    snapshot: ZoneSnapshot,
    events_tx: broadcast::Sender<TagEvent>,
}

impl Default for TagTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TagTracker {
    pub fn new() -> Self {
        let (events_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            snapshot: ZoneSnapshot::default(),
            events_tx,
        }
    }

    /// Subscribe to the canonical tag event stream.
    pub fn events(&self) -> broadcast::Receiver<TagEvent> {
        self.events_tx.subscribe()
    }

    /// Current snapshot of all three physical zones.
    pub fn snapshot(&self) -> ZoneSnapshot {
        self.snapshot
    }

    /// Reset all zone state, e.g. on session attach/detach. Does not
    /// itself emit `Removed` events — a reset is a hard clear, not a
    /// sequence of individually observed removals.
    pub fn reset(&mut self) {
        self.snapshot = ZoneSnapshot::default();
    }

    /// Feed one raw tag event frame through the dedup state machine.
    /// Malformed zone/action bytes are logged and dropped.
    pub fn handle_raw_event(&mut self, raw: RawTagEvent) {
        let Some(zone) = Zone::from_tag_event_byte(raw.zone) else {
            debug!("tag event with unrecognised zone byte {:#04x}, dropping", raw.zone);
            return;
        };

        match raw.action {
            0 => self.handle_insert(zone, Uid(raw.uid)),
            1 => self.handle_remove(zone),
            other => debug!("tag event with unrecognised action byte {other:#04x}, dropping"),
        }
    }

    fn handle_insert(&mut self, zone: Zone, uid: Uid) {
        let current = self.snapshot.get(zone).and_then(|s| s.uid);
        if current == Some(uid) {
            debug!("duplicate insert for {zone:?}, dropping");
            return;
        }

        self.snapshot.insert(zone, uid);
        let _ = self.events_tx.send(TagEvent::Added { zone, uid });
    }

    fn handle_remove(&mut self, zone: Zone) {
        let current = self.snapshot.get(zone).and_then(|s| s.uid);
        if current.is_none() {
            debug!("remove for empty {zone:?}, dropping");
            return;
        }

        self.snapshot.clear(zone);
        let _ = self.events_tx.send(TagEvent::Removed { zone });
    }
}
