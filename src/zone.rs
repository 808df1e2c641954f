//! Zones, tag UIDs, and per-zone presence state.
//!
//! Mirrors the reference daemon's `device::Color`/`device::Dpi` data
//! model (plain structs, `Copy` where the hardware value is small and
//! fixed-size) but sized to this device's three physical zones instead
//! of an arbitrary profile/button/LED tree.

use std::fmt;

/// One of the toy pad's three physical sensing zones, or a broadcast
/// target for lighting operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    /// Valid only for lighting operations (center + left + right).
    All,
    Center,
    Left,
    Right,
}

impl Zone {
    /// Wire encoding used in command frames and tag event frames.
    pub fn wire_byte(self) -> u8 {
        match self {
            Zone::All => 0,
            Zone::Center => 1,
            Zone::Left => 2,
            Zone::Right => 3,
        }
    }

    /// Decode a zone byte from a tag event frame (`1..=3` only — `All`
    /// never appears on the wire as an incoming value).
    pub fn from_tag_event_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Zone::Center),
            2 => Some(Zone::Left),
            3 => Some(Zone::Right),
            _ => None,
        }
    }

    /// The three physically sensing zones, in the fixed order the
    /// device expects for broadcast (fade-all / flash-all) blocks.
    pub const PHYSICAL: [Zone; 3] = [Zone::Center, Zone::Left, Zone::Right];
}

/// A 7-byte tag UID as reported by the device.
///
/// Open question (kept from the source spec): this may be a
/// device-derived identifier rather than the NFC chip's factory UID.
/// Treated as opaque and stable-per-tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uid(pub [u8; 7]);

impl Uid {
    /// Render as 14 uppercase hex characters, the logging convention.
    pub fn to_hex_upper(self) -> String {
        let mut s = String::with_capacity(14);
        for b in self.0 {
            s.push_str(&format!("{b:02X}"));
        }
        s
    }

    /// Render as 14 lowercase hex characters, the derivation-boundary
    /// convention.
    pub fn to_hex_lower(self) -> String {
        let mut s = String::with_capacity(14);
        for b in self.0 {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", self.to_hex_upper())
    }
}

/// Presence state for a single zone.
///
/// Invariant: `present` is true iff `uid` is `Some`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneState {
    pub present: bool,
    pub uid: Option<Uid>,
}

impl ZoneState {
    pub const EMPTY: ZoneState = ZoneState {
        present: false,
        uid: None,
    };

    fn occupied(uid: Uid) -> Self {
        ZoneState {
            present: true,
            uid: Some(uid),
        }
    }
}

/// Snapshot of all three physical zones, published to observers on
/// every change and on attach/detach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneSnapshot {
    pub center: ZoneState,
    pub left: ZoneState,
    pub right: ZoneState,
}

impl ZoneSnapshot {
    pub fn get(&self, zone: Zone) -> Option<ZoneState> {
        match zone {
            Zone::Center => Some(self.center),
            Zone::Left => Some(self.left),
            Zone::Right => Some(self.right),
            Zone::All => None,
        }
    }

    fn set(&mut self, zone: Zone, state: ZoneState) {
        match zone {
            Zone::Center => self.center = state,
            Zone::Left => self.left = state,
            Zone::Right => self.right = state,
            Zone::All => {}
        }
    }

    pub(crate) fn insert(&mut self, zone: Zone, uid: Uid) {
        self.set(zone, ZoneState::occupied(uid));
    }

    pub(crate) fn clear(&mut self, zone: Zone) {
        self.set(zone, ZoneState::EMPTY);
    }
}

/// A canonical tag presence event, deduplicated by the tag tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagEvent {
    Added { zone: Zone, uid: Uid },
    Removed { zone: Zone },
}
