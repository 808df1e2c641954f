//! Host-side driver for a USB HID toy pad: three LED zones and NFC tag
//! presence sensing over a 32-byte report protocol.
//!
//! [`Engine`] is the public surface. It owns a [`session::SessionController`]
//! and exposes the toy pad's observables (`connected`, zone snapshot,
//! tag event stream) and operations (lighting, reads) as plain async
//! methods, the way the reference daemon's `Device` exposes its state
//! to `ratbagctl` over DBus — minus the DBus layer, which has no
//! counterpart here: callers talk to this crate directly.

pub mod auth;
pub mod config;
pub mod derive;
pub mod error;
pub mod frame;
pub mod lighting;
pub mod reader;
pub mod registry;
pub mod session;
pub mod tag_tracker;
pub mod transport;
pub mod zone;

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::instrument;

pub use auth::{AuthHook, AuthState, NoAuth};
pub use config::EngineConfig;
pub use derive::derive_key_a;
pub use error::{Result, ToyPadError};
pub use lighting::{FadeBlock, FlashBlock, TICK_COUNT_INDEFINITE};
pub use reader::PAGE_READ_LEN;
pub use session::SessionState;
pub use transport::{HidApiTransport, HidTransport};
pub use zone::{TagEvent, Uid, Zone, ZoneSnapshot, ZoneState};

use session::SessionController;

/// The toy pad engine: one running instance per physical device.
///
/// Construct with [`Engine::new`], call [`Engine::start`] to begin
/// attaching, and use the accessors to observe state or send commands.
/// Dropping the engine does not close the device cleanly — call
/// [`Engine::stop`] first.
pub struct Engine {
    session: Arc<SessionController>,
}

impl Engine {
    /// Build an engine against the given transport and config. Does
    /// not attach to hardware yet — call [`Engine::start`] for that.
    pub fn new(transport: Arc<dyn HidTransport>, config: EngineConfig) -> Self {
        Self {
            session: Arc::new(SessionController::with_timeout(
                transport,
                config.vid,
                config.pid,
                config.default_timeout,
            )),
        }
    }

    /// Convenience constructor using the real `hidapi`-backed transport
    /// and the default `(vid, pid)` for this device.
    pub fn with_hidapi() -> Self {
        Self::new(Arc::new(HidApiTransport::new()), EngineConfig::default())
    }

    /// Install a pluggable authentication strategy. Must be called
    /// before the first [`Engine::read_pages`] call to take effect for
    /// that session; replacing it mid-session only affects later reads.
    pub fn set_auth_strategy(&self, hook: Arc<dyn AuthHook>) {
        self.session.set_auth_hook(hook);
    }

    /// Begin attaching to the device. Returns once the attach attempt
    /// completes (`Ok(true)` attached, `Ok(false)` no matching device
    /// currently present) — it does not retry or block waiting for a
    /// device to appear. Callers that want "wait until plugged in"
    /// should poll this on their own cadence.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<bool> {
        self.session.attach().await
    }

    /// Tear down the session. Idempotent.
    pub async fn stop(&self) {
        self.session.detach().await;
    }

    /// Observable session lifecycle state.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.session.state()
    }

    /// `true` once the session has completed attach + init and has
    /// begun exchanging reports.
    pub fn connected(&self) -> bool {
        matches!(*self.session.state().borrow(), SessionState::Running | SessionState::Initialized)
    }

    /// Current snapshot of all three physical zones.
    pub fn zones(&self) -> ZoneSnapshot {
        self.session.zone_snapshot()
    }

    /// Subscribe to the deduplicated tag presence event stream.
    pub fn tag_events(&self) -> broadcast::Receiver<TagEvent> {
        self.session.tag_events()
    }

    /// Set a single zone (or `Zone::All`) to a solid color.
    pub async fn set_color(&self, zone: Zone, r: u8, g: u8, b: u8) -> Result<()> {
        let frame = lighting::solid_color(zone, r, g, b, 0x00);
        self.session.send_report(&frame).await
    }

    /// Turn all zones off.
    pub async fn lights_off(&self) -> Result<()> {
        let frame = lighting::lights_off(0x00);
        self.session.send_report(&frame).await
    }

    /// Fade a single zone.
    pub async fn fade(
        &self,
        zone: Zone,
        tick_time: u8,
        tick_count: u8,
        r: u8,
        g: u8,
        b: u8,
    ) -> Result<()> {
        let frame = lighting::fade(zone, tick_time, tick_count, r, g, b, 0x00);
        self.session.send_report(&frame).await
    }

    /// Fade all three zones, one block per physical zone.
    pub async fn fade_all(&self, blocks: [FadeBlock; 3]) -> Result<()> {
        let frame = lighting::fade_all(blocks, 0x00);
        self.session.send_report(&frame).await
    }

    /// Flash a single zone.
    pub async fn flash(
        &self,
        zone: Zone,
        tick_on: u8,
        tick_off: u8,
        tick_count: u8,
        r: u8,
        g: u8,
        b: u8,
    ) -> Result<()> {
        let frame = lighting::flash(zone, tick_on, tick_off, tick_count, r, g, b, 0x00);
        self.session.send_report(&frame).await
    }

    /// Flash all three zones, one block per physical zone.
    pub async fn flash_all(&self, blocks: [FlashBlock; 3]) -> Result<()> {
        let frame = lighting::flash_all(blocks, 0x00);
        self.session.send_report(&frame).await
    }

    /// Read 16 bytes starting at `start_page` from the tag seated in
    /// `zone`.
    pub async fn read_pages(&self, zone: Zone, start_page: u8) -> Result<[u8; PAGE_READ_LEN]> {
        self.session.read_pages(zone, start_page).await
    }
}
