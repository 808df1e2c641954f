//! Session Controller — attach/init/auth/running state machine tying
//! the transport, Frame Codec, Message Registry, Tag Tracker, and
//! Authentication Hook together.
//!
//! Shaped like the reference daemon's `Device` + `actor::ActorHandle`
//! pair: a small owned state machine plus a background task reading
//! off the wire and resolving outstanding commits, generalized here
//! from one fixed HID++ device to an attach/detach cycle against a
//! single target `(vid, pid)`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::{AuthHook, AuthState, NoAuth};
use crate::error::ToyPadError;
use crate::frame::{parse_input, ParsedFrame, REPORT_LEN};
use crate::reader::{build_read_request, decode_read_response, PAGE_READ_LEN};
use crate::registry::{MessageRegistry, RequestKind, DEFAULT_TIMEOUT};
use crate::tag_tracker::TagTracker;
use crate::transport::{HidDevice, HidTransport};
use crate::zone::{TagEvent, Zone, ZoneSnapshot};

/// `55 0F B0 01 28 63 29 20 4C 45 47 4F 20 32 30 31 34 F7` + zero
/// padding: the fixed init blob sent once per attach.
const INIT_BLOB: [u8; REPORT_LEN] = {
    let mut buf = [0u8; REPORT_LEN];
    let payload: [u8; 17] = [
        0x55, 0x0F, 0xB0, 0x01, 0x28, 0x63, 0x29, 0x20, 0x4C, 0x45, 0x47, 0x4F, 0x20, 0x32, 0x30,
        0x31, 0x34,
    ];
    let mut i = 0;
    while i < payload.len() {
        buf[i] = payload[i];
        i += 1;
    }
    buf[17] = 0xF7;
    buf
};

/// How often the registry is swept for expired requests independent of
/// inbound traffic (a quiet device must still time out its callers).
const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle state observable through [`SessionController::connected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Attached,
    Initialized,
    Running,
}

struct Inner {
    registry: MessageRegistry,
    tag_tracker: TagTracker,
    auth_state: AuthState,
}

impl Inner {
    fn new() -> Self {
        Self {
            registry: MessageRegistry::new(),
            tag_tracker: TagTracker::new(),
            auth_state: AuthState::Unknown,
        }
    }

    fn reset(&mut self) {
        self.registry.reset();
        self.tag_tracker.reset();
        self.auth_state = AuthState::Unknown;
    }
}

/// Owns the attach/detach lifecycle for a single `(vid, pid)` target.
pub struct SessionController {
    transport: Arc<dyn HidTransport>,
    vid: u16,
    pid: u16,
    default_timeout: Duration,
    auth_hook: Mutex<Arc<dyn AuthHook>>,
    inner: Arc<Mutex<Inner>>,
    device: Mutex<Option<Arc<dyn HidDevice>>>,
    state_tx: watch::Sender<SessionState>,
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SessionController {
    pub fn new(transport: Arc<dyn HidTransport>, vid: u16, pid: u16) -> Self {
        Self::with_timeout(transport, vid, pid, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(transport: Arc<dyn HidTransport>, vid: u16, pid: u16, default_timeout: Duration) -> Self {
        let (state_tx, _rx) = watch::channel(SessionState::Disconnected);
        Self {
            transport,
            vid,
            pid,
            default_timeout,
            auth_hook: Mutex::new(Arc::new(NoAuth)),
            inner: Arc::new(Mutex::new(Inner::new())),
            device: Mutex::new(None),
            state_tx,
            sweeper: Mutex::new(None),
        }
    }

    pub fn set_auth_hook(&self, hook: Arc<dyn AuthHook>) {
        *self.auth_hook.lock().expect("auth_hook mutex poisoned") = hook;
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn tag_events(&self) -> broadcast::Receiver<TagEvent> {
        self.inner.lock().expect("inner mutex poisoned").tag_tracker.events()
    }

    pub fn zone_snapshot(&self) -> ZoneSnapshot {
        self.inner.lock().expect("inner mutex poisoned").tag_tracker.snapshot()
    }

    /// Attempt to find and attach the device. Idempotent: attaching
    /// while already attached is a no-op. Returns `Ok(false)` if no
    /// matching device is present — not an error.
    pub async fn attach(&self) -> Result<bool, ToyPadError> {
        if self.device.lock().expect("device mutex poisoned").is_some() {
            return Ok(true);
        }

        let device = match self
            .transport
            .open(self.vid, self.pid)
            .await
            .map_err(|_| ToyPadError::NotConnected)?
        {
            Some(device) => device,
            None => return Ok(false),
        };

        self.inner.lock().expect("inner mutex poisoned").reset();
        self.state_tx.send_replace(SessionState::Attached);

        let inner = Arc::clone(&self.inner);
        let state_tx_for_input = self.state_tx.clone();
        device.register_input_report_callback(Box::new(move |bytes| {
            dispatch(&inner, &bytes);
            let _ = state_tx_for_input.send_if_modified(|s| {
                if *s == SessionState::Initialized {
                    *s = SessionState::Running;
                    true
                } else {
                    false
                }
            });
        }));

        let inner_for_removal = Arc::clone(&self.inner);
        let state_tx_for_removal = self.state_tx.clone();
        device.on_removal(Box::new(move || {
            warn!("toy pad removed");
            inner_for_removal
                .lock()
                .expect("inner mutex poisoned")
                .registry
                .drain_with(ToyPadError::NotConnected);
            let _ = state_tx_for_removal.send(SessionState::Disconnected);
        }));

        device
            .send_output_report(&INIT_BLOB)
            .await
            .map_err(|_| ToyPadError::NotConnected)?;
        self.state_tx.send_replace(SessionState::Initialized);

        *self.device.lock().expect("device mutex poisoned") = Some(device);
        self.spawn_sweeper();

        info!("toy pad attached");
        Ok(true)
    }

    /// Tear down the session: closes the device, drains all pending
    /// requests with `NotConnected`, and resets all state so a later
    /// `attach()` starts clean.
    pub async fn detach(&self) {
        if let Some(sweeper) = self.sweeper.lock().expect("sweeper mutex poisoned").take() {
            sweeper.abort();
        }
        if let Some(device) = self.device.lock().expect("device mutex poisoned").take() {
            device.close();
        }
        self.inner.lock().expect("inner mutex poisoned").reset();
        self.state_tx.send_replace(SessionState::Disconnected);
    }

    fn spawn_sweeper(&self) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                inner.lock().expect("inner mutex poisoned").registry.sweep(Instant::now());
            }
        });
        *self.sweeper.lock().expect("sweeper mutex poisoned") = Some(handle);
    }

    /// Send a fire-and-forget output report (lighting commands never
    /// register a registry waiter).
    pub async fn send_report(&self, report: &[u8; REPORT_LEN]) -> Result<(), ToyPadError> {
        let device = self
            .device
            .lock()
            .expect("device mutex poisoned")
            .clone()
            .ok_or(ToyPadError::NotConnected)?;
        device.send_output_report(report).await.map_err(|_| ToyPadError::NotConnected)
    }

    /// Read 16 bytes starting at `start_page` from the tag seated in
    /// `zone`. Runs the authentication hook once, the first time this
    /// is called in a session, but proceeds regardless of its outcome
    /// — the device's own status byte is authoritative.
    pub async fn read_pages(&self, zone: Zone, start_page: u8) -> Result<[u8; PAGE_READ_LEN], ToyPadError> {
        let device = self
            .device
            .lock()
            .expect("device mutex poisoned")
            .clone()
            .ok_or(ToyPadError::NotConnected)?;

        self.ensure_authenticated().await;

        let (msg, rx) = self
            .inner
            .lock()
            .expect("inner mutex poisoned")
            .registry
            .allocate(RequestKind::ReadPages, self.default_timeout);

        let frame = build_read_request(zone, start_page, msg);
        if let Err(err) = device.send_output_report(&frame).await {
            self.inner.lock().expect("inner mutex poisoned").registry.cancel(msg);
            debug!("send failed for read_pages: {err}");
            return Err(ToyPadError::NotConnected);
        }

        let payload = rx.await.map_err(|_| ToyPadError::NotConnected)??;
        decode_read_response(&payload)
    }

    async fn ensure_authenticated(&self) {
        let already_run = !matches!(
            self.inner.lock().expect("inner mutex poisoned").auth_state,
            AuthState::Unknown
        );
        if already_run {
            return;
        }

        let hook = Arc::clone(&*self.auth_hook.lock().expect("auth_hook mutex poisoned"));
        let result = hook.authenticate().await;
        self.inner.lock().expect("inner mutex poisoned").auth_state = result;
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.lock().expect("sweeper mutex poisoned").take() {
            sweeper.abort();
        }
    }
}

/// Route one inbound 32-byte report to the tag tracker or the message
/// registry, then sweep expired registry entries. Called from whatever
/// thread the transport delivers input reports on.
fn dispatch(inner: &Arc<Mutex<Inner>>, bytes: &[u8]) {
    if bytes.len() != REPORT_LEN {
        debug!("dropping input report with unexpected length {}", bytes.len());
        return;
    }
    let mut buf = [0u8; REPORT_LEN];
    buf.copy_from_slice(bytes);

    let mut guard = inner.lock().expect("inner mutex poisoned");
    match parse_input(&buf) {
        ParsedFrame::TagEvent(raw) => guard.tag_tracker.handle_raw_event(raw),
        ParsedFrame::Response { msg, payload } => guard.registry.resolve(msg, payload),
        ParsedFrame::Unknown => debug!("dropping unrecognised input report"),
    }
    guard.registry.sweep(Instant::now());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FakeTransport;
    use std::time::Duration as StdDuration;

    fn lights_off_frame(msg: u8) -> [u8; REPORT_LEN] {
        crate::lighting::lights_off(msg)
    }

    #[tokio::test]
    async fn attach_sends_init_blob_and_becomes_initialized() {
        let transport = Arc::new(FakeTransport::new());
        let session = SessionController::new(Arc::clone(&transport) as Arc<dyn HidTransport>, 0x0E6F, 0x0241);

        assert!(session.attach().await.unwrap());
        assert_eq!(*session.state().borrow(), SessionState::Initialized);
        assert_eq!(transport.device().sent_reports(), vec![INIT_BLOB.to_vec()]);
    }

    #[tokio::test]
    async fn attach_with_no_device_present_returns_false() {
        let transport = Arc::new(FakeTransport::new());
        transport.set_present(false);
        let session = SessionController::new(transport, 0x0E6F, 0x0241);
        assert!(!session.attach().await.unwrap());
        assert_eq!(*session.state().borrow(), SessionState::Disconnected);
    }

    /// Property 8 analogue — detaching mid-request drains it with
    /// `NotConnected` rather than leaving the caller waiting forever.
    #[tokio::test]
    async fn detach_drains_pending_requests() {
        let transport = Arc::new(FakeTransport::new());
        let session = Arc::new(SessionController::new(
            Arc::clone(&transport) as Arc<dyn HidTransport>,
            0x0E6F,
            0x0241,
        ));
        session.attach().await.unwrap();

        let session_clone = Arc::clone(&session);
        let handle = tokio::spawn(async move { session_clone.read_pages(Zone::Center, 0).await });

        tokio::time::sleep(StdDuration::from_millis(10)).await;
        session.detach().await;

        assert_eq!(handle.await.unwrap(), Err(ToyPadError::NotConnected));
    }

    #[tokio::test]
    async fn read_pages_resolves_from_injected_response() {
        let transport = Arc::new(FakeTransport::new());
        let session = SessionController::new(Arc::clone(&transport) as Arc<dyn HidTransport>, 0x0E6F, 0x0241);
        session.attach().await.unwrap();

        let fake = transport.device();
        let session = Arc::new(session);
        let session_clone = Arc::clone(&session);
        let handle = tokio::spawn(async move { session_clone.read_pages(Zone::Center, 0).await });

        // Give the read time to register and send its frame.
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        let sent = fake.sent_reports();
        let last = sent.last().unwrap();
        let msg = last[3];

        let mut response = [0u8; REPORT_LEN];
        response[0] = 0x55;
        response[1] = 0x14; // len = 3 + payload(17)
        response[2] = msg;
        response[3] = 0x00; // status
        for (i, b) in (0u8..16).enumerate() {
            response[4 + i] = b;
        }
        let cs_index = 3 + 0x14usize - 1;
        let checksum = response[..cs_index]
            .iter()
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        response[cs_index] = checksum;

        fake.inject_report(response);

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result, [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]);
    }

    #[tokio::test]
    async fn tag_insert_is_visible_through_snapshot_and_events() {
        let transport = Arc::new(FakeTransport::new());
        let session = SessionController::new(Arc::clone(&transport) as Arc<dyn HidTransport>, 0x0E6F, 0x0241);
        session.attach().await.unwrap();
        let mut events = session.tag_events();

        let fake = transport.device();
        let mut frame = [0u8; REPORT_LEN];
        frame[0] = 0x56;
        frame[1] = 0x0B;
        frame[2] = 2; // left
        frame[4] = 0; // index
        frame[5] = 0; // action = insert
        frame[7..14].copy_from_slice(&[0x04, 0x56, 0x00, 0x00, 0x00, 0x3A, 0x80]);
        fake.inject_report(frame);

        tokio::time::sleep(StdDuration::from_millis(10)).await;
        assert!(session.zone_snapshot().left.present);
        assert!(events.try_recv().is_ok());
    }

    #[tokio::test]
    async fn lighting_send_reaches_fake_transport() {
        let transport = Arc::new(FakeTransport::new());
        let session = SessionController::new(Arc::clone(&transport) as Arc<dyn HidTransport>, 0x0E6F, 0x0241);
        session.attach().await.unwrap();

        let frame = lights_off_frame(0x01);
        session.send_report(&frame).await.unwrap();

        let sent = transport.device().sent_reports();
        assert_eq!(sent.last().unwrap(), &frame.to_vec());
    }
}
