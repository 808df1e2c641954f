//! HID Transport — the external capability the engine is built on.
//!
//! This is deliberately a trait, not a concrete device: the Session
//! Controller is injected with whatever implements [`HidTransport`],
//! the same shape as the reference daemon's `DeviceDriver` trait being
//! handed a `DeviceIo` it doesn't construct itself. [`HidApiTransport`]
//! is the one real implementation, built on the cross-platform
//! `hidapi` crate; [`FakeTransport`] is an in-memory double for tests
//! (and for downstream consumers who want to drive the engine without
//! real hardware).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

/// Called on the engine's executor with each 32-byte input report.
pub type InputReportCallback = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// Called once when the device is removed.
pub type RemovalCallback = Box<dyn Fn() + Send + Sync>;

/// One open HID device connection.
///
/// `register_input_report_callback` and `on_removal` may each be called
/// at most once per open device; later calls replace the previous
/// callback.
#[async_trait]
pub trait HidDevice: Send + Sync {
    /// Send a single 32-byte output report (report ID `0`).
    async fn send_output_report(&self, report: &[u8; 32]) -> anyhow::Result<()>;

    /// Register the callback invoked for every inbound input report.
    fn register_input_report_callback(&self, callback: InputReportCallback);

    /// Register the callback invoked when the device disappears.
    fn on_removal(&self, callback: RemovalCallback);

    /// Close the device. Idempotent.
    fn close(&self);
}

/// Enumerates and opens matching HID devices.
#[async_trait]
pub trait HidTransport: Send + Sync {
    /// Find and open the first device matching `vid`/`pid`. Returns
    /// `Ok(None)` if no matching device is currently present — this is
    /// not an error, just "nothing to attach to yet".
    async fn open(&self, vid: u16, pid: u16) -> anyhow::Result<Option<Arc<dyn HidDevice>>>;
}

/* ------------------------------------------------------------------ */
/* hidapi-backed implementation                                         */
/* ------------------------------------------------------------------ */

/// Real transport, built on the cross-platform `hidapi` crate.
///
/// `hidapi` is blocking, so reads happen on a dedicated OS thread that
/// forwards each report to the registered callback; writes go through
/// `spawn_blocking` so they never stall the async executor.
pub struct HidApiTransport;

impl HidApiTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HidApiTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HidTransport for HidApiTransport {
    async fn open(&self, vid: u16, pid: u16) -> anyhow::Result<Option<Arc<dyn HidDevice>>> {
        tokio::task::spawn_blocking(move || -> anyhow::Result<Option<Arc<dyn HidDevice>>> {
            let api = hidapi::HidApi::new()?;
            let found = api
                .device_list()
                .any(|info| info.vendor_id() == vid && info.product_id() == pid);
            if !found {
                return Ok(None);
            }

            let device = api.open(vid, pid)?;
            Ok(Some(Arc::new(HidApiDevice::new(device)) as Arc<dyn HidDevice>))
        })
        .await?
    }
}

struct HidApiDevice {
    device: Arc<Mutex<hidapi::HidDevice>>,
    callbacks: Arc<Mutex<Callbacks>>,
    reader_started: Mutex<bool>,
    reader_running: Arc<AtomicBool>,
}

#[derive(Default)]
struct Callbacks {
    input_report: Option<InputReportCallback>,
    removal: Option<RemovalCallback>,
}

impl HidApiDevice {
    fn new(device: hidapi::HidDevice) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
            callbacks: Arc::new(Mutex::new(Callbacks::default())),
            reader_started: Mutex::new(false),
            reader_running: Arc::new(AtomicBool::new(true)),
        }
    }
}

#[async_trait]
impl HidDevice for HidApiDevice {
    async fn send_output_report(&self, report: &[u8; 32]) -> anyhow::Result<()> {
        let mut buf = Vec::with_capacity(33);
        buf.push(0x00); // report ID
        buf.extend_from_slice(report);

        let device_guard = self.device.lock().expect("hid device mutex poisoned");
        // hidapi's `write` is blocking; this crate's writes are small
        // and infrequent enough (lighting/reads) that blocking the
        // current task briefly is acceptable, matching the reference
        // daemon's synchronous `set_feature_report`/`get_feature_report`
        // ioctls which are called the same way.
        device_guard.write(&buf)?;
        debug!("TX {} bytes: {:02x?}", buf.len(), buf);
        Ok(())
    }

    fn register_input_report_callback(&self, callback: InputReportCallback) {
        self.callbacks.lock().expect("callbacks mutex poisoned").input_report = Some(callback);

        let mut started = self.reader_started.lock().expect("reader_started mutex poisoned");
        if !*started {
            *started = true;
            spawn_read_loop(
                Arc::clone(&self.device),
                Arc::clone(&self.callbacks),
                Arc::clone(&self.reader_running),
            );
        }
    }

    fn on_removal(&self, callback: RemovalCallback) {
        self.callbacks.lock().expect("callbacks mutex poisoned").removal = Some(callback);
    }

    fn close(&self) {
        self.reader_running.store(false, Ordering::SeqCst);
        if let Some(removal) = self
            .callbacks
            .lock()
            .expect("callbacks mutex poisoned")
            .removal
            .as_ref()
        {
            removal();
        }
    }
}

/// 100ms read timeout keeps the polling loop responsive to `close()`
/// without busy-spinning.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn spawn_read_loop(
    device: Arc<Mutex<hidapi::HidDevice>>,
    callbacks: Arc<Mutex<Callbacks>>,
    running: Arc<AtomicBool>,
) {
    std::thread::spawn(move || {
        let mut buf = [0u8; 32];
        while running.load(Ordering::SeqCst) {
            let read = {
                let device_guard = device.lock().expect("hid device mutex poisoned");
                device_guard.read_timeout(&mut buf, READ_POLL_INTERVAL.as_millis() as i32)
            };

            match read {
                Ok(0) => continue, // timed out, no data
                Ok(len) => {
                    trace!("RX {len} bytes: {:02x?}", &buf[..len]);
                    if let Some(cb) = callbacks
                        .lock()
                        .expect("callbacks mutex poisoned")
                        .input_report
                        .as_ref()
                    {
                        cb(buf[..len].to_vec());
                    }
                }
                Err(err) => {
                    warn!("hid read failed, treating as device removal: {err}");
                    if let Some(cb) = callbacks
                        .lock()
                        .expect("callbacks mutex poisoned")
                        .removal
                        .as_ref()
                    {
                        cb();
                    }
                    break;
                }
            }
        }
    });
}

/* ------------------------------------------------------------------ */
/* In-memory test double                                                */
/* ------------------------------------------------------------------ */

/// An in-memory [`HidTransport`] for tests: [`FakeDevice::inject_report`]
/// feeds bytes to the registered input-report callback as if they had
/// arrived from hardware, and [`FakeDevice::sent_reports`] records every
/// outgoing write for assertions.
///
/// Only compiled when the `test-support` feature is enabled (on by
/// default for `cargo test`, via the self dev-dependency in
/// `Cargo.toml`).
#[cfg(any(test, feature = "test-support"))]
pub struct FakeTransport {
    device: Arc<FakeDevice>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeTransport {
    /// A device is present by default — most tests want `open()` to
    /// succeed without an extra `set_present(true)` call. Use
    /// `set_present(false)` to exercise the "nothing plugged in" path.
    pub fn new() -> Self {
        Self {
            device: Arc::new(FakeDevice::new()),
        }
    }

    /// Handle to the single fake device this transport will hand out,
    /// for injecting reports / reading sent bytes from test code.
    pub fn device(&self) -> Arc<FakeDevice> {
        Arc::clone(&self.device)
    }

    /// Controls whether `open()` finds a device at all.
    pub fn set_present(&self, present: bool) {
        *self.device.present.lock().expect("poisoned") = present;
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl HidTransport for FakeTransport {
    async fn open(&self, _vid: u16, _pid: u16) -> anyhow::Result<Option<Arc<dyn HidDevice>>> {
        if !*self.device.present.lock().expect("poisoned") {
            return Ok(None);
        }
        Ok(Some(Arc::clone(&self.device) as Arc<dyn HidDevice>))
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct FakeDevice {
    present: Mutex<bool>,
    sent: Mutex<Vec<Vec<u8>>>,
    callbacks: Mutex<Callbacks>,
}

#[cfg(any(test, feature = "test-support"))]
impl FakeDevice {
    fn new() -> Self {
        Self {
            present: Mutex::new(true),
            sent: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Callbacks::default()),
        }
    }

    /// All reports sent through `send_output_report` so far, in order.
    pub fn sent_reports(&self) -> Vec<Vec<u8>> {
        self.sent.lock().expect("poisoned").clone()
    }

    /// Deliver a 32-byte input report to the registered callback, as if
    /// it had just arrived from hardware.
    pub fn inject_report(&self, report: [u8; 32]) {
        if let Some(cb) = self.callbacks.lock().expect("poisoned").input_report.as_ref() {
            cb(report.to_vec());
        }
    }

    /// Simulate device removal.
    pub fn inject_removal(&self) {
        if let Some(cb) = self.callbacks.lock().expect("poisoned").removal.as_ref() {
            cb();
        }
    }
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            input_report: None,
            removal: None,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl HidDevice for FakeDevice {
    async fn send_output_report(&self, report: &[u8; 32]) -> anyhow::Result<()> {
        self.sent.lock().expect("poisoned").push(report.to_vec());
        Ok(())
    }

    fn register_input_report_callback(&self, callback: InputReportCallback) {
        self.callbacks.lock().expect("poisoned").input_report = Some(callback);
    }

    fn on_removal(&self, callback: RemovalCallback) {
        self.callbacks.lock().expect("poisoned").removal = Some(callback);
    }

    fn close(&self) {}
}

#[cfg(any(test, feature = "test-support"))]
impl Default for FakeTransport {
    fn default() -> Self {
        Self::new()
    }
}
