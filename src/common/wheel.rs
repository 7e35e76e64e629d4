// Logitech wheel connection
//
// A blocking device task owns the HID handle: it writes the latest LED mask
// handed over by the bridge, polls pedal positions, and when the wheel drops
// off the bus keeps retrying once a second until it comes back or the task is
// cancelled. The LEDs are switched off whenever the task ends.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use hidapi::{HidApi, HidDevice, HidError, HidResult};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::common::leds::{led_mask, FeedbackSink, Leds, Pedal};
use crate::common::rpm::FeedbackCommand;
use crate::common::util::{LOGITECH_VID, SUPPORTED_WHEELS};

pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);
const POLL_TIMEOUT_MS: i32 = 10;
const INPUT_REPORT_ID: u8 = 0x01;
const NO_MASK: u8 = u8::MAX;

#[derive(Debug, Error)]
pub enum WheelError {
    #[error("cannot initialise HID access")]
    Hid(#[from] HidError),
    #[error("cannot find a supported Logitech wheel on this system")]
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WheelEvent {
    Connected { name: &'static str },
    Disconnected,
    Pedal(Pedal, f32),
}

/// An open wheel: output reports go out, input reports come in.
pub trait WheelDevice {
    fn write(&self, data: &[u8]) -> HidResult<usize>;
    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> HidResult<usize>;
}

impl WheelDevice for HidDevice {
    fn write(&self, data: &[u8]) -> HidResult<usize> {
        HidDevice::write(self, data)
    }

    fn read_timeout(&self, buf: &mut [u8], timeout_ms: i32) -> HidResult<usize> {
        HidDevice::read_timeout(self, buf, timeout_ms)
    }
}

/// Where wheels are (re)opened from.
pub trait WheelBus {
    type Device: WheelDevice;

    /// Rescan and open the first supported wheel that is plugged in.
    fn reopen(&mut self) -> Option<(Self::Device, &'static str)>;
}

impl WheelBus for HidApi {
    type Device = HidDevice;

    fn reopen(&mut self) -> Option<(HidDevice, &'static str)> {
        if let Err(err) = self.refresh_devices() {
            warn!(%err, "failed to refresh HID device list");
            return None;
        }
        open_supported(self)
    }
}

/// Pedal positions from a standard input report: report id 0x01, then
/// throttle, brake and clutch in bytes 3 to 5 (0 released, 255 floored).
pub fn parse_pedals(report: &[u8]) -> Option<[f32; 3]> {
    if report.first() != Some(&INPUT_REPORT_ID) {
        return None;
    }
    let axes = report.get(3..6)?;
    let mut values = [0.0; 3];
    for (value, raw) in values.iter_mut().zip(axes) {
        *value = f32::from(*raw) / 255.0;
    }
    Some(values)
}

pub fn open_supported(api: &HidApi) -> Option<(HidDevice, &'static str)> {
    for (pid, name) in SUPPORTED_WHEELS {
        let present = api
            .device_list()
            .any(|d| d.vendor_id() == LOGITECH_VID && d.product_id() == pid);
        if !present {
            continue;
        }
        match api.open(LOGITECH_VID, pid) {
            Ok(device) => return Some((device, name)),
            Err(err) => warn!(wheel = name, %err, "found wheel but failed to open connection"),
        }
    }
    None
}

/// State the bridge hands over to the device task. Only the newest LED mask
/// is kept.
#[derive(Debug)]
struct Shared {
    mask: AtomicU8,
    resend_pedals: AtomicBool,
    cancel: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Shared {
            mask: AtomicU8::new(NO_MASK),
            resend_pedals: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
        }
    }

    fn put_mask(&self, mask: u8) {
        self.mask.store(mask, Ordering::Release);
    }

    fn take_mask(&self) -> Option<u8> {
        match self.mask.swap(NO_MASK, Ordering::AcqRel) {
            NO_MASK => None,
            mask => Some(mask),
        }
    }
}

/// Bridge-side handle on the device task. Also the LED sink used in
/// production.
pub struct WheelHandle {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
    last_mask: Option<u8>,
}

impl WheelHandle {
    /// Open the first supported wheel and start the device task. Wheel
    /// events are delivered on `events`.
    pub fn open(events: mpsc::Sender<WheelEvent>) -> Result<Self, WheelError> {
        let api = HidApi::new()?;
        let (device, name) = open_supported(&api).ok_or(WheelError::NotFound)?;
        info!(wheel = name, "connected to wheel");

        let shared = Arc::new(Shared::new());
        let task = DeviceTask::new(api, device, name, shared.clone(), events);
        let task = tokio::task::spawn_blocking(move || task.run());

        Ok(WheelHandle {
            shared,
            task,
            last_mask: None,
        })
    }

    /// Ask the device task to stop. It switches the LEDs off on its way out.
    pub fn cancel(&self) {
        self.shared.cancel.store(true, Ordering::Release);
    }

    /// Cancel the device task and wait up to `timeout` for it to release the
    /// wheel.
    pub async fn disconnect(self, timeout: Duration) {
        self.cancel();
        match tokio::time::timeout(timeout, self.task).await {
            Ok(Ok(())) => info!("disconnected from wheel"),
            Ok(Err(err)) => warn!(%err, "wheel task ended abnormally"),
            Err(_) => warn!(?timeout, "timed out waiting for wheel to disconnect"),
        }
    }
}

impl FeedbackSink for WheelHandle {
    fn set_leds(&mut self, command: FeedbackCommand) {
        let mask = led_mask(command.level());
        if self.last_mask == Some(mask) {
            return;
        }
        self.shared.put_mask(mask);
        self.last_mask = Some(mask);
    }

    fn resend_pedals(&mut self) {
        self.shared.resend_pedals.store(true, Ordering::Release);
    }
}

struct DeviceTask<B: WheelBus> {
    bus: B,
    leds: Leds<B::Device>,
    name: &'static str,
    shared: Arc<Shared>,
    events: mpsc::Sender<WheelEvent>,
    pedals: [Option<f32>; 3],
    retry_interval: Duration,
}

impl<B: WheelBus> DeviceTask<B> {
    fn new(
        bus: B,
        device: B::Device,
        name: &'static str,
        shared: Arc<Shared>,
        events: mpsc::Sender<WheelEvent>,
    ) -> Self {
        DeviceTask {
            bus,
            leds: Leds::new(device),
            name,
            shared,
            events,
            pedals: [None; 3],
            retry_interval: RECONNECT_INTERVAL,
        }
    }

    fn cancelled(&self) -> bool {
        self.shared.cancel.load(Ordering::Acquire)
    }

    fn emit(&self, event: WheelEvent) -> bool {
        self.events.blocking_send(event).is_ok()
    }

    fn run(mut self) {
        let mut buf = [0u8; 64];
        while !self.cancelled() {
            match self.poll(&mut buf) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    warn!(wheel = self.name, %err, "wheel connection lost");
                    if !self.emit(WheelEvent::Disconnected) || !self.reconnect() {
                        break;
                    }
                }
            }
        }

        if let Err(err) = self.leds.off() {
            debug!(%err, "could not switch LEDs off");
        }
    }

    /// One round of LED output and pedal input. `Ok(false)` means the bridge
    /// is gone.
    fn poll(&mut self, buf: &mut [u8]) -> HidResult<bool> {
        if let Some(mask) = self.shared.take_mask() {
            self.leds.set_mask(mask)?;
        }
        if self.shared.resend_pedals.swap(false, Ordering::AcqRel) {
            self.pedals = [None; 3];
        }

        let read = self.leds.device().read_timeout(buf, POLL_TIMEOUT_MS)?;
        let Some(values) = buf.get(..read).and_then(parse_pedals) else {
            return Ok(true);
        };
        let changes = Pedal::ALL.into_iter().zip(self.pedals.iter_mut()).zip(values);
        for ((pedal, last), value) in changes {
            if *last != Some(value) {
                *last = Some(value);
                if self.events.blocking_send(WheelEvent::Pedal(pedal, value)).is_err() {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Retry opening the wheel once per `retry_interval`. Returns false when
    /// cancelled or when nobody is listening anymore.
    fn reconnect(&mut self) -> bool {
        let restore = self.leds.current();
        loop {
            if self.cancelled() {
                return false;
            }
            sleep(self.retry_interval);
            if self.cancelled() {
                return false;
            }
            let Some((device, name)) = self.bus.reopen() else {
                trace!("wheel not found, retrying in 1 second");
                continue;
            };

            info!(wheel = name, "reconnected to wheel");
            self.leds = Leds::new(device);
            self.name = name;
            self.pedals = [None; 3];
            if let Some(mask) = restore {
                if let Err(err) = self.leds.set_mask(mask) {
                    debug!(%err, "could not restore LEDs after reconnect");
                }
            }
            return self.emit(WheelEvent::Connected { name });
        }
    }
}
