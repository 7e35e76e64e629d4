// Telemetry to rev-light bridge
//
// All mutable state (mode, max RPM, wheel connection) lives in `Bridge` and is
// only touched from the single event loop in `drive`. Each event is handled to
// completion before the next one is looked at.

use std::future::Future;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::common::calibration::CalibrationTracker;
use crate::common::command::{parse_command, Command};
use crate::common::leds::{FeedbackSink, Pedal};
use crate::common::mode::{Mode, ModeController};
use crate::common::rpm::{map_rpm, FeedbackCommand};
use crate::common::settings::{Settings, SettingsError};
use crate::common::telemetry::{OutGaugeParser, TelemetryParser};
use crate::common::util::{now_epoch_ms, BridgeError, BridgeResult};
use crate::common::wheel::{WheelEvent, WheelHandle};

/// How long shutdown waits for the wheel to let go.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

const RECV_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    Datagram(Vec<u8>),
    Wheel(WheelEvent),
    Command(String),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

pub struct Bridge<S> {
    settings: Settings,
    parser: Box<dyn TelemetryParser>,
    mode: ModeController,
    calibration: CalibrationTracker,
    sink: S,
    connected_to_wheel: bool,
    last_rpm: Option<f32>,
}

impl<S: FeedbackSink> Bridge<S> {
    pub fn new(settings: Settings, sink: S) -> Result<Self, SettingsError> {
        settings.validate()?;
        let calibration = CalibrationTracker::new(settings.max_rpm)?;
        let parser: Box<dyn TelemetryParser> = Box::new(OutGaugeParser);
        debug!(
            game = parser.game_name(),
            min_packet_size = parser.expected_packet_size(),
            "telemetry parser ready"
        );
        Ok(Bridge {
            settings,
            parser,
            mode: ModeController::new(),
            calibration,
            sink,
            connected_to_wheel: false,
            last_rpm: None,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode.mode()
    }

    pub fn max_rpm(&self) -> f32 {
        self.calibration.max_rpm()
    }

    pub fn last_rpm(&self) -> Option<f32> {
        self.last_rpm
    }

    pub fn is_connected_to_wheel(&self) -> bool {
        self.connected_to_wheel
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn handle(&mut self, event: BridgeEvent, now_ms: u64) -> Flow {
        match event {
            BridgeEvent::Datagram(data) => self.on_datagram(&data, now_ms),
            BridgeEvent::Wheel(event) => self.on_wheel(event),
            BridgeEvent::Command(line) => return self.on_command(&line),
            BridgeEvent::Shutdown => {
                info!("shutting down");
                return Flow::Shutdown;
            }
        }
        Flow::Continue
    }

    fn on_datagram(&mut self, data: &[u8], now_ms: u64) {
        let gate = self.mode.on_datagram();
        if gate.entered_game_mode {
            info!("received first UDP message, switching to game mode");
            info!("the LEDs will now reflect the RPM, type 'test' for pedal test or 'q' to exit");
            info!("Enjoy!");
        }
        if !gate.drive_leds {
            return;
        }

        let current_rpm = match self.parser.parse_rpm(data) {
            Ok(rpm) => rpm,
            Err(err) => {
                warn!(%err, game = self.parser.game_name(), "ignoring malformed telemetry");
                self.sink.set_leds(FeedbackCommand::OFF);
                return;
            }
        };
        self.last_rpm = Some(current_rpm);

        let max_rpm = self.calibration.max_rpm();
        let outcome = map_rpm(
            current_rpm,
            max_rpm,
            self.settings.blink_threshold,
            self.settings.flash_interval_ms,
            now_ms,
        );
        if let Some(warning) = outcome.warning {
            warn!(current_rpm, max_rpm, "{warning}");
        }
        self.sink.set_leds(outcome.command);

        if self.settings.verbose {
            info!(current_rpm, fraction = outcome.fraction, max_rpm, "rpm");
        }

        // takes effect from the next datagram on
        if outcome.recalibrate {
            self.calibration.observe(current_rpm);
        }
    }

    fn on_wheel(&mut self, event: WheelEvent) {
        match event {
            WheelEvent::Connected { name } => {
                self.connected_to_wheel = true;
                info!(wheel = name, "wheel connected");
            }
            WheelEvent::Disconnected => {
                self.connected_to_wheel = false;
                warn!("wheel disconnected, waiting for it to come back");
            }
            WheelEvent::Pedal(pedal, value) => self.on_pedal(pedal, value),
        }
    }

    fn on_pedal(&mut self, pedal: Pedal, value: f32) {
        if !self.mode.routes_pedals() {
            return;
        }
        self.sink.pedal(pedal, value);
        if pedal == Pedal::Gas {
            self.sink.set_leds(FeedbackCommand::Intensity(value));
        }
    }

    fn on_command(&mut self, line: &str) -> Flow {
        let command = match parse_command(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Flow::Continue,
            Err(err) => {
                warn!("{err}");
                return Flow::Continue;
            }
        };

        match command {
            Command::Quit => {
                info!("exit requested");
                return Flow::Shutdown;
            }
            Command::TestMode => {
                if self.mode.enter_test_mode() {
                    self.sink.set_leds(FeedbackCommand::OFF);
                }
                // a pedal held down before `test` would otherwise stay dark
                self.sink.resend_pedals();
                self.announce_test_mode();
            }
            Command::SetMaxRpm(value) => match self.calibration.set_manual(value) {
                Ok(true) => info!(max_rpm = value, "the max RPM is now {value}"),
                Ok(false) => debug!(max_rpm = value, "max RPM unchanged"),
                Err(err) => warn!("{err}"),
            },
        }
        Flow::Continue
    }

    pub fn announce_test_mode(&self) {
        info!("switching to test mode, type 'q' or press Ctrl+C to exit");
        info!("press the pedals to see the LEDs in action");
        info!("waiting for UDP messages...");
    }

    pub fn set_wheel_connected(&mut self, connected: bool) {
        self.connected_to_wheel = connected;
    }
}

/// Event loop: handles datagrams, wheel events and console lines until a
/// quit command or `shutdown` resolves. A UDP receive error ends the loop
/// with `BridgeError::Transport`.
pub async fn drive<S, F>(
    bridge: &mut Bridge<S>,
    socket: &UdpSocket,
    wheel_events: &mut mpsc::Receiver<WheelEvent>,
    commands: &mut mpsc::Receiver<String>,
    shutdown: F,
) -> BridgeResult
where
    S: FeedbackSink,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    let mut wheel_open = true;
    let mut console_open = true;

    loop {
        let event = tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, _source) = received.map_err(BridgeError::Transport)?;
                BridgeEvent::Datagram(buf[..len].to_vec())
            }
            event = wheel_events.recv(), if wheel_open => match event {
                Some(event) => BridgeEvent::Wheel(event),
                None => {
                    wheel_open = false;
                    continue;
                }
            },
            line = commands.recv(), if console_open => match line {
                Some(line) => BridgeEvent::Command(line),
                None => {
                    console_open = false;
                    continue;
                }
            },
            () = &mut shutdown => BridgeEvent::Shutdown,
        };

        if bridge.handle(event, now_epoch_ms()) == Flow::Shutdown {
            return Ok(());
        }
    }
}

/// Forward stdin lines to the bridge until EOF. Runs on a plain thread so a
/// pending read never holds up runtime shutdown.
pub fn spawn_console(commands: mpsc::Sender<String>) {
    let spawned = std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                match line {
                    Ok(line) => {
                        if commands.blocking_send(line).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        warn!(%err, "cannot read operator input, console disabled");
                        return;
                    }
                }
            }
        });
    if let Err(err) = spawned {
        warn!(%err, "cannot start console reader, console disabled");
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(%err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

/// Bind the socket, connect to the wheel and run until shutdown. The wheel is
/// released before the socket.
pub async fn run(settings: Settings) -> BridgeResult {
    settings.validate()?;

    let addr = settings.listen_addr();
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|source| BridgeError::Bind { addr, source })?;
    info!(%addr, "listening for OutGauge telemetry");

    let (wheel_tx, mut wheel_events) = mpsc::channel(256);
    let wheel = WheelHandle::open(wheel_tx)?;

    let mut bridge = Bridge::new(settings, wheel)?;
    bridge.set_wheel_connected(true);
    bridge.announce_test_mode();

    let (command_tx, mut commands) = mpsc::channel(16);
    spawn_console(command_tx);

    let result = drive(
        &mut bridge,
        &socket,
        &mut wheel_events,
        &mut commands,
        shutdown_signal(),
    )
    .await;

    // cancel first, then unblock a device task stuck on a full channel
    let wheel = bridge.into_sink();
    wheel.cancel();
    drop(wheel_events);
    wheel.disconnect(SHUTDOWN_TIMEOUT).await;
    drop(socket);
    info!("UDP socket closed");
    result
}
