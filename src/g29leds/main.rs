// OutGauge G29 LEDs - BeamNG.drive RPM telemetry to Logitech wheel rev-lights
//
// Listens for OutGauge UDP packets and lights the wheel's LEDs according to
// engine RPM. Until the first packet arrives the gas pedal drives the LEDs so
// the setup can be tested without the game running.
//
// BeamNG.drive: Options > Other > Protocols > OutGauge support, IP 127.0.0.1,
// port 4444.
//
// MIT License - see LICENSE file for details

use std::net::IpAddr;
use std::process::ExitCode;
use std::thread::sleep;
use std::time::Duration;

use clap::{Parser, Subcommand};
use hidapi::HidApi;
use outgauge_g29_leds::common::{
    bridge,
    leds::Leds,
    settings::{Settings, SettingsOverrides},
    wheel::{open_supported, WheelError},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CONSOLE_HELP: &str = "While running, type a number to set the max RPM, \
    'test' to return to pedal test mode, or 'q' to exit.";

#[derive(Parser)]
#[command(name = "outgauge-g29-leds", version)]
#[command(about = "BeamNG.drive OutGauge telemetry to Logitech G29 rev-light bridge")]
#[command(after_help = CONSOLE_HELP)]
struct Cli {
    /// UDP port to listen for OutGauge packets on [default: 4444]
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to listen for OutGauge packets on [default: 127.0.0.1]
    #[arg(long)]
    address: Option<IpAddr>,

    /// Maximum RPM of the car you are driving [default: 7000]
    #[arg(long)]
    max_rpm: Option<f32>,

    /// Log every RPM reading
    #[arg(long)]
    verbose: bool,

    /// Half-period of the over-redline blink in milliseconds [default: 100]
    #[arg(long, value_name = "MS")]
    flash_interval: Option<u64>,

    /// Fraction of max RPM where the LEDs go solid [default: 0.9]
    #[arg(long, value_name = "FRACTION")]
    blink_threshold: Option<f32>,

    /// Store the effective settings as the new defaults
    #[arg(long)]
    save: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep the LEDs without the game running
    Leds {
        /// Keep sweeping until interrupted
        #[arg(short, long)]
        continuous: bool,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();
}

fn test_leds(continuous: bool) -> Result<(), WheelError> {
    info!("looking for wheel for LED test");
    let api = HidApi::new()?;
    let (device, name) = open_supported(&api).ok_or(WheelError::NotFound)?;
    let mut leds = Leds::new(device);
    info!(wheel = name, "wheel connected, starting LED test");

    if continuous {
        info!("running continuous LED test (press Ctrl+C to stop)");
        loop {
            run_led_test_cycle(&mut leds)?;
        }
    }

    run_led_test_cycle(&mut leds)?;
    leds.off()?;
    info!("LED test completed");
    Ok(())
}

fn run_led_test_cycle(leds: &mut Leds) -> Result<(), WheelError> {
    // 0=off, 1=green1, 3=green1+2, 7=+orange1, 15=+orange2, 31=all
    const SWEEP: [u8; 6] = [0, 1, 3, 7, 15, 31];

    info!("testing LED progression: off -> green -> orange -> red");
    for mask in SWEEP {
        leds.set_mask(mask)?;
        sleep(Duration::from_millis(500));
    }

    info!("testing reverse LED progression: red -> orange -> green -> off");
    for mask in SWEEP.into_iter().rev() {
        leds.set_mask(mask)?;
        sleep(Duration::from_millis(500));
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Some(Commands::Leds { continuous }) = cli.command {
        return match tokio::task::spawn_blocking(move || test_leds(continuous)).await {
            Ok(Ok(())) => ExitCode::SUCCESS,
            Ok(Err(err)) => {
                error!(%err, "LED test failed");
                ExitCode::FAILURE
            }
            Err(err) => {
                error!(%err, "LED test aborted");
                ExitCode::FAILURE
            }
        };
    }

    let settings = Settings::load().with_overrides(SettingsOverrides {
        address: cli.address,
        port: cli.port,
        max_rpm: cli.max_rpm,
        verbose: cli.verbose,
        flash_interval_ms: cli.flash_interval,
        blink_threshold: cli.blink_threshold,
    });

    if cli.save {
        if let Err(err) = settings.validate().and_then(|()| settings.save().map(drop)) {
            error!(%err, "failed to save settings");
            return ExitCode::FAILURE;
        }
    }

    info!(
        listen = %settings.listen_addr(),
        max_rpm = settings.max_rpm,
        blink_threshold = settings.blink_threshold,
        flash_interval_ms = settings.flash_interval_ms,
        "starting OutGauge to wheel LED bridge"
    );

    match bridge::run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, cause = ?std::error::Error::source(&err), "bridge stopped");
            ExitCode::FAILURE
        }
    }
}
