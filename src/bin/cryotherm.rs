//! Command-line entry point for the probe temperature controller.
//!
//! Loads a TOML configuration (or the built-in rig defaults), opens the
//! hardware, and runs the control loop until Ctrl+C.
//!
//! # Usage
//!
//! Simulated rig, no hardware needed:
//! ```sh
//! cargo run -- --simulate --cycles 40 -v
//! ```
//!
//! On a Raspberry Pi:
//! ```sh
//! cargo run --release --features rpi -- --config rig.toml
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use tracing_subscriber::EnvFilter;

use cryotherm::config::Config;
use cryotherm::control::{ControlLoop, Hardware, Shutdown};
use cryotherm::hal::{HostClock, HostDelay, MockActuator, MockSpi};
use cryotherm::traits::{Actuator, Clock};

#[derive(Debug, Parser)]
#[command(name = "cryotherm", version, about = "Thermocouple acquisition and heater control")]
struct Args {
    /// TOML configuration file; built-in rig defaults if omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run against simulated sensors and heaters
    #[arg(long)]
    simulate: bool,

    /// Stop after this many cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Override the log directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    if let Some(dir) = &args.log_dir {
        config.log = config.log.with_directory(dir.clone());
    }
    config.validate().context("invalid configuration")?;

    let shutdown = Shutdown::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            signal.request();
        }
    });

    let simulate = args.simulate;
    let cycles = args.cycles;
    let worker = tokio::task::spawn_blocking(move || {
        if simulate {
            run_simulated(&config, &shutdown, cycles)
        } else {
            run_hardware(&config, &shutdown, cycles)
        }
    });

    let completed = worker.await.context("control loop thread panicked")??;
    tracing::info!(cycles = completed, "exiting");
    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn run_loop<SPI, A, C, D>(
    config: &Config,
    hardware: Hardware<SPI, A, C, D>,
    shutdown: &Shutdown,
    cycles: Option<u64>,
) -> Result<u64>
where
    SPI: SpiDevice,
    A: Actuator,
    C: Clock,
    D: DelayNs,
{
    let mut control = ControlLoop::new(config, hardware)
        .context("starting control loop")?
        .open_log(&config.log)
        .context("opening data log")?;
    if let Some(log) = control.log() {
        tracing::info!(path = %log.path().display(), "logging");
    }
    control
        .run_for(shutdown, cycles)
        .context("control loop failed")
}

// ============================================================================
// Simulation
// ============================================================================

/// Cold sink the simulated rig relaxes towards, in °C.
const SINK_C: f64 = -180.0;
/// Fraction of the gap to the sink closed per sample.
const COOLING: f64 = 0.02;
/// Heating per sample while a heater is on, in °C.
const HEATING_C: f64 = 2.5;

fn run_simulated(config: &Config, shutdown: &Shutdown, cycles: Option<u64>) -> Result<u64> {
    let actuators: Vec<MockActuator> = config.axes.iter().map(|_| MockActuator::new()).collect();

    let channels = config
        .channels
        .iter()
        .map(|channel| {
            let heater = config
                .axes
                .iter()
                .position(|axis| axis.channel == channel.name)
                .map(|i| actuators[i].clone());
            let mut temperature = -100.0_f64;
            MockSpi::new().with_source(move || {
                let heating = match &heater {
                    Some(h) if h.energized() => HEATING_C,
                    _ => 0.0,
                };
                temperature += heating - COOLING * (temperature - SINK_C);
                (temperature * 4096.0).round() as i32
            })
        })
        .collect();

    tracing::info!("running against simulated hardware");
    run_loop(
        config,
        Hardware {
            channels,
            actuators,
            clock: HostClock::new(),
            delay: HostDelay,
        },
        shutdown,
        cycles,
    )
}

// ============================================================================
// Hardware
// ============================================================================

#[cfg(feature = "rpi")]
fn run_hardware(config: &Config, shutdown: &Shutdown, cycles: Option<u64>) -> Result<u64> {
    use cryotherm::hal::{RpiBoard, DEFAULT_SPI_HZ};

    let board = RpiBoard::open(DEFAULT_SPI_HZ).context("opening SPI0")?;
    let channels = config
        .channels
        .iter()
        .map(|c| {
            board
                .channel(c.chip_select)
                .with_context(|| format!("chip select for `{}`", c.name))
        })
        .collect::<Result<Vec<_>>>()?;
    let actuators = config
        .axes
        .iter()
        .map(|a| {
            board
                .actuator(a.pin, a.active_low)
                .with_context(|| format!("output pin for `{}`", a.name))
        })
        .collect::<Result<Vec<_>>>()?;

    run_loop(
        config,
        Hardware {
            channels,
            actuators,
            clock: HostClock::new(),
            delay: HostDelay,
        },
        shutdown,
        cycles,
    )
}

#[cfg(not(feature = "rpi"))]
fn run_hardware(_config: &Config, _shutdown: &Shutdown, _cycles: Option<u64>) -> Result<u64> {
    anyhow::bail!("built without hardware support; rebuild with `--features rpi` or pass --simulate")
}
