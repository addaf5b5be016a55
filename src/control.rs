//! Control loop that ties acquisition, PID feedback, actuation and logging
//! together.
//!
//! # Overview
//!
//! Each cycle:
//! - triggers every channel, then waits for and reads each one in order
//! - applies the channel's calibration; a failed channel is a gap
//! - feeds each axis's PID from its channel and drives its actuator
//! - pushes a [`ControlCycleRecord`] into the bounded history
//! - every `average_window` cycles appends the averaged row to the log
//! - rotates the log when it reached its size threshold
//! - sleeps out the rest of the interval in short slices so a shutdown
//!   request is seen promptly
//!
//! Whichever way [`ControlLoop::run`] ends, every actuator is
//! de-energized exactly once. Dropping the loop does the same if `run`
//! never got there. An error that ends the run is also appended to the
//! [`ErrorLog`] when one is attached.
//!
//! # Example
//!
//! ```rust
//! use cryotherm::config::{AxisConfig, ChannelConfig, Config};
//! use cryotherm::control::{ControlLoop, Hardware, Shutdown};
//! use cryotherm::hal::{MockActuator, MockClock, MockDelay, MockSpi};
//!
//! let config = Config::default()
//!     .with_channels(vec![ChannelConfig::new("tip", 5)])
//!     .with_axes(vec![AxisConfig::new("probe", "tip", 17).with_setpoint(-40.0)]);
//!
//! let spi = MockSpi::new();
//! spi.queue_temperature_raw(-50 * 4096);
//! let heater = MockActuator::new();
//! let clock = MockClock::new();
//!
//! let hardware = Hardware {
//!     channels: vec![spi],
//!     actuators: vec![heater.clone()],
//!     clock: clock.clone(),
//!     delay: MockDelay::with_clock(clock),
//! };
//! let mut control = ControlLoop::new(&config, hardware).unwrap();
//!
//! let cycles = control.run_for(&Shutdown::new(), Some(1)).unwrap();
//! assert_eq!(cycles, 1);
//! // -50 °C is below the -40 °C setpoint, so the heater came on...
//! assert_eq!(heater.history(), vec![true]);
//! // ...and was switched off when the loop ended
//! assert!(!heater.energized());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;

use crate::channel::SensorChannel;
use crate::config::{ActuationMode, Config, LogConfig, LoopConfig, ShortString};
use crate::error::{ConfigError, ControlError, SensorError};
use crate::history::{AveragedRecord, ControlCycleRecord, History};
use crate::logger::{ensure_log_dir, ErrorLog, LogWriter};
use crate::pid::PidController;
use crate::traits::{Actuator, Clock, PlotSink};

/// Longest single sleep between shutdown checks.
pub const SLEEP_SLICE_MS: u64 = 50;

/// Cloneable shutdown request shared with a signal handler.
#[derive(Clone, Debug, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    /// Creates a token that has not been triggered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the loop to stop at the next check.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once a stop was requested.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Hardware handles, in the same order as the configuration lists them.
pub struct Hardware<SPI, A, C, D> {
    /// One SPI device per configured channel.
    pub channels: Vec<SPI>,
    /// One actuator per configured axis.
    pub actuators: Vec<A>,
    /// Time source.
    pub clock: C,
    /// Delay for conversion polling and the end-of-cycle sleep.
    pub delay: D,
}

/// A channel that produced no value this cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelGap {
    /// Channel name.
    pub channel: String,
    /// Why.
    pub error: SensorError,
}

/// Outcome of one cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    /// Zero-based cycle number.
    pub cycle: u64,
    /// What was measured and driven.
    pub record: ControlCycleRecord,
    /// Averaged row, on cycles that closed an averaging window.
    pub averaged: Option<AveragedRecord>,
    /// Channels that failed this cycle.
    pub gaps: Vec<ChannelGap>,
    /// True if the log rotated after this cycle.
    pub rotated: bool,
}

struct Axis<A> {
    name: ShortString,
    channel: usize,
    actuation: ActuationMode,
    pid: PidController,
    actuator: A,
}

/// The acquisition and control context.
pub struct ControlLoop<SPI, A: Actuator, C, D> {
    control: LoopConfig,
    channels: Vec<SensorChannel<SPI>>,
    channel_names: Vec<String>,
    axes: Vec<Axis<A>>,
    clock: C,
    delay: D,
    history: History,
    log: Option<LogWriter>,
    error_log: Option<ErrorLog>,
    plot: Option<Box<dyn PlotSink>>,
    cycle: u64,
    cycles_since_log: usize,
    safe_state_applied: bool,
}

impl<SPI, A, C, D> ControlLoop<SPI, A, C, D>
where
    SPI: SpiDevice,
    A: Actuator,
    C: Clock,
    D: DelayNs,
{
    /// Validates `config`, de-energizes every actuator and brings up every
    /// channel.
    pub fn new(config: &Config, hardware: Hardware<SPI, A, C, D>) -> Result<Self, ControlError> {
        config.validate()?;
        let Hardware {
            channels,
            actuators,
            clock,
            delay,
        } = hardware;
        check_count("channels", config.channels.len(), channels.len())?;
        check_count("actuators", config.axes.len(), actuators.len())?;

        let axes = config
            .axes
            .iter()
            .zip(actuators)
            .map(|(axis, actuator)| {
                Ok(Axis {
                    name: axis.name.clone(),
                    channel: config.channel_index(&axis.channel).ok_or_else(|| {
                        ConfigError::UnknownChannel {
                            axis: axis.name.to_string(),
                            channel: axis.channel.to_string(),
                        }
                    })?,
                    actuation: axis.actuation,
                    pid: PidController::new(axis.pid.clone())?,
                    actuator,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let mut control = Self {
            control: config.control.clone(),
            channels: config
                .channels
                .iter()
                .zip(channels)
                .map(|(cfg, spi)| SensorChannel::new(cfg, spi))
                .collect(),
            channel_names: config.channels.iter().map(|c| c.name.to_string()).collect(),
            axes,
            clock,
            delay,
            history: History::for_window(config.control.average_window)?,
            log: None,
            error_log: None,
            plot: None,
            cycle: 0,
            cycles_since_log: 0,
            safe_state_applied: false,
        };

        for axis in &mut control.axes {
            axis.actuator
                .de_energize()
                .map_err(|e| actuator_error(&axis.name, e))?;
        }
        for channel in &mut control.channels {
            channel.setup().map_err(|source| ControlError::Sensor {
                channel: channel.name().to_string(),
                source,
            })?;
        }
        tracing::info!(
            channels = control.channels.len(),
            axes = control.axes.len(),
            interval_ms = control.control.interval_ms,
            "control loop ready"
        );
        Ok(control)
    }

    /// Creates the log directory, opens the first log file and points the
    /// error log at the same directory.
    pub fn open_log(mut self, config: &LogConfig) -> Result<Self, ControlError> {
        ensure_log_dir(config.directory())?;
        self.error_log = Some(ErrorLog::new(config.directory()));
        let header = LogWriter::header_for(
            self.channel_names.iter().map(String::as_str),
            self.axes.iter().map(|a| a.name.as_str()),
        );
        self.log = Some(LogWriter::create(config, header, self.clock.wall_time())?);
        Ok(self)
    }

    /// Attach an already open log
    pub fn with_log(mut self, log: LogWriter) -> Self {
        self.log = Some(log);
        self
    }

    /// Attach an error log for the errors that end a run
    pub fn with_error_log(mut self, error_log: ErrorLog) -> Self {
        self.error_log = Some(error_log);
        self
    }

    /// Attach a live plot consumer
    pub fn with_plot(mut self, plot: Box<dyn PlotSink>) -> Self {
        self.plot = Some(plot);
        self
    }

    /// Runs until `shutdown` is requested or an unrecoverable error occurs.
    pub fn run(&mut self, shutdown: &Shutdown) -> Result<u64, ControlError> {
        self.run_for(shutdown, None)
    }

    /// Like [`run`](Self::run), stopping after `max_cycles` if given.
    ///
    /// Returns the number of cycles completed. The safe state is applied
    /// before returning, on success and on error alike, and any error is
    /// recorded in the error log.
    pub fn run_for(
        &mut self,
        shutdown: &Shutdown,
        max_cycles: Option<u64>,
    ) -> Result<u64, ControlError> {
        self.safe_state_applied = false;
        let result = self.cycle_until(shutdown, max_cycles);
        if let Err(e) = &result {
            tracing::error!(error = %e, "control loop stopped");
            self.record_error(e);
        }
        let safe = self.enter_safe_state();
        if let Err(e) = &safe {
            self.record_error(e);
        }
        let cycles = result?;
        safe?;
        tracing::info!(cycles, "control loop finished");
        Ok(cycles)
    }

    fn record_error(&self, error: &ControlError) {
        if let Some(errors) = &self.error_log {
            if let Err(e) = errors.record(self.clock.wall_time(), error) {
                tracing::error!(error = %e, path = %errors.path().display(), "failed to write error log");
            }
        }
    }

    fn cycle_until(
        &mut self,
        shutdown: &Shutdown,
        max_cycles: Option<u64>,
    ) -> Result<u64, ControlError> {
        let mut completed = 0;
        while !shutdown.is_requested() && max_cycles.map_or(true, |max| completed < max) {
            let start_ms = self.clock.now_ms();
            self.run_cycle()?;
            completed += 1;
            if max_cycles == Some(completed) {
                break;
            }
            self.sleep_rest(start_ms, shutdown);
        }
        Ok(completed)
    }

    /// Runs exactly one cycle without sleeping afterwards.
    ///
    /// Driving the actuators re-arms the safe state, so the next `run`
    /// exit or drop de-energizes them again.
    pub fn run_cycle(&mut self) -> Result<CycleReport, ControlError> {
        self.safe_state_applied = false;
        let now_ms = self.clock.now_ms();
        let timestamp = self.clock.wall_time();
        let _span = tracing::debug_span!("cycle", cycle = self.cycle).entered();

        let (temperatures, gaps) = self.acquire_all();
        self.check_bus_health()?;

        let mut outputs = Vec::with_capacity(self.axes.len());
        let mut energized = Vec::with_capacity(self.axes.len());
        for axis in &mut self.axes {
            let (output, on) = match temperatures[axis.channel] {
                Some(value) => {
                    let output = axis.pid.update(value, now_ms);
                    (Some(output), axis.actuation.decide(output))
                }
                None => (None, false),
            };
            axis.actuator
                .set_energized(on)
                .map_err(|e| actuator_error(&axis.name, e))?;
            tracing::debug!(axis = %axis.name, ?output, on, "actuated");
            outputs.push(output);
            energized.push(on);
        }

        let record = ControlCycleRecord {
            timestamp,
            temperatures,
            outputs,
            energized,
        };
        self.history.push(record.clone());

        let averaged = self.log_window()?;
        let rotated = match self.log.as_mut() {
            Some(log) => log.rotate_if_needed(self.clock.wall_time())?,
            None => false,
        };

        if let Some(plot) = self.plot.as_mut() {
            let (timestamps, series) = self.history.series(&self.channel_names);
            plot.plot(&timestamps, &series);
        }

        let report = CycleReport {
            cycle: self.cycle,
            record,
            averaged,
            gaps,
            rotated,
        };
        self.cycle += 1;
        Ok(report)
    }

    fn acquire_all(&mut self) -> (Vec<Option<f64>>, Vec<ChannelGap>) {
        let triggered: Vec<Result<(), SensorError>> =
            self.channels.iter_mut().map(|ch| ch.trigger()).collect();

        let mut temperatures = Vec::with_capacity(self.channels.len());
        let mut gaps = Vec::new();
        for (channel, trigger) in self.channels.iter_mut().zip(triggered) {
            let reading =
                trigger.and_then(|()| channel.acquire(&mut self.delay, self.control.poll));
            match reading {
                Ok(r) => {
                    tracing::debug!(channel = channel.name(), raw = r.raw, calibrated = r.calibrated);
                    temperatures.push(Some(r.calibrated));
                }
                Err(error) => {
                    tracing::warn!(channel = channel.name(), %error, "no reading this cycle");
                    temperatures.push(None);
                    gaps.push(ChannelGap {
                        channel: channel.name().to_string(),
                        error,
                    });
                }
            }
        }
        (temperatures, gaps)
    }

    fn check_bus_health(&self) -> Result<(), ControlError> {
        let limit = self.control.max_consecutive_bus_faults;
        match self
            .channels
            .iter()
            .find(|ch| ch.consecutive_bus_faults() >= limit)
        {
            Some(ch) => Err(ControlError::PersistentBusFault {
                channel: ch.name().to_string(),
                consecutive: ch.consecutive_bus_faults(),
            }),
            None => Ok(()),
        }
    }

    fn log_window(&mut self) -> Result<Option<AveragedRecord>, ControlError> {
        self.cycles_since_log += 1;
        if self.cycles_since_log < self.control.average_window {
            return Ok(None);
        }
        self.cycles_since_log = 0;
        let averaged = self.history.average(self.control.average_window);
        if let (Some(log), Some(row)) = (self.log.as_mut(), averaged.as_ref()) {
            log.append(row)?;
        }
        Ok(averaged)
    }

    fn sleep_rest(&mut self, start_ms: u64, shutdown: &Shutdown) {
        let elapsed = self.clock.now_ms().saturating_sub(start_ms);
        let mut remaining = if elapsed < self.control.interval_ms {
            self.control.interval_ms - elapsed
        } else {
            tracing::warn!(
                elapsed_ms = elapsed,
                interval_ms = self.control.interval_ms,
                "cycle overran its interval"
            );
            self.control.overrun_sleep_ms
        };
        while remaining > 0 && !shutdown.is_requested() {
            let slice = remaining.min(SLEEP_SLICE_MS);
            self.delay.delay_ms(slice as u32);
            remaining -= slice;
        }
    }

    /// Buffered history, oldest first.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Current log writer, if any.
    pub fn log(&self) -> Option<&LogWriter> {
        self.log.as_ref()
    }

    /// Error log, if any.
    pub fn error_log(&self) -> Option<&ErrorLog> {
        self.error_log.as_ref()
    }

    /// Number of cycles run so far.
    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Channel names in column order.
    pub fn channel_names(&self) -> &[String] {
        &self.channel_names
    }

    /// Changes an axis setpoint without resetting its integral.
    pub fn set_setpoint(&mut self, axis: &str, setpoint: f64) -> bool {
        match self.axes.iter_mut().find(|a| a.name.as_str() == axis) {
            Some(a) => {
                a.pid.set_setpoint(setpoint);
                true
            }
            None => false,
        }
    }

    /// Changes an axis actuation policy.
    pub fn set_actuation(&mut self, axis: &str, actuation: ActuationMode) -> bool {
        match self.axes.iter_mut().find(|a| a.name.as_str() == axis) {
            Some(a) => {
                a.actuation = actuation;
                true
            }
            None => false,
        }
    }
}

impl<SPI, A: Actuator, C, D> ControlLoop<SPI, A, C, D> {
    /// De-energizes every actuator and flushes the log.
    ///
    /// Runs once per termination; later calls do nothing until the next
    /// `run` or cycle drives the actuators again. Every actuator is attempted even if one fails; the first
    /// failure is returned.
    pub fn enter_safe_state(&mut self) -> Result<(), ControlError> {
        if self.safe_state_applied {
            return Ok(());
        }
        self.safe_state_applied = true;

        let mut first_error = None;
        for axis in &mut self.axes {
            if let Err(e) = axis.actuator.de_energize() {
                tracing::error!(axis = %axis.name, error = ?e, "failed to de-energize");
                first_error.get_or_insert_with(|| actuator_error(&axis.name, e));
            }
        }
        if let Some(log) = self.log.as_mut() {
            if let Err(e) = log.flush() {
                tracing::error!(error = %e, "failed to flush log");
                first_error.get_or_insert(ControlError::Log(e));
            }
        }
        tracing::info!("safe state: actuators de-energized");
        first_error.map_or(Ok(()), Err)
    }

    /// Returns true once the safe state has been applied for this run.
    pub fn is_safe(&self) -> bool {
        self.safe_state_applied
    }
}

impl<SPI, A: Actuator, C, D> Drop for ControlLoop<SPI, A, C, D> {
    fn drop(&mut self) {
        let _ = self.enter_safe_state();
    }
}

fn check_count(what: &'static str, expected: usize, actual: usize) -> Result<(), ConfigError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ConfigError::HardwareMismatch {
            what,
            expected,
            actual,
        })
    }
}

fn actuator_error<E: core::fmt::Debug>(axis: &str, e: E) -> ControlError {
    ControlError::Actuator {
        axis: axis.to_string(),
        message: format!("{e:?}"),
    }
}
