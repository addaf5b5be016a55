//! Error types for every layer of the acquisition and control stack.
//!
//! Each component gets its own enum so the control loop can decide per kind
//! whether to continue, mark a channel faulted, or shut down:
//!
//! | Error | Raised by | Loop policy |
//! |-------|-----------|-------------|
//! | [`BusFault`] | [`RegisterBus`](crate::bus::RegisterBus) | Gap for the cycle, counted per channel |
//! | [`SensorError`] | [`Max31856`](crate::sensor::Max31856) | Gap for the cycle |
//! | [`ConfigError`] | configuration and validation | Rejected before hardware is touched |
//! | [`LogError`] | [`LogWriter`](crate::logger::LogWriter) | Fatal |
//! | [`ControlError`] | [`ControlLoop`](crate::control::ControlLoop) | Terminates after the safe state |

use std::path::PathBuf;

use thiserror::Error;

pub use crate::bus::BusFault;
use crate::sensor::{ConversionState, FaultSet, ThermocoupleType};

/// Invalid configuration, rejected before any register or file is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Averaging count outside {1, 2, 4, 8, 16}.
    #[error("averaging must be one of 1, 2, 4, 8, 16 (got {0})")]
    InvalidAveraging(u8),

    /// Noise rejection frequency other than 50 or 60 Hz.
    #[error("noise rejection must be 50 or 60 Hz (got {0})")]
    InvalidRejection(u16),

    /// CR1 holds an averaging pattern the chip does not define.
    #[error("unrecognised AVGSEL bit pattern {0:#010b}")]
    UnknownAveragingBits(u8),

    /// The thermocouple type has no NIST polynomial table.
    #[error("no NIST polynomial table for thermocouple type {0:?}")]
    NoNistTable(ThermocoupleType),

    /// Fault threshold that the threshold registers cannot hold.
    #[error("fault threshold {0} °C is outside the register range")]
    InvalidThreshold(f64),

    /// PID settings that cannot produce a sane controller.
    #[error("invalid PID settings: {0}")]
    InvalidPid(&'static str),

    /// Loop timing or history settings out of range.
    #[error("invalid control loop settings: {0}")]
    InvalidLoop(&'static str),

    /// An axis refers to a channel name that is not configured.
    #[error("axis `{axis}` refers to unknown channel `{channel}`")]
    UnknownChannel {
        /// Axis name.
        axis: String,
        /// Missing channel name.
        channel: String,
    },

    /// Two channels share a name.
    #[error("channel `{0}` is configured twice")]
    DuplicateChannel(String),

    /// Hardware handles do not line up with the configuration.
    #[error("{what}: configuration has {expected}, hardware has {actual}")]
    HardwareMismatch {
        /// Which list mismatched.
        what: &'static str,
        /// Count in configuration.
        expected: usize,
        /// Count of hardware handles supplied.
        actual: usize,
    },
}

/// Failure of a single sensor operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// Register access failed on the bus.
    #[error(transparent)]
    Bus(#[from] BusFault),

    /// The one-shot bit never cleared within the poll budget.
    #[error("one-shot conversion still pending after {polls} polls")]
    ConversionTimeout {
        /// Number of polls performed.
        polls: u32,
    },

    /// Total thermoelectric voltage is outside every NIST sub-range.
    #[error("thermoelectric voltage {millivolts:.4} mV is outside the NIST range for type {thermocouple:?}")]
    OutOfRangeVoltage {
        /// Thermocouple type whose table was used.
        thermocouple: ThermocoupleType,
        /// Total voltage in millivolts.
        millivolts: f64,
    },

    /// Rejected configuration.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Temperature read attempted outside the `Ready` state.
    #[error("temperature is not readable while the channel is {state:?}")]
    NotReady {
        /// State at the time of the read.
        state: ConversionState,
    },

    /// Status register reports a fault that invalidates the reading.
    #[error("sensor fault: {0}")]
    Faulted(FaultSet),
}

impl SensorError {
    /// Returns true if this error came from the bus itself.
    pub fn is_bus_fault(&self) -> bool {
        matches!(self, SensorError::Bus(_))
    }
}

/// Failure to write or rotate the data log.
#[derive(Debug, Error)]
pub enum LogError {
    /// Filesystem error on a log path.
    #[error("log file {}: {source}", path.display())]
    Io {
        /// Path being created or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// CSV encoding or write error.
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Conditions that stop the control loop.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Configuration rejected at construction.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// A sensor could not be brought up at start-up.
    #[error("channel `{channel}` setup failed: {source}")]
    Sensor {
        /// Channel name.
        channel: String,
        /// Underlying sensor error.
        #[source]
        source: SensorError,
    },

    /// A channel kept failing on the bus.
    #[error("channel `{channel}` failed {consecutive} consecutive bus transactions")]
    PersistentBusFault {
        /// Channel name.
        channel: String,
        /// Consecutive failed cycles.
        consecutive: u32,
    },

    /// An actuator output could not be driven.
    #[error("actuator for axis `{axis}` failed: {message}")]
    Actuator {
        /// Axis name.
        axis: String,
        /// Debug rendering of the driver error.
        message: String,
    },

    /// The data log could not be written.
    #[error(transparent)]
    Log(#[from] LogError),
}
