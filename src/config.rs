//! Configuration for the acquisition and control loop.
//!
//! Uses `heapless::String` for names so the channel and axis tables stay
//! fixed-size. The defaults reproduce the cryostat rig: four type-T
//! channels (cold head, heat exchanger front and back, chamber) and two
//! heater axes regulating the heat exchanger.
//!
//! # Example
//!
//! ```rust
//! use cryotherm::config::{AxisConfig, ChannelConfig, Config, LoopConfig};
//! use cryotherm::calibration::ChannelKind;
//!
//! // Use defaults
//! let config = Config::default();
//! assert!(config.validate().is_ok());
//!
//! // Or describe a rig from scratch
//! let config = Config::default()
//!     .with_control(LoopConfig::default().with_interval_ms(1000))
//!     .with_channels(vec![ChannelConfig::new("tip", 5).with_kind(ChannelKind::Tip)])
//!     .with_axes(vec![AxisConfig::new("probe", "tip", 17).with_setpoint(-40.0)]);
//! assert!(config.validate().is_ok());
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use heapless::String as HString;

use crate::calibration::{Calibration, ChannelKind};
use crate::channel::{ConversionMode, Linearization};
use crate::error::ConfigError;
use crate::history::MAX_HISTORY;
use crate::pid::PidConfig;
use crate::sensor::{nist, registers, NoiseRejection, PollBudget, ThermocoupleType};

/// Maximum length for short config strings (channel and axis names)
pub const MAX_SHORT_STRING: usize = 64;

/// Type alias for short config strings
pub type ShortString = HString<MAX_SHORT_STRING>;

// ============================================================================
// Helper for creating heapless strings
// ============================================================================

/// Create a ShortString from a &str, truncating if too long
pub fn short_string(s: &str) -> ShortString {
    let mut hs = HString::new();
    // Find valid UTF-8 boundary
    let valid_end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|end| *end <= MAX_SHORT_STRING)
        .last()
        .unwrap_or(0);
    let _ = hs.push_str(&s[..valid_end]);
    hs
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Loop timing and fault policy
    pub control: LoopConfig,
    /// Data log settings
    pub log: LogConfig,
    /// Sensor channels, in log column order
    pub channels: Vec<ChannelConfig>,
    /// Heater axes
    pub axes: Vec<AxisConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control: LoopConfig::default(),
            log: LogConfig::default(),
            channels: vec![
                ChannelConfig::new("cold_head", 13).with_kind(ChannelKind::ColdHead),
                ChannelConfig::new("heat_ex_front", 16).with_kind(ChannelKind::HeatExFront),
                ChannelConfig::new("heat_ex_back", 25).with_kind(ChannelKind::HeatExBack),
                ChannelConfig::new("chamber", 26).with_kind(ChannelKind::Chamber),
            ],
            axes: vec![
                AxisConfig::new("front", "heat_ex_front", 17).with_setpoint(-115.0),
                AxisConfig::new("back", "heat_ex_back", 18).with_setpoint(-94.5),
            ],
        }
    }
}

impl Config {
    /// Set loop configuration
    pub fn with_control(mut self, control: LoopConfig) -> Self {
        self.control = control;
        self
    }

    /// Set log configuration
    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Replace the channel table
    pub fn with_channels(mut self, channels: Vec<ChannelConfig>) -> Self {
        self.channels = channels;
        self
    }

    /// Replace the axis table
    pub fn with_axes(mut self, axes: Vec<AxisConfig>) -> Self {
        self.axes = axes;
        self
    }

    /// Index of the channel called `name`.
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name.as_str() == name)
    }

    /// Checks every setting before any hardware or file is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.control.validate()?;
        self.log.validate()?;

        if self.channels.is_empty() {
            return Err(ConfigError::InvalidLoop("at least one channel is required"));
        }
        let mut names = HashSet::new();
        let mut chip_selects = HashSet::new();
        for channel in &self.channels {
            if !names.insert(channel.name.as_str()) {
                return Err(ConfigError::DuplicateChannel(channel.name.to_string()));
            }
            if !chip_selects.insert(channel.chip_select) {
                return Err(ConfigError::InvalidLoop("two channels share a chip select"));
            }
            channel.validate()?;
        }

        let mut axis_names = HashSet::new();
        for axis in &self.axes {
            if !axis_names.insert(axis.name.as_str()) {
                return Err(ConfigError::InvalidLoop("axis names must be unique"));
            }
            if self.channel_index(&axis.channel).is_none() {
                return Err(ConfigError::UnknownChannel {
                    axis: axis.name.to_string(),
                    channel: axis.channel.to_string(),
                });
            }
            axis.pid.validate()?;
        }
        Ok(())
    }
}

// ============================================================================
// Loop Config
// ============================================================================

/// Control loop timing and fault policy
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LoopConfig {
    /// Target cycle period in milliseconds
    pub interval_ms: u64,
    /// Sleep after a cycle that overran its interval
    pub overrun_sleep_ms: u64,
    /// Cycles averaged into one log row
    pub average_window: usize,
    /// Wait budget for one-shot conversions
    pub poll: PollBudget,
    /// Consecutive bus-faulted cycles on one channel before the loop stops
    pub max_consecutive_bus_faults: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            interval_ms: 250,
            overrun_sleep_ms: 100,
            average_window: 2,
            poll: PollBudget::default(),
            max_consecutive_bus_faults: 10,
        }
    }
}

impl LoopConfig {
    /// Set the cycle period
    pub fn with_interval_ms(mut self, ms: u64) -> Self {
        self.interval_ms = ms;
        self
    }

    /// Set the overrun fallback sleep
    pub fn with_overrun_sleep_ms(mut self, ms: u64) -> Self {
        self.overrun_sleep_ms = ms;
        self
    }

    /// Set the averaging window
    pub fn with_average_window(mut self, window: usize) -> Self {
        self.average_window = window;
        self
    }

    /// Set the conversion poll budget
    pub fn with_poll(mut self, poll: PollBudget) -> Self {
        self.poll = poll;
        self
    }

    /// Set the bus fault threshold
    pub fn with_max_consecutive_bus_faults(mut self, count: u32) -> Self {
        self.max_consecutive_bus_faults = count;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::InvalidLoop("interval_ms must be positive"));
        }
        if self.overrun_sleep_ms == 0 {
            return Err(ConfigError::InvalidLoop("overrun_sleep_ms must be positive"));
        }
        if self.average_window == 0 || self.average_window + 1 > MAX_HISTORY {
            return Err(ConfigError::InvalidLoop(
                "average_window must be between 1 and 128",
            ));
        }
        if self.poll.max_polls == 0 {
            return Err(ConfigError::InvalidLoop("poll.max_polls must be positive"));
        }
        if self.max_consecutive_bus_faults == 0 {
            return Err(ConfigError::InvalidLoop(
                "max_consecutive_bus_faults must be positive",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Log Config
// ============================================================================

/// Data log settings
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LogConfig {
    /// Directory holding the CSV files and the error log
    pub directory: PathBuf,
    /// File name prefix
    pub prefix: ShortString,
    /// Size at which a new file is started
    pub rotate_bytes: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("Logs"),
            prefix: short_string("temp_log"),
            rotate_bytes: 4 * 1024 * 1024,
        }
    }
}

impl LogConfig {
    /// Set the log directory
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Set the file name prefix
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = short_string(prefix);
        self
    }

    /// Set the rotation threshold
    pub fn with_rotate_bytes(mut self, bytes: u64) -> Self {
        self.rotate_bytes = bytes;
        self
    }

    /// Log directory as a path.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.as_os_str().is_empty() {
            return Err(ConfigError::InvalidLoop("log.directory must not be empty"));
        }
        if self.rotate_bytes == 0 {
            return Err(ConfigError::InvalidLoop("log.rotate_bytes must be positive"));
        }
        if self.prefix.is_empty() || self.prefix.contains(['/', '\\']) {
            return Err(ConfigError::InvalidLoop(
                "log.prefix must be a non-empty file name",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Channel Config
// ============================================================================

/// One thermocouple channel
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelConfig {
    /// Name used in logs and axis references
    pub name: ShortString,
    /// Chip-select GPIO (BCM numbering)
    pub chip_select: u8,
    /// Thermocouple type
    #[cfg_attr(feature = "serde", serde(default = "default_thermocouple"))]
    pub thermocouple: ThermocoupleType,
    /// Samples averaged per conversion
    #[cfg_attr(feature = "serde", serde(default = "default_averaging"))]
    pub averaging: u8,
    /// Mains rejection frequency in hertz
    #[cfg_attr(feature = "serde", serde(default = "default_rejection_hz"))]
    pub rejection_hz: u16,
    /// Probe position; supplies the calibration preset
    #[cfg_attr(feature = "serde", serde(default))]
    pub kind: Option<ChannelKind>,
    /// Explicit calibration, overriding the kind's preset
    #[cfg_attr(feature = "serde", serde(default))]
    pub calibration: Option<Calibration>,
    /// Chip or host-side NIST linearization
    #[cfg_attr(feature = "serde", serde(default))]
    pub linearization: Linearization,
    /// One-shot or continuous conversion
    #[cfg_attr(feature = "serde", serde(default))]
    pub conversion: ConversionMode,
}

#[cfg(feature = "serde")]
fn default_thermocouple() -> ThermocoupleType {
    ThermocoupleType::T
}

#[cfg(feature = "serde")]
fn default_averaging() -> u8 {
    1
}

#[cfg(feature = "serde")]
fn default_rejection_hz() -> u16 {
    60
}

impl ChannelConfig {
    /// A type-T, single-sample, 60 Hz channel.
    pub fn new(name: &str, chip_select: u8) -> Self {
        Self {
            name: short_string(name),
            chip_select,
            thermocouple: ThermocoupleType::T,
            averaging: 1,
            rejection_hz: 60,
            kind: None,
            calibration: None,
            linearization: Linearization::Device,
            conversion: ConversionMode::OneShot,
        }
    }

    /// Set the thermocouple type
    pub fn with_thermocouple(mut self, thermocouple: ThermocoupleType) -> Self {
        self.thermocouple = thermocouple;
        self
    }

    /// Set the averaging count
    pub fn with_averaging(mut self, samples: u8) -> Self {
        self.averaging = samples;
        self
    }

    /// Set the rejection frequency
    pub fn with_rejection_hz(mut self, hz: u16) -> Self {
        self.rejection_hz = hz;
        self
    }

    /// Set the probe position
    pub fn with_kind(mut self, kind: ChannelKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set an explicit calibration
    pub fn with_calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Set the linearization source
    pub fn with_linearization(mut self, linearization: Linearization) -> Self {
        self.linearization = linearization;
        self
    }

    /// Set the conversion mode
    pub fn with_conversion(mut self, conversion: ConversionMode) -> Self {
        self.conversion = conversion;
        self
    }

    /// Explicit calibration, else the kind's preset, else none.
    pub fn effective_calibration(&self) -> Calibration {
        self.calibration
            .or(self.kind.map(ChannelKind::calibration))
            .unwrap_or_default()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::InvalidLoop("channel names must not be empty"));
        }
        registers::avgsel_bits(self.averaging)
            .ok_or(ConfigError::InvalidAveraging(self.averaging))?;
        NoiseRejection::from_hz(self.rejection_hz)?;
        if !self.effective_calibration().is_valid() {
            return Err(ConfigError::InvalidLoop(
                "calibration span must have a finite, non-zero raw range",
            ));
        }
        if self.linearization == Linearization::Nist && nist::table(self.thermocouple).is_none() {
            return Err(ConfigError::NoNistTable(self.thermocouple));
        }
        Ok(())
    }
}

// ============================================================================
// Axis Config
// ============================================================================

/// How an axis drives its actuator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ActuationMode {
    /// Energize while the PID output is positive
    #[default]
    Pid,
    /// Always energized
    ForceOn,
    /// Always de-energized
    ForceOff,
}

impl ActuationMode {
    /// Actuator state for a PID output.
    pub fn decide(self, output: f64) -> bool {
        match self {
            ActuationMode::Pid => output > 0.0,
            ActuationMode::ForceOn => true,
            ActuationMode::ForceOff => false,
        }
    }
}

/// One heater axis: a PID fed by one channel driving one output
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AxisConfig {
    /// Name used in logs
    pub name: ShortString,
    /// Channel whose calibrated value feeds the PID
    pub channel: ShortString,
    /// Output GPIO (BCM numbering)
    pub pin: u8,
    /// Output is energized by driving the pin low
    #[cfg_attr(feature = "serde", serde(default))]
    pub active_low: bool,
    /// Actuation policy
    #[cfg_attr(feature = "serde", serde(default))]
    pub actuation: ActuationMode,
    /// Controller gains, setpoint and limits
    #[cfg_attr(feature = "serde", serde(default))]
    pub pid: PidConfig,
}

impl AxisConfig {
    /// An axis with the rig's default gains.
    pub fn new(name: &str, channel: &str, pin: u8) -> Self {
        Self {
            name: short_string(name),
            channel: short_string(channel),
            pin,
            active_low: false,
            actuation: ActuationMode::Pid,
            pid: PidConfig::default(),
        }
    }

    /// Set the setpoint
    pub fn with_setpoint(mut self, setpoint: f64) -> Self {
        self.pid.setpoint = setpoint;
        self
    }

    /// Set the PID configuration
    pub fn with_pid(mut self, pid: PidConfig) -> Self {
        self.pid = pid;
        self
    }

    /// Set the actuation policy
    pub fn with_actuation(mut self, actuation: ActuationMode) -> Self {
        self.actuation = actuation;
        self
    }

    /// Set the output polarity
    pub fn with_active_low(mut self, active_low: bool) -> Self {
        self.active_low = active_low;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
