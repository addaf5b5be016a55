//! # cryotherm
//!
//! Thermocouple acquisition and bang-bang PID heater control for a
//! cryogenic probe rig, built on MAX31856 converters.
//!
//! ## Features
//!
//! - **Register driver**: MAX31856 over any `embedded-hal` SPI device, with
//!   one-shot and continuous conversion and fault decoding
//! - **Host linearization**: NIST ITS-90 polynomials with cold-junction
//!   compensation as an alternative to the chip's own result
//! - **Control loop**: per-axis PID driving an on/off heater output, with
//!   fixed-interval timing and a guaranteed safe state on exit
//! - **Data log**: averaged CSV rows with size-based file rotation
//!
//! ## Architecture
//!
//! The crate is structured to allow testing on desktop without hardware:
//!
//! - `bus` - Register framing over `SpiDevice`
//! - `sensor` - MAX31856 driver, fault flags and NIST tables
//! - `calibration` - Linear corrections per probe position
//! - `pid` - Positional PID controller
//! - `channel` - One configured sensor with its calibration
//! - `history` / `logger` - Ring buffer, averaging and CSV rotation
//! - `control` - The acquisition and control loop
//! - `hal` - Concrete implementations (mock for testing, rpi for hardware)
//!
//! ## Example
//!
//! ```rust
//! use cryotherm::{
//!     config::{AxisConfig, ChannelConfig, Config},
//!     control::{ControlLoop, Hardware, Shutdown},
//!     hal::{MockActuator, MockClock, MockDelay, MockSpi},
//! };
//!
//! let config = Config::default()
//!     .with_channels(vec![ChannelConfig::new("heat_ex", 16)])
//!     .with_axes(vec![AxisConfig::new("front", "heat_ex", 17).with_setpoint(-115.0)]);
//!
//! // Simulated chip already sitting at -100 °C
//! let spi = MockSpi::new().with_source(|| -100 * 4096);
//! let heater = MockActuator::new();
//! let clock = MockClock::new();
//!
//! let mut control = ControlLoop::new(
//!     &config,
//!     Hardware {
//!         channels: vec![spi],
//!         actuators: vec![heater.clone()],
//!         clock: clock.clone(),
//!         delay: MockDelay::with_clock(clock),
//!     },
//! )
//! .unwrap();
//!
//! let report = control.run_cycle().unwrap();
//! assert_eq!(report.record.temperatures, vec![Some(-100.0)]);
//! // Warmer than the setpoint: heater stays off
//! assert_eq!(report.record.energized, vec![false]);
//! ```

#![warn(missing_docs)]

/// Register framing for the MAX31856 SPI protocol.
pub mod bus;
/// Linear calibration per probe position.
pub mod calibration;
/// A configured sensor channel with calibration and fault bookkeeping.
pub mod channel;
/// Configuration structures and TOML defaults.
pub mod config;
/// The acquisition and control loop.
pub mod control;
/// Error types.
pub mod error;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Bounded history of control cycles and window averaging.
pub mod history;
/// Size-rotated CSV data log.
pub mod logger;
/// PID controller.
pub mod pid;
/// MAX31856 driver.
pub mod sensor;
/// Core traits for actuators, time and plotting.
pub mod traits;

pub use calibration::{Calibration, ChannelKind};
pub use channel::{ConversionMode, Linearization, Reading, SensorChannel};
pub use config::{ActuationMode, AxisConfig, ChannelConfig, Config, LogConfig, LoopConfig};
pub use control::{ControlLoop, CycleReport, Hardware, Shutdown};
pub use error::{BusFault, ConfigError, ControlError, LogError, SensorError};
pub use history::{AveragedRecord, ControlCycleRecord, History};
pub use logger::{ErrorLog, LogWriter};
pub use pid::{PidConfig, PidController};
pub use sensor::{ConversionState, FaultSet, Max31856, PollBudget, ThermocoupleType};
pub use traits::{Actuator, Clock, PlotSink};
