//! One configured thermocouple channel: driver, calibration and fault
//! bookkeeping.
//!
//! A cycle is split in two so every chip converts in parallel: the loop
//! calls [`SensorChannel::trigger`] on all channels first, then
//! [`SensorChannel::acquire`] on each in order.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;

use crate::calibration::Calibration;
use crate::config::{ChannelConfig, ShortString};
use crate::error::SensorError;
use crate::sensor::{ConversionState, Max31856, PollBudget, ThermocoupleType};

/// How a channel converts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ConversionMode {
    /// Triggered conversion every cycle.
    #[default]
    OneShot,
    /// Free-running conversion; results are read directly.
    Continuous,
}

/// Where the temperature comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Linearization {
    /// The chip's own linearized result.
    #[default]
    Device,
    /// NIST polynomials on the host, using the cold-junction temperature.
    Nist,
}

/// One reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Reading {
    /// Temperature before calibration.
    pub raw: f64,
    /// Temperature after calibration.
    pub calibrated: f64,
}

/// A sensor channel owned by the control loop.
#[derive(Debug)]
pub struct SensorChannel<SPI> {
    name: ShortString,
    driver: Max31856<SPI>,
    thermocouple: ThermocoupleType,
    averaging: u8,
    rejection_hz: u16,
    calibration: Calibration,
    linearization: Linearization,
    mode: ConversionMode,
    consecutive_bus_faults: u32,
}

impl<SPI: SpiDevice> SensorChannel<SPI> {
    /// Builds a channel from its configuration. No bus traffic yet.
    pub fn new(config: &ChannelConfig, spi: SPI) -> Self {
        Self {
            name: config.name.clone(),
            driver: Max31856::new(spi),
            thermocouple: config.thermocouple,
            averaging: config.averaging,
            rejection_hz: config.rejection_hz,
            calibration: config.effective_calibration(),
            linearization: config.linearization,
            mode: config.conversion,
            consecutive_bus_faults: 0,
        }
    }

    /// Power-on sequence followed by type, averaging and filter setup.
    pub fn setup(&mut self) -> Result<(), SensorError> {
        self.driver.init(self.thermocouple)?;
        self.driver
            .configure(self.thermocouple, self.averaging, self.rejection_hz)?;
        if self.mode == ConversionMode::Continuous {
            self.driver.start_continuous()?;
        }
        tracing::info!(
            channel = %self.name,
            thermocouple = ?self.thermocouple,
            averaging = self.averaging,
            mode = ?self.mode,
            "channel ready"
        );
        Ok(())
    }

    /// Starts this cycle's conversion.
    ///
    /// In continuous mode this only restarts conversion after a fault.
    pub fn trigger(&mut self) -> Result<(), SensorError> {
        let result = match self.mode {
            ConversionMode::OneShot => self.driver.start_conversion(),
            ConversionMode::Continuous if self.driver.state() != ConversionState::Ready => {
                self.driver.start_continuous()
            }
            ConversionMode::Continuous => Ok(()),
        };
        if matches!(&result, Err(e) if e.is_bus_fault()) {
            self.consecutive_bus_faults += 1;
        }
        result
    }

    /// Waits for the conversion, reads, checks faults and calibrates.
    pub fn acquire<D: DelayNs>(
        &mut self,
        delay: &mut D,
        budget: PollBudget,
    ) -> Result<Reading, SensorError> {
        let result = self.read(delay, budget);
        self.track(result)
    }

    fn read<D: DelayNs>(&mut self, delay: &mut D, budget: PollBudget) -> Result<Reading, SensorError> {
        if self.mode == ConversionMode::OneShot {
            self.driver.wait_ready(delay, budget)?;
        }
        let raw = match self.linearization {
            Linearization::Device => self.driver.read_temperature()?,
            Linearization::Nist => self.driver.nist_temperature()?,
        };
        let faults = self.driver.read_faults()?;
        if faults.is_hard() {
            return Err(SensorError::Faulted(faults));
        }
        if faults.any() {
            tracing::debug!(channel = %self.name, %faults, "threshold fault");
        }
        Ok(Reading {
            raw,
            calibrated: self.calibration.apply(raw),
        })
    }

    fn track<T>(&mut self, result: Result<T, SensorError>) -> Result<T, SensorError> {
        match &result {
            Err(e) if e.is_bus_fault() => self.consecutive_bus_faults += 1,
            _ => self.consecutive_bus_faults = 0,
        }
        result
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cycles in a row that ended in a bus fault. A successful trigger
    /// alone does not reset the count; a completed acquisition does.
    pub fn consecutive_bus_faults(&self) -> u32 {
        self.consecutive_bus_faults
    }

    /// Active calibration.
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Conversion mode.
    pub fn mode(&self) -> ConversionMode {
        self.mode
    }

    /// The underlying driver.
    pub fn driver(&mut self) -> &mut Max31856<SPI> {
        &mut self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::ChannelKind;
    use crate::config::short_string;
    use crate::hal::{MockDelay, MockSpi};

    fn config() -> ChannelConfig {
        ChannelConfig::new("chamber", 26)
    }

    #[test]
    fn one_shot_acquire_calibrates() {
        let spi = MockSpi::new();
        spi.queue_temperature_raw(-30 * 4096);
        let mut ch = SensorChannel::new(&config().with_kind(ChannelKind::Chamber), spi);
        ch.setup().unwrap();
        ch.trigger().unwrap();
        let r = ch.acquire(&mut MockDelay::new(), PollBudget::default()).unwrap();
        assert_eq!(r.raw, -30.0);
        assert!((r.calibrated - (-22.4)).abs() < 1e-9);
    }

    #[test]
    fn continuous_mode_reads_without_trigger_wait() {
        let spi = MockSpi::new();
        spi.queue_temperature_raw(4096);
        spi.queue_temperature_raw(2 * 4096);
        let cfg = config().with_conversion(ConversionMode::Continuous);
        let mut ch = SensorChannel::new(&cfg, spi.clone());
        ch.setup().unwrap();

        let mut delay = MockDelay::new();
        ch.trigger().unwrap();
        assert_eq!(ch.acquire(&mut delay, PollBudget::default()).unwrap().raw, 1.0);
        ch.trigger().unwrap();
        assert_eq!(ch.acquire(&mut delay, PollBudget::default()).unwrap().raw, 2.0);
        assert_eq!(delay.total_ms(), 0);
        assert_eq!(spi.cr0_polls(), 0);
    }

    #[test]
    fn hard_fault_is_an_error() {
        let spi = MockSpi::new();
        spi.queue_temperature_raw(0);
        let mut ch = SensorChannel::new(&config(), spi.clone());
        ch.setup().unwrap();
        spi.set_status(0x01);
        ch.trigger().unwrap();
        let err = ch.acquire(&mut MockDelay::new(), PollBudget::default()).unwrap_err();
        assert!(matches!(err, SensorError::Faulted(f) if f.open_tc));
        assert_eq!(ch.consecutive_bus_faults(), 0);
    }

    #[test]
    fn bus_faults_are_counted_and_reset() {
        let spi = MockSpi::new();
        let mut ch = SensorChannel::new(&config(), spi.clone());
        ch.setup().unwrap();

        spi.fail_next(2);
        assert!(ch.trigger().is_err());
        assert!(ch.trigger().is_err());
        assert_eq!(ch.consecutive_bus_faults(), 2);

        ch.trigger().unwrap();
        assert_eq!(ch.consecutive_bus_faults(), 2);
        ch.acquire(&mut MockDelay::new(), PollBudget::default()).unwrap();
        assert_eq!(ch.consecutive_bus_faults(), 0);
    }

    #[test]
    fn failed_reads_accumulate_across_cycles() {
        let spi = MockSpi::new();
        let mut ch = SensorChannel::new(&config(), spi.clone());
        ch.setup().unwrap();
        for expected in 1..=3 {
            ch.trigger().unwrap();
            spi.fail_next(1);
            let err = ch.acquire(&mut MockDelay::new(), PollBudget::default()).unwrap_err();
            assert!(err.is_bus_fault());
            assert_eq!(ch.consecutive_bus_faults(), expected);
        }
    }

    #[test]
    fn nist_linearization_uses_cold_junction() {
        let spi = MockSpi::new();
        spi.queue_temperature_raw(100 * 4096);
        spi.set_reference_raw(25 * 256);
        let cfg = ChannelConfig {
            name: short_string("tip"),
            thermocouple: ThermocoupleType::K,
            linearization: Linearization::Nist,
            ..config()
        };
        let mut ch = SensorChannel::new(&cfg, spi);
        ch.setup().unwrap();
        ch.trigger().unwrap();
        let r = ch.acquire(&mut MockDelay::new(), PollBudget::default()).unwrap();
        assert!((r.raw - 100.0).abs() < 1.0);
        assert_eq!(ch.name(), "tip");
    }
}
