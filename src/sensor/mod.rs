//! MAX31856 thermocouple channel driver.
//!
//! Wraps one chip on a [`RegisterBus`] and tracks the one-shot conversion
//! state machine:
//!
//! ```text
//!            start_conversion()              poll_ready() == true
//!   Idle ─────────────────────► Pending ───────────────────────► Ready
//!     ▲                           ▲  │                              │
//!     │                           │  └── timeout / bus error ──► Fault
//!     │                           └──────── start_conversion() ─────┘
//! ```
//!
//! `Fault` is reachable from any state on a bus error or a hard fault in the
//! status register; starting a new conversion is the way out.
//!
//! # Example
//!
//! ```rust
//! use cryotherm::hal::{MockDelay, MockSpi};
//! use cryotherm::sensor::{Max31856, PollBudget, ThermocoupleType};
//!
//! let spi = MockSpi::new();
//! spi.queue_temperature_raw(-4096);
//!
//! let mut tc = Max31856::new(spi.clone());
//! tc.init(ThermocoupleType::T).unwrap();
//! tc.configure(ThermocoupleType::T, 4, 60).unwrap();
//!
//! tc.start_conversion().unwrap();
//! tc.wait_ready(&mut MockDelay::new(), PollBudget::default()).unwrap();
//! assert_eq!(tc.read_temperature().unwrap(), -1.0);
//! ```

pub mod faults;
pub mod nist;
pub mod registers;

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;

use crate::bus::{BusFault, RegisterBus};
use crate::error::{ConfigError, SensorError};
use registers as reg;

pub use faults::FaultSet;

/// Thermocouple type codes written to CR1 bits 0-3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ThermocoupleType {
    /// Type B.
    B,
    /// Type E.
    E,
    /// Type J.
    J,
    /// Type K.
    #[default]
    K,
    /// Type N.
    N,
    /// Type R.
    R,
    /// Type S.
    S,
    /// Type T.
    T,
    /// Voltage mode, gain 8.
    G8,
    /// Voltage mode, gain 32.
    G32,
}

impl ThermocoupleType {
    /// Register code.
    pub const fn code(self) -> u8 {
        match self {
            ThermocoupleType::B => 0b0000,
            ThermocoupleType::E => 0b0001,
            ThermocoupleType::J => 0b0010,
            ThermocoupleType::K => 0b0011,
            ThermocoupleType::N => 0b0100,
            ThermocoupleType::R => 0b0101,
            ThermocoupleType::S => 0b0110,
            ThermocoupleType::T => 0b0111,
            ThermocoupleType::G8 => 0b1000,
            ThermocoupleType::G32 => 0b1100,
        }
    }

    /// Decodes the low nibble of CR1.
    ///
    /// The chip treats `0b11xx` as G32 and `0b10xx` as G8.
    pub const fn from_code(code: u8) -> Self {
        match code & 0x0F {
            0b0000 => ThermocoupleType::B,
            0b0001 => ThermocoupleType::E,
            0b0010 => ThermocoupleType::J,
            0b0011 => ThermocoupleType::K,
            0b0100 => ThermocoupleType::N,
            0b0101 => ThermocoupleType::R,
            0b0110 => ThermocoupleType::S,
            0b0111 => ThermocoupleType::T,
            c if c & 0b1100 == 0b1100 => ThermocoupleType::G32,
            _ => ThermocoupleType::G8,
        }
    }
}

/// Noise rejection filter frequency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NoiseRejection {
    /// 50 Hz mains.
    Hz50,
    /// 60 Hz mains (power-on default).
    #[default]
    Hz60,
}

impl NoiseRejection {
    /// Validates a frequency in hertz.
    pub fn from_hz(hz: u16) -> Result<Self, ConfigError> {
        match hz {
            50 => Ok(NoiseRejection::Hz50),
            60 => Ok(NoiseRejection::Hz60),
            other => Err(ConfigError::InvalidRejection(other)),
        }
    }

    /// Frequency in hertz.
    pub const fn hz(self) -> u16 {
        match self {
            NoiseRejection::Hz50 => 50,
            NoiseRejection::Hz60 => 60,
        }
    }
}

/// Conversion state of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConversionState {
    /// No conversion requested yet.
    #[default]
    Idle,
    /// One-shot conversion in progress.
    ConversionPending,
    /// Result registers hold a finished conversion.
    Ready,
    /// Last operation failed; a new conversion is needed.
    Fault,
}

/// Bounded wait for a one-shot conversion.
///
/// The nominal conversion takes about 160 ms (longer with averaging), so
/// the default budget of 100 polls at 10 ms gives about a second.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PollBudget {
    /// Maximum number of status polls.
    pub max_polls: u32,
    /// Delay between polls in milliseconds.
    pub interval_ms: u32,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self {
            max_polls: 100,
            interval_ms: 10,
        }
    }
}

impl PollBudget {
    /// Set the poll count
    pub fn with_max_polls(mut self, polls: u32) -> Self {
        self.max_polls = polls;
        self
    }

    /// Set the delay between polls
    pub fn with_interval_ms(mut self, ms: u32) -> Self {
        self.interval_ms = ms;
        self
    }
}

/// Driver for one MAX31856 on a shared SPI bus.
#[derive(Debug)]
pub struct Max31856<SPI> {
    bus: RegisterBus<SPI>,
    thermocouple: ThermocoupleType,
    state: ConversionState,
    last_raw: Option<i32>,
    last_faults: FaultSet,
}

impl<SPI: SpiDevice> Max31856<SPI> {
    /// Creates a driver. No bus traffic happens until [`init`](Self::init).
    pub fn new(spi: SPI) -> Self {
        Self {
            bus: RegisterBus::new(spi),
            thermocouple: ThermocoupleType::default(),
            state: ConversionState::Idle,
            last_raw: None,
            last_faults: FaultSet::default(),
        }
    }

    /// Power-on setup: unmask every fault, enable open-circuit detection
    /// and select the thermocouple type.
    pub fn init(&mut self, thermocouple: ThermocoupleType) -> Result<(), SensorError> {
        self.guard(|bus| {
            bus.write(reg::MASK, 0x00)?;
            bus.write(reg::CR0, reg::CR0_OCFAULT0)?;
            bus.update(reg::CR1, reg::CR1_TYPE_KEEP, thermocouple.code())?;
            Ok(())
        })?;
        self.thermocouple = thermocouple;
        self.state = ConversionState::Idle;
        Ok(())
    }

    /// Sets type, averaging and noise rejection.
    ///
    /// Both values are validated before any register is touched. Only the
    /// affected bit fields change; the rest of CR0 and CR1 is preserved.
    pub fn configure(
        &mut self,
        thermocouple: ThermocoupleType,
        averaging: u8,
        rejection_hz: u16,
    ) -> Result<(), SensorError> {
        let avgsel = reg::avgsel_bits(averaging).ok_or(ConfigError::InvalidAveraging(averaging))?;
        let rejection = NoiseRejection::from_hz(rejection_hz)?;

        self.guard(|bus| {
            bus.update(
                reg::CR1,
                reg::CR1_AVGSEL_KEEP & reg::CR1_TYPE_KEEP,
                avgsel | thermocouple.code(),
            )?;
            let filter = match rejection {
                NoiseRejection::Hz50 => reg::CR0_50HZ,
                NoiseRejection::Hz60 => 0,
            };
            bus.update(reg::CR0, !reg::CR0_50HZ, filter)?;
            Ok(())
        })?;
        self.thermocouple = thermocouple;
        tracing::debug!(?thermocouple, averaging, rejection_hz, "configured");
        Ok(())
    }

    /// Triggers a one-shot conversion.
    ///
    /// Clears the auto-convert bit and sets the one-shot bit. Allowed from
    /// any state; from `Fault` this is the retry path.
    pub fn start_conversion(&mut self) -> Result<(), SensorError> {
        self.guard(|bus| {
            bus.update(reg::CR0, !reg::CR0_AUTOCONVERT, reg::CR0_1SHOT)?;
            Ok(())
        })?;
        self.state = ConversionState::ConversionPending;
        Ok(())
    }

    /// Switches to continuous conversion; results are always readable.
    pub fn start_continuous(&mut self) -> Result<(), SensorError> {
        self.guard(|bus| {
            bus.update(reg::CR0, !reg::CR0_1SHOT, reg::CR0_AUTOCONVERT)?;
            Ok(())
        })?;
        self.state = ConversionState::Ready;
        Ok(())
    }

    /// Reads the one-shot bit once. Returns true when the result is ready.
    pub fn poll_ready(&mut self) -> Result<bool, SensorError> {
        if self.state == ConversionState::Ready {
            return Ok(true);
        }
        let cr0 = self.guard(|bus| bus.read_u8(reg::CR0))?;
        let ready = cr0 & reg::CR0_1SHOT == 0;
        if ready {
            self.state = ConversionState::Ready;
        }
        Ok(ready)
    }

    /// Polls until ready or the budget runs out.
    ///
    /// On timeout the channel moves to `Fault` and
    /// [`SensorError::ConversionTimeout`] is returned.
    pub fn wait_ready<D: DelayNs>(
        &mut self,
        delay: &mut D,
        budget: PollBudget,
    ) -> Result<(), SensorError> {
        for poll in 0..budget.max_polls {
            if self.poll_ready()? {
                return Ok(());
            }
            if poll + 1 < budget.max_polls {
                delay.delay_ms(budget.interval_ms);
            }
        }
        self.state = ConversionState::Fault;
        Err(SensorError::ConversionTimeout {
            polls: budget.max_polls,
        })
    }

    /// Linearized thermocouple temperature in °C (`raw / 4096`).
    ///
    /// Only valid in `Ready`.
    pub fn read_temperature(&mut self) -> Result<f64, SensorError> {
        if self.state != ConversionState::Ready {
            return Err(SensorError::NotReady { state: self.state });
        }
        let raw = self.guard(|bus| bus.read_i24(reg::LTCBH))?;
        self.last_raw = Some(raw);
        Ok(raw as f64 * reg::TC_SCALE)
    }

    /// Cold-junction temperature in °C (`raw / 256`).
    pub fn read_reference_temperature(&mut self) -> Result<f64, SensorError> {
        let raw = self.guard(|bus| bus.read_i16(reg::CJTH))?;
        Ok(raw as f64 * reg::CJ_SCALE)
    }

    /// Reads and decodes the fault status register.
    ///
    /// A hard fault moves the channel to `Fault`.
    pub fn read_faults(&mut self) -> Result<FaultSet, SensorError> {
        let bits = self.guard(|bus| bus.read_u8(reg::SR))?;
        let faults = FaultSet::from_bits(bits);
        self.last_faults = faults;
        if faults.is_hard() {
            self.state = ConversionState::Fault;
        }
        Ok(faults)
    }

    /// Temperature from the NIST polynomials instead of the chip's
    /// linearization, using the current result and cold-junction registers.
    pub fn nist_temperature(&mut self) -> Result<f64, SensorError> {
        let measured = self.read_temperature()?;
        let reference = self.read_reference_temperature()?;
        nist::nist_temperature(self.thermocouple, measured, reference)
    }

    /// Number of samples averaged per conversion.
    pub fn averaging(&mut self) -> Result<u8, SensorError> {
        let cr1 = self.guard(|bus| bus.read_u8(reg::CR1))?;
        let bits = cr1 & !reg::CR1_AVGSEL_KEEP;
        reg::avgsel_samples(bits).ok_or_else(|| ConfigError::UnknownAveragingBits(bits).into())
    }

    /// Active noise rejection filter.
    pub fn noise_rejection(&mut self) -> Result<NoiseRejection, SensorError> {
        let cr0 = self.guard(|bus| bus.read_u8(reg::CR0))?;
        Ok(if cr0 & reg::CR0_50HZ != 0 {
            NoiseRejection::Hz50
        } else {
            NoiseRejection::Hz60
        })
    }

    /// Thermocouple type as programmed in CR1.
    pub fn read_thermocouple_type(&mut self) -> Result<ThermocoupleType, SensorError> {
        let cr1 = self.guard(|bus| bus.read_u8(reg::CR1))?;
        Ok(ThermocoupleType::from_code(cr1))
    }

    /// Thermocouple fault thresholds `(low, high)` in °C, 1/16 °C steps.
    pub fn temperature_thresholds(&mut self) -> Result<(f64, f64), SensorError> {
        let (low, high) = self.guard(|bus| Ok((bus.read_i16(reg::LTLFTH)?, bus.read_i16(reg::LTHFTH)?)))?;
        Ok((
            low as f64 * reg::THRESHOLD_SCALE,
            high as f64 * reg::THRESHOLD_SCALE,
        ))
    }

    /// Programs the thermocouple fault thresholds.
    ///
    /// Both values must be finite and within -2048 to 2047.9375 °C; nothing
    /// is written otherwise.
    pub fn set_temperature_thresholds(&mut self, low: f64, high: f64) -> Result<(), SensorError> {
        let low = threshold_counts::<i16>(low, reg::THRESHOLD_SCALE)?.to_be_bytes();
        let high = threshold_counts::<i16>(high, reg::THRESHOLD_SCALE)?.to_be_bytes();
        self.guard(|bus| {
            bus.write(reg::LTHFTH, high[0])?;
            bus.write(reg::LTHFTL, high[1])?;
            bus.write(reg::LTLFTH, low[0])?;
            bus.write(reg::LTLFTL, low[1])
        })
    }

    /// Cold-junction fault thresholds `(low, high)` in whole °C.
    pub fn reference_temperature_thresholds(&mut self) -> Result<(f64, f64), SensorError> {
        let (low, high) = self.guard(|bus| Ok((bus.read_i8(reg::CJLF)?, bus.read_i8(reg::CJHF)?)))?;
        Ok((low as f64, high as f64))
    }

    /// Programs the cold-junction fault thresholds.
    ///
    /// Both values must be finite and within -128 to 127 °C; nothing is
    /// written otherwise.
    pub fn set_reference_temperature_thresholds(
        &mut self,
        low: f64,
        high: f64,
    ) -> Result<(), SensorError> {
        let low = threshold_counts::<i8>(low, 1.0)?.to_be_bytes()[0];
        let high = threshold_counts::<i8>(high, 1.0)?.to_be_bytes()[0];
        self.guard(|bus| {
            bus.write(reg::CJLF, low)?;
            bus.write(reg::CJHF, high)
        })
    }

    /// Current conversion state.
    pub fn state(&self) -> ConversionState {
        self.state
    }

    /// Type selected by the last `init` or `configure`.
    pub fn thermocouple(&self) -> ThermocoupleType {
        self.thermocouple
    }

    /// Raw 24-bit value of the last temperature read.
    pub fn last_raw(&self) -> Option<i32> {
        self.last_raw
    }

    /// Faults from the last status read.
    pub fn last_faults(&self) -> FaultSet {
        self.last_faults
    }

    /// Gives back the SPI device.
    pub fn release(self) -> SPI {
        self.bus.release()
    }

    /// Runs bus work; a bus fault moves the channel to `Fault`.
    fn guard<T>(
        &mut self,
        f: impl FnOnce(&mut RegisterBus<SPI>) -> Result<T, BusFault>,
    ) -> Result<T, SensorError> {
        f(&mut self.bus).map_err(|fault| {
            self.state = ConversionState::Fault;
            SensorError::Bus(fault)
        })
    }
}

/// Register counts for a threshold of `celsius` in steps of `step` °C.
fn threshold_counts<T: TryFrom<i64>>(celsius: f64, step: f64) -> Result<T, ConfigError> {
    let counts = (celsius / step).trunc();
    if !counts.is_finite() {
        return Err(ConfigError::InvalidThreshold(celsius));
    }
    T::try_from(counts as i64).map_err(|_| ConfigError::InvalidThreshold(celsius))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::{MockDelay, MockSpi};

    fn ready_sensor(raw: i32) -> (MockSpi, Max31856<MockSpi>) {
        let spi = MockSpi::new();
        spi.queue_temperature_raw(raw);
        let mut tc = Max31856::new(spi.clone());
        tc.init(ThermocoupleType::K).unwrap();
        tc.start_conversion().unwrap();
        tc.wait_ready(&mut MockDelay::new(), PollBudget::default())
            .unwrap();
        (spi, tc)
    }

    // =========================================================================
    // Type codes
    // =========================================================================

    #[test]
    fn type_codes_round_trip() {
        use ThermocoupleType::*;
        for tc in [B, E, J, K, N, R, S, T, G8, G32] {
            assert_eq!(ThermocoupleType::from_code(tc.code()), tc);
        }
        assert_eq!(ThermocoupleType::from_code(0b1010), G8);
        assert_eq!(ThermocoupleType::from_code(0b1111), G32);
    }

    #[test]
    fn noise_rejection_from_hz() {
        assert_eq!(NoiseRejection::from_hz(50), Ok(NoiseRejection::Hz50));
        assert_eq!(NoiseRejection::from_hz(60), Ok(NoiseRejection::Hz60));
        assert_eq!(
            NoiseRejection::from_hz(55),
            Err(ConfigError::InvalidRejection(55))
        );
    }

    // =========================================================================
    // Init / configure
    // =========================================================================

    #[test]
    fn init_writes_power_on_sequence() {
        let spi = MockSpi::new();
        spi.set_register(reg::CR1, 0xF3);
        let mut tc = Max31856::new(spi.clone());
        tc.init(ThermocoupleType::T).unwrap();

        assert_eq!(spi.register(reg::MASK), 0x00);
        assert_eq!(spi.register(reg::CR0), reg::CR0_OCFAULT0);
        // upper nibble kept, type replaced
        assert_eq!(spi.register(reg::CR1), 0xF7);
        assert_eq!(tc.state(), ConversionState::Idle);
    }

    #[test]
    fn configure_merges_bits() {
        let spi = MockSpi::new();
        let mut tc = Max31856::new(spi.clone());
        tc.init(ThermocoupleType::K).unwrap();
        spi.set_register(reg::CR1, 0x80 | 0x03);

        tc.configure(ThermocoupleType::T, 8, 50).unwrap();
        assert_eq!(spi.register(reg::CR1), 0x80 | 0x30 | 0x07);
        assert_eq!(
            spi.register(reg::CR0),
            reg::CR0_OCFAULT0 | reg::CR0_50HZ
        );

        tc.configure(ThermocoupleType::T, 1, 60).unwrap();
        assert_eq!(spi.register(reg::CR1), 0x80 | 0x07);
        assert_eq!(spi.register(reg::CR0), reg::CR0_OCFAULT0);

        assert_eq!(tc.averaging().unwrap(), 1);
        assert_eq!(tc.noise_rejection().unwrap(), NoiseRejection::Hz60);
        assert_eq!(tc.read_thermocouple_type().unwrap(), ThermocoupleType::T);
    }

    #[test]
    fn invalid_averaging_touches_nothing() {
        let spi = MockSpi::new();
        let mut tc = Max31856::new(spi.clone());
        tc.init(ThermocoupleType::K).unwrap();
        tc.configure(ThermocoupleType::K, 4, 60).unwrap();
        let writes_before = spi.writes().len();
        let regs_before = spi.registers();

        for bad in [0u8, 3, 5, 6, 7, 9, 15, 17, 32, 255] {
            let err = tc.configure(ThermocoupleType::J, bad, 50).unwrap_err();
            assert_eq!(
                err,
                SensorError::Configuration(ConfigError::InvalidAveraging(bad))
            );
        }
        assert_eq!(spi.writes().len(), writes_before);
        assert_eq!(spi.registers(), regs_before);
        assert_eq!(tc.averaging().unwrap(), 4);
    }

    #[test]
    fn invalid_rejection_touches_nothing() {
        let spi = MockSpi::new();
        let mut tc = Max31856::new(spi.clone());
        tc.init(ThermocoupleType::K).unwrap();
        let writes_before = spi.writes().len();

        let err = tc.configure(ThermocoupleType::K, 2, 400).unwrap_err();
        assert_eq!(
            err,
            SensorError::Configuration(ConfigError::InvalidRejection(400))
        );
        assert_eq!(spi.writes().len(), writes_before);
    }

    #[test]
    fn unknown_averaging_pattern_is_reported() {
        let spi = MockSpi::new();
        spi.set_register(reg::CR1, 0x70);
        let mut tc = Max31856::new(spi);
        assert_eq!(
            tc.averaging(),
            Err(SensorError::Configuration(ConfigError::UnknownAveragingBits(
                0x70
            )))
        );
    }

    // =========================================================================
    // Conversion state machine
    // =========================================================================

    #[test]
    fn start_conversion_sets_one_shot_clears_autoconvert() {
        let spi = MockSpi::new();
        let mut tc = Max31856::new(spi.clone());
        tc.init(ThermocoupleType::K).unwrap();
        tc.start_continuous().unwrap();
        assert_eq!(
            spi.register(reg::CR0) & reg::CR0_AUTOCONVERT,
            reg::CR0_AUTOCONVERT
        );

        spi.stick_conversion(true);
        tc.start_conversion().unwrap();
        let cr0 = spi.register(reg::CR0);
        assert_eq!(cr0 & reg::CR0_AUTOCONVERT, 0);
        assert_eq!(cr0 & reg::CR0_1SHOT, reg::CR0_1SHOT);
        assert_eq!(tc.state(), ConversionState::ConversionPending);
    }

    #[test]
    fn poll_ready_follows_one_shot_bit() {
        let spi = MockSpi::new().with_conversion_polls(2);
        let mut tc = Max31856::new(spi.clone());
        tc.init(ThermocoupleType::K).unwrap();
        tc.start_conversion().unwrap();

        assert!(!tc.poll_ready().unwrap());
        assert!(!tc.poll_ready().unwrap());
        assert!(tc.poll_ready().unwrap());
        assert_eq!(tc.state(), ConversionState::Ready);
    }

    #[test]
    fn read_before_ready_is_rejected() {
        let spi = MockSpi::new();
        let mut tc = Max31856::new(spi);
        tc.init(ThermocoupleType::K).unwrap();
        assert_eq!(
            tc.read_temperature(),
            Err(SensorError::NotReady {
                state: ConversionState::Idle
            })
        );
        tc.start_conversion().unwrap();
        assert_eq!(
            tc.read_temperature(),
            Err(SensorError::NotReady {
                state: ConversionState::ConversionPending
            })
        );
    }

    #[test]
    fn timeout_after_budget() {
        let spi = MockSpi::new();
        spi.stick_conversion(true);
        let mut tc = Max31856::new(spi.clone());
        tc.init(ThermocoupleType::K).unwrap();
        tc.start_conversion().unwrap();

        let mut delay = MockDelay::new();
        let budget = PollBudget::default().with_max_polls(5).with_interval_ms(10);
        let err = tc.wait_ready(&mut delay, budget).unwrap_err();

        assert_eq!(err, SensorError::ConversionTimeout { polls: 5 });
        assert_eq!(tc.state(), ConversionState::Fault);
        assert_eq!(spi.cr0_polls(), 5);
        assert_eq!(delay.total_ms(), 40);
    }

    #[test]
    fn fault_state_retries_with_new_conversion() {
        let spi = MockSpi::new();
        spi.stick_conversion(true);
        spi.queue_temperature_raw(800);
        let mut tc = Max31856::new(spi.clone());
        tc.init(ThermocoupleType::K).unwrap();
        tc.start_conversion().unwrap();
        let budget = PollBudget::default().with_max_polls(3);
        assert!(tc.wait_ready(&mut MockDelay::new(), budget).is_err());

        spi.stick_conversion(false);
        tc.start_conversion().unwrap();
        assert_eq!(tc.state(), ConversionState::ConversionPending);
        tc.wait_ready(&mut MockDelay::new(), budget).unwrap();
        assert_eq!(tc.read_temperature().unwrap(), 800.0 / 4096.0);
    }

    #[test]
    fn bus_fault_moves_to_fault_state() {
        let (spi, mut tc) = ready_sensor(100);
        spi.fail_next(1);
        assert!(matches!(
            tc.read_temperature(),
            Err(SensorError::Bus(_))
        ));
        assert_eq!(tc.state(), ConversionState::Fault);
    }

    // =========================================================================
    // Decoding
    // =========================================================================

    #[test]
    fn temperature_scaling() {
        for raw in [0, 1, 100, -1, -4096, 4096 * 25, -(4096 * 200), 0x7F_FFFF, -0x80_0000] {
            let (_, mut tc) = ready_sensor(raw);
            assert_eq!(tc.read_temperature().unwrap(), raw as f64 / 4096.0);
            assert_eq!(tc.last_raw(), Some(raw));
        }
    }

    #[test]
    fn negative_raw_is_negative_degrees() {
        let (_, mut tc) = ready_sensor(-4096);
        assert_eq!(tc.read_temperature().unwrap(), -1.0);
    }

    #[test]
    fn reference_temperature_scaling() {
        for raw in [0i16, 256, -256, 6400, -1, i16::MAX, i16::MIN] {
            let spi = MockSpi::new();
            spi.set_reference_raw(raw);
            let mut tc = Max31856::new(spi);
            assert_eq!(
                tc.read_reference_temperature().unwrap(),
                raw as f64 / 256.0
            );
        }
    }

    #[test]
    fn hard_fault_marks_channel() {
        let (spi, mut tc) = ready_sensor(0);
        spi.set_status(0x01);
        let faults = tc.read_faults().unwrap();
        assert!(faults.open_tc);
        assert_eq!(tc.state(), ConversionState::Fault);
        assert_eq!(tc.last_faults(), faults);
    }

    #[test]
    fn threshold_fault_keeps_ready() {
        let (spi, mut tc) = ready_sensor(0);
        spi.set_status(0x08);
        assert!(tc.read_faults().unwrap().tc_high);
        assert_eq!(tc.state(), ConversionState::Ready);
    }

    #[test]
    fn nist_conversion_uses_cold_junction() {
        let (spi, mut tc) = ready_sensor(100 * 4096);
        spi.set_reference_raw(25 * 256);
        let t = tc.nist_temperature().unwrap();
        assert!((t - 100.0).abs() < 1.0, "got {t}");
    }

    // =========================================================================
    // Thresholds
    // =========================================================================

    #[test]
    fn temperature_thresholds_round_trip() {
        let spi = MockSpi::new();
        let mut tc = Max31856::new(spi.clone());
        tc.set_temperature_thresholds(-200.5, 150.25).unwrap();
        assert_eq!(tc.temperature_thresholds().unwrap(), (-200.5, 150.25));
        assert_eq!(spi.register(reg::LTHFTH), 0x09);
        assert_eq!(spi.register(reg::LTHFTL), 0x64);
    }

    #[test]
    fn reference_thresholds_round_trip() {
        let spi = MockSpi::new();
        let mut tc = Max31856::new(spi.clone());
        tc.set_reference_temperature_thresholds(-20.0, 70.0).unwrap();
        assert_eq!(
            tc.reference_temperature_thresholds().unwrap(),
            (-20.0, 70.0)
        );
        assert_eq!(spi.register(reg::CJLF), 0xEC);
    }

    #[test]
    fn threshold_range_edges_accepted() {
        let spi = MockSpi::new();
        let mut tc = Max31856::new(spi.clone());
        tc.set_temperature_thresholds(-2048.0, 2047.9375).unwrap();
        assert_eq!(tc.temperature_thresholds().unwrap(), (-2048.0, 2047.9375));
        tc.set_reference_temperature_thresholds(-128.0, 127.0).unwrap();
        assert_eq!(
            tc.reference_temperature_thresholds().unwrap(),
            (-128.0, 127.0)
        );
    }

    #[test]
    fn unrepresentable_thresholds_rejected_before_any_write() {
        let spi = MockSpi::new();
        let mut tc = Max31856::new(spi.clone());
        for (low, high) in [
            (f64::NAN, 100.0),
            (-100.0, f64::INFINITY),
            (-2049.0, 100.0),
            (-100.0, 2048.0),
        ] {
            let err = tc.set_temperature_thresholds(low, high).unwrap_err();
            assert!(matches!(
                err,
                SensorError::Configuration(ConfigError::InvalidThreshold(_))
            ));
        }
        for (low, high) in [(-129.0, 0.0), (0.0, 128.0), (f64::NAN, 0.0)] {
            let err = tc
                .set_reference_temperature_thresholds(low, high)
                .unwrap_err();
            assert!(matches!(
                err,
                SensorError::Configuration(ConfigError::InvalidThreshold(_))
            ));
        }
        assert!(spi.writes().is_empty());
        assert_eq!(tc.state(), ConversionState::Idle);
    }
}
