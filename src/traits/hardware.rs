//! Hardware abstraction traits for actuators and time.
//!
//! Sensors are reached through `embedded_hal::spi::SpiDevice` directly; the
//! traits here cover what `embedded-hal` does not: a heater or valve that is
//! either energized or not, and a millisecond clock.
//!
//! # Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`Actuator`] | Binary heater/valve output |
//! | [`Clock`] | Monotonic milliseconds plus wall-clock timestamps |
//!
//! # Example
//!
//! ```rust
//! use cryotherm::hal::MockPin;
//! use cryotherm::traits::{Actuator, DigitalActuator};
//!
//! let pin = MockPin::new();
//! let mut heater = DigitalActuator::new(pin.clone()).active_low(true);
//!
//! heater.set_energized(true).unwrap();
//! assert!(heater.is_energized());
//! assert!(!pin.is_high());
//! ```

use chrono::NaiveDateTime;
use embedded_hal::digital::OutputPin;

/// Binary output driving one heater or valve.
///
/// `true` means energized. Implementations must make
/// [`de_energize`](Self::de_energize) safe to call repeatedly.
pub trait Actuator {
    /// Error type for output operations.
    type Error: core::fmt::Debug;

    /// Drives the output.
    fn set_energized(&mut self, on: bool) -> Result<(), Self::Error>;

    /// Last state driven.
    fn is_energized(&self) -> bool;

    /// Forces the safe state.
    fn de_energize(&mut self) -> Result<(), Self::Error> {
        self.set_energized(false)
    }
}

/// Adapts an `embedded-hal` output pin into an [`Actuator`].
///
/// With `active_low` wiring the pin is driven low to energize, as on relay
/// boards that sink the coil current.
#[derive(Debug)]
pub struct DigitalActuator<P> {
    pin: P,
    active_low: bool,
    energized: bool,
}

impl<P: OutputPin> DigitalActuator<P> {
    /// Wraps a pin; active-high by default.
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            active_low: false,
            energized: false,
        }
    }

    /// Set the pin polarity
    pub fn active_low(mut self, active_low: bool) -> Self {
        self.active_low = active_low;
        self
    }

    /// The wrapped pin.
    pub fn pin(&self) -> &P {
        &self.pin
    }
}

impl<P: OutputPin> Actuator for DigitalActuator<P> {
    type Error = P::Error;

    fn set_energized(&mut self, on: bool) -> Result<(), P::Error> {
        if on != self.active_low {
            self.pin.set_high()?;
        } else {
            self.pin.set_low()?;
        }
        self.energized = on;
        Ok(())
    }

    fn is_energized(&self) -> bool {
        self.energized
    }
}

/// Time source.
///
/// `now_ms` is monotonic and drives the PID cadence and the cycle timer.
/// `wall_time` stamps records and log file names.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;

    /// Local wall-clock time.
    fn wall_time(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockPin;

    #[test]
    fn active_high_drives_pin_high() {
        let pin = MockPin::new();
        let mut act = DigitalActuator::new(pin.clone());
        act.set_energized(true).unwrap();
        assert!(pin.is_high());
        act.set_energized(false).unwrap();
        assert!(!pin.is_high());
        assert!(!act.is_energized());
    }

    #[test]
    fn active_low_inverts_pin() {
        let pin = MockPin::new();
        let mut act = DigitalActuator::new(pin.clone()).active_low(true);
        act.set_energized(true).unwrap();
        assert!(!pin.is_high());
        act.de_energize().unwrap();
        assert!(pin.is_high());
        assert!(!act.is_energized());
    }
}
