//! Raspberry Pi wiring: one SPI bus shared by every sensor, a GPIO chip
//! select per sensor, and GPIO outputs for the heaters.
//!
//! The bus lives in a `RefCell` owned by [`RpiBoard`]; each channel gets an
//! `embedded_hal_bus::spi::RefCellDevice` that borrows it for exactly one
//! transaction and toggles its own chip select.

use std::cell::RefCell;

use embedded_hal_bus::spi::RefCellDevice;
use rppal::gpio::{Gpio, OutputPin as GpioPin};
use rppal::hal::Delay;
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use thiserror::Error;

use crate::traits::DigitalActuator;

/// MAX31856 SPI clock; the chip allows up to 5 MHz.
pub const DEFAULT_SPI_HZ: u32 = 500_000;

/// Sensor device on the shared bus.
pub type RpiSpiDevice<'a> = RefCellDevice<'a, Spi, GpioPin, Delay>;

/// Heater output on a GPIO pin.
pub type RpiActuator = DigitalActuator<GpioPin>;

/// Failure opening Pi peripherals.
#[derive(Debug, Error)]
pub enum RpiError {
    /// SPI bus could not be opened.
    #[error("SPI: {0}")]
    Spi(#[from] rppal::spi::Error),
    /// GPIO pin unavailable.
    #[error("GPIO: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}

/// Owner of the Pi's SPI bus and GPIO controller.
pub struct RpiBoard {
    gpio: Gpio,
    spi: RefCell<Spi>,
}

impl RpiBoard {
    /// Opens SPI0 in mode 1 at `clock_hz`.
    pub fn open(clock_hz: u32) -> Result<Self, RpiError> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, clock_hz, Mode::Mode1)?;
        let gpio = Gpio::new()?;
        tracing::info!(clock_hz, "opened SPI0");
        Ok(Self {
            gpio,
            spi: RefCell::new(spi),
        })
    }

    /// Device for the sensor whose chip select is on BCM pin `cs_pin`.
    pub fn channel(&self, cs_pin: u8) -> Result<RpiSpiDevice<'_>, RpiError> {
        let cs = self.gpio.get(cs_pin)?.into_output_high();
        RefCellDevice::new(&self.spi, cs, Delay::new()).map_err(|never| match never {})
    }

    /// Heater output on BCM pin `pin`, driven to its de-energized level.
    pub fn actuator(&self, pin: u8, active_low: bool) -> Result<RpiActuator, RpiError> {
        let out = if active_low {
            self.gpio.get(pin)?.into_output_high()
        } else {
            self.gpio.get(pin)?.into_output_low()
        };
        Ok(DigitalActuator::new(out).active_low(active_low))
    }
}
