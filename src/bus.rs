//! Register-level SPI access for register-addressed sensors.
//!
//! Every access is one [`SpiDevice::transaction`], so chip select stays
//! asserted for the whole exchange and is released on every exit path.
//! Several channels can share one physical bus through
//! `embedded_hal_bus::spi::RefCellDevice` without interleaving.
//!
//! Address convention: reads send `address & 0x7F`, writes send
//! `address | 0x80`. Multi-byte fields are big-endian and read with the
//! chip's address auto-increment.

use embedded_hal::spi::{Error as _, ErrorKind, Operation, SpiDevice};
use thiserror::Error;

/// Bit 7 of the address byte selects a write.
pub const WRITE_FLAG: u8 = 0x80;

/// Mask applied to read addresses.
pub const READ_MASK: u8 = 0x7F;

/// I/O failure on a register transaction.
///
/// The transaction is treated as not having happened: reads hand back no
/// bytes and callers must not assume a write landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("SPI transaction failed ({kind:?})")]
pub struct BusFault {
    /// Error category reported by the SPI implementation.
    pub kind: ErrorKind,
}

impl BusFault {
    /// Converts any `embedded-hal` SPI error into a bus fault.
    pub fn from_spi<E: embedded_hal::spi::Error>(err: E) -> Self {
        Self { kind: err.kind() }
    }
}

/// Exclusive register access to one device on a shared bus.
#[derive(Debug)]
pub struct RegisterBus<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice> RegisterBus<SPI> {
    /// Wraps an SPI device (one chip select).
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Reads `N` consecutive registers starting at `address`.
    pub fn read<const N: usize>(&mut self, address: u8) -> Result<[u8; N], BusFault> {
        let cmd = [address & READ_MASK];
        let mut buf = [0u8; N];
        self.spi
            .transaction(&mut [Operation::Write(&cmd), Operation::Read(&mut buf)])
            .map_err(BusFault::from_spi)?;
        Ok(buf)
    }

    /// Writes one register.
    pub fn write(&mut self, address: u8, value: u8) -> Result<(), BusFault> {
        self.spi
            .write(&[address | WRITE_FLAG, value])
            .map_err(BusFault::from_spi)
    }

    /// Reads a single unsigned register.
    pub fn read_u8(&mut self, address: u8) -> Result<u8, BusFault> {
        let [value] = self.read::<1>(address)?;
        Ok(value)
    }

    /// Reads a single two's-complement register.
    pub fn read_i8(&mut self, address: u8) -> Result<i8, BusFault> {
        Ok(self.read_u8(address)? as i8)
    }

    /// Reads a big-endian signed 16-bit field.
    pub fn read_i16(&mut self, address: u8) -> Result<i16, BusFault> {
        Ok(i16::from_be_bytes(self.read::<2>(address)?))
    }

    /// Reads a big-endian signed 24-bit field, sign-extended to `i32`.
    pub fn read_i24(&mut self, address: u8) -> Result<i32, BusFault> {
        let [hi, mid, lo] = self.read::<3>(address)?;
        Ok(i32::from_be_bytes([hi, mid, lo, 0]) >> 8)
    }

    /// Read-modify-write: keeps the bits in `keep`, ORs in `set`.
    pub fn update(&mut self, address: u8, keep: u8, set: u8) -> Result<u8, BusFault> {
        let merged = (self.read_u8(address)? & keep) | set;
        self.write(address, merged)?;
        Ok(merged)
    }

    /// Gives back the underlying SPI device.
    pub fn release(self) -> SPI {
        self.spi
    }
}
