//! MAX31856 register map and bit fields.
//!
//! Addresses are the read addresses; [`RegisterBus`](crate::bus::RegisterBus)
//! sets bit 7 for writes.

/// Configuration register 0.
pub const CR0: u8 = 0x00;
/// Configuration register 1.
pub const CR1: u8 = 0x01;
/// Fault mask.
pub const MASK: u8 = 0x02;
/// Cold-junction high fault threshold.
pub const CJHF: u8 = 0x03;
/// Cold-junction low fault threshold.
pub const CJLF: u8 = 0x04;
/// Linearized temperature high fault threshold, MSB.
pub const LTHFTH: u8 = 0x05;
/// Linearized temperature high fault threshold, LSB.
pub const LTHFTL: u8 = 0x06;
/// Linearized temperature low fault threshold, MSB.
pub const LTLFTH: u8 = 0x07;
/// Linearized temperature low fault threshold, LSB.
pub const LTLFTL: u8 = 0x08;
/// Cold-junction temperature offset.
pub const CJTO: u8 = 0x09;
/// Cold-junction temperature, MSB.
pub const CJTH: u8 = 0x0A;
/// Cold-junction temperature, LSB.
pub const CJTL: u8 = 0x0B;
/// Linearized thermocouple temperature, byte 2.
pub const LTCBH: u8 = 0x0C;
/// Linearized thermocouple temperature, byte 1.
pub const LTCBM: u8 = 0x0D;
/// Linearized thermocouple temperature, byte 0.
pub const LTCBL: u8 = 0x0E;
/// Fault status.
pub const SR: u8 = 0x0F;

// CR0 bits
/// Continuous conversion mode.
pub const CR0_AUTOCONVERT: u8 = 0x80;
/// One-shot trigger; reads back set while the conversion runs.
pub const CR0_1SHOT: u8 = 0x40;
/// Open-circuit detection, high bit.
pub const CR0_OCFAULT1: u8 = 0x20;
/// Open-circuit detection, low bit.
pub const CR0_OCFAULT0: u8 = 0x10;
/// Cold-junction sensor disable.
pub const CR0_CJ: u8 = 0x08;
/// Fault output in interrupt mode.
pub const CR0_FAULT: u8 = 0x04;
/// Clear latched faults.
pub const CR0_FAULTCLR: u8 = 0x02;
/// 50 Hz noise rejection (clear = 60 Hz).
pub const CR0_50HZ: u8 = 0x01;

/// Bits of CR1 outside the AVGSEL field (bits 4-6).
pub const CR1_AVGSEL_KEEP: u8 = 0b1000_1111;
/// Bits of CR1 outside the thermocouple type field (bits 0-3).
pub const CR1_TYPE_KEEP: u8 = 0xF0;

/// Averaging sample counts and their AVGSEL patterns.
pub const AVGSEL: [(u8, u8); 5] = [(1, 0x00), (2, 0x10), (4, 0x20), (8, 0x30), (16, 0x40)];

/// AVGSEL pattern for a sample count.
pub fn avgsel_bits(samples: u8) -> Option<u8> {
    AVGSEL
        .iter()
        .find(|(n, _)| *n == samples)
        .map(|(_, bits)| *bits)
}

/// Sample count for an AVGSEL pattern (already masked to bits 4-6).
pub fn avgsel_samples(bits: u8) -> Option<u8> {
    AVGSEL.iter().find(|(_, b)| *b == bits).map(|(n, _)| *n)
}

/// Scale of the linearized thermocouple register (2^-12 °C per count).
pub const TC_SCALE: f64 = 1.0 / 4096.0;
/// Scale of the cold-junction register (2^-8 °C per count).
pub const CJ_SCALE: f64 = 1.0 / 256.0;
/// Scale of the thermocouple fault thresholds (2^-4 °C per count).
pub const THRESHOLD_SCALE: f64 = 1.0 / 16.0;
