//! Fault status register decoding.

use core::fmt;

/// Decoded MAX31856 fault status register.
///
/// Each flag maps to one bit and decodes independently of the others.
///
/// | Bit | Flag |
/// |-----|------|
/// | 7 | `cj_range` |
/// | 6 | `tc_range` |
/// | 5 | `cj_high` |
/// | 4 | `cj_low` |
/// | 3 | `tc_high` |
/// | 2 | `tc_low` |
/// | 1 | `voltage` |
/// | 0 | `open_tc` |
///
/// # Example
///
/// ```rust
/// use cryotherm::sensor::FaultSet;
///
/// let faults = FaultSet::from_bits(0x01);
/// assert!(faults.open_tc);
/// assert!(faults.is_hard());
/// assert_eq!(faults.bits(), 0x01);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FaultSet {
    /// Cold-junction temperature out of the chip's operating range.
    pub cj_range: bool,
    /// Thermocouple temperature out of the type's range.
    pub tc_range: bool,
    /// Cold junction above its high threshold.
    pub cj_high: bool,
    /// Cold junction below its low threshold.
    pub cj_low: bool,
    /// Thermocouple above its high threshold.
    pub tc_high: bool,
    /// Thermocouple below its low threshold.
    pub tc_low: bool,
    /// Over- or under-voltage on the thermocouple inputs.
    pub voltage: bool,
    /// Open thermocouple circuit.
    pub open_tc: bool,
}

const NAMES: [(&str, u8); 8] = [
    ("cj_range", 0x80),
    ("tc_range", 0x40),
    ("cj_high", 0x20),
    ("cj_low", 0x10),
    ("tc_high", 0x08),
    ("tc_low", 0x04),
    ("voltage", 0x02),
    ("open_tc", 0x01),
];

/// Faults that make the conversion result meaningless.
const HARD: u8 = 0x80 | 0x40 | 0x02 | 0x01;

impl FaultSet {
    /// Decodes a raw status byte.
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            cj_range: bits & 0x80 != 0,
            tc_range: bits & 0x40 != 0,
            cj_high: bits & 0x20 != 0,
            cj_low: bits & 0x10 != 0,
            tc_high: bits & 0x08 != 0,
            tc_low: bits & 0x04 != 0,
            voltage: bits & 0x02 != 0,
            open_tc: bits & 0x01 != 0,
        }
    }

    /// Re-encodes into the status register layout.
    pub const fn bits(&self) -> u8 {
        (self.cj_range as u8) << 7
            | (self.tc_range as u8) << 6
            | (self.cj_high as u8) << 5
            | (self.cj_low as u8) << 4
            | (self.tc_high as u8) << 3
            | (self.tc_low as u8) << 2
            | (self.voltage as u8) << 1
            | (self.open_tc as u8)
    }

    /// Returns true if any flag is set.
    pub const fn any(&self) -> bool {
        self.bits() != 0
    }

    /// Returns true for range, voltage or open-circuit faults.
    ///
    /// Threshold faults only say the reading crossed a user limit; the
    /// reading itself is still valid.
    pub const fn is_hard(&self) -> bool {
        self.bits() & HARD != 0
    }

    /// Iterates the names of the active flags, MSB first.
    pub fn active(&self) -> impl Iterator<Item = &'static str> {
        let bits = self.bits();
        NAMES
            .iter()
            .filter(move |(_, mask)| bits & mask != 0)
            .map(|(name, _)| *name)
    }
}

impl fmt::Display for FaultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.any() {
            return f.write_str("none");
        }
        for (i, name) in self.active().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
        }
        Ok(())
    }
}
