//! Per-channel calibration against a reference thermometer.
//!
//! Each probe position on the rig was compared against a reference
//! thermometer at two temperatures. The result is stored as data on the
//! channel, chosen once when the configuration is loaded.

/// Correction applied to a raw channel temperature.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Calibration {
    /// Raw value used as is.
    #[default]
    None,
    /// Constant offset added to the raw value.
    Offset {
        /// °C added.
        offset: f64,
    },
    /// Two-point span correction:
    /// `((raw + raw_offset) × reference_range / raw_range) − reference_offset`.
    Span {
        /// Shift applied before scaling.
        raw_offset: f64,
        /// Span seen by the probe between the two calibration points.
        raw_range: f64,
        /// Span seen by the reference thermometer.
        reference_range: f64,
        /// Shift applied after scaling.
        reference_offset: f64,
    },
}

impl Calibration {
    /// Applies the correction.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cryotherm::calibration::Calibration;
    ///
    /// let chamber = Calibration::Offset { offset: 7.6 };
    /// assert!((chamber.apply(-30.0) - (-22.4)).abs() < 1e-9);
    /// ```
    pub fn apply(&self, raw: f64) -> f64 {
        match *self {
            Calibration::None => raw,
            Calibration::Offset { offset } => raw + offset,
            Calibration::Span {
                raw_offset,
                raw_range,
                reference_range,
                reference_offset,
            } => ((raw + raw_offset) * reference_range / raw_range) - reference_offset,
        }
    }

    /// Returns false for a span with a zero or non-finite raw range.
    pub fn is_valid(&self) -> bool {
        match *self {
            Calibration::None => true,
            Calibration::Offset { offset } => offset.is_finite(),
            Calibration::Span {
                raw_offset,
                raw_range,
                reference_range,
                reference_offset,
            } => {
                raw_range != 0.0
                    && [raw_offset, raw_range, reference_range, reference_offset]
                        .iter()
                        .all(|v| v.is_finite())
            }
        }
    }
}

/// Probe positions on the cryostat and probe rigs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ChannelKind {
    /// Cryocooler cold head.
    ColdHead,
    /// Heat exchanger, side facing the cold head.
    HeatExFront,
    /// Heat exchanger, side facing the chamber.
    HeatExBack,
    /// Sample chamber.
    Chamber,
    /// Cryoprobe tip.
    Tip,
    /// Cryoprobe ceramic insulator.
    Ceramic,
    /// Cryoprobe flange.
    Flange,
}

impl ChannelKind {
    /// Measured calibration for this position.
    pub const fn calibration(self) -> Calibration {
        match self {
            // consistent with the reference thermometer
            ChannelKind::ColdHead => Calibration::None,
            ChannelKind::HeatExFront => span(174.0, 184.0, 179.0, 161.0),
            ChannelKind::HeatExBack => span(117.0, 121.0, 126.0, 108.0),
            // reads 7.6 °C cold at both ends of the range
            ChannelKind::Chamber => Calibration::Offset { offset: 7.6 },
            ChannelKind::Tip => span(112.6, 124.8, 116.3, 96.7),
            ChannelKind::Ceramic => span(159.9, 179.7, 169.5, 150.9),
            ChannelKind::Flange => span(159.6, 179.0, 169.1, 149.2),
        }
    }
}

const fn span(
    raw_offset: f64,
    raw_range: f64,
    reference_range: f64,
    reference_offset: f64,
) -> Calibration {
    Calibration::Span {
        raw_offset,
        raw_range,
        reference_range,
        reference_offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn none_is_identity() {
        assert_eq!(Calibration::None.apply(-123.25), -123.25);
    }

    #[test]
    fn span_formula() {
        let cal = span(174.0, 184.0, 179.0, 161.0);
        // raw -174 maps to -161 exactly
        assert!(close(cal.apply(-174.0), -161.0));
        // raw +10 from there scales by 179/184
        assert!(close(cal.apply(-164.0), 10.0 * 179.0 / 184.0 - 161.0));
    }

    #[test]
    fn heat_exchanger_sides_differ() {
        let front = ChannelKind::HeatExFront.calibration();
        let back = ChannelKind::HeatExBack.calibration();
        assert_ne!(front, back);
        assert!(close(back.apply(-117.0), -108.0));
    }

    #[test]
    fn chamber_offset() {
        assert!(close(ChannelKind::Chamber.calibration().apply(-30.0), -22.4));
    }

    #[test]
    fn cold_head_uncorrected() {
        assert_eq!(ChannelKind::ColdHead.calibration(), Calibration::None);
    }

    #[test]
    fn every_preset_is_valid() {
        for kind in [
            ChannelKind::ColdHead,
            ChannelKind::HeatExFront,
            ChannelKind::HeatExBack,
            ChannelKind::Chamber,
            ChannelKind::Tip,
            ChannelKind::Ceramic,
            ChannelKind::Flange,
        ] {
            assert!(kind.calibration().is_valid(), "{kind:?}");
        }
    }

    #[test]
    fn zero_raw_range_is_invalid() {
        assert!(!span(0.0, 0.0, 1.0, 0.0).is_valid());
        assert!(!Calibration::Offset { offset: f64::NAN }.is_valid());
    }
}
