//! NIST ITS-90 thermocouple polynomials.
//!
//! Host-side alternative to the chip's own linearization. The measured
//! hot-junction/cold-junction difference is turned into a voltage with the
//! type's Seebeck coefficient, the cold-junction equivalent voltage is added
//! from the forward reference polynomial, and the total is inverted with the
//! sub-range polynomial it falls into.
//!
//! Coefficients are the published NIST ITS-90 sets (mV, °C), listed from
//! the constant term upward.

use super::ThermocoupleType;
use crate::error::{ConfigError, SensorError};

/// `a0 · exp(a1 · (t − a2)²)` correction on the type K reference polynomial.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Exponential {
    /// Amplitude (mV).
    pub a0: f64,
    /// Width.
    pub a1: f64,
    /// Centre (°C).
    pub a2: f64,
}

/// Forward polynomial valid up to `upper` °C.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReferenceSegment {
    /// Inclusive upper bound in °C.
    pub upper: f64,
    /// Polynomial coefficients, constant term first.
    pub coeffs: &'static [f64],
    /// Optional exponential term.
    pub exponential: Option<Exponential>,
}

/// Inverse polynomial for one voltage sub-range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InverseSegment {
    /// Lower bound in mV (exclusive except for the first segment).
    pub lower: f64,
    /// Inclusive upper bound in mV.
    pub upper: f64,
    /// Polynomial coefficients, constant term first.
    pub coeffs: &'static [f64],
}

/// Full conversion table for one thermocouple type.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NistTable {
    /// Sensitivity near room temperature in mV/°C.
    pub seebeck: f64,
    /// Forward segments ordered by temperature.
    pub reference: &'static [ReferenceSegment],
    /// Inverse segments ordered by voltage.
    pub inverse: &'static [InverseSegment],
}

/// Evaluates `c0 + c1·x + c2·x² + …` by Horner's rule.
pub fn horner(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

impl NistTable {
    /// Thermoelectric voltage (mV) equivalent to a cold junction at `t` °C.
    pub fn reference_voltage(&self, t: f64) -> f64 {
        let segment = self
            .reference
            .iter()
            .find(|s| t <= s.upper)
            .or(self.reference.last());
        let Some(segment) = segment else {
            return 0.0;
        };
        let mut v = horner(segment.coeffs, t);
        if let Some(e) = segment.exponential {
            v += e.a0 * (e.a1 * (t - e.a2).powi(2)).exp();
        }
        v
    }

    /// Temperature (°C) for a total voltage, or `None` outside every sub-range.
    pub fn voltage_to_temperature(&self, millivolts: f64) -> Option<f64> {
        self.inverse
            .iter()
            .enumerate()
            .find(|(i, s)| {
                let above_lower = if *i == 0 {
                    millivolts >= s.lower
                } else {
                    millivolts > s.lower
                };
                above_lower && millivolts <= s.upper
            })
            .map(|(_, s)| horner(s.coeffs, millivolts))
    }
}

/// Looks up the table for a thermocouple type.
///
/// Types B, G8 and G32 have no table.
pub fn table(thermocouple: ThermocoupleType) -> Option<&'static NistTable> {
    match thermocouple {
        ThermocoupleType::K => Some(&TYPE_K),
        ThermocoupleType::J => Some(&TYPE_J),
        ThermocoupleType::N => Some(&TYPE_N),
        ThermocoupleType::T => Some(&TYPE_T),
        ThermocoupleType::E => Some(&TYPE_E),
        ThermocoupleType::R => Some(&TYPE_R),
        ThermocoupleType::S => Some(&TYPE_S),
        ThermocoupleType::B | ThermocoupleType::G8 | ThermocoupleType::G32 => None,
    }
}

/// Converts a measured/reference temperature pair with the NIST tables.
///
/// # Example
///
/// ```rust
/// use cryotherm::sensor::{nist, ThermocoupleType};
///
/// let t = nist::nist_temperature(ThermocoupleType::K, 100.0, 25.0).unwrap();
/// assert!((t - 100.0).abs() < 1.0);
/// ```
pub fn nist_temperature(
    thermocouple: ThermocoupleType,
    measured: f64,
    reference: f64,
) -> Result<f64, SensorError> {
    let table = table(thermocouple).ok_or(ConfigError::NoNistTable(thermocouple))?;
    let v_out = table.seebeck * (measured - reference);
    let v_total = v_out + table.reference_voltage(reference);
    table
        .voltage_to_temperature(v_total)
        .ok_or(SensorError::OutOfRangeVoltage {
            thermocouple,
            millivolts: v_total,
        })
}

// ============================================================================
// Type K
// ============================================================================

static TYPE_K: NistTable = NistTable {
    seebeck: 0.041276,
    reference: &[
        ReferenceSegment {
            upper: 0.0,
            coeffs: &[
                0.0,
                0.394501280250e-01,
                0.236223735980e-04,
                -0.328589067840e-06,
                -0.499048287770e-08,
                -0.675090591730e-10,
                -0.574103274280e-12,
                -0.310888728940e-14,
                -0.104516093650e-16,
                -0.198892668780e-19,
                -0.163226974860e-22,
            ],
            exponential: None,
        },
        ReferenceSegment {
            upper: f64::INFINITY,
            coeffs: &[
                -0.176004136860e-01,
                0.389212049750e-01,
                0.185587700320e-04,
                -0.994575928740e-07,
                0.318409457190e-09,
                -0.560728448890e-12,
                0.560750590590e-15,
                -0.320207200030e-18,
                0.971511471520e-22,
                -0.121047212750e-25,
            ],
            exponential: Some(Exponential {
                a0: 0.1185976,
                a1: -0.1183432e-03,
                a2: 0.1269686e03,
            }),
        },
    ],
    inverse: &[
        InverseSegment {
            lower: -5.891,
            upper: 0.0,
            coeffs: &[
                0.0,
                2.5173462e01,
                -1.1662878e00,
                -1.0833638e00,
                -8.9773540e-01,
                -3.7342377e-01,
                -8.6632643e-02,
                -1.0450598e-02,
                -5.1920577e-04,
            ],
        },
        InverseSegment {
            lower: 0.0,
            upper: 20.644,
            coeffs: &[
                0.0,
                2.508355e01,
                7.860106e-02,
                -2.503131e-01,
                8.315270e-02,
                -1.228034e-02,
                9.804036e-04,
                -4.413030e-05,
                1.057734e-06,
                -1.052755e-08,
            ],
        },
        InverseSegment {
            lower: 20.644,
            upper: 54.886,
            coeffs: &[
                -1.318058e02,
                4.830222e01,
                -1.646031e00,
                5.464731e-02,
                -9.650715e-04,
                8.802193e-06,
                -3.110810e-08,
            ],
        },
    ],
};

// ============================================================================
// Type J
// ============================================================================

static TYPE_J: NistTable = NistTable {
    seebeck: 0.057953,
    reference: &[
        ReferenceSegment {
            upper: 760.0,
            coeffs: &[
                0.0,
                0.503811878150e-01,
                0.304758369300e-04,
                -0.856810657200e-07,
                0.132281952950e-09,
                -0.170529583370e-12,
                0.209480906970e-15,
                -0.125383953360e-18,
                0.156317256970e-22,
            ],
            exponential: None,
        },
        ReferenceSegment {
            upper: f64::INFINITY,
            coeffs: &[
                0.296456256810e03,
                -0.149761277860e01,
                0.317871039240e-02,
                -0.318476867010e-05,
                0.157208190040e-08,
                -0.306913690560e-12,
            ],
            exponential: None,
        },
    ],
    inverse: &[
        InverseSegment {
            lower: -8.095,
            upper: 0.0,
            coeffs: &[
                0.0,
                1.9528268e01,
                -1.2286185e00,
                -1.0752178e00,
                -5.9086933e-01,
                -1.7256713e-01,
                -2.8131513e-02,
                -2.3963370e-03,
                -8.3823321e-05,
            ],
        },
        InverseSegment {
            lower: 0.0,
            upper: 42.919,
            coeffs: &[
                0.0,
                1.978425e01,
                -2.001204e-01,
                1.036969e-02,
                -2.549687e-04,
                3.585153e-06,
                -5.344285e-08,
                5.099890e-10,
            ],
        },
        InverseSegment {
            lower: 42.919,
            upper: 69.553,
            coeffs: &[
                -3.11358187e03,
                3.00543684e02,
                -9.94773230e00,
                1.70276630e-01,
                -1.43033468e-03,
                4.73886084e-06,
            ],
        },
    ],
};

// ============================================================================
// Type N
// ============================================================================

static TYPE_N: NistTable = NistTable {
    seebeck: 0.036256,
    reference: &[
        ReferenceSegment {
            upper: 0.0,
            coeffs: &[
                0.0,
                0.261591059620e-01,
                0.109574842280e-04,
                -0.938411115540e-07,
                -0.464120397590e-10,
                -0.263033577160e-11,
                -0.226534380030e-13,
                -0.760893007910e-16,
                -0.934196678350e-19,
            ],
            exponential: None,
        },
        ReferenceSegment {
            upper: f64::INFINITY,
            coeffs: &[
                0.0,
                0.259293946010e-01,
                0.157101418800e-04,
                0.438256272370e-07,
                -0.252611697940e-09,
                0.643118193390e-12,
                -0.100634715190e-14,
                0.997453389920e-18,
                -0.608632456070e-21,
                0.208492293390e-24,
                -0.306821961510e-28,
            ],
            exponential: None,
        },
    ],
    inverse: &[
        InverseSegment {
            lower: -3.990,
            upper: 0.0,
            coeffs: &[
                0.0,
                3.8436847e01,
                1.1010485e00,
                5.2229312e00,
                7.2060525e00,
                5.8488586e00,
                2.7754916e00,
                7.7075166e-01,
                1.1582665e-01,
                7.3138868e-03,
            ],
        },
        InverseSegment {
            lower: 0.0,
            upper: 20.613,
            coeffs: &[
                0.0,
                3.86896e01,
                -1.08267e00,
                4.70205e-02,
                -2.12169e-06,
                -1.17272e-04,
                5.39280e-06,
                -7.98156e-08,
            ],
        },
        InverseSegment {
            lower: 20.613,
            upper: 47.513,
            coeffs: &[
                1.972485e01,
                3.300943e01,
                -3.915159e-01,
                9.855391e-03,
                -1.274371e-04,
                7.767022e-07,
            ],
        },
    ],
};

// ============================================================================
// Type T
// ============================================================================

static TYPE_T: NistTable = NistTable {
    seebeck: 0.05218,
    reference: &[
        ReferenceSegment {
            upper: 0.0,
            coeffs: &[
                0.0,
                0.387481063640e-01,
                0.441944343470e-04,
                0.118443231050e-06,
                0.200329735540e-07,
                0.901380195590e-09,
                0.226511565930e-10,
                0.360711542050e-12,
                0.384939398830e-14,
                0.282135219250e-16,
                0.142515947790e-18,
                0.487686622860e-21,
                0.107955392700e-23,
                0.139450270620e-26,
                0.797951539270e-30,
            ],
            exponential: None,
        },
        ReferenceSegment {
            upper: f64::INFINITY,
            coeffs: &[
                0.0,
                0.387481063640e-01,
                0.332922278800e-04,
                0.206182434040e-06,
                -0.218822568460e-08,
                0.109968809280e-10,
                -0.308157587720e-13,
                0.454791352900e-16,
                -0.275129016730e-19,
            ],
            exponential: None,
        },
    ],
    inverse: &[
        InverseSegment {
            lower: -5.603,
            upper: 0.0,
            coeffs: &[
                0.0,
                2.5949192e01,
                -2.1316967e-01,
                7.9018692e-01,
                4.2527777e-01,
                1.3304473e-01,
                2.0241446e-02,
                1.2668171e-03,
            ],
        },
        InverseSegment {
            lower: 0.0,
            upper: 20.872,
            coeffs: &[
                0.0,
                2.592800e01,
                -7.602961e-01,
                4.637791e-02,
                -2.165394e-03,
                6.048144e-05,
                -7.293422e-07,
            ],
        },
    ],
};

// ============================================================================
// Type E
// ============================================================================

static TYPE_E: NistTable = NistTable {
    seebeck: 0.076373,
    reference: &[
        ReferenceSegment {
            upper: 0.0,
            coeffs: &[
                0.0,
                0.586655087080e-01,
                0.454109771240e-04,
                -0.779980486860e-06,
                -0.258001608430e-07,
                -0.594525830570e-09,
                -0.932140586670e-11,
                -0.102876055340e-12,
                -0.803701236210e-15,
                -0.439794973910e-17,
                -0.164147763550e-19,
                -0.396736195160e-22,
                -0.558273287210e-25,
                -0.346578420130e-28,
            ],
            exponential: None,
        },
        ReferenceSegment {
            upper: f64::INFINITY,
            coeffs: &[
                0.0,
                0.586655087100e-01,
                0.450322755820e-04,
                0.289084072120e-07,
                -0.330568966520e-09,
                0.650244032700e-12,
                -0.191974955040e-15,
                -0.125366004970e-17,
                0.214892175690e-20,
                -0.143880417820e-23,
                0.359608994810e-27,
            ],
            exponential: None,
        },
    ],
    inverse: &[
        InverseSegment {
            lower: -8.825,
            upper: 0.0,
            coeffs: &[
                0.0,
                1.6977288e01,
                -4.3514970e-01,
                -1.5859697e-01,
                -9.2502871e-02,
                -2.6084314e-02,
                -4.1360199e-03,
                -3.4034030e-04,
                -1.1564890e-05,
            ],
        },
        InverseSegment {
            lower: 0.0,
            upper: 76.373,
            coeffs: &[
                0.0,
                1.7057035e01,
                -2.3301759e-01,
                6.5435585e-03,
                -7.3562749e-05,
                -1.7896001e-06,
                8.4036165e-08,
                -1.3735879e-09,
                1.0629823e-11,
                -3.2447087e-14,
            ],
        },
    ],
};

// ============================================================================
// Type R
// ============================================================================

static TYPE_R: NistTable = NistTable {
    seebeck: 0.010506,
    reference: &[
        ReferenceSegment {
            upper: 1064.180,
            coeffs: &[
                0.0,
                0.528961729765e-02,
                0.139166589782e-04,
                -0.238855693017e-07,
                0.356916001063e-10,
                -0.462347666298e-13,
                0.500777441034e-16,
                -0.373105886191e-19,
                0.157716482367e-22,
                -0.281038625251e-26,
            ],
            exponential: None,
        },
        ReferenceSegment {
            upper: 1664.500,
            coeffs: &[
                0.295157925316e01,
                -0.252061251332e-02,
                0.159564501865e-04,
                -0.764085947576e-08,
                0.205305291024e-11,
                -0.293359668173e-15,
            ],
            exponential: None,
        },
        ReferenceSegment {
            upper: f64::INFINITY,
            coeffs: &[
                0.152232118209e03,
                -0.268819888545e00,
                0.171280280471e-03,
                -0.345895706453e-07,
                -0.934633971046e-14,
            ],
            exponential: None,
        },
    ],
    inverse: &[
        InverseSegment {
            lower: -0.226,
            upper: 1.923,
            coeffs: &[
                0.0,
                1.8891380e02,
                -9.3835290e01,
                -2.2703580e02,
                3.5145659e02,
                -3.8953900e02,
                2.8239471e02,
                -1.2607281e02,
                3.1353611e01,
                -3.3187769e00,
            ],
        },
        InverseSegment {
            lower: 1.923,
            upper: 11.361,
            coeffs: &[
                1.334584505e01,
                1.472644573e02,
                -1.844024844e01,
                4.031129726e00,
                -6.249428360e-01,
                6.468412046e-02,
                -4.458750426e-03,
                1.994710149e-04,
                -5.313401790e-06,
                6.481976217e-08,
            ],
        },
        InverseSegment {
            lower: 11.361,
            upper: 19.739,
            coeffs: &[
                -8.199599416e01,
                1.553962042e02,
                -8.342197663e00,
                4.279433549e-01,
                -1.191577910e-02,
                1.492290091e-04,
            ],
        },
        InverseSegment {
            lower: 19.739,
            upper: 21.103,
            coeffs: &[
                3.406177836e04,
                -7.023729171e03,
                5.582903813e02,
                -1.952394635e01,
                2.560740231e-01,
            ],
        },
    ],
};

// ============================================================================
// Type S
// ============================================================================

static TYPE_S: NistTable = NistTable {
    seebeck: 0.009587,
    reference: &[
        ReferenceSegment {
            upper: 1064.180,
            coeffs: &[
                0.0,
                0.540313308631e-02,
                0.125934289740e-04,
                -0.232477968689e-07,
                0.322028823036e-10,
                -0.331465196389e-13,
                0.255744251786e-16,
                -0.125068871393e-19,
                0.271443176145e-23,
            ],
            exponential: None,
        },
        ReferenceSegment {
            upper: 1664.500,
            coeffs: &[
                0.132900444085e01,
                0.334509311344e-02,
                0.654805192818e-05,
                -0.164856259209e-08,
                0.129989605174e-13,
            ],
            exponential: None,
        },
        ReferenceSegment {
            upper: f64::INFINITY,
            coeffs: &[
                0.146628232636e03,
                -0.258430516752e00,
                0.163693574641e-03,
                -0.330439046987e-07,
                -0.943223690612e-14,
            ],
            exponential: None,
        },
    ],
    inverse: &[
        InverseSegment {
            lower: -0.235,
            upper: 1.874,
            coeffs: &[
                0.0,
                1.84949460e02,
                -8.00504062e01,
                1.02237430e02,
                -1.52248592e02,
                1.88821343e02,
                -1.59085941e02,
                8.23027880e01,
                -2.34181944e01,
                2.79786260e00,
            ],
        },
        InverseSegment {
            lower: 1.874,
            upper: 10.332,
            coeffs: &[
                1.291507177e01,
                1.466298863e02,
                -1.534713402e01,
                3.145945973e00,
                -4.163257839e-01,
                3.187963771e-02,
                -1.291637500e-03,
                2.183475087e-05,
                -1.447379511e-07,
                8.211272125e-09,
            ],
        },
        InverseSegment {
            lower: 10.332,
            upper: 17.536,
            coeffs: &[
                -8.087801117e01,
                1.621573104e02,
                -8.536869453e00,
                4.719686976e-01,
                -1.441693666e-02,
                2.081618890e-04,
            ],
        },
        InverseSegment {
            lower: 17.536,
            upper: 18.693,
            coeffs: &[
                5.333875126e04,
                -1.235892298e04,
                1.092657613e03,
                -4.265693686e01,
                6.247205420e-01,
            ],
        },
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ThermocoupleType; 7] = [
        ThermocoupleType::K,
        ThermocoupleType::J,
        ThermocoupleType::N,
        ThermocoupleType::T,
        ThermocoupleType::E,
        ThermocoupleType::R,
        ThermocoupleType::S,
    ];

    #[test]
    fn horner_matches_power_series() {
        let c = [1.0, -2.0, 0.5, 0.25];
        let x: f64 = 1.7;
        let direct = c[0] + c[1] * x + c[2] * x.powi(2) + c[3] * x.powi(3);
        assert!((horner(&c, x) - direct).abs() < 1e-12);
        assert_eq!(horner(&[], 3.0), 0.0);
    }

    #[test]
    fn zero_difference_at_zero_is_zero() {
        for tc in ALL {
            let t = nist_temperature(tc, 0.0, 0.0).unwrap();
            assert!(t.abs() < 0.1, "{tc:?} gave {t}");
        }
    }

    #[test]
    fn type_k_reference_voltages() {
        // NIST table: 25 °C -> 1.000 mV, 100 °C -> 4.096 mV
        assert!((TYPE_K.reference_voltage(25.0) - 1.000).abs() < 0.002);
        assert!((TYPE_K.reference_voltage(100.0) - 4.096).abs() < 0.002);
        assert!((TYPE_K.reference_voltage(-100.0) - (-3.554)).abs() < 0.002);
    }

    #[test]
    fn type_k_round_trip_near_room() {
        let t = nist_temperature(ThermocoupleType::K, 100.0, 25.0).unwrap();
        assert!((t - 100.0).abs() < 1.0, "got {t}");
    }

    #[test]
    fn type_t_cryogenic() {
        // -100 °C on a T couple is -3.379 mV
        let t = TYPE_T.voltage_to_temperature(-3.379).unwrap();
        assert!((t + 100.0).abs() < 0.1, "got {t}");
    }

    #[test]
    fn type_j_upper_segment() {
        // 1000 °C on a J couple is 57.942 mV
        let t = TYPE_J.voltage_to_temperature(57.942).unwrap();
        assert!((t - 1000.0).abs() < 0.5, "got {t}");
    }

    #[test]
    fn type_r_and_s_reference_segments_are_continuous() {
        for table in [&TYPE_R, &TYPE_S] {
            let below = table.reference_voltage(1064.18);
            let above = table.reference_voltage(1064.19);
            assert!((below - above).abs() < 0.01);
        }
    }

    #[test]
    fn type_s_third_inverse_segment() {
        // 1400 °C on an S couple is 14.973 mV
        let t = TYPE_S.voltage_to_temperature(14.973).unwrap();
        assert!((t - 1400.0).abs() < 0.5, "got {t}");
    }

    #[test]
    fn first_segment_lower_bound_is_inclusive() {
        assert!(TYPE_K.voltage_to_temperature(-5.891).is_some());
        assert!(TYPE_K.voltage_to_temperature(-5.8911).is_none());
    }

    #[test]
    fn boundary_voltage_uses_lower_segment() {
        let at = TYPE_K.voltage_to_temperature(20.644).unwrap();
        let just_above = TYPE_K.voltage_to_temperature(20.6441).unwrap();
        assert!((at - just_above).abs() < 0.5);
        assert!((at - 500.0).abs() < 0.5);
    }

    #[test]
    fn out_of_range_voltage_is_error() {
        let err = nist_temperature(ThermocoupleType::K, 2000.0, 25.0).unwrap_err();
        assert!(matches!(
            err,
            SensorError::OutOfRangeVoltage {
                thermocouple: ThermocoupleType::K,
                ..
            }
        ));
    }

    #[test]
    fn types_without_table() {
        for tc in [
            ThermocoupleType::B,
            ThermocoupleType::G8,
            ThermocoupleType::G32,
        ] {
            assert!(table(tc).is_none());
            assert_eq!(
                nist_temperature(tc, 20.0, 20.0),
                Err(SensorError::Configuration(ConfigError::NoNistTable(tc)))
            );
        }
    }
}
