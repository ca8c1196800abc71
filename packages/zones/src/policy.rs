//! Height-to-Ground-Risk-Buffer policies.
//!
//! The GRB width is regulatory policy and differs per jurisdiction, so the
//! builder takes it as an injected [`GrbPolicy`] instead of a fixed
//! formula. [`GrbPolicyConfig`] covers the policies that can be expressed
//! in configuration.

use ground_risk_zones_models::ValidationError;
use serde::{Deserialize, Serialize};

/// Maps a flight height to a Ground Risk Buffer width.
///
/// Implementations must be monotonically non-decreasing in height and
/// return finite, non-negative distances for finite, non-negative
/// heights.
pub trait GrbPolicy: Send + Sync + std::fmt::Debug {
    /// GRB width in metres for a flight at `height_m` metres.
    fn grb_size_m(&self, height_m: f64) -> f64;
}

/// One step of a [`GrbPolicyConfig::Table`] policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrbBand {
    /// Heights up to and including this value use this band.
    pub max_height_m: f64,
    /// GRB width for this band.
    pub grb_m: f64,
}

/// Policies that can be selected from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GrbPolicyConfig {
    /// SORA "1:1 rule": the buffer is as wide as the flight is high.
    #[default]
    OneToOne,
    /// `max(minimum_m, ratio * height)`.
    Linear {
        /// Metres of buffer per metre of height.
        ratio: f64,
        /// Lower bound on the buffer.
        #[serde(default)]
        minimum_m: f64,
    },
    /// Stepwise bands sorted by height. Heights above the last band use
    /// the last band's width.
    Table {
        /// The bands.
        bands: Vec<GrbBand>,
    },
}

impl GrbPolicyConfig {
    /// Checks that the policy is monotonic and yields valid distances.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for negative coefficients, an empty
    /// table, or bands out of order.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::OneToOne => Ok(()),
            Self::Linear { ratio, minimum_m } => {
                ValidationError::check_non_negative("grb_policy.ratio", *ratio)?;
                ValidationError::check_non_negative("grb_policy.minimum_m", *minimum_m)?;
                Ok(())
            }
            Self::Table { bands } => {
                if bands.is_empty() {
                    return Err(ValidationError {
                        parameter: "grb_policy.bands",
                        value: 0.0,
                        reason: "table needs at least one band",
                    });
                }
                for band in bands {
                    ValidationError::check_non_negative(
                        "grb_policy.bands.max_height_m",
                        band.max_height_m,
                    )?;
                    ValidationError::check_non_negative("grb_policy.bands.grb_m", band.grb_m)?;
                }
                for pair in bands.windows(2) {
                    if pair[1].max_height_m <= pair[0].max_height_m {
                        return Err(ValidationError {
                            parameter: "grb_policy.bands.max_height_m",
                            value: pair[1].max_height_m,
                            reason: "bands must be sorted by increasing height",
                        });
                    }
                    if pair[1].grb_m < pair[0].grb_m {
                        return Err(ValidationError {
                            parameter: "grb_policy.bands.grb_m",
                            value: pair[1].grb_m,
                            reason: "buffer must not shrink as height grows",
                        });
                    }
                }
                Ok(())
            }
        }
    }
}

impl GrbPolicy for GrbPolicyConfig {
    fn grb_size_m(&self, height_m: f64) -> f64 {
        match self {
            Self::OneToOne => height_m,
            Self::Linear { ratio, minimum_m } => (ratio * height_m).max(*minimum_m),
            Self::Table { bands } => bands
                .iter()
                .find(|band| height_m <= band.max_height_m)
                .or_else(|| bands.last())
                .map_or(0.0, |band| band.grb_m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_to_one_matches_height() {
        let policy = GrbPolicyConfig::OneToOne;
        assert!((policy.grb_size_m(0.0)).abs() < f64::EPSILON);
        assert!((policy.grb_size_m(120.0) - 120.0).abs() < f64::EPSILON);
    }

    #[test]
    fn linear_respects_minimum() {
        let policy = GrbPolicyConfig::Linear {
            ratio: 0.5,
            minimum_m: 30.0,
        };
        assert!((policy.grb_size_m(10.0) - 30.0).abs() < f64::EPSILON);
        assert!((policy.grb_size_m(100.0) - 50.0).abs() < f64::EPSILON);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn table_bands() {
        let policy = GrbPolicyConfig::Table {
            bands: vec![
                GrbBand {
                    max_height_m: 50.0,
                    grb_m: 60.0,
                },
                GrbBand {
                    max_height_m: 120.0,
                    grb_m: 150.0,
                },
            ],
        };
        assert!(policy.validate().is_ok());
        assert!((policy.grb_size_m(0.0) - 60.0).abs() < f64::EPSILON);
        assert!((policy.grb_size_m(50.0) - 60.0).abs() < f64::EPSILON);
        assert!((policy.grb_size_m(50.1) - 150.0).abs() < f64::EPSILON);
        assert!((policy.grb_size_m(500.0) - 150.0).abs() < f64::EPSILON);
    }

    #[test]
    fn table_must_be_monotonic() {
        let shrinking = GrbPolicyConfig::Table {
            bands: vec![
                GrbBand {
                    max_height_m: 50.0,
                    grb_m: 100.0,
                },
                GrbBand {
                    max_height_m: 100.0,
                    grb_m: 80.0,
                },
            ],
        };
        assert_eq!(
            shrinking.validate().unwrap_err().parameter,
            "grb_policy.bands.grb_m"
        );

        let unsorted = GrbPolicyConfig::Table {
            bands: vec![
                GrbBand {
                    max_height_m: 100.0,
                    grb_m: 80.0,
                },
                GrbBand {
                    max_height_m: 50.0,
                    grb_m: 100.0,
                },
            ],
        };
        assert_eq!(
            unsorted.validate().unwrap_err().parameter,
            "grb_policy.bands.max_height_m"
        );

        let empty = GrbPolicyConfig::Table { bands: vec![] };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn policies_are_monotonic() {
        let policies = [
            GrbPolicyConfig::OneToOne,
            GrbPolicyConfig::Linear {
                ratio: 1.5,
                minimum_m: 20.0,
            },
            GrbPolicyConfig::Table {
                bands: vec![
                    GrbBand {
                        max_height_m: 30.0,
                        grb_m: 30.0,
                    },
                    GrbBand {
                        max_height_m: 90.0,
                        grb_m: 90.0,
                    },
                ],
            },
        ];
        for policy in &policies {
            let mut last = policy.grb_size_m(0.0);
            for step in 1..=300 {
                let size = policy.grb_size_m(f64::from(step));
                assert!(size >= last, "{policy:?} shrinks at {step} m");
                last = size;
            }
        }
    }

    #[test]
    fn parses_from_toml() {
        let policy: GrbPolicyConfig = toml::from_str(
            r#"
            kind = "table"
            bands = [
                { max_height_m = 50.0, grb_m = 60.0 },
                { max_height_m = 120.0, grb_m = 150.0 },
            ]
            "#,
        )
        .unwrap();
        assert!(matches!(policy, GrbPolicyConfig::Table { ref bands } if bands.len() == 2));

        let policy: GrbPolicyConfig = toml::from_str(r#"kind = "one_to_one""#).unwrap();
        assert_eq!(policy, GrbPolicyConfig::OneToOne);
    }
}
