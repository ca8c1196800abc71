//! Analysis configuration loaded from TOML.

use std::path::Path;

use ground_risk_spatial::GridConfig;
use ground_risk_zones::{BufferSettings, GrbPolicyConfig, ZoneBuilder};
use ground_risk_zones_models::ValidationError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration shipped with the binary. Documents every key.
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path to the config file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unexpected keys/values.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Path to the config file.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// A value parsed but is out of range.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Settings shared by every analysis of one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Height to GRB mapping.
    pub grb_policy: GrbPolicyConfig,
    /// Offset engine tunables.
    pub buffer: BufferSettings,
    /// Population grid source.
    pub grid: GridConfig,
}

impl AnalysisConfig {
    /// Loads `path`, or the defaults when no path is given.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read or parsed, or
    /// if the GRB policy or buffer settings are invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            log::debug!("No config file given, using defaults");
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::parse(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.grb_policy.validate()?;
        config.buffer.validate()?;
        Ok(config)
    }

    /// A zone builder using this configuration's policy and buffer
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if either is invalid.
    pub fn zone_builder(&self) -> Result<ZoneBuilder, ValidationError> {
        ZoneBuilder::from_config(self.grb_policy.clone(), self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_default_matches_built_in_defaults() {
        let parsed = AnalysisConfig::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, AnalysisConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed = AnalysisConfig::parse(
            r#"
            [grb_policy]
            kind = "linear"
            ratio = 1.5
            minimum_m = 30.0

            [grid]
            path = "cells.geojson"
            "#,
        )
        .unwrap();

        assert_eq!(
            parsed.grb_policy,
            GrbPolicyConfig::Linear {
                ratio: 1.5,
                minimum_m: 30.0
            }
        );
        assert_eq!(parsed.buffer, BufferSettings::default());
        assert_eq!(parsed.grid.path, Path::new("cells.geojson"));
        assert_eq!(parsed.grid.fields.cell_id, "cell_id");

        let builder = parsed.zone_builder().unwrap();
        assert!((builder.preview_grb_size(100.0).unwrap() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = AnalysisConfig::parse("[buffer]\nmiter_limit = 0.5\n").unwrap_err();
        assert!(
            matches!(err, ConfigError::Validation(ValidationError { parameter: "miter_limit", .. })),
            "unexpected error: {err}"
        );

        let err = AnalysisConfig::parse("[grb_policy]\nkind = \"table\"\nbands = []\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)), "unexpected error: {err}");
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            AnalysisConfig::parse("[grb_policy\n"),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            AnalysisConfig::parse("[grb_policy]\nkind = \"sideways\"\n"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AnalysisConfig::load(Some(Path::new("/nonexistent/ground_risk.toml")))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert_eq!(AnalysisConfig::load(None).unwrap(), AnalysisConfig::default());
    }
}
