//! # Pipeline Configuration
//!
//! The recognized configuration surface of the engine, loadable from a
//! human-readable TOML file. Validation runs up front so a bad horizon,
//! threshold, or policy string fails before any per-entity work starts.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

use crate::grid::{GridError, TimeGrid};
use crate::types::{ImputeMethod, Stat};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("Frequency threshold must lie in [0, 1]. Got {0}.")]
    ThresholdOutOfRange(f64),
    #[error("Quantile count must be at least 2. Got {0}.")]
    TooFewQuantiles(usize),
}

/// All knobs of the feature-construction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Observation horizon `T`, in the same unit as `dt`.
    pub t_max: f64,
    /// Bin width `dt`.
    pub dt: f64,
    /// Frequency-filter cutoff in [0, 1]; strict comparator.
    pub threshold: f64,
    pub impute_method: ImputeMethod,
    #[serde(default)]
    pub use_ordinal_encoding: bool,
    #[serde(default = "default_stats")]
    pub stats_functions: Vec<Stat>,
    /// Quantile count for numeric discretization.
    #[serde(default = "default_quantiles")]
    pub quantiles: usize,
}

fn default_stats() -> Vec<Stat> {
    vec![Stat::Mean, Stat::Min, Stat::Max]
}

fn default_quantiles() -> usize {
    5
}

impl FeatureConfig {
    /// Checks every field; also exercised by [`FeatureConfig::grid`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        TimeGrid::new(self.t_max, self.dt)?;
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.threshold));
        }
        if self.quantiles < 2 {
            return Err(ConfigError::TooFewQuantiles(self.quantiles));
        }
        Ok(())
    }

    /// The shared time grid implied by `(t_max, dt)`.
    pub fn grid(&self) -> Result<TimeGrid, GridError> {
        TimeGrid::new(self.t_max, self.dt)
    }

    /// Loads a configuration from a TOML file and validates it.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config: FeatureConfig = toml::from_str(&toml_string)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration to a human-readable TOML file.
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn config() -> FeatureConfig {
        FeatureConfig {
            t_max: 48.0,
            dt: 1.0,
            threshold: 0.5,
            impute_method: ImputeMethod::Ffill,
            use_ordinal_encoding: false,
            stats_functions: vec![Stat::Mean, Stat::Max],
            quantiles: 5,
        }
    }

    #[test]
    fn toml_round_trip_preserves_the_config() {
        let original = config();
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        original.save(path).unwrap();
        let loaded = FeatureConfig::load(path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn defaults_fill_in_optional_fields() {
        let parsed: FeatureConfig = toml::from_str(
            "t_max = 24.0\ndt = 2.0\nthreshold = 0.1\nimpute_method = \"mean\"\n",
        )
        .unwrap();
        assert!(!parsed.use_ordinal_encoding);
        assert_eq!(parsed.stats_functions, default_stats());
        assert_eq!(parsed.quantiles, 5);
    }

    #[test]
    fn unknown_impute_method_is_rejected_at_parse_time() {
        let err = toml::from_str::<FeatureConfig>(
            "t_max = 24.0\ndt = 2.0\nthreshold = 0.1\nimpute_method = \"zero\"\n",
        );
        assert!(err.is_err());
    }

    #[test]
    fn invalid_fields_fail_validation() {
        let mut bad = config();
        bad.dt = 0.0;
        assert!(matches!(bad.validate(), Err(ConfigError::Grid(_))));

        let mut bad = config();
        bad.threshold = 1.5;
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::ThresholdOutOfRange(_))
        ));

        let mut bad = config();
        bad.quantiles = 1;
        assert!(matches!(bad.validate(), Err(ConfigError::TooFewQuantiles(1))));
    }
}
