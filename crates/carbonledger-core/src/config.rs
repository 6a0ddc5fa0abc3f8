//! Calculation settings shared by the pipeline, loaders, and CLI.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! default_locale = "AUTO"
//! dataset_priority = ["DEFRA_2024", "EPA_2024"]
//! gwp_set = "AR6"
//!
//! [quality.weights]
//! source = 0.4
//! temporal = 0.2
//! geographic = 0.2
//! completeness = 0.2
//!
//! [uncertainty]
//! enabled = true
//! iterations = 10000
//! seed = 42
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::activity::LocaleHint;
use crate::factor::{DatasetKind, GwpSet};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcConfig {
    /// Locale applied to records that carry `AUTO`.
    pub default_locale: LocaleHint,
    /// Datasets searched, in order, when a record names none.
    pub dataset_priority: Vec<String>,
    pub gwp_set: GwpSet,
    /// Region code → member country codes, tried before `GLOBAL`.
    pub regions: BTreeMap<String, Vec<String>>,
    pub quality: QualityConfig,
    pub uncertainty: UncertaintyConfig,
}

impl Default for CalcConfig {
    fn default() -> Self {
        Self {
            default_locale: LocaleHint::Auto,
            dataset_priority: default_dataset_priority(),
            gwp_set: GwpSet::Ar6,
            regions: default_regions(),
            quality: QualityConfig::default(),
            uncertainty: UncertaintyConfig::default(),
        }
    }
}

fn default_dataset_priority() -> Vec<String> {
    ["DEFRA_2024", "EPA_2024", "EXIOBASE_2020", "CBAM_DEFAULT"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_regions() -> BTreeMap<String, Vec<String>> {
    let eu27 = [
        "AT", "BE", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR", "DE", "GR", "HU", "IE", "IT",
        "LV", "LT", "LU", "MT", "NL", "PL", "PT", "RO", "SK", "SI", "ES", "SE",
    ];
    let mut regions = BTreeMap::new();
    regions.insert("EU".to_string(), eu27.into_iter().map(String::from).collect());
    regions
}

impl CalcConfig {
    /// Read and validate a TOML config file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), "loaded calculation config");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.quality.weights.validate()?;
        if self.dataset_priority.is_empty() {
            return Err(ConfigError::Invalid(
                "dataset_priority must name at least one dataset".into(),
            ));
        }
        if self.uncertainty.iterations == 0 {
            return Err(ConfigError::Invalid(
                "uncertainty.iterations must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Regions that list `country` as a member, in code order.
    pub fn regions_for(&self, country: &str) -> Vec<&str> {
        self.regions
            .iter()
            .filter(|(_, members)| members.iter().any(|m| m.eq_ignore_ascii_case(country)))
            .map(|(code, _)| code.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub weights: QualityWeights,
    /// Factors up to this many years older than the reporting year score full marks.
    pub max_factor_age_years: u32,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            weights: QualityWeights::default(),
            max_factor_age_years: 2,
        }
    }
}

/// Composite weights; must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub source: f64,
    pub temporal: f64,
    pub geographic: f64,
    pub completeness: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            source: 0.4,
            temporal: 0.2,
            geographic: 0.2,
            completeness: 0.2,
        }
    }
}

impl QualityWeights {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, weight) in [
            ("source", self.source),
            ("temporal", self.temporal),
            ("geographic", self.geographic),
            ("completeness", self.completeness),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::Invalid(format!(
                    "{name} weight must be between 0.0 and 1.0"
                )));
            }
        }
        let sum = self.source + self.temporal + self.geographic + self.completeness;
        if (sum - 1.0).abs() > 0.001 {
            return Err(ConfigError::Invalid(format!(
                "quality weights must sum to 1.0, but sum to {sum:.3}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UncertaintyConfig {
    pub enabled: bool,
    pub iterations: u32,
    /// Fixed RNG seed for reproducible runs; entropy-seeded when absent.
    pub seed: Option<u64>,
    /// Used when a record carries no activity uncertainty.
    pub default_activity_pct: f64,
    /// Used when a factor publishes no uncertainty.
    pub default_factor_pct: FactorUncertaintyDefaults,
}

impl Default for UncertaintyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            iterations: 10_000,
            seed: None,
            default_activity_pct: 5.0,
            default_factor_pct: FactorUncertaintyDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactorUncertaintyDefaults {
    pub measured: f64,
    pub calculated: f64,
    pub estimated: f64,
    pub default: f64,
}

impl Default for FactorUncertaintyDefaults {
    fn default() -> Self {
        Self {
            measured: 5.0,
            calculated: 10.0,
            estimated: 20.0,
            default: 30.0,
        }
    }
}

impl FactorUncertaintyDefaults {
    pub fn for_kind(&self, kind: DatasetKind) -> f64 {
        match kind {
            DatasetKind::Measured => self.measured,
            DatasetKind::Calculated => self.calculated,
            DatasetKind::Estimated => self.estimated,
            DatasetKind::Default => self.default,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = CalcConfig::from_toml_str("").unwrap();
        assert_eq!(config, CalcConfig::default());
        assert_eq!(config.dataset_priority[0], "DEFRA_2024");
        assert_eq!(config.gwp_set, GwpSet::Ar6);
    }

    #[test]
    fn partial_toml_overrides() {
        let config = CalcConfig::from_toml_str(
            r#"
            default_locale = "EU"
            gwp_set = "AR5"

            [uncertainty]
            enabled = true
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.default_locale, LocaleHint::Eu);
        assert_eq!(config.gwp_set, GwpSet::Ar5);
        assert!(config.uncertainty.enabled);
        assert_eq!(config.uncertainty.seed, Some(7));
        assert_eq!(config.uncertainty.iterations, 10_000);
    }

    #[test]
    fn weights_must_sum_to_one() {
        let err = CalcConfig::from_toml_str(
            r#"
            [quality.weights]
            source = 0.5
            temporal = 0.5
            geographic = 0.5
            completeness = 0.5
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn weight_out_of_range_rejected() {
        let mut config = CalcConfig::default();
        config.quality.weights.source = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_dataset_priority_rejected() {
        let err = CalcConfig::from_toml_str("dataset_priority = []").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn regions_for_country() {
        let config = CalcConfig::default();
        assert_eq!(config.regions_for("de"), vec!["EU"]);
        assert!(config.regions_for("US").is_empty());
    }

    #[test]
    fn from_path_reads_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("carbonledger.toml");
        std::fs::write(&path, "dataset_priority = [\"EPA_2024\"]\n").unwrap();
        let config = CalcConfig::from_path(&path).unwrap();
        assert_eq!(config.dataset_priority, vec!["EPA_2024".to_string()]);
    }

    #[test]
    fn from_path_missing_file() {
        let err = CalcConfig::from_path(Path::new("/nonexistent/carbonledger.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
