//! Fusion configuration
//!
//! Configuration is an immutable value built once (defaults, JSON or a JSON
//! file) and handed to the detector at construction time.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::FusionError;
use crate::scorer::DEFAULT_REFERENCE_USER;
use crate::scoring::ModelConfig;
use crate::types::Modality;

/// Default alignment tolerance in seconds (10 minutes)
pub const DEFAULT_TOLERANCE_SECS: i64 = 600;

/// Default decision threshold
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Per-modality trust weights, each finite and `>= 0`.
///
/// Only built through validating constructors, so every instance holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WeightsDef")]
pub struct FusionWeights {
    typing: f64,
    app: f64,
    sensor: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            typing: 0.5,
            app: 0.3,
            sensor: 0.2,
        }
    }
}

/// Unchecked wire form of [`FusionWeights`]
#[derive(Deserialize)]
#[serde(default)]
struct WeightsDef {
    typing: f64,
    app: f64,
    sensor: f64,
}

impl Default for WeightsDef {
    fn default() -> Self {
        let weights = FusionWeights::default();
        Self {
            typing: weights.typing,
            app: weights.app,
            sensor: weights.sensor,
        }
    }
}

impl TryFrom<WeightsDef> for FusionWeights {
    type Error = FusionError;

    fn try_from(raw: WeightsDef) -> Result<Self, Self::Error> {
        FusionWeights::new(raw.typing, raw.app, raw.sensor)
    }
}

impl FusionWeights {
    pub fn new(typing: f64, app: f64, sensor: f64) -> Result<Self, FusionError> {
        let weights = Self {
            typing,
            app,
            sensor,
        };
        weights.validate()?;
        Ok(weights)
    }

    /// Build weights from a `modality name -> weight` map.
    ///
    /// Modalities missing from the map get weight 0; unknown names are rejected.
    pub fn from_map(map: &HashMap<String, f64>) -> Result<Self, FusionError> {
        let mut weights = Self {
            typing: 0.0,
            app: 0.0,
            sensor: 0.0,
        };
        for (name, weight) in map {
            match name.parse::<Modality>()? {
                Modality::Typing => weights.typing = *weight,
                Modality::App => weights.app = *weight,
                Modality::Sensor => weights.sensor = *weight,
            }
        }
        weights.validate()?;
        Ok(weights)
    }

    pub fn weight(&self, modality: Modality) -> f64 {
        match modality {
            Modality::Typing => self.typing,
            Modality::App => self.app,
            Modality::Sensor => self.sensor,
        }
    }

    /// Sum of all configured weights
    pub fn total(&self) -> f64 {
        Modality::ALL.iter().map(|m| self.weight(*m)).sum()
    }

    pub fn validate(&self) -> Result<(), FusionError> {
        for modality in Modality::ALL {
            let w = self.weight(modality);
            if !w.is_finite() || w < 0.0 {
                return Err(FusionError::InvalidConfig(format!(
                    "{} weight must be a finite value >= 0, got {}",
                    modality, w
                )));
            }
        }
        Ok(())
    }
}

/// Complete detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Per-modality fusion weights
    pub weights: FusionWeights,
    /// Maximum time difference for cross-stream matches, in seconds (inclusive)
    pub tolerance_secs: i64,
    /// Fused scores strictly above this are anomalous
    pub threshold: f64,
    /// Identity whose events form the training baseline
    pub reference_user: String,
    /// Scoring capability used by every modality scorer
    pub model: ModelConfig,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
            threshold: DEFAULT_THRESHOLD,
            reference_user: DEFAULT_REFERENCE_USER.to_string(),
            model: ModelConfig::default(),
        }
    }
}

impl FusionConfig {
    /// Parse and validate a JSON configuration; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self, FusionError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self, FusionError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String, FusionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Alignment tolerance; fails when `tolerance_secs` is negative or out of range
    pub fn tolerance(&self) -> Result<Duration, FusionError> {
        if self.tolerance_secs < 0 {
            return Err(FusionError::InvalidConfig(format!(
                "tolerance_secs must be >= 0, got {}",
                self.tolerance_secs
            )));
        }
        Duration::try_seconds(self.tolerance_secs).ok_or_else(|| {
            FusionError::InvalidConfig(format!(
                "tolerance_secs {} is out of range",
                self.tolerance_secs
            ))
        })
    }

    pub fn validate(&self) -> Result<(), FusionError> {
        self.weights.validate()?;
        self.tolerance()?;
        if !self.threshold.is_finite() {
            return Err(FusionError::InvalidConfig(
                "threshold must be finite".to_string(),
            ));
        }
        if self.reference_user.trim().is_empty() {
            return Err(FusionError::InvalidConfig(
                "reference_user must not be empty".to_string(),
            ));
        }
        self.model.build()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_weights_sum_to_one() {
        let weights = FusionWeights::default();
        assert!((weights.total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_weight_rejected() {
        assert!(matches!(
            FusionWeights::new(0.5, -0.1, 0.2),
            Err(FusionError::InvalidConfig(_))
        ));
        assert!(FusionWeights::new(f64::NAN, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_weights_from_map() {
        let mut map = HashMap::new();
        map.insert("typing".to_string(), 0.7);
        map.insert("sensor".to_string(), 0.3);

        let weights = FusionWeights::from_map(&map).unwrap();
        assert_eq!(weights, FusionWeights::new(0.7, 0.0, 0.3).unwrap());

        map.insert("gps".to_string(), 0.1);
        assert!(FusionWeights::from_map(&map).is_err());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = FusionConfig::from_json(r#"{"threshold": 0.8, "weights": {"app": 0.0}}"#)
            .unwrap();

        assert_eq!(config.threshold, 0.8);
        assert_eq!(config.weights.weight(Modality::App), 0.0);
        assert_eq!(config.weights.weight(Modality::Typing), 0.5);
        assert_eq!(config.tolerance().unwrap(), Duration::minutes(10));
        assert_eq!(config.reference_user, "user1");
    }

    #[test]
    fn test_config_round_trip_and_validation() {
        let config = FusionConfig::default();
        let loaded = FusionConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(config, loaded);

        assert!(FusionConfig::from_json(r#"{"tolerance_secs": -1}"#).is_err());
        assert!(FusionConfig::from_json(r#"{"reference_user": " "}"#).is_err());
        assert!(FusionConfig::from_json(
            r#"{"model": {"kind": "isolation_forest", "contamination": 0.9}}"#
        )
        .is_err());
    }

    #[test]
    fn test_default_instances_are_independent() {
        let mut a = FusionConfig::default();
        a.weights = FusionWeights::new(0.9, 0.3, 0.2).unwrap();
        let b = FusionConfig::default();
        assert_eq!(b.weights.weight(Modality::Typing), 0.5);
    }

    #[test]
    fn test_huge_tolerance_rejected() {
        let result = FusionConfig::from_json(r#"{"tolerance_secs": 9223372036854775807}"#);
        assert!(matches!(result, Err(FusionError::InvalidConfig(_))));

        let config = FusionConfig {
            tolerance_secs: i64::MAX,
            ..Default::default()
        };
        assert!(matches!(config.tolerance(), Err(FusionError::InvalidConfig(_))));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_weight_in_json_rejected() {
        assert!(FusionConfig::from_json(r#"{"weights": {"sensor": -0.2}}"#).is_err());

        let weights: FusionWeights = serde_json::from_str(r#"{"typing": 1.0}"#).unwrap();
        assert_eq!(weights, FusionWeights::new(1.0, 0.3, 0.2).unwrap());
    }
}
