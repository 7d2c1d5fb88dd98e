//! Scoring capabilities
//!
//! A scoring capability fits a normality model on baseline feature vectors and
//! returns a trained, read-only model. Models report a decision value per row
//! where higher means more normal; scorers negate it into an anomaly score.

pub mod deviation;
pub mod isolation_forest;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::FusionError;

pub use deviation::BaselineDeviation;
pub use isolation_forest::{IsolationForest, IsolationForestParams};

/// Fits a normality model from baseline samples
pub trait ScoringCapability: Send + Sync {
    /// Short identifier used in logs and reports
    fn name(&self) -> &'static str;

    /// Fit a model on the given feature rows
    fn train(&self, samples: &[Vec<f64>]) -> Result<Arc<dyn ScoringModel>, FusionError>;
}

/// A trained normality model. Immutable once built.
pub trait ScoringModel: Send + Sync + fmt::Debug {
    /// One decision value per row, higher = more normal
    fn decision_function(&self, samples: &[Vec<f64>]) -> Vec<f64>;
}

/// Which capability each modality scorer is built with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelConfig {
    IsolationForest(IsolationForestParams),
    BaselineDeviation,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::IsolationForest(IsolationForestParams::default())
    }
}

impl ModelConfig {
    /// Validate parameters and build the capability
    pub fn build(&self) -> Result<Arc<dyn ScoringCapability>, FusionError> {
        match self {
            ModelConfig::IsolationForest(params) => {
                Ok(Arc::new(IsolationForest::new(params.clone())?))
            }
            ModelConfig::BaselineDeviation => Ok(Arc::new(BaselineDeviation)),
        }
    }
}

/// Check that a feature matrix is non-empty, rectangular and finite.
///
/// Returns the number of feature columns.
pub(crate) fn check_matrix(samples: &[Vec<f64>]) -> Result<usize, FusionError> {
    let first = samples.first().ok_or_else(|| {
        FusionError::InsufficientData("no baseline samples to train on".to_string())
    })?;
    let width = first.len();
    if width == 0 {
        return Err(FusionError::InsufficientData(
            "baseline samples have no features".to_string(),
        ));
    }

    for (i, row) in samples.iter().enumerate() {
        if row.len() != width {
            return Err(FusionError::ParseError(format!(
                "row {} has {} features, expected {}",
                i,
                row.len(),
                width
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(FusionError::ParseError(format!(
                "row {} contains a non-finite feature",
                i
            )));
        }
    }

    Ok(width)
}
