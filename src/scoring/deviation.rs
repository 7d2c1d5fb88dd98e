//! Baseline deviation model
//!
//! Per-feature mean and standard deviation of the baseline; a row's decision
//! value is `1 - mean(|x - mean| / std)`, so a row sitting on the baseline mean
//! scores 1 and each standard deviation of average drift costs one unit.

use std::sync::Arc;

use super::{check_matrix, ScoringCapability, ScoringModel};
use crate::error::FusionError;

/// Floor for a feature's spread, keeps constant baselines well defined
const MIN_STD: f64 = 1e-6;

/// Baseline deviation scoring capability
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineDeviation;

impl ScoringCapability for BaselineDeviation {
    fn name(&self) -> &'static str {
        "baseline_deviation"
    }

    fn train(&self, samples: &[Vec<f64>]) -> Result<Arc<dyn ScoringModel>, FusionError> {
        let width = check_matrix(samples)?;
        let n = samples.len() as f64;

        let means: Vec<f64> = (0..width)
            .map(|f| samples.iter().map(|row| row[f]).sum::<f64>() / n)
            .collect();

        let stds: Vec<f64> = (0..width)
            .map(|f| {
                let var = samples
                    .iter()
                    .map(|row| (row[f] - means[f]).powi(2))
                    .sum::<f64>()
                    / n;
                var.sqrt().max(MIN_STD)
            })
            .collect();

        Ok(Arc::new(DeviationModel { means, stds }))
    }
}

/// Trained per-feature baseline statistics
#[derive(Debug, Clone)]
pub struct DeviationModel {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl ScoringModel for DeviationModel {
    fn decision_function(&self, samples: &[Vec<f64>]) -> Vec<f64> {
        samples
            .iter()
            .map(|row| {
                let drift: f64 = row
                    .iter()
                    .zip(self.means.iter().zip(&self.stds))
                    .map(|(x, (mean, std))| (x - mean).abs() / std)
                    .sum();
                1.0 - drift / self.means.len() as f64
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_row_scores_one() {
        let model = BaselineDeviation
            .train(&[vec![1.0, 10.0], vec![3.0, 30.0]])
            .unwrap();
        let scores = model.decision_function(&[vec![2.0, 20.0]]);
        assert!((scores[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_one_std_drift_costs_one_unit() {
        // mean 2, std 1 on both features
        let model = BaselineDeviation
            .train(&[vec![1.0, 1.0], vec![3.0, 3.0]])
            .unwrap();
        let scores = model.decision_function(&[vec![3.0, 3.0], vec![5.0, 2.0]]);
        assert!((scores[0] - 0.0).abs() < 1e-12);
        assert!((scores[1] - (1.0 - 1.5)).abs() < 1e-12);
    }

    #[test]
    fn test_constant_baseline_has_finite_scores() {
        let model = BaselineDeviation.train(&vec![vec![4.0]; 5]).unwrap();
        let scores = model.decision_function(&[vec![4.0], vec![4.5]]);
        assert_eq!(scores[0], 1.0);
        assert!(scores[1].is_finite());
        assert!(scores[1] < 0.0);
    }

    #[test]
    fn test_empty_baseline_is_insufficient() {
        assert!(matches!(
            BaselineDeviation.train(&[]),
            Err(FusionError::InsufficientData(_))
        ));
    }
}
