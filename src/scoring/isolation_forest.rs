//! Isolation forest normality model
//!
//! Random axis-aligned partitions isolate outliers in fewer splits than
//! inliers. The decision value is the negated normalised path-length score
//! shifted so that the `contamination` fraction of the baseline falls below
//! zero. Trees are grown from a seeded ChaCha RNG, so training is repeatable.

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::{check_matrix, ScoringCapability, ScoringModel};
use crate::error::FusionError;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Isolation forest hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationForestParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Subsample size per tree (capped at the baseline size)
    pub max_samples: usize,
    /// Expected outlier fraction of the baseline, in (0, 0.5]
    pub contamination: f64,
    /// RNG seed
    pub seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.05,
            seed: 42,
        }
    }
}

/// Isolation forest scoring capability
#[derive(Debug, Clone)]
pub struct IsolationForest {
    params: IsolationForestParams,
}

impl IsolationForest {
    pub fn new(params: IsolationForestParams) -> Result<Self, FusionError> {
        if params.n_estimators == 0 {
            return Err(FusionError::InvalidConfig(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if params.max_samples == 0 {
            return Err(FusionError::InvalidConfig(
                "max_samples must be at least 1".to_string(),
            ));
        }
        if !(params.contamination > 0.0 && params.contamination <= 0.5) {
            return Err(FusionError::InvalidConfig(format!(
                "contamination must be in (0, 0.5], got {}",
                params.contamination
            )));
        }
        Ok(Self { params })
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self {
            params: IsolationForestParams::default(),
        }
    }
}

impl ScoringCapability for IsolationForest {
    fn name(&self) -> &'static str {
        "isolation_forest"
    }

    fn train(&self, samples: &[Vec<f64>]) -> Result<Arc<dyn ScoringModel>, FusionError> {
        check_matrix(samples)?;

        let mut rng = ChaCha8Rng::seed_from_u64(self.params.seed);
        let sample_size = self.params.max_samples.min(samples.len());
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;

        let trees = (0..self.params.n_estimators)
            .map(|_| {
                let rows = index::sample(&mut rng, samples.len(), sample_size).into_vec();
                grow(samples, rows, 0, max_depth, &mut rng)
            })
            .collect();

        let mut model = IsolationForestModel {
            trees,
            sample_size,
            offset: 0.0,
        };

        let mut baseline_scores = model.score_samples(samples);
        baseline_scores.sort_by(f64::total_cmp);
        model.offset = percentile(&baseline_scores, self.params.contamination * 100.0);

        debug!(
            trees = self.params.n_estimators,
            sample_size,
            offset = model.offset,
            "isolation forest trained"
        );

        Ok(Arc::new(model))
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Trained forest
#[derive(Debug)]
pub struct IsolationForestModel {
    trees: Vec<Node>,
    sample_size: usize,
    offset: f64,
}

impl IsolationForestModel {
    /// Raw score in [-1, 0), lower is more anomalous
    fn score_samples(&self, samples: &[Vec<f64>]) -> Vec<f64> {
        let normaliser = average_path_length(self.sample_size).max(f64::EPSILON);
        samples
            .iter()
            .map(|row| {
                let total: f64 = self.trees.iter().map(|t| path_length(t, row, 0)).sum();
                let mean = total / self.trees.len() as f64;
                -(2f64.powf(-mean / normaliser))
            })
            .collect()
    }
}

impl ScoringModel for IsolationForestModel {
    fn decision_function(&self, samples: &[Vec<f64>]) -> Vec<f64> {
        self.score_samples(samples)
            .into_iter()
            .map(|s| s - self.offset)
            .collect()
    }
}

fn grow(
    samples: &[Vec<f64>],
    rows: Vec<usize>,
    depth: usize,
    max_depth: usize,
    rng: &mut ChaCha8Rng,
) -> Node {
    if depth >= max_depth || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    // Only features that still vary inside this node can split it
    let width = samples[rows[0]].len();
    let candidates: Vec<(usize, f64, f64)> = (0..width)
        .filter_map(|f| {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                (lo.min(samples[r][f]), hi.max(samples[r][f]))
            });
            (hi > lo).then_some((f, lo, hi))
        })
        .collect();

    if candidates.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&r| samples[r][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(samples, left, depth + 1, max_depth, rng)),
        right: Box::new(grow(samples, right, depth + 1, max_depth, rng)),
    }
}

fn path_length(node: &Node, row: &[f64], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if row[*feature] <= *threshold {
                path_length(left, row, depth + 1)
            } else {
                path_length(right, row, depth + 1)
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile of an ascending slice
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
