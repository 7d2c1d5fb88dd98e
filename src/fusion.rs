//! Weighted score fusion
//!
//! `fusion_score = Σ w[m] · score[m] / Σ w[m]`, where absent scores count as 0
//! in the numerator and the denominator is the total configured weight, not
//! the weight of the modalities present on the row. A zero total falls back to
//! a denominator of 1.

use tracing::debug;

use crate::config::FusionWeights;
use crate::types::{AlignedRecord, FusedRecord, Modality};

/// Combines aligned per-modality scores into one score per row
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Fuser {
    weights: FusionWeights,
}

impl Fuser {
    pub fn new(weights: FusionWeights) -> Self {
        Self { weights }
    }

    /// Fuse every row, keeping input order
    pub fn fuse(&self, aligned: Vec<AlignedRecord>) -> Vec<FusedRecord> {
        let denominator = self.denominator();
        let fused: Vec<FusedRecord> = aligned
            .into_iter()
            .map(|row| {
                let score = self.numerator(&row) / denominator;
                FusedRecord::from_aligned(row, score)
            })
            .collect();

        debug!(rows = fused.len(), denominator, "aligned rows fused");
        fused
    }

    /// Fused score of a single row
    pub fn fuse_row(&self, row: &AlignedRecord) -> f64 {
        self.numerator(row) / self.denominator()
    }

    fn numerator(&self, row: &AlignedRecord) -> f64 {
        Modality::ALL
            .iter()
            .map(|m| self.weights.weight(*m) * row.score(*m).unwrap_or(0.0))
            .sum()
    }

    fn denominator(&self) -> f64 {
        let total = self.weights.total();
        if total > 0.0 {
            total
        } else {
            1.0
        }
    }
}

/// Fuse with the given weights
pub fn fuse(weights: &FusionWeights, aligned: Vec<AlignedRecord>) -> Vec<FusedRecord> {
    Fuser::new(*weights).fuse(aligned)
}
