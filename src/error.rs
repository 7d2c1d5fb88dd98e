//! Error types for Synheart Fusion

use crate::types::Modality;
use thiserror::Error;

/// Errors that can occur while training, scoring or fusing
#[derive(Debug, Error)]
pub enum FusionError {
    #[error("Insufficient baseline data: {0}")]
    InsufficientData(String),

    #[error("Scorer for {0} modality has not been trained")]
    NotTrained(Modality),

    #[error("Invalid {modality} record at index {index}: {reason}")]
    InvalidRecord {
        modality: Modality,
        index: usize,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
