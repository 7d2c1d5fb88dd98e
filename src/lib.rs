//! Synheart Fusion - Multi-modal behavioral anomaly detection
//!
//! Fusion scores independent behavioral streams for one user against a
//! per-modality baseline, then combines them into a single decision through a
//! deterministic pipeline: modality scoring → temporal alignment → weighted
//! fusion → threshold decision.
//!
//! ## Modalities
//!
//! - **Typing**: key hold and flight times
//! - **App usage**: session duration and hour of day
//! - **Sensor**: accelerometer readings

pub mod align;
pub mod bundle;
pub mod config;
pub mod dataset;
pub mod decision;
pub mod error;
pub mod features;
pub mod fusion;
pub mod pipeline;
pub mod scorer;
pub mod scoring;
pub mod sink;
pub mod types;

pub use align::{ScoredStreams, TemporalAligner};
pub use bundle::{EventBatch, UserBundle};
pub use config::{FusionConfig, FusionWeights};
pub use decision::{decide, decide_with_threshold};
pub use error::FusionError;
pub use fusion::Fuser;
pub use pipeline::{check_anomaly, AnomalyDetector};
pub use scorer::{AppUsageScorer, ModalityScorer, SensorScorer, TypingScorer};
pub use scoring::{ModelConfig, ScoringCapability, ScoringModel};
pub use sink::{CsvAppendLog, ScoreSink};
pub use types::{
    AlignedRecord, AnomalyDecision, AppUsageEvent, CheckResponse, FusedRecord, FusionReport,
    Modality, ScoredRecord, SensorEvent, TypingEvent,
};

/// Fusion version embedded in every report
pub const FUSION_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "synheart-fusion";
