//! Core data types
//!
//! This module defines the records that flow through the fusion pipeline:
//! per-modality events, scored records, aligned rows and fused rows.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::dataset::timestamp;
use crate::error::FusionError;

/// Behavioral signal source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Typing,
    App,
    Sensor,
}

impl Modality {
    /// All modalities in declaration order, which is also the primary-stream tie-break order
    pub const ALL: [Modality; 3] = [Modality::Typing, Modality::App, Modality::Sensor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Typing => "typing",
            Modality::App => "app",
            Modality::Sensor => "sensor",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "typing" => Ok(Modality::Typing),
            "app" | "app_usage" => Ok(Modality::App),
            "sensor" => Ok(Modality::Sensor),
            other => Err(FusionError::InvalidConfig(format!(
                "unknown modality '{}'",
                other
            ))),
        }
    }
}

/// Keystroke timing sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingEvent {
    pub user: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    /// Key hold time in seconds
    pub hold_time: f64,
    /// Time between consecutive keys in seconds
    pub flight_time: f64,
}

/// Application usage session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppUsageEvent {
    pub user: String,
    /// Session start as written by the client; the offset sets the local hour
    #[serde(deserialize_with = "timestamp::deserialize_local")]
    pub timestamp: DateTime<FixedOffset>,
    /// Application name, carried through but never scored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    /// Session length in minutes
    pub duration_minutes: f64,
}

/// Motion sensor sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    pub user: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    /// Acceleration in m/s²
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    /// Angular velocity in rad/s, when the device reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gyro_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gyro_y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gyro_z: Option<f64>,
}

/// An event reduced to its anomaly score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub user: String,
    pub timestamp: DateTime<Utc>,
    pub modality: Modality,
    /// Unbounded, higher means further from the baseline
    pub anomaly_score: f64,
}

/// One row of the aligned table.
///
/// `None` means the modality had no record within tolerance for this row,
/// which is distinct from a present score of `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedRecord {
    pub user: String,
    pub timestamp: DateTime<Utc>,
    pub anomaly_score_typing: Option<f64>,
    pub anomaly_score_app: Option<f64>,
    pub anomaly_score_sensor: Option<f64>,
}

impl AlignedRecord {
    /// Create a row with no modality scores
    pub fn new(user: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            user: user.into(),
            timestamp,
            anomaly_score_typing: None,
            anomaly_score_app: None,
            anomaly_score_sensor: None,
        }
    }

    pub fn score(&self, modality: Modality) -> Option<f64> {
        match modality {
            Modality::Typing => self.anomaly_score_typing,
            Modality::App => self.anomaly_score_app,
            Modality::Sensor => self.anomaly_score_sensor,
        }
    }

    pub fn set_score(&mut self, modality: Modality, score: Option<f64>) {
        match modality {
            Modality::Typing => self.anomaly_score_typing = score,
            Modality::App => self.anomaly_score_app = score,
            Modality::Sensor => self.anomaly_score_sensor = score,
        }
    }
}

/// An aligned row with its fused score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedRecord {
    pub user: String,
    pub timestamp: DateTime<Utc>,
    pub fusion_score: f64,
    pub anomaly_score_typing: Option<f64>,
    pub anomaly_score_app: Option<f64>,
    pub anomaly_score_sensor: Option<f64>,
}

impl FusedRecord {
    pub fn from_aligned(aligned: AlignedRecord, fusion_score: f64) -> Self {
        Self {
            user: aligned.user,
            timestamp: aligned.timestamp,
            fusion_score,
            anomaly_score_typing: aligned.anomaly_score_typing,
            anomaly_score_app: aligned.anomaly_score_app,
            anomaly_score_sensor: aligned.anomaly_score_sensor,
        }
    }
}

/// Thresholded outcome for the most recent fused row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyDecision {
    pub is_anomaly: bool,
    pub score: f64,
}

impl Default for AnomalyDecision {
    fn default() -> Self {
        Self {
            is_anomaly: false,
            score: 0.0,
        }
    }
}

/// Response shape returned at the service boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub anomaly: bool,
    pub fusion_score: f64,
}

impl From<AnomalyDecision> for CheckResponse {
    fn from(decision: AnomalyDecision) -> Self {
        Self {
            anomaly: decision.is_anomaly,
            fusion_score: decision.score,
        }
    }
}

/// Producer metadata attached to fusion reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Producer {
    /// Name of the producing software
    pub name: String,
    /// Version of the producing software
    pub version: String,
    /// Unique instance identifier (UUID)
    pub instance_id: String,
}

/// Full output of one fusion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionReport {
    pub producer: Producer,
    /// When this report was computed (RFC3339)
    pub computed_at_utc: String,
    pub decision: AnomalyDecision,
    /// Number of records scored per modality
    pub scored_counts: ScoredCounts,
    pub rows: Vec<FusedRecord>,
}

/// Per-modality record counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredCounts {
    pub typing: usize,
    pub app: usize,
    pub sensor: usize,
}
