//! Detection pipeline orchestration
//!
//! This module provides the public API for anomaly checks. A detector is built
//! once from configuration and baseline data, then serves any number of
//! requests: score each modality → align → fuse → decide.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::align::{ScoredStreams, TemporalAligner};
use crate::bundle::{EventBatch, UserBundle};
use crate::config::FusionConfig;
use crate::decision::decide_with_threshold;
use crate::error::FusionError;
use crate::features::ModalityEvent;
use crate::fusion::Fuser;
use crate::scorer::{AppUsageScorer, ModalityScorer, SensorScorer, TypingScorer};
use crate::sink::ScoreSink;
use crate::types::{
    AnomalyDecision, CheckResponse, FusedRecord, FusionReport, Modality, Producer,
    ScoredCounts, ScoredRecord,
};
use crate::{FUSION_VERSION, PRODUCER_NAME};

/// Train a detector and check one bundle (stateless, one-shot).
///
/// # Arguments
/// * `config` - Detector configuration
/// * `baseline` - Baseline events for all modalities
/// * `bundle_json` - Request bundle JSON
///
/// # Returns
/// `CheckResponse` JSON string
pub fn check_anomaly(
    config: FusionConfig,
    baseline: &EventBatch,
    bundle_json: &str,
) -> Result<String, FusionError> {
    let detector = AnomalyDetector::train(config, baseline)?;
    detector.check_json(bundle_json)
}

/// Long-lived detector holding one trained scorer per modality.
///
/// Request methods take `&self` and never mutate the trained models, so a
/// single detector can be shared across threads.
pub struct AnomalyDetector {
    config: FusionConfig,
    typing: TypingScorer,
    app: AppUsageScorer,
    sensor: SensorScorer,
    aligner: TemporalAligner,
    fuser: Fuser,
    score_log: Option<Arc<dyn ScoreSink>>,
    instance_id: String,
}

impl AnomalyDetector {
    /// Create a detector with untrained scorers
    pub fn new(config: FusionConfig) -> Result<Self, FusionError> {
        config.validate()?;
        let capability = config.model.build()?;

        Ok(Self {
            typing: ModalityScorer::new(config.reference_user.clone(), capability.clone()),
            app: ModalityScorer::new(config.reference_user.clone(), capability.clone()),
            sensor: ModalityScorer::new(config.reference_user.clone(), capability),
            aligner: TemporalAligner::new(config.tolerance()?),
            fuser: Fuser::new(config.weights),
            score_log: None,
            instance_id: Uuid::new_v4().to_string(),
            config,
        })
    }

    /// Create a detector and train every modality on `baseline`.
    ///
    /// A modality without reference baseline events is left untrained and
    /// logged; the others stay usable.
    pub fn train(config: FusionConfig, baseline: &EventBatch) -> Result<Self, FusionError> {
        let mut detector = Self::new(config)?;
        train_or_skip(&mut detector.typing, &baseline.typing)?;
        train_or_skip(&mut detector.app, &baseline.app_usage)?;
        train_or_skip(&mut detector.sensor, &baseline.sensor)?;
        Ok(detector)
    }

    /// Append every scored batch to `sink`
    pub fn with_score_log(mut self, sink: Arc<dyn ScoreSink>) -> Self {
        self.score_log = Some(sink);
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Modalities whose scorer is trained
    pub fn ready_modalities(&self) -> Vec<Modality> {
        Modality::ALL
            .into_iter()
            .filter(|m| self.is_ready(*m))
            .collect()
    }

    pub fn is_ready(&self, modality: Modality) -> bool {
        match modality {
            Modality::Typing => self.typing.is_trained(),
            Modality::App => self.app.is_trained(),
            Modality::Sensor => self.sensor.is_trained(),
        }
    }

    /// Score every non-empty modality of a batch
    pub fn score(&self, batch: &EventBatch) -> Result<ScoredStreams, FusionError> {
        Ok(ScoredStreams {
            typing: self.score_modality(&self.typing, &batch.typing)?,
            app: self.score_modality(&self.app, &batch.app_usage)?,
            sensor: self.score_modality(&self.sensor, &batch.sensor)?,
        })
    }

    /// Score, align and fuse a batch
    pub fn fuse(&self, batch: &EventBatch) -> Result<Vec<FusedRecord>, FusionError> {
        let streams = self.score(batch)?;
        Ok(self.fuse_streams(&streams))
    }

    /// Align and fuse already scored streams
    pub fn fuse_streams(&self, streams: &ScoredStreams) -> Vec<FusedRecord> {
        if streams.is_empty() {
            debug!("no scored records, nothing to fuse");
            return Vec::new();
        }
        self.fuser.fuse(self.aligner.align(streams))
    }

    /// Decide on a fused table with the configured threshold
    pub fn decide(&self, fused: &[FusedRecord]) -> AnomalyDecision {
        decide_with_threshold(fused, self.config.threshold)
    }

    /// Run a bundle through the full pipeline
    pub fn check(&self, bundle: UserBundle, now: DateTime<Utc>) -> Result<CheckResponse, FusionError> {
        if bundle.is_empty() {
            debug!("empty bundle, nothing to check");
            return Ok(AnomalyDecision::default().into());
        }
        let batch = bundle.into_events(now)?;
        let fused = self.fuse(&batch)?;
        Ok(self.decide(&fused).into())
    }

    /// Check a bundle given as JSON and return `CheckResponse` JSON
    pub fn check_json(&self, bundle_json: &str) -> Result<String, FusionError> {
        let bundle = UserBundle::from_json(bundle_json)?;
        let response = self.check(bundle, Utc::now())?;
        Ok(serde_json::to_string(&response)?)
    }

    /// Run a bundle through the pipeline and keep every fused row
    pub fn report(&self, bundle: UserBundle, now: DateTime<Utc>) -> Result<FusionReport, FusionError> {
        let batch = bundle.into_events(now)?;
        let streams = self.score(&batch)?;
        let rows = self.fuse_streams(&streams);

        Ok(FusionReport {
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: FUSION_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: Utc::now().to_rfc3339(),
            decision: self.decide(&rows),
            scored_counts: ScoredCounts {
                typing: streams.typing.len(),
                app: streams.app.len(),
                sensor: streams.sensor.len(),
            },
            rows,
        })
    }

    fn score_modality<E: ModalityEvent>(
        &self,
        scorer: &ModalityScorer<E>,
        events: &[E],
    ) -> Result<Vec<ScoredRecord>, FusionError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        match &self.score_log {
            Some(sink) => scorer.score_and_log(events, sink.as_ref()),
            None => scorer.score(events),
        }
    }
}

fn train_or_skip<E: ModalityEvent>(
    scorer: &mut ModalityScorer<E>,
    baseline: &[E],
) -> Result<(), FusionError> {
    match scorer.train(baseline) {
        Ok(()) => Ok(()),
        Err(FusionError::InsufficientData(reason)) => {
            warn!(modality = %E::MODALITY, %reason, "modality left untrained");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{SensorInput, TypingInput};
    use crate::config::FusionWeights;
    use crate::scoring::ModelConfig;
    use crate::types::{AppUsageEvent, SensorEvent, TypingEvent};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn config() -> FusionConfig {
        FusionConfig {
            model: ModelConfig::BaselineDeviation,
            ..Default::default()
        }
    }

    fn baseline() -> EventBatch {
        EventBatch {
            typing: (0..40)
                .map(|i| TypingEvent {
                    user: "user1".to_string(),
                    timestamp: t0() + Duration::minutes(i),
                    hold_time: 0.10 + (i % 4) as f64 * 0.01,
                    flight_time: 0.20 + (i % 5) as f64 * 0.01,
                })
                .collect(),
            app_usage: (0..30)
                .map(|i| AppUsageEvent {
                    user: "user1".to_string(),
                    timestamp: (t0() + Duration::minutes(i * 7)).fixed_offset(),
                    app: Some("Gmail".to_string()),
                    duration_minutes: 4.0 + (i % 3) as f64,
                })
                .collect(),
            sensor: (0..50)
                .map(|i| SensorEvent {
                    user: "user1".to_string(),
                    timestamp: t0() + Duration::seconds(i * 30),
                    accel_x: 0.1 * (i % 3) as f64,
                    accel_y: 0.1 * (i % 2) as f64,
                    accel_z: 9.7 + 0.05 * (i % 4) as f64,
                    gyro_x: None,
                    gyro_y: None,
                    gyro_z: None,
                })
                .collect(),
        }
    }

    fn typing_input(user: &str, minute: i64, hold: f64, flight: f64) -> TypingInput {
        TypingInput {
            user: user.to_string(),
            timestamp: Some(t0() + Duration::minutes(minute)),
            hold_time: hold,
            flight_time: flight,
        }
    }

    #[test]
    fn test_empty_bundle_is_not_anomalous() {
        let detector = AnomalyDetector::train(config(), &baseline()).unwrap();
        let batch = UserBundle::default().into_events(t0()).unwrap();

        assert!(detector.fuse(&batch).unwrap().is_empty());
        let response = detector.check(UserBundle::default(), t0()).unwrap();
        assert_eq!(
            response,
            CheckResponse {
                anomaly: false,
                fusion_score: 0.0
            }
        );
    }

    #[test]
    fn test_foreign_typing_flagged() {
        let detector = AnomalyDetector::train(config(), &baseline()).unwrap();
        let bundle = UserBundle {
            typing: vec![
                typing_input("user2", 0, 0.6, 1.2),
                typing_input("user2", 1, 0.7, 1.4),
            ],
            ..Default::default()
        };

        let response = detector.check(bundle, t0()).unwrap();
        assert!(response.anomaly);
        assert!(response.fusion_score > 0.5);
    }

    #[test]
    fn test_baseline_like_typing_not_flagged() {
        let detector = AnomalyDetector::train(config(), &baseline()).unwrap();
        let bundle = UserBundle {
            typing: vec![typing_input("user1", 0, 0.115, 0.22)],
            ..Default::default()
        };

        let response = detector.check(bundle, t0()).unwrap();
        assert!(!response.anomaly);
    }

    #[test]
    fn test_untrained_modality_only_fails_when_used() {
        let mut data = baseline();
        data.sensor.clear();
        let detector = AnomalyDetector::train(config(), &data).unwrap();
        assert_eq!(
            detector.ready_modalities(),
            vec![Modality::Typing, Modality::App]
        );

        let typing_only = UserBundle {
            typing: vec![typing_input("user1", 0, 0.11, 0.21)],
            ..Default::default()
        };
        assert!(detector.check(typing_only, t0()).is_ok());

        let with_sensor = UserBundle {
            sensor: vec![SensorInput {
                user: "user1".to_string(),
                timestamp: None,
                accel_x: 0.0,
                accel_y: 0.0,
                accel_z: 9.8,
                gyro_x: None,
                gyro_y: None,
                gyro_z: None,
            }],
            ..Default::default()
        };
        assert!(matches!(
            detector.check(with_sensor, t0()),
            Err(FusionError::NotTrained(Modality::Sensor))
        ));
    }

    #[test]
    fn test_report_counts_and_rows() {
        let detector = AnomalyDetector::train(config(), &baseline()).unwrap();
        let bundle = UserBundle {
            typing: vec![
                typing_input("user1", 0, 0.11, 0.21),
                typing_input("user1", 1, 0.12, 0.22),
            ],
            ..Default::default()
        };

        let report = detector.report(bundle, t0()).unwrap();
        assert_eq!(report.scored_counts.typing, 2);
        assert_eq!(report.scored_counts.sensor, 0);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.producer.name, PRODUCER_NAME);
        assert_eq!(report.producer.instance_id, detector.instance_id());
    }

    #[test]
    fn test_fuse_streams_uses_configured_weights() {
        let config = FusionConfig {
            weights: FusionWeights::new(1.0, 0.0, 0.0).unwrap(),
            ..config()
        };
        let detector = AnomalyDetector::new(config).unwrap();
        let streams = ScoredStreams {
            typing: vec![ScoredRecord {
                user: "u1".to_string(),
                timestamp: t0(),
                modality: Modality::Typing,
                anomaly_score: 0.7,
            }],
            ..Default::default()
        };

        let fused = detector.fuse_streams(&streams);
        assert!((fused[0].fusion_score - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_check_json_round_trip() {
        let detector = AnomalyDetector::train(config(), &baseline()).unwrap();
        let json = detector
            .check_json(r#"{"typing": [{"user": "user1", "hold_time": 0.11, "flight_time": 0.21}]}"#)
            .unwrap();
        let response: CheckResponse = serde_json::from_str(&json).unwrap();
        assert!(!response.anomaly);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = FusionConfig {
            tolerance_secs: -5,
            ..Default::default()
        };
        assert!(matches!(
            AnomalyDetector::new(config),
            Err(FusionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_out_of_range_tolerance_is_config_error() {
        let config = FusionConfig {
            tolerance_secs: i64::MAX,
            ..Default::default()
        };
        assert!(matches!(
            AnomalyDetector::new(config),
            Err(FusionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_app_hour_comes_from_client_offset() {
        let detector = AnomalyDetector::train(config(), &baseline()).unwrap();
        let local = UserBundle::from_json(
            r#"{"app_usage": [{"user": "user1", "timestamp": "2024-01-15T14:00:00+05:00", "duration_minutes": 5.0}]}"#,
        )
        .unwrap();
        let utc = UserBundle::from_json(
            r#"{"app_usage": [{"user": "user1", "timestamp": "2024-01-15T14:00:00Z", "duration_minutes": 5.0}]}"#,
        )
        .unwrap();

        // same wall-clock hour, so the same score
        let local_rows = detector.report(local, t0()).unwrap().rows;
        let utc_rows = detector.report(utc, t0()).unwrap().rows;
        assert_eq!(local_rows[0].fusion_score, utc_rows[0].fusion_score);
        assert_eq!(
            local_rows[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
        );
    }
}
