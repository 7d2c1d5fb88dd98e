//! Anomaly decision
//!
//! Reduces a fused table to one flag for its most recent row.

use crate::config::DEFAULT_THRESHOLD;
use crate::types::{AnomalyDecision, FusedRecord};

/// Decide on the most recent row using the default threshold
pub fn decide(fused: &[FusedRecord]) -> AnomalyDecision {
    decide_with_threshold(fused, DEFAULT_THRESHOLD)
}

/// Decide on the row with the latest timestamp; the last such row in table
/// order wins ties. A score strictly above `threshold` is anomalous. An empty
/// table is never anomalous and scores 0.
pub fn decide_with_threshold(fused: &[FusedRecord], threshold: f64) -> AnomalyDecision {
    // max_by_key returns the last maximum
    match fused.iter().max_by_key(|r| r.timestamp) {
        Some(latest) => AnomalyDecision {
            is_anomaly: latest.fusion_score > threshold,
            score: latest.fusion_score,
        },
        None => AnomalyDecision::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn fused(offset_secs: i64, score: f64) -> FusedRecord {
        FusedRecord {
            user: "u1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
                + Duration::seconds(offset_secs),
            fusion_score: score,
            anomaly_score_typing: Some(score),
            anomaly_score_app: None,
            anomaly_score_sensor: None,
        }
    }

    #[test]
    fn test_empty_table_is_not_anomalous() {
        let decision = decide(&[]);
        assert!(!decision.is_anomaly);
        assert_eq!(decision.score, 0.0);
    }

    #[test]
    fn test_uses_latest_timestamp_not_last_row() {
        let table = vec![fused(120, 0.9), fused(0, 0.1)];
        let decision = decide(&table);
        assert!(decision.is_anomaly);
        assert_eq!(decision.score, 0.9);
    }

    #[test]
    fn test_threshold_is_strict() {
        let table = vec![fused(0, 0.5)];
        assert!(!decide(&table).is_anomaly);
        assert!(decide_with_threshold(&table, 0.49).is_anomaly);
    }

    #[test]
    fn test_equal_timestamps_take_last_row() {
        let table = vec![fused(60, 0.2), fused(60, 0.8)];
        assert_eq!(decide(&table).score, 0.8);
    }
}
