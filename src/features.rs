//! Per-modality feature extraction
//!
//! Each event type knows which numeric columns its modality is scored on.
//! Derived columns are recomputed from the event itself on every call and
//! never trusted from upstream input.

use chrono::{DateTime, Timelike, Utc};

use crate::types::{AppUsageEvent, Modality, SensorEvent, TypingEvent};

/// An event that can be scored by a modality scorer
pub trait ModalityEvent {
    /// Modality this event belongs to
    const MODALITY: Modality;

    /// Names of the columns returned by [`ModalityEvent::features`], in order
    fn feature_names() -> &'static [&'static str];

    fn user(&self) -> &str;

    fn timestamp(&self) -> DateTime<Utc>;

    /// Numeric feature vector used for training and scoring
    fn features(&self) -> Vec<f64>;
}

impl ModalityEvent for TypingEvent {
    const MODALITY: Modality = Modality::Typing;

    fn feature_names() -> &'static [&'static str] {
        &["hold_time", "flight_time"]
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn features(&self) -> Vec<f64> {
        vec![self.hold_time, self.flight_time]
    }
}

impl AppUsageEvent {
    /// Local wall-clock hour (0-23) of the session timestamp
    pub fn hour_of_day(&self) -> u32 {
        self.timestamp.hour()
    }
}

impl ModalityEvent for AppUsageEvent {
    const MODALITY: Modality = Modality::App;

    fn feature_names() -> &'static [&'static str] {
        &["duration_minutes", "hour_of_day"]
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp.with_timezone(&Utc)
    }

    fn features(&self) -> Vec<f64> {
        vec![self.duration_minutes, self.hour_of_day() as f64]
    }
}

impl ModalityEvent for SensorEvent {
    const MODALITY: Modality = Modality::Sensor;

    fn feature_names() -> &'static [&'static str] {
        &["accel_x", "accel_y", "accel_z"]
    }

    fn user(&self) -> &str {
        &self.user
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn features(&self) -> Vec<f64> {
        vec![self.accel_x, self.accel_y, self.accel_z]
    }
}

/// Build the feature matrix for a batch, one row per event
pub fn feature_matrix<E: ModalityEvent>(events: &[E]) -> Vec<Vec<f64>> {
    events.iter().map(ModalityEvent::features).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_app_hour_of_day_follows_timestamp() {
        let mut event = AppUsageEvent {
            user: "user1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 3, 45, 0).unwrap().fixed_offset(),
            app: Some("YouTube".to_string()),
            duration_minutes: 18.0,
        };
        assert_eq!(event.features(), vec![18.0, 3.0]);

        event.timestamp = Utc.with_ymd_and_hms(2024, 1, 15, 22, 10, 0).unwrap().fixed_offset();
        assert_eq!(event.features(), vec![18.0, 22.0]);
    }

    #[test]
    fn test_app_hour_of_day_uses_written_offset() {
        let json = r#"{
            "user": "user1",
            "timestamp": "2024-01-15T03:00:00+05:00",
            "duration_minutes": 5.0
        }"#;
        let event: AppUsageEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.hour_of_day(), 3);
        assert_eq!(event.features(), vec![5.0, 3.0]);
        // alignment still sees the UTC instant
        assert_eq!(
            ModalityEvent::timestamp(&event),
            Utc.with_ymd_and_hms(2024, 1, 14, 22, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_feature_names_match_vector_length() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let typing = TypingEvent {
            user: "u".to_string(),
            timestamp: ts,
            hold_time: 0.1,
            flight_time: 0.2,
        };
        let sensor = SensorEvent {
            user: "u".to_string(),
            timestamp: ts,
            accel_x: 0.0,
            accel_y: 0.1,
            accel_z: 9.8,
            gyro_x: Some(0.5),
            gyro_y: None,
            gyro_z: None,
        };

        assert_eq!(typing.features().len(), TypingEvent::feature_names().len());
        assert_eq!(sensor.features().len(), SensorEvent::feature_names().len());
        assert_eq!(sensor.features(), vec![0.0, 0.1, 9.8]);
    }

    #[test]
    fn test_feature_matrix_preserves_order() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
        let events: Vec<TypingEvent> = (0..3)
            .map(|i| TypingEvent {
                user: "u".to_string(),
                timestamp: ts,
                hold_time: i as f64,
                flight_time: 0.0,
            })
            .collect();

        let matrix = feature_matrix(&events);
        assert_eq!(matrix.iter().map(|r| r[0]).collect::<Vec<_>>(), vec![0.0, 1.0, 2.0]);
    }
}
