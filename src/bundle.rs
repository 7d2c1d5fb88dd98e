//! Per-user request bundle
//!
//! A bundle carries zero or more raw records per modality as received from a
//! producing client. Timestamps are optional at this boundary. Records are
//! validated here so the scoring core only ever sees well-formed events.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::timestamp;
use crate::error::FusionError;
use crate::types::{AppUsageEvent, Modality, SensorEvent, TypingEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingInput {
    pub user: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub timestamp: Option<DateTime<Utc>>,
    pub hold_time: f64,
    pub flight_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppUsageInput {
    pub user: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_local_option")]
    pub timestamp: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub app: Option<String>,
    pub duration_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorInput {
    pub user: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    pub timestamp: Option<DateTime<Utc>>,
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    #[serde(default)]
    pub gyro_x: Option<f64>,
    #[serde(default)]
    pub gyro_y: Option<f64>,
    #[serde(default)]
    pub gyro_z: Option<f64>,
}

/// Raw records for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserBundle {
    #[serde(default)]
    pub typing: Vec<TypingInput>,
    #[serde(default, alias = "app")]
    pub app_usage: Vec<AppUsageInput>,
    #[serde(default)]
    pub sensor: Vec<SensorInput>,
}

/// Validated, fully timestamped events
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventBatch {
    pub typing: Vec<TypingEvent>,
    pub app_usage: Vec<AppUsageEvent>,
    pub sensor: Vec<SensorEvent>,
}

impl EventBatch {
    pub fn is_empty(&self) -> bool {
        self.typing.is_empty() && self.app_usage.is_empty() && self.sensor.is_empty()
    }
}

impl UserBundle {
    pub fn from_json(json: &str) -> Result<Self, FusionError> {
        serde_json::from_str(json)
            .map_err(|e| FusionError::ParseError(format!("Failed to parse user bundle: {}", e)))
    }

    pub fn is_empty(&self) -> bool {
        self.typing.is_empty() && self.app_usage.is_empty() && self.sensor.is_empty()
    }

    /// Check every record; the first offending record is reported
    pub fn validate(&self) -> Result<(), FusionError> {
        for (i, r) in self.typing.iter().enumerate() {
            check_user(Modality::Typing, i, &r.user)?;
            check_non_negative(Modality::Typing, i, "hold_time", r.hold_time)?;
            check_non_negative(Modality::Typing, i, "flight_time", r.flight_time)?;
        }
        for (i, r) in self.app_usage.iter().enumerate() {
            check_user(Modality::App, i, &r.user)?;
            check_non_negative(Modality::App, i, "duration_minutes", r.duration_minutes)?;
        }
        for (i, r) in self.sensor.iter().enumerate() {
            check_user(Modality::Sensor, i, &r.user)?;
            for (name, value) in [
                ("accel_x", r.accel_x),
                ("accel_y", r.accel_y),
                ("accel_z", r.accel_z),
            ] {
                check_finite(Modality::Sensor, i, name, value)?;
            }
            for (name, value) in [("gyro_x", r.gyro_x), ("gyro_y", r.gyro_y), ("gyro_z", r.gyro_z)] {
                if let Some(v) = value {
                    check_finite(Modality::Sensor, i, name, v)?;
                }
            }
        }
        Ok(())
    }

    /// Validate and convert into events.
    ///
    /// A record without a timestamp gets `now + i` seconds, where `i` is its
    /// index within its own modality list.
    pub fn into_events(self, now: DateTime<Utc>) -> Result<EventBatch, FusionError> {
        self.validate()?;

        let fill = |ts: Option<DateTime<Utc>>, i: usize| {
            ts.unwrap_or_else(|| now + Duration::seconds(i as i64))
        };

        Ok(EventBatch {
            typing: self
                .typing
                .into_iter()
                .enumerate()
                .map(|(i, r)| TypingEvent {
                    user: r.user,
                    timestamp: fill(r.timestamp, i),
                    hold_time: r.hold_time,
                    flight_time: r.flight_time,
                })
                .collect(),
            app_usage: self
                .app_usage
                .into_iter()
                .enumerate()
                .map(|(i, r)| AppUsageEvent {
                    user: r.user,
                    timestamp: r
                        .timestamp
                        .unwrap_or_else(|| (now + Duration::seconds(i as i64)).fixed_offset()),
                    app: r.app,
                    duration_minutes: r.duration_minutes,
                })
                .collect(),
            sensor: self
                .sensor
                .into_iter()
                .enumerate()
                .map(|(i, r)| SensorEvent {
                    user: r.user,
                    timestamp: fill(r.timestamp, i),
                    accel_x: r.accel_x,
                    accel_y: r.accel_y,
                    accel_z: r.accel_z,
                    gyro_x: r.gyro_x,
                    gyro_y: r.gyro_y,
                    gyro_z: r.gyro_z,
                })
                .collect(),
        })
    }
}

fn invalid(modality: Modality, index: usize, reason: String) -> FusionError {
    FusionError::InvalidRecord {
        modality,
        index,
        reason,
    }
}

fn check_user(modality: Modality, index: usize, user: &str) -> Result<(), FusionError> {
    if user.trim().is_empty() {
        return Err(invalid(modality, index, "user must not be empty".to_string()));
    }
    Ok(())
}

fn check_finite(modality: Modality, index: usize, field: &str, value: f64) -> Result<(), FusionError> {
    if !value.is_finite() {
        return Err(invalid(modality, index, format!("{} must be finite", field)));
    }
    Ok(())
}

fn check_non_negative(
    modality: Modality,
    index: usize,
    field: &str,
    value: f64,
) -> Result<(), FusionError> {
    check_finite(modality, index, field, value)?;
    if value < 0.0 {
        return Err(invalid(
            modality,
            index,
            format!("{} must be >= 0, got {}", field, value),
        ));
    }
    Ok(())
}
