//! Event dataset loading
//!
//! Baselines and scoring batches arrive as CSV exports (one row per event,
//! columns named after the record fields) or as JSON. Extra columns such as
//! the synthetic `its_anomaly` label are ignored.

use serde::de::DeserializeOwned;
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::error::FusionError;

/// Load records from a file, choosing the format from its extension.
///
/// `.csv` is read with headers, `.json` as an array, `.ndjson` / `.jsonl`
/// as one record per line.
pub fn load_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, FusionError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "csv" => read_csv(fs::File::open(path)?),
        "json" => parse_json_array(&fs::read_to_string(path)?),
        "ndjson" | "jsonl" => parse_ndjson(&fs::read_to_string(path)?),
        other => Err(FusionError::ParseError(format!(
            "unsupported dataset extension '{}' for {}",
            other,
            path.display()
        ))),
    }
}

/// Read CSV records with a header row
pub fn read_csv<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>, FusionError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        records.push(result?);
    }
    Ok(records)
}

/// Parse a JSON array of records
pub fn parse_json_array<T: DeserializeOwned>(json: &str) -> Result<Vec<T>, FusionError> {
    Ok(serde_json::from_str(json)?)
}

/// Parse newline-delimited JSON records, skipping blank lines
pub fn parse_ndjson<T: DeserializeOwned>(input: &str) -> Result<Vec<T>, FusionError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line.trim()).map_err(|e| {
                FusionError::ParseError(format!("line {}: {}", i + 1, e))
            })
        })
        .collect()
}

/// Lenient timestamp parsing for serde.
///
/// Accepts RFC3339 as well as the naive `YYYY-MM-DD HH:MM:SS[.fff]` form
/// written by dataframe exports, which is read as UTC. The `local` variants
/// keep the offset the record was written with.
pub mod timestamp {
    use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

    /// Parse keeping the written offset; naive values get `+00:00`
    pub fn parse_local(value: &str) -> Option<DateTime<FixedOffset>> {
        let value = value.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt);
        }
        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Some(naive.and_utc().fixed_offset());
            }
        }
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc().fixed_offset())
    }

    pub fn parse(value: &str) -> Option<DateTime<Utc>> {
        parse_local(value).map(|dt| dt.with_timezone(&Utc))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_local(deserializer).map(|dt| dt.with_timezone(&Utc))
    }

    pub fn deserialize_local<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_local(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(deserialize_local_option(deserializer)?.map(|dt| dt.with_timezone(&Utc)))
    }

    pub fn deserialize_local_option<'de, D>(
        deserializer: D,
    ) -> Result<Option<DateTime<FixedOffset>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => parse_local(&raw).map(Some).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid timestamp '{}'", raw))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SensorEvent, TypingEvent};
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    #[test]
    fn test_read_typing_csv_ignores_label_column() {
        let csv = "user,timestamp,hold_time,flight_time,its_anomaly\n\
                   user1,2024-01-15 14:00:00,0.12,0.25,0\n\
                   anomaly,2024-01-15 14:01:30.500,0.40,0.90,1\n";

        let events: Vec<TypingEvent> = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].user, "user1");
        assert_eq!(
            events[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
        );
        assert_eq!(events[1].timestamp.timestamp_subsec_millis(), 500);
        assert_eq!(events[1].flight_time, 0.90);
    }

    #[test]
    fn test_sensor_csv_optional_gyro() {
        let csv = "user,timestamp,accel_x,accel_y,accel_z,gyro_x,gyro_y,gyro_z\n\
                   user1,2024-01-15T14:00:00Z,0.1,0.2,9.8,,,\n\
                   user1,2024-01-15T14:00:05Z,0.1,0.2,9.8,0.01,0.02,0.03\n";

        let events: Vec<SensorEvent> = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(events[0].gyro_x, None);
        assert_eq!(events[1].gyro_z, Some(0.03));
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let input = "{\"user\":\"u1\",\"timestamp\":\"2024-01-15T14:00:00Z\",\"hold_time\":0.1,\"flight_time\":0.2}\n\
                     \n\
                     not json\n";

        let err = parse_ndjson::<TypingEvent>(input).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_load_records_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"[{{"user":"u1","timestamp":"2024-01-15","hold_time":0.1,"flight_time":0.2}}]"#
        )
        .unwrap();

        let events: Vec<TypingEvent> = load_records(file.path()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_load_records_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let result = load_records::<TypingEvent>(file.path());
        assert!(matches!(result, Err(FusionError::ParseError(_))));
    }

    #[test]
    fn test_timestamp_parse_rejects_garbage() {
        assert!(timestamp::parse("yesterday").is_none());
    }

    #[test]
    fn test_local_parse_keeps_offset() {
        let local = timestamp::parse_local("2024-01-15T03:00:00+05:00").unwrap();
        assert_eq!(local.offset().local_minus_utc(), 5 * 3600);
        assert_eq!(
            timestamp::parse("2024-01-15T03:00:00+05:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 14, 22, 0, 0).unwrap()
        );

        let naive = timestamp::parse_local("2024-01-15 03:00:00").unwrap();
        assert_eq!(naive.offset().local_minus_utc(), 0);
    }
}
