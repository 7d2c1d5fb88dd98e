//! Append-only score logs
//!
//! Scores are pushed to a sink after they have been computed. A sink failure
//! never alters the values already handed back to the caller.

use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::FusionError;
use crate::types::{FusedRecord, ScoredRecord};

/// Destination for scored records
pub trait ScoreSink: Send + Sync {
    fn append(&self, rows: &[ScoredRecord]) -> Result<(), FusionError>;
}

/// CSV log that writes a header when the file is first created and appends
/// headerless rows afterwards.
#[derive(Debug)]
pub struct CsvAppendLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvAppendLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append fused rows to this log
    pub fn append_fused(&self, rows: &[FusedRecord]) -> Result<(), FusionError> {
        self.append_rows(rows)
    }

    fn append_rows<T: Serialize>(&self, rows: &[T]) -> Result<(), FusionError> {
        let _guard = self.write_lock.lock();

        let needs_header = fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);

        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl ScoreSink for CsvAppendLog {
    fn append(&self, rows: &[ScoredRecord]) -> Result<(), FusionError> {
        self.append_rows(rows)
    }
}
