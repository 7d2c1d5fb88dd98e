//! Temporal alignment of scored streams
//!
//! The stream with the most records is the primary stream; its rows define the
//! output table. Every other non-empty stream is merged in one at a time by
//! nearest-timestamp matching within the same user, bounded by a tolerance.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::config::DEFAULT_TOLERANCE_SECS;
use crate::types::{AlignedRecord, Modality, ScoredRecord};

/// Scored records for each modality
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoredStreams {
    pub typing: Vec<ScoredRecord>,
    pub app: Vec<ScoredRecord>,
    pub sensor: Vec<ScoredRecord>,
}

impl ScoredStreams {
    pub fn get(&self, modality: Modality) -> &[ScoredRecord] {
        match modality {
            Modality::Typing => &self.typing,
            Modality::App => &self.app,
            Modality::Sensor => &self.sensor,
        }
    }

    pub fn is_empty(&self) -> bool {
        Modality::ALL.iter().all(|m| self.get(*m).is_empty())
    }

    /// Stream with the most records; ties go to the earlier modality in
    /// declaration order. `None` when every stream is empty.
    pub fn primary(&self) -> Option<Modality> {
        let mut best: Option<(Modality, usize)> = None;
        for modality in Modality::ALL {
            let len = self.get(modality).len();
            if len > 0 && best.map_or(true, |(_, n)| len > n) {
                best = Some((modality, len));
            }
        }
        best.map(|(m, _)| m)
    }
}

/// Nearest-in-time aligner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalAligner {
    tolerance: Duration,
}

impl Default for TemporalAligner {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TOLERANCE_SECS))
    }
}

impl TemporalAligner {
    /// Create an aligner; a match is accepted when `|Δt| <= tolerance`
    pub fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }

    /// Align all streams onto the primary stream's timeline
    pub fn align(&self, streams: &ScoredStreams) -> Vec<AlignedRecord> {
        let Some(primary) = streams.primary() else {
            return Vec::new();
        };

        let mut records: Vec<&ScoredRecord> = streams.get(primary).iter().collect();
        records.sort_by_key(|r| r.timestamp);

        let mut rows: Vec<AlignedRecord> = records
            .into_iter()
            .map(|r| {
                let mut row = AlignedRecord::new(r.user.clone(), r.timestamp);
                row.set_score(primary, Some(r.anomaly_score));
                row
            })
            .collect();

        for modality in Modality::ALL {
            if modality != primary {
                rows = self.merge_into(rows, modality, streams.get(modality));
            }
        }

        debug!(primary = %primary, rows = rows.len(), "streams aligned");
        rows
    }

    /// Merge one secondary stream into existing rows.
    ///
    /// Row order and count never change. An empty stream leaves the rows
    /// untouched; otherwise each row gets the nearest same-user score for
    /// `modality`, or `None` when nothing lies within tolerance.
    pub fn merge_into(
        &self,
        mut rows: Vec<AlignedRecord>,
        modality: Modality,
        stream: &[ScoredRecord],
    ) -> Vec<AlignedRecord> {
        if stream.is_empty() {
            return rows;
        }

        let mut by_user: HashMap<&str, Vec<(DateTime<Utc>, f64)>> = HashMap::new();
        for record in stream {
            by_user
                .entry(record.user.as_str())
                .or_default()
                .push((record.timestamp, record.anomaly_score));
        }
        for candidates in by_user.values_mut() {
            candidates.sort_by_key(|(ts, _)| *ts);
        }

        let mut matched = 0usize;
        for row in rows.iter_mut() {
            let score = by_user
                .get(row.user.as_str())
                .and_then(|candidates| self.nearest(candidates, row.timestamp));
            matched += usize::from(score.is_some());
            row.set_score(modality, score);
        }

        debug!(
            modality = %modality,
            matched,
            unmatched = rows.len() - matched,
            "secondary stream merged"
        );
        rows
    }

    /// Nearest candidate to `at` within tolerance.
    ///
    /// `candidates` must be sorted by timestamp. Equal distances resolve to the
    /// earlier candidate; among equal timestamps the backward search takes the
    /// last one and the forward search the first.
    fn nearest(&self, candidates: &[(DateTime<Utc>, f64)], at: DateTime<Utc>) -> Option<f64> {
        let after_or_equal = candidates.partition_point(|(ts, _)| *ts < at);
        let up_to = candidates.partition_point(|(ts, _)| *ts <= at);

        let backward = up_to.checked_sub(1).map(|i| (at - candidates[i].0, i));
        let forward = (after_or_equal < candidates.len())
            .then(|| (candidates[after_or_equal].0 - at, after_or_equal));

        let (gap, index) = match (backward, forward) {
            (Some(b), Some(f)) => {
                if b.0 <= f.0 {
                    b
                } else {
                    f
                }
            }
            (Some(b), None) => b,
            (None, Some(f)) => f,
            (None, None) => return None,
        };

        (gap <= self.tolerance).then(|| candidates[index].1)
    }
}
