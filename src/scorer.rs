//! Modality scorers
//!
//! A scorer owns one modality's feature extraction and a trained normality
//! model. Training fits only the reference identity's events; scoring maps
//! every input event to exactly one scored record, in input order.

use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::FusionError;
use crate::features::{feature_matrix, ModalityEvent};
use crate::scoring::{ScoringCapability, ScoringModel};
use crate::sink::ScoreSink;
use crate::types::{AppUsageEvent, Modality, ScoredRecord, SensorEvent, TypingEvent};

/// Default reference ("normal") identity used for training
pub const DEFAULT_REFERENCE_USER: &str = "user1";

/// Scores events of one modality against a learned baseline
pub struct ModalityScorer<E: ModalityEvent> {
    reference_user: String,
    capability: Arc<dyn ScoringCapability>,
    model: Option<Arc<dyn ScoringModel>>,
    _event: PhantomData<fn(&E)>,
}

pub type TypingScorer = ModalityScorer<TypingEvent>;
pub type AppUsageScorer = ModalityScorer<AppUsageEvent>;
pub type SensorScorer = ModalityScorer<SensorEvent>;

impl<E: ModalityEvent> ModalityScorer<E> {
    /// Create an untrained scorer
    pub fn new(reference_user: impl Into<String>, capability: Arc<dyn ScoringCapability>) -> Self {
        Self {
            reference_user: reference_user.into(),
            capability,
            model: None,
            _event: PhantomData,
        }
    }

    pub fn modality(&self) -> Modality {
        E::MODALITY
    }

    pub fn reference_user(&self) -> &str {
        &self.reference_user
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// Fit the model on the reference identity's share of `baseline`.
    ///
    /// Fails with [`FusionError::InsufficientData`] when the reference
    /// identity has no events; a previously trained model is kept in that case.
    pub fn train(&mut self, baseline: &[E]) -> Result<(), FusionError> {
        let reference: Vec<Vec<f64>> = baseline
            .iter()
            .filter(|e| e.user() == self.reference_user)
            .map(ModalityEvent::features)
            .collect();

        if reference.is_empty() {
            return Err(FusionError::InsufficientData(format!(
                "no {} baseline events for reference user '{}'",
                E::MODALITY,
                self.reference_user
            )));
        }

        let model = self.capability.train(&reference)?;
        info!(
            modality = %E::MODALITY,
            model = self.capability.name(),
            samples = reference.len(),
            "scorer trained on reference baseline"
        );
        self.model = Some(model);
        Ok(())
    }

    /// Score a batch, one record per event in input order
    pub fn score(&self, batch: &[E]) -> Result<Vec<ScoredRecord>, FusionError> {
        let model = self
            .model
            .as_ref()
            .ok_or(FusionError::NotTrained(E::MODALITY))?;

        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let decisions = model.decision_function(&feature_matrix(batch));
        debug!(modality = %E::MODALITY, rows = batch.len(), "batch scored");

        Ok(batch
            .iter()
            .zip(decisions)
            .map(|(event, decision)| ScoredRecord {
                user: event.user().to_string(),
                timestamp: event.timestamp(),
                modality: E::MODALITY,
                anomaly_score: -decision,
            })
            .collect())
    }

    /// Score a batch and append the result to `sink`.
    ///
    /// A failing sink is logged and ignored; the scores are returned either way.
    pub fn score_and_log(
        &self,
        batch: &[E],
        sink: &dyn ScoreSink,
    ) -> Result<Vec<ScoredRecord>, FusionError> {
        let scored = self.score(batch)?;
        if let Err(e) = sink.append(&scored) {
            warn!(modality = %E::MODALITY, error = %e, "failed to append scores to log");
        }
        Ok(scored)
    }
}

impl<E: ModalityEvent> std::fmt::Debug for ModalityScorer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModalityScorer")
            .field("modality", &E::MODALITY)
            .field("reference_user", &self.reference_user)
            .field("model", &self.capability.name())
            .field("trained", &self.is_trained())
            .finish()
    }
}
