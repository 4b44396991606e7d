//! Trainable and trained model contracts.
//!
//! Orchestration code never inspects concrete model types. Everything it needs to
//! know is carried by [`Capabilities`].

use crate::error::{ModelError, ModelResult};
use crate::schema::{Dataset, Record, Schema};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared abilities of a learner and of the models it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    /// Predicts a class attribute. Unsupervised models assign clusters.
    pub supervised: bool,
    /// Supports `update` one record at a time.
    pub incremental: bool,
    /// Prefers whole-batch prediction over per-record prediction.
    pub batch_predictor: bool,
    /// Batch size for batch prediction. `None` means all rows at once.
    pub preferred_batch_size: Option<usize>,
    /// Supports continuing iterative training from a persisted state.
    pub resumable: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            supervised: true,
            incremental: false,
            batch_predictor: false,
            preferred_batch_size: None,
            resumable: false,
        }
    }
}

/// A fitted model bound to exactly one schema.
pub trait Model: fmt::Debug {
    fn capabilities(&self) -> Capabilities;

    /// Class distribution for nominal targets, a single predicted value for numeric
    /// targets, cluster membership for unsupervised models.
    fn distribution(&self, record: &Record) -> ModelResult<Vec<f64>>;

    /// Batch prediction. Every record's class slot must already be missing.
    fn distributions(&self, records: &[Record]) -> ModelResult<Vec<Vec<f64>>> {
        records.iter().map(|r| self.distribution(r)).collect()
    }

    /// Update in place with one labelled record.
    fn update(&mut self, _record: &Record) -> ModelResult<()> {
        Err(ModelError::NotUpdatable)
    }

    /// Run further training iterations on new data, keeping learned state.
    fn continue_training(&mut self, _data: &Dataset) -> ModelResult<()> {
        Err(ModelError::NotResumable)
    }

    /// Number of clusters of an unsupervised model.
    fn num_clusters(&self) -> Option<usize> {
        None
    }

    /// Human-readable model text.
    fn describe(&self) -> String;

    /// Serializable state, restored through [`Learner::restore`].
    fn to_state(&self) -> ModelResult<serde_json::Value>;
}

/// A model template: knows how to fit, initialize and restore models.
pub trait Learner: fmt::Debug {
    /// Scheme name as shown in output rows.
    fn name(&self) -> &str;

    /// Scheme options as shown in output rows.
    fn options(&self) -> String;

    fn capabilities(&self) -> Capabilities;

    fn fit(&self, data: &Dataset) -> ModelResult<Box<dyn Model>>;

    /// Empty model ready for incremental updates.
    fn initialize(&self, _schema: &Schema) -> ModelResult<Box<dyn Model>> {
        Err(ModelError::NotUpdatable)
    }

    /// Rebuild a model from persisted state.
    fn restore(&self, state: &serde_json::Value, schema: &Schema) -> ModelResult<Box<dyn Model>>;
}

/// Index of the first maximum, `None` when the distribution carries no mass.
pub fn arg_max(distribution: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &p) in distribution.iter().enumerate() {
        if p.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if p <= b => {}
            _ => best = Some((i, p)),
        }
    }
    let total: f64 = distribution.iter().filter(|p| !p.is_nan()).sum();
    if total <= 0.0 {
        return None;
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_max_first_maximum_wins() {
        assert_eq!(arg_max(&[0.4, 0.4, 0.2]), Some(0));
        assert_eq!(arg_max(&[0.1, 0.5, 0.4]), Some(1));
    }

    #[test]
    fn test_arg_max_zero_mass() {
        assert_eq!(arg_max(&[0.0, 0.0, 0.0]), None);
        assert_eq!(arg_max(&[]), None);
    }

    #[test]
    fn test_default_capabilities() {
        let caps = Capabilities::default();
        assert!(caps.supervised);
        assert!(!caps.incremental);
        assert_eq!(caps.preferred_batch_size, None);
    }
}
