//! Evaluation protocol contract.

use crate::error::ModelResult;
use crate::model::{Learner, Model};
use crate::row::Value;
use crate::schema::{Dataset, Record, Schema};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Evaluation protocol applied to each flushed dataset or stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalMode {
    /// No evaluation; output rows carry model text.
    #[default]
    None,
    CrossValidation,
    PercentageSplit,
    SeparateTestSet,
    /// Test-then-train over the stream.
    Prequential,
}

impl EvalMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::CrossValidation => "Cross-validation",
            Self::PercentageSplit => "Percentage split",
            Self::SeparateTestSet => "Separate test set",
            Self::Prequential => "Prequential",
        }
    }
}

impl fmt::Display for EvalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Class statistics of the data a model was trained on, persisted with the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Priors {
    /// Weighted label counts for nominal classes.
    #[serde(default)]
    pub class_counts: Vec<f64>,
    /// Weighted target sum for numeric classes.
    #[serde(default)]
    pub sum: f64,
    #[serde(default)]
    pub sum_sq: f64,
    #[serde(default)]
    pub weight: f64,
}

impl Priors {
    /// Collect priors from a dataset, `None` when it has no labelled records.
    pub fn from_dataset(data: &Dataset) -> Option<Self> {
        let schema = data.schema();
        schema.class_index()?;
        let mut priors = Self { class_counts: vec![0.0; schema.num_classes()], ..Self::default() };
        for record in data.records() {
            let Some(class) = record.class_value(schema) else {
                continue;
            };
            if schema.class_is_nominal() {
                if let Some(slot) = priors.class_counts.get_mut(class as usize) {
                    *slot += record.weight;
                }
            }
            priors.sum += class * record.weight;
            priors.sum_sq += class * class * record.weight;
            priors.weight += record.weight;
        }
        (priors.weight > 0.0).then_some(priors)
    }
}

/// Accumulates predictions against actual class values and renders a metric row.
///
/// Call order per key: `initialize`, then any mix of `evaluate_protocol`,
/// `evaluate_batch` or `evaluate_incremental`, then `metric_row`.
pub trait Evaluator: fmt::Debug {
    /// Fresh, uninitialized evaluator with the same configuration.
    fn spawn(&self) -> Box<dyn Evaluator>;

    fn mode(&self) -> EvalMode;

    /// Bind to a schema and a model template, optionally seeded with training priors.
    fn initialize(
        &mut self,
        schema: &Schema,
        template: &dyn Learner,
        priors: Option<&Priors>,
    ) -> ModelResult<()>;

    /// Run the configured resampling protocol (cross-validation or split) on a dataset.
    fn evaluate_protocol(&mut self, learner: &dyn Learner, data: &Dataset) -> ModelResult<()>;

    /// Evaluate an already trained model on a whole dataset.
    fn evaluate_batch(&mut self, model: &dyn Model, data: &Dataset) -> ModelResult<()>;

    /// Evaluate an already trained model on one record.
    fn evaluate_incremental(&mut self, model: &dyn Model, record: &Record) -> ModelResult<()>;

    fn was_evaluation_performed(&self) -> bool;

    /// Metric row, prefixed with the stratification value and batch number when given.
    fn metric_row(&self, stratum: Option<&str>, batch: Option<u64>) -> Vec<Value>;

    /// Model fitted on all of `data`.
    fn build_final_model(&self, learner: &dyn Learner, data: &Dataset) -> ModelResult<Box<dyn Model>> {
        learner.fit(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;

    #[test]
    fn test_priors_from_nominal_dataset() {
        let schema = Schema::new(
            "p",
            vec![Attribute::numeric("x"), Attribute::nominal("c", ["a", "b"])],
            Some(1),
        )
        .unwrap();
        let data = Dataset::with_records(
            schema,
            vec![
                Record::new(vec![1.0, 0.0]),
                Record::new(vec![2.0, 1.0]),
                Record::new(vec![3.0, 1.0]),
                Record::new(vec![4.0, f64::NAN]),
            ],
        );
        let priors = Priors::from_dataset(&data).unwrap();
        assert_eq!(priors.class_counts, vec![1.0, 2.0]);
        assert_eq!(priors.weight, 3.0);
    }

    #[test]
    fn test_priors_absent_without_labels() {
        let schema = Schema::new("p", vec![Attribute::numeric("x")], None).unwrap();
        let data = Dataset::with_records(schema, vec![Record::new(vec![1.0])]);
        assert!(Priors::from_dataset(&data).is_none());
    }
}
