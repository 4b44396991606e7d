//! Scoring: append predictions from a trained model to incoming rows.

use crate::config::TrainingConfig;
use crate::error::{RowWarning, TrainingError, TrainingResult};
use crate::evaluation::{EvaluatorSettings, StandardEvaluator};
use crate::instance::{RecordConverter, StringValues};
use crate::learners;
use crate::output::MetricLayout;
use crate::persistence::ModelArtifact;
use strata_abstraction::{
    arg_max, AttributeKind, Dataset, EvalMode, Evaluator, FieldMeta, FieldType, Learner, Model,
    ModelError, Priors, Record, Row, RowMeta, Schema, Value,
};
use tracing::{debug, warn};

/// Placeholder prediction when a distribution has no mass.
pub const UNABLE_TO_PREDICT: &str = "Unable to predict";
/// Placeholder cluster when a membership distribution has no mass.
pub const UNABLE_TO_PREDICT_CLUSTER: &str = "Unable to predict a cluster";
pub const CLUSTER_FIELD: &str = "cluster#";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingStatus {
    Ok,
    NoMatch,
    TypeMismatch,
}

/// How one model attribute is fed from the input rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub attribute: String,
    /// Input position, only for `Ok` mappings.
    pub position: Option<usize>,
    pub status: MappingStatus,
}

fn compatible(kind: &AttributeKind, source: FieldType) -> bool {
    match kind {
        AttributeKind::Numeric => {
            matches!(source, FieldType::Number | FieldType::Integer | FieldType::Boolean)
        }
        AttributeKind::Date => {
            matches!(source, FieldType::Date | FieldType::Number | FieldType::Integer)
        }
        AttributeKind::Nominal { .. } | AttributeKind::String { .. } => source == FieldType::String,
    }
}

/// Match every schema attribute to the input field of the same name.
pub fn find_mappings(schema: &Schema, meta: &RowMeta) -> Vec<FieldMapping> {
    let lookup = meta.lookup();
    schema
        .attributes()
        .iter()
        .map(|attribute| {
            let found = lookup.get(&attribute.name).copied();
            let (position, status) = match found.and_then(|p| meta.field(p).map(|f| (p, f))) {
                None => (None, MappingStatus::NoMatch),
                Some((p, field)) if compatible(&attribute.kind, field.field_type) => {
                    (Some(p), MappingStatus::Ok)
                }
                Some(_) => (None, MappingStatus::TypeMismatch),
            };
            FieldMapping { attribute: attribute.name.clone(), position, status }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoringOptions {
    /// Append the full distribution and its maximum.
    pub output_probabilities: bool,
    /// Update incremental models with labelled rows after predicting.
    pub update_model: bool,
    pub output_ir_metrics: bool,
    pub output_auc_metrics: bool,
}

#[derive(Debug)]
pub struct Scorer {
    learner: Box<dyn Learner>,
    model: Box<dyn Model>,
    schema: Schema,
    meta: RowMeta,
    mappings: Vec<FieldMapping>,
    row_converter: RecordConverter,
    batch_converter: RecordConverter,
    options: ScoringOptions,
    update_enabled: bool,
    priors: Option<Priors>,
    evaluator: Option<Box<dyn Evaluator>>,
    warnings: Vec<RowWarning>,
}

impl Scorer {
    pub fn new(
        learner: Box<dyn Learner>,
        model: Box<dyn Model>,
        schema: &Schema,
        priors: Option<Priors>,
        meta: RowMeta,
        options: ScoringOptions,
    ) -> TrainingResult<Self> {
        let capabilities = model.capabilities();
        if capabilities.supervised != schema.is_supervised() {
            return Err(TrainingError::WrongModelKind(format!(
                "model is {} but its schema {} a class attribute",
                if capabilities.supervised { "supervised" } else { "unsupervised" },
                if schema.is_supervised() { "has" } else { "lacks" }
            )));
        }
        let schema = schema.without_string_values();
        let mappings = find_mappings(&schema, &meta);
        let mut warnings = Vec::new();
        for (i, mapping) in mappings.iter().enumerate() {
            if Some(i) == schema.class_index() {
                continue;
            }
            match mapping.status {
                MappingStatus::Ok => {}
                MappingStatus::NoMatch => warnings
                    .push(RowWarning::UnmappedField { attribute: mapping.attribute.clone() }),
                MappingStatus::TypeMismatch => warnings.push(RowWarning::TypeMismatch {
                    attribute: mapping.attribute.clone(),
                    field: mapping.attribute.clone(),
                }),
            }
        }

        let mut update_enabled = options.update_model;
        if options.update_model {
            let class_status = schema.class_index().and_then(|i| mappings.get(i)).map(|m| m.status);
            let reason = if !capabilities.incremental {
                Some("model does not support incremental updates".to_string())
            } else {
                match (schema.class_attribute(), class_status) {
                    (Some(class), Some(MappingStatus::NoMatch)) => {
                        Some(format!("class attribute '{}' is not in the input", class.name))
                    }
                    (Some(class), Some(MappingStatus::TypeMismatch)) => {
                        Some(format!("class attribute '{}' has an incompatible type", class.name))
                    }
                    _ => None,
                }
            };
            if let Some(reason) = reason {
                warnings.push(RowWarning::UpdateDisabled { reason });
                update_enabled = false;
            }
        }
        for warning in &warnings {
            warn!("{warning}");
        }

        let positions: Vec<Option<usize>> = mappings.iter().map(|m| m.position).collect();
        let batch_converter = RecordConverter::from_positions(positions);
        let row_converter = batch_converter.clone().with_string_values(StringValues::Replace);
        debug!(
            attributes = schema.num_attributes(),
            update_enabled,
            "scorer ready"
        );
        Ok(Self {
            learner,
            model,
            schema,
            meta,
            mappings,
            row_converter,
            batch_converter,
            options,
            update_enabled,
            priors,
            evaluator: None,
            warnings,
        })
    }

    /// Scorer for a saved model, restored through the learner that produced it.
    pub fn from_artifact(
        artifact: &ModelArtifact,
        meta: RowMeta,
        options: ScoringOptions,
    ) -> TrainingResult<Self> {
        let learner = learners::by_name(&artifact.learner, &serde_json::Value::Null)?;
        let model = artifact.restore(learner.as_ref())?;
        Self::new(learner, model, &artifact.schema, artifact.priors.clone(), meta, options)
    }

    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    pub fn update_enabled(&self) -> bool {
        self.update_enabled
    }

    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    pub fn take_warnings(&mut self) -> Vec<RowWarning> {
        std::mem::take(&mut self.warnings)
    }

    fn supervised(&self) -> bool {
        self.model.capabilities().supervised
    }

    /// Input columns followed by the prediction columns.
    pub fn output_row_meta(&self) -> RowMeta {
        let mut meta = self.meta.clone();
        let probabilities = self.options.output_probabilities;
        match self.schema.class_attribute().filter(|_| self.supervised()) {
            Some(class) if class.is_nominal() => {
                meta.push(FieldMeta::new(format!("{}_predicted", class.name), FieldType::String));
                if probabilities {
                    for label in class.labels() {
                        meta.push(FieldMeta::new(
                            format!("{}:{label}_predicted_prob", class.name),
                            FieldType::Number,
                        ));
                    }
                    meta.push(FieldMeta::new(format!("{}_max_prob", class.name), FieldType::Number));
                }
            }
            Some(class) => {
                meta.push(FieldMeta::new(format!("{}_predicted", class.name), FieldType::Number));
            }
            None => {
                meta.push(FieldMeta::new(CLUSTER_FIELD, FieldType::Integer));
                if probabilities {
                    for i in 0..self.model.num_clusters().unwrap_or_default() {
                        meta.push(FieldMeta::new(format!("cluster_{i}_prob"), FieldType::Number));
                    }
                    meta.push(FieldMeta::new("cluster_max_prob", FieldType::Number));
                }
            }
        }
        meta
    }

    fn prediction_values(&self, distribution: &[f64]) -> Vec<Value> {
        let probability = |i: usize| distribution.get(i).map_or(Value::Null, |p| Value::Number(*p));
        let max_prob = || Value::Number(distribution.iter().copied().fold(0.0, f64::max));
        let best = arg_max(distribution);
        let mut values = Vec::new();
        match self.schema.class_attribute().filter(|_| self.supervised()) {
            Some(class) if class.is_nominal() => {
                values.push(
                    best.and_then(|i| class.labels().get(i))
                        .map_or_else(|| Value::from(UNABLE_TO_PREDICT), |l| Value::from(l.as_str())),
                );
                if self.options.output_probabilities {
                    values.extend((0..class.num_values()).map(probability));
                    values.push(max_prob());
                }
            }
            Some(_) => {
                let predicted = distribution.first().copied().filter(|v| v.is_finite());
                values.push(predicted.map_or(Value::Null, Value::Number));
            }
            None => {
                values.push(
                    best.map_or_else(|| Value::from(UNABLE_TO_PREDICT_CLUSTER), |i| {
                        Value::Integer(i as i64)
                    }),
                );
                if self.options.output_probabilities {
                    values.extend((0..self.model.num_clusters().unwrap_or_default()).map(probability));
                    values.push(max_prob());
                }
            }
        }
        values
    }

    fn masked(&self, record: &Record) -> Record {
        let mut copy = record.clone();
        if let Some(class) = self.schema.class_index() {
            copy.set_missing(class);
        }
        copy
    }

    fn maybe_update(&mut self, record: &Record) -> TrainingResult<()> {
        if !self.update_enabled {
            return Ok(());
        }
        if self.schema.class_index().is_some_and(|i| record.is_missing(i)) {
            return Ok(());
        }
        self.model.update(record)?;
        Ok(())
    }

    /// Predict one row, then update the model with it when enabled.
    pub fn score_row(&mut self, row: &Row) -> TrainingResult<Row> {
        let record = self.row_converter.convert(&mut self.schema, row);
        let distribution = self.model.distribution(&self.masked(&record))?;
        self.maybe_update(&record)?;
        let mut output = row.clone();
        output.extend(self.prediction_values(&distribution));
        Ok(output)
    }

    /// Predict a group of rows. Batch predictors see the whole group in one call.
    pub fn score_rows(&mut self, rows: &[Row]) -> TrainingResult<Vec<Row>> {
        if !self.model.capabilities().batch_predictor {
            return rows.iter().map(|row| self.score_row(row)).collect();
        }
        let records = self.batch_records(rows);
        let masked: Vec<Record> = records.iter().map(|r| self.masked(r)).collect();
        let distributions = self.model.distributions(&masked)?;
        if distributions.len() != rows.len() {
            return Err(ModelError::InvalidData(format!(
                "batch prediction returned {} distributions for {} rows",
                distributions.len(),
                rows.len()
            ))
            .into());
        }
        for record in &records {
            self.maybe_update(record)?;
        }
        Ok(rows
            .iter()
            .zip(&distributions)
            .map(|(row, distribution)| {
                let mut output = row.clone();
                output.extend(self.prediction_values(distribution));
                output
            })
            .collect())
    }

    /// Records over a fresh copy of the schema, so string values of one group do not
    /// leak into the next.
    fn batch_records(&self, rows: &[Row]) -> Vec<Record> {
        let mut scratch = self.schema.without_string_values();
        rows.iter().map(|row| self.batch_converter.convert(&mut scratch, row)).collect()
    }

    fn evaluation_layout(&self) -> MetricLayout {
        let labels = || {
            self.schema
                .class_attribute()
                .filter(|c| c.is_nominal())
                .map(|c| c.labels().to_vec())
                .unwrap_or_default()
        };
        MetricLayout {
            mode: EvalMode::SeparateTestSet,
            stratified: false,
            batched: false,
            nominal_class: self.schema.class_is_nominal(),
            ir_labels: if self.options.output_ir_metrics { labels() } else { Vec::new() },
            ranking_labels: if self.options.output_auc_metrics { labels() } else { Vec::new() },
        }
    }

    /// Columns of the row produced by [`Self::evaluation_row`].
    pub fn evaluation_row_meta(&self) -> RowMeta {
        self.evaluation_layout().metric_meta()
    }

    fn ensure_evaluator(&mut self) -> TrainingResult<()> {
        if !self.supervised() {
            return Err(TrainingError::WrongModelKind(
                "evaluation requires a supervised model".to_string(),
            ));
        }
        if self.evaluator.is_none() {
            let settings = EvaluatorSettings {
                layout: self.evaluation_layout(),
                ..EvaluatorSettings::from_config(&TrainingConfig::default(), None)
            };
            let mut evaluator = StandardEvaluator::new(settings);
            evaluator.initialize(&self.schema, self.learner.as_ref(), self.priors.as_ref())?;
            self.evaluator = Some(Box::new(evaluator));
        }
        Ok(())
    }

    /// Evaluate the model on one labelled row instead of emitting a prediction.
    pub fn evaluate_row(&mut self, row: &Row) -> TrainingResult<()> {
        self.ensure_evaluator()?;
        let record = self.row_converter.convert(&mut self.schema, row);
        if let Some(evaluator) = self.evaluator.as_mut() {
            evaluator.evaluate_incremental(self.model.as_ref(), &record)?;
        }
        self.maybe_update(&record)
    }

    /// Evaluate a group of labelled rows.
    pub fn evaluate_rows(&mut self, rows: &[Row]) -> TrainingResult<()> {
        if !self.model.capabilities().batch_predictor {
            return rows.iter().try_for_each(|row| self.evaluate_row(row));
        }
        self.ensure_evaluator()?;
        let records = self.batch_records(rows);
        let data = Dataset::with_records(self.schema.clone(), records);
        if let Some(evaluator) = self.evaluator.as_mut() {
            evaluator.evaluate_batch(self.model.as_ref(), &data)?;
        }
        for record in data.records() {
            self.maybe_update(record)?;
        }
        Ok(())
    }

    /// Metric row over everything evaluated so far, if anything was.
    pub fn evaluation_row(&self) -> Option<Row> {
        self.evaluator
            .as_ref()
            .filter(|e| e.was_evaluation_performed())
            .map(|e| e.metric_row(None, None))
    }
}
