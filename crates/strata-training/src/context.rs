//! Shared state of one training run: settings, collaborators and the per-key bundle.

use crate::config::TrainingConfig;
use crate::error::{RowWarning, TrainingError, TrainingResult};
use crate::evaluation::{EvaluatorSettings, StandardEvaluator};
use crate::header::SchemaBuilder;
use crate::instance::RecordConverter;
use crate::output::MetricLayout;
use crate::persistence::{ModelArtifact, ModelStore, SavedModel};
use strata_abstraction::{
    Dataset, EvalMode, Evaluator, Learner, Model, Priors, Row, RowMeta, Schema, Value,
};
use tracing::warn;

/// Everything trained for one stratification key, moved around as one value.
#[derive(Debug)]
pub struct Stratum {
    pub key: Option<String>,
    pub schema: Schema,
    pub model: Box<dyn Model>,
    pub evaluator: Box<dyn Evaluator>,
}

/// A stratum together with the converter for the row layout feeding it.
#[derive(Debug)]
pub(crate) struct LiveStratum {
    pub stratum: Stratum,
    pub converter: RecordConverter,
}

impl LiveStratum {
    pub fn new(stratum: Stratum, meta: &RowMeta) -> Self {
        let converter = RecordConverter::new(&stratum.schema, meta);
        Self { stratum, converter }
    }

    pub fn convert(&mut self, row: &Row) -> strata_abstraction::Record {
        self.converter.convert(&mut self.stratum.schema, row)
    }

    /// Convert rows into a dataset over this stratum's schema.
    pub fn dataset(&mut self, rows: &[Row]) -> Dataset {
        let records = rows.iter().map(|row| self.convert(row)).collect();
        Dataset::with_records(self.stratum.schema.clone(), records)
    }
}

/// Read the stratification value of a row. `index` is `None` when rows are not stratified.
pub(crate) fn read_key(
    index: Option<usize>,
    field: &str,
    row: &Row,
) -> Result<Option<String>, RowWarning> {
    let Some(index) = index else {
        return Ok(None);
    };
    match row.get(index) {
        Some(value) if !value.is_null() => Ok(Some(value.to_string())),
        _ => Err(RowWarning::MissingStratificationValue { field: field.to_string() }),
    }
}

/// Position of the stratification field in a row layout, if rows are stratified.
pub(crate) fn stratify_index(config: &TrainingConfig, meta: &RowMeta) -> TrainingResult<Option<usize>> {
    config
        .row_handling
        .stratification_field()
        .map(|field| {
            meta.index_of(field).ok_or_else(|| {
                TrainingError::InvalidConfig(format!(
                    "stratification field '{field}' is not present in the input rows"
                ))
            })
        })
        .transpose()
}

#[derive(Debug)]
pub(crate) struct TrainingContext {
    pub config: TrainingConfig,
    pub meta: RowMeta,
    pub builder: SchemaBuilder,
    pub learner: Box<dyn Learner>,
    /// Template; every dataset gets its own spawned copy.
    pub evaluator: Box<dyn Evaluator>,
    pub store: Option<ModelStore>,
    pub stratify_index: Option<usize>,
    pub header_sample_size: usize,
    pub layout: MetricLayout,
    pub warnings: Vec<RowWarning>,
    pub saved: Vec<SavedModel>,
}

impl TrainingContext {
    pub fn new(config: TrainingConfig, meta: RowMeta, learner: Box<dyn Learner>) -> TrainingResult<Self> {
        config.validate(&learner.capabilities())?;
        let builder = SchemaBuilder::new(&config, &meta)?;
        let stratify_index = stratify_index(&config, &meta)?;
        let store = config
            .model_output_dir
            .as_deref()
            .map(|dir| ModelStore::from_uri(dir, config.model_file_name.as_deref()))
            .transpose()?;
        let layout = MetricLayout::for_config(&config, builder.class_spec());
        let evaluator = Box::new(StandardEvaluator::new(EvaluatorSettings::from_config(
            &config,
            builder.class_spec(),
        )));

        let mut ctx = Self {
            header_sample_size: 0,
            config,
            meta,
            builder,
            learner,
            evaluator,
            store,
            stratify_index,
            layout,
            warnings: Vec::new(),
            saved: Vec::new(),
        };
        let (size, warning) = ctx.config.header_sample_size();
        ctx.header_sample_size = size;
        if let Some(warning) = warning {
            ctx.warn(warning);
        }
        Ok(ctx)
    }

    pub fn mode(&self) -> EvalMode {
        self.config.evaluation
    }

    pub fn warn(&mut self, warning: RowWarning) {
        warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Stratification value of a training row. Rows without one are dropped with a warning.
    pub fn stratum_key(&mut self, row: &Row) -> Option<Option<String>> {
        let field = self.config.row_handling.stratification_field().unwrap_or_default();
        match read_key(self.stratify_index, field, row) {
            Ok(key) => Some(key),
            Err(warning) => {
                self.warn(warning);
                None
            }
        }
    }

    /// A spawned evaluator bound to `schema`.
    pub fn new_evaluator(
        &self,
        schema: &Schema,
        priors: Option<&Priors>,
    ) -> TrainingResult<Box<dyn Evaluator>> {
        let mut evaluator = self.evaluator.spawn();
        evaluator.initialize(schema, self.learner.as_ref(), priors)?;
        Ok(evaluator)
    }

    /// Save a model when an output directory is configured.
    pub fn save_model(
        &mut self,
        model: &dyn Model,
        schema: &Schema,
        training_data: Option<&Dataset>,
        stratum: Option<&str>,
        batch: Option<u64>,
    ) -> TrainingResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let artifact = ModelArtifact::capture(self.learner.as_ref(), model, schema, training_data)?;
        let saved = store.save(&artifact, stratum, batch)?;
        self.saved.push(saved);
        Ok(())
    }

    /// Output row holding a model's text.
    pub fn model_text_row(&self, stratum: Option<&str>, batch: Option<u64>, text: String) -> Row {
        let mut row = Vec::with_capacity(3);
        if self.layout.stratified {
            row.push(stratum.map_or(Value::Null, Value::from));
        }
        if self.layout.batched {
            row.push(batch.map_or(Value::Null, |b| Value::Integer(b as i64)));
        }
        row.push(Value::String(text));
        row
    }
}

/// Human-readable name of a flush target for error context.
pub(crate) fn describe_target(stratum: Option<&str>, batch: Option<u64>) -> String {
    match (stratum, batch) {
        (Some(s), _) => format!("training stratum '{s}'"),
        (None, Some(b)) => format!("training batch {b}"),
        (None, None) => "training data".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RowHandling;
    use crate::learners::ZeroR;
    use strata_abstraction::{FieldMeta, FieldType};

    fn meta() -> RowMeta {
        RowMeta::new(vec![
            FieldMeta::new("region", FieldType::String),
            FieldMeta::new("x", FieldType::Number),
            FieldMeta::new("c", FieldType::String).with_domain(["a", "b"]),
        ])
    }

    #[test]
    fn test_read_key() {
        let row = vec![Value::from("north"), Value::Number(1.0), Value::from("a")];
        assert_eq!(read_key(Some(0), "region", &row), Ok(Some("north".to_string())));
        assert_eq!(read_key(None, "", &row), Ok(None));
        let blank = vec![Value::from(""), Value::Number(1.0), Value::from("a")];
        assert!(read_key(Some(0), "region", &blank).is_err());
    }

    #[test]
    fn test_unknown_stratification_field_rejected() {
        let cfg = TrainingConfig {
            row_handling: RowHandling::Stratified { field: "zone".to_string() },
            ..TrainingConfig::default()
        };
        let err = TrainingContext::new(cfg, meta(), Box::new(ZeroR)).unwrap_err();
        assert!(matches!(err, TrainingError::InvalidConfig(_)));
    }

    #[test]
    fn test_bad_header_sample_size_warns() {
        let cfg = TrainingConfig { header_sample_size: "many".to_string(), ..TrainingConfig::default() };
        let ctx = TrainingContext::new(cfg, meta(), Box::new(ZeroR)).unwrap();
        assert_eq!(ctx.header_sample_size, 100);
        assert_eq!(ctx.warnings.len(), 1);
    }

    #[test]
    fn test_model_text_row_tags() {
        let cfg = TrainingConfig {
            row_handling: RowHandling::Stratified { field: "region".to_string() },
            ..TrainingConfig::default()
        };
        let ctx = TrainingContext::new(cfg, meta(), Box::new(ZeroR)).unwrap();
        let row = ctx.model_text_row(Some("north"), None, "model".to_string());
        assert_eq!(row, vec![Value::from("north"), Value::from("model")]);
    }

    #[test]
    fn test_describe_target() {
        assert_eq!(describe_target(Some("a"), None), "training stratum 'a'");
        assert_eq!(describe_target(None, Some(3)), "training batch 3");
    }
}
