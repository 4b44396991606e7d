//! Column layout of training output rows.

use crate::config::{FieldSpec, TrainingConfig};
use strata_abstraction::{EvalMode, FieldMeta, FieldType, RowMeta};

pub const SCHEME_NAME: &str = "Learning scheme";
pub const SCHEME_OPTIONS: &str = "Scheme options";
pub const EVALUATION_MODE: &str = "Evaluation mode";
pub const STRATIFICATION_VALUE: &str = "Stratification value";
pub const BATCH_NUMBER: &str = "Batch number";
pub const MODEL_TEXT: &str = "Model text";
pub const UNCLASSIFIED: &str = "Unclassified instances";
pub const CORRECT: &str = "Correctly classified instances";
pub const INCORRECT: &str = "Incorrectly classified instances";
pub const PERCENT_CORRECT: &str = "Percent correct";
pub const PERCENT_INCORRECT: &str = "Percent incorrect";
pub const MAE: &str = "Mean absolute error";
pub const RMSE: &str = "Root mean squared error";
pub const CORRELATION: &str = "Correlation coefficient";
pub const RAE: &str = "Relative absolute error";
pub const RRSE: &str = "Root relative squared error";
pub const TOTAL: &str = "Total number of instances";
pub const KAPPA: &str = "Kappa statistic";
pub const CONFUSION_MATRIX: &str = "Confusion matrix";

/// Per-label information retrieval columns, each prefixed with `<label>_`.
pub const IR_SUFFIXES: [&str; 6] = ["TP rate", "FP rate", "Precision", "Recall", "F-measure", "MCC"];
/// Per-label ranking columns, each prefixed with `<label>_`.
pub const RANKING_SUFFIXES: [&str; 2] = ["AUC", "PRC"];

/// Which metric groups a metric row carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricLayout {
    pub mode: EvalMode,
    pub stratified: bool,
    pub batched: bool,
    pub nominal_class: bool,
    /// Labels for per-label columns. Empty disables them.
    pub ir_labels: Vec<String>,
    pub ranking_labels: Vec<String>,
}

impl MetricLayout {
    /// Layout for a run. Per-label columns need the class labels up front, so they
    /// are only present when the class spec declares legal values.
    pub fn for_config(config: &TrainingConfig, class_spec: Option<&FieldSpec>) -> Self {
        let nominal_class = class_spec.is_some_and(FieldSpec::is_nominal);
        let declared: Vec<String> = class_spec
            .filter(|s| s.is_nominal())
            .and_then(|s| s.legal_values.clone())
            .unwrap_or_default()
            .into_iter()
            .map(|l| l.trim().to_string())
            .collect();
        Self {
            mode: config.evaluation,
            stratified: config.row_handling.stratification_field().is_some(),
            batched: config.row_handling.is_batch(),
            nominal_class,
            ir_labels: if config.output_ir_metrics { declared.clone() } else { Vec::new() },
            ranking_labels: if config.output_auc_metrics { declared } else { Vec::new() },
        }
    }

    /// Relative errors are not reported for prequential evaluation.
    pub fn reports_relative_errors(&self) -> bool {
        self.mode != EvalMode::Prequential
    }

    /// Column names and types of a metric row.
    pub fn metric_meta(&self) -> RowMeta {
        let mut meta = RowMeta::default();
        let text = |name: &str| FieldMeta::new(name, FieldType::String);
        let num = |name: &str| FieldMeta::new(name, FieldType::Number);

        meta.push(text(SCHEME_NAME));
        meta.push(text(SCHEME_OPTIONS));
        meta.push(text(EVALUATION_MODE));
        self.push_tags(&mut meta);

        meta.push(num(UNCLASSIFIED));
        if self.nominal_class {
            for name in [CORRECT, INCORRECT, PERCENT_CORRECT, PERCENT_INCORRECT] {
                meta.push(num(name));
            }
        }
        meta.push(num(MAE));
        meta.push(num(RMSE));
        if !self.nominal_class {
            meta.push(num(CORRELATION));
        }
        if self.reports_relative_errors() {
            meta.push(num(RAE));
            meta.push(num(RRSE));
        }
        meta.push(num(TOTAL));
        if self.nominal_class {
            meta.push(num(KAPPA));
            for label in &self.ir_labels {
                for suffix in IR_SUFFIXES {
                    meta.push(num(&format!("{label}_{suffix}")));
                }
            }
            for label in &self.ranking_labels {
                for suffix in RANKING_SUFFIXES {
                    meta.push(num(&format!("{label}_{suffix}")));
                }
            }
            meta.push(text(CONFUSION_MATRIX));
        }
        meta
    }

    /// Column names and types of a model text row.
    pub fn model_text_meta(&self) -> RowMeta {
        let mut meta = RowMeta::default();
        self.push_tags(&mut meta);
        meta.push(FieldMeta::new(MODEL_TEXT, FieldType::String));
        meta
    }

    fn push_tags(&self, meta: &mut RowMeta) {
        if self.stratified {
            meta.push(FieldMeta::new(STRATIFICATION_VALUE, FieldType::String));
        }
        if self.batched {
            meta.push(FieldMeta::new(BATCH_NUMBER, FieldType::Integer));
        }
    }

    /// Columns of every row a training run emits.
    pub fn output_meta(&self) -> RowMeta {
        if self.mode == EvalMode::None { self.model_text_meta() } else { self.metric_meta() }
    }
}
