use crate::error::{RowWarning, TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use strata_abstraction::{Capabilities, EvalMode};

/// Default number of rows cached per key before categorical values are inferred.
pub const DEFAULT_HEADER_SAMPLE_SIZE: usize = 100;

/// How incoming training rows are grouped into datasets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RowHandling {
    /// One dataset holding every row, trained at end of stream.
    #[default]
    All,
    /// Train on every `size` consecutive rows.
    Batch { size: usize },
    /// One dataset per value of `field`. Input must be sorted by that field.
    Stratified { field: String },
}

impl RowHandling {
    pub fn stratification_field(&self) -> Option<&str> {
        match self {
            Self::Stratified { field } => Some(field),
            _ => None,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Self::Batch { .. })
    }
}

/// Declared attribute kind and optional legal values for one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// One of `numeric`, `nominal`, `string` or `date`.
    pub kind: String,
    /// Legal values of a nominal field, kept in the given order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_values: Option<Vec<String>>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { name: name.into(), kind: kind.into(), legal_values: None }
    }

    #[must_use]
    pub fn with_legal_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.legal_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_nominal(&self) -> bool {
        self.kind.eq_ignore_ascii_case("nominal")
    }

    pub fn has_legal_values(&self) -> bool {
        self.legal_values.as_ref().is_some_and(|v| !v.is_empty())
    }
}

/// Settings for one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Relation name given to built schemas.
    pub relation: String,
    /// Class field. When absent the last field spec is the class.
    pub class_field: Option<String>,
    /// Field specs. Derived from the input row metadata when empty.
    pub fields: Vec<FieldSpec>,
    pub row_handling: RowHandling,
    pub evaluation: EvalMode,
    pub folds: usize,
    pub percentage_split: f64,
    pub seed: u64,
    pub output_ir_metrics: bool,
    pub output_auc_metrics: bool,
    /// Rows cached per key before categorical values are inferred. Parsed leniently.
    pub header_sample_size: String,
    /// Train on incremental learners one row at a time when the evaluation mode allows it.
    pub incremental: bool,
    pub reservoir_sampling: bool,
    pub reservoir_size: usize,
    /// Directory (path or `file:` URI) that receives saved models.
    pub model_output_dir: Option<String>,
    pub model_file_name: Option<String>,
    /// Previously saved model whose training is continued instead of fitting from scratch.
    pub resume_model_path: Option<String>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            relation: "training data".to_string(),
            class_field: None,
            fields: Vec::new(),
            row_handling: RowHandling::All,
            evaluation: EvalMode::None,
            folds: 10,
            percentage_split: 66.0,
            seed: 1,
            output_ir_metrics: false,
            output_auc_metrics: false,
            header_sample_size: DEFAULT_HEADER_SAMPLE_SIZE.to_string(),
            incremental: true,
            reservoir_sampling: false,
            reservoir_size: 1000,
            model_output_dir: None,
            model_file_name: None,
            resume_model_path: None,
        }
    }
}

impl TrainingConfig {
    /// Reject invalid settings before any row is processed.
    pub fn validate(&self, learner: &Capabilities) -> TrainingResult<()> {
        match &self.row_handling {
            RowHandling::Batch { size: 0 } => {
                return Err(TrainingError::InvalidConfig("batch size must be >= 1".to_string()));
            }
            RowHandling::Stratified { field } if field.trim().is_empty() => {
                return Err(TrainingError::InvalidConfig(
                    "stratified row handling requires a field".to_string(),
                ));
            }
            _ => {}
        }
        if self.row_handling.is_batch() && self.evaluation == EvalMode::SeparateTestSet {
            return Err(TrainingError::UnsupportedModeCombination(
                "separate test set evaluation cannot be combined with batch row handling"
                    .to_string(),
            ));
        }
        if self.row_handling.is_batch() && self.reservoir_sampling {
            return Err(TrainingError::UnsupportedModeCombination(
                "reservoir sampling cannot be combined with batch row handling".to_string(),
            ));
        }
        if self.evaluation == EvalMode::Prequential
            && !(learner.incremental && self.incremental && !self.reservoir_sampling)
        {
            return Err(TrainingError::UnsupportedModeCombination(
                "prequential evaluation requires incremental training".to_string(),
            ));
        }
        if self.evaluation == EvalMode::CrossValidation && self.folds < 2 {
            return Err(TrainingError::InvalidConfig("folds must be >= 2".to_string()));
        }
        if self.evaluation == EvalMode::PercentageSplit
            && !(self.percentage_split > 0.0 && self.percentage_split < 100.0)
        {
            return Err(TrainingError::InvalidConfig(
                "percentage_split must be between 0 and 100".to_string(),
            ));
        }
        if self.reservoir_sampling && self.reservoir_size == 0 {
            return Err(TrainingError::InvalidConfig("reservoir_size must be >= 1".to_string()));
        }
        if let (Some(class), Some(strat)) =
            (self.class_field.as_deref(), self.row_handling.stratification_field())
        {
            if class == strat {
                return Err(TrainingError::InvalidConfig(
                    "class field cannot also be the stratification field".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// True when rows are trained one at a time instead of buffered.
    pub fn trains_incrementally(&self, learner: &Capabilities) -> bool {
        learner.incremental
            && self.incremental
            && !self.reservoir_sampling
            && matches!(
                self.evaluation,
                EvalMode::None | EvalMode::SeparateTestSet | EvalMode::Prequential
            )
    }

    /// Parsed header sample size, falling back to the default on bad input.
    pub fn header_sample_size(&self) -> (usize, Option<RowWarning>) {
        match self.header_sample_size.trim().parse::<usize>() {
            Ok(n) if n > 0 => (n, None),
            _ => (
                DEFAULT_HEADER_SAMPLE_SIZE,
                Some(RowWarning::UnparsableSetting {
                    setting: "header sample size".to_string(),
                    value: self.header_sample_size.clone(),
                    fallback: DEFAULT_HEADER_SAMPLE_SIZE.to_string(),
                }),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incremental() -> Capabilities {
        Capabilities { incremental: true, ..Capabilities::default() }
    }

    #[test]
    fn test_defaults() {
        let cfg = TrainingConfig::default();
        assert_eq!(cfg.folds, 10);
        assert_eq!(cfg.percentage_split, 66.0);
        assert_eq!(cfg.seed, 1);
        assert_eq!(cfg.row_handling, RowHandling::All);
        assert_eq!(cfg.evaluation, EvalMode::None);
        assert!(cfg.validate(&Capabilities::default()).is_ok());
    }

    #[test]
    fn test_batch_with_separate_test_set_rejected() {
        let cfg = TrainingConfig {
            row_handling: RowHandling::Batch { size: 10 },
            evaluation: EvalMode::SeparateTestSet,
            ..TrainingConfig::default()
        };
        assert!(matches!(
            cfg.validate(&Capabilities::default()),
            Err(TrainingError::UnsupportedModeCombination(_))
        ));
    }

    #[test]
    fn test_prequential_requires_incremental_learner() {
        let cfg = TrainingConfig { evaluation: EvalMode::Prequential, ..TrainingConfig::default() };
        assert!(cfg.validate(&Capabilities::default()).is_err());
        assert!(cfg.validate(&incremental()).is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let cfg = TrainingConfig {
            row_handling: RowHandling::Batch { size: 0 },
            ..TrainingConfig::default()
        };
        assert!(matches!(
            cfg.validate(&Capabilities::default()),
            Err(TrainingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_trains_incrementally_only_for_streaming_modes() {
        let mut cfg = TrainingConfig::default();
        assert!(cfg.trains_incrementally(&incremental()));
        assert!(!cfg.trains_incrementally(&Capabilities::default()));
        cfg.evaluation = EvalMode::CrossValidation;
        assert!(!cfg.trains_incrementally(&incremental()));
    }

    #[test]
    fn test_header_sample_size_lenient_parse() {
        let mut cfg = TrainingConfig::default();
        assert_eq!(cfg.header_sample_size(), (100, None));
        cfg.header_sample_size = "25".to_string();
        assert_eq!(cfg.header_sample_size().0, 25);
        cfg.header_sample_size = "lots".to_string();
        let (n, warning) = cfg.header_sample_size();
        assert_eq!(n, DEFAULT_HEADER_SAMPLE_SIZE);
        assert!(warning.is_some());
    }

    #[test]
    fn test_row_handling_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            training: TrainingConfig,
        }
        let parsed: Wrapper = toml::from_str(
            r#"
            [training]
            class_field = "play"
            evaluation = "cross_validation"
            row_handling = { mode = "stratified", field = "region" }
            "#,
        )
        .unwrap();
        assert_eq!(parsed.training.row_handling.stratification_field(), Some("region"));
        assert_eq!(parsed.training.evaluation, EvalMode::CrossValidation);
        assert_eq!(parsed.training.folds, 10);
    }
}
