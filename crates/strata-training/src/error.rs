use strata_abstraction::ModelError;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

/// Fatal failures surfaced to the host. Recoverable row issues are [`RowWarning`]s instead.
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unsupported attribute kind '{kind}' for field '{field}'")]
    UnsupportedAttributeKind { field: String, kind: String },

    #[error("unsupported mode combination: {0}")]
    UnsupportedModeCombination(String),

    #[error("stratification value '{0}' reappeared after its group was closed; input must be sorted by the stratification field")]
    RepeatedStratificationValue(String),

    #[error("malformed model path '{path}': {reason}")]
    MalformedModelPath { path: String, reason: String },

    #[error("loaded model '{0}' does not support resumable training")]
    NotResumable(String),

    #[error("wrong model kind: {0}")]
    WrongModelKind(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("{context}: {source}")]
    Flush {
        context: String,
        #[source]
        source: Box<TrainingError>,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TrainingError {
    /// Wrap a failure with the flush it happened in.
    pub fn in_flush(self, context: impl Into<String>) -> Self {
        Self::Flush { context: context.into(), source: Box::new(self) }
    }
}

/// Recoverable per-row condition. Logged, then resolved to a documented fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowWarning {
    /// Row dropped because its stratification value is missing.
    MissingStratificationValue { field: String },
    /// Scoring input field absent for a model attribute; treated as missing.
    UnmappedField { attribute: String },
    /// Scoring input field type incompatible with a model attribute; treated as missing.
    TypeMismatch { attribute: String, field: String },
    /// Numeric setting could not be parsed; default used.
    UnparsableSetting { setting: String, value: String, fallback: String },
    /// Model updates disabled during scoring.
    UpdateDisabled { reason: String },
    /// Test row dropped because no model was trained for its stratification value.
    NoTrainedModel { stratum: Option<String> },
}

impl std::fmt::Display for RowWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingStratificationValue { field } => {
                write!(f, "missing value for stratification field '{field}', row skipped")
            }
            Self::UnmappedField { attribute } => {
                write!(f, "no input field matches model attribute '{attribute}'")
            }
            Self::TypeMismatch { attribute, field } => {
                write!(f, "input field '{field}' has the wrong type for model attribute '{attribute}'")
            }
            Self::UnparsableSetting { setting, value, fallback } => {
                write!(f, "unable to parse {setting} '{value}', using {fallback}")
            }
            Self::UpdateDisabled { reason } => write!(f, "model updates disabled: {reason}"),
            Self::NoTrainedModel { stratum: Some(value) } => {
                write!(f, "no model was trained for stratification value '{value}', row skipped")
            }
            Self::NoTrainedModel { stratum: None } => {
                write!(f, "no model was trained, row skipped")
            }
        }
    }
}
