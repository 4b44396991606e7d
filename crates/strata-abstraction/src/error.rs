use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ModelResult<T> = std::result::Result<T, ModelError>;

/// Failures raised by learners, trained models and evaluators.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelError {
    /// Data does not fit the schema or the learner's expectations.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Fitting failed.
    #[error("fit failed: {0}")]
    Fit(String),

    /// The model cannot be updated one record at a time.
    #[error("model does not support incremental updates")]
    NotUpdatable,

    /// The model cannot continue training from a previous state.
    #[error("model does not support resumable training")]
    NotResumable,

    /// Evaluation could not be carried out.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// Model state could not be encoded or decoded.
    #[error("model state error: {0}")]
    State(String),

    /// Requested learner or option is not known.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        Self::State(err.to_string())
    }
}
