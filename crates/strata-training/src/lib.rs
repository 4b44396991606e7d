//! Strata training core.
//!
//! Streams typed rows through model training and evaluation:
//! - Schema construction from field specs and sampled rows
//! - Buffered training per batch or per stratification value
//! - Incremental training with prequential (test-then-train) evaluation
//! - Separate test set evaluation of trained models
//! - Scoring rows with saved models
//!
//! # Example
//!
//! ```no_run
//! use strata_abstraction::{FieldMeta, FieldType, RowMeta, Value};
//! use strata_training::{learners::ZeroR, TrainingConfig, TrainingRun};
//!
//! let meta = RowMeta::new(vec![
//!     FieldMeta::new("temp", FieldType::Number),
//!     FieldMeta::new("play", FieldType::String),
//! ]);
//! let mut run = TrainingRun::new(TrainingConfig::default(), meta, Box::new(ZeroR))?;
//! run.process_training_row(Some(&vec![Value::Number(20.0), Value::from("yes")]))?;
//! let rows = run.process_training_row(None)?;
//! # Ok::<(), strata_training::TrainingError>(())
//! ```

pub mod buffer;
pub mod config;
mod context;
mod controller;
pub mod error;
pub mod evaluation;
pub mod header;
mod incremental;
pub mod instance;
pub mod learners;
pub mod metrics;
pub mod output;
pub mod persistence;
mod run;
pub mod sampling;
pub mod scoring;
mod separate_test;

pub use config::{FieldSpec, RowHandling, TrainingConfig, DEFAULT_HEADER_SAMPLE_SIZE};
pub use controller::ControllerState;
pub use error::{RowWarning, TrainingError, TrainingResult};
pub use evaluation::{EvaluatorSettings, StandardEvaluator};
pub use header::{field_specs_from_meta, SchemaBuilder};
pub use instance::{build_dataset, RecordConverter, StringValues};
pub use output::MetricLayout;
pub use persistence::{
    load_artifact, load_resumable, resolve_model_path, ModelArtifact, ModelStore, SavedModel,
};
pub use run::TrainingRun;
pub use scoring::{
    find_mappings, FieldMapping, MappingStatus, Scorer, ScoringOptions, UNABLE_TO_PREDICT,
    UNABLE_TO_PREDICT_CLUSTER,
};
