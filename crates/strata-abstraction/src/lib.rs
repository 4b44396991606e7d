//! Strata abstraction layer.
//!
//! Data model and collaborator contracts shared by the training core and its hosts:
//! - Typed external rows (`Value`, `RowMeta`)
//! - Dataset schema, records and datasets
//! - The `Learner` / `Model` traits with declared `Capabilities`
//! - The `Evaluator` trait

pub mod error;
pub mod evaluator;
pub mod model;
pub mod row;
pub mod schema;

pub use error::{ModelError, ModelResult};
pub use evaluator::{EvalMode, Evaluator, Priors};
pub use model::{arg_max, Capabilities, Learner, Model};
pub use row::{FieldMeta, FieldType, Row, RowMeta, Value};
pub use schema::{is_missing, Attribute, AttributeKind, Dataset, Record, Schema, MISSING};
