//! Shared fixtures for training integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use strata_abstraction::{
    Capabilities, Dataset, FieldMeta, FieldType, Learner, Model, ModelError, ModelResult, Record,
    Row, RowMeta, Schema, Value,
};
use strata_training::{FieldSpec, RowHandling, TrainingConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Fit { rows: usize },
    Predict { x: f64 },
    Update { x: f64 },
}

pub type Log = Rc<RefCell<Vec<Event>>>;

/// Learner that records every call made to it and to its models.
#[derive(Debug, Clone)]
pub struct RecordingLearner {
    pub log: Log,
    pub capabilities: Capabilities,
}

impl RecordingLearner {
    pub fn batch() -> Self {
        Self { log: Log::default(), capabilities: Capabilities::default() }
    }

    pub fn incremental() -> Self {
        Self {
            log: Log::default(),
            capabilities: Capabilities { incremental: true, ..Capabilities::default() },
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.borrow().clone()
    }

    pub fn fits(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Fit { rows } => Some(rows),
                _ => None,
            })
            .collect()
    }

    fn model(&self) -> RecordingModel {
        RecordingModel { log: Rc::clone(&self.log), capabilities: self.capabilities, updates: 0 }
    }
}

impl Learner for RecordingLearner {
    fn name(&self) -> &str {
        "recording"
    }

    fn options(&self) -> String {
        String::new()
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn fit(&self, data: &Dataset) -> ModelResult<Box<dyn Model>> {
        self.log.borrow_mut().push(Event::Fit { rows: data.len() });
        Ok(Box::new(self.model()))
    }

    fn initialize(&self, _schema: &Schema) -> ModelResult<Box<dyn Model>> {
        if !self.capabilities.incremental {
            return Err(ModelError::NotUpdatable);
        }
        Ok(Box::new(self.model()))
    }

    fn restore(&self, _state: &serde_json::Value, _schema: &Schema) -> ModelResult<Box<dyn Model>> {
        Ok(Box::new(self.model()))
    }
}

#[derive(Debug)]
pub struct RecordingModel {
    log: Log,
    capabilities: Capabilities,
    updates: usize,
}

impl Model for RecordingModel {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn distribution(&self, record: &Record) -> ModelResult<Vec<f64>> {
        self.log.borrow_mut().push(Event::Predict { x: record.value(0) });
        Ok(vec![0.5, 0.5])
    }

    fn update(&mut self, record: &Record) -> ModelResult<()> {
        self.log.borrow_mut().push(Event::Update { x: record.value(0) });
        self.updates += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("recording model after {} updates", self.updates)
    }

    fn to_state(&self) -> ModelResult<serde_json::Value> {
        Ok(serde_json::json!({ "updates": self.updates }))
    }
}

/// Row layout `region, x, c`.
pub fn meta() -> RowMeta {
    RowMeta::new(vec![
        FieldMeta::new("region", FieldType::String),
        FieldMeta::new("x", FieldType::Number),
        FieldMeta::new("c", FieldType::String),
    ])
}

pub fn row(region: &str, x: f64, c: &str) -> Row {
    vec![Value::from(region), Value::Number(x), Value::from(c)]
}

/// Config over `meta()` with `c` as a declared `a`/`b` class.
pub fn config(row_handling: RowHandling) -> TrainingConfig {
    TrainingConfig {
        row_handling,
        fields: vec![
            FieldSpec::new("region", "nominal"),
            FieldSpec::new("x", "numeric"),
            FieldSpec::new("c", "nominal").with_legal_values(["a", "b"]),
        ],
        class_field: Some("c".to_string()),
        ..TrainingConfig::default()
    }
}

pub fn stratified() -> RowHandling {
    RowHandling::Stratified { field: "region".to_string() }
}

/// Column of `row` named `name` in `meta`.
pub fn column<'a>(meta: &RowMeta, row: &'a Row, name: &str) -> &'a Value {
    &row[meta.index_of(name).unwrap()]
}
