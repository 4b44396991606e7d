use super::class_index;
use serde::{Deserialize, Serialize};
use strata_abstraction::{
    Capabilities, Dataset, Learner, Model, ModelError, ModelResult, Record, Schema,
};

/// Predicts the majority class, or the mean target for numeric classes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroR;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZeroRState {
    class_name: String,
    /// Empty for numeric classes.
    labels: Vec<String>,
    counts: Vec<f64>,
    sum: f64,
    weight: f64,
}

#[derive(Debug, Clone)]
struct ZeroRModel {
    class_index: usize,
    state: ZeroRState,
}

impl ZeroR {
    fn capabilities_static() -> Capabilities {
        Capabilities { incremental: true, ..Capabilities::default() }
    }
}

impl Learner for ZeroR {
    fn name(&self) -> &str {
        "zero_r"
    }

    fn options(&self) -> String {
        String::new()
    }

    fn capabilities(&self) -> Capabilities {
        Self::capabilities_static()
    }

    fn fit(&self, data: &Dataset) -> ModelResult<Box<dyn Model>> {
        let mut model = ZeroRModel::empty(data.schema())?;
        for record in data.records() {
            model.update(record)?;
        }
        Ok(Box::new(model))
    }

    fn initialize(&self, schema: &Schema) -> ModelResult<Box<dyn Model>> {
        Ok(Box::new(ZeroRModel::empty(schema)?))
    }

    fn restore(&self, state: &serde_json::Value, schema: &Schema) -> ModelResult<Box<dyn Model>> {
        let state: ZeroRState = serde_json::from_value(state.clone())?;
        Ok(Box::new(ZeroRModel { class_index: class_index(schema, "zero_r")?, state }))
    }
}

impl ZeroRModel {
    fn empty(schema: &Schema) -> ModelResult<Self> {
        let class_index = class_index(schema, "zero_r")?;
        let class = schema
            .class_attribute()
            .ok_or_else(|| ModelError::InvalidData("zero_r requires a class attribute".to_string()))?;
        let labels = if class.is_nominal() { class.labels().to_vec() } else { Vec::new() };
        Ok(Self {
            class_index,
            state: ZeroRState {
                class_name: class.name.clone(),
                counts: vec![1.0; labels.len()],
                labels,
                sum: 0.0,
                weight: 0.0,
            },
        })
    }

    fn is_nominal(&self) -> bool {
        !self.state.labels.is_empty()
    }
}

impl Model for ZeroRModel {
    fn capabilities(&self) -> Capabilities {
        ZeroR::capabilities_static()
    }

    fn distribution(&self, _record: &Record) -> ModelResult<Vec<f64>> {
        if self.is_nominal() {
            let total: f64 = self.state.counts.iter().sum();
            return Ok(self.state.counts.iter().map(|c| c / total).collect());
        }
        if self.state.weight > 0.0 {
            Ok(vec![self.state.sum / self.state.weight])
        } else {
            Ok(vec![f64::NAN])
        }
    }

    fn update(&mut self, record: &Record) -> ModelResult<()> {
        if record.is_missing(self.class_index) {
            return Ok(());
        }
        let value = record.value(self.class_index);
        if self.is_nominal() {
            if let Some(slot) = self.state.counts.get_mut(value as usize) {
                *slot += record.weight;
            }
        } else {
            self.state.sum += value * record.weight;
            self.state.weight += record.weight;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        let prediction = if self.is_nominal() {
            let best = self
                .state
                .counts
                .iter()
                .enumerate()
                .fold((0, f64::MIN), |acc, (i, &c)| if c > acc.1 { (i, c) } else { acc });
            self.state.labels.get(best.0).cloned().unwrap_or_default()
        } else if self.state.weight > 0.0 {
            format!("{:.4}", self.state.sum / self.state.weight)
        } else {
            "?".to_string()
        };
        format!("ZeroR predicts class value: {prediction} ({})", self.state.class_name)
    }

    fn to_state(&self) -> ModelResult<serde_json::Value> {
        Ok(serde_json::to_value(&self.state)?)
    }
}
