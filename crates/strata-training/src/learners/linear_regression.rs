use super::class_index;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use strata_abstraction::{
    Capabilities, Dataset, Learner, Model, ModelError, ModelResult, Record, Schema,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearRegressionOptions {
    pub learning_rate: f64,
    /// Gradient descent passes per fit or continuation.
    pub epochs: usize,
}

impl Default for LinearRegressionOptions {
    fn default() -> Self {
        Self { learning_rate: 0.1, epochs: 500 }
    }
}

/// Linear regression with bias, fitted by gradient descent on standardized inputs.
#[derive(Debug, Clone, Default)]
pub struct LinearRegression {
    options: LinearRegressionOptions,
}

impl LinearRegression {
    pub fn new(options: LinearRegressionOptions) -> Self {
        Self { options }
    }

    fn capabilities_static() -> Capabilities {
        Capabilities { incremental: true, resumable: true, ..Capabilities::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearState {
    class_name: String,
    /// Attribute names, `None` for slots that are not used as inputs.
    inputs: Vec<Option<String>>,
    weights: Vec<f64>,
    bias: f64,
    means: Vec<f64>,
    scales: Vec<f64>,
    learning_rate: f64,
    epochs: usize,
}

#[derive(Debug, Clone)]
struct LinearModel {
    class_index: usize,
    state: LinearState,
}

impl Learner for LinearRegression {
    fn name(&self) -> &str {
        "linear_regression"
    }

    fn options(&self) -> String {
        format!("learning_rate={} epochs={}", self.options.learning_rate, self.options.epochs)
    }

    fn capabilities(&self) -> Capabilities {
        Self::capabilities_static()
    }

    fn fit(&self, data: &Dataset) -> ModelResult<Box<dyn Model>> {
        let mut model = LinearModel::empty(data.schema(), &self.options)?;
        model.standardize_from(data);
        model.state.bias = model.target_mean(data);
        model.descend(data);
        Ok(Box::new(model))
    }

    fn initialize(&self, schema: &Schema) -> ModelResult<Box<dyn Model>> {
        Ok(Box::new(LinearModel::empty(schema, &self.options)?))
    }

    fn restore(&self, state: &serde_json::Value, schema: &Schema) -> ModelResult<Box<dyn Model>> {
        let state: LinearState = serde_json::from_value(state.clone())?;
        Ok(Box::new(LinearModel { class_index: class_index(schema, "linear_regression")?, state }))
    }
}

impl LinearModel {
    fn empty(schema: &Schema, options: &LinearRegressionOptions) -> ModelResult<Self> {
        let class_index = class_index(schema, "linear_regression")?;
        let class = schema.class_attribute().ok_or_else(|| {
            ModelError::InvalidData("linear_regression requires a class attribute".to_string())
        })?;
        if !class.is_numeric() {
            return Err(ModelError::InvalidData(
                "linear_regression requires a numeric class".to_string(),
            ));
        }
        let inputs: Vec<Option<String>> = schema
            .attributes()
            .iter()
            .enumerate()
            .map(|(i, a)| (i != class_index && a.is_numeric()).then(|| a.name.clone()))
            .collect();
        let width = inputs.len();
        Ok(Self {
            class_index,
            state: LinearState {
                class_name: class.name.clone(),
                inputs,
                weights: vec![0.0; width],
                bias: 0.0,
                means: vec![0.0; width],
                scales: vec![1.0; width],
                learning_rate: options.learning_rate,
                epochs: options.epochs,
            },
        })
    }

    fn standardize_from(&mut self, data: &Dataset) {
        for i in 0..self.state.inputs.len() {
            if self.state.inputs[i].is_none() {
                continue;
            }
            let values: Vec<f64> =
                data.records().iter().filter(|r| !r.is_missing(i)).map(|r| r.value(i)).collect();
            if values.is_empty() {
                continue;
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            self.state.means[i] = mean;
            self.state.scales[i] = if var > 0.0 { var.sqrt() } else { 1.0 };
        }
    }

    fn target_mean(&self, data: &Dataset) -> f64 {
        let targets: Vec<f64> = data
            .records()
            .iter()
            .filter(|r| !r.is_missing(self.class_index))
            .map(|r| r.value(self.class_index))
            .collect();
        if targets.is_empty() { 0.0 } else { targets.iter().sum::<f64>() / targets.len() as f64 }
    }

    /// Standardized inputs, missing slots at the mean.
    fn features(&self, record: &Record) -> Vec<f64> {
        (0..self.state.inputs.len())
            .map(|i| {
                if self.state.inputs[i].is_none() || record.is_missing(i) {
                    0.0
                } else {
                    (record.value(i) - self.state.means[i]) / self.state.scales[i]
                }
            })
            .collect()
    }

    fn predict(&self, features: &[f64]) -> f64 {
        features.iter().zip(&self.state.weights).map(|(x, w)| x * w).sum::<f64>() + self.state.bias
    }

    /// Full-batch gradient descent over the labelled records.
    fn descend(&mut self, data: &Dataset) {
        let samples: Vec<(Vec<f64>, f64)> = data
            .records()
            .iter()
            .filter(|r| !r.is_missing(self.class_index))
            .map(|r| (self.features(r), r.value(self.class_index)))
            .collect();
        if samples.is_empty() {
            return;
        }
        let n = samples.len() as f64;
        let lr = self.state.learning_rate;
        for _ in 0..self.state.epochs {
            let errors: Vec<f64> = samples.iter().map(|(x, y)| self.predict(x) - y).collect();
            for (idx, weight) in self.state.weights.iter_mut().enumerate() {
                let grad = errors.iter().zip(&samples).map(|(e, (x, _))| e * x[idx]).sum::<f64>() / n;
                *weight -= lr * grad;
            }
            self.state.bias -= lr * errors.iter().sum::<f64>() / n;
        }
    }
}

impl Model for LinearModel {
    fn capabilities(&self) -> Capabilities {
        LinearRegression::capabilities_static()
    }

    fn distribution(&self, record: &Record) -> ModelResult<Vec<f64>> {
        Ok(vec![self.predict(&self.features(record))])
    }

    /// Normalized least-mean-squares step, stable for learning rates below 2.
    fn update(&mut self, record: &Record) -> ModelResult<()> {
        if record.is_missing(self.class_index) {
            return Ok(());
        }
        let x = self.features(record);
        let err = record.value(self.class_index) - self.predict(&x);
        let norm = 1.0 + x.iter().map(|v| v * v).sum::<f64>();
        let step = self.state.learning_rate * err / norm;
        for (w, xi) in self.state.weights.iter_mut().zip(&x) {
            *w += step * xi;
        }
        self.state.bias += step;
        Ok(())
    }

    fn continue_training(&mut self, data: &Dataset) -> ModelResult<()> {
        self.descend(data);
        Ok(())
    }

    fn describe(&self) -> String {
        let mut out = format!("Linear regression model\n\n{} =\n", self.state.class_name);
        let mut intercept = self.state.bias;
        for (i, name) in self.state.inputs.iter().enumerate() {
            let Some(name) = name else { continue };
            let coef = self.state.weights[i] / self.state.scales[i];
            intercept -= coef * self.state.means[i];
            let _ = writeln!(out, "  {coef:>12.4} * {name} +");
        }
        let _ = writeln!(out, "  {intercept:>12.4}");
        out
    }

    fn to_state(&self) -> ModelResult<serde_json::Value> {
        Ok(serde_json::to_value(&self.state)?)
    }
}
