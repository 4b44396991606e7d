use super::{class_index, normalize_logs};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use strata_abstraction::{
    AttributeKind, Capabilities, Dataset, Learner, Model, ModelError, ModelResult, Record, Schema,
};

const MIN_VARIANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NaiveBayesOptions {
    /// Preferred batch size for batch prediction. `None` predicts all rows at once.
    pub batch_size: Option<usize>,
}

impl Default for NaiveBayesOptions {
    fn default() -> Self {
        Self { batch_size: Some(100) }
    }
}

/// Naive Bayes over nominal and numeric attributes with a nominal class.
#[derive(Debug, Clone, Default)]
pub struct NaiveBayes {
    options: NaiveBayesOptions,
}

impl NaiveBayes {
    pub fn new(options: NaiveBayesOptions) -> Self {
        Self { options }
    }

    fn capabilities_for(options: &NaiveBayesOptions) -> Capabilities {
        Capabilities {
            incremental: true,
            batch_predictor: true,
            preferred_batch_size: options.batch_size,
            ..Capabilities::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum AttributeStats {
    Ignored,
    /// Per class, per value counts with a Laplace start.
    Nominal { name: String, counts: Vec<Vec<f64>> },
    /// Per class weighted moments.
    Gaussian { name: String, weight: Vec<f64>, sum: Vec<f64>, sum_sq: Vec<f64> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NaiveBayesState {
    labels: Vec<String>,
    class_counts: Vec<f64>,
    attributes: Vec<AttributeStats>,
    batch_size: Option<usize>,
}

#[derive(Debug, Clone)]
struct NaiveBayesModel {
    class_index: usize,
    state: NaiveBayesState,
}

impl Learner for NaiveBayes {
    fn name(&self) -> &str {
        "naive_bayes"
    }

    fn options(&self) -> String {
        match self.options.batch_size {
            Some(n) => format!("batch_size={n}"),
            None => "batch_size=all".to_string(),
        }
    }

    fn capabilities(&self) -> Capabilities {
        Self::capabilities_for(&self.options)
    }

    fn fit(&self, data: &Dataset) -> ModelResult<Box<dyn Model>> {
        let mut model = NaiveBayesModel::empty(data.schema(), &self.options)?;
        for record in data.records() {
            model.update(record)?;
        }
        Ok(Box::new(model))
    }

    fn initialize(&self, schema: &Schema) -> ModelResult<Box<dyn Model>> {
        Ok(Box::new(NaiveBayesModel::empty(schema, &self.options)?))
    }

    fn restore(&self, state: &serde_json::Value, schema: &Schema) -> ModelResult<Box<dyn Model>> {
        let state: NaiveBayesState = serde_json::from_value(state.clone())?;
        Ok(Box::new(NaiveBayesModel { class_index: class_index(schema, "naive_bayes")?, state }))
    }
}

impl NaiveBayesModel {
    fn empty(schema: &Schema, options: &NaiveBayesOptions) -> ModelResult<Self> {
        let class_index = class_index(schema, "naive_bayes")?;
        if !schema.class_is_nominal() {
            return Err(ModelError::InvalidData("naive_bayes requires a nominal class".to_string()));
        }
        let classes = schema.num_classes();
        let attributes = schema
            .attributes()
            .iter()
            .enumerate()
            .map(|(i, attr)| {
                if i == class_index {
                    return AttributeStats::Ignored;
                }
                match &attr.kind {
                    AttributeKind::Nominal { values } => AttributeStats::Nominal {
                        name: attr.name.clone(),
                        counts: vec![vec![1.0; values.len()]; classes],
                    },
                    AttributeKind::Numeric | AttributeKind::Date => AttributeStats::Gaussian {
                        name: attr.name.clone(),
                        weight: vec![0.0; classes],
                        sum: vec![0.0; classes],
                        sum_sq: vec![0.0; classes],
                    },
                    AttributeKind::String { .. } => AttributeStats::Ignored,
                }
            })
            .collect();
        let labels = schema.class_attribute().map(|a| a.labels().to_vec()).unwrap_or_default();
        Ok(Self {
            class_index,
            state: NaiveBayesState {
                labels,
                class_counts: vec![1.0; classes],
                attributes,
                batch_size: options.batch_size,
            },
        })
    }
}

fn gaussian_log_density(x: f64, mean: f64, variance: f64) -> f64 {
    let var = variance.max(MIN_VARIANCE);
    -0.5 * ((x - mean).powi(2) / var + (2.0 * std::f64::consts::PI * var).ln())
}

impl Model for NaiveBayesModel {
    fn capabilities(&self) -> Capabilities {
        NaiveBayes::capabilities_for(&NaiveBayesOptions { batch_size: self.state.batch_size })
    }

    fn distribution(&self, record: &Record) -> ModelResult<Vec<f64>> {
        let total: f64 = self.state.class_counts.iter().sum();
        let mut logs: Vec<f64> = self.state.class_counts.iter().map(|c| (c / total).ln()).collect();
        for (i, stats) in self.state.attributes.iter().enumerate() {
            if record.is_missing(i) {
                continue;
            }
            let x = record.value(i);
            match stats {
                AttributeStats::Ignored => {}
                AttributeStats::Nominal { counts, .. } => {
                    for (c, log) in logs.iter_mut().enumerate() {
                        let row = &counts[c];
                        let n: f64 = row.iter().sum();
                        if let Some(count) = row.get(x as usize) {
                            *log += (count / n).ln();
                        }
                    }
                }
                AttributeStats::Gaussian { weight, sum, sum_sq, .. } => {
                    for (c, log) in logs.iter_mut().enumerate() {
                        if weight[c] <= 0.0 {
                            continue;
                        }
                        let mean = sum[c] / weight[c];
                        let variance = sum_sq[c] / weight[c] - mean * mean;
                        *log += gaussian_log_density(x, mean, variance);
                    }
                }
            }
        }
        Ok(normalize_logs(&logs))
    }

    fn update(&mut self, record: &Record) -> ModelResult<()> {
        if record.is_missing(self.class_index) {
            return Ok(());
        }
        let class = record.value(self.class_index) as usize;
        let w = record.weight;
        let Some(prior) = self.state.class_counts.get_mut(class) else {
            return Ok(());
        };
        *prior += w;
        for (i, stats) in self.state.attributes.iter_mut().enumerate() {
            if record.is_missing(i) {
                continue;
            }
            let x = record.value(i);
            match stats {
                AttributeStats::Ignored => {}
                AttributeStats::Nominal { counts, .. } => {
                    if let Some(slot) = counts[class].get_mut(x as usize) {
                        *slot += w;
                    }
                }
                AttributeStats::Gaussian { weight, sum, sum_sq, .. } => {
                    weight[class] += w;
                    sum[class] += x * w;
                    sum_sq[class] += x * x * w;
                }
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        let total: f64 = self.state.class_counts.iter().sum();
        let mut out = String::from("Naive Bayes classifier\n\nClass priors:\n");
        for (label, count) in self.state.labels.iter().zip(&self.state.class_counts) {
            let _ = writeln!(out, "  {label}: {:.4}", count / total);
        }
        for stats in &self.state.attributes {
            match stats {
                AttributeStats::Ignored => {}
                AttributeStats::Nominal { name, counts } => {
                    let _ = writeln!(out, "\n{name} (nominal)");
                    for (label, row) in self.state.labels.iter().zip(counts) {
                        let _ = writeln!(out, "  {label}: {row:?}");
                    }
                }
                AttributeStats::Gaussian { name, weight, sum, sum_sq } => {
                    let _ = writeln!(out, "\n{name} (numeric)");
                    for (c, label) in self.state.labels.iter().enumerate() {
                        if weight[c] <= 0.0 {
                            let _ = writeln!(out, "  {label}: no data");
                            continue;
                        }
                        let mean = sum[c] / weight[c];
                        let sd = (sum_sq[c] / weight[c] - mean * mean).max(0.0).sqrt();
                        let _ = writeln!(out, "  {label}: mean {mean:.4} std dev {sd:.4}");
                    }
                }
            }
        }
        out
    }

    fn to_state(&self) -> ModelResult<serde_json::Value> {
        Ok(serde_json::to_value(&self.state)?)
    }
}
