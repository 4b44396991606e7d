//! Reference learners.
//!
//! - `zero_r`: majority class or mean target, incremental
//! - `naive_bayes`: nominal class, incremental, batch predictor
//! - `linear_regression`: numeric class, incremental and resumable

mod linear_regression;
mod naive_bayes;
mod zero_r;

pub use linear_regression::{LinearRegression, LinearRegressionOptions};
pub use naive_bayes::{NaiveBayes, NaiveBayesOptions};
pub use zero_r::ZeroR;

use serde::de::DeserializeOwned;
use strata_abstraction::{Learner, ModelError, ModelResult, Schema};

/// Names accepted by [`by_name`].
pub const LEARNER_NAMES: &[&str] = &["zero_r", "naive_bayes", "linear_regression"];

/// Construct a learner from its name and a free-form options object.
pub fn by_name(name: &str, options: &serde_json::Value) -> ModelResult<Box<dyn Learner>> {
    match name {
        "zero_r" => Ok(Box::new(ZeroR)),
        "naive_bayes" => Ok(Box::new(NaiveBayes::new(parse_options(name, options)?))),
        "linear_regression" => Ok(Box::new(LinearRegression::new(parse_options(name, options)?))),
        other => Err(ModelError::Unsupported(format!(
            "unknown learner '{other}', expected one of {}",
            LEARNER_NAMES.join(", ")
        ))),
    }
}

fn parse_options<T: DeserializeOwned + Default>(
    learner: &str,
    options: &serde_json::Value,
) -> ModelResult<T> {
    if options.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(options.clone())
        .map_err(|e| ModelError::Unsupported(format!("options for {learner}: {e}")))
}

fn class_index(schema: &Schema, learner: &str) -> ModelResult<usize> {
    schema
        .class_index()
        .ok_or_else(|| ModelError::InvalidData(format!("{learner} requires a class attribute")))
}

/// Normalize a vector of log-likelihoods into probabilities.
fn normalize_logs(logs: &[f64]) -> Vec<f64> {
    let max = logs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return vec![0.0; logs.len()];
    }
    let exp: Vec<f64> = logs.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name() {
        assert_eq!(by_name("zero_r", &serde_json::Value::Null).unwrap().name(), "zero_r");
        let nb = by_name("naive_bayes", &serde_json::json!({ "batch_size": 50 })).unwrap();
        assert_eq!(nb.capabilities().preferred_batch_size, Some(50));
        assert!(by_name("svm", &serde_json::Value::Null).is_err());
        assert!(by_name("linear_regression", &serde_json::json!({ "epochs": "many" })).is_err());
    }

    #[test]
    fn test_normalize_logs() {
        let p = normalize_logs(&[0.0, 0.0]);
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert_eq!(normalize_logs(&[f64::NEG_INFINITY]), vec![0.0]);
    }
}
