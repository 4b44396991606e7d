//! Run file loading.
//!
//! ```toml
//! [training]
//! class_field = "play"
//! evaluation = "cross_validation"
//!
//! [training.row_handling]
//! mode = "batch"
//! size = 500
//!
//! [learner]
//! name = "naive_bayes"
//! options = { batch_size = 100 }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use strata_abstraction::Learner;
use strata_training::learners;
use strata_training::TrainingConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct RunFile {
    #[serde(default)]
    pub training: TrainingConfig,
    pub learner: LearnerSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LearnerSection {
    pub name: String,
    #[serde(default)]
    pub options: Option<toml::Value>,
}

impl LearnerSection {
    /// Options as JSON, `null` when absent.
    pub fn options_json(&self) -> Result<serde_json::Value> {
        match &self.options {
            None => Ok(serde_json::Value::Null),
            Some(value) => serde_json::to_value(value)
                .with_context(|| format!("Invalid options for learner '{}'", self.name)),
        }
    }

    pub fn build(&self) -> Result<Box<dyn Learner>> {
        let options = self.options_json()?;
        learners::by_name(&self.name, &options)
            .with_context(|| format!("Failed to create learner '{}'", self.name))
    }
}

pub fn load(path: &Path) -> Result<RunFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read run file {}", path.display()))?;
    parse(&text).with_context(|| format!("Invalid run file {}", path.display()))
}

pub fn parse(text: &str) -> Result<RunFile> {
    Ok(toml::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_abstraction::EvalMode;
    use strata_training::RowHandling;

    #[test]
    fn test_parse_run_file() {
        let run = parse(
            r#"
[training]
class_field = "play"
evaluation = "cross_validation"
folds = 5

[training.row_handling]
mode = "batch"
size = 50

[learner]
name = "naive_bayes"
options = { batch_size = 10 }
"#,
        )
        .unwrap();
        assert_eq!(run.training.class_field.as_deref(), Some("play"));
        assert_eq!(run.training.evaluation, EvalMode::CrossValidation);
        assert_eq!(run.training.folds, 5);
        assert_eq!(run.training.row_handling, RowHandling::Batch { size: 50 });
        assert_eq!(run.learner.options_json().unwrap(), serde_json::json!({ "batch_size": 10 }));
        assert_eq!(run.learner.build().unwrap().name(), "naive_bayes");
    }

    #[test]
    fn test_training_section_defaults() {
        let run = parse("[learner]\nname = \"zero_r\"\n").unwrap();
        assert_eq!(run.training.row_handling, RowHandling::All);
        assert_eq!(run.learner.options_json().unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn test_unknown_learner() {
        let run = parse("[learner]\nname = \"forest\"\n").unwrap();
        assert!(run.learner.build().is_err());
    }
}
