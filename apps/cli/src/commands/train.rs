//! Training command implementation.

use crate::config;
use crate::io::{self, RowSink};
use anyhow::{Context, Result};
use std::path::Path;
use strata_abstraction::EvalMode;
use strata_training::TrainingRun;
use tracing::{info, warn};

pub fn execute(
    config_path: &Path,
    input: &Path,
    test: Option<&Path>,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let run_file = config::load(config_path)?;
    let learner = run_file.learner.build()?;
    let hints = io::hints_from_specs(&run_file.training.fields);
    let separate_test = run_file.training.evaluation == EvalMode::SeparateTestSet;

    let sample_size = run_file.training.header_sample_size().0;

    let training = io::RowSource::open(input, &hints, sample_size)?;
    info!(learner = learner.name(), "training");

    let mut run = TrainingRun::new(run_file.training, training.meta().clone(), learner)
        .context("Invalid training configuration")?;
    let mut sink = RowSink::open(output, &run.output_row_meta(), json)?;

    let mut rows = 0usize;
    for row in training {
        sink.write_all(&run.process_training_row(Some(&row?))?)?;
        rows += 1;
    }
    sink.write_all(&run.process_training_row(None)?)?;
    info!(rows, "training rows read");

    match test {
        Some(path) => {
            let test_rows = io::RowSource::open(path, &hints, sample_size)?;
            info!("evaluating on separate test set");
            run.begin_test_set(test_rows.meta()).context("Cannot evaluate on a test set")?;
            for row in test_rows {
                sink.write_all(&run.process_test_row(Some(&row?))?)?;
            }
            sink.write_all(&run.process_test_row(None)?)?;
        }
        None if separate_test => {
            warn!("separate test set evaluation requested but no --test file given");
        }
        None => {}
    }

    let warnings = run.take_warnings();
    if !warnings.is_empty() {
        warn!(count = warnings.len(), "some rows were skipped or degraded");
    }
    for saved in run.saved_models() {
        info!(path = %saved.path.display(), sha256 = %saved.sha256, "model available");
    }

    sink.finish()
}
