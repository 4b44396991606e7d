//! Scoring command implementation.

use crate::io::{self, RowSink, RowSource};
use anyhow::{bail, Context, Result};
use std::fs::File;
use std::path::PathBuf;
use strata_abstraction::Row;
use strata_training::{
    load_artifact, MappingStatus, Scorer, ScoringOptions, DEFAULT_HEADER_SAMPLE_SIZE,
};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub model: String,
    pub input: PathBuf,
    pub probabilities: bool,
    pub update: bool,
    pub batch_size: Option<usize>,
    pub evaluate: bool,
    pub ir_metrics: bool,
    pub auc_metrics: bool,
    pub output: Option<PathBuf>,
    pub json: bool,
}

pub fn execute(request: &ScoreRequest) -> Result<()> {
    if request.batch_size == Some(0) {
        bail!("--batch-size must be at least 1");
    }
    let artifact = load_artifact(&request.model)
        .with_context(|| format!("Failed to load model {}", request.model))?;
    let rows = RowSource::open(
        &request.input,
        &io::hints_from_schema(&artifact.schema),
        DEFAULT_HEADER_SAMPLE_SIZE,
    )?;

    let options = ScoringOptions {
        output_probabilities: request.probabilities,
        update_model: request.update,
        output_ir_metrics: request.ir_metrics,
        output_auc_metrics: request.auc_metrics,
    };
    let mut scorer = Scorer::from_artifact(&artifact, rows.meta().clone(), options)
        .context("Model cannot score these rows")?;
    for mapping in scorer.mappings().iter().filter(|m| m.status != MappingStatus::Ok) {
        info!(attribute = %mapping.attribute, status = ?mapping.status, "attribute will be missing");
    }
    if request.update && !scorer.update_enabled() {
        warn!("model updates disabled for this input");
    }
    info!(learner = %artifact.learner, "scoring");

    if request.evaluate {
        evaluate(&mut scorer, rows, request)
    } else {
        score(&mut scorer, rows, request)
    }
}

/// Hands rows to `f` in chunks of at most `size`, keeping only one chunk in memory.
fn in_batches(
    rows: RowSource<File>,
    size: usize,
    mut f: impl FnMut(&[Row]) -> Result<()>,
) -> Result<()> {
    let mut batch = Vec::with_capacity(size);
    for row in rows {
        batch.push(row?);
        if batch.len() == size {
            f(&batch)?;
            batch.clear();
        }
    }
    if batch.is_empty() { Ok(()) } else { f(&batch) }
}

fn score(scorer: &mut Scorer, rows: RowSource<File>, request: &ScoreRequest) -> Result<()> {
    let mut sink = RowSink::open(request.output.as_deref(), &scorer.output_row_meta(), request.json)?;
    match request.batch_size {
        Some(size) => {
            in_batches(rows, size, |batch| sink.write_all(&scorer.score_rows(batch)?))?;
        }
        None => {
            for row in rows {
                sink.write(&scorer.score_row(&row?)?)?;
            }
        }
    }
    sink.finish()
}

fn evaluate(scorer: &mut Scorer, rows: RowSource<File>, request: &ScoreRequest) -> Result<()> {
    match request.batch_size {
        Some(size) => {
            in_batches(rows, size, |batch| Ok(scorer.evaluate_rows(batch)?))?;
        }
        None => {
            for row in rows {
                scorer.evaluate_row(&row?)?;
            }
        }
    }
    let mut sink =
        RowSink::open(request.output.as_deref(), &scorer.evaluation_row_meta(), request.json)?;
    match scorer.evaluation_row() {
        Some(row) => sink.write(&row)?,
        None => warn!("no labelled rows were evaluated"),
    }
    sink.finish()
}
