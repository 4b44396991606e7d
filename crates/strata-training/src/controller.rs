//! Buffered training: rows are collected per batch or per stratum and trained on flush.

use crate::buffer::RowBuffer;
use crate::config::RowHandling;
use crate::context::{describe_target, Stratum, TrainingContext};
use crate::error::{TrainingError, TrainingResult};
use crate::instance::build_dataset;
use crate::persistence::load_resumable;
use indexmap::IndexMap;
use std::collections::HashSet;
use strata_abstraction::{Dataset, EvalMode, Evaluator, Model, Priors, Row};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Buffering,
    Flushing,
}

#[derive(Debug)]
pub(crate) struct BatchController {
    state: ControllerState,
    buffer: RowBuffer,
    current_key: Option<String>,
    /// Stratification values whose group has been flushed this run.
    closed: HashSet<String>,
    batch_number: u64,
    /// Models kept for separate test set evaluation, in training order.
    trained: IndexMap<Option<String>, Stratum>,
}

impl BatchController {
    pub fn new(ctx: &TrainingContext) -> Self {
        let buffer = if ctx.config.reservoir_sampling {
            RowBuffer::reservoir(ctx.config.reservoir_size, ctx.config.seed)
        } else {
            RowBuffer::plain()
        };
        Self {
            state: ControllerState::Idle,
            buffer,
            current_key: None,
            closed: HashSet::new(),
            batch_number: 0,
            trained: IndexMap::new(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn process_row(&mut self, ctx: &mut TrainingContext, row: &Row) -> TrainingResult<Vec<Row>> {
        let mut output = Vec::new();
        match ctx.config.row_handling.clone() {
            RowHandling::All => self.buffer_row(row),
            RowHandling::Batch { size } => {
                self.buffer_row(row);
                if self.buffer.len() >= size {
                    output = self.flush(ctx)?;
                }
            }
            RowHandling::Stratified { .. } => {
                let Some(Some(key)) = ctx.stratum_key(row) else {
                    return Ok(output);
                };
                if self.current_key.as_deref() != Some(key.as_str()) {
                    if self.closed.contains(&key) {
                        return Err(TrainingError::RepeatedStratificationValue(key));
                    }
                    output = self.flush(ctx)?;
                    if let Some(previous) = self.current_key.replace(key) {
                        self.closed.insert(previous);
                    }
                }
                self.buffer_row(row);
            }
        }
        Ok(output)
    }

    fn buffer_row(&mut self, row: &Row) {
        self.buffer.push(row.clone());
        self.state = ControllerState::Buffering;
    }

    /// End of stream: flush what is left and reset the run counters.
    pub fn finish(&mut self, ctx: &mut TrainingContext) -> TrainingResult<Vec<Row>> {
        let output = self.flush(ctx)?;
        self.batch_number = 0;
        self.current_key = None;
        self.closed.clear();
        Ok(output)
    }

    /// Models trained for separate test set evaluation.
    pub fn take_trained(&mut self) -> IndexMap<Option<String>, Stratum> {
        std::mem::take(&mut self.trained)
    }

    /// Train on the buffered rows. An empty buffer is a no-op.
    fn flush(&mut self, ctx: &mut TrainingContext) -> TrainingResult<Vec<Row>> {
        let rows = self.buffer.take();
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.state = ControllerState::Flushing;
        let batch = ctx.config.row_handling.is_batch().then(|| {
            self.batch_number += 1;
            self.batch_number
        });
        let key = self.current_key.clone();
        let label = describe_target(key.as_deref(), batch);
        info!(flush = %label, rows = rows.len(), "flushing");

        let (output, stratum) =
            process_batch(ctx, &rows, key, batch).map_err(|e| e.in_flush(label))?;
        if let Some(stratum) = stratum {
            self.trained.insert(stratum.key.clone(), stratum);
        }
        self.state = ControllerState::Idle;
        Ok(output)
    }
}

/// Build, evaluate, train and emit for one flushed set of rows.
///
/// Returns the output rows and, in separate test set mode, the trained stratum.
fn process_batch(
    ctx: &mut TrainingContext,
    rows: &[Row],
    key: Option<String>,
    batch: Option<u64>,
) -> TrainingResult<(Vec<Row>, Option<Stratum>)> {
    let schema = ctx.builder.build(&ctx.meta, rows)?;
    let dataset = build_dataset(schema, &ctx.meta, rows);
    let priors = Priors::from_dataset(&dataset);
    let mut evaluator = ctx.new_evaluator(dataset.schema(), priors.as_ref())?;
    evaluator.evaluate_protocol(ctx.learner.as_ref(), &dataset)?;

    let mut output = Vec::new();
    let mode = ctx.mode();
    if mode != EvalMode::None && evaluator.was_evaluation_performed() {
        output.push(evaluator.metric_row(key.as_deref(), batch));
    }

    let needs_model =
        ctx.store.is_some() || matches!(mode, EvalMode::None | EvalMode::SeparateTestSet);
    if !needs_model {
        return Ok((output, None));
    }
    let model = full_model(ctx, evaluator.as_ref(), &dataset)?;
    ctx.save_model(model.as_ref(), dataset.schema(), Some(&dataset), key.as_deref(), batch)?;
    if mode == EvalMode::None {
        output.push(ctx.model_text_row(key.as_deref(), batch, model.describe()));
    }
    let stratum = (mode == EvalMode::SeparateTestSet).then(|| {
        let (schema, _) = dataset.into_parts();
        Stratum { key, schema, model, evaluator }
    });
    Ok((output, stratum))
}

/// Fit on the whole dataset, or continue training a saved model when resuming.
fn full_model(
    ctx: &TrainingContext,
    evaluator: &dyn Evaluator,
    dataset: &Dataset,
) -> TrainingResult<Box<dyn Model>> {
    if let Some(location) = ctx.config.resume_model_path.as_deref() {
        let (mut model, _) = load_resumable(location, ctx.learner.as_ref())?;
        debug!(rows = dataset.len(), "continuing training of saved model");
        model.continue_training(dataset)?;
        return Ok(model);
    }
    Ok(evaluator.build_final_model(ctx.learner.as_ref(), dataset)?)
}
