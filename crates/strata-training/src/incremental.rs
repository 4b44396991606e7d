//! Incremental training: one live model per stratification key, updated row by row.
//!
//! Keys whose schema needs sampled values cache rows until the header sample size is
//! reached, then replay them through the same per-row path used for live rows.

use crate::config::RowHandling;
use crate::context::{describe_target, LiveStratum, Stratum, TrainingContext};
use crate::error::TrainingResult;
use indexmap::IndexMap;
use strata_abstraction::{EvalMode, Row};
use tracing::{debug, info};

#[derive(Debug)]
enum KeyPhase {
    AwaitingSchema { cache: Vec<Row> },
    Training(LiveStratum),
}

#[derive(Debug, Default)]
pub(crate) struct IncrementalController {
    keys: IndexMap<Option<String>, KeyPhase>,
    rows_in_batch: usize,
    batch_number: u64,
}

/// What a closed key leaves behind.
struct Closed {
    output: Option<Row>,
    stratum: Option<Stratum>,
}

impl IncrementalController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process_row(&mut self, ctx: &mut TrainingContext, row: &Row) -> TrainingResult<Vec<Row>> {
        let Some(key) = ctx.stratum_key(row) else {
            return Ok(Vec::new());
        };
        if !self.keys.contains_key(&key) {
            let phase = if ctx.builder.determinable_immediately() {
                KeyPhase::Training(start_training(ctx, key.clone(), &[])?)
            } else {
                KeyPhase::AwaitingSchema { cache: Vec::new() }
            };
            self.keys.insert(key.clone(), phase);
        }

        if let Some(phase) = self.keys.get_mut(&key) {
            match phase {
                KeyPhase::Training(live) => train_on_row(ctx, live, row)?,
                KeyPhase::AwaitingSchema { cache } => {
                    cache.push(row.clone());
                    if cache.len() >= ctx.header_sample_size {
                        let cached = std::mem::take(cache);
                        *phase = KeyPhase::Training(establish(ctx, key, &cached)?);
                    }
                }
            }
        }

        let mut output = Vec::new();
        if let RowHandling::Batch { size } = ctx.config.row_handling {
            self.rows_in_batch += 1;
            if self.rows_in_batch >= size {
                output = self.close_batch(ctx)?;
            }
        }
        Ok(output)
    }

    /// Batch boundary: emit for the current models and start over with fresh ones.
    fn close_batch(&mut self, ctx: &mut TrainingContext) -> TrainingResult<Vec<Row>> {
        self.batch_number += 1;
        self.rows_in_batch = 0;
        let batch = Some(self.batch_number);
        info!(batch = self.batch_number, "incremental batch complete, resetting model");
        let mut output = Vec::new();
        for (key, phase) in self.keys.drain(..) {
            if let Some(row) = close_key(ctx, key, phase, batch)?.output {
                output.push(row);
            }
        }
        Ok(output)
    }

    /// End of stream: emit for every open key and hand back the models for testing.
    pub fn finish(
        &mut self,
        ctx: &mut TrainingContext,
    ) -> TrainingResult<(Vec<Row>, IndexMap<Option<String>, Stratum>)> {
        let batch = (ctx.config.row_handling.is_batch() && !self.keys.is_empty())
            .then_some(self.batch_number + 1);
        let mut output = Vec::new();
        let mut strata = IndexMap::new();
        for (key, phase) in std::mem::take(&mut self.keys) {
            let closed = close_key(ctx, key, phase, batch)?;
            output.extend(closed.output);
            if let Some(stratum) = closed.stratum {
                strata.insert(stratum.key.clone(), stratum);
            }
        }
        self.rows_in_batch = 0;
        self.batch_number = 0;
        Ok((output, strata))
    }
}

fn start_training(
    ctx: &TrainingContext,
    key: Option<String>,
    sample: &[Row],
) -> TrainingResult<LiveStratum> {
    let schema = ctx.builder.build(&ctx.meta, sample)?;
    let model = ctx.learner.initialize(&schema)?;
    let evaluator = ctx.new_evaluator(&schema, None)?;
    debug!(stratum = ?key, "incremental model initialized");
    Ok(LiveStratum::new(Stratum { key, schema, model, evaluator }, &ctx.meta))
}

/// Determine the schema from cached rows, then replay them.
fn establish(ctx: &mut TrainingContext, key: Option<String>, cached: &[Row]) -> TrainingResult<LiveStratum> {
    let mut live = start_training(ctx, key, cached)?;
    for row in cached {
        train_on_row(ctx, &mut live, row)?;
    }
    Ok(live)
}

/// The one per-row path: test first when evaluating prequentially, then train.
fn train_on_row(ctx: &TrainingContext, live: &mut LiveStratum, row: &Row) -> TrainingResult<()> {
    let record = live.convert(row);
    let stratum = &mut live.stratum;
    if ctx.mode() == EvalMode::Prequential {
        stratum.evaluator.evaluate_incremental(stratum.model.as_ref(), &record)?;
    }
    stratum.model.update(&record)?;
    Ok(())
}

fn close_key(
    ctx: &mut TrainingContext,
    key: Option<String>,
    phase: KeyPhase,
    batch: Option<u64>,
) -> TrainingResult<Closed> {
    let label = describe_target(key.as_deref(), batch);
    let live = match phase {
        KeyPhase::Training(live) => live,
        KeyPhase::AwaitingSchema { cache } if cache.is_empty() => {
            return Ok(Closed { output: None, stratum: None });
        }
        KeyPhase::AwaitingSchema { cache } => {
            establish(ctx, key, &cache).map_err(|e| e.in_flush(label.clone()))?
        }
    };
    let Stratum { key, schema, model, evaluator } = live.stratum;
    ctx.save_model(model.as_ref(), &schema, None, key.as_deref(), batch)
        .map_err(|e| e.in_flush(label))?;

    let closed = match ctx.mode() {
        EvalMode::Prequential => Closed {
            output: evaluator
                .was_evaluation_performed()
                .then(|| evaluator.metric_row(key.as_deref(), batch)),
            stratum: None,
        },
        EvalMode::SeparateTestSet => {
            let evaluator = ctx.new_evaluator(&schema, None)?;
            Closed { output: None, stratum: Some(Stratum { key, schema, model, evaluator }) }
        }
        _ => Closed {
            output: Some(ctx.model_text_row(key.as_deref(), batch, model.describe())),
            stratum: None,
        },
    };
    Ok(closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldSpec, TrainingConfig};
    use crate::learners::NaiveBayes;
    use strata_abstraction::{FieldMeta, FieldType, RowMeta, Value};

    fn meta() -> RowMeta {
        RowMeta::new(vec![
            FieldMeta::new("sky", FieldType::String),
            FieldMeta::new("c", FieldType::String),
        ])
    }

    fn ctx(fields: Vec<FieldSpec>, row_handling: RowHandling, sample: &str) -> TrainingContext {
        let cfg = TrainingConfig {
            fields,
            row_handling,
            class_field: Some("c".to_string()),
            header_sample_size: sample.to_string(),
            ..TrainingConfig::default()
        };
        TrainingContext::new(cfg, meta(), Box::new(NaiveBayes::default())).unwrap()
    }

    fn row(sky: &str, c: &str) -> Row {
        vec![Value::from(sky), Value::from(c)]
    }

    fn declared() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("sky", "nominal").with_legal_values(["clear", "cloudy"]),
            FieldSpec::new("c", "nominal").with_legal_values(["yes", "no"]),
        ]
    }

    #[test]
    fn test_declared_schema_trains_from_first_row() {
        let mut ctx = ctx(declared(), RowHandling::All, "100");
        let mut c = IncrementalController::new();
        c.process_row(&mut ctx, &row("clear", "yes")).unwrap();
        assert!(matches!(c.keys.get(&None), Some(KeyPhase::Training(_))));
    }

    #[test]
    fn test_sampled_schema_waits_for_cache() {
        let fields = vec![FieldSpec::new("sky", "nominal"), FieldSpec::new("c", "nominal")];
        let mut ctx = ctx(fields, RowHandling::All, "2");
        let mut c = IncrementalController::new();
        c.process_row(&mut ctx, &row("clear", "yes")).unwrap();
        assert!(matches!(c.keys.get(&None), Some(KeyPhase::AwaitingSchema { .. })));
        c.process_row(&mut ctx, &row("cloudy", "no")).unwrap();
        let Some(KeyPhase::Training(live)) = c.keys.get(&None) else {
            panic!("schema should be established");
        };
        assert_eq!(live.stratum.schema.class_attribute().unwrap().labels(), ["no", "yes"]);
    }

    #[test]
    fn test_short_stream_establishes_schema_at_end() {
        let fields = vec![FieldSpec::new("sky", "nominal"), FieldSpec::new("c", "nominal")];
        let mut ctx = ctx(fields, RowHandling::All, "50");
        let mut c = IncrementalController::new();
        c.process_row(&mut ctx, &row("clear", "yes")).unwrap();
        let (out, strata) = c.finish(&mut ctx).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0][0].to_string().contains("Naive Bayes"));
        assert!(strata.is_empty());
    }

    #[test]
    fn test_batch_resets_model() {
        let mut ctx = ctx(declared(), RowHandling::Batch { size: 2 }, "100");
        let mut c = IncrementalController::new();
        assert!(c.process_row(&mut ctx, &row("clear", "yes")).unwrap().is_empty());
        let out = c.process_row(&mut ctx, &row("clear", "yes")).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0][0], Value::Integer(1));
        assert!(c.keys.is_empty());
        c.process_row(&mut ctx, &row("cloudy", "no")).unwrap();
        let (out, _) = c.finish(&mut ctx).unwrap();
        assert_eq!(out[0][0], Value::Integer(2));
    }
}
