//! Evaluation of trained strata against a separate stream of test rows.
//!
//! Models that predict one record at a time are evaluated as rows arrive. Batch
//! predictors get buffered rows, evaluated whenever the buffer reaches the model's
//! preferred batch size and at every stratum boundary.

use crate::context::{read_key, stratify_index, LiveStratum, Stratum, TrainingContext};
use crate::error::{RowWarning, TrainingError, TrainingResult};
use indexmap::IndexMap;
use std::collections::HashSet;
use strata_abstraction::{Row, RowMeta};
use tracing::{debug, info};

#[derive(Debug)]
struct OpenBatch {
    key: Option<String>,
    rows: Vec<Row>,
}

#[derive(Debug)]
pub(crate) struct SeparateTestDriver {
    strata: IndexMap<Option<String>, LiveStratum>,
    stratify_index: Option<usize>,
    open: Option<OpenBatch>,
    closed: HashSet<String>,
    emitted: HashSet<Option<String>>,
}

impl SeparateTestDriver {
    pub fn new(
        ctx: &TrainingContext,
        strata: IndexMap<Option<String>, Stratum>,
        test_meta: &RowMeta,
    ) -> TrainingResult<Self> {
        let stratify_index = stratify_index(&ctx.config, test_meta)?;
        info!(strata = strata.len(), "starting separate test set evaluation");
        let strata = strata
            .into_iter()
            .map(|(key, stratum)| (key, LiveStratum::new(stratum, test_meta)))
            .collect();
        Ok(Self {
            strata,
            stratify_index,
            open: None,
            closed: HashSet::new(),
            emitted: HashSet::new(),
        })
    }

    pub fn process_row(&mut self, ctx: &mut TrainingContext, row: &Row) -> TrainingResult<Vec<Row>> {
        let field = ctx.config.row_handling.stratification_field().unwrap_or_default();
        let key = match read_key(self.stratify_index, field, row) {
            Ok(key) => key,
            Err(warning) => {
                ctx.warn(warning);
                return Ok(Vec::new());
            }
        };
        let Some(live) = self.strata.get_mut(&key) else {
            ctx.warn(RowWarning::NoTrainedModel { stratum: key });
            return Ok(Vec::new());
        };

        let capabilities = live.stratum.model.capabilities();
        if !capabilities.batch_predictor {
            let record = live.convert(row);
            live.stratum.evaluator.evaluate_incremental(live.stratum.model.as_ref(), &record)?;
            return Ok(Vec::new());
        }

        let mut output = Vec::new();
        if self.open.as_ref().is_some_and(|open| open.key != key) {
            if let Some(k) = key.as_ref().filter(|k| self.closed.contains(*k)) {
                return Err(TrainingError::RepeatedStratificationValue(k.clone()));
            }
            output.extend(self.close_open()?);
        }
        let open = self.open.get_or_insert_with(|| OpenBatch { key, rows: Vec::new() });
        open.rows.push(row.clone());
        if capabilities.preferred_batch_size.is_some_and(|n| open.rows.len() >= n) {
            let rows = std::mem::take(&mut open.rows);
            let key = open.key.clone();
            self.evaluate_rows(&key, &rows)?;
        }
        Ok(output)
    }

    fn evaluate_rows(&mut self, key: &Option<String>, rows: &[Row]) -> TrainingResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let Some(live) = self.strata.get_mut(key) else {
            return Ok(());
        };
        let data = live.dataset(rows);
        debug!(stratum = ?key, rows = rows.len(), "evaluating test batch");
        live.stratum.evaluator.evaluate_batch(live.stratum.model.as_ref(), &data)?;
        Ok(())
    }

    /// Evaluate what is buffered for the open stratum and emit its metric row.
    fn close_open(&mut self) -> TrainingResult<Option<Row>> {
        let Some(OpenBatch { key, rows }) = self.open.take() else {
            return Ok(None);
        };
        self.evaluate_rows(&key, &rows)?;
        if let Some(k) = &key {
            self.closed.insert(k.clone());
        }
        Ok(self.emit(&key))
    }

    fn emit(&mut self, key: &Option<String>) -> Option<Row> {
        let live = self.strata.get(key)?;
        if !live.stratum.evaluator.was_evaluation_performed() || self.emitted.contains(key) {
            return None;
        }
        self.emitted.insert(key.clone());
        Some(live.stratum.evaluator.metric_row(key.as_deref(), None))
    }

    /// End of the test stream: one metric row per evaluated stratum not yet reported.
    pub fn finish(&mut self) -> TrainingResult<Vec<Row>> {
        let mut output: Vec<Row> = self.close_open()?.into_iter().collect();
        let keys: Vec<Option<String>> = self.strata.keys().cloned().collect();
        for key in keys {
            output.extend(self.emit(&key));
        }
        self.closed.clear();
        Ok(output)
    }
}
