//! Host-facing entry point for a training run.

use crate::config::TrainingConfig;
use crate::context::{Stratum, TrainingContext};
use crate::controller::{BatchController, ControllerState};
use crate::error::{RowWarning, TrainingError, TrainingResult};
use crate::incremental::IncrementalController;
use crate::persistence::SavedModel;
use crate::separate_test::SeparateTestDriver;
use indexmap::IndexMap;
use strata_abstraction::{EvalMode, Evaluator, Learner, Row, RowMeta};
use tracing::info;

#[derive(Debug)]
enum Driver {
    Batch(BatchController),
    Incremental(IncrementalController),
}

/// Drives one training run, row by row.
///
/// Feed training rows with [`TrainingRun::process_training_row`] and signal end of
/// stream with `None`. For separate test set evaluation, call
/// [`TrainingRun::begin_test_set`] afterwards and feed test rows the same way.
#[derive(Debug)]
pub struct TrainingRun {
    ctx: TrainingContext,
    driver: Driver,
    trained: IndexMap<Option<String>, Stratum>,
    test: Option<SeparateTestDriver>,
}

impl TrainingRun {
    pub fn new(
        config: TrainingConfig,
        meta: RowMeta,
        learner: Box<dyn Learner>,
    ) -> TrainingResult<Self> {
        let incremental = config.trains_incrementally(&learner.capabilities());
        let ctx = TrainingContext::new(config, meta, learner)?;
        let driver = if incremental {
            Driver::Incremental(IncrementalController::new())
        } else {
            Driver::Batch(BatchController::new(&ctx))
        };
        info!(
            learner = ctx.learner.name(),
            evaluation = %ctx.mode(),
            incremental,
            "training run configured"
        );
        Ok(Self { ctx, driver, trained: IndexMap::new(), test: None })
    }

    /// Replace the evaluator template. Its metric rows must follow [`Self::output_row_meta`].
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Box<dyn Evaluator>) -> Self {
        self.ctx.evaluator = evaluator;
        self
    }

    /// Columns of every row this run emits.
    pub fn output_row_meta(&self) -> RowMeta {
        self.ctx.layout.output_meta()
    }

    pub fn is_incremental(&self) -> bool {
        matches!(self.driver, Driver::Incremental(_))
    }

    /// State of the buffered controller. Incremental runs never buffer and report `Idle`.
    pub fn state(&self) -> ControllerState {
        match &self.driver {
            Driver::Batch(controller) => controller.state(),
            Driver::Incremental(_) => ControllerState::Idle,
        }
    }

    /// Process one training row, or end of stream when `row` is `None`.
    pub fn process_training_row(&mut self, row: Option<&Row>) -> TrainingResult<Vec<Row>> {
        match (row, &mut self.driver) {
            (Some(row), Driver::Batch(controller)) => controller.process_row(&mut self.ctx, row),
            (Some(row), Driver::Incremental(controller)) => {
                controller.process_row(&mut self.ctx, row)
            }
            (None, Driver::Batch(controller)) => {
                let output = controller.finish(&mut self.ctx)?;
                self.trained.extend(controller.take_trained());
                Ok(output)
            }
            (None, Driver::Incremental(controller)) => {
                let (output, strata) = controller.finish(&mut self.ctx)?;
                self.trained.extend(strata);
                Ok(output)
            }
        }
    }

    /// Start evaluating the trained models on test rows laid out as `test_meta`.
    pub fn begin_test_set(&mut self, test_meta: &RowMeta) -> TrainingResult<()> {
        if self.ctx.mode() != EvalMode::SeparateTestSet {
            return Err(TrainingError::InvalidConfig(format!(
                "test rows require separate test set evaluation, run uses {}",
                self.ctx.mode()
            )));
        }
        let strata = std::mem::take(&mut self.trained);
        self.test = Some(SeparateTestDriver::new(&self.ctx, strata, test_meta)?);
        Ok(())
    }

    /// Process one test row, or end of the test stream when `row` is `None`.
    pub fn process_test_row(&mut self, row: Option<&Row>) -> TrainingResult<Vec<Row>> {
        let Some(driver) = self.test.as_mut() else {
            return Err(TrainingError::InvalidConfig(
                "begin_test_set must be called before test rows".to_string(),
            ));
        };
        match row {
            Some(row) => driver.process_row(&mut self.ctx, row),
            None => driver.finish(),
        }
    }

    /// Models saved so far, with their checksums.
    pub fn saved_models(&self) -> &[SavedModel] {
        &self.ctx.saved
    }

    /// Recoverable conditions met since the last call.
    pub fn take_warnings(&mut self) -> Vec<RowWarning> {
        std::mem::take(&mut self.ctx.warnings)
    }
}
