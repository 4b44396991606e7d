//! Standard evaluator: cross-validation, percentage split, prequential and
//! separate-test-set evaluation over [`EvalStats`].

use crate::config::{FieldSpec, TrainingConfig};
use crate::metrics::EvalStats;
use crate::output::MetricLayout;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use strata_abstraction::{
    Dataset, EvalMode, Evaluator, Learner, Model, ModelError, ModelResult, Priors, Record, Schema,
    Value,
};
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorSettings {
    pub folds: usize,
    pub percentage_split: f64,
    pub seed: u64,
    pub layout: MetricLayout,
}

impl EvaluatorSettings {
    pub fn from_config(config: &TrainingConfig, class_spec: Option<&FieldSpec>) -> Self {
        Self {
            folds: config.folds,
            percentage_split: config.percentage_split,
            seed: config.seed,
            layout: MetricLayout::for_config(config, class_spec),
        }
    }
}

#[derive(Debug)]
pub struct StandardEvaluator {
    settings: EvaluatorSettings,
    scheme_name: String,
    scheme_options: String,
    schema: Option<Schema>,
    stats: Option<EvalStats>,
    performed: bool,
}

impl StandardEvaluator {
    pub fn new(settings: EvaluatorSettings) -> Self {
        Self {
            settings,
            scheme_name: String::new(),
            scheme_options: String::new(),
            schema: None,
            stats: None,
            performed: false,
        }
    }

    fn bound(&mut self) -> ModelResult<(&Schema, &mut EvalStats)> {
        match (&self.schema, &mut self.stats) {
            (Some(schema), Some(stats)) => Ok((schema, stats)),
            _ => Err(ModelError::Evaluation("evaluator used before initialize".to_string())),
        }
    }

    fn shuffled_indices(&self, n: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.settings.seed);
        indices.shuffle(&mut rng);
        indices
    }

    fn cross_validate(&mut self, learner: &dyn Learner, data: &Dataset) -> ModelResult<()> {
        let folds = self.settings.folds.min(data.len());
        if folds < 2 {
            return Err(ModelError::Evaluation(format!(
                "cross-validation needs at least 2 instances, got {}",
                data.len()
            )));
        }
        let mut order = self.shuffled_indices(data.len());
        let schema = data.schema();
        if schema.class_is_nominal() {
            // Group by class so that round-robin fold assignment stratifies.
            order.sort_by(|&a, &b| {
                let ca = data.records()[a].class_value(schema).unwrap_or(f64::INFINITY);
                let cb = data.records()[b].class_value(schema).unwrap_or(f64::INFINITY);
                ca.total_cmp(&cb)
            });
        }
        for fold in 0..folds {
            let (test, train): (Vec<(usize, usize)>, Vec<(usize, usize)>) =
                order.iter().copied().enumerate().partition(|(pos, _)| pos % folds == fold);
            let train: Vec<usize> = train.into_iter().map(|(_, i)| i).collect();
            let test: Vec<usize> = test.into_iter().map(|(_, i)| i).collect();
            debug!(fold, train = train.len(), test = test.len(), "cross-validation fold");
            let model = learner.fit(&data.subset(&train))?;
            self.evaluate_batch(model.as_ref(), &data.subset(&test))?;
        }
        Ok(())
    }

    fn percentage_split(&mut self, learner: &dyn Learner, data: &Dataset) -> ModelResult<()> {
        let order = self.shuffled_indices(data.len());
        let train_size =
            ((data.len() as f64) * self.settings.percentage_split / 100.0).round() as usize;
        if train_size == 0 {
            return Err(ModelError::Evaluation(format!(
                "percentage split of {} instances leaves no training data",
                data.len()
            )));
        }
        let (train, test) = order.split_at(train_size.min(order.len()));
        if test.is_empty() {
            debug!("percentage split leaves no test data; nothing evaluated");
            return Ok(());
        }
        let model = learner.fit(&data.subset(train))?;
        self.evaluate_batch(model.as_ref(), &data.subset(test))
    }

    fn tags(&self, stratum: Option<&str>, batch: Option<u64>) -> Vec<Value> {
        let mut row = Vec::new();
        if self.settings.layout.stratified {
            row.push(stratum.map_or(Value::Null, Value::from));
        }
        if self.settings.layout.batched {
            row.push(batch.map_or(Value::Null, |b| Value::Integer(b as i64)));
        }
        row
    }
}

fn metric(v: f64) -> Value {
    if v.is_finite() { Value::Number(v) } else { Value::Null }
}

fn masked(record: &Record, class_index: usize) -> Record {
    let mut copy = record.clone();
    copy.set_missing(class_index);
    copy
}

impl Evaluator for StandardEvaluator {
    fn spawn(&self) -> Box<dyn Evaluator> {
        Box::new(Self::new(self.settings.clone()))
    }

    fn mode(&self) -> EvalMode {
        self.settings.layout.mode
    }

    fn initialize(
        &mut self,
        schema: &Schema,
        template: &dyn Learner,
        priors: Option<&Priors>,
    ) -> ModelResult<()> {
        if !schema.is_supervised() {
            return Err(ModelError::Evaluation("evaluation requires a class attribute".to_string()));
        }
        let mut stats = EvalStats::new(schema, !self.settings.layout.ranking_labels.is_empty());
        if let Some(priors) = priors {
            stats.set_priors(priors);
        }
        self.scheme_name = template.name().to_string();
        self.scheme_options = template.options();
        self.schema = Some(schema.clone());
        self.stats = Some(stats);
        self.performed = false;
        Ok(())
    }

    fn evaluate_protocol(&mut self, learner: &dyn Learner, data: &Dataset) -> ModelResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        match self.mode() {
            EvalMode::CrossValidation | EvalMode::PercentageSplit => {
                if let Some(priors) = Priors::from_dataset(data) {
                    self.bound()?.1.set_priors(&priors);
                }
            }
            _ => return Ok(()),
        }
        if self.mode() == EvalMode::CrossValidation {
            self.cross_validate(learner, data)
        } else {
            self.percentage_split(learner, data)
        }
    }

    fn evaluate_batch(&mut self, model: &dyn Model, data: &Dataset) -> ModelResult<()> {
        let (schema, _) = self.bound()?;
        let class_index = schema
            .class_index()
            .ok_or_else(|| ModelError::Evaluation("no class attribute".to_string()))?;
        let labelled: Vec<&Record> =
            data.records().iter().filter(|r| !r.is_missing(class_index)).collect();
        if labelled.is_empty() {
            return Ok(());
        }
        let inputs: Vec<Record> = labelled.iter().map(|r| masked(r, class_index)).collect();
        let distributions = if model.capabilities().batch_predictor {
            model.distributions(&inputs)?
        } else {
            inputs.iter().map(|r| model.distribution(r)).collect::<ModelResult<Vec<_>>>()?
        };
        let (_, stats) = self.bound()?;
        for (record, dist) in labelled.iter().zip(&distributions) {
            stats.record(record.value(class_index), dist, record.weight);
        }
        trace!(instances = labelled.len(), "evaluated batch");
        self.performed = true;
        Ok(())
    }

    fn evaluate_incremental(&mut self, model: &dyn Model, record: &Record) -> ModelResult<()> {
        let prequential = self.mode() == EvalMode::Prequential;
        let (schema, _) = self.bound()?;
        let Some(class_index) = schema.class_index() else {
            return Ok(());
        };
        if record.is_missing(class_index) {
            return Ok(());
        }
        let actual = record.value(class_index);
        let dist = model.distribution(&masked(record, class_index))?;
        let (_, stats) = self.bound()?;
        stats.record(actual, &dist, record.weight);
        if prequential {
            stats.update_prior(actual, record.weight);
        }
        self.performed = true;
        Ok(())
    }

    fn was_evaluation_performed(&self) -> bool {
        self.performed
    }

    fn metric_row(&self, stratum: Option<&str>, batch: Option<u64>) -> Vec<Value> {
        let layout = &self.settings.layout;
        let mut row = vec![
            Value::from(self.scheme_name.as_str()),
            Value::from(self.scheme_options.as_str()),
            Value::from(self.mode().label()),
        ];
        row.extend(self.tags(stratum, batch));
        let Some(stats) = &self.stats else {
            return row;
        };

        row.push(metric(stats.unclassified()));
        if layout.nominal_class {
            row.push(metric(stats.correct()));
            row.push(metric(stats.incorrect()));
            row.push(metric(stats.percent_correct()));
            row.push(metric(stats.percent_incorrect()));
        }
        row.push(metric(stats.mean_absolute_error()));
        row.push(metric(stats.root_mean_squared_error()));
        if !layout.nominal_class {
            row.push(metric(stats.correlation()));
        }
        if layout.reports_relative_errors() {
            row.push(metric(stats.relative_absolute_error()));
            row.push(metric(stats.root_relative_squared_error()));
        }
        row.push(metric(stats.total()));
        if layout.nominal_class {
            row.push(metric(stats.kappa()));
            let class = self.schema.as_ref().and_then(Schema::class_attribute);
            let index_of = |label: &str| class.and_then(|c| c.index_of_value(label));
            for label in &layout.ir_labels {
                match index_of(label) {
                    Some(k) => row.extend(
                        [
                            stats.true_positive_rate(k),
                            stats.false_positive_rate(k),
                            stats.precision(k),
                            stats.recall(k),
                            stats.f_measure(k),
                            stats.matthews_correlation(k),
                        ]
                        .map(metric),
                    ),
                    None => row.extend(std::iter::repeat_n(Value::Null, 6)),
                }
            }
            for label in &layout.ranking_labels {
                match index_of(label) {
                    Some(k) => row.extend(
                        [stats.area_under_roc(k), stats.area_under_prc(k)].map(metric),
                    ),
                    None => row.extend(std::iter::repeat_n(Value::Null, 2)),
                }
            }
            row.push(Value::String(stats.confusion_matrix_text()));
        }
        row
    }
}
