//! Accumulated prediction statistics.

use std::fmt::Write as _;
use strata_abstraction::{arg_max, Priors, Schema};

#[derive(Debug, Clone)]
enum PriorEstimate {
    /// Laplace-started class counts.
    Nominal(Vec<f64>),
    Numeric { sum: f64, weight: f64 },
}

impl PriorEstimate {
    fn distribution(&self) -> Vec<f64> {
        match self {
            Self::Nominal(counts) => {
                let total: f64 = counts.iter().sum();
                counts.iter().map(|c| c / total).collect()
            }
            Self::Numeric { sum, weight } => {
                vec![if *weight > 0.0 { sum / weight } else { f64::NAN }]
            }
        }
    }
}

/// Running comparison of predictions against actual class values.
///
/// Every statistic is a running sum except AUC/PRC, which need each (actual,
/// distribution) pair. Those pairs are stored only when ranking metrics are requested,
/// and then memory grows with the number of evaluated records, also over a whole
/// prequential stream.
#[derive(Debug, Clone)]
pub struct EvalStats {
    labels: Vec<String>,
    confusion: Vec<Vec<f64>>,
    with_class: f64,
    unclassified: f64,
    abs_err: f64,
    sq_err: f64,
    prior_abs_err: f64,
    prior_sq_err: f64,
    sum_actual: f64,
    sum_pred: f64,
    sum_actual_sq: f64,
    sum_pred_sq: f64,
    sum_actual_pred: f64,
    prior: PriorEstimate,
    /// (actual class, distribution) pairs kept for ranking metrics.
    predictions: Option<Vec<(usize, Vec<f64>)>>,
}

impl EvalStats {
    pub fn new(schema: &Schema, keep_predictions: bool) -> Self {
        let nominal = schema.class_is_nominal();
        let labels = if nominal {
            schema.class_attribute().map(|a| a.labels().to_vec()).unwrap_or_default()
        } else {
            Vec::new()
        };
        let k = labels.len();
        Self {
            confusion: vec![vec![0.0; k]; k],
            prior: if nominal {
                PriorEstimate::Nominal(vec![1.0; k])
            } else {
                PriorEstimate::Numeric { sum: 0.0, weight: 0.0 }
            },
            labels,
            with_class: 0.0,
            unclassified: 0.0,
            abs_err: 0.0,
            sq_err: 0.0,
            prior_abs_err: 0.0,
            prior_sq_err: 0.0,
            sum_actual: 0.0,
            sum_pred: 0.0,
            sum_actual_sq: 0.0,
            sum_pred_sq: 0.0,
            sum_actual_pred: 0.0,
            predictions: (nominal && keep_predictions).then(Vec::new),
        }
    }

    pub fn is_nominal(&self) -> bool {
        !self.labels.is_empty()
    }

    /// Replace the prior estimate with training-set statistics.
    pub fn set_priors(&mut self, priors: &Priors) {
        self.prior = match &self.prior {
            PriorEstimate::Nominal(counts) => {
                let mut fresh = vec![1.0; counts.len()];
                for (slot, c) in fresh.iter_mut().zip(&priors.class_counts) {
                    *slot += c;
                }
                PriorEstimate::Nominal(fresh)
            }
            PriorEstimate::Numeric { .. } => {
                PriorEstimate::Numeric { sum: priors.sum, weight: priors.weight }
            }
        };
    }

    /// Fold one more observed class value into the prior estimate.
    pub fn update_prior(&mut self, actual: f64, weight: f64) {
        match &mut self.prior {
            PriorEstimate::Nominal(counts) => {
                if let Some(slot) = counts.get_mut(actual as usize) {
                    *slot += weight;
                }
            }
            PriorEstimate::Numeric { sum, weight: w } => {
                *sum += actual * weight;
                *w += weight;
            }
        }
    }

    pub fn record(&mut self, actual: f64, distribution: &[f64], weight: f64) {
        self.with_class += weight;
        if self.is_nominal() {
            self.record_nominal(actual as usize, distribution, weight);
        } else {
            self.record_numeric(actual, distribution.first().copied().unwrap_or(f64::NAN), weight);
        }
    }

    fn record_nominal(&mut self, actual: usize, distribution: &[f64], weight: f64) {
        let Some(predicted) = arg_max(distribution) else {
            self.unclassified += weight;
            return;
        };
        let prior = self.prior.distribution();
        for k in 0..self.labels.len() {
            let target = if k == actual { 1.0 } else { 0.0 };
            let p = distribution.get(k).copied().unwrap_or(0.0);
            let q = prior.get(k).copied().unwrap_or(0.0);
            self.abs_err += (p - target).abs() * weight;
            self.sq_err += (p - target).powi(2) * weight;
            self.prior_abs_err += (q - target).abs() * weight;
            self.prior_sq_err += (q - target).powi(2) * weight;
        }
        if let Some(cell) = self.confusion.get_mut(actual).and_then(|row| row.get_mut(predicted)) {
            *cell += weight;
        }
        if let Some(store) = self.predictions.as_mut() {
            store.push((actual, distribution.to_vec()));
        }
    }

    fn record_numeric(&mut self, actual: f64, predicted: f64, weight: f64) {
        if predicted.is_nan() {
            self.unclassified += weight;
            return;
        }
        let err = predicted - actual;
        self.abs_err += err.abs() * weight;
        self.sq_err += err * err * weight;
        let prior = self.prior.distribution()[0];
        if !prior.is_nan() {
            self.prior_abs_err += (prior - actual).abs() * weight;
            self.prior_sq_err += (prior - actual).powi(2) * weight;
        }
        self.sum_actual += actual * weight;
        self.sum_pred += predicted * weight;
        self.sum_actual_sq += actual * actual * weight;
        self.sum_pred_sq += predicted * predicted * weight;
        self.sum_actual_pred += actual * predicted * weight;
    }

    pub fn total(&self) -> f64 {
        self.with_class
    }

    pub fn unclassified(&self) -> f64 {
        self.unclassified
    }

    fn classified(&self) -> f64 {
        self.with_class - self.unclassified
    }

    pub fn correct(&self) -> f64 {
        (0..self.labels.len()).map(|k| self.confusion[k][k]).sum()
    }

    pub fn incorrect(&self) -> f64 {
        self.classified() - self.correct()
    }

    pub fn percent_correct(&self) -> f64 {
        ratio(self.correct(), self.with_class) * 100.0
    }

    pub fn percent_incorrect(&self) -> f64 {
        ratio(self.incorrect(), self.with_class) * 100.0
    }

    fn error_width(&self) -> f64 {
        if self.is_nominal() { self.labels.len() as f64 } else { 1.0 }
    }

    pub fn mean_absolute_error(&self) -> f64 {
        ratio(self.abs_err, self.classified() * self.error_width())
    }

    pub fn root_mean_squared_error(&self) -> f64 {
        ratio(self.sq_err, self.classified() * self.error_width()).sqrt()
    }

    pub fn relative_absolute_error(&self) -> f64 {
        ratio(self.abs_err, self.prior_abs_err) * 100.0
    }

    pub fn root_relative_squared_error(&self) -> f64 {
        ratio(self.sq_err, self.prior_sq_err).sqrt() * 100.0
    }

    pub fn correlation(&self) -> f64 {
        let n = self.classified();
        if n <= 0.0 {
            return f64::NAN;
        }
        let cov = self.sum_actual_pred / n - (self.sum_actual / n) * (self.sum_pred / n);
        let var_a = self.sum_actual_sq / n - (self.sum_actual / n).powi(2);
        let var_p = self.sum_pred_sq / n - (self.sum_pred / n).powi(2);
        if var_a <= 0.0 || var_p <= 0.0 {
            return 0.0;
        }
        cov / (var_a * var_p).sqrt()
    }

    pub fn kappa(&self) -> f64 {
        let total: f64 = self.confusion.iter().flatten().sum();
        if total <= 0.0 {
            return f64::NAN;
        }
        let k = self.labels.len();
        let observed = self.correct() / total;
        let expected: f64 = (0..k)
            .map(|i| {
                let row: f64 = self.confusion[i].iter().sum();
                let col: f64 = (0..k).map(|r| self.confusion[r][i]).sum();
                row * col
            })
            .sum::<f64>()
            / (total * total);
        if (1.0 - expected).abs() < f64::EPSILON {
            return if (observed - 1.0).abs() < f64::EPSILON { 1.0 } else { 0.0 };
        }
        (observed - expected) / (1.0 - expected)
    }

    fn label_counts(&self, class: usize) -> (f64, f64, f64, f64) {
        let k = self.labels.len();
        let total: f64 = self.confusion.iter().flatten().sum();
        let tp = self.confusion[class][class];
        let fn_ = self.confusion[class].iter().sum::<f64>() - tp;
        let fp = (0..k).map(|r| self.confusion[r][class]).sum::<f64>() - tp;
        let tn = total - tp - fn_ - fp;
        (tp, fp, tn, fn_)
    }

    pub fn true_positive_rate(&self, class: usize) -> f64 {
        let (tp, _, _, fn_) = self.label_counts(class);
        ratio(tp, tp + fn_)
    }

    pub fn false_positive_rate(&self, class: usize) -> f64 {
        let (_, fp, tn, _) = self.label_counts(class);
        ratio(fp, fp + tn)
    }

    pub fn precision(&self, class: usize) -> f64 {
        let (tp, fp, _, _) = self.label_counts(class);
        ratio(tp, tp + fp)
    }

    pub fn recall(&self, class: usize) -> f64 {
        self.true_positive_rate(class)
    }

    pub fn f_measure(&self, class: usize) -> f64 {
        let p = self.precision(class);
        let r = self.recall(class);
        ratio(2.0 * p * r, p + r)
    }

    pub fn matthews_correlation(&self, class: usize) -> f64 {
        let (tp, fp, tn, fn_) = self.label_counts(class);
        let denom = ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();
        ratio(tp * tn - fp * fn_, denom)
    }

    /// Scores for one label, paired with whether the instance carries that label.
    fn ranked(&self, class: usize) -> Vec<(f64, bool)> {
        self.predictions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|(actual, dist)| (dist.get(class).copied().unwrap_or(0.0), *actual == class))
            .collect()
    }

    /// Area under the ROC curve via the Mann-Whitney statistic, ties ranked by average.
    pub fn area_under_roc(&self, class: usize) -> f64 {
        let mut scored = self.ranked(class);
        let positives = scored.iter().filter(|(_, p)| *p).count() as f64;
        let negatives = scored.len() as f64 - positives;
        if positives == 0.0 || negatives == 0.0 {
            return f64::NAN;
        }
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut rank_sum = 0.0;
        let mut i = 0;
        while i < scored.len() {
            let mut j = i;
            while j + 1 < scored.len() && scored[j + 1].0 == scored[i].0 {
                j += 1;
            }
            let avg_rank = (i + j) as f64 / 2.0 + 1.0;
            rank_sum += scored[i..=j].iter().filter(|(_, p)| *p).count() as f64 * avg_rank;
            i = j + 1;
        }
        (rank_sum - positives * (positives + 1.0) / 2.0) / (positives * negatives)
    }

    /// Area under the precision-recall curve, as average precision.
    pub fn area_under_prc(&self, class: usize) -> f64 {
        let mut scored = self.ranked(class);
        let positives = scored.iter().filter(|(_, p)| *p).count() as f64;
        if positives == 0.0 {
            return f64::NAN;
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        let mut hits = 0.0;
        let mut sum = 0.0;
        for (rank, (_, positive)) in scored.iter().enumerate() {
            if *positive {
                hits += 1.0;
                sum += hits / (rank as f64 + 1.0);
            }
        }
        sum / positives
    }

    /// Text rendering of the confusion matrix.
    pub fn confusion_matrix_text(&self) -> String {
        let names: Vec<String> = (0..self.labels.len()).map(column_name).collect();
        let width = self
            .confusion
            .iter()
            .flatten()
            .map(|v| format_count(*v).len())
            .chain(names.iter().map(String::len))
            .max()
            .unwrap_or(1)
            + 1;
        let mut out = String::new();
        for name in &names {
            let _ = write!(out, "{name:>width$}");
        }
        out.push_str("   <-- classified as\n");
        for (i, row) in self.confusion.iter().enumerate() {
            for v in row {
                let _ = write!(out, "{:>width$}", format_count(*v));
            }
            let _ = writeln!(out, " | {:>width$} = {}", names[i], self.labels[i]);
        }
        out
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { f64::NAN }
}

fn column_name(i: usize) -> String {
    if i < 26 { char::from(b'a' + i as u8).to_string() } else { format!("c{i}") }
}

fn format_count(v: f64) -> String {
    if v.fract() == 0.0 { format!("{}", v as i64) } else { format!("{v:.2}") }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_abstraction::Attribute;

    fn nominal_schema() -> Schema {
        Schema::new("m", vec![Attribute::nominal("c", ["yes", "no"])], Some(0)).unwrap()
    }

    fn numeric_schema() -> Schema {
        Schema::new("m", vec![Attribute::numeric("y")], Some(0)).unwrap()
    }

    #[test]
    fn test_confusion_counts() {
        let mut s = EvalStats::new(&nominal_schema(), false);
        s.record(0.0, &[0.9, 0.1], 1.0);
        s.record(0.0, &[0.2, 0.8], 1.0);
        s.record(1.0, &[0.3, 0.7], 1.0);
        s.record(1.0, &[0.0, 0.0], 1.0);
        assert_eq!(s.total(), 4.0);
        assert_eq!(s.unclassified(), 1.0);
        assert_eq!(s.correct(), 2.0);
        assert_eq!(s.incorrect(), 1.0);
        assert_eq!(s.percent_correct(), 50.0);
        assert_eq!(s.true_positive_rate(0), 0.5);
        assert_eq!(s.precision(1), 0.5);
        let text = s.confusion_matrix_text();
        assert!(text.contains("<-- classified as"));
        assert!(text.contains("a = yes"));
    }

    #[test]
    fn test_perfect_kappa() {
        let mut s = EvalStats::new(&nominal_schema(), false);
        s.record(0.0, &[1.0, 0.0], 1.0);
        s.record(1.0, &[0.0, 1.0], 1.0);
        assert!((s.kappa() - 1.0).abs() < 1e-12);
        assert_eq!(s.mean_absolute_error(), 0.0);
        assert!((s.matthews_correlation(0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_auc_and_prc() {
        let mut s = EvalStats::new(&nominal_schema(), true);
        s.record(0.0, &[0.9, 0.1], 1.0);
        s.record(0.0, &[0.8, 0.2], 1.0);
        s.record(1.0, &[0.3, 0.7], 1.0);
        s.record(1.0, &[0.1, 0.9], 1.0);
        assert_eq!(s.area_under_roc(0), 1.0);
        assert_eq!(s.area_under_prc(0), 1.0);

        let mut tied = EvalStats::new(&nominal_schema(), true);
        tied.record(0.0, &[0.5, 0.5], 1.0);
        tied.record(1.0, &[0.5, 0.5], 1.0);
        assert_eq!(tied.area_under_roc(0), 0.5);
    }

    #[test]
    fn test_auc_undefined_without_both_labels() {
        let mut s = EvalStats::new(&nominal_schema(), true);
        s.record(0.0, &[0.9, 0.1], 1.0);
        assert!(s.area_under_roc(0).is_nan());
        let no_store = EvalStats::new(&nominal_schema(), false);
        assert!(no_store.area_under_roc(0).is_nan());
    }

    #[test]
    fn test_predictions_stored_only_for_ranking_metrics() {
        let mut plain = EvalStats::new(&nominal_schema(), false);
        let mut ranked = EvalStats::new(&nominal_schema(), true);
        for _ in 0..50 {
            plain.record(0.0, &[0.9, 0.1], 1.0);
            ranked.record(0.0, &[0.9, 0.1], 1.0);
        }
        assert!(plain.predictions.is_none());
        assert_eq!(ranked.predictions.as_ref().map(Vec::len), Some(50));
    }

    #[test]
    fn test_numeric_errors_and_correlation() {
        let mut s = EvalStats::new(&numeric_schema(), false);
        s.set_priors(&Priors { sum: 4.0, weight: 2.0, ..Priors::default() });
        s.record(1.0, &[1.5], 1.0);
        s.record(3.0, &[2.5], 1.0);
        s.record(5.0, &[f64::NAN], 1.0);
        assert_eq!(s.unclassified(), 1.0);
        assert_eq!(s.mean_absolute_error(), 0.5);
        assert_eq!(s.relative_absolute_error(), 50.0);
        assert!((s.correlation() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_prior_updates_shift_relative_error() {
        let mut s = EvalStats::new(&numeric_schema(), false);
        s.record(2.0, &[2.0], 1.0);
        assert!(s.relative_absolute_error().is_nan());
        s.update_prior(2.0, 1.0);
        s.record(4.0, &[3.0], 1.0);
        assert_eq!(s.relative_absolute_error(), 50.0);
    }
}
