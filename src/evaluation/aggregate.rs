use std::collections::BTreeMap;

use log::{debug, info};
use ndarray::Array2;

use crate::{
    EvalErr, Result,
    arch::{Model, loss::LossFn},
    inference::InferenceScope,
    metrics::{ScoreFn, Scorer},
};

/// The name the loss is averaged and logged under.
pub const LOSS_KEY: &str = "loss";

/// Averaged metrics keyed by their decorated names.
pub type Logs = BTreeMap<String, f32>;

/// How metric names are decorated in the returned logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogKeys {
    prefix: String,
    suffix: String,
}

impl LogKeys {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn key(&self, name: &str) -> String {
        format!("{}{name}{}", self.prefix, self.suffix)
    }
}

impl Default for LogKeys {
    fn default() -> Self {
        Self::new("val_", "")
    }
}

/// Evaluates a model over a data source, averaging the loss and metrics over every sample seen.
///
/// The model runs inside an [`InferenceScope`] for the whole pass, so its mode and gradient
/// tracking are restored when this returns, whether it succeeds or not.
///
/// Each batch contributes `value * batch_size` to its metric's total, and totals are divided by
/// the amount of samples at the end. Metrics therefore have to be averageable per sample.
///
/// # Arguments
/// * `model` - The model to evaluate.
/// * `batches` - The data source.
/// * `prepare_batch` - Turns a batch into its `(x, y)` pair.
/// * `metrics` - The metrics to compute.
/// * `loss_fn` - An optional loss function, averaged under [`LOSS_KEY`].
/// * `keys` - How the names are decorated in the returned logs.
///
/// # Returns
/// The per-sample averages. The loss is only present when `loss_fn` is given.
///
/// # Errors
/// * `EvalErr::UnknownMetric` - a named metric is not registered (checked before any batch).
/// * `EvalErr::InvalidConfig` - a metric is named like the loss, or two metrics share a name.
/// * `EvalErr::EmptyDataset` - the data source yielded no samples.
/// * `EvalErr::ShapeMismatch` - predictions and targets don't line up. Target columns are only
///   checked when a loss or a named metric has to read them.
pub fn evaluate<M, I, P>(
    model: &mut M,
    batches: I,
    mut prepare_batch: P,
    metrics: &[Scorer],
    loss_fn: Option<&dyn LossFn>,
    keys: &LogKeys,
) -> Result<Logs>
where
    M: Model + ?Sized,
    I: IntoIterator,
    P: FnMut(I::Item) -> Result<(Array2<f32>, Array2<f32>)>,
{
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    if loss_fn.is_some() {
        totals.insert(LOSS_KEY, 0.);
    }

    let mut scorers: Vec<(&str, &ScoreFn)> = Vec::with_capacity(metrics.len());
    for metric in metrics {
        let name = metric.name();
        if name == LOSS_KEY {
            return Err(EvalErr::InvalidConfig(format!(
                "`{LOSS_KEY}` is reserved for the loss function"
            )));
        }

        if totals.insert(name, 0.).is_some() {
            return Err(EvalErr::InvalidConfig(format!(
                "metric `{name}` is given more than once"
            )));
        }

        scorers.push((name, metric.resolve()?));
    }

    // Custom scorers accept any target layout, the loss and named metrics don't.
    let check_targets =
        loss_fn.is_some() || metrics.iter().any(|m| matches!(m, Scorer::Named(_)));

    let mut seen = 0;
    let mut nbatches = 0;
    let mut model = InferenceScope::new(model);

    for batch in batches {
        let (x, y) = prepare_batch(batch)?;
        let y_pred = model.forward(x.view())?;

        if y_pred.nrows() != y.nrows() {
            return Err(EvalErr::ShapeMismatch {
                what: "prediction rows",
                got: y_pred.nrows(),
                expected: y.nrows(),
            });
        }

        if check_targets && y.ncols() != 1 && y.ncols() != y_pred.ncols() {
            return Err(EvalErr::ShapeMismatch {
                what: "target columns",
                got: y.ncols(),
                expected: y_pred.ncols(),
            });
        }

        let batch_size = x.nrows();
        seen += batch_size;
        nbatches += 1;

        if let Some(loss_fn) = loss_fn {
            let loss = loss_fn.loss(y_pred.view(), y.view());
            *totals.entry(LOSS_KEY).or_default() += f64::from(loss) * batch_size as f64;
        }

        for &(name, score) in &scorers {
            let value = score(y.view(), y_pred.view());
            *totals.entry(name).or_default() += f64::from(value) * batch_size as f64;
        }

        debug!(batch = nbatches, samples = batch_size; "evaluated batch");
    }

    drop(model);

    if seen == 0 {
        return Err(EvalErr::EmptyDataset);
    }

    let logs: Logs = totals
        .into_iter()
        .map(|(name, total)| (keys.key(name), (total / seen as f64) as f32))
        .collect();

    info!("evaluated {seen} samples in {nbatches} batches: {logs:?}");
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::arch::{Mode, Sequential, layers::Layer, loss::Mse};

    fn identity() -> Sequential {
        Sequential::new([Layer::dense((1, 1), None)], vec![1., 0.]).unwrap()
    }

    fn batches() -> Vec<(Array2<f32>, Array2<f32>)> {
        vec![
            (array![[1.], [2.], [3.]], array![[1.], [2.], [5.]]),
            (array![[4.]], array![[4.]]),
        ]
    }

    #[test]
    fn weights_batches_by_size() {
        let mut model = identity();
        let logs = evaluate(
            &mut model,
            batches(),
            Ok,
            &[Scorer::named("mean_absolute_error")],
            Some(&Mse),
            &LogKeys::default(),
        )
        .unwrap();

        // the per-batch means are 2/3 and 0, weighted 3:1
        assert!((logs["val_mean_absolute_error"] - 0.5).abs() < 1e-6);
        assert!((logs["val_loss"] - 1.).abs() < 1e-6);
    }

    #[test]
    fn loss_is_omitted_without_a_loss_function() {
        let mut model = identity();
        let logs = evaluate(
            &mut model,
            batches(),
            Ok,
            &[Scorer::named("mean_squared_error")],
            None,
            &LogKeys::new("test_", "_epoch"),
        )
        .unwrap();

        assert_eq!(
            logs.keys().collect::<Vec<_>>(),
            vec!["test_mean_squared_error_epoch"]
        );
    }

    #[test]
    fn unknown_metric_fails_before_the_model_runs() {
        let mut model = identity();
        let mut prepared = 0;
        let err = evaluate(
            &mut model,
            batches(),
            |batch| {
                prepared += 1;
                Ok(batch)
            },
            &[Scorer::named("f1")],
            None,
            &LogKeys::default(),
        )
        .unwrap_err();

        assert!(matches!(err, EvalErr::UnknownMetric(_)));
        assert_eq!(prepared, 0);
    }

    #[test]
    fn empty_source_is_an_error() {
        let mut model = identity();
        let err = evaluate(
            &mut model,
            Vec::<(Array2<f32>, Array2<f32>)>::new(),
            Ok,
            &[],
            Some(&Mse),
            &LogKeys::default(),
        )
        .unwrap_err();

        assert!(matches!(err, EvalErr::EmptyDataset));
    }

    #[test]
    fn model_state_is_restored() {
        let mut model = identity();
        let bad = vec![(array![[1., 2.]], array![[1.]])];

        assert!(evaluate(&mut model, bad, Ok, &[], None, &LogKeys::default()).is_err());
        assert_eq!(model.mode(), Mode::Train);
        assert!(model.grad_enabled());

        evaluate(&mut model, batches(), Ok, &[], None, &LogKeys::default()).unwrap();
        assert_eq!(model.mode(), Mode::Train);
        assert!(model.grad_enabled());
    }

    #[test]
    fn duplicate_metric_names_are_rejected() {
        let mut model = identity();
        let mut prepared = 0;
        let err = evaluate(
            &mut model,
            batches(),
            |batch| {
                prepared += 1;
                Ok(batch)
            },
            &[
                Scorer::named("mean_absolute_error"),
                Scorer::custom("mean_absolute_error", |_, _| 100.),
            ],
            None,
            &LogKeys::default(),
        )
        .unwrap_err();

        assert!(matches!(err, EvalErr::InvalidConfig(_)));
        assert_eq!(prepared, 0);
    }

    #[test]
    fn custom_scorers_may_take_any_target_width() {
        let mut model = identity();
        let x = array![[1.], [2.]];
        let y = array![[1., 0., 3.], [2., 0., 3.]];

        let logs = evaluate(
            &mut model,
            [(x.clone(), y.clone())],
            Ok,
            &[Scorer::custom("first_column_hits", |y, y_pred| {
                let hits = y
                    .column(0)
                    .iter()
                    .zip(y_pred.column(0))
                    .filter(|(a, b)| a == b)
                    .count();
                hits as f32 / y.nrows() as f32
            })],
            None,
            &LogKeys::default(),
        )
        .unwrap();
        assert_eq!(logs["val_first_column_hits"], 1.);

        let err = evaluate(
            &mut model,
            [(x, y)],
            Ok,
            &[Scorer::named("mean_absolute_error")],
            None,
            &LogKeys::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EvalErr::ShapeMismatch { got: 3, expected: 1, .. }));
    }

    #[test]
    fn metric_named_loss_is_rejected() {
        let mut model = identity();
        let err = evaluate(
            &mut model,
            batches(),
            Ok,
            &[Scorer::custom(LOSS_KEY, |_, _| 0.)],
            None,
            &LogKeys::default(),
        )
        .unwrap_err();

        assert!(matches!(err, EvalErr::InvalidConfig(_)));
    }
}
