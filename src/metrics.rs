//! Metrics: scoring functions of `(y, y_pred)` that don't take part in backprop.
//!
//! A metric is either the name of an entry in [`NAMED_METRICS`] or a caller supplied function,
//! both invoked through [`Scorer`].

use std::fmt;

use ndarray::{ArrayView1, ArrayView2, Zip};

use crate::{EvalErr, Result};

/// A named metric function taking the targets and the predictions, in that order.
pub type MetricFn = fn(ArrayView2<f32>, ArrayView2<f32>) -> f32;

/// Any scoring function taking the targets and the predictions, in that order.
pub type ScoreFn = dyn Fn(ArrayView2<f32>, ArrayView2<f32>) -> f32;

/// The registry of metrics that can be referred to by name.
pub static NAMED_METRICS: &[(&str, MetricFn)] = &[
    ("categorical_accuracy", categorical_accuracy),
    ("binary_accuracy", binary_accuracy),
    ("mean_squared_error", mean_squared_error),
    ("mean_absolute_error", mean_absolute_error),
];

/// Looks a metric up in [`NAMED_METRICS`].
pub fn named_metric(name: &str) -> Option<&'static MetricFn> {
    NAMED_METRICS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, f)| f)
}

/// A metric to be evaluated: a registry key or a direct scoring function.
pub enum Scorer {
    Named(String),
    Custom { name: String, f: Box<ScoreFn> },
}

impl Scorer {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    pub fn custom<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ArrayView2<f32>, ArrayView2<f32>) -> f32 + 'static,
    {
        Self::Custom {
            name: name.into(),
            f: Box::new(f),
        }
    }

    /// Returns the name the metric is logged under.
    pub fn name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Custom { name, .. } => name,
        }
    }

    /// Resolves the scorer into the function to invoke.
    ///
    /// # Returns
    /// `EvalErr::UnknownMetric` if a named scorer is not in the registry.
    pub fn resolve(&self) -> Result<&ScoreFn> {
        match self {
            Self::Named(name) => named_metric(name)
                .map(|f| f as &ScoreFn)
                .ok_or_else(|| EvalErr::UnknownMetric(name.clone())),
            Self::Custom { f, .. } => Ok(f.as_ref()),
        }
    }
}

impl fmt::Debug for Scorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Custom { name, .. } => f.debug_struct("Custom").field("name", name).finish(),
        }
    }
}

impl From<&str> for Scorer {
    fn from(value: &str) -> Self {
        Self::named(value)
    }
}

impl From<String> for Scorer {
    fn from(value: String) -> Self {
        Self::Named(value)
    }
}

/// Index of the first maximum of `row`.
pub(crate) fn argmax(row: ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }

    best
}

/// Fraction of rows whose highest scoring class is the target class. Targets are either a single
/// column of class indices or one-hot rows.
pub fn categorical_accuracy(y: ArrayView2<f32>, y_pred: ArrayView2<f32>) -> f32 {
    if y_pred.nrows() == 0 {
        return 0.;
    }

    let index_targets = y.ncols() == 1 && y_pred.ncols() > 1;
    let hits = y
        .rows()
        .into_iter()
        .zip(y_pred.rows())
        .filter(|(target, pred)| {
            let target = if index_targets {
                target[0].round() as usize
            } else {
                argmax(target.view())
            };
            argmax(pred.view()) == target
        })
        .count();

    hits as f32 / y_pred.nrows() as f32
}

/// Fraction of outputs that match the target once thresholded at 0.5.
pub fn binary_accuracy(y: ArrayView2<f32>, y_pred: ArrayView2<f32>) -> f32 {
    if y_pred.is_empty() {
        return 0.;
    }

    let Some(y) = y.broadcast(y_pred.raw_dim()) else {
        return 0.;
    };

    let mut hits = 0usize;
    Zip::from(&y).and(&y_pred).for_each(|&y, &p| {
        if (p >= 0.5) == (y >= 0.5) {
            hits += 1;
        }
    });

    hits as f32 / y_pred.len() as f32
}

pub fn mean_squared_error(y: ArrayView2<f32>, y_pred: ArrayView2<f32>) -> f32 {
    (&y_pred - &y)
        .mapv(|x| x.powi(2))
        .mean()
        .unwrap_or_default()
}

pub fn mean_absolute_error(y: ArrayView2<f32>, y_pred: ArrayView2<f32>) -> f32 {
    (&y_pred - &y).mapv(f32::abs).mean().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn categorical_accuracy_with_index_targets() {
        let y_pred = array![[0.1, 0.9], [0.8, 0.2], [0.3, 0.7], [0.6, 0.4]];
        let y = array![[1.], [0.], [0.], [0.]];

        assert_eq!(categorical_accuracy(y.view(), y_pred.view()), 0.75);
    }

    #[test]
    fn categorical_accuracy_with_one_hot_targets() {
        let y_pred = array![[0.1, 0.9], [0.8, 0.2]];
        let y = array![[0., 1.], [0., 1.]];

        assert_eq!(categorical_accuracy(y.view(), y_pred.view()), 0.5);
    }

    #[test]
    fn binary_accuracy_thresholds_at_half() {
        let y_pred = array![[0.7], [0.2], [0.5], [0.49]];
        let y = array![[1.], [0.], [0.], [1.]];

        assert_eq!(binary_accuracy(y.view(), y_pred.view()), 0.5);
    }

    #[test]
    fn unknown_names_fail_to_resolve() {
        let err = Scorer::named("top_k_accuracy").resolve().err().unwrap();
        assert!(matches!(err, EvalErr::UnknownMetric(name) if name == "top_k_accuracy"));
    }

    #[test]
    fn named_and_custom_share_one_contract() {
        let y = array![[1.], [3.]];
        let y_pred = array![[2.], [3.]];

        let named = Scorer::from("mean_absolute_error");
        let custom = Scorer::custom("abs_err", |y, y_pred| {
            (&y_pred - &y).mapv(f32::abs).sum() / y.len() as f32
        });

        assert_eq!(named.name(), "mean_absolute_error");
        assert_eq!(custom.name(), "abs_err");
        let named = named.resolve().unwrap();
        let custom = custom.resolve().unwrap();
        assert_eq!(named(y.view(), y_pred.view()), custom(y.view(), y_pred.view()));
    }
}
