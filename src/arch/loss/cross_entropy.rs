use ndarray::{Array2, ArrayView2, Axis};

use super::LossFn;

/// Softmax followed by the negative log-likelihood of the target class.
///
/// `y_pred` holds raw logits. Targets are either a single column of class indices or one-hot rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    pub fn new() -> Self {
        Self
    }
}

fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
    let mut out = logits.to_owned();
    for mut row in out.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row /= sum;
    }

    out
}

fn one_hot(y: ArrayView2<f32>, nclasses: usize) -> Array2<f32> {
    if y.ncols() != 1 || nclasses == 1 {
        return y.to_owned();
    }

    let mut out = Array2::zeros((y.nrows(), nclasses));
    for (mut row, &class) in out.rows_mut().into_iter().zip(y.column(0)) {
        let class = class.round() as usize;
        if class < nclasses {
            row[class] = 1.;
        }
    }

    out
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let probs = softmax(y_pred);
        let targets = one_hot(y, y_pred.ncols());
        let nll = (&targets * &probs.mapv(|p| p.max(f32::EPSILON).ln())).sum_axis(Axis(1));

        -nll.mean().unwrap_or_default()
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let targets = one_hot(y, y_pred.ncols());
        (softmax(y_pred) - &targets) / y_pred.nrows().max(1) as f32
    }
}
