use ndarray::prelude::*;

use crate::{EvalErr, Result, arch::activations::ActFn};

/// Forward values kept around for the backward pass.
#[derive(Clone, Debug)]
struct Recorded {
    x: Array2<f32>,
    z: Array2<f32>,
}

/// A fully connected layer. Its parameters are a flat slice laid out as the `(in, out)` weight
/// matrix followed by the `out` biases.
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,
    recorded: Option<Recorded>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The input and output sizes.
    /// * `act_fn` - An optional activation applied to the weighted sums.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self {
            dim,
            act_fn,
            size: (dim.0 + 1) * dim.1,
            recorded: None,
        }
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Makes a forward pass through the layer.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of parameters.
    /// * `x` - The input batch, one sample per row.
    /// * `record` - Whether to keep the values needed by `backward`.
    ///
    /// # Returns
    /// The layer's output or an error if the shapes don't match.
    pub fn forward(
        &mut self,
        params: &[f32],
        x: ArrayView2<f32>,
        record: bool,
    ) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(EvalErr::ShapeMismatch {
                what: "dense input features",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let z = x.dot(&w) + &b;

        if !record {
            self.recorded = None;
            return Ok(self.activate(z));
        }

        let a = self.activate(z.clone());
        self.recorded = Some(Recorded { x: x.to_owned(), z });
        Ok(a)
    }

    /// Propagates `d` (the derivative of the loss with respect to this layer's output) backwards,
    /// writing this layer's gradient into `grad`.
    ///
    /// # Returns
    /// The derivative of the loss with respect to this layer's input.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        let Recorded { x, z } = self.recorded.take().ok_or(EvalErr::NoGradient)?;

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        dw.assign(&x.t().dot(&d));
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    fn activate(&self, z: Array2<f32>) -> Array2<f32> {
        match &self.act_fn {
            Some(act_fn) => z.mapv_into(|z| act_fn.f(z)),
            None => z,
        }
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(EvalErr::ShapeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("dense parameters", params.len())?;

        let (w_raw, b_raw) = params.split_at(self.size - self.dim.1);
        let weights = ArrayView2::from_shape(self.dim, w_raw)?;
        let biases = ArrayView1::from_shape(self.dim.1, b_raw)?;
        Ok((weights, biases))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("dense gradient", grad.len())?;

        let (dw_raw, db_raw) = grad.split_at_mut(self.size - self.dim.1);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn forward_applies_weights_then_biases() {
        let mut dense = Dense::new((2, 1), None);
        let params = [2., 3., 1.];
        let x = array![[1., 1.], [0., 2.]];

        let y = dense.forward(&params, x.view(), false).unwrap();
        assert_eq!(y, array![[6.], [7.]]);
    }

    #[test]
    fn forward_rejects_wrong_feature_count() {
        let mut dense = Dense::new((3, 1), None);
        let params = [0.; 4];
        let x = array![[1., 1.]];

        let err = dense.forward(&params, x.view(), false).unwrap_err();
        assert!(matches!(err, EvalErr::ShapeMismatch { got: 2, expected: 3, .. }));
    }

    #[test]
    fn backward_needs_a_recorded_forward() {
        let mut dense = Dense::new((2, 1), None);
        let params = [1., 1., 0.];
        let mut grad = [0.; 3];
        let x = array![[1., 2.]];

        dense.forward(&params, x.view(), false).unwrap();
        let err = dense
            .backward(&params, &mut grad, array![[1.]])
            .unwrap_err();
        assert!(matches!(err, EvalErr::NoGradient));
    }

    #[test]
    fn backward_writes_weight_and_bias_gradients() {
        let mut dense = Dense::new((2, 1), None);
        let params = [1., 1., 0.];
        let mut grad = [0.; 3];
        let x = array![[1., 2.], [3., 4.]];

        dense.forward(&params, x.view(), true).unwrap();
        let dx = dense
            .backward(&params, &mut grad, array![[1.], [1.]])
            .unwrap();

        assert_eq!(grad, [4., 6., 2.]);
        assert_eq!(dx, array![[1., 1.], [1., 1.]]);
    }
}
