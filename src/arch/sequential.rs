use ndarray::{Array2, ArrayView2};

use super::{Classifier, Mode, Model, layers::Layer, loss::LossFn};
use crate::{EvalErr, Result};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
///
/// The model owns a flat parameter buffer which every layer reads its slice from, in order.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Layer>,
    params: Vec<f32>,
    grad: Vec<f32>,
    mode: Mode,
    grad_enabled: bool,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    /// * `params` - The flat parameter buffer, layer after layer.
    ///
    /// # Returns
    /// A new `Sequential` in training mode with gradient tracking enabled, or an error if the
    /// amount of parameters doesn't match the layers.
    pub fn new<I>(layers: I, params: Vec<f32>) -> Result<Self>
    where
        I: IntoIterator<Item = Layer>,
    {
        let layers: Vec<Layer> = layers.into_iter().collect();
        let size = layers.iter().map(Layer::size).sum();

        if params.len() != size {
            return Err(EvalErr::ShapeMismatch {
                what: "model parameters",
                got: params.len(),
                expected: size,
            });
        }

        Ok(Self {
            layers,
            grad: vec![0.; size],
            params,
            mode: Mode::Train,
            grad_enabled: true,
        })
    }

    /// Returns the amount of parameters in the model.
    pub fn size(&self) -> usize {
        self.params.len()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    /// Returns the gradient written by the last `backward` call.
    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    /// Makes a forward pass through the first `nlayers` layers.
    fn forward_through(&mut self, x: ArrayView2<f32>, nlayers: usize) -> Result<Array2<f32>> {
        let Self {
            layers,
            params,
            mode,
            grad_enabled,
            ..
        } = self;

        let mut out = x.to_owned();
        let mut offset = 0;

        for layer in layers.iter_mut().take(nlayers) {
            let size = layer.size();
            out = layer.forward(&params[offset..offset + size], out.view(), *mode, *grad_enabled)?;
            offset += size;
        }

        Ok(out)
    }

    /// Computes the gradient of `loss_fn` with respect to the parameters, using the values recorded
    /// by the last forward pass.
    ///
    /// # Arguments
    /// * `y_pred` - The output of the last forward pass.
    /// * `y` - The expected output.
    /// * `loss_fn` - The loss function.
    ///
    /// # Returns
    /// The gradient, or `EvalErr::NoGradient` if the last forward pass wasn't recorded.
    pub fn backward<L>(&mut self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>, loss_fn: &L) -> Result<&[f32]>
    where
        L: LossFn + ?Sized,
    {
        if !self.grad_enabled {
            return Err(EvalErr::NoGradient);
        }

        let Self {
            layers,
            params,
            grad,
            ..
        } = self;

        grad.fill(0.);
        let mut d = loss_fn.loss_prime(y_pred, y);
        let mut end = params.len();

        for layer in layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(&self.grad)
    }
}

impl Model for Sequential {
    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let nlayers = self.layers.len();
        self.forward_through(x, nlayers)
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn grad_enabled(&self) -> bool {
        self.grad_enabled
    }

    fn set_grad_enabled(&mut self, enabled: bool) {
        self.grad_enabled = enabled;
    }
}

impl Classifier for Sequential {
    fn bottleneck(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let nlayers = self.layers.len();
        if nlayers < 2 {
            return Err(EvalErr::InvalidConfig(
                "a classifier needs at least two layers to expose its bottleneck".into(),
            ));
        }

        self.forward_through(x, nlayers - 1)
    }
}
