use ndarray::{Array2, ArrayView2};

use crate::Result;

/// Whether layers that behave differently while training (e.g. dropout) are in their training or
/// their inference behaviour.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

pub trait Model {
    /// Makes a forward pass over a batch of inputs, one sample per row.
    ///
    /// # Arguments
    /// * `x` - The input batch.
    ///
    /// # Returns
    /// The batch of predictions (or embeddings, for encoders).
    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Returns the current mode of the model.
    fn mode(&self) -> Mode;

    fn set_mode(&mut self, mode: Mode);

    /// Returns whether forward passes record what a backward pass needs.
    fn grad_enabled(&self) -> bool;

    fn set_grad_enabled(&mut self, enabled: bool);
}

/// A model whose final layer is a classification head, exposing the features that feed it.
pub trait Classifier: Model {
    /// Makes a forward pass that stops right before the classification layer.
    ///
    /// # Returns
    /// The penultimate layer's output (the bottleneck features).
    fn bottleneck(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>>;
}
