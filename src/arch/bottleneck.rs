use ndarray::{Array2, ArrayView2};

use super::{Classifier, Mode, Model};
use crate::Result;

/// Adapts a classifier into an encoder by dropping its classification layer: forward passes return
/// the bottleneck features instead of class scores. Mode and gradient tracking pass through to the
/// wrapped model.
pub struct Bottleneck<'m, M: Classifier + ?Sized> {
    model: &'m mut M,
}

impl<'m, M: Classifier + ?Sized> Bottleneck<'m, M> {
    pub fn new(model: &'m mut M) -> Self {
        Self { model }
    }
}

impl<M: Classifier + ?Sized> Model for Bottleneck<'_, M> {
    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.model.bottleneck(x)
    }

    fn mode(&self) -> Mode {
        self.model.mode()
    }

    fn set_mode(&mut self, mode: Mode) {
        self.model.set_mode(mode);
    }

    fn grad_enabled(&self) -> bool {
        self.model.grad_enabled()
    }

    fn set_grad_enabled(&mut self, enabled: bool) {
        self.model.set_grad_enabled(enabled);
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::arch::{Sequential, layers::Layer};

    #[test]
    fn strips_the_classification_layer() {
        let mut model = Sequential::new(
            [Layer::dense((2, 2), None), Layer::dense((2, 3), None)],
            vec![
                1., 0., 0., 1., 0., 0., // identity
                1., 1., 1., 1., 1., 1., 0., 0., 0., // head
            ],
        )
        .unwrap();
        let x = array![[3., 4.]];

        let mut encoder = Bottleneck::new(&mut model);
        assert_eq!(encoder.forward(x.view()).unwrap(), x);

        encoder.set_mode(Mode::Eval);
        assert_eq!(model.mode(), Mode::Eval);
        assert_eq!(model.forward(x.view()).unwrap().ncols(), 3);
    }
}
