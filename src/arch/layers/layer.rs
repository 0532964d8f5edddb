use ndarray::{Array2, ArrayView2};

use super::{Dense, Dropout};
use crate::{Result, arch::Mode, arch::activations::ActFn};

#[derive(Clone, Debug)]
pub enum Layer {
    Dense(Dense),
    Dropout(Dropout),
}
use Layer::*;

impl Layer {
    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Dense(super::Dense::new(dim, act_fn))
    }

    pub fn dropout(p: f32, seed: u64) -> Result<Self> {
        Ok(Dropout(super::Dropout::new(p, seed)?))
    }

    /// Returns the amount of parameters this layer reads from the flat parameter buffer.
    pub fn size(&self) -> usize {
        match self {
            Dense(l) => l.size(),
            Dropout(_) => 0,
        }
    }

    pub fn forward(
        &mut self,
        params: &[f32],
        x: ArrayView2<f32>,
        mode: Mode,
        record: bool,
    ) -> Result<Array2<f32>> {
        match self {
            Dense(l) => l.forward(params, x, record),
            Dropout(l) => Ok(l.forward(x, mode, record)),
        }
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        match self {
            Dense(l) => l.backward(params, grad, d),
            Dropout(l) => l.backward(d),
        }
    }
}
