use ndarray::{Array2, ArrayView2};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{EvalErr, Result, arch::Mode};

/// Inverted dropout: while training, zeroes each unit with probability `p` and scales the
/// survivors by `1 / (1 - p)`. In inference mode it is the identity.
#[derive(Clone, Debug)]
pub struct Dropout {
    p: f32,
    rng: StdRng,
    mask: Option<Array2<f32>>,
}

impl Dropout {
    /// Creates a new `Dropout` layer.
    ///
    /// # Arguments
    /// * `p` - The probability of dropping a unit, in `[0, 1)`.
    /// * `seed` - Seed for the masks drawn in training mode.
    ///
    /// # Returns
    /// An error if `p` is out of range.
    pub fn new(p: f32, seed: u64) -> Result<Self> {
        if !(0. ..1.).contains(&p) {
            return Err(EvalErr::InvalidConfig(format!(
                "dropout probability must be in [0, 1), got {p}"
            )));
        }

        Ok(Self {
            p,
            rng: StdRng::seed_from_u64(seed),
            mask: None,
        })
    }

    pub fn p(&self) -> f32 {
        self.p
    }

    pub fn forward(&mut self, x: ArrayView2<f32>, mode: Mode, record: bool) -> Array2<f32> {
        if mode == Mode::Eval || self.p == 0. {
            self.mask = record.then(|| Array2::ones(x.raw_dim()));
            return x.to_owned();
        }

        let keep = 1. - self.p;
        let rng = &mut self.rng;
        let mask = Array2::from_shape_fn(x.raw_dim(), |_| {
            if rng.random::<f32>() < keep {
                1. / keep
            } else {
                0.
            }
        });

        let a = &x * &mask;
        self.mask = record.then_some(mask);
        a
    }

    pub fn backward(&mut self, d: Array2<f32>) -> Result<Array2<f32>> {
        let mask = self.mask.take().ok_or(EvalErr::NoGradient)?;
        Ok(d * &mask)
    }
}
