/// Element-wise activation applied at the output of a dense layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ActFn {
    /// A logistic curve scaled to `(0, amp)`.
    Sigmoid { amp: f32 },
    Relu,
    Tanh,
}
use ActFn::*;

impl ActFn {
    pub fn sigmoid(amp: f32) -> Self {
        Sigmoid { amp }
    }

    pub fn f(&self, z: f32) -> f32 {
        match *self {
            Sigmoid { amp } => amp / (1. + (-z).exp()),
            Relu => z.max(0.),
            Tanh => z.tanh(),
        }
    }

    pub fn df(&self, z: f32) -> f32 {
        match *self {
            Sigmoid { amp } => {
                let s = 1. / (1. + (-z).exp());
                amp * s * (1. - s)
            }
            Relu => {
                if z > 0. {
                    1.
                } else {
                    0.
                }
            }
            Tanh => 1. - z.tanh().powi(2),
        }
    }
}
