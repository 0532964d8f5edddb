//! Scoped inference: a guard that puts a model in inference mode and turns gradient tracking off,
//! restoring whatever the model had before when it goes out of scope.

use std::ops::{Deref, DerefMut};

use crate::arch::{Mode, Model};

/// Guard over a model borrowed for inference.
///
/// While the guard lives, the model runs with gradient tracking disabled (nothing is recorded for
/// a backward pass). The previous mode and tracking flag are put back on drop, on every exit path
/// including early returns through `?` and unwinding.
pub struct InferenceScope<'m, M: Model + ?Sized> {
    model: &'m mut M,
    prev_mode: Mode,
    prev_grad: bool,
}

impl<'m, M: Model + ?Sized> InferenceScope<'m, M> {
    /// Enters inference mode and disables gradient tracking.
    pub fn new(model: &'m mut M) -> Self {
        let mut scope = Self::no_grad(model);
        scope.model.set_mode(Mode::Eval);
        scope
    }

    /// Disables gradient tracking only, leaving the model's mode untouched.
    pub fn no_grad(model: &'m mut M) -> Self {
        let prev_mode = model.mode();
        let prev_grad = model.grad_enabled();
        model.set_grad_enabled(false);

        Self {
            model,
            prev_mode,
            prev_grad,
        }
    }
}

impl<M: Model + ?Sized> Deref for InferenceScope<'_, M> {
    type Target = M;

    fn deref(&self) -> &M {
        self.model
    }
}

impl<M: Model + ?Sized> DerefMut for InferenceScope<'_, M> {
    fn deref_mut(&mut self) -> &mut M {
        self.model
    }
}

impl<M: Model + ?Sized> Drop for InferenceScope<'_, M> {
    fn drop(&mut self) {
        self.model.set_mode(self.prev_mode);
        self.model.set_grad_enabled(self.prev_grad);
    }
}
