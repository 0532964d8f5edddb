pub mod activations;
mod bottleneck;
pub mod layers;
pub mod loss;
mod model;
mod sequential;

pub use bottleneck::Bottleneck;
pub use model::{Classifier, Mode, Model};
pub use sequential::Sequential;
