pub mod arch;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod inference;
pub mod metrics;

pub use error::{EvalErr, Result};
pub use evaluation::{evaluate, n_shot_k_way_encoder_evaluation, n_shot_k_way_evaluation};
