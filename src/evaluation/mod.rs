mod aggregate;
mod distance;
mod few_shot;

pub use aggregate::{LOSS_KEY, LogKeys, Logs, evaluate};
pub use distance::{argmin, pairwise_distances};
pub use few_shot::{
    Distance, FewShotConfig, NetworkType, n_shot_k_way_encoder_evaluation, n_shot_k_way_evaluation,
};
