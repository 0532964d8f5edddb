mod dataset;
mod few_shot;

pub use dataset::Dataset;
pub use few_shot::{FewShotDataset, FewShotTask, LabelledSample, TaskBuilder, stack_task};
