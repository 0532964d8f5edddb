use std::{fmt, str::FromStr};

use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::distance::{argmin, pairwise_distances};
use crate::{
    EvalErr, Result,
    arch::{Bottleneck, Classifier, Model},
    data::{FewShotTask, TaskBuilder},
    inference::InferenceScope,
};

/// How the model under evaluation produces embeddings.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkType {
    /// A classifier: its classification layer is stripped and the bottleneck features are used.
    #[default]
    Classifier,
    /// A model that already maps samples into the embedding space.
    Encoder,
}

impl FromStr for NetworkType {
    type Err = EvalErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "classifier" => Ok(Self::Classifier),
            "encoder" => Ok(Self::Encoder),
            other => Err(EvalErr::InvalidConfig(format!(
                "network_type must be one of (classifier, encoder), got `{other}`"
            ))),
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classifier => write!(f, "classifier"),
            Self::Encoder => write!(f, "encoder"),
        }
    }
}

/// Distance used to find the nearest support sample. Only `Euclidean` is implemented.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    #[default]
    Euclidean,
    Cosine,
    DotProduct,
}

impl FromStr for Distance {
    type Err = EvalErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "euclidean" => Ok(Self::Euclidean),
            "cosine" => Ok(Self::Cosine),
            "dot_product" => Ok(Self::DotProduct),
            other => Err(EvalErr::InvalidConfig(format!("unknown distance `{other}`"))),
        }
    }
}

/// Parameters of an n-shot k-way evaluation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotConfig {
    /// Number of tasks to evaluate on.
    pub num_tasks: usize,
    /// Number of samples per class.
    pub n: usize,
    /// Number of classes.
    pub k: usize,
    #[serde(default)]
    pub network_type: NetworkType,
    #[serde(default)]
    pub distance: Distance,
}

impl FewShotConfig {
    pub fn new(num_tasks: usize, n: usize, k: usize) -> Self {
        Self {
            num_tasks,
            n,
            k,
            network_type: NetworkType::default(),
            distance: Distance::default(),
        }
    }

    pub fn network_type(mut self, network_type: NetworkType) -> Self {
        self.network_type = network_type;
        self
    }

    pub fn distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
        self
    }

    /// Checks the preconditions of an evaluation run.
    ///
    /// # Errors
    /// * `EvalErr::Unimplemented` - a distance other than euclidean, or `n != 1`.
    /// * `EvalErr::InvalidConfig` - no tasks or no classes.
    pub fn validate(&self) -> Result<()> {
        match self.distance {
            Distance::Euclidean => {}
            Distance::Cosine => return Err(EvalErr::Unimplemented("cosine distance")),
            Distance::DotProduct => return Err(EvalErr::Unimplemented("dot product distance")),
        }

        if self.n != 1 {
            return Err(EvalErr::Unimplemented("few-shot evaluation with n != 1"));
        }

        if self.num_tasks == 0 {
            return Err(EvalErr::InvalidConfig("num_tasks must be greater than 0".into()));
        }

        if self.k == 0 {
            return Err(EvalErr::InvalidConfig("k must be greater than 0".into()));
        }

        Ok(())
    }
}

/// Evaluates a classifier on n-shot k-way tasks.
///
/// Each task is classified by embedding the query and the support set and picking the support
/// sample nearest to the query. A task counts as correct when that is support index 0, the one
/// the dataset guarantees to share the query's class. Ties go to the lowest index.
///
/// With `NetworkType::Classifier` the embeddings are the bottleneck features and the model runs
/// in inference mode; with `NetworkType::Encoder` the model's output is used as is. Models
/// without a classification head go through [`n_shot_k_way_encoder_evaluation`] instead.
///
/// # Arguments
/// * `model` - The model to evaluate.
/// * `dataset` - The source of tasks.
/// * `prepare_batch` - Turns a task's query and support set into their input batches.
/// * `config` - Task count, shape, network type and distance.
///
/// # Returns
/// The fraction of correctly classified tasks.
///
/// # Errors
/// Any precondition error from [`FewShotConfig::validate`], before any task is built, and the
/// first error raised while building, preparing or embedding a task.
pub fn n_shot_k_way_evaluation<M, D, P>(
    model: &mut M,
    dataset: &mut D,
    mut prepare_batch: P,
    config: &FewShotConfig,
) -> Result<f32>
where
    M: Classifier + ?Sized,
    D: TaskBuilder + ?Sized,
    P: FnMut(D::Sample, Vec<D::Sample>) -> Result<(Array2<f32>, Array2<f32>)>,
{
    config.validate()?;

    let n_correct = match config.network_type {
        NetworkType::Classifier => {
            let mut bottleneck = Bottleneck::new(model);
            let mut encoder = InferenceScope::new(&mut bottleneck);
            run_tasks(&mut *encoder, dataset, &mut prepare_batch, config)?
        }
        NetworkType::Encoder => {
            let mut encoder = InferenceScope::no_grad(model);
            run_tasks(&mut *encoder, dataset, &mut prepare_batch, config)?
        }
    };

    Ok(accuracy(n_correct, config))
}

/// Evaluates a model that already maps samples into the embedding space on n-shot k-way tasks.
///
/// Scoring is the same as in [`n_shot_k_way_evaluation`]. Gradient tracking is off while
/// embedding and the model's mode is left untouched.
///
/// # Errors
/// `EvalErr::InvalidConfig` if `config` asks for `NetworkType::Classifier`, plus every error
/// [`n_shot_k_way_evaluation`] can return.
pub fn n_shot_k_way_encoder_evaluation<E, D, P>(
    encoder: &mut E,
    dataset: &mut D,
    mut prepare_batch: P,
    config: &FewShotConfig,
) -> Result<f32>
where
    E: Model + ?Sized,
    D: TaskBuilder + ?Sized,
    P: FnMut(D::Sample, Vec<D::Sample>) -> Result<(Array2<f32>, Array2<f32>)>,
{
    config.validate()?;

    if config.network_type != NetworkType::Encoder {
        return Err(EvalErr::InvalidConfig(format!(
            "network_type {} needs a classifier, got a plain encoder",
            config.network_type
        )));
    }

    let mut encoder = InferenceScope::no_grad(encoder);
    let n_correct = run_tasks(&mut *encoder, dataset, &mut prepare_batch, config)?;

    Ok(accuracy(n_correct, config))
}

fn accuracy(n_correct: usize, config: &FewShotConfig) -> f32 {
    let accuracy = n_correct as f32 / config.num_tasks as f32;
    info!(
        "{}-shot {}-way accuracy over {} tasks ({}): {accuracy}",
        config.n, config.k, config.num_tasks, config.network_type
    );

    accuracy
}

fn run_tasks<E, D, P>(
    encoder: &mut E,
    dataset: &mut D,
    prepare_batch: &mut P,
    config: &FewShotConfig,
) -> Result<usize>
where
    E: Model + ?Sized,
    D: TaskBuilder + ?Sized,
    P: FnMut(D::Sample, Vec<D::Sample>) -> Result<(Array2<f32>, Array2<f32>)>,
{
    let nsupport = config.k * config.n;
    let mut n_correct = 0;

    for task in 0..config.num_tasks {
        let FewShotTask { query, support } = dataset.build_n_shot_task(config.k, config.n)?;
        let (query_x, support_x) = prepare_batch(query, support)?;

        let query_embedding = encoder.forward(query_x.view())?;
        let support_embeddings = encoder.forward(support_x.view())?;

        if support_embeddings.nrows() != nsupport {
            return Err(EvalErr::ShapeMismatch {
                what: "support embeddings",
                got: support_embeddings.nrows(),
                expected: nsupport,
            });
        }

        let distances = pairwise_distances(query_embedding.view(), support_embeddings.view())?;
        let nearest = argmin(distances.view());
        let correct = nearest == Some(0);
        if correct {
            n_correct += 1;
        }

        debug!(task = task, nearest = nearest, correct = correct; "few-shot task scored");
    }

    Ok(n_correct)
}
