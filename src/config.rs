//! JSON configuration for an evaluation run.

use std::{fs, num::NonZeroUsize, path::Path};

use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};

use crate::{
    EvalErr, Result,
    arch::{
        Sequential,
        activations::ActFn,
        layers::Layer,
        loss::{CrossEntropy, LossFn, Mse},
    },
    data::Dataset,
    evaluation::{FewShotConfig, LogKeys},
    metrics::Scorer,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFnConfig {
    Sigmoid { amp: f32 },
    Relu,
    Tanh,
}

impl From<ActFnConfig> for ActFn {
    fn from(value: ActFnConfig) -> Self {
        match value {
            ActFnConfig::Sigmoid { amp } => ActFn::sigmoid(amp),
            ActFnConfig::Relu => ActFn::Relu,
            ActFnConfig::Tanh => ActFn::Tanh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerConfig {
    Dense {
        dim: (usize, usize),
        act_fn: Option<ActFnConfig>,
    },
    Dropout {
        p: f32,
    },
}

/// How the parameters are generated when they aren't given explicitly. Weights are drawn from the
/// distribution, biases start at zero except for `Const`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamInitConfig {
    Const {
        value: f32,
    },
    #[default]
    XavierUniform,
    Normal {
        mean: f32,
        std_dev: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelConfig {
    Sequential {
        layers: Vec<LayerConfig>,
        /// The flat parameter buffer, generated with `init` if absent.
        #[serde(default)]
        params: Option<Vec<f32>>,
        #[serde(default)]
        init: ParamInitConfig,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetConfig {
    Inline {
        data: Vec<f32>,
        x_size: usize,
        y_size: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFnConfig {
    Mse,
    CrossEntropy,
}

impl LossFnConfig {
    pub fn build(self) -> Box<dyn LossFn> {
        match self {
            LossFnConfig::Mse => Box::new(Mse),
            LossFnConfig::CrossEntropy => Box::new(CrossEntropy),
        }
    }
}

fn default_prefix() -> String {
    "val_".into()
}

/// The whole configuration of an evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    pub model: ModelConfig,
    pub dataset: DatasetConfig,
    pub batch_size: NonZeroUsize,
    #[serde(default)]
    pub metrics: Vec<String>,
    pub loss: Option<LossFnConfig>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    pub few_shot: Option<FewShotConfig>,
    pub seed: Option<u64>,
}

impl EvalConfig {
    /// Parses and validates a configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the configuration stored at `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Checks the model and dataset are consistent with each other and that the few-shot run, if
    /// any, can be carried out.
    ///
    /// # Errors
    /// `EvalErr::InvalidConfig` describing the first problem found, or `EvalErr::Unimplemented`
    /// for few-shot options that aren't supported.
    pub fn validate(&self) -> Result<()> {
        let x_size = validate_dataset(&self.dataset)?;
        let input = validate_model(&self.model)?;

        if input != x_size {
            return Err(EvalErr::InvalidConfig(format!(
                "model input size ({input}) does not match dataset x_size ({x_size})"
            )));
        }

        if let Some(few_shot) = &self.few_shot {
            few_shot.validate()?;
        }

        Ok(())
    }

    pub fn seed(&self) -> u64 {
        self.seed.unwrap_or_default()
    }

    /// Builds the model, generating its parameters from the configured seed if needed.
    pub fn build_model(&self) -> Result<Sequential> {
        build_model(&self.model, self.seed())
    }

    pub fn build_dataset(&self) -> Result<Dataset> {
        let DatasetConfig::Inline {
            data,
            x_size,
            y_size,
        } = &self.dataset;

        Dataset::new(data.clone(), *x_size, *y_size)
    }

    pub fn scorers(&self) -> Vec<Scorer> {
        self.metrics.iter().map(Scorer::named).collect()
    }

    pub fn loss_fn(&self) -> Option<Box<dyn LossFn>> {
        self.loss.map(LossFnConfig::build)
    }

    pub fn log_keys(&self) -> LogKeys {
        LogKeys::new(self.prefix.as_str(), self.suffix.as_str())
    }
}

/// Returns the amount of input features of the dataset.
fn validate_dataset(dataset: &DatasetConfig) -> Result<usize> {
    let DatasetConfig::Inline {
        data,
        x_size,
        y_size,
    } = dataset;

    let row_size = x_size + y_size;
    if row_size == 0 {
        return Err(EvalErr::InvalidConfig(
            "x_size + y_size must be greater than 0".into(),
        ));
    }

    if data.len() % row_size != 0 {
        return Err(EvalErr::InvalidConfig(format!(
            "dataset length ({}) is not divisible by x_size + y_size ({row_size})",
            data.len()
        )));
    }

    if data.is_empty() {
        return Err(EvalErr::InvalidConfig(
            "dataset must have at least one sample".into(),
        ));
    }

    Ok(*x_size)
}

/// Returns the input size of the model.
fn validate_model(model: &ModelConfig) -> Result<usize> {
    let ModelConfig::Sequential { layers, params, .. } = model;

    let dims: Vec<(usize, usize)> = layers
        .iter()
        .filter_map(|layer| match layer {
            LayerConfig::Dense { dim, .. } => Some(*dim),
            LayerConfig::Dropout { .. } => None,
        })
        .collect();

    let Some(&(input, _)) = dims.first() else {
        return Err(EvalErr::InvalidConfig(
            "model must have at least one dense layer".into(),
        ));
    };

    // Adjacent dense layers must chain: prev.m == next.n
    for (i, pair) in dims.windows(2).enumerate() {
        let (_, prev_m) = pair[0];
        let (curr_n, _) = pair[1];
        if prev_m != curr_n {
            return Err(EvalErr::InvalidConfig(format!(
                "dense layer {}: input size ({curr_n}) does not match previous layer output size \
                 ({prev_m})",
                i + 1
            )));
        }
    }

    for layer in layers {
        match layer {
            LayerConfig::Dropout { p } if !(0. ..1.).contains(p) => {
                return Err(EvalErr::InvalidConfig(format!(
                    "dropout probability must be in [0, 1), got {p}"
                )));
            }
            _ => {}
        }
    }

    if let Some(params) = params {
        let size: usize = dims.iter().map(|(n, m)| (n + 1) * m).sum();
        if params.len() != size {
            return Err(EvalErr::InvalidConfig(format!(
                "params length ({}) does not match the model size ({size})",
                params.len()
            )));
        }
    }

    Ok(input)
}

/// Builds a `Sequential` from its configuration.
///
/// # Arguments
/// * `config` - The model configuration.
/// * `seed` - Seeds the parameter generation and every dropout layer.
pub fn build_model(config: &ModelConfig, seed: u64) -> Result<Sequential> {
    let ModelConfig::Sequential {
        layers: layer_configs,
        params,
        init,
    } = config;

    let layers = layer_configs
        .iter()
        .enumerate()
        .map(|(i, layer)| match *layer {
            LayerConfig::Dense { dim, act_fn } => Ok(Layer::dense(dim, act_fn.map(ActFn::from))),
            LayerConfig::Dropout { p } => Layer::dropout(p, seed.wrapping_add(i as u64 + 1)),
        })
        .collect::<Result<Vec<_>>>()?;

    let params = match params {
        Some(params) => params.clone(),
        None => init_params(layer_configs, *init, seed)?,
    };

    Sequential::new(layers, params)
}

/// Generates the flat parameter buffer of `layers`, weights then biases for every dense layer.
fn init_params(layers: &[LayerConfig], init: ParamInitConfig, seed: u64) -> Result<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut params = Vec::new();

    for layer in layers {
        let LayerConfig::Dense { dim: (n, m), .. } = *layer else {
            continue;
        };

        match init {
            ParamInitConfig::Const { value } => {
                params.extend(std::iter::repeat_n(value, (n + 1) * m));
                continue;
            }
            ParamInitConfig::XavierUniform => {
                let range = (6. / (n + m) as f32).sqrt();
                let dist = Uniform::new(-range, range)
                    .map_err(|e| EvalErr::InvalidConfig(format!("xavier_uniform: {e}")))?;
                params.extend(dist.sample_iter(&mut rng).take(n * m));
            }
            ParamInitConfig::Normal { mean, std_dev } => {
                let dist = Normal::new(mean, std_dev)
                    .map_err(|e| EvalErr::InvalidConfig(format!("normal: {e}")))?;
                params.extend(dist.sample_iter(&mut rng).take(n * m));
            }
        }

        params.extend(std::iter::repeat_n(0., m));
    }

    Ok(params)
}
