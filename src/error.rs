use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ndarray::ShapeError;

/// The result type used in the entire evaluation crate.
pub type Result<T> = std::result::Result<T, EvalErr>;

/// The evaluation crate's error type.
#[derive(Debug)]
pub enum EvalErr {
    /// The caller supplied an unsupported or inconsistent configuration.
    InvalidConfig(String),
    /// The requested feature is recognised but not implemented.
    Unimplemented(&'static str),
    /// A named metric is not present in the registry.
    UnknownMetric(String),
    /// A shape invariant was violated (e.g. mismatched lengths).
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// The data source yielded no samples, so no average can be taken.
    EmptyDataset,
    /// A backward pass was requested without a recorded forward pass.
    NoGradient,
    /// The dataset could not build the requested few-shot task.
    InvalidTask(String),
    Shape(ShapeError),
    Io(io::Error),
    Json(serde_json::Error),
}

impl Display for EvalErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            EvalErr::Unimplemented(what) => write!(f, "not implemented: {what}"),
            EvalErr::UnknownMetric(name) => write!(f, "unknown metric: {name}"),
            EvalErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch for {what}: got {got}, expected {expected}"
            ),
            EvalErr::EmptyDataset => write!(f, "the data source yielded no samples"),
            EvalErr::NoGradient => write!(
                f,
                "backward called without a forward pass recorded with gradient tracking"
            ),
            EvalErr::InvalidTask(msg) => write!(f, "cannot build few-shot task: {msg}"),
            EvalErr::Shape(e) => write!(f, "shape error: {e}"),
            EvalErr::Io(e) => write!(f, "io error: {e}"),
            EvalErr::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl Error for EvalErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            EvalErr::Shape(e) => Some(e),
            EvalErr::Io(e) => Some(e),
            EvalErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for EvalErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<io::Error> for EvalErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for EvalErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
