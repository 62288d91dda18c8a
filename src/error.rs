//! Error types for the Kolosal explanation engine

use thiserror::Error;

/// Result type alias for explanation operations
pub type Result<T> = std::result::Result<T, ExplainError>;

/// Main error type for the explanation engine
#[derive(Error, Debug)]
pub enum ExplainError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Drift baseline not set: call set_baseline() before detect()")]
    BaselineNotSet,

    #[error("Numeric error: {0}")]
    NumericError(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Task '{task}' failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: Box<ExplainError>,
    },

    /// Raised by [`Predictor`](crate::model::Predictor) adapters when the wrapped model fails
    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ExplainError {
    /// Shorthand for an out-of-range parameter
    pub fn invalid_parameter(name: &str, value: impl ToString, reason: &str) -> Self {
        ExplainError::InvalidParameter {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Wrap an error raised inside a fan-out task, keeping the original cause
    pub fn task_failed(task: impl Into<String>, source: ExplainError) -> Self {
        ExplainError::TaskFailed {
            task: task.into(),
            source: Box::new(source),
        }
    }

    /// Innermost cause, unwrapping any task-failure layers
    pub fn root_cause(&self) -> &ExplainError {
        match self {
            ExplainError::TaskFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for ExplainError {
    fn from(err: serde_json::Error) -> Self {
        ExplainError::SerializationError(err.to_string())
    }
}

/// Fail with `NumericError` unless `value` is finite
pub(crate) fn ensure_finite(value: f64, what: impl FnOnce() -> String) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ExplainError::NumericError(format!("{} is not finite ({})", what(), value)))
    }
}
