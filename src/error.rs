use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while training or serving the difficulty policy.
#[derive(Error, Debug)]
pub enum DqnError {
    /// Tensor, shape or serialization failure inside candle
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),

    /// CSV parsing or frame manipulation failure
    #[error("data frame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("column '{0}' is missing from the training data")]
    MissingColumn(String),

    #[error("training data not found at {}", .0.display())]
    MissingData(PathBuf),

    /// The request body could not be turned into a state
    #[error("{0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A stored transition names an action the network has no output for
    #[error("action {action} outside the {action_size} available actions")]
    InvalidAction { action: usize, action_size: usize },

    /// The network produced output that cannot be turned into an action
    #[error("inference failed: {0}")]
    Inference(String),
}

impl DqnError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        DqnError::InvalidRequest(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        DqnError::Config(message.into())
    }

    pub fn inference(message: impl Into<String>) -> Self {
        DqnError::Inference(message.into())
    }
}

pub type Result<T> = std::result::Result<T, DqnError>;
