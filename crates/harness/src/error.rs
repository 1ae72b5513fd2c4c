//! Error types for the lifecycle harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("goal execution failed: {message}")]
    GoalExecution { message: String, log: String },

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("port allocation failed: {0}")]
    PortAllocation(String),

    #[error("timeout waiting for: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HarnessError {
    /// Full diagnostic text for message-content matching: the error
    /// message plus the captured log, when one was captured.
    pub fn diagnostic(&self) -> String {
        match self {
            HarnessError::GoalExecution { message, log } => {
                format!("{}\n{}", message, log)
            }
            other => other.to_string(),
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
