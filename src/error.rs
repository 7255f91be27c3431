// src/error.rs
//
// Error type for the simulation harness.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// The display could not be initialised. The simulator degrades to
    /// headless mode when it sees this.
    #[error("display unavailable: {0}")]
    DisplayUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;
