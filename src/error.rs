// src/error.rs

use std::path::PathBuf;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, KocovError>;

/// Everything that can abort a pipeline stage.
///
/// Missing coverage is not an error; it shows up as sentinel depths in the
/// output rows.
#[derive(Debug, thiserror::Error)]
pub enum KocovError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("config error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("npz error: {0}")]
    Npz(#[from] ndarray_npy::ReadNpzError),

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("malformed annotation at line {line}: {message}")]
    MalformedAnnotation { line: usize, message: String },

    #[error("{}: missing required column '{column}'", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("parse error: {0}")]
    Parse(String),
}
