use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinbotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Malformed record in {} row {row}: {reason}", file.display())]
    MalformedRecord {
        file: PathBuf,
        row: usize,
        reason: String,
    },

    #[error("Missing column '{column}' in {}", file.display())]
    MissingColumn { file: PathBuf, column: String },

    #[error("No trained model at {}\nRun `finbot train` first.", .0.display())]
    ModelNotLoaded(PathBuf),

    #[error("Model is stale: {0}")]
    ModelStale(String),

    #[error("No ledger record at index {0}")]
    RecordNotFound(usize),

    #[error("Backup failed, ledger left untouched: {0}")]
    BackupFailed(String),

    #[error("Confidence threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("No paused review found at {}", .0.display())]
    NoCheckpoint(PathBuf),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, FinbotError>;
