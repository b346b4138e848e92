use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchGridError {
    #[error("Unknown context: {0}")]
    UnknownContext(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BenchGridError>;
