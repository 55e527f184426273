use thiserror::Error;

#[derive(Error, Debug)]
pub enum SquashError {
    /// Submission payload rejected before anything was persisted.
    #[error("Invalid job submission: {0}")]
    Validation(String),

    /// Stored or served data that downstream arithmetic cannot use.
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    #[error("Metric not found: {0}")]
    MetricNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("API request failed with status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SquashError>;
