use thiserror::Error;

pub type SealkitResult<T> = Result<T, SealkitError>;

#[derive(Debug, Error)]
pub enum SealkitError {
    #[error("config error: {0}")]
    Config(String),

    #[error("bundle error: {0}")]
    Bundle(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
