use thiserror::Error;

/// Errors raised by shared model helpers.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid service key: {0} (expected address:port)")]
    InvalidServiceKey(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
