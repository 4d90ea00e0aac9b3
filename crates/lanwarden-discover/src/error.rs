//! Error types for the lanwarden-discover crate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("Invalid target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("Target {target} is too large: /{prefix} is shorter than the /{min} minimum")]
    TooLarge { target: String, prefix: u8, min: u8 },

    #[error("Invalid port list: {0}")]
    InvalidPorts(String),

    #[error("Scan cycle exceeded {secs}s watchdog")]
    Timeout { secs: u64 },

    #[error("Store error: {0}")]
    Store(#[from] lanwarden_store::StoreError),

    #[error("Diff error: {0}")]
    Diff(#[from] lanwarden_diff::DiffError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
