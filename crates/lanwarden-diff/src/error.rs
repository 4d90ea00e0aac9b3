use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiffError {
    /// The two snapshots were keyed differently, so their key sets are not
    /// comparable.
    #[error("Key scheme mismatch: previous snapshot keyed by {previous}, current by {current}")]
    KeySchemeMismatch { previous: String, current: String },
}

pub type Result<T> = std::result::Result<T, DiffError>;
