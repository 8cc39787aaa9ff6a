use crate::core::format::FormatError;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the iteration store write path.
///
/// All failures propagate to the immediate caller; the store performs no
/// internal retries. Cross-write atomicity within one `append` is not
/// guaranteed; see the crate documentation on the iteration namespace as
/// the durability marker.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Empty iteration: {0} must not be empty")]
    EmptyIteration(&'static str),

    #[error("Iteration numbers are 1-based; iteration 0 cannot be appended")]
    InvalidIteration,

    #[error("A file already exists at '{0}'; remove it to create a new store")]
    AlreadyExists(PathBuf),

    #[error("State label or auxref '{label}' exceeds the {max}-byte field")]
    LabelTooLong { label: String, max: usize },

    #[error("Invalid store configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
