//! The write path: per-iteration writers and the [`WestFile`] facade.
//!
//! One [`WestFile::append`] call records everything the ensemble produced for
//! an iteration (the summary row, the basis/target state epochs, the binning
//! topology blob) and finally stamps the iteration namespace group, whose
//! existence is the caller-visible signal that the iteration is fully
//! durable.

pub mod config;
pub mod error;
pub mod states;
pub mod summary;
pub mod topology;
pub mod west_file;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use west_file::WestFile;
