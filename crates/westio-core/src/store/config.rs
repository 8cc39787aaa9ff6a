use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::Result;

/// Default on-disk format version, matching the consuming toolkit.
pub const DEFAULT_FILE_FORMAT_VERSION: u64 = 9;
/// Default zero-padding width for iteration group names.
pub const DEFAULT_ITER_PREC: u64 = 8;

fn default_format_version() -> u64 {
    DEFAULT_FILE_FORMAT_VERSION
}

fn default_iter_prec() -> u64 {
    DEFAULT_ITER_PREC
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Configuration stamped into a store at creation.
///
/// All fields are written as file-level attributes, so a store reopened later
/// recovers its configuration from the file rather than from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// On-disk format version attribute.
    #[serde(default = "default_format_version")]
    pub file_format_version: u64,
    /// Zero-padding width for `iter_{n}` group names.
    #[serde(default = "default_iter_prec")]
    pub iter_prec: u64,
    /// Writer version string recorded in the file.
    #[serde(default = "default_version")]
    pub west_version: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            file_format_version: DEFAULT_FILE_FORMAT_VERSION,
            iter_prec: DEFAULT_ITER_PREC,
            west_version: default_version(),
        }
    }
}

impl StoreConfig {
    /// Loads a configuration from a TOML file; missing keys take defaults.
    pub fn from_toml_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}
