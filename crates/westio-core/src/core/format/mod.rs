//! The container file format: a single growable file holding named groups,
//! typed attributes, and growable tables of fixed-layout rows.
//!
//! The encoding is log-structured and strictly append-only. A file is a
//! 16-byte header followed by CRC-checked frames ([`frames`]); opening a file
//! for append replays its frames to rebuild the catalog ([`container`]).
//! Committed bytes are never rewritten; a logical row overwrite appends a
//! new frame and the replay keeps the last writer.
//!
//! [`table`] holds the growth/width invariants for one table; [`schema`]
//! defines the fixed row layouts the store writes.

pub mod container;
pub mod frames;
pub mod schema;
pub mod table;

use std::io;
use thiserror::Error;

/// Errors raised by the container format layer.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Not an iteration store: {0}")]
    NotAStore(String),

    #[error("Corrupt container: {0}")]
    Corrupt(String),

    #[error("Schema mismatch in table '{table}': row width {expected} bytes, record encodes to {actual}")]
    SchemaMismatch {
        table: String,
        expected: u32,
        actual: usize,
    },

    #[error("No such table: '{0}'")]
    NoSuchTable(String),

    #[error("Table already exists: '{0}'")]
    TableExists(String),

    #[error("Table '{0}' has a fixed row width and cannot be widened")]
    WidthFixed(String),

    #[error("Row {index} out of bounds for table '{table}' of length {len}")]
    RowOutOfBounds {
        table: String,
        index: u64,
        len: u64,
    },
}
