//! In-memory state of one growable table: row count, row width, and the file
//! locations of written rows.
//!
//! A table's length and width are monotonically non-decreasing. Rows that
//! were grown but never written read back as zeroes. The table itself is pure
//! bookkeeping; all I/O lives in the container.

use std::collections::HashMap;

/// Location of one written row's payload inside the container file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLoc {
    /// Absolute byte offset of the stored payload.
    pub offset: u64,
    /// Stored payload length (deflated length for compressed tables).
    pub data_len: u32,
    /// Logical (uncompressed) row payload length.
    pub raw_len: u32,
}

/// Catalog state for one named, resizable table of fixed-layout rows.
#[derive(Debug, Clone)]
pub struct GrowableTable {
    width: u32,
    len: u64,
    compressed: bool,
    rows: HashMap<u64, RowLoc>,
}

impl GrowableTable {
    /// Tables are created with at least one row so that no zero-sized table
    /// ever exists on disk.
    pub fn new(width: u32, compressed: bool, initial_rows: u64) -> Self {
        Self {
            width,
            len: initial_rows.max(1),
            compressed,
            rows: HashMap::new(),
        }
    }

    /// Logical row count. Never zero: creation clamps to at least one row.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Grows the table to at least `n` rows. Returns the new length when the
    /// table actually grew; existing rows are untouched.
    pub fn ensure_rows(&mut self, n: u64) -> Option<u64> {
        if n > self.len {
            self.len = n;
            Some(n)
        } else {
            None
        }
    }

    /// Widens the table to at least `w` bytes per row. Returns the new width
    /// when the table actually widened. Only meaningful for compressed
    /// (width-growable) tables, where stored rows carry their own raw length.
    pub fn ensure_width(&mut self, w: u32) -> Option<u32> {
        if w > self.width {
            self.width = w;
            Some(w)
        } else {
            None
        }
    }

    /// Whether a record of `len` bytes fits this table's row layout: exact
    /// width for fixed tables, at most the width for compressed tables
    /// (shorter rows are left-justified and zero-padded on read).
    pub fn accepts_record(&self, len: usize) -> bool {
        if self.compressed {
            len <= self.width as usize
        } else {
            len == self.width as usize
        }
    }

    pub fn record_row(&mut self, index: u64, loc: RowLoc) {
        self.rows.insert(index, loc);
    }

    pub fn row(&self, index: u64) -> Option<&RowLoc> {
        self.rows.get(&index)
    }
}
