//! The container file: groups, attributes, and growable tables inside one
//! growable, append-only file.
//!
//! A [`Container`] is the in-memory catalog of one open file session. It is
//! built either empty ([`Container::create`]) or by replaying every frame in
//! an existing file ([`Container::open`]). All mutations append frames at the
//! logical end of the file; committed bytes are never rewritten. A logical
//! "overwrite row i" appends a fresh `WriteRow` frame and replay keeps the
//! last writer, so historical bytes stay intact on disk.
//!
//! Crash recovery: a torn final frame is detected during replay and the file
//! is truncated back to the committed end, so committed data is always the
//! exact file extent. A checksum failure in front of committed frames is
//! surfaced as [`FormatError::Corrupt`].

use super::FormatError;
use super::frames::{self, AttrValue, Frame};
use super::table::{GrowableTable, RowLoc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, warn};

/// One open session against a container file.
#[derive(Debug)]
pub struct Container {
    file: std::fs::File,
    /// Logical end of committed data; appends land here.
    end: u64,
    groups: HashSet<String>,
    attrs: HashMap<(String, String), AttrValue>,
    tables: HashMap<String, GrowableTable>,
}

impl Container {
    /// Creates a new, empty container file. Fails if the path exists.
    pub fn create(path: &Path) -> Result<Self, FormatError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(&frames::encode_header())?;
        debug!(path = %path.display(), "created container file");
        Ok(Self {
            file,
            end: frames::CONTAINER_HEADER_BYTES as u64,
            groups: HashSet::new(),
            attrs: HashMap::new(),
            tables: HashMap::new(),
        })
    }

    /// Opens an existing container, replaying its frames into the catalog.
    pub fn open(path: &Path) -> Result<Self, FormatError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        frames::decode_header(&bytes)?;

        let mut container = Self {
            file,
            end: frames::CONTAINER_HEADER_BYTES as u64,
            groups: HashSet::new(),
            attrs: HashMap::new(),
            tables: HashMap::new(),
        };

        let mut pos = frames::CONTAINER_HEADER_BYTES;
        while pos < bytes.len() {
            match Frame::decode(&bytes[pos..])? {
                Some(decoded) => {
                    let data_offset = decoded.data_offset.map(|o| (pos + o) as u64);
                    container.apply(decoded.frame, data_offset)?;
                    pos += decoded.consumed;
                }
                None => {
                    warn!(
                        path = %path.display(),
                        torn_bytes = bytes.len() - pos,
                        "discarding torn tail in container file"
                    );
                    break;
                }
            }
        }
        container.end = pos as u64;
        if container.end < bytes.len() as u64 {
            // Truncate the torn bytes now. A shorter recovery append would
            // otherwise leave a stale remainder of the interrupted frame
            // sitting after committed frames, where the next replay would
            // misread it as corruption or, worse, as a valid frame.
            container.file.set_len(container.end)?;
            container.file.sync_all()?;
        }
        debug!(
            path = %path.display(),
            tables = container.tables.len(),
            groups = container.groups.len(),
            "replayed container catalog"
        );
        Ok(container)
    }

    /// Applies one replayed frame to the catalog.
    fn apply(&mut self, frame: Frame, data_offset: Option<u64>) -> Result<(), FormatError> {
        match frame {
            Frame::CreateGroup { path } => {
                if !self.groups.insert(path.clone()) {
                    return Err(FormatError::Corrupt(format!(
                        "group '{path}' created twice"
                    )));
                }
            }
            Frame::SetAttr { path, name, value } => {
                self.attrs.insert((path, name), value);
            }
            Frame::CreateTable {
                path,
                width,
                compressed,
                initial_rows,
            } => {
                if self.tables.contains_key(&path) {
                    return Err(FormatError::Corrupt(format!(
                        "table '{path}' created twice"
                    )));
                }
                self.tables
                    .insert(path, GrowableTable::new(width, compressed, initial_rows));
            }
            Frame::GrowRows { path, new_len } => {
                let table = self
                    .tables
                    .get_mut(&path)
                    .ok_or_else(|| FormatError::Corrupt(format!("grow of unknown table '{path}'")))?;
                table.ensure_rows(new_len);
            }
            Frame::GrowWidth { path, new_width } => {
                let table = self
                    .tables
                    .get_mut(&path)
                    .ok_or_else(|| FormatError::Corrupt(format!("widen of unknown table '{path}'")))?;
                table.ensure_width(new_width);
            }
            Frame::WriteRow {
                path,
                index,
                raw_len,
                data,
            } => {
                let offset = data_offset.ok_or_else(|| {
                    FormatError::Corrupt("row frame without payload location".to_string())
                })?;
                let table = self
                    .tables
                    .get_mut(&path)
                    .ok_or_else(|| FormatError::Corrupt(format!("row for unknown table '{path}'")))?;
                if index >= table.len() {
                    return Err(FormatError::Corrupt(format!(
                        "row {index} beyond length {} of table '{path}'",
                        table.len()
                    )));
                }
                table.record_row(
                    index,
                    RowLoc {
                        offset,
                        data_len: data.len() as u32,
                        raw_len,
                    },
                );
            }
        }
        Ok(())
    }

    /// Appends one frame at the logical end of the file. Returns the absolute
    /// offset of the row payload for `WriteRow` frames.
    fn append_frame(&mut self, frame: &Frame) -> Result<Option<u64>, FormatError> {
        let encoded = frame.encode();
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(&encoded.bytes)?;
        let data_offset = encoded.data_offset.map(|o| self.end + o as u64);
        self.end += encoded.bytes.len() as u64;
        Ok(data_offset)
    }

    /// Creates the group if it does not already exist.
    pub fn ensure_group(&mut self, path: &str) -> Result<(), FormatError> {
        if self.groups.contains(path) {
            return Ok(());
        }
        self.append_frame(&Frame::CreateGroup {
            path: path.to_string(),
        })?;
        self.groups.insert(path.to_string());
        Ok(())
    }

    pub fn has_group(&self, path: &str) -> bool {
        self.groups.contains(path)
    }

    /// Group paths starting with `prefix`, sorted.
    pub fn groups_with_prefix(&self, prefix: &str) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .groups
            .iter()
            .filter(|g| g.starts_with(prefix))
            .map(String::as_str)
            .collect();
        out.sort_unstable();
        out
    }

    /// Sets an attribute on the file root (`"/"`) or on a group.
    pub fn set_attr(&mut self, path: &str, name: &str, value: AttrValue) -> Result<(), FormatError> {
        self.append_frame(&Frame::SetAttr {
            path: path.to_string(),
            name: name.to_string(),
            value: value.clone(),
        })?;
        self.attrs.insert((path.to_string(), name.to_string()), value);
        Ok(())
    }

    pub fn attr(&self, path: &str, name: &str) -> Option<&AttrValue> {
        self.attrs.get(&(path.to_string(), name.to_string()))
    }

    /// Creates a table with one initial row.
    pub fn create_table(
        &mut self,
        path: &str,
        width: u32,
        compressed: bool,
    ) -> Result<(), FormatError> {
        if self.tables.contains_key(path) {
            return Err(FormatError::TableExists(path.to_string()));
        }
        self.append_frame(&Frame::CreateTable {
            path: path.to_string(),
            width,
            compressed,
            initial_rows: 1,
        })?;
        self.tables
            .insert(path.to_string(), GrowableTable::new(width, compressed, 1));
        Ok(())
    }

    pub fn has_table(&self, path: &str) -> bool {
        self.tables.contains_key(path)
    }

    fn table(&self, path: &str) -> Result<&GrowableTable, FormatError> {
        self.tables
            .get(path)
            .ok_or_else(|| FormatError::NoSuchTable(path.to_string()))
    }

    pub fn table_len(&self, path: &str) -> Result<u64, FormatError> {
        Ok(self.table(path)?.len())
    }

    pub fn table_width(&self, path: &str) -> Result<u32, FormatError> {
        Ok(self.table(path)?.width())
    }

    /// Grows the table to at least `n` rows, preserving existing rows.
    pub fn ensure_rows(&mut self, path: &str, n: u64) -> Result<(), FormatError> {
        let table = self
            .tables
            .get_mut(path)
            .ok_or_else(|| FormatError::NoSuchTable(path.to_string()))?;
        if table.ensure_rows(n).is_some() {
            self.append_frame(&Frame::GrowRows {
                path: path.to_string(),
                new_len: n,
            })?;
        }
        Ok(())
    }

    /// Widens a compressed table's rows to at least `w` bytes.
    pub fn ensure_width(&mut self, path: &str, w: u32) -> Result<(), FormatError> {
        let table = self
            .tables
            .get_mut(path)
            .ok_or_else(|| FormatError::NoSuchTable(path.to_string()))?;
        if !table.is_compressed() {
            return Err(FormatError::WidthFixed(path.to_string()));
        }
        if table.ensure_width(w).is_some() {
            self.append_frame(&Frame::GrowWidth {
                path: path.to_string(),
                new_width: w,
            })?;
        }
        Ok(())
    }

    /// Writes a record at an existing row index.
    ///
    /// Fixed tables require the record to encode to exactly the row width;
    /// compressed tables accept up to the width, store the record deflated,
    /// and zero-pad on read.
    pub fn write_row(&mut self, path: &str, index: u64, record: &[u8]) -> Result<(), FormatError> {
        let table = self
            .tables
            .get_mut(path)
            .ok_or_else(|| FormatError::NoSuchTable(path.to_string()))?;
        if index >= table.len() {
            return Err(FormatError::RowOutOfBounds {
                table: path.to_string(),
                index,
                len: table.len(),
            });
        }
        if !table.accepts_record(record.len()) {
            return Err(FormatError::SchemaMismatch {
                table: path.to_string(),
                expected: table.width(),
                actual: record.len(),
            });
        }
        let compressed = table.is_compressed();

        let data = if compressed {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
            encoder.write_all(record)?;
            encoder.finish()?
        } else {
            record.to_vec()
        };
        let raw_len = record.len() as u32;
        let data_len = data.len() as u32;

        let offset = self
            .append_frame(&Frame::WriteRow {
                path: path.to_string(),
                index,
                raw_len,
                data,
            })?
            .ok_or_else(|| {
                FormatError::Corrupt("row frame produced no payload location".to_string())
            })?;

        // Re-borrow: append_frame needed &mut self.
        let table = self
            .tables
            .get_mut(path)
            .ok_or_else(|| FormatError::NoSuchTable(path.to_string()))?;
        table.record_row(
            index,
            RowLoc {
                offset,
                data_len,
                raw_len,
            },
        );
        Ok(())
    }

    /// Reads the logical row at `index`, zero-padded to the table width.
    /// Rows that were grown but never written read back as zeroes.
    pub fn read_row(&mut self, path: &str, index: u64) -> Result<Vec<u8>, FormatError> {
        let (loc, width, compressed, len) = {
            let table = self.table(path)?;
            (
                table.row(index).copied(),
                table.width() as usize,
                table.is_compressed(),
                table.len(),
            )
        };
        if index >= len {
            return Err(FormatError::RowOutOfBounds {
                table: path.to_string(),
                index,
                len,
            });
        }
        let Some(loc) = loc else {
            return Ok(vec![0u8; width]);
        };

        self.file.seek(SeekFrom::Start(loc.offset))?;
        let mut stored = vec![0u8; loc.data_len as usize];
        self.file.read_exact(&mut stored)?;

        let raw = if compressed {
            let mut decoder = GzDecoder::new(&stored[..]);
            let mut out = Vec::with_capacity(loc.raw_len as usize);
            decoder.read_to_end(&mut out)?;
            out
        } else {
            stored
        };
        if raw.len() != loc.raw_len as usize {
            return Err(FormatError::Corrupt(format!(
                "row {index} of '{path}' inflated to {} bytes, recorded {}",
                raw.len(),
                loc.raw_len
            )));
        }

        let mut row = raw;
        row.resize(width, 0);
        Ok(row)
    }

    /// Flushes all written frames to stable storage and ends the session.
    pub fn finish(self) -> Result<(), FormatError> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
        dir.path().join("test.west")
    }

    #[test]
    fn create_then_open_replays_catalog() {
        let dir = tempdir().unwrap();
        let path = store_path(&dir);

        let mut c = Container::create(&path).unwrap();
        c.ensure_group("/iterations").unwrap();
        c.set_attr("/", "west_iter_prec", AttrValue::UInt(8)).unwrap();
        c.set_attr("/", "west_version", AttrValue::Str("0.1.0".into()))
            .unwrap();
        c.create_table("/summary", 128, false).unwrap();
        c.finish().unwrap();

        let c = Container::open(&path).unwrap();
        assert!(c.has_group("/iterations"));
        assert_eq!(c.attr("/", "west_iter_prec").and_then(AttrValue::as_uint), Some(8));
        assert_eq!(
            c.attr("/", "west_version").and_then(AttrValue::as_str),
            Some("0.1.0")
        );
        assert_eq!(c.table_len("/summary").unwrap(), 1);
        assert_eq!(c.table_width("/summary").unwrap(), 128);
    }

    #[test]
    fn rows_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = store_path(&dir);

        let mut c = Container::create(&path).unwrap();
        c.create_table("/t", 4, false).unwrap();
        c.ensure_rows("/t", 3).unwrap();
        c.write_row("/t", 0, &[1, 2, 3, 4]).unwrap();
        c.write_row("/t", 2, &[9, 9, 9, 9]).unwrap();
        c.finish().unwrap();

        let mut c = Container::open(&path).unwrap();
        assert_eq!(c.table_len("/t").unwrap(), 3);
        assert_eq!(c.read_row("/t", 0).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(c.read_row("/t", 1).unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(c.read_row("/t", 2).unwrap(), vec![9, 9, 9, 9]);
    }

    #[test]
    fn logical_overwrite_keeps_last_writer() {
        let dir = tempdir().unwrap();
        let path = store_path(&dir);

        let mut c = Container::create(&path).unwrap();
        c.create_table("/t", 2, false).unwrap();
        c.write_row("/t", 0, &[1, 1]).unwrap();
        c.write_row("/t", 0, &[2, 2]).unwrap();
        c.finish().unwrap();

        let mut c = Container::open(&path).unwrap();
        assert_eq!(c.read_row("/t", 0).unwrap(), vec![2, 2]);
    }

    #[test]
    fn compressed_rows_roundtrip_with_padding() {
        let dir = tempdir().unwrap();
        let path = store_path(&dir);

        let payload = vec![7u8; 100];
        let mut c = Container::create(&path).unwrap();
        c.create_table("/pickles", 100, true).unwrap();
        c.ensure_width("/pickles", 256).unwrap();
        c.write_row("/pickles", 0, &payload).unwrap();
        c.finish().unwrap();

        let mut c = Container::open(&path).unwrap();
        assert_eq!(c.table_width("/pickles").unwrap(), 256);
        let row = c.read_row("/pickles", 0).unwrap();
        assert_eq!(row.len(), 256);
        assert_eq!(&row[..100], &payload[..]);
        assert!(row[100..].iter().all(|&b| b == 0));
    }

    #[test]
    fn fixed_table_rejects_wrong_record_size() {
        let dir = tempdir().unwrap();
        let mut c = Container::create(&store_path(&dir)).unwrap();
        c.create_table("/t", 8, false).unwrap();
        assert!(matches!(
            c.write_row("/t", 0, &[0u8; 7]),
            Err(FormatError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn write_beyond_length_is_out_of_bounds() {
        let dir = tempdir().unwrap();
        let mut c = Container::create(&store_path(&dir)).unwrap();
        c.create_table("/t", 1, false).unwrap();
        assert!(matches!(
            c.write_row("/t", 1, &[0u8]),
            Err(FormatError::RowOutOfBounds { .. })
        ));
    }

    #[test]
    fn widening_a_fixed_table_is_refused() {
        let dir = tempdir().unwrap();
        let mut c = Container::create(&store_path(&dir)).unwrap();
        c.create_table("/t", 8, false).unwrap();
        assert!(matches!(
            c.ensure_width("/t", 16),
            Err(FormatError::WidthFixed(_))
        ));
    }

    #[test]
    fn duplicate_table_creation_fails() {
        let dir = tempdir().unwrap();
        let mut c = Container::create(&store_path(&dir)).unwrap();
        c.create_table("/t", 8, false).unwrap();
        assert!(matches!(
            c.create_table("/t", 8, false),
            Err(FormatError::TableExists(_))
        ));
    }

    #[test]
    fn torn_tail_is_ignored_on_open() {
        let dir = tempdir().unwrap();
        let path = store_path(&dir);

        let mut c = Container::create(&path).unwrap();
        c.create_table("/t", 2, false).unwrap();
        c.write_row("/t", 0, &[5, 6]).unwrap();
        c.finish().unwrap();

        // Simulate a crash mid-frame: trailing garbage too short to parse.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[6, 200, 0]);
        std::fs::write(&path, &bytes).unwrap();

        let mut c = Container::open(&path).unwrap();
        assert_eq!(c.read_row("/t", 0).unwrap(), vec![5, 6]);
    }

    #[test]
    fn appends_after_torn_tail_recover_the_file() {
        let dir = tempdir().unwrap();
        let path = store_path(&dir);

        let mut c = Container::create(&path).unwrap();
        c.create_table("/t", 2, false).unwrap();
        c.finish().unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[6, 1, 2]);
        std::fs::write(&path, &bytes).unwrap();

        let mut c = Container::open(&path).unwrap();
        c.write_row("/t", 0, &[3, 4]).unwrap();
        c.finish().unwrap();

        let mut c = Container::open(&path).unwrap();
        assert_eq!(c.read_row("/t", 0).unwrap(), vec![3, 4]);
    }

    // A whole frame that landed without its checksum: kind, length, payload,
    // and a CRC that never matches. Parses as a torn tail at end-of-file.
    fn frame_shaped_torn_tail(payload_len: u32) -> Vec<u8> {
        let mut tail = vec![1u8]; // CreateGroup kind
        tail.extend_from_slice(&payload_len.to_le_bytes());
        tail.extend(std::iter::repeat_n(0xAB, payload_len as usize));
        tail.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        tail
    }

    #[test]
    fn open_truncates_torn_tail_to_committed_end() {
        let dir = tempdir().unwrap();
        let path = store_path(&dir);

        let mut c = Container::create(&path).unwrap();
        c.create_table("/t", 2, false).unwrap();
        c.write_row("/t", 0, &[5, 6]).unwrap();
        c.finish().unwrap();

        let committed = std::fs::metadata(&path).unwrap().len();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&frame_shaped_torn_tail(40));
        std::fs::write(&path, &bytes).unwrap();

        let c = Container::open(&path).unwrap();
        drop(c);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), committed);
    }

    #[test]
    fn recovery_append_shorter_than_torn_tail_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = store_path(&dir);

        let mut c = Container::create(&path).unwrap();
        c.create_table("/t", 2, false).unwrap();
        c.finish().unwrap();

        // Torn region much longer than the single row frame appended below.
        // Without truncation its stale remainder would sit after the new
        // frame and the second reopen would misread it mid-file.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&frame_shaped_torn_tail(64));
        std::fs::write(&path, &bytes).unwrap();

        let mut c = Container::open(&path).unwrap();
        c.write_row("/t", 0, &[3, 4]).unwrap();
        c.finish().unwrap();

        let mut c = Container::open(&path).unwrap();
        assert_eq!(c.read_row("/t", 0).unwrap(), vec![3, 4]);
        drop(c);
        let mut c = Container::open(&path).unwrap();
        assert_eq!(c.read_row("/t", 0).unwrap(), vec![3, 4]);
    }

    #[test]
    fn damage_before_committed_frames_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = store_path(&dir);

        let mut c = Container::create(&path).unwrap();
        c.create_table("/t", 2, false).unwrap();
        c.write_row("/t", 0, &[5, 6]).unwrap();
        c.finish().unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        // Flip one byte inside the first frame's payload.
        bytes[frames::CONTAINER_HEADER_BYTES + 6] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            Container::open(&path),
            Err(FormatError::Corrupt(_))
        ));
    }

    #[test]
    fn non_store_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = store_path(&dir);
        std::fs::write(&path, b"definitely not a container").unwrap();
        assert!(matches!(
            Container::open(&path),
            Err(FormatError::NotAStore(_))
        ));
    }

    #[test]
    fn groups_with_prefix_sorts_matches() {
        let dir = tempdir().unwrap();
        let mut c = Container::create(&store_path(&dir)).unwrap();
        c.ensure_group("/iterations").unwrap();
        c.ensure_group("/iterations/iter_00000002").unwrap();
        c.ensure_group("/iterations/iter_00000001").unwrap();
        c.ensure_group("/ibstates").unwrap();
        assert_eq!(
            c.groups_with_prefix("/iterations/iter_"),
            vec!["/iterations/iter_00000001", "/iterations/iter_00000002"]
        );
    }
}
