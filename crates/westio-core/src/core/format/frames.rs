//! Wire encoding of the container: file header and CRC-checked frames.
//!
//! A container file is:
//! - one fixed 16-byte header (`magic[4]`, `version: u32`, reserved `u64`)
//! - zero or more variable-size frames, back-to-back, no padding
//!
//! Each frame is `kind: u8`, `payload_len: u32`, payload, `crc32: u32` over
//! everything before the checksum. All integers are little-endian. A torn
//! final frame (incomplete bytes, or a checksum failure that reaches exactly
//! to end-of-file) is tolerated during replay; a checksum failure anywhere
//! else is corruption.

use super::FormatError;

/// Magic bytes at the start of every container file (`"WESF"`).
pub const CONTAINER_MAGIC: [u8; 4] = *b"WESF";
/// Current container encoding version.
pub const CONTAINER_VERSION: u32 = 1;
/// Exact byte size of the file header.
pub const CONTAINER_HEADER_BYTES: usize = 16;

const FRAME_KIND_CREATE_GROUP: u8 = 1;
const FRAME_KIND_SET_ATTR: u8 = 2;
const FRAME_KIND_CREATE_TABLE: u8 = 3;
const FRAME_KIND_GROW_ROWS: u8 = 4;
const FRAME_KIND_GROW_WIDTH: u8 = 5;
const FRAME_KIND_WRITE_ROW: u8 = 6;

const ATTR_TAG_UINT: u8 = 0;
const ATTR_TAG_STR: u8 = 1;

/// Encodes the fixed file header.
pub fn encode_header() -> [u8; CONTAINER_HEADER_BYTES] {
    let mut out = [0u8; CONTAINER_HEADER_BYTES];
    out[0..4].copy_from_slice(&CONTAINER_MAGIC);
    out[4..8].copy_from_slice(&CONTAINER_VERSION.to_le_bytes());
    out
}

/// Validates the fixed file header.
pub fn decode_header(bytes: &[u8]) -> Result<(), FormatError> {
    if bytes.len() < CONTAINER_HEADER_BYTES {
        return Err(FormatError::NotAStore(format!(
            "file too short for header: {} bytes",
            bytes.len()
        )));
    }
    if bytes[0..4] != CONTAINER_MAGIC {
        return Err(FormatError::NotAStore(format!(
            "invalid magic: {:02X?}",
            &bytes[0..4]
        )));
    }
    let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if version != CONTAINER_VERSION {
        return Err(FormatError::NotAStore(format!(
            "unsupported container version {version}, expected {CONTAINER_VERSION}"
        )));
    }
    Ok(())
}

/// A typed attribute value attached to the file root or to a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    UInt(u64),
    Str(String),
}

impl AttrValue {
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            AttrValue::UInt(v) => Some(*v),
            AttrValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::UInt(_) => None,
            AttrValue::Str(s) => Some(s),
        }
    }
}

/// One logical mutation of the container.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    CreateGroup {
        path: String,
    },
    SetAttr {
        path: String,
        name: String,
        value: AttrValue,
    },
    CreateTable {
        path: String,
        width: u32,
        compressed: bool,
        initial_rows: u64,
    },
    GrowRows {
        path: String,
        new_len: u64,
    },
    GrowWidth {
        path: String,
        new_width: u32,
    },
    WriteRow {
        path: String,
        index: u64,
        /// Uncompressed (logical) length of the row payload.
        raw_len: u32,
        /// Stored bytes; deflated when the table is compressed.
        data: Vec<u8>,
    },
}

/// An encoded frame ready to be appended to the file.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    /// Offset of the row payload within `bytes`, for `WriteRow` frames.
    pub data_offset: Option<usize>,
}

/// A frame decoded during replay.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub frame: Frame,
    /// Total bytes consumed from the input, including checksum.
    pub consumed: usize,
    /// Offset of the row payload within the input slice, for `WriteRow`.
    pub data_offset: Option<usize>,
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    debug_assert!(s.len() <= u16::MAX as usize);
    buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], FormatError> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.buf.len());
        match end {
            Some(end) => {
                let out = &self.buf[self.pos..end];
                self.pos = end;
                Ok(out)
            }
            None => Err(FormatError::Corrupt(format!(
                "frame payload truncated while reading {what}"
            ))),
        }
    }

    fn u8(&mut self, what: &str) -> Result<u8, FormatError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16, FormatError> {
        let b = self.take(2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, what: &str) -> Result<u32, FormatError> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self, what: &str) -> Result<u64, FormatError> {
        let b = self.take(8, what)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn str(&mut self, what: &str) -> Result<String, FormatError> {
        let len = self.u16(what)? as usize;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| FormatError::Corrupt(format!("non-UTF-8 string in {what}")))
    }
}

impl Frame {
    fn kind(&self) -> u8 {
        match self {
            Frame::CreateGroup { .. } => FRAME_KIND_CREATE_GROUP,
            Frame::SetAttr { .. } => FRAME_KIND_SET_ATTR,
            Frame::CreateTable { .. } => FRAME_KIND_CREATE_TABLE,
            Frame::GrowRows { .. } => FRAME_KIND_GROW_ROWS,
            Frame::GrowWidth { .. } => FRAME_KIND_GROW_WIDTH,
            Frame::WriteRow { .. } => FRAME_KIND_WRITE_ROW,
        }
    }

    /// Encodes the frame to its wire representation.
    pub fn encode(&self) -> EncodedFrame {
        let mut payload = Vec::new();
        let mut data_offset_in_payload = None;
        match self {
            Frame::CreateGroup { path } => put_str(&mut payload, path),
            Frame::SetAttr { path, name, value } => {
                put_str(&mut payload, path);
                put_str(&mut payload, name);
                match value {
                    AttrValue::UInt(v) => {
                        payload.push(ATTR_TAG_UINT);
                        payload.extend_from_slice(&v.to_le_bytes());
                    }
                    AttrValue::Str(s) => {
                        payload.push(ATTR_TAG_STR);
                        payload.extend_from_slice(&(s.len() as u32).to_le_bytes());
                        payload.extend_from_slice(s.as_bytes());
                    }
                }
            }
            Frame::CreateTable {
                path,
                width,
                compressed,
                initial_rows,
            } => {
                put_str(&mut payload, path);
                payload.extend_from_slice(&width.to_le_bytes());
                payload.push(u8::from(*compressed));
                payload.extend_from_slice(&initial_rows.to_le_bytes());
            }
            Frame::GrowRows { path, new_len } => {
                put_str(&mut payload, path);
                payload.extend_from_slice(&new_len.to_le_bytes());
            }
            Frame::GrowWidth { path, new_width } => {
                put_str(&mut payload, path);
                payload.extend_from_slice(&new_width.to_le_bytes());
            }
            Frame::WriteRow {
                path,
                index,
                raw_len,
                data,
            } => {
                put_str(&mut payload, path);
                payload.extend_from_slice(&index.to_le_bytes());
                payload.extend_from_slice(&raw_len.to_le_bytes());
                payload.extend_from_slice(&(data.len() as u32).to_le_bytes());
                data_offset_in_payload = Some(payload.len());
                payload.extend_from_slice(data);
            }
        }

        let mut bytes = Vec::with_capacity(payload.len() + 9);
        bytes.push(self.kind());
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());

        EncodedFrame {
            data_offset: data_offset_in_payload.map(|o| o + 5),
            bytes,
        }
    }

    /// Decodes the next frame from `buf`.
    ///
    /// Returns `Ok(None)` when the remaining bytes are a torn tail (an
    /// incomplete frame, or a checksum failure that reaches exactly to
    /// end-of-file). A checksum failure on a frame with committed bytes
    /// after it is corruption.
    pub fn decode(buf: &[u8]) -> Result<Option<DecodedFrame>, FormatError> {
        if buf.len() < 9 {
            return Ok(None);
        }
        let kind = buf[0];
        let payload_len = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        let frame_len = match payload_len.checked_add(9) {
            Some(l) if l <= buf.len() => l,
            _ => return Ok(None),
        };

        let stored_crc = u32::from_le_bytes([
            buf[frame_len - 4],
            buf[frame_len - 3],
            buf[frame_len - 2],
            buf[frame_len - 1],
        ]);
        let computed_crc = crc32fast::hash(&buf[..frame_len - 4]);
        if stored_crc != computed_crc {
            if frame_len == buf.len() {
                // Torn final frame; ignored by replay.
                return Ok(None);
            }
            return Err(FormatError::Corrupt(format!(
                "frame checksum mismatch: stored {stored_crc:#010X}, computed {computed_crc:#010X}"
            )));
        }

        let mut cur = Cursor {
            buf: &buf[5..frame_len - 4],
            pos: 0,
        };
        let mut data_offset = None;
        let frame = match kind {
            FRAME_KIND_CREATE_GROUP => Frame::CreateGroup {
                path: cur.str("group path")?,
            },
            FRAME_KIND_SET_ATTR => {
                let path = cur.str("attr path")?;
                let name = cur.str("attr name")?;
                let value = match cur.u8("attr tag")? {
                    ATTR_TAG_UINT => AttrValue::UInt(cur.u64("attr value")?),
                    ATTR_TAG_STR => {
                        let len = cur.u32("attr string length")? as usize;
                        let bytes = cur.take(len, "attr string")?;
                        AttrValue::Str(String::from_utf8(bytes.to_vec()).map_err(|_| {
                            FormatError::Corrupt("non-UTF-8 attribute value".to_string())
                        })?)
                    }
                    tag => {
                        return Err(FormatError::Corrupt(format!(
                            "unknown attribute tag {tag}"
                        )));
                    }
                };
                Frame::SetAttr { path, name, value }
            }
            FRAME_KIND_CREATE_TABLE => Frame::CreateTable {
                path: cur.str("table path")?,
                width: cur.u32("table width")?,
                compressed: cur.u8("table flags")? & 1 != 0,
                initial_rows: cur.u64("initial rows")?,
            },
            FRAME_KIND_GROW_ROWS => Frame::GrowRows {
                path: cur.str("table path")?,
                new_len: cur.u64("new length")?,
            },
            FRAME_KIND_GROW_WIDTH => Frame::GrowWidth {
                path: cur.str("table path")?,
                new_width: cur.u32("new width")?,
            },
            FRAME_KIND_WRITE_ROW => {
                let path = cur.str("table path")?;
                let index = cur.u64("row index")?;
                let raw_len = cur.u32("raw length")?;
                let data_len = cur.u32("data length")? as usize;
                let start = cur.pos;
                let data = cur.take(data_len, "row data")?.to_vec();
                data_offset = Some(5 + start);
                Frame::WriteRow {
                    path,
                    index,
                    raw_len,
                    data,
                }
            }
            kind => {
                return Err(FormatError::Corrupt(format!("unknown frame kind {kind}")));
            }
        };

        if cur.pos != cur.buf.len() {
            return Err(FormatError::Corrupt(format!(
                "frame kind {kind} carries {} trailing payload bytes",
                cur.buf.len() - cur.pos
            )));
        }

        Ok(Some(DecodedFrame {
            frame,
            consumed: frame_len,
            data_offset,
        }))
    }
}
