//! Fixed row layouts written by the store, one encoder/decoder per record
//! shape. All integers and floats are little-endian; label fields are 64
//! bytes, NUL-padded.
//!
//! These layouts are part of the compatibility contract with the consuming
//! toolkit and must not change shape between releases.

use super::FormatError;
use crate::core::models::replica::BIN_HASH_BYTES;

/// Exact byte size of a [`SummaryRow`] on disk.
pub const SUMMARY_ROW_BYTES: usize = 8 * 8 + BIN_HASH_BYTES; // 128
/// Exact byte size of a [`StateIndexRow`] on disk.
pub const STATE_INDEX_ROW_BYTES: usize = 24;
/// Exact byte size of a [`TopologyIndexRow`] on disk.
pub const TOPOLOGY_INDEX_ROW_BYTES: usize = BIN_HASH_BYTES + 4; // 68
/// Width of a label or auxref field.
pub const STATE_LABEL_BYTES: usize = 64;
/// Exact byte size of a [`BasisStateRow`] on disk.
pub const BASIS_STATE_ROW_BYTES: usize = STATE_LABEL_BYTES + 8 + STATE_LABEL_BYTES; // 136
/// Exact byte size of a [`TargetStateRow`] on disk.
pub const TARGET_STATE_ROW_BYTES: usize = STATE_LABEL_BYTES; // 64

/// The null back-reference: an index row that points at no subgroup.
pub const NULL_GROUP_REF: u64 = 0;

fn expect_len(bytes: &[u8], expected: usize, what: &str) -> Result<(), FormatError> {
    if bytes.len() != expected {
        return Err(FormatError::Corrupt(format!(
            "{what} row is {} bytes, expected {expected}",
            bytes.len()
        )));
    }
    Ok(())
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
}

fn read_f64(bytes: &[u8], at: usize) -> f64 {
    f64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
}

/// Packs a label into its fixed NUL-padded field.
///
/// Returns `None` when the label does not fit; the caller surfaces that as a
/// domain error rather than truncating silently.
pub fn pack_label(label: &str) -> Option<[u8; STATE_LABEL_BYTES]> {
    let raw = label.as_bytes();
    if raw.len() > STATE_LABEL_BYTES {
        return None;
    }
    let mut out = [0u8; STATE_LABEL_BYTES];
    out[..raw.len()].copy_from_slice(raw);
    Some(out)
}

/// Recovers a label from its fixed field, trimming trailing NUL padding.
pub fn unpack_label(field: &[u8; STATE_LABEL_BYTES]) -> String {
    let end = field
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Aggregate ensemble statistics for one iteration.
///
/// Layout (128 bytes): `n_particles: u64`, `norm: f64`, `min_bin_prob: f64`,
/// `max_bin_prob: f64`, `min_seg_prob: f64`, `max_seg_prob: f64`,
/// `cputime: f64`, `walltime: f64`, `binhash: [u8; 64]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryRow {
    /// Number of live trajectory segments in the iteration.
    pub n_particles: u64,
    /// Sum of segment weights; watched by consumers for probability drift.
    pub norm: f64,
    pub min_bin_prob: f64,
    pub max_bin_prob: f64,
    pub min_seg_prob: f64,
    pub max_seg_prob: f64,
    /// Total CPU time for the iteration. Currently always zero; timing
    /// aggregation is not yet wired to the simulation executor.
    pub cputime: f64,
    /// Total wallclock time for the iteration. Currently always zero.
    pub walltime: f64,
    /// Content digest of the binning topology used in the iteration.
    pub binhash: [u8; BIN_HASH_BYTES],
}

impl SummaryRow {
    pub fn encode(&self) -> [u8; SUMMARY_ROW_BYTES] {
        let mut out = [0u8; SUMMARY_ROW_BYTES];
        out[0..8].copy_from_slice(&self.n_particles.to_le_bytes());
        out[8..16].copy_from_slice(&self.norm.to_le_bytes());
        out[16..24].copy_from_slice(&self.min_bin_prob.to_le_bytes());
        out[24..32].copy_from_slice(&self.max_bin_prob.to_le_bytes());
        out[32..40].copy_from_slice(&self.min_seg_prob.to_le_bytes());
        out[40..48].copy_from_slice(&self.max_seg_prob.to_le_bytes());
        out[48..56].copy_from_slice(&self.cputime.to_le_bytes());
        out[56..64].copy_from_slice(&self.walltime.to_le_bytes());
        out[64..128].copy_from_slice(&self.binhash);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        expect_len(bytes, SUMMARY_ROW_BYTES, "summary")?;
        let mut binhash = [0u8; BIN_HASH_BYTES];
        binhash.copy_from_slice(&bytes[64..128]);
        Ok(Self {
            n_particles: read_u64(bytes, 0),
            norm: read_f64(bytes, 8),
            min_bin_prob: read_f64(bytes, 16),
            max_bin_prob: read_f64(bytes, 24),
            min_seg_prob: read_f64(bytes, 32),
            max_seg_prob: read_f64(bytes, 40),
            cputime: read_f64(bytes, 48),
            walltime: read_f64(bytes, 56),
            binhash,
        })
    }
}

/// One basis- or target-state epoch entry in an `index` table.
///
/// `group_ref` is a weak relation, not an owning pointer: `0` is the explicit
/// null, and `k + 1` refers to the subgroup named `"{k}"` next to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateIndexRow {
    /// Iteration from which this state set is valid.
    pub iter_valid: u64,
    /// Number of states in the set; zero is legitimate for target states.
    pub n_states: u64,
    pub group_ref: u64,
}

impl StateIndexRow {
    /// Ordinal of the referenced subgroup, or `None` for a null reference.
    pub fn subgroup_ordinal(&self) -> Option<u64> {
        (self.group_ref != NULL_GROUP_REF).then(|| self.group_ref - 1)
    }

    pub fn encode(&self) -> [u8; STATE_INDEX_ROW_BYTES] {
        let mut out = [0u8; STATE_INDEX_ROW_BYTES];
        out[0..8].copy_from_slice(&self.iter_valid.to_le_bytes());
        out[8..16].copy_from_slice(&self.n_states.to_le_bytes());
        out[16..24].copy_from_slice(&self.group_ref.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        expect_len(bytes, STATE_INDEX_ROW_BYTES, "state index")?;
        Ok(Self {
            iter_valid: read_u64(bytes, 0),
            n_states: read_u64(bytes, 8),
            group_ref: read_u64(bytes, 16),
        })
    }
}

/// One binning-topology entry: content digest plus serialized length.
///
/// The payload itself lives in the parallel `pickles` table at the same row
/// index; `pickle_len` trims the zero-padded payload row back to the exact
/// serialized bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopologyIndexRow {
    pub hash: [u8; BIN_HASH_BYTES],
    pub pickle_len: u32,
}

impl TopologyIndexRow {
    pub fn encode(&self) -> [u8; TOPOLOGY_INDEX_ROW_BYTES] {
        let mut out = [0u8; TOPOLOGY_INDEX_ROW_BYTES];
        out[0..64].copy_from_slice(&self.hash);
        out[64..68].copy_from_slice(&self.pickle_len.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        expect_len(bytes, TOPOLOGY_INDEX_ROW_BYTES, "topology index")?;
        let mut hash = [0u8; BIN_HASH_BYTES];
        hash.copy_from_slice(&bytes[0..64]);
        Ok(Self {
            hash,
            pickle_len: u32::from_le_bytes(bytes[64..68].try_into().unwrap()),
        })
    }
}

/// One basis state in a `bstate_index` detail table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasisStateRow {
    pub label: [u8; STATE_LABEL_BYTES],
    pub probability: f64,
    pub auxref: [u8; STATE_LABEL_BYTES],
}

impl BasisStateRow {
    pub fn encode(&self) -> [u8; BASIS_STATE_ROW_BYTES] {
        let mut out = [0u8; BASIS_STATE_ROW_BYTES];
        out[0..64].copy_from_slice(&self.label);
        out[64..72].copy_from_slice(&self.probability.to_le_bytes());
        out[72..136].copy_from_slice(&self.auxref);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        expect_len(bytes, BASIS_STATE_ROW_BYTES, "basis state")?;
        let mut label = [0u8; STATE_LABEL_BYTES];
        label.copy_from_slice(&bytes[0..64]);
        let mut auxref = [0u8; STATE_LABEL_BYTES];
        auxref.copy_from_slice(&bytes[72..136]);
        Ok(Self {
            label,
            probability: read_f64(bytes, 64),
            auxref,
        })
    }
}

/// One target state in a detail `index` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetStateRow {
    pub label: [u8; STATE_LABEL_BYTES],
}

impl TargetStateRow {
    pub fn encode(&self) -> [u8; TARGET_STATE_ROW_BYTES] {
        self.label
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FormatError> {
        expect_len(bytes, TARGET_STATE_ROW_BYTES, "target state")?;
        let mut label = [0u8; STATE_LABEL_BYTES];
        label.copy_from_slice(bytes);
        Ok(Self { label })
    }
}

/// Encodes a progress-coordinate vector as one row of f64 values.
pub fn encode_pcoord_row(pcoord: &[f64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pcoord.len() * 8);
    for value in pcoord {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Decodes one pcoord row back into f64 values.
pub fn decode_pcoord_row(bytes: &[u8]) -> Result<Vec<f64>, FormatError> {
    if bytes.len() % 8 != 0 {
        return Err(FormatError::Corrupt(format!(
            "pcoord row of {} bytes is not a whole number of f64 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| f64::from_le_bytes(chunk.try_into().unwrap()))
        .collect())
}
