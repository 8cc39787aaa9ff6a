use sha2::{Digest, Sha256};
use std::fmt;

/// Width of a binning-topology content digest, in bytes.
///
/// SHA-256 rendered as lowercase hexadecimal is exactly 64 ASCII bytes, which
/// matches the 64-byte hash field of the consuming toolkit's file layout.
pub const BIN_HASH_BYTES: usize = 64;

/// Content digest identifying one serialized binning topology.
///
/// Stored verbatim in the summary table and the topology index, so two
/// iterations that share a binning scheme carry equal hashes even though
/// their payload rows are stored separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinHash([u8; BIN_HASH_BYTES]);

impl BinHash {
    /// Computes the digest of a serialized binning topology.
    pub fn of(serialized: &[u8]) -> Self {
        let digest = Sha256::digest(serialized);
        let mut out = [0u8; BIN_HASH_BYTES];
        let mut i = 0;
        for byte in digest {
            let hi = byte >> 4;
            let lo = byte & 0x0f;
            out[i] = HEX_DIGITS[hi as usize];
            out[i + 1] = HEX_DIGITS[lo as usize];
            i += 2;
        }
        Self(out)
    }

    /// Returns the raw 64-byte hexadecimal form written to disk.
    pub fn as_bytes(&self) -> &[u8; BIN_HASH_BYTES] {
        &self.0
    }
}

const HEX_DIGITS: [u8; 16] = *b"0123456789abcdef";

impl From<[u8; BIN_HASH_BYTES]> for BinHash {
    fn from(raw: [u8; BIN_HASH_BYTES]) -> Self {
        Self(raw)
    }
}

impl fmt::Display for BinHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Always ASCII by construction.
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// The serialized binning scheme in effect for an iteration.
///
/// Owns the opaque serialized bytes produced by the orchestrator's binner and
/// the content digest computed over them. Computing the digest at
/// construction guarantees the summary row and the topology index can never
/// disagree about which topology an iteration used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinTopologySnapshot {
    serialized: Vec<u8>,
    hash: BinHash,
}

impl BinTopologySnapshot {
    /// Wraps serialized binner bytes, computing their content digest.
    pub fn new(serialized: Vec<u8>) -> Self {
        let hash = BinHash::of(&serialized);
        Self { serialized, hash }
    }

    pub fn serialized(&self) -> &[u8] {
        &self.serialized
    }

    pub fn hash(&self) -> BinHash {
        self.hash
    }

    /// Serialized payload length in bytes.
    pub fn len(&self) -> usize {
        self.serialized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serialized.is_empty()
    }
}

/// One simulated trajectory segment within an iteration.
///
/// Carries the metadata the store records for a segment: its statistical
/// weight, its progress coordinate, and the binning topology under which it
/// was assigned to a bin. Lineage and restart-file bookkeeping live with the
/// simulation executor, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct Replica {
    /// Iteration this segment belongs to (1-based; iteration 1 is the first).
    pub iteration_id: u64,
    /// Identifier of the segment within the campaign.
    pub simulation_id: u64,
    /// Statistical weight of the segment. Weights across one iteration
    /// should sum to 1.0; the store records them verbatim.
    pub weight: f64,
    /// Progress-coordinate value at the end of the segment.
    pub pcoord: Vec<f64>,
    /// Binning topology under which this segment was binned.
    pub topology: BinTopologySnapshot,
}

impl Replica {
    pub fn new(
        iteration_id: u64,
        simulation_id: u64,
        weight: f64,
        pcoord: Vec<f64>,
        topology: BinTopologySnapshot,
    ) -> Self {
        Self {
            iteration_id,
            simulation_id,
            weight,
            pcoord,
            topology,
        }
    }
}
