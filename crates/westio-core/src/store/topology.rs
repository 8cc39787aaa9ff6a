//! Content-addressed storage of binning-topology snapshots.
//!
//! Each appended snapshot takes one row in the `index` table (content digest
//! plus serialized length) and one row in the width-growable, compressed
//! `pickles` matrix (the raw serialized bytes, left-justified). No
//! lookup-before-insert is performed: identical snapshots across iterations
//! are stored redundantly so that downstream readers keep one row per append.

use tracing::debug;

use super::error::Result;
use crate::core::format::container::Container;
use crate::core::format::schema::{TOPOLOGY_INDEX_ROW_BYTES, TopologyIndexRow};
use crate::core::models::replica::BinTopologySnapshot;

/// Group holding the topology tables.
pub const TOPOLOGY_GROUP: &str = "/bin_topologies";
/// Path of the digest/length index table.
pub const TOPOLOGY_INDEX_TABLE: &str = "/bin_topologies/index";
/// Path of the serialized-payload matrix.
pub const TOPOLOGY_PICKLES_TABLE: &str = "/bin_topologies/pickles";

/// Appends one topology snapshot, growing both tables by one row and widening
/// the payload matrix to the longest blob seen so far.
pub(crate) fn append_topology(
    container: &mut Container,
    snapshot: &BinTopologySnapshot,
) -> Result<()> {
    container.ensure_group(TOPOLOGY_GROUP)?;
    let payload = snapshot.serialized();

    let ind = if container.has_table(TOPOLOGY_INDEX_TABLE) {
        let len = container.table_len(TOPOLOGY_INDEX_TABLE)?;
        container.ensure_rows(TOPOLOGY_INDEX_TABLE, len + 1)?;
        container.ensure_rows(TOPOLOGY_PICKLES_TABLE, len + 1)?;
        container.ensure_width(TOPOLOGY_PICKLES_TABLE, payload.len() as u32)?;
        len
    } else {
        container.create_table(
            TOPOLOGY_INDEX_TABLE,
            TOPOLOGY_INDEX_ROW_BYTES as u32,
            false,
        )?;
        container.create_table(TOPOLOGY_PICKLES_TABLE, payload.len() as u32, true)?;
        0
    };

    let index_row = TopologyIndexRow {
        hash: *snapshot.hash().as_bytes(),
        pickle_len: payload.len() as u32,
    };
    container.write_row(TOPOLOGY_INDEX_TABLE, ind, &index_row.encode())?;
    container.write_row(TOPOLOGY_PICKLES_TABLE, ind, payload)?;
    debug!(
        row = ind,
        pickle_len = payload.len(),
        hash = %snapshot.hash(),
        "appended binning topology"
    );
    Ok(())
}
