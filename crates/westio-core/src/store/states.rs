//! Basis- and target-state epoch writers.
//!
//! Both state kinds share one on-disk pattern: a growable `index` table whose
//! rows carry a weak back-reference to a per-epoch subgroup holding the state
//! detail table and the progress-coordinate matrix. The two kinds differ only
//! in their detail-row shape and table names, so one generic writer is
//! parameterized by a [`StateSetLayout`].

use tracing::debug;

use super::error::{Result, StoreError};
use crate::core::format::FormatError;
use crate::core::format::container::Container;
use crate::core::format::schema::{
    self, BASIS_STATE_ROW_BYTES, STATE_INDEX_ROW_BYTES, STATE_LABEL_BYTES, StateIndexRow,
    TARGET_STATE_ROW_BYTES,
};
use crate::core::models::states::{BasisState, TargetState};

/// Group and table names for one state-set kind.
#[derive(Debug, Clone, Copy)]
struct StateSetLayout {
    group: &'static str,
    detail_table: &'static str,
    pcoord_table: &'static str,
    row_width: u32,
}

const BASIS_LAYOUT: StateSetLayout = StateSetLayout {
    group: "/ibstates",
    detail_table: "bstate_index",
    pcoord_table: "bstate_pcoord",
    row_width: BASIS_STATE_ROW_BYTES as u32,
};

const TARGET_LAYOUT: StateSetLayout = StateSetLayout {
    group: "/tstates",
    detail_table: "index",
    pcoord_table: "pcoord",
    row_width: TARGET_STATE_ROW_BYTES as u32,
};

fn pack_label_checked(label: &str) -> Result<[u8; STATE_LABEL_BYTES]> {
    schema::pack_label(label).ok_or_else(|| StoreError::LabelTooLong {
        label: label.to_string(),
        max: STATE_LABEL_BYTES,
    })
}

/// Appends one epoch entry for either state kind.
///
/// Grows the index by one row recording `{iter_valid, count, group_ref}`.
/// When the set is non-empty, a subgroup named by the index ordinal receives
/// the detail table and the pcoord matrix, and the back-reference points at
/// it; an empty set leaves the reference null and creates nothing, which is
/// a legitimate case, not an error.
fn append_state_epoch(
    container: &mut Container,
    layout: StateSetLayout,
    n_iter: u64,
    detail_rows: &[Vec<u8>],
    pcoords: &[Vec<f64>],
) -> Result<()> {
    debug_assert_eq!(detail_rows.len(), pcoords.len());
    container.ensure_group(layout.group)?;

    let index_path = format!("{}/index", layout.group);
    let set_id = if container.has_table(&index_path) {
        let len = container.table_len(&index_path)?;
        container.ensure_rows(&index_path, len + 1)?;
        len
    } else {
        container.create_table(&index_path, STATE_INDEX_ROW_BYTES as u32, false)?;
        0
    };

    let count = detail_rows.len() as u64;
    let group_ref = if count > 0 {
        let subgroup = format!("{}/{}", layout.group, set_id);
        container.ensure_group(&subgroup)?;

        let detail_path = format!("{}/{}", subgroup, layout.detail_table);
        container.create_table(&detail_path, layout.row_width, false)?;
        container.ensure_rows(&detail_path, count)?;
        for (i, row) in detail_rows.iter().enumerate() {
            container.write_row(&detail_path, i as u64, row)?;
        }

        // One pcoord row per state; all states in an epoch must share a
        // dimensionality, as the matrix has a single row width.
        let ndim = pcoords[0].len();
        let pcoord_path = format!("{}/{}", subgroup, layout.pcoord_table);
        container.create_table(&pcoord_path, (ndim * 8) as u32, false)?;
        container.ensure_rows(&pcoord_path, count)?;
        for (i, pcoord) in pcoords.iter().enumerate() {
            if pcoord.len() != ndim {
                return Err(StoreError::Format(FormatError::SchemaMismatch {
                    table: pcoord_path.clone(),
                    expected: (ndim * 8) as u32,
                    actual: pcoord.len() * 8,
                }));
            }
            container.write_row(&pcoord_path, i as u64, &schema::encode_pcoord_row(pcoord))?;
        }

        set_id + 1
    } else {
        schema::NULL_GROUP_REF
    };

    let index_row = StateIndexRow {
        iter_valid: n_iter,
        n_states: count,
        group_ref,
    };
    container.write_row(&index_path, set_id, &index_row.encode())?;
    debug!(
        group = layout.group,
        n_iter,
        set_id,
        n_states = count,
        "appended state epoch"
    );
    Ok(())
}

/// Appends a basis-state epoch valid from iteration `n_iter`.
///
/// Selection probabilities are recorded verbatim; the store does not check
/// that they sum to one.
pub(crate) fn append_basis_states(
    container: &mut Container,
    n_iter: u64,
    states: &[BasisState],
) -> Result<()> {
    let mut detail_rows = Vec::with_capacity(states.len());
    let mut pcoords = Vec::with_capacity(states.len());
    for state in states {
        let row = schema::BasisStateRow {
            label: pack_label_checked(&state.label)?,
            probability: state.probability,
            auxref: pack_label_checked(state.auxref.as_deref().unwrap_or(""))?,
        };
        detail_rows.push(row.encode().to_vec());
        pcoords.push(state.pcoord.clone());
    }
    append_state_epoch(container, BASIS_LAYOUT, n_iter, &detail_rows, &pcoords)
}

/// Appends a target-state epoch valid from iteration `n_iter`. An empty set
/// records an index row with a null back-reference.
pub(crate) fn append_target_states(
    container: &mut Container,
    n_iter: u64,
    states: &[TargetState],
) -> Result<()> {
    let mut detail_rows = Vec::with_capacity(states.len());
    let mut pcoords = Vec::with_capacity(states.len());
    for state in states {
        let row = schema::TargetStateRow {
            label: pack_label_checked(&state.label)?,
        };
        detail_rows.push(row.encode().to_vec());
        pcoords.push(state.pcoord.clone());
    }
    append_state_epoch(container, TARGET_LAYOUT, n_iter, &detail_rows, &pcoords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format::schema::{BasisStateRow, TargetStateRow, unpack_label};
    use tempfile::tempdir;

    fn fresh_container(dir: &tempfile::TempDir) -> Container {
        Container::create(&dir.path().join("s.west")).unwrap()
    }

    #[test]
    fn basis_epoch_writes_index_subgroup_and_pcoords() {
        let dir = tempdir().unwrap();
        let mut c = fresh_container(&dir);
        let states = vec![
            BasisState::new("A", 0.7, vec![1.0, 2.0]).with_auxref("bstates/a.rst"),
            BasisState::new("B", 0.3, vec![3.0, 4.0]),
        ];
        append_basis_states(&mut c, 2, &states).unwrap();

        assert_eq!(c.table_len("/ibstates/index").unwrap(), 1);
        let index =
            StateIndexRow::decode(&c.read_row("/ibstates/index", 0).unwrap()).unwrap();
        assert_eq!(index.iter_valid, 2);
        assert_eq!(index.n_states, 2);
        assert_eq!(index.subgroup_ordinal(), Some(0));
        assert!(c.has_group("/ibstates/0"));

        assert_eq!(c.table_len("/ibstates/0/bstate_index").unwrap(), 2);
        let row0 =
            BasisStateRow::decode(&c.read_row("/ibstates/0/bstate_index", 0).unwrap()).unwrap();
        assert_eq!(unpack_label(&row0.label), "A");
        assert_eq!(row0.probability, 0.7);
        assert_eq!(unpack_label(&row0.auxref), "bstates/a.rst");
        let row1 =
            BasisStateRow::decode(&c.read_row("/ibstates/0/bstate_index", 1).unwrap()).unwrap();
        assert_eq!(unpack_label(&row1.auxref), "");

        assert_eq!(c.table_len("/ibstates/0/bstate_pcoord").unwrap(), 2);
        assert_eq!(c.table_width("/ibstates/0/bstate_pcoord").unwrap(), 16);
        let pcoord =
            schema::decode_pcoord_row(&c.read_row("/ibstates/0/bstate_pcoord", 1).unwrap())
                .unwrap();
        assert_eq!(pcoord, vec![3.0, 4.0]);
    }

    #[test]
    fn empty_target_epoch_has_null_ref_and_no_subgroup() {
        let dir = tempdir().unwrap();
        let mut c = fresh_container(&dir);
        append_target_states(&mut c, 2, &[]).unwrap();

        assert_eq!(c.table_len("/tstates/index").unwrap(), 1);
        let index = StateIndexRow::decode(&c.read_row("/tstates/index", 0).unwrap()).unwrap();
        assert_eq!(index.n_states, 0);
        assert_eq!(index.subgroup_ordinal(), None);
        assert!(!c.has_group("/tstates/0"));
    }

    #[test]
    fn non_empty_target_epoch_writes_labels_and_pcoords() {
        let dir = tempdir().unwrap();
        let mut c = fresh_container(&dir);
        let states = vec![TargetState::new("folded", vec![0.25])];
        append_target_states(&mut c, 3, &states).unwrap();

        let index = StateIndexRow::decode(&c.read_row("/tstates/index", 0).unwrap()).unwrap();
        assert_eq!(index.iter_valid, 3);
        assert_eq!(index.n_states, 1);
        assert_eq!(index.subgroup_ordinal(), Some(0));

        let row = TargetStateRow::decode(&c.read_row("/tstates/0/index", 0).unwrap()).unwrap();
        assert_eq!(unpack_label(&row.label), "folded");
        let pcoord =
            schema::decode_pcoord_row(&c.read_row("/tstates/0/pcoord", 0).unwrap()).unwrap();
        assert_eq!(pcoord, vec![0.25]);
    }

    #[test]
    fn successive_epochs_take_successive_ordinals() {
        let dir = tempdir().unwrap();
        let mut c = fresh_container(&dir);
        append_target_states(&mut c, 2, &[TargetState::new("t", vec![0.0])]).unwrap();
        append_target_states(&mut c, 5, &[]).unwrap();
        append_target_states(&mut c, 9, &[TargetState::new("u", vec![1.0])]).unwrap();

        assert_eq!(c.table_len("/tstates/index").unwrap(), 3);
        let rows: Vec<StateIndexRow> = (0..3)
            .map(|i| StateIndexRow::decode(&c.read_row("/tstates/index", i).unwrap()).unwrap())
            .collect();
        assert_eq!(rows[0].subgroup_ordinal(), Some(0));
        assert_eq!(rows[1].subgroup_ordinal(), None);
        assert_eq!(rows[2].subgroup_ordinal(), Some(2));
        assert!(c.has_group("/tstates/2"));
        assert!(!c.has_group("/tstates/1"));
    }

    #[test]
    fn ragged_pcoords_are_a_schema_mismatch() {
        let dir = tempdir().unwrap();
        let mut c = fresh_container(&dir);
        let states = vec![
            BasisState::new("A", 0.5, vec![1.0, 2.0]),
            BasisState::new("B", 0.5, vec![1.0]),
        ];
        assert!(matches!(
            append_basis_states(&mut c, 2, &states),
            Err(StoreError::Format(FormatError::SchemaMismatch { .. }))
        ));
    }

    #[test]
    fn oversized_label_is_rejected() {
        let dir = tempdir().unwrap();
        let mut c = fresh_container(&dir);
        let states = vec![BasisState::new(&"x".repeat(65), 1.0, vec![0.0])];
        assert!(matches!(
            append_basis_states(&mut c, 2, &states),
            Err(StoreError::LabelTooLong { .. })
        ));
    }

    #[test]
    fn probabilities_are_recorded_verbatim() {
        let dir = tempdir().unwrap();
        let mut c = fresh_container(&dir);
        // Deliberately not normalized.
        let states = vec![
            BasisState::new("A", 2.0, vec![0.0]),
            BasisState::new("B", 3.0, vec![0.0]),
        ];
        append_basis_states(&mut c, 2, &states).unwrap();
        let row =
            BasisStateRow::decode(&c.read_row("/ibstates/0/bstate_index", 1).unwrap()).unwrap();
        assert_eq!(row.probability, 3.0);
    }
}
