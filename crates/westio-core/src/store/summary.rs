//! Per-iteration summary aggregation.

use tracing::debug;

use super::error::{Result, StoreError};
use crate::core::format::container::Container;
use crate::core::format::schema::{SUMMARY_ROW_BYTES, SummaryRow};
use crate::core::models::replica::Replica;

/// Path of the summary table.
pub const SUMMARY_TABLE: &str = "/summary";

/// Width of one summary row.
pub const SUMMARY_WIDTH: u32 = SUMMARY_ROW_BYTES as u32;

/// Computes the aggregate row for iteration `n_iter`.
///
/// Rejects an empty replica list or an empty bin partition outright: an
/// iteration with zero segments has no norm and no min/max, so it is refused
/// rather than written with sentinel values.
pub(crate) fn compute_summary(
    n_iter: u64,
    next_iteration: &[Replica],
    binned_sims: &[Vec<Replica>],
) -> Result<SummaryRow> {
    if next_iteration.is_empty() {
        return Err(StoreError::EmptyIteration("next_iteration"));
    }
    if binned_sims.is_empty() {
        return Err(StoreError::EmptyIteration("binned_sims"));
    }
    if n_iter == 0 {
        return Err(StoreError::InvalidIteration);
    }

    let norm: f64 = next_iteration.iter().map(|r| r.weight).sum();
    let min_seg_prob = next_iteration
        .iter()
        .map(|r| r.weight)
        .fold(f64::INFINITY, f64::min);
    let max_seg_prob = next_iteration
        .iter()
        .map(|r| r.weight)
        .fold(f64::NEG_INFINITY, f64::max);

    let bin_weights = binned_sims
        .iter()
        .map(|bin| bin.iter().map(|r| r.weight).sum::<f64>());
    let min_bin_prob = bin_weights.clone().fold(f64::INFINITY, f64::min);
    let max_bin_prob = bin_weights.fold(f64::NEG_INFINITY, f64::max);

    // All replicas in one iteration share a binning topology by
    // construction; the first is representative.
    let binhash = *next_iteration[0].topology.hash().as_bytes();

    Ok(SummaryRow {
        n_particles: next_iteration.len() as u64,
        norm,
        min_bin_prob,
        max_bin_prob,
        min_seg_prob,
        max_seg_prob,
        // Timing aggregation is not yet wired to the simulation executor.
        cputime: 0.0,
        walltime: 0.0,
        binhash,
    })
}

/// Writes the summary row for iteration `n_iter`.
///
/// Grows the table when it is shorter than `n_iter`, then writes row
/// `n_iter - 1`: iteration numbering is 1-based against 0-based row storage,
/// so iteration 1 occupies row 0.
pub(crate) fn append_summary(
    container: &mut Container,
    n_iter: u64,
    next_iteration: &[Replica],
    binned_sims: &[Vec<Replica>],
) -> Result<()> {
    let row = compute_summary(n_iter, next_iteration, binned_sims)?;
    if container.table_len(SUMMARY_TABLE)? < n_iter {
        container.ensure_rows(SUMMARY_TABLE, n_iter + 1)?;
    }
    container.write_row(SUMMARY_TABLE, n_iter - 1, &row.encode())?;
    debug!(
        n_iter,
        n_particles = row.n_particles,
        norm = row.norm,
        "wrote summary row"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::replica::BinTopologySnapshot;
    use tempfile::tempdir;

    fn replica(n_iter: u64, id: u64, weight: f64) -> Replica {
        Replica::new(
            n_iter,
            id,
            weight,
            vec![0.0],
            BinTopologySnapshot::new(vec![1, 2, 3]),
        )
    }

    #[test]
    fn norm_equals_sum_of_weights() {
        let reps = vec![replica(1, 0, 0.6), replica(1, 1, 0.4)];
        let bins = vec![reps.clone()];
        let row = compute_summary(1, &reps, &bins).unwrap();
        assert_eq!(row.n_particles, 2);
        assert!((row.norm - 1.0).abs() < 1e-12);
        assert_eq!(row.min_seg_prob, 0.4);
        assert_eq!(row.max_seg_prob, 0.6);
        assert_eq!(row.min_bin_prob, 1.0);
        assert_eq!(row.max_bin_prob, 1.0);
        assert_eq!(row.cputime, 0.0);
        assert_eq!(row.walltime, 0.0);
    }

    #[test]
    fn bin_extrema_come_from_per_bin_sums() {
        let reps = vec![replica(1, 0, 0.5), replica(1, 1, 0.3), replica(1, 2, 0.2)];
        let bins = vec![
            vec![reps[0].clone()],
            vec![reps[1].clone(), reps[2].clone()],
        ];
        let row = compute_summary(1, &reps, &bins).unwrap();
        assert!((row.min_bin_prob - 0.5).abs() < 1e-12);
        assert!((row.max_bin_prob - 0.5).abs() < 1e-12);
    }

    #[test]
    fn binhash_comes_from_first_replica() {
        let reps = vec![replica(1, 0, 1.0)];
        let row = compute_summary(1, &reps, &[reps.clone()]).unwrap();
        assert_eq!(&row.binhash, reps[0].topology.hash().as_bytes());
    }

    #[test]
    fn empty_replica_list_is_rejected() {
        assert!(matches!(
            compute_summary(1, &[], &[vec![]]),
            Err(StoreError::EmptyIteration("next_iteration"))
        ));
    }

    #[test]
    fn empty_bin_partition_is_rejected() {
        let reps = vec![replica(1, 0, 1.0)];
        assert!(matches!(
            compute_summary(1, &reps, &[]),
            Err(StoreError::EmptyIteration("binned_sims"))
        ));
    }

    #[test]
    fn iteration_zero_is_rejected() {
        let reps = vec![replica(0, 0, 1.0)];
        assert!(matches!(
            compute_summary(0, &reps, &[reps.clone()]),
            Err(StoreError::InvalidIteration)
        ));
    }

    #[test]
    fn iteration_one_lands_in_row_zero_without_growth() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.west");
        let mut c = Container::create(&path).unwrap();
        c.create_table(SUMMARY_TABLE, SUMMARY_WIDTH, false).unwrap();

        let reps = vec![replica(1, 0, 0.6), replica(1, 1, 0.4)];
        append_summary(&mut c, 1, &reps, &[reps.clone()]).unwrap();

        assert_eq!(c.table_len(SUMMARY_TABLE).unwrap(), 1);
        let row = SummaryRow::decode(&c.read_row(SUMMARY_TABLE, 0).unwrap()).unwrap();
        assert_eq!(row.n_particles, 2);
    }

    #[test]
    fn later_iterations_grow_the_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.west");
        let mut c = Container::create(&path).unwrap();
        c.create_table(SUMMARY_TABLE, SUMMARY_WIDTH, false).unwrap();

        let reps = vec![replica(3, 0, 1.0)];
        append_summary(&mut c, 3, &reps, &[reps.clone()]).unwrap();

        assert!(c.table_len(SUMMARY_TABLE).unwrap() >= 3);
        let row = SummaryRow::decode(&c.read_row(SUMMARY_TABLE, 2).unwrap()).unwrap();
        assert_eq!(row.n_particles, 1);
    }
}
