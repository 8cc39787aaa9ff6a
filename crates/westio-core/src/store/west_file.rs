//! The iteration-store facade.
//!
//! [`WestFile`] owns the file lifecycle: create-with-header, open-for-append,
//! and the strict write order of one `append` call. Within one session the
//! facade writes the summary row first, then (for every iteration after the
//! first) the basis-state epoch, target-state epoch, and topology blob, and
//! finally creates the iteration namespace group. That group is written last
//! on purpose: its existence is the durability marker, and readers must treat
//! an iteration without its namespace group as not yet valid.

use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use super::config::StoreConfig;
use super::error::{Result, StoreError};
use super::states::{append_basis_states, append_target_states};
use super::summary::{self, append_summary};
use super::topology::append_topology;
use crate::core::format::FormatError;
use crate::core::format::container::Container;
use crate::core::format::frames::AttrValue;
use crate::core::format::schema::SummaryRow;
use crate::core::models::replica::Replica;
use crate::core::models::states::{BasisState, TargetState};

const ATTR_FORMAT_VERSION: &str = "west_file_format_version";
const ATTR_ITER_PREC: &str = "west_iter_prec";
const ATTR_VERSION: &str = "west_version";
// The consuming toolkit historically reads these duplicate spellings too.
const ATTR_ITER_PREC_ALIAS: &str = "westpa_iter_prec";
const ATTR_FORMAT_VERSION_ALIAS: &str = "westpa_fileformat_version";

const ITERATIONS_GROUP: &str = "/iterations";

/// Handle to one iteration store on disk.
///
/// The handle holds no open file: every operation opens the underlying path,
/// does its work, and releases it before returning. Appends must be
/// externally serialized; concurrent writers produce undefined on-disk state.
#[derive(Debug, Clone)]
pub struct WestFile {
    path: PathBuf,
    config: StoreConfig,
}

impl WestFile {
    /// Creates a new store, writing the format attributes, the one-row
    /// summary table, and the empty iterations namespace.
    ///
    /// Refuses to overwrite: callers wanting a fresh store over an existing
    /// path must remove the file themselves.
    pub fn create(path: &Path, config: StoreConfig) -> Result<Self> {
        if path.exists() {
            return Err(StoreError::AlreadyExists(path.to_path_buf()));
        }
        let mut container = Container::create(path)?;
        container.set_attr("/", ATTR_FORMAT_VERSION, AttrValue::UInt(config.file_format_version))?;
        container.set_attr("/", ATTR_ITER_PREC, AttrValue::UInt(config.iter_prec))?;
        container.set_attr("/", ATTR_VERSION, AttrValue::Str(config.west_version.clone()))?;
        container.set_attr("/", ATTR_ITER_PREC_ALIAS, AttrValue::UInt(config.iter_prec))?;
        container.set_attr(
            "/",
            ATTR_FORMAT_VERSION_ALIAS,
            AttrValue::UInt(config.file_format_version),
        )?;
        container.create_table(summary::SUMMARY_TABLE, summary::SUMMARY_WIDTH, false)?;
        container.ensure_group(ITERATIONS_GROUP)?;
        container.finish()?;
        info!(path = %path.display(), "created iteration store");
        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// Opens an existing store, recovering its configuration from the file
    /// attributes.
    pub fn open(path: &Path) -> Result<Self> {
        let container = Container::open(path)?;
        let attr_uint = |name: &str| -> Result<u64> {
            container
                .attr("/", name)
                .and_then(AttrValue::as_uint)
                .ok_or_else(|| {
                    StoreError::Format(FormatError::NotAStore(format!(
                        "missing '{name}' attribute"
                    )))
                })
        };
        let config = StoreConfig {
            file_format_version: attr_uint(ATTR_FORMAT_VERSION)?,
            iter_prec: attr_uint(ATTR_ITER_PREC)?,
            west_version: container
                .attr("/", ATTR_VERSION)
                .and_then(AttrValue::as_str)
                .ok_or_else(|| {
                    StoreError::Format(FormatError::NotAStore(format!(
                        "missing '{ATTR_VERSION}' attribute"
                    )))
                })?
                .to_string(),
        };
        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Appends one iteration's worth of ensemble state.
    ///
    /// Write order within the session is load-bearing: summary row (always);
    /// then, for every iteration after the first, the basis-state epoch, the
    /// target-state epoch, and the binning-topology blob; then the iteration
    /// namespace group as the commit marker. A crash partway through leaves
    /// the namespace group absent and readers discard the partial iteration.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn append(
        &self,
        next_iteration: &[Replica],
        binned_sims: &[Vec<Replica>],
        basis_states: &[BasisState],
        target_states: &[TargetState],
    ) -> Result<()> {
        if next_iteration.is_empty() {
            return Err(StoreError::EmptyIteration("next_iteration"));
        }
        if binned_sims.is_empty() {
            return Err(StoreError::EmptyIteration("binned_sims"));
        }
        let n_iter = next_iteration[0].iteration_id;
        if n_iter == 0 {
            return Err(StoreError::InvalidIteration);
        }

        let mut container = Container::open(&self.path)?;
        append_summary(&mut container, n_iter, next_iteration, binned_sims)?;

        // The very first iteration records only its summary; state epochs
        // and the topology blob begin with the second iteration.
        if n_iter > 1 {
            append_basis_states(&mut container, n_iter, basis_states)?;
            append_target_states(&mut container, n_iter, target_states)?;
            append_topology(&mut container, &next_iteration[0].topology)?;
        }

        let group = self.iteration_group_name(n_iter);
        container.ensure_group(&group)?;
        container.set_attr(&group, "n_iter", AttrValue::UInt(n_iter))?;
        container.finish()?;
        info!(
            n_iter,
            n_particles = next_iteration.len(),
            n_bins = binned_sims.len(),
            "appended iteration"
        );
        Ok(())
    }

    /// Zero-padded namespace group path for iteration `n_iter`.
    pub fn iteration_group_name(&self, n_iter: u64) -> String {
        format!(
            "{ITERATIONS_GROUP}/iter_{n_iter:0width$}",
            width = self.config.iter_prec as usize
        )
    }

    /// Whether iteration `n_iter` is fully durable, i.e. its namespace group
    /// exists.
    pub fn contains_iteration(&self, n_iter: u64) -> Result<bool> {
        let container = Container::open(&self.path)?;
        Ok(container.has_group(&self.iteration_group_name(n_iter)))
    }

    /// Number of fully durable iterations.
    pub fn num_iterations(&self) -> Result<u64> {
        let container = Container::open(&self.path)?;
        let prefix = format!("{ITERATIONS_GROUP}/iter_");
        Ok(container.groups_with_prefix(&prefix).len() as u64)
    }

    /// Reads back the summary row for iteration `n_iter`.
    pub fn summary_row(&self, n_iter: u64) -> Result<SummaryRow> {
        if n_iter == 0 {
            return Err(StoreError::InvalidIteration);
        }
        let mut container = Container::open(&self.path)?;
        let row = container.read_row(summary::SUMMARY_TABLE, n_iter - 1)?;
        Ok(SummaryRow::decode(&row)?)
    }
}
