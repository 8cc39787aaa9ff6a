//! # westio Core Library
//!
//! An append-only, single-file iteration store for weighted-ensemble
//! simulation campaigns. Each iteration of the ensemble (segment weights,
//! basis/target state sets, and the binning topology in effect) is recorded
//! durably in the WESTPA logical layout so that downstream analysis tools can
//! read the file without cooperation from the writer process.
//!
//! ## Architectural Philosophy
//!
//! The library is split into two layers with a strict dependency direction:
//!
//! - **[`core`]: The Foundation.** Stateless domain models ([`core::models`]:
//!   replicas, basis/target states, topology snapshots) and the container
//!   format layer ([`core::format`]: the framed on-disk encoding, growable
//!   tables, and fixed row layouts). Nothing in `core` knows about the
//!   weighted-ensemble write protocol.
//!
//! - **[`store`]: The Write Path.** The per-iteration writers (summary
//!   aggregation, state epochs, topology blobs) and the [`store::WestFile`]
//!   facade that sequences them within one open-for-append session. This is
//!   the public entry point for orchestrator code.
//!
//! The store is a write path: each `append` call opens the file, writes one
//! iteration, and closes it. No handle is held between calls, and no two
//! appends may run concurrently against the same path.

pub mod core;
pub mod store;
