//! Stateless domain models for the weighted-ensemble state consumed by the
//! write path: replica records, basis/target states, and binning-topology
//! snapshots. These types carry data between the orchestrator and the store;
//! they perform no I/O themselves.

pub mod replica;
pub mod states;
