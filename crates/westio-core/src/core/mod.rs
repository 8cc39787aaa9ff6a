//! Foundation layer: stateless domain models and the container file format.

pub mod format;
pub mod models;
