//! Star-schema ETL for ride-hailing trip records.
//!
//! Two independent batch jobs:
//! - [`star::run_transform`] decomposes a flat trip CSV into dimension
//!   tables with surrogate keys and a fact table that references them.
//! - [`sampler::run_sample`] drops incomplete rows from a large trip CSV and
//!   writes a seeded uniform sample of the rest.

pub mod coded;
pub mod datetime;
pub mod dimension;
pub mod error;
pub mod fact;
pub mod loader;
pub mod output;
pub mod sampler;
pub mod star;
pub mod table;

pub use error::{EtlError, Result};
