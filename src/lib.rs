//! chunkscan - chunked scans over row-id addressed column stores
//!
//! Live row-ids are read from an existence table in fixed-size windows,
//! optionally filtered by an offloaded predicate kernel, and materialized
//! column by column from per-attribute value stores.

pub mod cli;
pub mod observability;
pub mod offload;
pub mod scan;
pub mod storage;
