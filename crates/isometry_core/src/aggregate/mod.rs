//! Janus density aggregation.
//!
//! # Responsibility
//! - Model the four density levers as an explicit value (`density`).
//! - Map granularity levels to bucket expressions (`granularity`).
//! - Plan and execute grid aggregations with provenance (`engine`).
//!
//! # Invariants
//! - Collapsed results are lossless: their `source_count` sum equals the
//!   number of leaf rows matching the same filter.
//! - Every collapsed cell can be re-derived by a leaf re-query.

pub mod density;
pub mod engine;
pub mod granularity;
