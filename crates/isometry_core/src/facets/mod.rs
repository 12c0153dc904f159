//! Facet value discovery for populating filter UI.
//!
//! # Responsibility
//! - List distinct values (with usage counts) of a catalog column.
//! - Offer a staleness-bounded cache wrapper for UI callers.
//!
//! # Invariants
//! - Discovery is read-only and excludes soft-deleted items.
//! - An uninitialized store yields an empty list, never an error.

pub mod cache;
pub mod discovery;
