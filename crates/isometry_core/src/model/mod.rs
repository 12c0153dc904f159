//! Item/connection graph model and the facet column catalog.
//!
//! # Responsibility
//! - Define canonical data structures shared by the filter compiler and engines.
//! - Own the allow-list of columns that may appear in generated SQL.
//!
//! # Invariants
//! - Every item is identified by a stable opaque `ItemId`.
//! - Deletion is represented by a `deleted_at` soft-delete marker, not hard delete.

pub mod edge;
pub mod facet;
pub mod item;
