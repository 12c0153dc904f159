//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define data access contracts for items and connections.
//! - Isolate SQLite write details from the read-only query engines.
//!
//! # Invariants
//! - Repository writes enforce model validation before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `DuplicateEdge`) in
//!   addition to DB transport errors.

pub mod edge_repo;
pub mod item_repo;
