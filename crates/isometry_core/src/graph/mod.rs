//! Relationship graph traversal over the `connections` table.

pub mod traversal;
