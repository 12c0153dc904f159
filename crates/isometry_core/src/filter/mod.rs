//! LATCH filter compilation.
//!
//! # Responsibility
//! - Model user filter clauses as a closed tagged union.
//! - Compile axis → clauses into one predicate tree with bound parameters.
//! - Render predicates against any table alias so aggregation and traversal
//!   embed the exact same filter.
//!
//! # Invariants
//! - Values are always bound parameters; only catalog column names are
//!   interpolated into SQL text.
//! - The compiler never emits a predicate it knows to be malformed.

pub mod clause;
pub mod compiler;
pub mod predicate;
pub mod state;
