//! Shared definitions for the CEL runtime.
//!
//! This crate holds everything the evaluation engine and its callers must
//! agree on without pulling in the engine itself:
//!
//! - [`Kind`]: the closed set of runtime value kinds, used for overload
//!   signatures and O(1) kind dispatch.
//! - [`CelType`]: the structural type universe (static and reified types).
//! - [`ast`]: the checked expression tree an external type checker hands to
//!   the planner.
//! - [`operators`]: the canonical operator function names.

pub mod ast;
pub mod operators;

mod kind;
mod types;

pub use kind::Kind;
pub use types::CelType;
