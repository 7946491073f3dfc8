//! Statement and expression tree walker
//!
//! One `impl LowerCtx` block per construct family: expressions, invocations,
//! statements, structured control flow and queries.

pub(crate) mod control;
pub(crate) mod expr;
pub(crate) mod invoke;
pub(crate) mod query;
pub(crate) mod stmt;
