//! Lowering of the annotated source tree to target chunks
//!
//! [`ProgramFacts::collect`] runs once over every unit of a program, so
//! partial types are complete before anything is emitted. Each unit is then
//! lowered independently by [`lower_unit`]: namespaces become registration
//! calls, types become closures assembled member by member, and statements
//! and expressions are rewritten into target constructs the runtime library
//! gives meaning to.

mod access;
mod context;
mod entry;
mod error;
mod facts;
mod members;
mod names;
mod operators;
mod options;
mod types;
mod unit;
mod walker;

pub use context::{LowerCtx, LowerResult};
pub use entry::{EntryPoint, find_entry_point};
pub use error::LowerError;
pub use facts::{Fragment, ProgramFacts, TypeFacts};
pub use names::escape_member;
pub use options::{DEFAULT_INLINE_STRING_LEN, LowerOptions, RuntimeProfile};
pub use unit::{UnitOutput, lower_unit};

#[cfg(test)]
mod tests;
