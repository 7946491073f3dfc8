//! Target AST interpreter
//!
//! Tree-walking evaluator for lowered chunks, with a native runtime library
//! standing in for the `System` and `Linq` tables. Used to check that
//! lowered programs behave like their source.

pub mod env;
pub mod interpreter;
mod runtime;
pub mod value;

pub use interpreter::{InterpError, Interpreter, MAX_CALL_DEPTH};
pub use value::{Table, TableRef, Value};
