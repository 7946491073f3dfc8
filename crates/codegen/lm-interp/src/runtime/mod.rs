//! Native runtime library
//!
//! Installs the `System` and `Linq` tables lowered code calls into. Types
//! registered through `namespace.class(...)` are defined on first access to
//! their path, so declaration order across chunks does not matter.
//!
//! Sequences are evaluated eagerly: an iterator body runs to completion the
//! first time it is enumerated, and every query operator returns an array.

mod collections;
mod linq;
mod system;
mod types;

use crate::interpreter::{InterpError, Interpreter};
use crate::value::{TableRef, Value};
use std::cell::RefCell;
use std::rc::Rc;

pub(crate) use types::Runtime;

/// Runtime state shared by every native helper
pub(crate) type Shared = Rc<RefCell<Runtime>>;

/// Result of a native helper
pub(crate) type NativeResult = Result<Vec<Value>, InterpError>;

/// Install the runtime library into an interpreter's globals
pub(crate) fn install(interp: &mut Interpreter) {
    let runtime: Shared = Rc::new(RefCell::new(Runtime::new()));
    types::install(interp, &runtime);
    system::install(interp, &runtime);
    collections::install(interp, &runtime);
    linq::install(interp, &runtime);
}

/// Argument `index`, `nil` when absent
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// Argument `index` as a table
pub(crate) fn table_arg(helper: &str, args: &[Value], index: usize) -> Result<TableRef, InterpError> {
    match args.get(index) {
        Some(Value::Table(table)) => Ok(Rc::clone(table)),
        other => Err(InterpError::bad_argument(
            helper,
            format!(
                "argument {} must be a table, got {}",
                index + 1,
                other.map_or("no value", Value::type_name)
            ),
        )),
    }
}

/// Store a native helper under `name`
pub(crate) fn set_native(
    table: &TableRef,
    name: &str,
    func: impl Fn(&mut Interpreter, Vec<Value>) -> NativeResult + 'static,
) {
    table.borrow_mut().set_str(name, Value::native(name, func));
}
