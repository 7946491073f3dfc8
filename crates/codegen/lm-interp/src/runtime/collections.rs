//! Arrays, `foreach` support and iterator bodies
//!
//! An iterator body runs to completion the first time its sequence is
//! enumerated; `System.yieldReturn` appends to the innermost running body.

use super::types::{anonymous_type, ensure_namespace, native_type, raise};
use super::{Shared, arg, set_native, table_arg};
use crate::interpreter::{InterpError, Interpreter, first};
use crate::value::{Table, TableRef, Value};
use std::rc::Rc;
use tracing::trace;

/// Most values one sequence may produce
pub(crate) const MAX_ITEMS: usize = 1 << 20;

pub(super) fn install(interp: &Interpreter, runtime: &Shared) {
    let system = ensure_namespace(interp, runtime, "System");
    let shared = Rc::clone(runtime);
    set_native(&system, "Array", move |_, args| {
        Ok(vec![Value::Table(array_type(&shared, arg(&args, 0)))])
    });
    set_native(&system, "each", |interp, args| {
        let items = collect(interp, &arg(&args, 0))?;
        Ok(vec![each_iterator(items), Value::Nil, Value::Int(0)])
    });
    set_native(&system, "yieldReturn", |interp, args| {
        let Some(sink) = interp.yields.last_mut() else {
            return Err(InterpError::bad_argument("System.yieldReturn", "called outside an iterator body"));
        };
        if sink.len() >= MAX_ITEMS {
            return Err(InterpError::bad_argument("System.yieldReturn", "iterator produced too many values"));
        }
        sink.push(arg(&args, 0));
        Ok(Vec::new())
    });

    let object = Rc::clone(&runtime.borrow().object);
    let enumerable = native_type(interp, runtime, "System.Iterator", "class", Some(&object));
    let enumerator = native_type(interp, runtime, "System.IteratorEnumerator", "class", Some(&object));
    install_enumerator(&enumerator);

    let enumerator_type = Rc::clone(&enumerator);
    set_native(&enumerable, "GetEnumerator", move |interp, args| {
        let items = collect(interp, &arg(&args, 0))?;
        let mut table = Table::new();
        table.set_str("__items", Value::table(Table::sequence(items.iter().cloned())));
        table.set_str("__count", Value::Int(items.len() as i64));
        table.metatable = Some(Rc::clone(&enumerator_type));
        Ok(vec![Value::table(table)])
    });
    set_native(&system, "yieldIEnumerable", move |_, args| Ok(vec![iterator_object(&enumerable, args)]));
    set_native(&system, "yieldIEnumerator", move |_, args| Ok(vec![iterator_object(&enumerator, args)]));
}

/// `{ __generator, __elementType, __args }` tagged with `ty`
fn iterator_object(ty: &TableRef, args: Vec<Value>) -> Value {
    let mut args = args.into_iter();
    let mut table = Table::new();
    table.set_str("__generator", args.next().unwrap_or_default());
    table.set_str("__elementType", args.next().unwrap_or_default());
    let params: Vec<Value> = args.collect();
    table.set_str("__argc", Value::Int(params.len() as i64));
    table.set_str("__args", Value::table(Table::sequence(params)));
    table.metatable = Some(Rc::clone(ty));
    Value::table(table)
}

fn install_enumerator(enumerator: &TableRef) {
    set_native(enumerator, "MoveNext", |interp, args| {
        let this = table_arg("MoveNext", &args, 0)?;
        let pending = this.borrow().get_str("__items").is_nil();
        if pending {
            let items = collect(interp, &arg(&args, 0))?;
            let mut table = this.borrow_mut();
            table.set_str("__count", Value::Int(items.len() as i64));
            table.set_str("__items", Value::table(Table::sequence(items)));
        }
        let mut table = this.borrow_mut();
        let position = table.get_str("__position").as_int().unwrap_or(0) + 1;
        let count = table.get_str("__count").as_int().unwrap_or(0);
        table.set_str("__position", Value::Int(position));
        if position > count {
            table.set_str("Current", Value::Nil);
            return Ok(vec![Value::Bool(false)]);
        }
        let current = table
            .get_str("__items")
            .as_table()
            .map(|items| items.borrow().get_int(position))
            .unwrap_or_default();
        table.set_str("Current", current);
        Ok(vec![Value::Bool(true)])
    });
    set_native(enumerator, "getCurrent", |_, args| {
        let this = table_arg("getCurrent", &args, 0)?;
        let current = this.borrow().get_str("Current");
        Ok(vec![current])
    });
    set_native(enumerator, "Reset", |_, args| {
        let this = table_arg("Reset", &args, 0)?;
        this.borrow_mut().set_str("__position", Value::Int(0));
        Ok(Vec::new())
    });
    set_native(enumerator, "Dispose", |_, _| Ok(Vec::new()));
}

/// Generic-for triple stepping through `items`
fn each_iterator(items: Vec<Value>) -> Value {
    Value::native("each", move |_, args| {
        let index = arg(&args, 1).as_int().unwrap_or(0);
        let item = usize::try_from(index).ok().and_then(|index| items.get(index));
        Ok(match item {
            Some(item) => vec![Value::Int(index + 1), item.clone()],
            None => vec![Value::Nil],
        })
    })
}

/// Every element of a sequence: arrays, iterator objects, strings, objects
/// with `GetEnumerator`, and plain sequence tables
///
/// # Errors
///
/// Enumerating `nil` or a non-sequence, or any error the sequence raises.
pub(crate) fn collect(interp: &mut Interpreter, sequence: &Value) -> Result<Vec<Value>, InterpError> {
    let table = match sequence {
        Value::Nil => {
            return Err(InterpError::Index {
                kind: "nil",
                key: "GetEnumerator".to_owned(),
            });
        }
        Value::Str(text) => return Ok(text.chars().map(|ch| Value::Int(i64::from(u32::from(ch)))).collect()),
        Value::Table(table) => table,
        other => {
            return Err(InterpError::bad_argument(
                "System.each",
                format!("cannot enumerate a {} value", other.type_name()),
            ));
        }
    };
    let (generator, length) = {
        let table = table.borrow();
        (table.get_str("__generator"), table.get_str("__length"))
    };
    if !generator.is_nil() {
        return run_generator(interp, table, &generator);
    }
    if let Some(length) = length.as_int() {
        let table = table.borrow();
        return Ok((1..=length).map(|index| table.get_int(index)).collect());
    }
    let get_enumerator = interp.index(sequence, &Value::str("GetEnumerator"))?;
    if !get_enumerator.is_nil() {
        let enumerator = first(interp.call(&get_enumerator, vec![sequence.clone()])?);
        return drain(interp, &enumerator);
    }
    Ok(table.borrow().sequence_items())
}

fn run_generator(interp: &mut Interpreter, iterator: &TableRef, generator: &Value) -> Result<Vec<Value>, InterpError> {
    let args = {
        let table = iterator.borrow();
        let count = table.get_str("__argc").as_int().unwrap_or(0);
        let params = table.get_str("__args");
        let params = params.as_table().map(Rc::clone);
        (1..=count)
            .map(|index| params.as_ref().map(|params| params.borrow().get_int(index)).unwrap_or_default())
            .collect()
    };
    interp.yields.push(Vec::new());
    let result = interp.call(generator, args);
    let items = interp.yields.pop().unwrap_or_default();
    result?;
    trace!(items = items.len(), "iterator body finished");
    Ok(items)
}

/// Drive a `MoveNext`/`Current` enumerator to the end
fn drain(interp: &mut Interpreter, enumerator: &Value) -> Result<Vec<Value>, InterpError> {
    let mut items = Vec::new();
    loop {
        let move_next = interp.index(enumerator, &Value::str("MoveNext"))?;
        if !first(interp.call(&move_next, vec![enumerator.clone()])?).is_truthy() {
            return Ok(items);
        }
        let getter = interp.index(enumerator, &Value::str("getCurrent"))?;
        let current = if getter.is_nil() {
            interp.index(enumerator, &Value::str("Current"))?
        } else {
            first(interp.call(&getter, vec![enumerator.clone()])?)
        };
        items.push(current);
        if items.len() > MAX_ITEMS {
            return Err(InterpError::bad_argument("GetEnumerator", "sequence produced too many values"));
        }
    }
}

/// `System.Array(T)`, one type per element type
pub(crate) fn array_type(runtime: &Shared, element: Value) -> TableRef {
    let cached = runtime
        .borrow()
        .arrays
        .iter()
        .find(|(known, _)| known.raw_equals(&element))
        .map(|(_, ty)| Rc::clone(ty));
    if let Some(ty) = cached {
        return ty;
    }
    let object = Rc::clone(&runtime.borrow().object);
    let ty = anonymous_type(runtime, &format!("System.Array[{element}]"), "class", Some(&object));
    ty.borrow_mut().set_str("__elementType", element.clone());
    install_array_members(&ty);
    runtime.borrow_mut().arrays.push((element, Rc::clone(&ty)));
    ty
}

/// Array instance of `ty` holding `items`
pub(crate) fn new_array(ty: &TableRef, items: Vec<Value>) -> Value {
    let length = items.len() as i64;
    let mut table = Table::sequence(items);
    table.set_str("__length", Value::Int(length));
    table.metatable = Some(Rc::clone(ty));
    Value::table(table)
}

/// Zero-based index checked against `__length`
fn checked_slot(interp: &mut Interpreter, array: &TableRef, index: &Value) -> Result<i64, InterpError> {
    let length = array.borrow().get_str("__length").as_int().unwrap_or(0);
    match index.as_int() {
        Some(index) if (0..length).contains(&index) => Ok(index + 1),
        _ => Err(raise(
            interp,
            "System.IndexOutOfRangeException",
            &format!("Index {index} was outside the bounds of the array."),
        )),
    }
}

fn install_array_members(ty: &TableRef) {
    set_native(ty, "__ctor__", |_, args| {
        let this = table_arg("System.Array", &args, 0)?;
        let mut table = this.borrow_mut();
        let items = args.into_iter().skip(1);
        let mut length = 0;
        for (index, item) in (1_i64..).zip(items) {
            table.set_int(index, item);
            length = index;
        }
        table.set_str("__length", Value::Int(length));
        Ok(Vec::new())
    });
    set_native(ty, "get", |interp, args| {
        let this = table_arg("get", &args, 0)?;
        let slot = checked_slot(interp, &this, &arg(&args, 1))?;
        let item = this.borrow().get_int(slot);
        Ok(vec![item])
    });
    set_native(ty, "set", |interp, args| {
        let this = table_arg("set", &args, 0)?;
        let slot = checked_slot(interp, &this, &arg(&args, 1))?;
        this.borrow_mut().set_int(slot, arg(&args, 2));
        Ok(Vec::new())
    });
    for name in ["getLength", "getCount"] {
        set_native(ty, name, |_, args| {
            let this = table_arg("getLength", &args, 0)?;
            let length = this.borrow().get_str("__length");
            Ok(vec![length])
        });
    }
}
