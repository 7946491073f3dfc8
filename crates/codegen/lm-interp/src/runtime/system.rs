//! `System` helpers for operators, exceptions, delegates and strings, plus
//! the handful of base-library globals lowered code calls

use super::types::{ensure_namespace, exception_for, native_type, raise};
use super::{NativeResult, Shared, arg, set_native, table_arg};
use crate::interpreter::{InterpError, Interpreter, first};
use crate::value::{Table, TableRef, Value};
use std::rc::Rc;

/// Binary integer helper: `System.div`, `System.band`, ...
type BinaryHelper = fn(&str, &Value, &Value) -> Result<Value, InterpError>;

pub(super) fn install(interp: &Interpreter, runtime: &Shared) {
    let system = ensure_namespace(interp, runtime, "System");
    install_operators(&system);
    install_control(&system);
    install_delegates(interp, runtime, &system);

    set_native(&system, "toString", |interp, args| Ok(vec![Value::str(to_text(interp, &arg(&args, 0))?)]));
    let console = native_type(interp, runtime, "System.Console", "class", None);
    set_native(&console, "WriteLine", |interp, args| {
        let line = to_text(interp, &arg(&args, 0))?;
        interp.print_line(line);
        Ok(Vec::new())
    });
    // Units are run by the host before the manifest, so loading is a no-op
    // and only `Main` is left to do
    set_native(&system, "init", |interp, args| {
        let config = table_arg("init", &args, 0)?;
        let main = config.borrow().get_str("Main");
        match main.as_str().map(str::to_owned) {
            Some(path) => interp.call_path(&path, Vec::new()),
            None => Ok(Vec::new()),
        }
    });
    install_globals(interp);
}

fn int_operand(helper: &str, value: &Value) -> Result<i64, InterpError> {
    value
        .as_int()
        .ok_or_else(|| InterpError::bad_argument(helper, format!("expected an integer, got {}", value.type_name())))
}

fn float_operands(helper: &str, left: &Value, right: &Value) -> Result<(f64, f64), InterpError> {
    left.as_float()
        .zip(right.as_float())
        .ok_or_else(|| InterpError::bad_argument(helper, "expected numbers"))
}

/// Division truncating toward zero on integers
fn div(helper: &str, left: &Value, right: &Value) -> Result<Value, InterpError> {
    match (left, right) {
        (Value::Int(_), Value::Int(0)) => Err(InterpError::DivisionByZero),
        (Value::Int(left), Value::Int(right)) => Ok(Value::Int(left.wrapping_div(*right))),
        _ => float_operands(helper, left, right).map(|(left, right)| Value::Float(left / right)),
    }
}

/// Remainder with the sign of the dividend
fn rem(helper: &str, left: &Value, right: &Value) -> Result<Value, InterpError> {
    match (left, right) {
        (Value::Int(_), Value::Int(0)) => Err(InterpError::DivisionByZero),
        (Value::Int(left), Value::Int(right)) => Ok(Value::Int(left.wrapping_rem(*right))),
        _ => float_operands(helper, left, right).map(|(left, right)| Value::Float(left % right)),
    }
}

fn band(helper: &str, left: &Value, right: &Value) -> Result<Value, InterpError> {
    Ok(Value::Int(int_operand(helper, left)? & int_operand(helper, right)?))
}

fn bor(helper: &str, left: &Value, right: &Value) -> Result<Value, InterpError> {
    Ok(Value::Int(int_operand(helper, left)? | int_operand(helper, right)?))
}

fn xor(helper: &str, left: &Value, right: &Value) -> Result<Value, InterpError> {
    Ok(Value::Int(int_operand(helper, left)? ^ int_operand(helper, right)?))
}

fn shift_left(helper: &str, left: &Value, right: &Value) -> Result<Value, InterpError> {
    let count = int_operand(helper, right)? & 63;
    Ok(Value::Int(int_operand(helper, left)?.wrapping_shl(count as u32)))
}

/// Arithmetic shift, as on signed integers
fn shift_right(helper: &str, left: &Value, right: &Value) -> Result<Value, InterpError> {
    let count = int_operand(helper, right)? & 63;
    Ok(Value::Int(int_operand(helper, left)?.wrapping_shr(count as u32)))
}

fn install_operators(system: &TableRef) {
    let helpers: [(&'static str, BinaryHelper); 7] = [
        ("div", div),
        ("mod", rem),
        ("band", band),
        ("bor", bor),
        ("xor", xor),
        ("sl", shift_left),
        ("sr", shift_right),
    ];
    for (name, helper) in helpers {
        set_native(system, name, move |_, args| Ok(vec![helper(name, &arg(&args, 0), &arg(&args, 1))?]));
        set_native(system, &format!("{name}OfNull"), move |_, args| {
            let (left, right) = (arg(&args, 0), arg(&args, 1));
            if left.is_nil() || right.is_nil() {
                return Ok(vec![Value::Nil]);
            }
            Ok(vec![helper(name, &left, &right)?])
        });
    }
    set_native(system, "bnot", |_, args| Ok(vec![Value::Int(!int_operand("bnot", &arg(&args, 0))?)]));
    set_native(system, "bnotOfNull", |_, args| {
        Ok(vec![match arg(&args, 0) {
            Value::Nil => Value::Nil,
            value => Value::Int(!int_operand("bnotOfNull", &value)?),
        }])
    });
}

fn install_control(system: &TableRef) {
    set_native(system, "throw", |interp, args| {
        Err(match arg(&args, 0) {
            Value::Nil => raise(interp, "System.NullReferenceException", "throw of a null exception"),
            exception => InterpError::Thrown(exception),
        })
    });
    set_native(system, "try", try_helper);
    set_native(system, "using", |interp, args| {
        let resource = arg(&args, 0);
        let result = interp.call(&arg(&args, 1), vec![resource.clone()]);
        if !resource.is_nil() {
            let dispose = interp.index(&resource, &Value::str("Dispose"))?;
            if !dispose.is_nil() {
                interp.call(&dispose, vec![resource])?;
            }
        }
        result
    });
}

/// `System.try(body, catch, finally)`; the body's values pass through so a
/// `return` inside it reaches the caller
fn try_helper(interp: &mut Interpreter, args: Vec<Value>) -> NativeResult {
    let (body, catch, finally) = (arg(&args, 0), arg(&args, 1), arg(&args, 2));
    let result = match interp.call(&body, Vec::new()) {
        Err(error) if error.is_catchable() && !catch.is_nil() => match exception_for(interp, error) {
            Ok(exception) => interp.call(&catch, vec![exception]),
            Err(error) => Err(error),
        },
        other => other,
    };
    if !finally.is_nil() {
        interp.call(&finally, Vec::new())?;
    }
    result
}

/// Bound methods and invocation lists are tables so that removal can
/// compare them by target and method
fn install_delegates(interp: &Interpreter, runtime: &Shared, system: &TableRef) {
    let object = Rc::clone(&runtime.borrow().object);
    let bound = native_type(interp, runtime, "System.Delegate", "class", Some(&object));
    let multicast = native_type(interp, runtime, "System.MulticastDelegate", "class", Some(&bound));

    set_native(&bound, "__call", |interp, args| {
        let this = table_arg("delegate", &args, 0)?;
        let (target, method) = {
            let table = this.borrow();
            (table.get_str("__target"), table.get_str("__method"))
        };
        let mut all = Vec::with_capacity(args.len());
        all.push(target);
        all.extend(args.into_iter().skip(1));
        interp.call(&method, all)
    });
    set_native(&multicast, "__call", |interp, args| {
        let this = table_arg("delegate", &args, 0)?;
        let list = this.borrow().sequence_items();
        let mut result = Vec::new();
        for delegate in list {
            result = interp.call(&delegate, args.iter().skip(1).cloned().collect())?;
        }
        Ok(result)
    });

    let delegate_type = Rc::clone(&bound);
    set_native(system, "bind", move |_, args| {
        let method = arg(&args, 1);
        if method.is_nil() {
            return Ok(vec![Value::Nil]);
        }
        let mut table = Table::new();
        table.set_str("__target", arg(&args, 0));
        table.set_str("__method", method);
        table.metatable = Some(Rc::clone(&delegate_type));
        Ok(vec![Value::table(table)])
    });

    let list_type = Rc::clone(&multicast);
    set_native(system, "DelegateCombine", move |_, args| {
        let (left, right) = (arg(&args, 0), arg(&args, 1));
        if left.is_nil() {
            return Ok(vec![right]);
        }
        if right.is_nil() {
            return Ok(vec![left]);
        }
        let mut list = invocation_list(&list_type, &left);
        list.extend(invocation_list(&list_type, &right));
        Ok(vec![from_list(&list_type, list)])
    });
    let list_type = multicast;
    set_native(system, "DelegateRemove", move |_, args| {
        let (source, removed) = (arg(&args, 0), arg(&args, 1));
        if source.is_nil() || removed.is_nil() {
            return Ok(vec![source]);
        }
        let mut list = invocation_list(&list_type, &source);
        let removed = invocation_list(&list_type, &removed);
        let found = (0..=list.len().saturating_sub(removed.len())).rev().find(|start| {
            list.len() >= removed.len()
                && list[*start..*start + removed.len()]
                    .iter()
                    .zip(&removed)
                    .all(|(left, right)| delegate_equals(left, right))
        });
        if let Some(start) = found {
            list.drain(start..start + removed.len());
        }
        Ok(vec![from_list(&list_type, list)])
    });
}

fn invocation_list(multicast: &TableRef, delegate: &Value) -> Vec<Value> {
    match delegate {
        Value::Table(table) if table.borrow().metatable.as_ref().is_some_and(|meta| Rc::ptr_eq(meta, multicast)) => {
            table.borrow().sequence_items()
        }
        other => vec![other.clone()],
    }
}

fn from_list(multicast: &TableRef, mut list: Vec<Value>) -> Value {
    match list.len() {
        0 => Value::Nil,
        1 => list.pop().unwrap_or_default(),
        _ => {
            let mut table = Table::sequence(list);
            table.metatable = Some(Rc::clone(multicast));
            Value::table(table)
        }
    }
}

/// Same function, or the same method bound to the same target
fn delegate_equals(left: &Value, right: &Value) -> bool {
    if left.raw_equals(right) {
        return true;
    }
    let (Value::Table(left), Value::Table(right)) = (left, right) else {
        return false;
    };
    let (left, right) = (left.borrow(), right.borrow());
    let method = left.get_str("__method");
    !method.is_nil()
        && method.raw_equals(&right.get_str("__method"))
        && left.get_str("__target").raw_equals(&right.get_str("__target"))
}

/// Text of a float the way the source language formats it
fn float_text(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value.is_infinite() {
        let sign = if value > 0.0 { "" } else { "-" };
        format!("{sign}Infinity")
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// `System.toString`: source-language formatting, `ToString` on objects
///
/// # Errors
///
/// Errors raised by a user `ToString`.
pub(crate) fn to_text(interp: &mut Interpreter, value: &Value) -> Result<String, InterpError> {
    Ok(match value {
        Value::Nil => String::new(),
        Value::Bool(true) => "True".to_owned(),
        Value::Bool(false) => "False".to_owned(),
        Value::Int(int) => int.to_string(),
        Value::Float(float) => float_text(*float),
        Value::Str(text) => text.to_string(),
        Value::Table(_) => {
            let method = interp.index(value, &Value::str("ToString"))?;
            if method.is_nil() {
                value.to_string()
            } else {
                first(interp.call(&method, vec![value.clone()])?).to_string()
            }
        }
        other => other.to_string(),
    })
}

/// `print`, `tostring`, `type`, `setmetatable`, `getmetatable` and
/// `string.char`
fn install_globals(interp: &Interpreter) {
    let globals = interp.globals();
    set_native(globals, "print", |interp, args| {
        let line = args.iter().map(ToString::to_string).collect::<Vec<_>>().join("\t");
        interp.print_line(line);
        Ok(Vec::new())
    });
    set_native(globals, "tostring", |_, args| Ok(vec![Value::str(arg(&args, 0).to_string())]));
    set_native(globals, "type", |_, args| Ok(vec![Value::str(arg(&args, 0).type_name())]));
    set_native(globals, "setmetatable", |_, args| {
        let table = table_arg("setmetatable", &args, 0)?;
        table.borrow_mut().metatable = arg(&args, 1).as_table().cloned();
        Ok(vec![Value::Table(table)])
    });
    set_native(globals, "getmetatable", |_, args| {
        let meta = arg(&args, 0).as_table().and_then(|table| table.borrow().metatable.clone());
        Ok(vec![meta.map_or(Value::Nil, Value::Table)])
    });

    let string: TableRef = Rc::default();
    set_native(&string, "char", |_, args| {
        let mut text = String::with_capacity(args.len());
        for code in &args {
            let ch = int_operand("string.char", code)
                .ok()
                .and_then(|code| u32::try_from(code).ok())
                .and_then(char::from_u32)
                .ok_or_else(|| InterpError::bad_argument("string.char", format!("invalid code {code}")))?;
            text.push(ch);
        }
        Ok(vec![Value::str(text)])
    });
    globals.borrow_mut().set_str("string", Value::Table(string));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_helpers_truncate() {
        assert_eq!(div("div", &Value::Int(-7), &Value::Int(2)).ok(), Some(Value::Int(-3)));
        assert_eq!(rem("mod", &Value::Int(-7), &Value::Int(2)).ok(), Some(Value::Int(-1)));
        assert!(matches!(div("div", &Value::Int(1), &Value::Int(0)), Err(InterpError::DivisionByZero)));
        assert_eq!(shift_right("sr", &Value::Int(-8), &Value::Int(1)).ok(), Some(Value::Int(-4)));
    }

    #[test]
    fn test_float_text_drops_integral_fraction() {
        assert_eq!(float_text(3.0), "3");
        assert_eq!(float_text(2.5), "2.5");
    }
}
