//! `Linq` query operators
//!
//! Every operator materializes its source and returns an array. Orderings
//! remember their keys so `ThenBy` can sort again by the composite key.

use super::collections::{MAX_ITEMS, array_type, collect, new_array};
use super::types::{anonymous_type, raise};
use super::{NativeResult, Shared, arg, set_native, table_arg};
use crate::interpreter::{InterpError, Interpreter, first};
use crate::value::{Table, TableRef, Value};
use std::cmp::Ordering;
use std::rc::Rc;

pub(super) fn install(interp: &Interpreter, runtime: &Shared) {
    let linq: TableRef = Rc::default();
    interp.globals().borrow_mut().set_str("Linq", Value::Table(Rc::clone(&linq)));

    let shared = Rc::clone(runtime);
    set_native(&linq, "Select", move |interp, args| {
        let items = collect(interp, &arg(&args, 0))?;
        let selector = arg(&args, 1);
        let mut result = Vec::with_capacity(items.len());
        for item in items {
            result.push(first(interp.call(&selector, vec![item])?));
        }
        Ok(vec![result_array(&shared, arg(&args, 2), result)])
    });
    let shared = Rc::clone(runtime);
    set_native(&linq, "Where", move |interp, args| {
        let items = collect(interp, &arg(&args, 0))?;
        let predicate = arg(&args, 1);
        let mut result = Vec::new();
        for item in items {
            if first(interp.call(&predicate, vec![item.clone()])?).is_truthy() {
                result.push(item);
            }
        }
        Ok(vec![result_array(&shared, element_type(&arg(&args, 0)), result)])
    });
    let shared = Rc::clone(runtime);
    set_native(&linq, "SelectMany", move |interp, args| {
        let items = collect(interp, &arg(&args, 0))?;
        let (selector, projection) = (arg(&args, 1), arg(&args, 2));
        let mut result = Vec::new();
        for item in items {
            let inner = first(interp.call(&selector, vec![item.clone()])?);
            for value in collect(interp, &inner)? {
                result.push(if projection.is_nil() {
                    value
                } else {
                    first(interp.call(&projection, vec![item.clone(), value])?)
                });
            }
            limit(result.len())?;
        }
        Ok(vec![result_array(&shared, arg(&args, 3), result)])
    });

    for (name, descending, then) in [
        ("OrderBy", false, false),
        ("OrderByDescending", true, false),
        ("ThenBy", false, true),
        ("ThenByDescending", true, true),
    ] {
        let shared = Rc::clone(runtime);
        set_native(&linq, name, move |interp, args| order(interp, &shared, &args, descending, then));
    }

    let shared = Rc::clone(runtime);
    set_native(&linq, "Join", move |interp, args| join(interp, &shared, &args, false));
    let shared = Rc::clone(runtime);
    set_native(&linq, "GroupJoin", move |interp, args| join(interp, &shared, &args, true));

    let object = Value::Table(Rc::clone(&runtime.borrow().object));
    let grouping = anonymous_type(
        runtime,
        "System.Linq.Grouping",
        "class",
        Some(&array_type(runtime, object)),
    );
    set_native(&grouping, "getKey", |_, args| {
        let this = table_arg("getKey", &args, 0)?;
        let key = this.borrow().get_str("Key");
        Ok(vec![key])
    });
    let shared = Rc::clone(runtime);
    set_native(&linq, "GroupBy", move |interp, args| group_by(interp, &shared, &grouping, &args));

    install_aggregates(&linq, runtime);
}

fn limit(count: usize) -> Result<(), InterpError> {
    if count > MAX_ITEMS {
        return Err(InterpError::bad_argument("Linq", "query produced too many values"));
    }
    Ok(())
}

/// Element type recorded on an array, `nil` otherwise
fn element_type(sequence: &Value) -> Value {
    sequence
        .as_table()
        .and_then(|table| table.borrow().metatable.clone())
        .map(|meta| meta.borrow().get_str("__elementType"))
        .unwrap_or_default()
}

/// Array of `element` type, `System.Object` when unknown
fn result_array(runtime: &Shared, element: Value, items: Vec<Value>) -> Value {
    let element = if element.is_nil() {
        Value::Table(Rc::clone(&runtime.borrow().object))
    } else {
        element
    };
    new_array(&array_type(runtime, element), items)
}

/// Ordering of two keys: `nil` first, then numbers, strings and booleans by
/// value, then objects through `CompareTo`
fn compare_keys(interp: &mut Interpreter, left: &Value, right: &Value) -> Result<Ordering, InterpError> {
    Ok(match (left, right) {
        (Value::Nil, Value::Nil) => Ordering::Equal,
        (Value::Nil, _) => Ordering::Less,
        (_, Value::Nil) => Ordering::Greater,
        (Value::Int(left), Value::Int(right)) => left.cmp(right),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (left, right) = (left.as_float().unwrap_or_default(), right.as_float().unwrap_or_default());
            left.total_cmp(&right)
        }
        (Value::Str(left), Value::Str(right)) => left.cmp(right),
        (Value::Bool(left), Value::Bool(right)) => left.cmp(right),
        (Value::Table(_), _) => {
            let method = interp.index(left, &Value::str("CompareTo"))?;
            if method.is_nil() {
                return Err(InterpError::bad_argument("OrderBy", "key is not comparable"));
            }
            let sign = first(interp.call(&method, vec![left.clone(), right.clone()])?)
                .as_int()
                .unwrap_or(0);
            sign.cmp(&0)
        }
        _ => return Err(InterpError::bad_argument("OrderBy", "keys of different types")),
    })
}

/// `OrderBy(seq, key, comparer, keyType)` and its descending and `ThenBy`
/// forms
fn order(interp: &mut Interpreter, runtime: &Shared, args: &[Value], descending: bool, then: bool) -> NativeResult {
    let source = arg(args, 0);
    let items = collect(interp, &source)?;
    let mut keys: Vec<(Value, bool)> = Vec::new();
    if then {
        let previous = source
            .as_table()
            .map(|table| table.borrow().get_str("__orderKeys"))
            .unwrap_or_default();
        if let Value::Table(previous) = previous {
            for entry in previous.borrow().sequence_items() {
                if let Value::Table(entry) = entry {
                    let entry = entry.borrow();
                    keys.push((entry.get_int(1), entry.get_int(2).is_truthy()));
                }
            }
        }
    }
    keys.push((arg(args, 1), descending));

    let mut rows = Vec::with_capacity(items.len());
    for item in items {
        let mut values = Vec::with_capacity(keys.len());
        for (selector, _) in &keys {
            values.push(first(interp.call(selector, vec![item.clone()])?));
        }
        rows.push((values, item));
    }
    let mut failure = None;
    rows.sort_by(|(left, _), (right, _)| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        for ((left, right), (_, descending)) in left.iter().zip(right).zip(&keys) {
            match compare_keys(interp, left, right) {
                Ok(Ordering::Equal) => {}
                Ok(ordering) if *descending => return ordering.reverse(),
                Ok(ordering) => return ordering,
                Err(error) => {
                    failure = Some(error);
                    return Ordering::Equal;
                }
            }
        }
        Ordering::Equal
    });
    if let Some(error) = failure {
        return Err(error);
    }

    let result = result_array(runtime, element_type(&source), rows.into_iter().map(|(_, item)| item).collect());
    let stored = keys
        .into_iter()
        .map(|(selector, descending)| Value::table(Table::sequence([selector, Value::Bool(descending)])));
    if let Value::Table(table) = &result {
        table
            .borrow_mut()
            .set_str("__orderKeys", Value::table(Table::sequence(stored)));
    }
    Ok(vec![result])
}

/// Key equality: primitives by value, objects through `Equals`, plain
/// tables (anonymous packs) field by field
fn keys_equal(interp: &mut Interpreter, left: &Value, right: &Value) -> Result<bool, InterpError> {
    if left.raw_equals(right) {
        return Ok(true);
    }
    let (Value::Table(left_table), Value::Table(right_table)) = (left, right) else {
        return Ok(false);
    };
    if left_table.borrow().metatable.is_none() && right_table.borrow().metatable.is_none() {
        let (left_pairs, right_len): (Vec<(Value, Value)>, usize) = {
            let (left_table, right_table) = (left_table.borrow(), right_table.borrow());
            (
                left_table.pairs().map(|(key, value)| (key.clone(), value.clone())).collect(),
                right_table.len(),
            )
        };
        if left_pairs.len() != right_len {
            return Ok(false);
        }
        for (key, value) in left_pairs {
            let other = right_table.borrow().get(&key);
            if !keys_equal(interp, &value, &other)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }
    let method = interp.index(left, &Value::str("Equals"))?;
    if method.is_nil() {
        return Ok(false);
    }
    Ok(first(interp.call(&method, vec![left.clone(), right.clone()])?).is_truthy())
}

/// `Join`/`GroupJoin(outer, inner, outerKey, innerKey, result, comparer,
/// keyType, resultType)`
fn join(interp: &mut Interpreter, runtime: &Shared, args: &[Value], grouped: bool) -> NativeResult {
    let outer = collect(interp, &arg(args, 0))?;
    let inner_source = arg(args, 1);
    let inner = collect(interp, &inner_source)?;
    let (outer_key, inner_key, projection) = (arg(args, 2), arg(args, 3), arg(args, 4));

    let mut inner_keys = Vec::with_capacity(inner.len());
    for item in &inner {
        inner_keys.push(first(interp.call(&inner_key, vec![item.clone()])?));
    }
    let mut result = Vec::new();
    for item in outer {
        let key = first(interp.call(&outer_key, vec![item.clone()])?);
        let mut matches = Vec::new();
        for (candidate, candidate_key) in inner.iter().zip(&inner_keys) {
            if keys_equal(interp, &key, candidate_key)? {
                matches.push(candidate.clone());
            }
        }
        if grouped {
            let group = result_array(runtime, element_type(&inner_source), matches);
            result.push(first(interp.call(&projection, vec![item, group])?));
        } else {
            for candidate in matches {
                result.push(first(interp.call(&projection, vec![item.clone(), candidate])?));
            }
        }
        limit(result.len())?;
    }
    Ok(vec![result_array(runtime, arg(args, 7), result)])
}

/// `GroupBy(seq, key, keyType)` or `GroupBy(seq, key, element, keyType,
/// elementType)`; groups keep the order their keys first appear in
fn group_by(interp: &mut Interpreter, runtime: &Shared, grouping: &TableRef, args: &[Value]) -> NativeResult {
    let items = collect(interp, &arg(args, 0))?;
    let key_selector = arg(args, 1);
    let element_selector = Some(arg(args, 2)).filter(Value::is_callable);
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    for item in items {
        let key = first(interp.call(&key_selector, vec![item.clone()])?);
        let element = match &element_selector {
            Some(selector) => first(interp.call(selector, vec![item])?),
            None => item,
        };
        let mut position = None;
        for (index, (existing, _)) in groups.iter().enumerate() {
            if keys_equal(interp, existing, &key)? {
                position = Some(index);
                break;
            }
        }
        match position.and_then(|index| groups.get_mut(index)) {
            Some((_, members)) => members.push(element),
            None => groups.push((key, vec![element])),
        }
    }
    let groups = groups
        .into_iter()
        .map(|(key, members)| {
            let length = members.len() as i64;
            let mut table = Table::sequence(members);
            table.set_str("__length", Value::Int(length));
            table.set_str("Key", key);
            table.metatable = Some(Rc::clone(grouping));
            Value::table(table)
        })
        .collect();
    Ok(vec![result_array(runtime, Value::Table(Rc::clone(grouping)), groups)])
}

/// Operators method-call syntax reaches through templates: `Count`, `Any`,
/// `First`, `Sum`, `ToArray`, `ToList`
fn install_aggregates(linq: &TableRef, runtime: &Shared) {
    set_native(linq, "Count", |interp, args| {
        let items = filtered(interp, &args)?;
        Ok(vec![Value::Int(items.len() as i64)])
    });
    set_native(linq, "Any", |interp, args| Ok(vec![Value::Bool(!filtered(interp, &args)?.is_empty())]));
    set_native(linq, "First", |interp, args| match filtered(interp, &args)?.into_iter().next() {
        Some(item) => Ok(vec![item]),
        None => Err(raise(
            interp,
            "System.InvalidOperationException",
            "Sequence contains no matching element",
        )),
    });
    set_native(linq, "Sum", |interp, args| {
        let items = collect(interp, &arg(&args, 0))?;
        let selector = arg(&args, 1);
        let mut total = Value::Int(0);
        for item in items {
            let value = if selector.is_nil() {
                item
            } else {
                first(interp.call(&selector, vec![item])?)
            };
            total = match (&total, &value) {
                (Value::Int(left), Value::Int(right)) => Value::Int(left.wrapping_add(*right)),
                _ => match total.as_float().zip(value.as_float()) {
                    Some((left, right)) => Value::Float(left + right),
                    None => return Err(InterpError::bad_argument("Sum", "non-numeric element")),
                },
            };
        }
        Ok(vec![total])
    });
    for name in ["ToArray", "ToList"] {
        let shared = Rc::clone(runtime);
        set_native(linq, name, move |interp, args| {
            let source = arg(&args, 0);
            let items = collect(interp, &source)?;
            Ok(vec![result_array(&shared, element_type(&source), items)])
        });
    }
}

/// Source elements, filtered by the optional predicate in the second slot
fn filtered(interp: &mut Interpreter, args: &[Value]) -> Result<Vec<Value>, InterpError> {
    let items = collect(interp, &arg(args, 0))?;
    let predicate = arg(args, 1);
    if predicate.is_nil() {
        return Ok(items);
    }
    let mut kept = Vec::new();
    for item in items {
        if first(interp.call(&predicate, vec![item.clone()])?).is_truthy() {
            kept.push(item);
        }
    }
    Ok(kept)
}
