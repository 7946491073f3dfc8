//! Type registration and the type object protocol
//!
//! A type is a table carrying its members, `__name`, `__kind` and
//! `__index` pointing at itself; instances use it as their metatable. Every
//! type shares one metatable whose `__index` resolves inherited members
//! through `__inherits__` and whose `__call` constructs instances.

use super::{Shared, arg, set_native, table_arg};
use crate::interpreter::{InterpError, Interpreter, first};
use crate::value::{Table, TableRef, Value};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::iter;
use std::rc::Rc;
use tracing::debug;

/// Registration waiting for first access
struct Pending {
    kind: &'static str,
    body: Value,
    namespace: Value,
}

/// Type registry shared by the runtime helpers
pub(crate) struct Runtime {
    pending: FxHashMap<String, Pending>,
    generics: Vec<(TableRef, Vec<Value>, TableRef)>,
    pub(crate) arrays: Vec<(Value, TableRef)>,
    pub(crate) nullables: Vec<(Value, TableRef)>,
    type_meta: TableRef,
    generic_meta: TableRef,
    namespace_meta: TableRef,
    pub(crate) object: TableRef,
}

impl Runtime {
    pub(crate) fn new() -> Self {
        Self {
            pending: FxHashMap::default(),
            generics: Vec::new(),
            arrays: Vec::new(),
            nullables: Vec::new(),
            type_meta: Rc::default(),
            generic_meta: Rc::default(),
            namespace_meta: Rc::default(),
            object: Rc::default(),
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

pub(super) fn install(interp: &mut Interpreter, runtime: &Shared) {
    let (type_meta, generic_meta, namespace_meta) = {
        let state = runtime.borrow();
        (
            Rc::clone(&state.type_meta),
            Rc::clone(&state.generic_meta),
            Rc::clone(&state.namespace_meta),
        )
    };

    let shared = Rc::clone(runtime);
    set_native(&type_meta, "__index", move |interp, args| {
        let ty = table_arg("__index", &args, 0)?;
        Ok(vec![resolve_member(interp, &shared, &ty, &arg(&args, 1))?])
    });
    set_native(&type_meta, "__call", |interp, args| {
        let ty = table_arg("new", &args, 0)?;
        Ok(vec![construct(interp, &ty, None, args.into_iter().skip(1).collect())?])
    });

    let shared = Rc::clone(runtime);
    set_native(&generic_meta, "__call", move |interp, args| {
        let generic = table_arg("generic", &args, 0)?;
        Ok(vec![instantiate(interp, &shared, &generic, args.into_iter().skip(1).collect())?])
    });
    let shared = Rc::clone(runtime);
    set_native(&generic_meta, "__index", move |interp, args| {
        let generic = table_arg("__index", &args, 0)?;
        Ok(vec![load_nested(interp, &shared, &generic, &arg(&args, 1))?.unwrap_or_default()])
    });

    let shared = Rc::clone(runtime);
    set_native(&namespace_meta, "__index", move |interp, args| {
        let namespace = table_arg("__index", &args, 0)?;
        let Some(name) = args.get(1).and_then(Value::as_str) else {
            return Ok(vec![Value::Nil]);
        };
        let prefix = namespace.borrow().get_str("__namespace");
        let path = join_path(prefix.as_str().unwrap_or_default(), name);
        Ok(vec![load_pending(interp, &shared, &path)?.unwrap_or_default()])
    });
    interp.globals().borrow_mut().metatable = Some(namespace_meta);

    let system = ensure_namespace(interp, runtime, "System");
    let shared = Rc::clone(runtime);
    set_native(&system, "namespace", move |interp, args| {
        let name = arg(&args, 0);
        let name = name.as_str().unwrap_or_default();
        let namespace = Value::Table(ensure_namespace(interp, &shared, name));
        let registrar = registrar(&shared, name, &namespace);
        interp.call(&arg(&args, 1), vec![registrar])?;
        Ok(Vec::new())
    });

    let object = Rc::clone(&runtime.borrow().object);
    set_native(&object, "__ctor__", |_, _| Ok(Vec::new()));
    set_native(&object, "ToString", |_, args| Ok(vec![Value::str(type_name_of(&arg(&args, 0)))]));
    set_native(&object, "Equals", |_, args| Ok(vec![Value::Bool(arg(&args, 0).raw_equals(&arg(&args, 1)))]));
    set_native(&object, "GetType", |_, args| {
        let this = arg(&args, 0);
        let meta = this.as_table().and_then(|table| table.borrow().metatable.clone());
        Ok(vec![meta.map_or(Value::Nil, Value::Table)])
    });
    finish_native_type(interp, runtime, &object, "System.Object", "class", None);

    install_primitives(interp, runtime);
    install_exceptions(interp, runtime);
    install_type_helpers(interp, runtime, &system);
}

/// Object passed to a namespace body: `class`, `struct`, `interface` and
/// `enum` registrars bound to the namespace prefix
fn registrar(runtime: &Shared, prefix: &str, namespace: &Value) -> Value {
    let registrar: TableRef = Rc::default();
    for kind in ["class", "struct", "interface", "enum"] {
        let shared = Rc::clone(runtime);
        let prefix = prefix.to_owned();
        let namespace = namespace.clone();
        set_native(&registrar, kind, move |_, args| {
            let name = arg(&args, 0);
            let Some(name) = name.as_str() else {
                return Err(InterpError::bad_argument(kind, "type name must be a string"));
            };
            let path = join_path(&prefix, name);
            debug!(%path, kind, "registering type");
            shared.borrow_mut().pending.insert(
                path,
                Pending {
                    kind,
                    body: arg(&args, 1),
                    namespace: namespace.clone(),
                },
            );
            Ok(Vec::new())
        });
    }
    Value::Table(registrar)
}

/// Namespace table at a dotted path, created on demand
pub(crate) fn ensure_namespace(interp: &Interpreter, runtime: &Shared, name: &str) -> TableRef {
    let meta = Rc::clone(&runtime.borrow().namespace_meta);
    let mut current = Rc::clone(interp.globals());
    let mut prefix = String::new();
    for segment in name.split('.').filter(|segment| !segment.is_empty()) {
        prefix = join_path(&prefix, segment);
        let existing = current.borrow().get_str(segment);
        current = match existing {
            Value::Table(table) => table,
            _ => {
                let mut table = Table::new();
                table.set_str("__namespace", Value::str(prefix.as_str()));
                table.metatable = Some(Rc::clone(&meta));
                let table = Rc::new(RefCell::new(table));
                current.borrow_mut().set_str(segment, Value::Table(Rc::clone(&table)));
                table
            }
        };
    }
    current
}

/// Define a registered type if `path` names one
fn load_pending(interp: &mut Interpreter, runtime: &Shared, path: &str) -> Result<Option<Value>, InterpError> {
    let pending = runtime.borrow_mut().pending.remove(path);
    let Some(pending) = pending else {
        return Ok(None);
    };
    debug!(path, kind = pending.kind, "defining type");
    let result = first(interp.call(&pending.body, vec![pending.namespace])?);
    match result {
        Value::Table(ty) => {
            prepare_type(runtime, &ty, path, pending.kind, Some(path));
            store(interp, path, Value::Table(Rc::clone(&ty)))?;
            run_static_ctor(interp, &ty)?;
            Ok(Some(Value::Table(ty)))
        }
        body if body.is_callable() => {
            let mut generic = Table::new();
            generic.set_str("__name", Value::str(path));
            generic.set_str("__path", Value::str(path));
            generic.set_str("__kind", Value::str(pending.kind));
            generic.set_str("__generic", body);
            generic.metatable = Some(Rc::clone(&runtime.borrow().generic_meta));
            let generic = Value::table(generic);
            store(interp, path, generic.clone())?;
            Ok(Some(generic))
        }
        other => Err(InterpError::bad_argument(
            pending.kind,
            format!("body of {path} returned a {} value", other.type_name()),
        )),
    }
}

/// Nested type registered under a type's path
fn load_nested(
    interp: &mut Interpreter,
    runtime: &Shared,
    ty: &TableRef,
    key: &Value,
) -> Result<Option<Value>, InterpError> {
    let Some(name) = key.as_str().filter(|name| !name.starts_with("__")) else {
        return Ok(None);
    };
    let path = ty.borrow().get_str("__path");
    match path.as_str() {
        Some(path) => load_pending(interp, runtime, &join_path(path, name)),
        None => Ok(None),
    }
}

fn store(interp: &mut Interpreter, path: &str, value: Value) -> Result<(), InterpError> {
    let (parent, last) = path.rsplit_once('.').unwrap_or(("", path));
    let parent = if parent.is_empty() {
        Value::Table(Rc::clone(interp.globals()))
    } else {
        interp.global(parent)?
    };
    match parent {
        Value::Table(table) => {
            table.borrow_mut().set_str(last, value);
            Ok(())
        }
        other => Err(InterpError::bad_argument(
            "namespace",
            format!("cannot define {path} inside a {} value", other.type_name()),
        )),
    }
}

/// Give a type table its identity and the shared type metatable
fn prepare_type(runtime: &Shared, ty: &TableRef, name: &str, kind: &str, path: Option<&str>) {
    let meta = Rc::clone(&runtime.borrow().type_meta);
    let this = Value::Table(Rc::clone(ty));
    let mut table = ty.borrow_mut();
    table.set_str("__name", Value::str(name));
    table.set_str("__kind", Value::str(kind));
    if let Some(path) = path {
        table.set_str("__path", Value::str(path));
    }
    table.set_str("__index", this);
    table.metatable = Some(meta);
}

fn run_static_ctor(interp: &mut Interpreter, ty: &TableRef) -> Result<(), InterpError> {
    let ctor = ty.borrow().get_str("__staticCtor__");
    if ctor.is_callable() {
        interp.call(&ctor, vec![Value::Table(Rc::clone(ty))])?;
    }
    Ok(())
}

/// Type implemented in Rust, stored at its path with its base already known
pub(crate) fn finish_native_type(
    interp: &Interpreter,
    runtime: &Shared,
    ty: &TableRef,
    path: &str,
    kind: &str,
    base: Option<&TableRef>,
) {
    prepare_type(runtime, ty, path, kind, Some(path));
    {
        let mut table = ty.borrow_mut();
        table.set_str("__resolved", Value::Bool(true));
        table.set_str("__base", base.map_or(Value::Nil, |base| Value::Table(Rc::clone(base))));
    }
    let (parent, last) = path.rsplit_once('.').unwrap_or(("", path));
    let parent = ensure_namespace(interp, runtime, parent);
    parent.borrow_mut().set_str(last, Value::Table(Rc::clone(ty)));
}

/// Type implemented in Rust that lives at no path
pub(crate) fn anonymous_type(runtime: &Shared, name: &str, kind: &str, base: Option<&TableRef>) -> TableRef {
    let ty: TableRef = Rc::default();
    prepare_type(runtime, &ty, name, kind, None);
    let mut table = ty.borrow_mut();
    table.set_str("__resolved", Value::Bool(true));
    table.set_str("__base", base.map_or(Value::Nil, |base| Value::Table(Rc::clone(base))));
    drop(table);
    ty
}

/// Type implemented in Rust, stored at `path`
pub(crate) fn native_type(
    interp: &Interpreter,
    runtime: &Shared,
    path: &str,
    kind: &str,
    base: Option<&TableRef>,
) -> TableRef {
    let ty: TableRef = Rc::default();
    finish_native_type(interp, runtime, &ty, path, kind, base);
    ty
}

/// `T(args)` for a generic definition, cached per argument identity
fn instantiate(
    interp: &mut Interpreter,
    runtime: &Shared,
    generic: &TableRef,
    args: Vec<Value>,
) -> Result<Value, InterpError> {
    let cached = runtime.borrow().generics.iter().find_map(|(definition, cached_args, ty)| {
        let same = Rc::ptr_eq(definition, generic)
            && cached_args.len() == args.len()
            && cached_args.iter().zip(&args).all(|(left, right)| left.raw_equals(right));
        same.then(|| Rc::clone(ty))
    });
    if let Some(ty) = cached {
        return Ok(Value::Table(ty));
    }
    let (body, path, kind) = {
        let definition = generic.borrow();
        (
            definition.get_str("__generic"),
            definition.get_str("__path").to_string(),
            definition.get_str("__kind").as_str().unwrap_or("class").to_owned(),
        )
    };
    let Value::Table(ty) = first(interp.call(&body, args.clone())?) else {
        return Err(InterpError::bad_argument(&path, "generic body did not return a type table"));
    };
    let name = format!(
        "{path}[{}]",
        args.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
    );
    debug!(%name, "instantiating generic type");
    prepare_type(runtime, &ty, &name, &kind, None);
    runtime
        .borrow_mut()
        .generics
        .push((Rc::clone(generic), args, Rc::clone(&ty)));
    run_static_ctor(interp, &ty)?;
    Ok(Value::Table(ty))
}

/// Member lookup that missed the type table itself: nested types, then the
/// base chain, then `System.Object`
fn resolve_member(interp: &mut Interpreter, runtime: &Shared, ty: &TableRef, key: &Value) -> Result<Value, InterpError> {
    if let Some(nested) = load_nested(interp, runtime, ty, key)? {
        return Ok(nested);
    }
    ensure_inherits(interp, ty)?;
    let base = ty.borrow().get_str("__base");
    if base.as_table().is_some() {
        return interp.index(&base, key);
    }
    let object = Rc::clone(&runtime.borrow().object);
    if Rc::ptr_eq(&object, ty) {
        return Ok(Value::Nil);
    }
    interp.index(&Value::Table(object), key)
}

/// Evaluate `__inherits__` once, splitting it into `__base` and
/// `__interfaces`
pub(crate) fn ensure_inherits(interp: &mut Interpreter, ty: &TableRef) -> Result<(), InterpError> {
    if ty.borrow().get_str("__resolved").is_truthy() {
        return Ok(());
    }
    ty.borrow_mut().set_str("__resolved", Value::Bool(true));
    let inherits = ty.borrow().get_str("__inherits__");
    if !inherits.is_callable() {
        return Ok(());
    }
    let globals = Value::Table(Rc::clone(interp.globals()));
    let supers = first(interp.call(&inherits, vec![globals])?);
    let items = supers.as_table().map(|list| list.borrow().sequence_items()).unwrap_or_default();
    let mut base = Value::Nil;
    let mut interfaces = Vec::new();
    for item in items {
        let is_interface = item
            .as_table()
            .is_some_and(|table| table.borrow().get_str("__kind").as_str() == Some("interface"));
        if is_interface || !base.is_nil() {
            interfaces.push(item);
        } else {
            base = item;
        }
    }
    let mut table = ty.borrow_mut();
    table.set_str("__base", base);
    table.set_str("__interfaces", Value::table(Table::sequence(interfaces)));
    Ok(())
}

/// New instance of `ty`, running constructor `index` (1-based) when the
/// type has several
pub(crate) fn construct(
    interp: &mut Interpreter,
    ty: &TableRef,
    index: Option<i64>,
    args: Vec<Value>,
) -> Result<Value, InterpError> {
    let mut object = Table::new();
    object.metatable = Some(Rc::clone(ty));
    let object = Value::table(object);
    let ctor = interp.index(&Value::Table(Rc::clone(ty)), &Value::str("__ctor__"))?;
    let ctor = match ctor {
        Value::Table(list) => list.borrow().get_int(index.unwrap_or(1)),
        other => other,
    };
    if !ctor.is_nil() {
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(object.clone());
        all.extend(args);
        interp.call(&ctor, all)?;
    }
    Ok(object)
}

/// `__name` of a value's type
pub(crate) fn type_name_of(value: &Value) -> String {
    match value {
        Value::Table(table) => {
            let meta = table.borrow().metatable.clone();
            meta.map_or_else(|| "table".to_owned(), |meta| Value::Table(meta).to_string())
        }
        other => other.type_name().to_owned(),
    }
}

/// Whether `sub` is `target` or derives from it
fn type_extends(interp: &mut Interpreter, sub: &TableRef, target: &TableRef) -> Result<bool, InterpError> {
    if Rc::ptr_eq(sub, target) {
        return Ok(true);
    }
    ensure_inherits(interp, sub)?;
    let (base, interfaces) = {
        let table = sub.borrow();
        (table.get_str("__base"), table.get_str("__interfaces"))
    };
    let interfaces = interfaces.as_table().map(|list| list.borrow().sequence_items()).unwrap_or_default();
    for interface in interfaces.iter().chain(iter::once(&base)) {
        if let Value::Table(parent) = interface
            && type_extends(interp, parent, target)?
        {
            return Ok(true);
        }
    }
    Ok(false)
}

/// `System.is(value, T)`
pub(crate) fn is_instance(interp: &mut Interpreter, runtime: &Shared, value: &Value, ty: &Value) -> Result<bool, InterpError> {
    let Value::Table(target) = ty else {
        return Err(InterpError::bad_argument("System.is", "type must be a table"));
    };
    if value.is_nil() {
        return Ok(false);
    }
    if Rc::ptr_eq(target, &runtime.borrow().object) {
        return Ok(true);
    }
    let (underlying, primitive) = {
        let table = target.borrow();
        (table.get_str("__underlying"), table.get_str("__primitive"))
    };
    if !underlying.is_nil() {
        return is_instance(interp, runtime, value, &underlying);
    }
    if let Some(primitive) = primitive.as_str() {
        return Ok(match primitive {
            "int" | "char" => matches!(value, Value::Int(_)),
            "float" => matches!(value, Value::Int(_) | Value::Float(_)),
            "string" => matches!(value, Value::Str(_)),
            "bool" => matches!(value, Value::Bool(_)),
            _ => false,
        });
    }
    let is_enum = target.borrow().get_str("__kind").as_str() == Some("enum");
    if is_enum {
        return Ok(matches!(value, Value::Int(_)));
    }
    let meta = value.as_table().and_then(|table| table.borrow().metatable.clone());
    match meta {
        Some(meta) => type_extends(interp, &meta, target),
        None => Ok(false),
    }
}

/// `System.cast(T, value)`: numeric conversion or a checked reference cast
fn cast(interp: &mut Interpreter, runtime: &Shared, ty: &Value, value: Value) -> Result<Value, InterpError> {
    if value.is_nil() {
        return Ok(value);
    }
    let Value::Table(target) = ty else {
        return Err(InterpError::bad_argument("System.cast", "type must be a table"));
    };
    let (underlying, primitive) = {
        let table = target.borrow();
        (table.get_str("__underlying"), table.get_str("__primitive"))
    };
    if !underlying.is_nil() {
        return cast(interp, runtime, &underlying, value);
    }
    let converted = match (primitive.as_str(), &value) {
        (Some("int" | "char"), Value::Int(_)) => Some(value.clone()),
        (Some("int" | "char"), Value::Float(float)) => Some(Value::Int(float.trunc() as i64)),
        (Some("float"), Value::Int(int)) => Some(Value::Float(*int as f64)),
        (Some("float"), Value::Float(_)) => Some(value.clone()),
        (Some(_), _) => None,
        (None, _) => is_instance(interp, runtime, &value, ty)?.then(|| value.clone()),
    };
    converted.ok_or_else(|| InterpError::InvalidCast {
        value: type_name_of(&value),
        ty: ty.to_string(),
    })
}

fn install_primitives(interp: &Interpreter, runtime: &Shared) {
    let primitives: [(&str, &str, Value); 14] = [
        ("Int32", "int", Value::Int(0)),
        ("Int64", "int", Value::Int(0)),
        ("Int16", "int", Value::Int(0)),
        ("UInt16", "int", Value::Int(0)),
        ("UInt32", "int", Value::Int(0)),
        ("UInt64", "int", Value::Int(0)),
        ("Byte", "int", Value::Int(0)),
        ("SByte", "int", Value::Int(0)),
        ("Char", "char", Value::Int(0)),
        ("Double", "float", Value::Float(0.0)),
        ("Single", "float", Value::Float(0.0)),
        ("Decimal", "float", Value::Float(0.0)),
        ("Boolean", "bool", Value::Bool(false)),
        ("String", "string", Value::Nil),
    ];
    let object = Rc::clone(&runtime.borrow().object);
    for (name, primitive, default) in primitives {
        let kind = if primitive == "string" { "class" } else { "struct" };
        let ty = native_type(interp, runtime, &format!("System.{name}"), kind, Some(&object));
        ty.borrow_mut().set_str("__primitive", Value::str(primitive));
        set_native(&ty, "__default__", move |_, _| Ok(vec![default.clone()]));
    }
}

/// Exception hierarchy raised by the program and by runtime failures
fn install_exceptions(interp: &Interpreter, runtime: &Shared) {
    let object = Rc::clone(&runtime.borrow().object);
    let exception = native_type(interp, runtime, "System.Exception", "class", Some(&object));
    set_native(&exception, "__ctor__", |_, args| {
        let this = table_arg("System.Exception", &args, 0)?;
        let message = match arg(&args, 1) {
            Value::Nil => Value::str(format!("Exception of type '{}' was thrown.", type_name_of(&arg(&args, 0)))),
            message => message,
        };
        let mut table = this.borrow_mut();
        table.set_str("Message", message);
        table.set_str("InnerException", arg(&args, 2));
        Ok(Vec::new())
    });
    set_native(&exception, "getMessage", |interp, args| {
        Ok(vec![interp.index(&arg(&args, 0), &Value::str("Message"))?])
    });
    set_native(&exception, "ToString", |interp, args| {
        let this = arg(&args, 0);
        let message = interp.index(&this, &Value::str("Message"))?;
        Ok(vec![Value::str(format!("{}: {message}", type_name_of(&this)))])
    });

    let argument = native_type(interp, runtime, "System.ArgumentException", "class", Some(&exception));
    native_type(interp, runtime, "System.ArgumentNullException", "class", Some(&argument));
    for name in [
        "NullReferenceException",
        "DivideByZeroException",
        "InvalidCastException",
        "IndexOutOfRangeException",
        "InvalidOperationException",
        "NotSupportedException",
        "NotImplementedException",
    ] {
        native_type(interp, runtime, &format!("System.{name}"), "class", Some(&exception));
    }
}

/// Instance of the exception type at `path`
pub(crate) fn new_exception(interp: &mut Interpreter, path: &str, message: &str) -> Result<Value, InterpError> {
    let ty = interp.global(path)?;
    let ty = table_arg(path, &[ty], 0)?;
    construct(interp, &ty, None, vec![Value::str(message)])
}

/// Exception value a `catch` observes for an error
///
/// # Errors
///
/// Errors the program may not observe are handed back unchanged.
pub(crate) fn exception_for(interp: &mut Interpreter, error: InterpError) -> Result<Value, InterpError> {
    if !error.is_catchable() {
        return Err(error);
    }
    let path = match &error {
        InterpError::Thrown(value) => return Ok(value.clone()),
        InterpError::DivisionByZero => "System.DivideByZeroException",
        InterpError::Index { kind: "nil", .. } | InterpError::Call { kind: "nil", .. } => {
            "System.NullReferenceException"
        }
        InterpError::InvalidCast { .. } => "System.InvalidCastException",
        _ => "System.Exception",
    };
    new_exception(interp, path, &error.to_string())
}

/// Error raising an exception of the type at `path`
pub(crate) fn raise(interp: &mut Interpreter, path: &str, message: &str) -> InterpError {
    match new_exception(interp, path, message) {
        Ok(exception) => InterpError::Thrown(exception),
        Err(error) => error,
    }
}

fn install_type_helpers(interp: &Interpreter, runtime: &Shared, system: &TableRef) {
    set_native(system, "new", |interp, args| {
        let ty = table_arg("System.new", &args, 0)?;
        let index = arg(&args, 1).as_int();
        Ok(vec![construct(interp, &ty, index, args.into_iter().skip(2).collect())?])
    });
    let shared = Rc::clone(runtime);
    set_native(system, "is", move |interp, args| {
        Ok(vec![Value::Bool(is_instance(interp, &shared, &arg(&args, 0), &arg(&args, 1))?)])
    });
    let shared = Rc::clone(runtime);
    set_native(system, "as", move |interp, args| {
        let value = arg(&args, 0);
        let matches = is_instance(interp, &shared, &value, &arg(&args, 1))?;
        Ok(vec![if matches { value } else { Value::Nil }])
    });
    let shared = Rc::clone(runtime);
    set_native(system, "cast", move |interp, args| {
        Ok(vec![cast(interp, &shared, &arg(&args, 0), arg(&args, 1))?])
    });
    set_native(system, "typeof", |_, args| Ok(vec![arg(&args, 0)]));
    set_native(system, "default", |interp, args| {
        let ty = arg(&args, 0);
        if ty.as_table().is_some_and(|table| !table.borrow().get_str("__underlying").is_nil()) {
            return Ok(vec![Value::Nil]);
        }
        let default = match &ty {
            Value::Table(_) => interp.index(&ty, &Value::str("__default__"))?,
            _ => Value::Nil,
        };
        if default.is_callable() {
            return Ok(vec![first(interp.call(&default, Vec::new())?)]);
        }
        Ok(vec![Value::Nil])
    });

    let shared = Rc::clone(runtime);
    set_native(system, "Nullable", move |_, args| Ok(vec![nullable_type(&shared, arg(&args, 0))]));

    let object = Rc::clone(&runtime.borrow().object);
    native_type(interp, runtime, "System.AnonymousType", "class", Some(&object));
}

/// `System.Nullable(T)`, one table per underlying type
fn nullable_type(runtime: &Shared, underlying: Value) -> Value {
    let cached = runtime
        .borrow()
        .nullables
        .iter()
        .find(|(inner, _)| inner.raw_equals(&underlying))
        .map(|(_, ty)| Rc::clone(ty));
    if let Some(ty) = cached {
        return Value::Table(ty);
    }
    let ty = anonymous_type(runtime, &format!("System.Nullable[{underlying}]"), "struct", None);
    ty.borrow_mut().set_str("__underlying", underlying.clone());
    runtime.borrow_mut().nullables.push((underlying, Rc::clone(&ty)));
    Value::Table(ty)
}
