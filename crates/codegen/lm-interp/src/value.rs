//! Runtime value representation

use crate::env::Scope;
use crate::interpreter::{InterpError, Interpreter};
use indexmap::IndexMap;
use lm_target::Function;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared, mutable table
pub type TableRef = Rc<RefCell<Table>>;

/// Signature of a runtime helper implemented in Rust
pub type NativeFn = dyn Fn(&mut Interpreter, Vec<Value>) -> Result<Vec<Value>, InterpError>;

/// Runtime helper
pub struct Native {
    /// Name shown in errors and debug output
    pub name: String,
    /// Implementation
    pub func: Box<NativeFn>,
}

/// Function literal closed over its defining scope
pub struct Closure {
    /// Code
    pub function: Rc<Function>,
    /// Scope the literal was evaluated in
    pub env: Rc<Scope>,
}

/// Runtime value
#[derive(Clone, Default)]
pub enum Value {
    /// `nil`
    #[default]
    Nil,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Float(f64),
    /// String
    Str(Rc<str>),
    /// Table
    Table(TableRef),
    /// Closure
    Function(Rc<Closure>),
    /// Runtime helper
    Native(Rc<Native>),
}

impl Value {
    /// String value
    pub fn str(text: impl Into<Rc<str>>) -> Self {
        Self::Str(text.into())
    }

    /// Fresh table value
    pub fn table(table: Table) -> Self {
        Self::Table(Rc::new(RefCell::new(table)))
    }

    /// Runtime helper value
    pub fn native(
        name: impl Into<String>,
        func: impl Fn(&mut Interpreter, Vec<Value>) -> Result<Vec<Value>, InterpError> + 'static,
    ) -> Self {
        Self::Native(Rc::new(Native {
            name: name.into(),
            func: Box::new(func),
        }))
    }

    /// Type name as the target language reports it
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Int(_) | Self::Float(_) => "number",
            Self::Str(_) => "string",
            Self::Table(_) => "table",
            Self::Function(_) | Self::Native(_) => "function",
        }
    }

    /// Everything but `nil` and `false` is true
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Nil | Self::Bool(false))
    }

    /// Whether this is `nil`
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Integer value, accepting integral floats
    #[allow(clippy::float_cmp, reason = "integral check compares a float with its own truncation")]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Float(value) if value.trunc() == *value && value.is_finite() => Some(*value as i64),
            _ => None,
        }
    }

    /// Numeric value as a float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// String contents
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Table reference
    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Whether the value can be called
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function(_) | Self::Native(_))
    }

    /// Primitive equality: numbers by value, strings by contents, everything
    /// else by identity
    #[allow(clippy::float_cmp, reason = "target equality on numbers is exact")]
    pub fn raw_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Int(left), Self::Int(right)) => left == right,
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => self.as_float() == other.as_float(),
            (Self::Str(left), Self::Str(right)) => left == right,
            (Self::Table(left), Self::Table(right)) => Rc::ptr_eq(left, right),
            (Self::Function(left), Self::Function(right)) => Rc::ptr_eq(left, right),
            (Self::Native(left), Self::Native(right)) => Rc::ptr_eq(left, right),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.raw_equals(other)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::str(value)
    }
}

/// Text of a number the way the target language prints it
pub fn number_text(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{value:.1}");
    }
    format!("{value}")
}

impl fmt::Display for Value {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => write!(formatter, "nil"),
            Self::Bool(value) => write!(formatter, "{value}"),
            Self::Int(value) => write!(formatter, "{value}"),
            Self::Float(value) => write!(formatter, "{}", number_text(*value)),
            Self::Str(text) => write!(formatter, "{text}"),
            Self::Table(table) => match table.borrow().get_str("__name").as_str() {
                Some(name) => write!(formatter, "{name}"),
                None => write!(formatter, "table: {:p}", Rc::as_ptr(table)),
            },
            Self::Function(closure) => write!(formatter, "function: {:p}", Rc::as_ptr(closure)),
            Self::Native(native) => write!(formatter, "function: builtin {}", native.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(text) => write!(formatter, "{text:?}"),
            other => write!(formatter, "{other}"),
        }
    }
}

/// Hashable form of a table key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    /// Boolean key
    Bool(bool),
    /// Integer key; integral floats normalize here
    Int(i64),
    /// Non-integral float key, by bit pattern
    Float(u64),
    /// String key
    Str(Rc<str>),
    /// Table or function key, by identity
    Ref(usize),
}

impl Key {
    /// Key of a value; `nil` and NaN cannot be keys
    pub fn of(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Nil => return None,
            Value::Bool(value) => Self::Bool(*value),
            Value::Int(value) => Self::Int(*value),
            Value::Float(value) if value.is_nan() => return None,
            Value::Float(float) => match value.as_int() {
                Some(int) => Self::Int(int),
                None => Self::Float(float.to_bits()),
            },
            Value::Str(text) => Self::Str(Rc::clone(text)),
            Value::Table(table) => Self::Ref(Rc::as_ptr(table).cast::<()>() as usize),
            Value::Function(closure) => Self::Ref(Rc::as_ptr(closure).cast::<()>() as usize),
            Value::Native(native) => Self::Ref(Rc::as_ptr(native).cast::<()>() as usize),
        })
    }
}

/// Associative array with an optional metatable
///
/// Entries keep their insertion order and hold on to their key value, so
/// identity keys stay alive as long as the entry does.
#[derive(Default)]
pub struct Table {
    entries: IndexMap<Key, (Value, Value)>,
    /// Metatable consulted on failed lookups and calls
    pub metatable: Option<TableRef>,
}

impl Table {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence `{ items }` with keys `1..=n`
    pub fn sequence(items: impl IntoIterator<Item = Value>) -> Self {
        let mut table = Self::new();
        for (index, item) in (1_i64..).zip(items) {
            table.set_int(index, item);
        }
        table
    }

    /// Raw lookup
    pub fn get(&self, key: &Value) -> Value {
        Key::of(key)
            .and_then(|key| self.entries.get(&key))
            .map_or(Value::Nil, |(_, value)| value.clone())
    }

    /// Raw lookup by string key
    pub fn get_str(&self, name: &str) -> Value {
        self.entries
            .get(&Key::Str(Rc::from(name)))
            .map_or(Value::Nil, |(_, value)| value.clone())
    }

    /// Raw lookup by integer key
    pub fn get_int(&self, index: i64) -> Value {
        self.entries
            .get(&Key::Int(index))
            .map_or(Value::Nil, |(_, value)| value.clone())
    }

    /// Raw store; assigning `nil` removes the entry
    ///
    /// # Errors
    ///
    /// [`InterpError::InvalidKey`] for `nil` and NaN keys.
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), InterpError> {
        let Some(hashed) = Key::of(&key) else {
            return Err(InterpError::InvalidKey {
                kind: key.type_name(),
            });
        };
        if value.is_nil() {
            self.entries.shift_remove(&hashed);
        } else {
            self.entries.insert(hashed, (key, value));
        }
        Ok(())
    }

    /// Raw store by string key
    pub fn set_str(&mut self, name: &str, value: Value) {
        let text: Rc<str> = Rc::from(name);
        let key = Key::Str(Rc::clone(&text));
        if value.is_nil() {
            self.entries.shift_remove(&key);
        } else {
            self.entries.insert(key, (Value::Str(text), value));
        }
    }

    /// Raw store by integer key
    pub fn set_int(&mut self, index: i64, value: Value) {
        if value.is_nil() {
            self.entries.shift_remove(&Key::Int(index));
        } else {
            self.entries.insert(Key::Int(index), (Value::Int(index), value));
        }
    }

    /// Length operator: the last index of the `1..n` run
    pub fn border(&self) -> i64 {
        let mut index = 0;
        while self.entries.contains_key(&Key::Int(index + 1)) {
            index += 1;
        }
        index
    }

    /// Items `1..=border`
    pub fn sequence_items(&self) -> Vec<Value> {
        (1..=self.border()).map(|index| self.get_int(index)).collect()
    }

    /// Entries in insertion order
    pub fn pairs(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.values().map(|(key, value)| (key, value))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral_float_keys_normalize() {
        let mut table = Table::new();
        let set = table.set(Value::Float(2.0), Value::from("two"));
        let Ok(_) = set else {
            panic!("unexpected error");
        };
        assert_eq!(table.get(&Value::Int(2)), Value::from("two"));
        assert_eq!(table.border(), 0);
        table.set_int(1, Value::from(true));
        assert_eq!(table.border(), 2);
    }

    #[test]
    fn test_nil_assignment_removes() {
        let mut table = Table::sequence([Value::Int(1), Value::Int(2)]);
        table.set_int(2, Value::Nil);
        assert_eq!(table.len(), 1);
        assert!(matches!(table.set(Value::Nil, Value::Int(1)), Err(InterpError::InvalidKey { .. })));
    }

    #[test]
    fn test_truthiness_and_display() {
        assert!(Value::Int(0).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Nil.is_truthy());
        assert_eq!(Value::Float(3.0).to_string(), "3.0");
        assert_eq!(Value::Float(0.5).to_string(), "0.5");
        assert_eq!(Value::Int(3), Value::Float(3.0));
    }
}
