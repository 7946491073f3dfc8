//! Target AST evaluator
//!
//! Statements run against a chain of [`Scope`]s; closures capture the scope
//! they were created in, and every loop iteration gets a fresh one. Calls
//! return every value they produce and callers truncate or expand them the
//! way the target language does.

use crate::env::Scope;
use crate::runtime;
use crate::value::{Closure, Table, TableRef, Value, number_text};
use lm_target::{BinOp, Chunk, Expr, IfStmt, Literal, Name, Stmt, TableItem, UnOp};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, trace};

/// Nesting limit for calls, natives included
pub const MAX_CALL_DEPTH: usize = 64;

/// Longest `__index` chain followed before giving up
const MAX_INDEX_CHAIN: usize = 100;

/// Interpreter error
#[derive(Debug, Error)]
pub enum InterpError {
    /// Exception thrown by the program and never caught
    #[error("unhandled exception: {0}")]
    Thrown(Value),
    /// Indexing something that is not a table
    #[error("attempt to index a {kind} value (key '{key}')")]
    Index {
        /// Type of the indexed value
        kind: &'static str,
        /// Key being looked up
        key: String,
    },
    /// Calling something that is not a function
    #[error("attempt to call a {kind} value ({callee})")]
    Call {
        /// Type of the called value
        kind: &'static str,
        /// Source of the callee
        callee: String,
    },
    /// Operator applied to unsuitable operands
    #[error("attempt to perform '{op}' on {left} and {right}")]
    Operator {
        /// Operator token
        op: String,
        /// Left operand type
        left: &'static str,
        /// Right operand type
        right: &'static str,
    },
    /// `nil` or NaN used as a table key
    #[error("table index is {kind}")]
    InvalidKey {
        /// Type of the key
        kind: &'static str,
    },
    /// Integer division or remainder by zero
    #[error("attempt to divide by zero")]
    DivisionByZero,
    /// Failed checked conversion
    #[error("cannot cast {value} to {ty}")]
    InvalidCast {
        /// Converted value
        value: String,
        /// Target type
        ty: String,
    },
    /// Runtime helper called with arguments it cannot use
    #[error("bad argument to '{helper}': {message}")]
    BadArgument {
        /// Helper name
        helper: String,
        /// What was wrong
        message: String,
    },
    /// `goto` without a matching label in an enclosing block
    #[error("no visible label '{0}' for goto")]
    UnknownLabel(String),
    /// Call nesting exceeded [`MAX_CALL_DEPTH`]
    #[error("call depth exceeded {0}")]
    StackOverflow(usize),
    /// `...` read outside a vararg function
    #[error("'...' outside a vararg function")]
    Vararg,
    /// Node the evaluator has no meaning for
    #[error("{0} cannot be evaluated")]
    Unsupported(&'static str),
}

impl InterpError {
    /// Whether a `try` in the program may observe this error
    pub fn is_catchable(&self) -> bool {
        !matches!(
            self,
            Self::UnknownLabel(_) | Self::StackOverflow(_) | Self::Vararg | Self::Unsupported(_)
        )
    }

    pub(crate) fn bad_argument(helper: &str, message: impl Into<String>) -> Self {
        Self::BadArgument {
            helper: helper.to_owned(),
            message: message.into(),
        }
    }
}

/// How a statement left
enum Flow {
    Normal,
    Break,
    Return(Vec<Value>),
    Goto(Name),
}

/// Assignable location
enum Place {
    Var(Name),
    Field(Value, Value),
}

/// First value of a result list
pub fn first(values: Vec<Value>) -> Value {
    values.into_iter().next().unwrap_or_default()
}

/// Interpreter state
pub struct Interpreter {
    globals: TableRef,
    depth: usize,
    varargs: Vec<Vec<Value>>,
    /// Sinks of the iterator bodies currently running
    pub(crate) yields: Vec<Vec<Value>>,
    output: Vec<String>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Interpreter with the runtime library installed
    pub fn new() -> Self {
        let mut interpreter = Self::bare();
        runtime::install(&mut interpreter);
        interpreter
    }

    /// Interpreter with empty globals
    pub fn bare() -> Self {
        Self {
            globals: Rc::new(RefCell::new(Table::new())),
            depth: 0,
            varargs: Vec::new(),
            yields: Vec::new(),
            output: Vec::new(),
        }
    }

    /// Global table
    pub fn globals(&self) -> &TableRef {
        &self.globals
    }

    /// Set a global variable
    pub fn set_global(&self, name: &str, value: Value) {
        self.globals.borrow_mut().set_str(name, value);
    }

    /// Lines written by `print`
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub(crate) fn print_line(&mut self, line: String) {
        trace!(%line, "print");
        self.output.push(line);
    }

    /// Run a chunk and return what its top level returned
    ///
    /// # Errors
    ///
    /// Any runtime error, including uncaught program exceptions.
    pub fn run(&mut self, chunk: &Chunk) -> Result<Vec<Value>, InterpError> {
        debug!(statements = chunk.body.stmts.len(), "running chunk");
        let scope = Scope::root();
        match self.exec_block(&chunk.body.stmts, &scope)? {
            Flow::Return(values) => Ok(values),
            Flow::Normal => Ok(Vec::new()),
            Flow::Break => Err(InterpError::Unsupported("break outside a loop")),
            Flow::Goto(label) => Err(InterpError::UnknownLabel(label.to_string())),
        }
    }

    /// Value at a dotted global path, `nil` when a step is missing
    ///
    /// # Errors
    ///
    /// Indexing through a non-table.
    pub fn global(&mut self, dotted: &str) -> Result<Value, InterpError> {
        let mut parts = dotted.split('.');
        let mut value = self.global_var(parts.next().unwrap_or_default())?;
        for part in parts {
            value = self.index(&value, &Value::str(part))?;
        }
        Ok(value)
    }

    /// Global variable, consulting the globals' metatable on a miss
    fn global_var(&mut self, name: &str) -> Result<Value, InterpError> {
        let globals = Value::Table(Rc::clone(&self.globals));
        self.index(&globals, &Value::str(name))
    }

    /// Call the function at a dotted global path
    ///
    /// # Errors
    ///
    /// Any runtime error raised by the call.
    pub fn call_path(&mut self, dotted: &str, args: Vec<Value>) -> Result<Vec<Value>, InterpError> {
        let function = self.global(dotted)?;
        if !function.is_callable() && function.as_table().is_none() {
            return Err(InterpError::Call {
                kind: function.type_name(),
                callee: dotted.to_owned(),
            });
        }
        self.call(&function, args)
    }

    /// Call a value with the given arguments
    ///
    /// # Errors
    ///
    /// Calling a non-callable value, or any error raised by the callee.
    pub fn call(&mut self, function: &Value, args: Vec<Value>) -> Result<Vec<Value>, InterpError> {
        match function {
            Value::Function(closure) => self.call_closure(closure, args),
            Value::Native(native) => {
                let native = Rc::clone(native);
                self.enter()?;
                let result = (native.func)(self, args);
                self.depth -= 1;
                result
            }
            Value::Table(table) => {
                let handler = metamethod(table, "__call");
                if !handler.is_callable() {
                    return Err(InterpError::Call {
                        kind: "table",
                        callee: function.to_string(),
                    });
                }
                let mut all = Vec::with_capacity(args.len() + 1);
                all.push(function.clone());
                all.extend(args);
                self.call(&handler, all)
            }
            other => Err(InterpError::Call {
                kind: other.type_name(),
                callee: other.to_string(),
            }),
        }
    }

    fn enter(&mut self) -> Result<(), InterpError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(InterpError::StackOverflow(MAX_CALL_DEPTH));
        }
        self.depth += 1;
        Ok(())
    }

    fn call_closure(&mut self, closure: &Rc<Closure>, args: Vec<Value>) -> Result<Vec<Value>, InterpError> {
        self.enter()?;
        let scope = Scope::child(&closure.env);
        let function = &closure.function;
        let mut args = args.into_iter();
        for param in &function.params {
            scope.declare(param.as_str(), args.next().unwrap_or_default());
        }
        self.varargs
            .push(if function.vararg { args.collect() } else { Vec::new() });
        let flow = self.exec_block(&function.body.stmts, &scope);
        self.varargs.pop();
        self.depth -= 1;
        match flow? {
            Flow::Return(values) => Ok(values),
            Flow::Normal => Ok(Vec::new()),
            Flow::Break => Err(InterpError::Unsupported("break outside a loop")),
            Flow::Goto(label) => Err(InterpError::UnknownLabel(label.to_string())),
        }
    }

    /// `target[key]`, following `__index`
    ///
    /// # Errors
    ///
    /// Indexing a non-table, or an error raised by an `__index` function.
    pub fn index(&mut self, target: &Value, key: &Value) -> Result<Value, InterpError> {
        let mut current = target.clone();
        for _ in 0..MAX_INDEX_CHAIN {
            let Value::Table(table) = &current else {
                return Err(InterpError::Index {
                    kind: current.type_name(),
                    key: key.to_string(),
                });
            };
            let raw = table.borrow().get(key);
            if !raw.is_nil() {
                return Ok(raw);
            }
            match metamethod(table, "__index") {
                Value::Nil => return Ok(Value::Nil),
                next @ Value::Table(_) => current = next,
                handler => return Ok(first(self.call(&handler, vec![current.clone(), key.clone()])?)),
            }
        }
        Ok(Value::Nil)
    }

    fn exec_block(&mut self, stmts: &[Stmt], scope: &Rc<Scope>) -> Result<Flow, InterpError> {
        let mut pc = 0;
        while let Some(stmt) = stmts.get(pc) {
            pc += 1;
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                Flow::Goto(label) => match find_label(stmts, &label) {
                    Some(position) => pc = position + 1,
                    None => return Ok(Flow::Goto(label)),
                },
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    /// Run a nested block in its own scope
    fn exec_nested(&mut self, stmts: &[Stmt], scope: &Rc<Scope>) -> Result<Flow, InterpError> {
        let inner = Scope::child(scope);
        self.exec_block(stmts, &inner)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Flow, InterpError> {
        match stmt {
            Stmt::Local { names, values } => {
                let values = self.eval_multi(values, scope)?;
                let mut values = values.into_iter();
                for name in names {
                    scope.declare(name.as_str(), values.next().unwrap_or_default());
                }
            }
            Stmt::LocalFunction { name, function } => {
                scope.declare(name.as_str(), Value::Nil);
                let closure = Value::Function(Rc::new(Closure {
                    function: Rc::new(function.clone()),
                    env: Rc::clone(scope),
                }));
                if let Some(slot) = scope.lookup(name.as_str()) {
                    *slot.borrow_mut() = closure;
                }
            }
            Stmt::Assign { targets, values } => {
                let mut places = Vec::with_capacity(targets.len());
                for target in targets {
                    places.push(self.eval_place(target, scope)?);
                }
                let values = self.eval_multi(values, scope)?;
                let mut values = values.into_iter();
                for place in places {
                    self.assign(place, values.next().unwrap_or_default(), scope)?;
                }
            }
            Stmt::Expr(expr) => {
                self.eval_values(expr, scope)?;
            }
            Stmt::If(if_stmt) => return self.exec_if(if_stmt, scope),
            Stmt::While { cond, body } => {
                while self.eval(cond, scope)?.is_truthy() {
                    match self.exec_nested(&body.stmts, scope)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        flow => return Ok(flow),
                    }
                }
            }
            Stmt::Repeat { body, until } => loop {
                let inner = Scope::child(scope);
                match self.exec_block(&body.stmts, &inner)? {
                    Flow::Normal => {}
                    Flow::Break => break,
                    flow => return Ok(flow),
                }
                if self.eval(until, &inner)?.is_truthy() {
                    break;
                }
            },
            Stmt::NumericFor {
                var,
                start,
                limit,
                step,
                body,
            } => return self.exec_numeric_for(var, start, limit, step.as_ref(), &body.stmts, scope),
            Stmt::ForIn { names, exprs, body } => {
                let values = self.eval_multi(exprs, scope)?;
                let mut values = values.into_iter();
                let (function, state, mut control) = (
                    values.next().unwrap_or_default(),
                    values.next().unwrap_or_default(),
                    values.next().unwrap_or_default(),
                );
                loop {
                    let results = self.call(&function, vec![state.clone(), control.clone()])?;
                    let Some(head) = results.first().filter(|head| !head.is_nil()).cloned() else {
                        break;
                    };
                    control = head;
                    let inner = Scope::child(scope);
                    let mut results = results.into_iter();
                    for name in names {
                        inner.declare(name.as_str(), results.next().unwrap_or_default());
                    }
                    match self.exec_block(&body.stmts, &inner)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        flow => return Ok(flow),
                    }
                }
            }
            Stmt::Do(block) => return self.exec_nested(&block.stmts, scope),
            Stmt::Return(values) => return Ok(Flow::Return(self.eval_multi(values, scope)?)),
            Stmt::Break => return Ok(Flow::Break),
            Stmt::Goto(label) => return Ok(Flow::Goto(label.clone())),
            Stmt::Label(_) | Stmt::Comment(_) => {}
        }
        Ok(Flow::Normal)
    }

    fn exec_if(&mut self, if_stmt: &IfStmt, scope: &Rc<Scope>) -> Result<Flow, InterpError> {
        if self.eval(&if_stmt.cond, scope)?.is_truthy() {
            return self.exec_nested(&if_stmt.then.stmts, scope);
        }
        for (cond, block) in &if_stmt.else_ifs {
            if self.eval(cond, scope)?.is_truthy() {
                return self.exec_nested(&block.stmts, scope);
            }
        }
        match &if_stmt.otherwise {
            Some(block) => self.exec_nested(&block.stmts, scope),
            None => Ok(Flow::Normal),
        }
    }

    fn exec_numeric_for(
        &mut self,
        var: &Name,
        start: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &[Stmt],
        scope: &Rc<Scope>,
    ) -> Result<Flow, InterpError> {
        let start = self.eval(start, scope)?;
        let limit = self.eval(limit, scope)?;
        let step = match step {
            Some(step) => self.eval(step, scope)?,
            None => Value::Int(1),
        };
        let mut counter = match (&start, &step) {
            (Value::Int(_), Value::Int(_)) => start.clone(),
            _ => Value::Float(numeric("for", &start)?),
        };
        let ascending = numeric("for", &step)? > 0.0;
        let limit = numeric("for", &limit)?;
        if numeric("for", &step)? == 0.0 {
            return Err(InterpError::bad_argument("for", "step is zero"));
        }
        loop {
            let current = numeric("for", &counter)?;
            if (ascending && current > limit) || (!ascending && current < limit) {
                break;
            }
            let inner = Scope::child(scope);
            inner.declare(var.as_str(), counter.clone());
            match self.exec_block(body, &inner)? {
                Flow::Normal => {}
                Flow::Break => break,
                flow => return Ok(flow),
            }
            counter = arith(BinOp::Add, &counter, &step)?;
        }
        Ok(Flow::Normal)
    }

    fn eval_place(&mut self, target: &Expr, scope: &Rc<Scope>) -> Result<Place, InterpError> {
        Ok(match target {
            Expr::Ident(name) => Place::Var(name.clone()),
            Expr::Member { target, name, .. } => Place::Field(self.eval(target, scope)?, Value::str(name.as_str())),
            Expr::Index { target, key } => Place::Field(self.eval(target, scope)?, self.eval(key, scope)?),
            Expr::Paren(inner) => self.eval_place(inner, scope)?,
            _ => return Err(InterpError::Unsupported("assignment to a non-place")),
        })
    }

    fn assign(&self, place: Place, value: Value, scope: &Rc<Scope>) -> Result<(), InterpError> {
        match place {
            Place::Var(name) => match scope.lookup(name.as_str()) {
                Some(slot) => *slot.borrow_mut() = value,
                None => self.globals.borrow_mut().set_str(name.as_str(), value),
            },
            Place::Field(Value::Table(table), key) => table.borrow_mut().set(key, value)?,
            Place::Field(other, key) => {
                return Err(InterpError::Index {
                    kind: other.type_name(),
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Values of an expression list; only the last expression expands
    fn eval_multi(&mut self, exprs: &[Expr], scope: &Rc<Scope>) -> Result<Vec<Value>, InterpError> {
        let mut values = Vec::with_capacity(exprs.len());
        for (index, expr) in exprs.iter().enumerate() {
            if index + 1 == exprs.len() {
                values.extend(self.eval_values(expr, scope)?);
            } else {
                values.push(self.eval(expr, scope)?);
            }
        }
        Ok(values)
    }

    /// Every value an expression produces
    fn eval_values(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Vec<Value>, InterpError> {
        match expr {
            Expr::Call { callee, args } => self.eval_call(callee, args, scope),
            Expr::PropertyAdapter(adapter) => self.eval_values(&adapter.to_call(), scope),
            Expr::Vararg => self.varargs.last().cloned().ok_or(InterpError::Vararg),
            other => Ok(vec![self.eval(other, scope)?]),
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr], scope: &Rc<Scope>) -> Result<Vec<Value>, InterpError> {
        let (function, mut arguments) = match callee {
            Expr::Member {
                target,
                name,
                colon: true,
            } => {
                let receiver = self.eval(target, scope)?;
                let method = self.index(&receiver, &Value::str(name.as_str()))?;
                (method, vec![receiver])
            }
            other => (self.eval(other, scope)?, Vec::new()),
        };
        if matches!(function, Value::Nil | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)) {
            return Err(InterpError::Call {
                kind: function.type_name(),
                callee: describe(callee),
            });
        }
        arguments.extend(self.eval_multi(args, scope)?);
        self.call(&function, arguments)
    }

    /// Single value of an expression
    fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value, InterpError> {
        Ok(match expr {
            Expr::Literal(literal) => match literal {
                Literal::Nil => Value::Nil,
                Literal::Bool(value) => Value::Bool(*value),
                Literal::Int(value) => Value::Int(*value),
                Literal::Float(value) => Value::Float(*value),
                Literal::Str(text) => Value::str(text.as_str()),
                Literal::Char(ch) => Value::Int(i64::from(u32::from(*ch))),
            },
            Expr::Ident(name) => match scope.lookup(name.as_str()) {
                Some(slot) => slot.borrow().clone(),
                None => self.global_var(name.as_str())?,
            },
            Expr::Vararg => first(self.eval_values(expr, scope)?),
            Expr::Table(items) => self.eval_table(items, scope)?,
            Expr::Member { target, name, .. } => {
                let target = self.eval(target, scope)?;
                self.index(&target, &Value::str(name.as_str()))?
            }
            Expr::Index { target, key } => {
                let target = self.eval(target, scope)?;
                let key = self.eval(key, scope)?;
                self.index(&target, &key)?
            }
            Expr::Call { .. } | Expr::PropertyAdapter(_) => first(self.eval_values(expr, scope)?),
            Expr::Function(function) => Value::Function(Rc::new(Closure {
                function: Rc::new((**function).clone()),
                env: Rc::clone(scope),
            })),
            Expr::Binary { op: BinOp::And, left, right } => {
                let left = self.eval(left, scope)?;
                if left.is_truthy() { self.eval(right, scope)? } else { left }
            }
            Expr::Binary { op: BinOp::Or, left, right } => {
                let left = self.eval(left, scope)?;
                if left.is_truthy() { left } else { self.eval(right, scope)? }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                arith(*op, &left, &right)?
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, scope)?;
                unary(*op, &value)?
            }
            Expr::Paren(inner) => self.eval(inner, scope)?,
            Expr::Template(_) => return Err(InterpError::Unsupported("code template")),
        })
    }

    fn eval_table(&mut self, items: &[TableItem], scope: &Rc<Scope>) -> Result<Value, InterpError> {
        let mut table = Table::new();
        let mut next_index = 1;
        for (position, item) in items.iter().enumerate() {
            match item {
                TableItem::Positional(expr) if position + 1 == items.len() => {
                    for value in self.eval_values(expr, scope)? {
                        table.set_int(next_index, value);
                        next_index += 1;
                    }
                }
                TableItem::Positional(expr) => {
                    let value = self.eval(expr, scope)?;
                    table.set_int(next_index, value);
                    next_index += 1;
                }
                TableItem::Keyed(name, expr) => {
                    let value = self.eval(expr, scope)?;
                    table.set_str(name.as_str(), value);
                }
                TableItem::Indexed(key, expr) => {
                    let key = self.eval(key, scope)?;
                    let value = self.eval(expr, scope)?;
                    table.set(key, value)?;
                }
            }
        }
        Ok(Value::table(table))
    }
}

/// Handler stored under `name` in a table's metatable
pub(crate) fn metamethod(table: &TableRef, name: &str) -> Value {
    let meta = table.borrow().metatable.clone();
    meta.map_or(Value::Nil, |meta| meta.borrow().get_str(name))
}

fn find_label(stmts: &[Stmt], label: &Name) -> Option<usize> {
    stmts
        .iter()
        .position(|stmt| matches!(stmt, Stmt::Label(name) if name == label))
}

/// Short source-like description of a callee for error messages
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.to_string(),
        Expr::Member { target, name, colon } => {
            format!("{}{}{name}", describe(target), if *colon { ":" } else { "." })
        }
        Expr::Index { target, .. } => format!("{}[...]", describe(target)),
        Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
        _ => "expression".to_owned(),
    }
}

pub(crate) fn numeric(op: &str, value: &Value) -> Result<f64, InterpError> {
    value.as_float().ok_or_else(|| InterpError::Operator {
        op: op.to_owned(),
        left: value.type_name(),
        right: "number",
    })
}

fn operator_error(op: BinOp, left: &Value, right: &Value) -> InterpError {
    InterpError::Operator {
        op: op.to_string(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

/// Text of a value inside a concatenation
fn concat_text(value: &Value) -> Option<String> {
    match value {
        Value::Str(text) => Some(text.to_string()),
        Value::Int(value) => Some(value.to_string()),
        Value::Float(value) => Some(number_text(*value)),
        _ => None,
    }
}

fn floor_div(left: i64, right: i64) -> i64 {
    let quotient = left.wrapping_div(right);
    if left.wrapping_rem(right) != 0 && ((left < 0) != (right < 0)) {
        quotient - 1
    } else {
        quotient
    }
}

fn floor_mod(left: i64, right: i64) -> i64 {
    let remainder = left.wrapping_rem(right);
    if remainder != 0 && ((remainder < 0) != (right < 0)) {
        remainder + right
    } else {
        remainder
    }
}

/// Order of two comparable values
fn compare(op: BinOp, left: &Value, right: &Value) -> Result<Ordering, InterpError> {
    match (left, right) {
        (Value::Int(left), Value::Int(right)) => Ok(left.cmp(right)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let (left_value, right_value) = (numeric("compare", left)?, numeric("compare", right)?);
            left_value
                .partial_cmp(&right_value)
                .ok_or_else(|| operator_error(op, left, right))
        }
        (Value::Str(left), Value::Str(right)) => Ok(left.cmp(right)),
        _ => Err(operator_error(op, left, right)),
    }
}

/// Apply a non-short-circuit binary operator
pub(crate) fn arith(op: BinOp, left: &Value, right: &Value) -> Result<Value, InterpError> {
    let ints = match (left, right) {
        (Value::Int(left), Value::Int(right)) => Some((*left, *right)),
        _ => None,
    };
    let floats = left.as_float().zip(right.as_float());
    Ok(match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul => match (ints, floats) {
            (Some((lhs, rhs)), _) => Value::Int(match op {
                BinOp::Add => lhs.wrapping_add(rhs),
                BinOp::Sub => lhs.wrapping_sub(rhs),
                _ => lhs.wrapping_mul(rhs),
            }),
            (None, Some((lhs, rhs))) => Value::Float(match op {
                BinOp::Add => lhs + rhs,
                BinOp::Sub => lhs - rhs,
                _ => lhs * rhs,
            }),
            (None, None) => return Err(operator_error(op, left, right)),
        },
        BinOp::Div => {
            let (lhs, rhs) = floats.ok_or_else(|| operator_error(op, left, right))?;
            Value::Float(lhs / rhs)
        }
        BinOp::Pow => {
            let (lhs, rhs) = floats.ok_or_else(|| operator_error(op, left, right))?;
            Value::Float(lhs.powf(rhs))
        }
        BinOp::FloorDiv | BinOp::Mod => match (ints, floats) {
            (Some((_, 0)), _) => return Err(InterpError::DivisionByZero),
            (Some((lhs, rhs)), _) => Value::Int(if op == BinOp::FloorDiv {
                floor_div(lhs, rhs)
            } else {
                floor_mod(lhs, rhs)
            }),
            (None, Some((lhs, rhs))) => Value::Float(if op == BinOp::FloorDiv {
                (lhs / rhs).floor()
            } else {
                lhs - (lhs / rhs).floor() * rhs
            }),
            (None, None) => return Err(operator_error(op, left, right)),
        },
        BinOp::Concat => match (concat_text(left), concat_text(right)) {
            (Some(lhs), Some(rhs)) => Value::str(format!("{lhs}{rhs}")),
            _ => return Err(operator_error(op, left, right)),
        },
        BinOp::Eq => Value::Bool(left.raw_equals(right)),
        BinOp::Ne => Value::Bool(!left.raw_equals(right)),
        BinOp::Lt => Value::Bool(compare(op, left, right)? == Ordering::Less),
        BinOp::Le => Value::Bool(compare(op, left, right)? != Ordering::Greater),
        BinOp::Gt => Value::Bool(compare(op, left, right)? == Ordering::Greater),
        BinOp::Ge => Value::Bool(compare(op, left, right)? != Ordering::Less),
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::Shl | BinOp::Shr => {
            let (Some(lhs), Some(rhs)) = (left.as_int(), right.as_int()) else {
                return Err(operator_error(op, left, right));
            };
            Value::Int(match op {
                BinOp::BitAnd => lhs & rhs,
                BinOp::BitOr => lhs | rhs,
                BinOp::BitXor => lhs ^ rhs,
                BinOp::Shl => shift_left(lhs, rhs),
                _ => shift_left(lhs, rhs.wrapping_neg()),
            })
        }
        BinOp::And => {
            if left.is_truthy() {
                right.clone()
            } else {
                left.clone()
            }
        }
        BinOp::Or => {
            if left.is_truthy() {
                left.clone()
            } else {
                right.clone()
            }
        }
    })
}

/// Logical shift; negative counts shift right
fn shift_left(value: i64, count: i64) -> i64 {
    let bits = value as u64;
    let shifted = match count {
        64.. | ..=-64 => 0,
        0.. => bits << count,
        _ => bits >> count.unsigned_abs(),
    };
    shifted as i64
}

fn unary(op: UnOp, value: &Value) -> Result<Value, InterpError> {
    let error = || InterpError::Operator {
        op: op.to_string().trim().to_owned(),
        left: value.type_name(),
        right: "nothing",
    };
    Ok(match (op, value) {
        (UnOp::Not, _) => Value::Bool(!value.is_truthy()),
        (UnOp::Neg, Value::Int(int)) => Value::Int(int.wrapping_neg()),
        (UnOp::Neg, Value::Float(float)) => Value::Float(-float),
        (UnOp::Len, Value::Str(text)) => Value::Int(text.len() as i64),
        (UnOp::Len, Value::Table(table)) => Value::Int(table.borrow().border()),
        (UnOp::BitNot, _) => Value::Int(!value.as_int().ok_or_else(error)?),
        _ => return Err(error()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lm_target::{Block, Function};

    fn ident(name: &str) -> Expr {
        Expr::ident(name)
    }

    fn run(stmts: Vec<Stmt>) -> Result<Vec<Value>, InterpError> {
        Interpreter::bare().run(&Chunk { body: Block::of(stmts) })
    }

    #[test]
    fn test_while_loop_sums() {
        let result = run(vec![
            Stmt::local(Name::new("i"), Expr::int(0)),
            Stmt::local(Name::new("sum"), Expr::int(0)),
            Stmt::While {
                cond: Expr::binary(BinOp::Lt, ident("i"), Expr::int(5)),
                body: Block::of(vec![
                    Stmt::assign(ident("i"), Expr::binary(BinOp::Add, ident("i"), Expr::int(1))),
                    Stmt::assign(ident("sum"), Expr::binary(BinOp::Add, ident("sum"), ident("i"))),
                ]),
            },
            Stmt::Return(vec![ident("sum")]),
        ]);
        assert_eq!(result.ok(), Some(vec![Value::Int(15)]));
    }

    #[test]
    fn test_multiple_assignment_swaps() {
        let result = run(vec![
            Stmt::Local {
                names: vec![Name::new("a"), Name::new("b")],
                values: vec![Expr::int(1), Expr::int(2)],
            },
            Stmt::Assign {
                targets: vec![ident("a"), ident("b")],
                values: vec![ident("b"), ident("a")],
            },
            Stmt::Return(vec![ident("a"), ident("b")]),
        ]);
        assert_eq!(result.ok(), Some(vec![Value::Int(2), Value::Int(1)]));
    }

    #[test]
    fn test_closures_capture_per_iteration() {
        // for i = 1, 3 do fs[i] = function () return i end end
        let capture = Function::new(Vec::new(), Block::of(vec![Stmt::Return(vec![ident("i")])]));
        let result = run(vec![
            Stmt::local(Name::new("fs"), Expr::Table(Vec::new())),
            Stmt::NumericFor {
                var: Name::new("i"),
                start: Expr::int(1),
                limit: Expr::int(3),
                step: None,
                body: Block::of(vec![Stmt::assign(
                    Expr::Index {
                        target: Box::new(ident("fs")),
                        key: Box::new(ident("i")),
                    },
                    Expr::function(capture),
                )]),
            },
            Stmt::Return(vec![Expr::call(
                Expr::Index {
                    target: Box::new(ident("fs")),
                    key: Box::new(Expr::int(2)),
                },
                Vec::new(),
            )]),
        ]);
        assert_eq!(result.ok(), Some(vec![Value::Int(2)]));
    }

    #[test]
    fn test_goto_skips_forward() {
        let result = run(vec![
            Stmt::local(Name::new("x"), Expr::int(1)),
            Stmt::Goto(Name::new("done")),
            Stmt::assign(ident("x"), Expr::int(2)),
            Stmt::Label(Name::new("done")),
            Stmt::Return(vec![ident("x")]),
        ]);
        assert_eq!(result.ok(), Some(vec![Value::Int(1)]));
    }

    #[test]
    fn test_last_call_expands_into_table() {
        let pair = Function::new(
            Vec::new(),
            Block::of(vec![Stmt::Return(vec![Expr::int(1), Expr::int(2)])]),
        );
        let result = run(vec![
            Stmt::local(Name::new("pair"), Expr::function(pair)),
            Stmt::local(
                Name::new("t"),
                Expr::Table(vec![
                    TableItem::Positional(Expr::call(ident("pair"), Vec::new())),
                    TableItem::Positional(Expr::call(ident("pair"), Vec::new())),
                ]),
            ),
            Stmt::Return(vec![Expr::unary(UnOp::Len, ident("t"))]),
        ]);
        assert_eq!(result.ok(), Some(vec![Value::Int(3)]));
    }

    #[test]
    fn test_indexing_nil_fails() {
        let result = run(vec![Stmt::Return(vec![Expr::member(ident("missing"), "field")])]);
        assert!(matches!(result, Err(InterpError::Index { kind: "nil", .. })));
    }

    #[test]
    fn test_integer_operators_follow_target_semantics() {
        assert_eq!(arith(BinOp::FloorDiv, &Value::Int(-7), &Value::Int(2)).ok(), Some(Value::Int(-4)));
        assert_eq!(arith(BinOp::Mod, &Value::Int(-7), &Value::Int(2)).ok(), Some(Value::Int(1)));
        assert_eq!(arith(BinOp::Div, &Value::Int(7), &Value::Int(2)).ok(), Some(Value::Float(3.5)));
        assert_eq!(arith(BinOp::Shr, &Value::Int(-1), &Value::Int(60)).ok(), Some(Value::Int(15)));
        assert!(matches!(
            arith(BinOp::Mod, &Value::Int(1), &Value::Int(0)),
            Err(InterpError::DivisionByZero)
        ));
        assert_eq!(
            arith(BinOp::Concat, &Value::from("n="), &Value::Int(3)).ok(),
            Some(Value::from("n=3"))
        );
    }
}
