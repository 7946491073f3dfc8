//! Target AST nodes
//!
//! Trees are built bottom-up and owned outright: a node is immutable once it
//! is attached to a parent, and sharing never happens through aliasing.
//! Inheritance between emitted types goes through lazily invoked closures,
//! never through node references.

use crate::ops::{BinOp, UnOp};
use derive_more::{Display, From};

/// Identifier in the target language
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Display, From)]
#[display("{_0}")]
pub struct Name(pub String);

impl Name {
    /// Name from anything string-like
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The identifier text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(text: &str) -> Self {
        Self(text.to_owned())
    }
}

/// Literal value
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    /// `nil`
    Nil,
    /// `true` / `false`
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float; always rendered with a decimal point or exponent
    Float(f64),
    /// String
    Str(String),
    /// Character, rendered as its code with the glyph in a comment
    Char(char),
}

/// Entry of a table constructor
#[derive(Clone, Debug, PartialEq)]
pub enum TableItem {
    /// `value`
    Positional(Expr),
    /// `name = value`
    Keyed(Name, Expr),
    /// `[key] = value`
    Indexed(Expr, Expr),
}

/// Function literal
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Function {
    /// Parameter names
    pub params: Vec<Name>,
    /// Trailing `...`
    pub vararg: bool,
    /// Body
    pub body: Block,
    /// Body contains `yield`; the closure is wrapped by an enumerable helper
    pub has_yield: bool,
}

impl Function {
    /// Function with the given parameters and body
    pub fn new(params: Vec<Name>, body: Block) -> Self {
        Self {
            params,
            vararg: false,
            body,
            has_yield: false,
        }
    }
}

/// Access to a property or event through accessor closures
///
/// Renders as `[target:|target.]getName(args)` (or `set`, `add`, `remove`).
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyAdapter {
    /// Receiver; `None` for accessors reached as locals of the declaring type
    pub target: Option<Expr>,
    /// Property or event name without prefix
    pub name: Name,
    /// Getter/adder when true, setter/remover otherwise
    pub is_get: bool,
    /// Property when true, event otherwise
    pub is_property: bool,
    /// `target:name(...)` instead of `target.name(...)`
    pub colon: bool,
    /// Arguments: explicit receiver, indexer arguments, assigned value
    pub args: Vec<Expr>,
}

impl PropertyAdapter {
    /// Accessor name with its `get`/`set`/`add`/`remove` prefix
    pub fn accessor_name(&self) -> Name {
        let prefix = match (self.is_property, self.is_get) {
            (true, true) => "get",
            (true, false) => "set",
            (false, true) => "add",
            (false, false) => "remove",
        };
        Name(format!("{prefix}{}", self.name))
    }

    /// The same access flipped to the other accessor
    #[must_use]
    pub fn flipped(&self) -> Self {
        Self {
            is_get: !self.is_get,
            ..self.clone()
        }
    }

    /// Lower to a plain call
    pub fn to_call(&self) -> Expr {
        let name = self.accessor_name();
        let callee = match &self.target {
            Some(target) => Expr::Member {
                target: Box::new(target.clone()),
                name,
                colon: self.colon,
            },
            None => Expr::Ident(name),
        };
        Expr::Call {
            callee: Box::new(callee),
            args: self.args.clone(),
        }
    }
}

/// Piece of an expanded code template
#[derive(Clone, Debug, PartialEq)]
pub enum TemplatePart {
    /// Verbatim target text
    Text(String),
    /// Bound sub-expression
    Expr(Expr),
}

/// Target expression
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Literal
    Literal(Literal),
    /// Identifier
    Ident(Name),
    /// `...`
    Vararg,
    /// `{ items }`
    Table(Vec<TableItem>),
    /// `target.name`, or `target:name` when called as a method
    Member {
        /// Receiver
        target: Box<Expr>,
        /// Member
        name: Name,
        /// Colon call
        colon: bool,
    },
    /// `target[key]`
    Index {
        /// Receiver
        target: Box<Expr>,
        /// Key
        key: Box<Expr>,
    },
    /// `callee(args)`
    Call {
        /// Called value
        callee: Box<Expr>,
        /// Arguments
        args: Vec<Expr>,
    },
    /// `function (params) body end`
    Function(Box<Function>),
    /// Binary operation
    Binary {
        /// Operator
        op: BinOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// Unary operation
    Unary {
        /// Operator
        op: UnOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// `(expr)`, also truncating multiple values to one
    Paren(Box<Expr>),
    /// Property or event accessor invocation
    PropertyAdapter(Box<PropertyAdapter>),
    /// Expanded override template
    Template(Vec<TemplatePart>),
}

impl Expr {
    /// `nil`
    pub fn nil() -> Self {
        Self::Literal(Literal::Nil)
    }

    /// Boolean literal
    pub fn boolean(value: bool) -> Self {
        Self::Literal(Literal::Bool(value))
    }

    /// Integer literal
    pub fn int(value: i64) -> Self {
        Self::Literal(Literal::Int(value))
    }

    /// String literal
    pub fn string(value: impl Into<String>) -> Self {
        Self::Literal(Literal::Str(value.into()))
    }

    /// Identifier
    pub fn ident(name: impl Into<String>) -> Self {
        Self::Ident(Name(name.into()))
    }

    /// `target.name`
    pub fn member(target: Self, name: impl Into<String>) -> Self {
        Self::Member {
            target: Box::new(target),
            name: Name(name.into()),
            colon: false,
        }
    }

    /// `target:name`
    pub fn method(target: Self, name: impl Into<String>) -> Self {
        Self::Member {
            target: Box::new(target),
            name: Name(name.into()),
            colon: true,
        }
    }

    /// `a.b.c` from a dotted path
    pub fn path(dotted: &str) -> Self {
        let mut parts = dotted.split('.');
        let head = Self::ident(parts.next().unwrap_or_default());
        parts.fold(head, Self::member)
    }

    /// `callee(args)`
    pub fn call(callee: Self, args: Vec<Self>) -> Self {
        Self::Call {
            callee: Box::new(callee),
            args,
        }
    }

    /// `left op right`
    pub fn binary(op: BinOp, left: Self, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// `op operand`
    pub fn unary(op: UnOp, operand: Self) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    /// Function literal expression
    pub fn function(function: Function) -> Self {
        Self::Function(Box::new(function))
    }

    /// Identifier text, if this is a plain identifier
    pub fn as_ident(&self) -> Option<&Name> {
        match self {
            Self::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Literal, if this is one
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Self::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    /// Evaluating this expression cannot run user code or observe state
    /// changes: literals, identifiers and functions
    pub fn is_pure(&self) -> bool {
        match self {
            Self::Literal(_) | Self::Ident(_) | Self::Vararg | Self::Function(_) => true,
            Self::Paren(inner) => inner.is_pure(),
            _ => false,
        }
    }

    /// Whether evaluating the expression may yield `nil` or `false`
    ///
    /// Only literals are known; everything else answers `true`.
    pub fn may_be_falsy(&self) -> bool {
        match self {
            Self::Literal(Literal::Nil | Literal::Bool(false)) => true,
            Self::Literal(_) | Self::Table(_) | Self::Function(_) => false,
            Self::Paren(inner) => inner.may_be_falsy(),
            _ => true,
        }
    }
}

/// Conditional with optional `elseif` chain
#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    /// Condition
    pub cond: Expr,
    /// Then block
    pub then: Block,
    /// `elseif` branches
    pub else_ifs: Vec<(Expr, Block)>,
    /// `else` block
    pub otherwise: Option<Block>,
}

impl IfStmt {
    /// `if cond then body end`
    pub fn new(cond: Expr, then: Block) -> Self {
        Self {
            cond,
            then,
            else_ifs: Vec::new(),
            otherwise: None,
        }
    }
}

/// Target statement
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    /// `local names [= values]`
    Local {
        /// Declared names
        names: Vec<Name>,
        /// Initial values; empty for a bare declaration
        values: Vec<Expr>,
    },
    /// `local function name(...) ... end`
    LocalFunction {
        /// Function name
        name: Name,
        /// Function
        function: Function,
    },
    /// `targets = values`
    Assign {
        /// Assigned locations
        targets: Vec<Expr>,
        /// Values
        values: Vec<Expr>,
    },
    /// Expression evaluated for effect; always a call in valid output
    Expr(Expr),
    /// `if`
    If(Box<IfStmt>),
    /// `while cond do body end`
    While {
        /// Condition
        cond: Expr,
        /// Body
        body: Block,
    },
    /// `repeat body until cond`
    Repeat {
        /// Body
        body: Block,
        /// Exit condition
        until: Expr,
    },
    /// `for var = start, limit[, step] do body end`
    NumericFor {
        /// Control variable
        var: Name,
        /// Initial value
        start: Expr,
        /// Limit
        limit: Expr,
        /// Step
        step: Option<Expr>,
        /// Body
        body: Block,
    },
    /// `for names in exprs do body end`
    ForIn {
        /// Loop variables
        names: Vec<Name>,
        /// Iterator expressions
        exprs: Vec<Expr>,
        /// Body
        body: Block,
    },
    /// `do body end`
    Do(Block),
    /// `return values`
    Return(Vec<Expr>),
    /// `break`
    Break,
    /// `goto label`
    Goto(Name),
    /// `::label::`
    Label(Name),
    /// `-- text`
    Comment(String),
}

impl Stmt {
    /// `local name = value`
    pub fn local(name: Name, value: Expr) -> Self {
        Self::Local {
            names: vec![name],
            values: vec![value],
        }
    }

    /// `local name`
    pub fn declare(name: Name) -> Self {
        Self::Local {
            names: vec![name],
            values: Vec::new(),
        }
    }

    /// `target = value`
    pub fn assign(target: Expr, value: Expr) -> Self {
        Self::Assign {
            targets: vec![target],
            values: vec![value],
        }
    }

    /// `if cond then body end`
    pub fn if_then(cond: Expr, then: Block) -> Self {
        Self::If(Box::new(IfStmt::new(cond, then)))
    }

    /// Whether control never falls through this statement
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Return(_) | Self::Break | Self::Goto(_))
    }
}

/// Statement list
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    /// Statements
    pub stmts: Vec<Stmt>,
}

impl Block {
    /// Empty block
    pub fn new() -> Self {
        Self::default()
    }

    /// Block of the given statements
    pub fn of(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }

    /// Append a statement
    pub fn push(&mut self, stmt: Stmt) {
        self.stmts.push(stmt);
    }

    /// Whether the block holds no statements
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    /// Whether the last statement leaves the block
    pub fn ends_in_jump(&self) -> bool {
        self.stmts.last().is_some_and(Stmt::is_terminal)
    }
}

impl From<Vec<Stmt>> for Block {
    fn from(stmts: Vec<Stmt>) -> Self {
        Self { stmts }
    }
}

/// Output of one compilation unit
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chunk {
    /// Top-level statements
    pub body: Block,
}
