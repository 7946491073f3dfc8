//! Annotated source tree
//!
//! The front end produces one [`CompilationUnit`] per file. Nodes are plain
//! owned data; every expression already carries its static type and constant
//! value, and every name points at a resolved [`SymbolId`].

use crate::model::{Constant, RefKind, SymbolId};
use crate::types::TypeRef;
use lm_span::{FileId, Span};
use serde::{Deserialize, Serialize};

/// One source file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompilationUnit {
    /// File id used in spans
    pub file: FileId,
    /// Path relative to the project root, used to name the output
    pub path: String,
    /// Original text, when available, for diagnostics
    #[serde(default)]
    pub text: Option<String>,
    /// Top-level namespaces and types
    #[serde(default)]
    pub members: Vec<NamespaceMember>,
}

/// Member of a namespace or compilation unit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NamespaceMember {
    /// Nested namespace block
    Namespace(NamespaceDecl),
    /// Type declaration
    Type(TypeDecl),
}

/// `namespace A.B { ... }`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamespaceDecl {
    /// Dotted name relative to the enclosing namespace
    pub name: String,
    /// Members
    #[serde(default)]
    pub members: Vec<NamespaceMember>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

/// Attribute application
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttributeUse {
    /// Attribute class
    pub ty: TypeRef,
    /// Constructor arguments
    #[serde(default)]
    pub args: Vec<Expr>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

/// One declaration fragment of a type; partial types have several
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    /// The declared type
    pub symbol: SymbolId,
    /// Members of this fragment
    #[serde(default)]
    pub members: Vec<MemberDecl>,
    /// Attributes on this fragment
    #[serde(default)]
    pub attributes: Vec<AttributeUse>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

/// Member declaration inside a type
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MemberDecl {
    /// One declarator of a field declaration
    Field(FieldDecl),
    /// Property
    Property(PropertyDecl),
    /// Indexer
    Indexer(PropertyDecl),
    /// Event
    Event(EventDecl),
    /// Method or operator
    Method(MethodDecl),
    /// Instance or static constructor
    Constructor(ConstructorDecl),
    /// Nested type
    Type(TypeDecl),
    /// Enum member
    EnumMember(EnumMemberDecl),
}

/// Field declarator
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    /// Field symbol
    pub symbol: SymbolId,
    /// Initializer expression
    #[serde(default)]
    pub initializer: Option<Expr>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

/// Accessor of a property, indexer or event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccessorDecl {
    /// Accessor method symbol
    pub symbol: SymbolId,
    /// Body; `None` for auto-implemented accessors
    #[serde(default)]
    pub body: Option<Body>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

/// Property or indexer declaration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    /// Property symbol
    pub symbol: SymbolId,
    /// Getter
    #[serde(default)]
    pub getter: Option<AccessorDecl>,
    /// Setter
    #[serde(default)]
    pub setter: Option<AccessorDecl>,
    /// `= value;` initializer of an auto-property
    #[serde(default)]
    pub initializer: Option<Expr>,
    /// `=> value;` expression body, a getter without a block
    #[serde(default)]
    pub expression_body: Option<Expr>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

/// Event declaration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventDecl {
    /// Event symbol
    pub symbol: SymbolId,
    /// `add` accessor
    #[serde(default)]
    pub adder: Option<AccessorDecl>,
    /// `remove` accessor
    #[serde(default)]
    pub remover: Option<AccessorDecl>,
    /// Initializer of a field-like event
    #[serde(default)]
    pub initializer: Option<Expr>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

/// Method, operator or local function
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    /// Method symbol
    pub symbol: SymbolId,
    /// Body; `None` for abstract and extern methods
    #[serde(default)]
    pub body: Option<Body>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

/// `: this(...)` or `: base(...)`
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum InitializerKind {
    /// Chains to another constructor of the same type
    This,
    /// Chains to a base constructor
    Base,
}

/// Constructor initializer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstructorInitializer {
    /// Target of the chain
    pub kind: InitializerKind,
    /// Constructor being called
    pub ctor: SymbolId,
    /// Arguments
    #[serde(default)]
    pub args: Vec<Argument>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

/// Instance or static constructor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstructorDecl {
    /// Constructor symbol
    pub symbol: SymbolId,
    /// Chained constructor call
    #[serde(default)]
    pub initializer: Option<ConstructorInitializer>,
    /// Body
    #[serde(default)]
    pub body: Option<Block>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

/// Enum member; its value is the symbol's constant
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnumMemberDecl {
    /// Member symbol
    pub symbol: SymbolId,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

/// Body of a method-like member
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Body {
    /// `{ ... }`
    Block(Block),
    /// `=> expr`
    Expr(Expr),
}

/// Brace-delimited statement list
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Statements
    #[serde(default)]
    pub stmts: Vec<Stmt>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

impl Block {
    /// Block from statements, without location
    pub fn of(stmts: Vec<Stmt>) -> Self {
        Self {
            stmts,
            span: Span::detached(),
        }
    }
}

/// Statement with its location
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    /// Statement kind
    pub kind: StmtKind,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

impl Stmt {
    /// Statement without location
    pub fn new(kind: StmtKind) -> Self {
        Self {
            kind,
            span: Span::detached(),
        }
    }
}

/// One variable of a local declaration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalDeclarator {
    /// Local symbol
    pub symbol: SymbolId,
    /// Initializer
    #[serde(default)]
    pub init: Option<Expr>,
}

/// `case` section of a switch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwitchSection {
    /// Labels; at most one is `Default`
    pub labels: Vec<SwitchLabel>,
    /// Statements, ending in a jump
    #[serde(default)]
    pub stmts: Vec<Stmt>,
}

/// Switch label
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SwitchLabel {
    /// `case constant:`
    Case(Expr),
    /// `case pattern when cond:`
    Pattern {
        /// Pattern
        pattern: Pattern,
        /// Guard
        #[serde(default)]
        when: Option<Expr>,
    },
    /// `default:`
    Default,
}

/// Pattern in a switch label or `is` expression
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    /// `T name`
    Declaration {
        /// Tested type
        ty: TypeRef,
        /// Bound variable
        var: SymbolId,
    },
    /// Constant comparison
    Constant(Expr),
    /// Type test without binding
    Type(TypeRef),
    /// `_` or `var _`
    Discard,
}

/// `catch (T e) when (filter) { ... }`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatchClause {
    /// Caught type; `None` catches everything
    #[serde(default)]
    pub ty: Option<TypeRef>,
    /// Exception variable
    #[serde(default)]
    pub var: Option<SymbolId>,
    /// Exception filter
    #[serde(default)]
    pub filter: Option<Expr>,
    /// Handler
    pub block: Block,
}

/// Statement kinds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// Nested block
    Block(Block),
    /// Local variable declaration
    Local(Vec<LocalDeclarator>),
    /// Expression statement
    Expr(Expr),
    /// `if`
    If {
        /// Condition
        cond: Expr,
        /// Then branch
        then: Box<Stmt>,
        /// Else branch
        #[serde(default)]
        otherwise: Option<Box<Stmt>>,
    },
    /// `while`
    While {
        /// Condition
        cond: Expr,
        /// Body
        body: Box<Stmt>,
    },
    /// `do ... while`
    DoWhile {
        /// Body
        body: Box<Stmt>,
        /// Condition
        cond: Expr,
    },
    /// `for`
    For {
        /// Declared loop variables
        #[serde(default)]
        decls: Vec<LocalDeclarator>,
        /// Initializer expressions
        #[serde(default)]
        init: Vec<Expr>,
        /// Condition; `None` loops forever
        #[serde(default)]
        cond: Option<Expr>,
        /// Incrementors
        #[serde(default)]
        step: Vec<Expr>,
        /// Body
        body: Box<Stmt>,
    },
    /// `foreach`
    ForEach {
        /// Iteration variable
        var: SymbolId,
        /// Sequence
        collection: Expr,
        /// Body
        body: Box<Stmt>,
    },
    /// `switch`
    Switch {
        /// Governing expression
        subject: Expr,
        /// Sections
        sections: Vec<SwitchSection>,
    },
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `return`
    Return(Option<Expr>),
    /// `yield return`
    YieldReturn(Expr),
    /// `yield break`
    YieldBreak,
    /// `goto label`
    Goto(SymbolId),
    /// `goto case value`
    GotoCase(Expr),
    /// `goto default`
    GotoDefault,
    /// `label: stmt`
    Labeled {
        /// Label symbol
        label: SymbolId,
        /// Labeled statement
        stmt: Box<Stmt>,
    },
    /// `throw` or `throw e`
    Throw(Option<Expr>),
    /// `try`
    Try {
        /// Protected block
        block: Block,
        /// Handlers
        #[serde(default)]
        catches: Vec<CatchClause>,
        /// `finally` block
        #[serde(default)]
        finally: Option<Block>,
    },
    /// `using`
    Using {
        /// Declared resource
        #[serde(default)]
        decl: Option<LocalDeclarator>,
        /// Resource expression without a declaration
        #[serde(default)]
        expr: Option<Expr>,
        /// Body
        body: Box<Stmt>,
    },
    /// Local function declaration
    LocalFunction(MethodDecl),
    /// `;`
    Empty,
}

/// Call argument
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    /// Value or location
    pub expr: Expr,
    /// `ref`/`out` marker
    #[serde(default)]
    pub ref_kind: RefKind,
}

impl Argument {
    /// By-value argument
    pub fn value(expr: Expr) -> Self {
        Self {
            expr,
            ref_kind: RefKind::None,
        }
    }
}

/// `Member = value` inside an object initializer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberInit {
    /// Field or property being set
    pub member: SymbolId,
    /// Value
    pub value: Expr,
}

/// Part of an interpolated string
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InterpolationPart {
    /// Literal text
    Text(String),
    /// `{expr}`
    Expr(Expr),
}

/// Unary operators
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `+x`
    Plus,
    /// `-x`
    Minus,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
    /// `++x`
    PreIncrement,
    /// `--x`
    PreDecrement,
    /// `x++`
    PostIncrement,
    /// `x--`
    PostDecrement,
}

impl UnaryOp {
    /// Increment or decrement in either position
    pub fn is_step(self) -> bool {
        matches!(
            self,
            Self::PreIncrement | Self::PreDecrement | Self::PostIncrement | Self::PostDecrement
        )
    }
}

/// Binary operators
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    LogicalAnd,
    /// `||`
    LogicalOr,
    /// `??`
    Coalesce,
}

/// Body of a lambda
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LambdaBody {
    /// `x => expr`
    Expr(Box<Expr>),
    /// `x => { ... }`
    Block(Block),
}

/// Expression with its static type and constant value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    /// Expression kind
    pub kind: ExprKind,
    /// Static type
    #[serde(default)]
    pub ty: TypeRef,
    /// Folded constant value
    #[serde(default)]
    pub constant: Option<Constant>,
    /// Source location
    #[serde(default)]
    pub span: Span,
}

impl Expr {
    /// Expression of the given type, without location
    pub fn new(kind: ExprKind, ty: TypeRef) -> Self {
        Self {
            kind,
            ty,
            constant: None,
            span: Span::detached(),
        }
    }

    /// Literal expression; the constant is recorded on the node too
    pub fn literal(value: Constant, ty: TypeRef) -> Self {
        Self {
            kind: ExprKind::Literal(value.clone()),
            ty,
            constant: Some(value),
            span: Span::detached(),
        }
    }

    /// Attach a location
    #[must_use]
    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Strip redundant parentheses
    pub fn unparen(&self) -> &Self {
        match &self.kind {
            ExprKind::Paren(inner) => inner.unparen(),
            _ => self,
        }
    }

    /// Whether this is a bare `this`
    pub fn is_this(&self) -> bool {
        matches!(self.unparen().kind, ExprKind::This)
    }
}

/// Expression kinds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// Literal
    Literal(Constant),
    /// Simple name bound to a symbol
    Name(SymbolId),
    /// `this`
    This,
    /// `base`
    Base,
    /// `target.member`
    Member {
        /// Receiver, or the type name for static members
        target: Box<Expr>,
        /// Resolved member
        member: SymbolId,
    },
    /// Member access on a `dynamic` receiver
    DynamicMember {
        /// Receiver
        target: Box<Expr>,
        /// Member name
        name: String,
    },
    /// `target[args]`
    Element {
        /// Receiver
        target: Box<Expr>,
        /// Index arguments
        args: Vec<Expr>,
        /// Indexer property; `None` for arrays
        #[serde(default)]
        indexer: Option<SymbolId>,
    },
    /// Call
    Invocation {
        /// Method name, member access or delegate value
        callee: Box<Expr>,
        /// Resolved method; `None` for delegate invocation
        #[serde(default)]
        method: Option<SymbolId>,
        /// Arguments
        #[serde(default)]
        args: Vec<Argument>,
        /// Inferred or explicit method type arguments
        #[serde(default)]
        type_args: Vec<TypeRef>,
    },
    /// `new T(args) { inits }`
    ObjectCreation {
        /// Created type
        ty: TypeRef,
        /// Constructor; `None` for the implicit struct constructor
        #[serde(default)]
        ctor: Option<SymbolId>,
        /// Arguments
        #[serde(default)]
        args: Vec<Argument>,
        /// Object initializer entries
        #[serde(default)]
        initializers: Vec<MemberInit>,
    },
    /// `new T[] { items }`
    ArrayCreation {
        /// Element type
        elem: TypeRef,
        /// Items
        #[serde(default)]
        items: Vec<Expr>,
    },
    /// `target = value` or `target op= value`
    Assignment {
        /// Compound operator; `None` for simple assignment
        #[serde(default)]
        op: Option<BinaryOp>,
        /// Assigned location
        target: Box<Expr>,
        /// Value
        value: Box<Expr>,
        /// User-defined operator for compound assignment
        #[serde(default)]
        method: Option<SymbolId>,
    },
    /// Binary operation
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
        /// User-defined operator
        #[serde(default)]
        method: Option<SymbolId>,
    },
    /// Unary operation, including increment and decrement
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        operand: Box<Expr>,
        /// User-defined operator
        #[serde(default)]
        method: Option<SymbolId>,
    },
    /// `cond ? a : b`
    Conditional {
        /// Condition
        cond: Box<Expr>,
        /// Value when true
        when_true: Box<Expr>,
        /// Value when false
        when_false: Box<Expr>,
    },
    /// `x is T` or `x is T name`
    Is {
        /// Tested value
        operand: Box<Expr>,
        /// Tested type
        ty: TypeRef,
        /// Bound variable of a declaration pattern
        #[serde(default)]
        designation: Option<SymbolId>,
    },
    /// `x as T`
    As {
        /// Converted value
        operand: Box<Expr>,
        /// Target type
        ty: TypeRef,
    },
    /// `(T)x`
    Cast {
        /// Converted value
        operand: Box<Expr>,
        /// Target type
        ty: TypeRef,
    },
    /// Anonymous function
    Lambda {
        /// Parameters
        #[serde(default)]
        params: Vec<SymbolId>,
        /// Body
        body: LambdaBody,
    },
    /// Query expression
    Query(Box<QueryExpr>),
    /// `(expr)`
    Paren(Box<Expr>),
    /// `typeof(T)`
    TypeOf(TypeRef),
    /// `default(T)`
    Default(TypeRef),
    /// `$"..."`
    Interpolated(Vec<InterpolationPart>),
    /// A type used as an expression, e.g. the receiver of a static call
    TypeName(TypeRef),
}

/// `from x in expr`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FromClause {
    /// Range variable
    pub var: SymbolId,
    /// Source sequence
    pub expr: Expr,
}

/// `join x in expr on left equals right [into g]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    /// Inner range variable
    pub var: SymbolId,
    /// Inner sequence
    pub expr: Expr,
    /// Outer key
    pub left_key: Expr,
    /// Inner key
    pub right_key: Expr,
    /// Group variable of a group join
    #[serde(default)]
    pub into: Option<SymbolId>,
}

/// One `orderby` key
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ordering {
    /// Key expression
    pub key: Expr,
    /// `descending`
    #[serde(default)]
    pub descending: bool,
}

/// Body clause of a query
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum QueryClause {
    /// Additional `from`
    From(FromClause),
    /// `let x = expr`
    Let {
        /// Bound range variable
        var: SymbolId,
        /// Value
        expr: Expr,
    },
    /// `where cond`
    Where(Expr),
    /// `join`
    Join(JoinClause),
    /// `orderby k1, k2 descending`
    OrderBy(Vec<Ordering>),
}

/// Terminal clause of a query body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum QueryEnd {
    /// `select expr`
    Select(Expr),
    /// `group element by key`
    Group {
        /// Grouped element
        element: Expr,
        /// Grouping key
        key: Expr,
    },
}

/// `into x ...` continuation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryContinuation {
    /// Continuation range variable
    pub var: SymbolId,
    /// Continued body
    pub body: Box<QueryBody>,
}

/// Clauses after the first `from`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryBody {
    /// Body clauses
    #[serde(default)]
    pub clauses: Vec<QueryClause>,
    /// `select` or `group`
    pub end: QueryEnd,
    /// `into` continuation
    #[serde(default)]
    pub continuation: Option<QueryContinuation>,
}

/// Query expression
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryExpr {
    /// Leading `from`
    pub from: FromClause,
    /// Remaining clauses
    pub body: QueryBody,
}
