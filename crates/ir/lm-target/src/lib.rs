//! Target-language abstract syntax tree
//!
//! The lowering passes build these nodes; the renderer turns them into text
//! and the evaluator in `lm-interp` executes them directly.

pub mod node;
pub mod ops;
pub mod visit;

pub use node::{
    Block, Chunk, Expr, Function, IfStmt, Literal, Name, PropertyAdapter, Stmt, TableItem, TemplatePart,
};
pub use ops::{BinOp, UnOp};
