//! Annotated source program consumed by the compiler core
//!
//! The front end (parser, binder, type checker) is an external collaborator.
//! What it hands over lives here: a [`SemanticModel`] of resolved symbols and
//! one [`CompilationUnit`] tree per file whose nodes point into that model.

pub mod builder;
pub mod bundle;
pub mod model;
pub mod tree;
pub mod types;

pub use builder::ModelBuilder;
pub use bundle::{BundleError, SourceBundle};
pub use model::{
    Accessibility, Constant, MethodDetail, MethodKind, RefKind, SemanticModel, SymbolData,
    SymbolDetail, SymbolId, SymbolKind, TypeDetail, TypeKind,
};
pub use tree::*;
pub use types::{SpecialType, TypeRef};
