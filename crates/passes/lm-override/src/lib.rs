//! Override metadata engine
//!
//! Library members that are not compiled from source can carry hand-written
//! lowering rules: a new name, a code template replacing the access, or a
//! flag. Rules are loaded once from TOML/JSON documents, validated up front,
//! and consulted by the lowering passes before any default rule applies.

pub mod document;
mod error;
mod provider;
pub mod template;

pub use document::MetaDocument;
pub use error::{MetadataError, RuleLocation};
pub use provider::{Action, LookupKind, OverrideProvider};
pub use template::{CodeTemplate, TemplateError};
