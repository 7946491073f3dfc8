//! Lowering errors

use lm_override::{MetadataError, RuleLocation, TemplateError};
use lm_scope::ScopeError;
use lm_span::FileSpan;
use thiserror::Error;

/// Fatal lowering failures; each aborts the file it occurs in
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LowerError {
    /// No rule translates this construct
    #[error("no lowering rule for {what}")]
    UnsupportedConstruct {
        /// Construct description
        what: String,
        /// Construct location
        span: FileSpan,
    },

    /// A function needed more temporaries than the pool holds
    #[error("more than {pool} temporaries needed in one function")]
    NamePoolExhausted {
        /// Pool size
        pool: usize,
        /// Function location
        span: FileSpan,
    },

    /// Two override rules match one use and disagree
    #[error("ambiguous override rules for `{member}`: {first} and {second}")]
    AmbiguousOverrideRule {
        /// Member name
        member: String,
        /// First rule
        first: RuleLocation,
        /// Second rule
        second: RuleLocation,
        /// Use site
        span: FileSpan,
    },

    /// More than one static `Main`
    #[error("multiple entry points: `{first_name}` and `{second_name}`")]
    MultipleEntryPoints {
        /// First candidate
        first_name: String,
        /// Its location
        first: FileSpan,
        /// Second candidate
        second_name: String,
        /// Its location
        second: FileSpan,
    },

    /// A code template names a placeholder the use site cannot bind
    #[error("template `{template}` has no binding for `{placeholder}`")]
    TemplateArity {
        /// Template source
        template: String,
        /// Placeholder as written
        placeholder: String,
        /// Use site
        span: FileSpan,
    },
}

impl LowerError {
    /// Primary location
    pub fn span(&self) -> Option<FileSpan> {
        match self {
            Self::UnsupportedConstruct { span, .. }
            | Self::NamePoolExhausted { span, .. }
            | Self::AmbiguousOverrideRule { span, .. }
            | Self::TemplateArity { span, .. } => Some(*span),
            Self::MultipleEntryPoints { second, .. } => Some(*second),
        }
    }

    /// Every location worth labelling, primary first
    pub fn spans(&self) -> Vec<FileSpan> {
        match self {
            Self::MultipleEntryPoints { first, second, .. } => vec![*second, *first],
            other => other.span().into_iter().collect(),
        }
    }

    pub(crate) fn unsupported(what: impl Into<String>, span: FileSpan) -> Self {
        Self::UnsupportedConstruct {
            what: what.into(),
            span,
        }
    }

    pub(crate) fn from_scope(error: ScopeError, fallback: FileSpan) -> Self {
        match error {
            ScopeError::NamePoolExhausted { pool, span } => Self::NamePoolExhausted {
                pool,
                span: span.unwrap_or(fallback),
            },
            ScopeError::Underflow => Self::unsupported("unbalanced scope", fallback),
        }
    }

    pub(crate) fn from_metadata(error: MetadataError, span: FileSpan) -> Self {
        match error {
            MetadataError::AmbiguousOverrideRule { member, first, second } => Self::AmbiguousOverrideRule {
                member,
                first,
                second,
                span,
            },
            other => Self::unsupported(other.to_string(), span),
        }
    }

    pub(crate) fn from_template(error: TemplateError, span: FileSpan) -> Self {
        Self::TemplateArity {
            template: error.template,
            placeholder: error.placeholder,
            span,
        }
    }
}
