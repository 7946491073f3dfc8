//! Scope errors

use lm_span::FileSpan;
use thiserror::Error;

/// Failures raised while naming locals
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScopeError {
    /// Every temporary name of the pool is live in one function chain
    #[error("too many temporaries in one function (pool of {pool} names exhausted)")]
    NamePoolExhausted {
        /// Pool size
        pool: usize,
        /// Function that ran out of names
        span: Option<FileSpan>,
    },

    /// `pop` without a matching `push`
    #[error("scope stack underflow")]
    Underflow,
}

impl ScopeError {
    /// Location of the failing function, when known
    pub fn span(&self) -> Option<FileSpan> {
        match self {
            Self::NamePoolExhausted { span, .. } => *span,
            Self::Underflow => None,
        }
    }
}
