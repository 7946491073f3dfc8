//! Driver errors

use lm_lower::LowerError;
use lm_override::MetadataError;
use lm_source::BundleError;
use lm_span::FileSpan;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that stops a compilation run
#[derive(Debug, Error)]
pub enum DriverError {
    /// Reading or writing a file failed
    #[error("cannot {action} `{}`", path.display())]
    Io {
        /// What was attempted, "read" or "write"
        action: &'static str,
        /// File involved
        path: PathBuf,
        /// Cause
        #[source]
        source: io::Error,
    },

    /// The project file is not a valid `luma.toml`
    #[error("invalid configuration `{}`: {message}", path.display())]
    Config {
        /// Project file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// The source bundle could not be decoded
    #[error(transparent)]
    Bundle(#[from] BundleError),

    /// An override document failed to load or validate
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// A unit failed to lower
    #[error("{error}")]
    Lower {
        /// Unit path
        unit: String,
        /// Cause
        error: LowerError,
    },
}

impl DriverError {
    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action: "read",
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action: "write",
            path: path.into(),
            source,
        }
    }

    /// Source location of the failure, when it has one
    pub fn span(&self) -> Option<FileSpan> {
        match self {
            Self::Lower { error, .. } => error.span(),
            Self::Io { .. } | Self::Config { .. } | Self::Bundle(_) | Self::Metadata(_) => None,
        }
    }
}
