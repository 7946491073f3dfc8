//! Metadata loading and lookup errors

use std::fmt;
use std::io;
use thiserror::Error;

/// Where a rule sits in its document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleLocation {
    /// Document path
    pub document: String,
    /// Namespace name
    pub namespace: String,
    /// Class name, if the rule is below a class
    pub class: Option<String>,
    /// Member name, if the rule is a member rule
    pub member: Option<String>,
    /// Position of the rule among its siblings
    pub index: usize,
}

impl fmt::Display for RuleLocation {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}: {}", self.document, self.namespace)?;
        if let Some(class) = &self.class {
            write!(formatter, ".{class}")?;
        }
        if let Some(member) = &self.member {
            write!(formatter, ".{member}")?;
        }
        write!(formatter, " (entry {})", self.index + 1)
    }
}

/// Failures of the override metadata engine
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The document could not be read
    #[error("cannot read metadata document `{path}`")]
    Io {
        /// Document path
        path: String,
        /// Cause
        #[source]
        source: io::Error,
    },

    /// The document is not valid TOML/JSON for the metadata schema
    #[error("cannot parse metadata document `{path}`: {message}")]
    Parse {
        /// Document path
        path: String,
        /// Parser message
        message: String,
    },

    /// Structural validation failed: empty or duplicate names
    #[error("malformed metadata document at {location}: {message}")]
    MalformedMetadataDocument {
        /// What is wrong
        message: String,
        /// Offending rule
        location: RuleLocation,
        /// Earlier rule it clashes with
        previous: Option<RuleLocation>,
    },

    /// Two rules match the same member signature
    #[error("ambiguous override rules for `{member}`: {first} and {second}")]
    AmbiguousOverrideRule {
        /// Member name
        member: String,
        /// First rule
        first: RuleLocation,
        /// Second rule
        second: RuleLocation,
    },
}

impl MetadataError {
    /// Every rule location the error refers to
    pub fn locations(&self) -> Vec<&RuleLocation> {
        match self {
            Self::Io { .. } | Self::Parse { .. } => Vec::new(),
            Self::MalformedMetadataDocument { location, previous, .. } => {
                let mut locations = vec![location];
                locations.extend(previous.iter());
                locations
            }
            Self::AmbiguousOverrideRule { first, second, .. } => vec![first, second],
        }
    }
}
