//! Serialized hand-off from the front end
//!
//! A bundle is the semantic model plus the annotated trees of every file in
//! the program, encoded as JSON.

use crate::model::{SemanticModel, SymbolDetail, SymbolId};
use crate::tree::CompilationUnit;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reading a bundle
#[derive(Debug, Error)]
pub enum BundleError {
    /// The JSON did not match the bundle schema
    #[error("malformed source bundle: {0}")]
    Decode(#[from] serde_json::Error),

    /// A symbol refers to an id outside the table
    #[error("symbol `{owner}` refers to missing symbol #{missing}")]
    DanglingSymbol {
        /// Name of the referring symbol
        owner: String,
        /// The missing id
        missing: u32,
    },
}

/// Semantic model and source trees for one program
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceBundle {
    /// Resolved symbols
    pub model: SemanticModel,
    /// One tree per file
    #[serde(default)]
    pub units: Vec<CompilationUnit>,
}

impl SourceBundle {
    /// Decode and validate a bundle
    ///
    /// # Errors
    /// Returns `BundleError` if the text is not a valid bundle or symbol
    /// references dangle
    pub fn from_json(text: &str) -> Result<Self, BundleError> {
        let bundle: Self = serde_json::from_str(text)?;
        bundle.validate()?;
        Ok(bundle)
    }

    /// Encode as pretty-printed JSON
    ///
    /// # Errors
    /// Returns `BundleError` if serialization fails
    pub fn to_json(&self) -> Result<String, BundleError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that every id stored inside the symbol table resolves
    ///
    /// # Errors
    /// Returns `BundleError::DanglingSymbol` for the first bad reference
    pub fn validate(&self) -> Result<(), BundleError> {
        let model = &self.model;
        for (_, data) in model.iter() {
            let mut referenced: Vec<SymbolId> = data.containing.into_iter().collect();
            match &data.detail {
                SymbolDetail::Method(detail) => {
                    referenced.extend(&detail.params);
                    referenced.extend(&detail.type_params);
                    referenced.extend(detail.overridden);
                    referenced.extend(&detail.implements);
                    referenced.extend(detail.associated);
                }
                SymbolDetail::Type(detail) => {
                    referenced.extend(&detail.members);
                    referenced.extend(&detail.type_params);
                    referenced.extend(detail.invoke);
                }
                SymbolDetail::Property {
                    getter,
                    setter,
                    params,
                    ..
                } => {
                    referenced.extend(*getter);
                    referenced.extend(*setter);
                    referenced.extend(params);
                }
                SymbolDetail::Variable { .. } | SymbolDetail::Event { .. } | SymbolDetail::None => {}
            }
            if let Some(missing) = referenced.into_iter().find(|id| model.get(*id).is_none()) {
                return Err(BundleError::DanglingSymbol {
                    owner: data.name.clone(),
                    missing: missing.0,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ModelBuilder;
    use crate::model::{SymbolData, SymbolKind};

    #[test]
    fn test_bundle_json_round_trip_preserves_symbols() {
        let mut builder = ModelBuilder::new();
        let ty = builder.class("App", "Program");
        let bundle = SourceBundle {
            model: builder.finish(),
            units: Vec::new(),
        };

        let text = bundle.to_json().unwrap_or_default();
        let decoded = SourceBundle::from_json(&text);
        assert!(matches!(decoded, Ok(ref decoded) if decoded.model.full_name(ty) == "App.Program"));
    }

    #[test]
    fn test_dangling_reference_is_rejected() {
        let mut model = SemanticModel::new();
        let mut data = SymbolData::new("Orphan", SymbolKind::Field);
        data.containing = Some(SymbolId(40));
        model.alloc(data);
        let bundle = SourceBundle {
            model,
            units: Vec::new(),
        };

        let error = bundle.validate();
        assert!(matches!(
            error,
            Err(BundleError::DanglingSymbol { missing: 40, .. })
        ));
    }
}
