//! `luma.toml` project configuration
//!
//! ```toml
//! [compiler]
//! profile = "classic"
//! indent = 2
//! metadata = ["meta/unity.toml"]
//! export-attributes = ["Game.ExportAttribute"]
//!
//! [output]
//! dir = "out"
//! extension = "lua"
//! ```
//!
//! Every key is optional. Relative paths are resolved against the directory
//! holding the file.

use crate::error::DriverError;
use lm_lower::{DEFAULT_INLINE_STRING_LEN, LowerOptions, RuntimeProfile};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the project file looked up in the working directory
pub const CONFIG_FILE: &str = "luma.toml";

/// Project configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Lowering switches
    pub compiler: CompilerSection,
    /// Where and how output is written
    pub output: OutputSection,
}

/// `[compiler]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct CompilerSection {
    /// Target runtime
    pub profile: ProfileName,
    /// Spaces per indentation level
    pub indent: usize,
    /// Override documents, loaded in order
    pub metadata: Vec<PathBuf>,
    /// Attribute types whose uses are exported
    pub export_attributes: Vec<String>,
    /// Export every attribute use
    pub export_all_attributes: bool,
    /// Longest constant string inlined at use sites
    pub inline_string_const_len: usize,
}

impl Default for CompilerSection {
    fn default() -> Self {
        Self {
            profile: ProfileName::default(),
            indent: 4,
            metadata: Vec::new(),
            export_attributes: Vec::new(),
            export_all_attributes: false,
            inline_string_const_len: DEFAULT_INLINE_STRING_LEN,
        }
    }
}

/// `[output]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    /// Output directory; the CLI requires one from here or its flags
    pub dir: Option<PathBuf>,
    /// Write `manifest.lua` next to the units
    pub manifest: bool,
    /// Extension of unit files
    pub extension: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: None,
            manifest: true,
            extension: "lua".to_owned(),
        }
    }
}

/// Runtime profile by name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileName {
    /// No native integer operators
    Classic,
    /// Native bitwise, shift and floor division
    #[default]
    Newest,
}

impl ProfileName {
    /// Capability flags of the profile
    pub const fn profile(self) -> RuntimeProfile {
        match self {
            Self::Classic => RuntimeProfile::classic(),
            Self::Newest => RuntimeProfile::newest(),
        }
    }
}

impl CompilerConfig {
    /// Load a project file, resolving its relative paths
    ///
    /// # Errors
    ///
    /// [`DriverError::Io`] if the file cannot be read and
    /// [`DriverError::Config`] if it is not a valid project file.
    pub fn from_file(path: &Path) -> Result<Self, DriverError> {
        let text = fs::read_to_string(path).map_err(|source| DriverError::read(path, source))?;
        let mut config = Self::parse(path, &text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        debug!(path = %path.display(), "loaded project configuration");
        Ok(config)
    }

    /// Load `luma.toml` from `dir` when it exists, defaults otherwise
    ///
    /// # Errors
    ///
    /// As [`Self::from_file`], for a file that exists.
    pub fn discover(dir: &Path) -> Result<Self, DriverError> {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            Self::from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Decode project file text; `path` only labels errors
    ///
    /// # Errors
    ///
    /// [`DriverError::Config`] for invalid TOML or unknown keys.
    pub fn parse(path: &Path, text: &str) -> Result<Self, DriverError> {
        toml::from_str(text).map_err(|error| DriverError::Config {
            path: path.to_path_buf(),
            message: error.message().to_owned(),
        })
    }

    /// Make relative metadata and output paths relative to `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        for document in &mut self.compiler.metadata {
            if document.is_relative() {
                *document = base.join(&*document);
            }
        }
        if let Some(dir) = &mut self.output.dir
            && dir.is_relative()
        {
            *dir = base.join(&*dir);
        }
    }

    /// Lowering options described by the `[compiler]` table
    pub fn lower_options(&self) -> LowerOptions {
        LowerOptions {
            profile: self.compiler.profile.profile(),
            inline_string_const_len: self.compiler.inline_string_const_len,
            export_attributes: self.compiler.export_attributes.clone(),
            export_all_attributes: self.compiler.export_all_attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = CompilerConfig::parse(Path::new("luma.toml"), "");
        assert_eq!(config.ok(), Some(CompilerConfig::default()));
        let defaults = CompilerConfig::default();
        assert_eq!(defaults.compiler.indent, 4);
        assert_eq!(defaults.compiler.inline_string_const_len, 15);
        assert!(defaults.output.manifest);
        assert_eq!(defaults.output.extension, "lua");
    }

    #[test]
    fn test_full_file() {
        let text = r#"
            [compiler]
            profile = "classic"
            indent = 2
            metadata = ["meta/a.toml", "/abs/b.json"]
            export-attributes = ["Game.ExportAttribute"]
            export-all-attributes = true
            inline-string-const-len = 8

            [output]
            dir = "out"
            manifest = false
            extension = "luau"
        "#;
        let Ok(mut config) = CompilerConfig::parse(Path::new("luma.toml"), text) else {
            panic!("valid configuration rejected");
        };
        config.resolve_paths(Path::new("/project"));

        assert_eq!(config.compiler.profile, ProfileName::Classic);
        assert_eq!(
            config.compiler.metadata,
            vec![PathBuf::from("/project/meta/a.toml"), PathBuf::from("/abs/b.json")]
        );
        assert_eq!(config.output.dir, Some(PathBuf::from("/project/out")));
        assert_eq!(config.output.extension, "luau");

        let options = config.lower_options();
        assert_eq!(options.profile, RuntimeProfile::classic());
        assert_eq!(options.inline_string_const_len, 8);
        assert!(options.export_all_attributes);
        assert_eq!(options.export_attributes, vec!["Game.ExportAttribute".to_owned()]);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let config = CompilerConfig::parse(Path::new("luma.toml"), "[compiler]\nindnet = 2\n");
        assert!(matches!(config, Err(DriverError::Config { .. })));

        let config = CompilerConfig::parse(Path::new("luma.toml"), "[linker]\n");
        assert!(matches!(config, Err(DriverError::Config { .. })));
    }

    #[test]
    fn test_discover_without_file_gives_defaults() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("cannot create temp dir");
        };
        let config = CompilerConfig::discover(dir.path());
        assert_eq!(config.ok(), Some(CompilerConfig::default()));
    }

    #[test]
    fn test_discover_reads_file() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("cannot create temp dir");
        };
        let Ok(()) = fs::write(dir.path().join(CONFIG_FILE), "[compiler]\nprofile = \"classic\"\n") else {
            panic!("cannot write project file");
        };

        let config = CompilerConfig::discover(dir.path());
        assert_eq!(config.ok().map(|config| config.compiler.profile), Some(ProfileName::Classic));
    }
}
