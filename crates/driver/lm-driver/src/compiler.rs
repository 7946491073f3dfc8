//! Whole-program compilation

use crate::config::CompilerConfig;
use crate::error::DriverError;
use crate::manifest::{MANIFEST_FILE, manifest_chunk};
use indexmap::IndexSet;
use lm_lower::{LowerError, ProgramFacts, find_entry_point, lower_unit};
use lm_override::OverrideProvider;
use lm_source::{CompilationUnit, SemanticModel, SourceBundle};
use lm_span::FileId;
use lm_target::Chunk;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, instrument};

/// Lowered form of one source unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitArtifact {
    /// Source path
    pub path: String,
    /// Dotted module name the loader requires, `src.App.Program`
    pub module: String,
    /// Output chunk
    pub chunk: Chunk,
    /// Types declared by the unit
    pub type_count: usize,
    /// Qualified names of exported types
    pub exports: Vec<String>,
}

impl UnitArtifact {
    /// Output path relative to the output directory
    pub fn output_path(&self, extension: &str) -> PathBuf {
        let mut path: PathBuf = relative_components(&self.path).collect();
        path.set_extension(extension);
        path
    }
}

/// Everything a compilation run produced
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutput {
    /// One artifact per unit, in input order
    pub units: Vec<UnitArtifact>,
    /// Qualified name of the program's `Main`
    pub entry_point: Option<String>,
    /// Spaces per indentation level
    pub indent: usize,
    /// Write `manifest.lua`
    pub manifest: bool,
}

impl CompileOutput {
    /// Units that produced code
    pub fn emitted(&self) -> impl Iterator<Item = &UnitArtifact> {
        self.units.iter().filter(|unit| !unit.chunk.body.is_empty())
    }

    /// Exported types of all units, first occurrence first
    pub fn exports(&self) -> impl Iterator<Item = &str> {
        let unique: IndexSet<&str> = self
            .units
            .iter()
            .flat_map(|unit| unit.exports.iter().map(String::as_str))
            .collect();
        unique.into_iter()
    }

    /// Number of types declared by the program
    pub fn type_count(&self) -> usize {
        self.units.iter().map(|unit| unit.type_count).sum()
    }

    /// Rendered text of one unit
    pub fn render_unit(&self, unit: &UnitArtifact) -> String {
        lm_render::render(&unit.chunk, self.indent)
    }

    /// Rendered text of the manifest
    pub fn render_manifest(&self) -> String {
        lm_render::render(&manifest_chunk(self), self.indent)
    }

    /// Write every unit that produced code, plus `manifest.lua`
    ///
    /// Returns the written paths.
    ///
    /// # Errors
    ///
    /// [`DriverError::Io`] for the first directory or file that cannot be
    /// written.
    pub fn write_to(&self, dir: &Path, extension: &str) -> Result<Vec<PathBuf>, DriverError> {
        let mut written = Vec::new();
        for unit in self.emitted() {
            let path = dir.join(unit.output_path(extension));
            write_file(&path, &self.render_unit(unit))?;
            written.push(path);
        }
        if self.manifest {
            let path = dir.join(MANIFEST_FILE);
            write_file(&path, &self.render_manifest())?;
            written.push(path);
        }
        info!(files = written.len(), dir = %dir.display(), "wrote output");
        Ok(written)
    }
}

fn write_file(path: &Path, text: &str) -> Result<(), DriverError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| DriverError::write(parent, source))?;
    }
    fs::write(path, text).map_err(|source| DriverError::write(path, source))
}

/// Normal components of a unit path, so output never escapes its directory
fn relative_components(path: &str) -> impl Iterator<Item = &str> {
    Path::new(path).components().filter_map(|component| match component {
        Component::Normal(part) => part.to_str(),
        _ => None,
    })
}

/// `src/App/Program.cs` -> `src.App.Program`
fn module_name(path: &str) -> String {
    let mut parts: Vec<&str> = relative_components(path).collect();
    if let Some(last) = parts.last_mut() {
        let stem = Path::new(*last).file_stem().and_then(|stem| stem.to_str());
        *last = stem.unwrap_or(*last);
    }
    parts.join(".")
}

/// Read a source bundle from disk
///
/// # Errors
///
/// [`DriverError::Io`] if the file cannot be read and
/// [`DriverError::Bundle`] if it is not a valid bundle.
pub fn load_bundle(path: &Path) -> Result<SourceBundle, DriverError> {
    let text = fs::read_to_string(path).map_err(|source| DriverError::read(path, source))?;
    let bundle = SourceBundle::from_json(&text)?;
    debug!(units = bundle.units.len(), symbols = bundle.model.len(), "decoded source bundle");
    Ok(bundle)
}

/// Compiles the units of one program against its semantic model
pub struct Compiler {
    model: SemanticModel,
    overrides: OverrideProvider,
    config: CompilerConfig,
}

impl Compiler {
    /// Compiler over a model, with loaded override rules
    pub fn new(model: SemanticModel, overrides: OverrideProvider, config: CompilerConfig) -> Self {
        Self {
            model,
            overrides,
            config,
        }
    }

    /// Compiler whose override rules are the documents listed in `config`
    ///
    /// # Errors
    ///
    /// [`DriverError::Metadata`] for the first document that fails to load
    /// or validate.
    pub fn with_config(model: SemanticModel, config: CompilerConfig) -> Result<Self, DriverError> {
        let overrides = OverrideProvider::load_files(&config.compiler.metadata)?;
        debug!(types = overrides.type_count(), "loaded override rules");
        Ok(Self::new(model, overrides, config))
    }

    /// The model units are compiled against
    pub fn model(&self) -> &SemanticModel {
        &self.model
    }

    /// Active configuration
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Lower every unit of the program
    ///
    /// All type fragments are gathered before the first unit is lowered, so
    /// a partial type is emitted once, whole, in the unit holding its first
    /// fragment.
    ///
    /// # Errors
    ///
    /// [`DriverError::Lower`] for the first unit that fails, or when the
    /// program has more than one entry point.
    #[instrument(level = "info", skip_all, fields(units = units.len()))]
    pub fn compile(&self, units: &[CompilationUnit]) -> Result<CompileOutput, DriverError> {
        let entry_point = find_entry_point(&self.model, units).map_err(|error| lower_failure(units, error))?;
        let facts = ProgramFacts::collect(&self.model, units);
        let options = self.config.lower_options();

        let mut artifacts = Vec::with_capacity(units.len());
        for unit in units {
            info!(path = %unit.path, "lowering unit");
            let output = lower_unit(unit, &self.model, &self.overrides, &options, &facts).map_err(|error| {
                DriverError::Lower {
                    unit: unit.path.clone(),
                    error,
                }
            })?;
            artifacts.push(UnitArtifact {
                module: module_name(&output.path),
                path: output.path,
                chunk: output.chunk,
                type_count: output.type_count,
                exports: output.exports,
            });
        }
        let output = CompileOutput {
            units: artifacts,
            entry_point: entry_point.map(|entry| entry.name),
            indent: self.config.compiler.indent,
            manifest: self.config.output.manifest,
        };
        info!(types = output.type_count(), "compiled program");
        Ok(output)
    }
}

/// Attribute a program-level error to the unit its location points into
fn lower_failure(units: &[CompilationUnit], error: LowerError) -> DriverError {
    let file = error.span().map_or_else(FileId::default, |span| span.file);
    let unit = units
        .iter()
        .find(|unit| unit.file == file)
        .map_or_else(String::new, |unit| unit.path.clone());
    DriverError::Lower { unit, error }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_names() {
        assert_eq!(module_name("src/App/Program.cs"), "src.App.Program");
        assert_eq!(module_name("Program.cs"), "Program");
        assert_eq!(module_name("../outside/./Thing.cs"), "outside.Thing");
    }

    #[test]
    fn test_output_paths_stay_inside() {
        let artifact = UnitArtifact {
            path: "/abs/../App/Program.cs".to_owned(),
            module: String::new(),
            chunk: Chunk::default(),
            type_count: 0,
            exports: Vec::new(),
        };
        assert_eq!(artifact.output_path("lua"), PathBuf::from("abs/App/Program.lua"));
    }
}
