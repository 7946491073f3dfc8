//! Compile command implementation

use crate::CompileArgs;
use anyhow::{Context, Result, bail};
use colored::Colorize;
use lm_driver::{CompileOutput, Compiler, CompilerConfig, Diagnostics, DriverError, ProfileName, load_bundle};
use lm_source::CompilationUnit;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub fn compile(bundle: &Path, output: Option<PathBuf>, options: &CompileArgs) -> Result<()> {
    let start = Instant::now();
    println!("{} {}", "Compiling".green().bold(), bundle.display());

    let mut config = project_config(options)?;
    if let Some(dir) = output {
        config.output.dir = Some(dir);
    }
    let Some(dir) = config.output.dir.clone() else {
        bail!("no output directory; pass `-d <dir>` or set `[output] dir` in luma.toml");
    };
    let extension = config.output.extension.clone();

    let (units, result) = lower(bundle, config)?;
    let output = report(&units, result, bundle)?;
    let written = output
        .write_to(&dir, &extension)
        .with_context(|| format!("cannot write output to `{}`", dir.display()))?;

    println!(
        "  {} {} types in {} files",
        "Wrote".bold(),
        output.type_count(),
        written.len()
    );
    if let Some(entry) = &output.entry_point {
        println!("  {} {entry}", "Entry:".bold());
    }
    println!(
        "{} in {:.2}s",
        "Finished".green().bold(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// `luma.toml` from `--config` or the working directory, with flags applied
pub fn project_config(options: &CompileArgs) -> Result<CompilerConfig> {
    let mut config = match &options.config {
        Some(path) => CompilerConfig::from_file(path)?,
        None => {
            let cwd = env::current_dir().context("cannot determine working directory")?;
            CompilerConfig::discover(&cwd)?
        }
    };
    apply_flags(&mut config, options);
    Ok(config)
}

/// Command-line flags override the project file
pub fn apply_flags(config: &mut CompilerConfig, options: &CompileArgs) {
    config.compiler.metadata.extend(options.metas.iter().cloned());
    if options.classic {
        config.compiler.profile = ProfileName::Classic;
    }
    if let Some(indent) = options.indent {
        config.compiler.indent = indent;
    }
    config.compiler.export_attributes.extend(options.attributes.iter().cloned());
    if options.all_attributes {
        config.compiler.export_all_attributes = true;
    }
}

/// Load the bundle and the override documents, then lower every unit
pub fn lower(
    bundle: &Path,
    config: CompilerConfig,
) -> Result<(Vec<CompilationUnit>, Result<CompileOutput, DriverError>)> {
    let source = load_bundle(bundle)?;
    println!("  {} {} units", "Found:".bold(), source.units.len());
    let compiler = Compiler::with_config(source.model, config)?;
    let result = compiler.compile(&source.units);
    Ok((source.units, result))
}

/// Print a lowering failure as a diagnostic and turn it into a command error
pub fn report(
    units: &[CompilationUnit],
    result: Result<CompileOutput, DriverError>,
    bundle: &Path,
) -> Result<CompileOutput> {
    match result {
        Ok(output) => Ok(output),
        Err(error) => {
            eprint!("{}", Diagnostics::new(units).render(&error));
            bail!("could not compile `{}`", bundle.display())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lm_source::{
        Block, Body, MemberDecl, MethodDecl, ModelBuilder, NamespaceDecl, NamespaceMember, SourceBundle, TypeDecl, TypeRef,
    };
    use lm_span::{FileId, Span};
    use std::fs;

    fn write_bundle(dir: &Path) -> PathBuf {
        let mut builder = ModelBuilder::new();
        let program = builder.class("App", "Program");
        let main = builder.method(program, "Main", &[], TypeRef::Void);
        builder.make_static(main);
        let bundle = SourceBundle {
            model: builder.finish(),
            units: vec![CompilationUnit {
                file: FileId::new(0),
                path: "Program.cs".to_owned(),
                text: None,
                members: vec![NamespaceMember::Namespace(NamespaceDecl {
                    name: "App".to_owned(),
                    members: vec![NamespaceMember::Type(TypeDecl {
                        symbol: program,
                        members: vec![MemberDecl::Method(MethodDecl {
                            symbol: main,
                            body: Some(Body::Block(Block::default())),
                            span: Span::detached(),
                        })],
                        attributes: Vec::new(),
                        span: Span::detached(),
                    })],
                    span: Span::detached(),
                })],
            }],
        };
        let path = dir.join("app.json");
        let Ok(()) = fs::write(&path, bundle.to_json().unwrap_or_default()) else {
            panic!("cannot write bundle");
        };
        path
    }

    #[test]
    fn test_flags_override_project_file() {
        let mut config = CompilerConfig::default();
        config.compiler.metadata.push(PathBuf::from("project.toml"));
        let options = CompileArgs {
            metas: vec![PathBuf::from("extra.toml")],
            classic: true,
            indent: Some(2),
            attributes: vec!["Game.Save".to_owned()],
            all_attributes: false,
            config: None,
        };
        apply_flags(&mut config, &options);

        assert_eq!(
            config.compiler.metadata,
            vec![PathBuf::from("project.toml"), PathBuf::from("extra.toml")]
        );
        assert_eq!(config.compiler.profile, ProfileName::Classic);
        assert_eq!(config.compiler.indent, 2);
        assert_eq!(config.compiler.export_attributes, vec!["Game.Save".to_owned()]);
    }

    #[test]
    fn test_compile_writes_units_and_manifest() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("cannot create temp dir");
        };
        let bundle = write_bundle(dir.path());
        let out = dir.path().join("out");
        let config = dir.path().join("luma.toml");
        let Ok(()) = fs::write(&config, "[compiler]\nindent = 2\n") else {
            panic!("cannot write project file");
        };
        let options = CompileArgs {
            config: Some(config),
            ..CompileArgs::default()
        };

        let result = compile(&bundle, Some(out.clone()), &options);
        assert!(result.ok().is_some());
        let program = fs::read_to_string(out.join("Program.lua")).unwrap_or_default();
        assert!(program.starts_with("System.namespace(\"App\", function (namespace)\n  namespace.class(\"Program\""), "{program}");
        let manifest = fs::read_to_string(out.join("manifest.lua")).unwrap_or_default();
        assert!(manifest.contains("Main = \"App.Program.Main\""), "{manifest}");
    }

    #[test]
    fn test_compile_without_output_dir_fails() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("cannot create temp dir");
        };
        let bundle = write_bundle(dir.path());
        let config = dir.path().join("luma.toml");
        let Ok(()) = fs::write(&config, "") else {
            panic!("cannot write project file");
        };
        let options = CompileArgs {
            config: Some(config),
            ..CompileArgs::default()
        };
        assert!(compile(&bundle, None, &options).ok().is_none());
    }
}
