//! Luma compiler CLI
//!
//! Reads a source bundle produced by the front end and writes one Lua file
//! per compilation unit plus the loader manifest.

#![allow(clippy::print_stdout, clippy::print_stderr, reason = "command-line status output")]

use clap::{ArgAction, Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

mod check;
mod compile;
mod logging;
mod meta_check;

#[derive(Parser)]
#[command(name = "luma")]
#[command(about = "C#-to-Lua compiler", long_about = None)]
#[command(version)]
struct Cli {
    /// More log output; repeat for trace level
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source bundle to Lua files
    Compile {
        /// Source bundle (JSON) from the front end
        bundle: PathBuf,

        /// Output directory
        #[arg(short = 'd', long = "output")]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: CompileArgs,
    },

    /// Lower a source bundle without writing anything
    Check {
        /// Source bundle (JSON) from the front end
        bundle: PathBuf,

        #[command(flatten)]
        options: CompileArgs,
    },

    /// Load and validate override documents
    MetaCheck {
        /// Documents, TOML or JSON
        #[arg(required = true)]
        documents: Vec<PathBuf>,
    },
}

/// Flags shared by `compile` and `check`; each overrides `luma.toml`
#[derive(Args, Debug, Default, Clone, PartialEq, Eq)]
struct CompileArgs {
    /// Override documents; `;` separates several in one value
    #[arg(short, long = "metas", value_delimiter = ';')]
    metas: Vec<PathBuf>,

    /// Target a runtime without native integer operators
    #[arg(short, long)]
    classic: bool,

    /// Spaces per indentation level
    #[arg(short, long)]
    indent: Option<usize>,

    /// Attribute types whose uses are exported, `;`-separated
    #[arg(short, long, value_delimiter = ';')]
    attributes: Vec<String>,

    /// Export every attribute use
    #[arg(long)]
    all_attributes: bool,

    /// Project file; defaults to `luma.toml` in the working directory
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Compile {
            bundle,
            output,
            options,
        } => compile::compile(&bundle, output, &options),
        Commands::Check { bundle, options } => check::check(&bundle, &options),
        Commands::MetaCheck { documents } => meta_check::meta_check(&documents),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_flags() {
        let cli = Cli::try_parse_from([
            "luma",
            "compile",
            "app.json",
            "-d",
            "out",
            "-m",
            "a.toml;b.json",
            "-m",
            "c.toml",
            "-c",
            "-i",
            "2",
            "-a",
            "Game.Save;Game.Sync",
            "-vv",
        ]);
        let Ok(cli) = cli else {
            panic!("flags rejected");
        };
        assert_eq!(cli.verbose, 2);
        let Commands::Compile {
            bundle,
            output,
            options,
        } = cli.command
        else {
            panic!("wrong subcommand");
        };
        assert_eq!(bundle, PathBuf::from("app.json"));
        assert_eq!(output, Some(PathBuf::from("out")));
        assert_eq!(
            options.metas,
            vec![PathBuf::from("a.toml"), PathBuf::from("b.json"), PathBuf::from("c.toml")]
        );
        assert!(options.classic);
        assert_eq!(options.indent, Some(2));
        assert_eq!(options.attributes, vec!["Game.Save".to_owned(), "Game.Sync".to_owned()]);
        assert!(!options.all_attributes);
    }

    #[test]
    fn test_meta_check_needs_documents() {
        assert!(Cli::try_parse_from(["luma", "meta-check"]).ok().is_none());
        assert!(Cli::try_parse_from(["luma", "-q", "meta-check", "a.toml"]).ok().is_some());
    }

    #[test]
    fn test_quiet_and_verbose_conflict() {
        assert!(Cli::try_parse_from(["luma", "-q", "-v", "check", "app.json"]).ok().is_none());
    }
}
