//! Check command implementation

use crate::CompileArgs;
use crate::compile::{lower, project_config, report};
use anyhow::Result;
use colored::Colorize;
use std::path::Path;

pub fn check(bundle: &Path, options: &CompileArgs) -> Result<()> {
    println!("{} {}", "Checking".green().bold(), bundle.display());

    let config = project_config(options)?;
    let (units, result) = lower(bundle, config)?;
    let output = report(&units, result, bundle)?;

    for unit in output.emitted() {
        println!("    {} {} ({} types)", "✓".green(), unit.path, unit.type_count);
    }
    let exports: Vec<&str> = output.exports().collect();
    if !exports.is_empty() {
        println!("  {} {}", "Exports:".bold(), exports.join(", "));
    }
    println!("{} No errors found", "Success:".green().bold());
    Ok(())
}
