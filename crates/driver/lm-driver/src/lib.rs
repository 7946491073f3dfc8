//! Compilation driver
//!
//! Ties the passes together for a whole program: loads the project
//! configuration and override documents, lowers every unit of a source
//! bundle behind the partial-type barrier, finds the entry point, and writes
//! the rendered units plus a manifest for the runtime loader.

mod compiler;
mod config;
mod diagnostics;
mod error;
mod manifest;

pub use compiler::{CompileOutput, Compiler, UnitArtifact, load_bundle};
pub use config::{CONFIG_FILE, CompilerConfig, CompilerSection, OutputSection, ProfileName};
pub use diagnostics::Diagnostics;
pub use error::DriverError;
pub use manifest::{MANIFEST_FILE, manifest_chunk};

#[cfg(test)]
mod tests;
