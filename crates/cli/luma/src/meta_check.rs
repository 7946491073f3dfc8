//! Meta-check command implementation

use anyhow::{Result, bail};
use colored::Colorize;
use lm_driver::{Diagnostics, DriverError};
use lm_override::OverrideProvider;
use std::path::PathBuf;

pub fn meta_check(documents: &[PathBuf]) -> Result<()> {
    println!("{} {} documents", "Checking".green().bold(), documents.len());

    match OverrideProvider::load_files(documents) {
        Ok(provider) => {
            println!(
                "{} {} types described",
                "Success:".green().bold(),
                provider.type_count()
            );
            Ok(())
        }
        Err(error) => {
            eprint!("{}", Diagnostics::new(&[]).render(&DriverError::Metadata(error)));
            bail!("invalid metadata")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_duplicate_classes_across_documents_fail() {
        let Ok(dir) = tempfile::tempdir() else {
            panic!("cannot create temp dir");
        };
        let text = "[[assembly.namespace]]\nname = \"System\"\n[[assembly.namespace.class]]\nname = \"Console\"\n";
        let first = dir.path().join("a.toml");
        let second = dir.path().join("b.toml");
        for path in [&first, &second] {
            let Ok(()) = fs::write(path, text) else {
                panic!("cannot write document");
            };
        }

        assert!(meta_check(&[first.clone()]).ok().is_some());
        assert!(meta_check(&[first, second]).ok().is_none());
    }
}
