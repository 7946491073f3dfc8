//! Rustc-style rendering of fatal errors
//!
//! Units that came with their source text get a codespan snippet. Units
//! without text only have byte offsets to offer, so those errors are
//! reported as `path@start..end`.

use crate::error::DriverError;
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::{self, Config};
use lm_lower::LowerError;
use lm_source::CompilationUnit;
use lm_span::{FileId, FileSpan};
use rustc_hash::FxHashMap;
use std::error::Error;

/// Source texts of a program, indexed for reporting
pub struct Diagnostics {
    files: SimpleFiles<String, String>,
    ids: FxHashMap<FileId, usize>,
    paths: FxHashMap<FileId, String>,
}

impl Diagnostics {
    /// Index the units of a program
    pub fn new(units: &[CompilationUnit]) -> Self {
        let mut files = SimpleFiles::new();
        let mut ids = FxHashMap::default();
        let mut paths = FxHashMap::default();
        for unit in units {
            paths.insert(unit.file, unit.path.clone());
            if let Some(text) = &unit.text {
                ids.insert(unit.file, files.add(unit.path.clone(), text.clone()));
            }
        }
        Self { files, ids, paths }
    }

    /// Render an error for the terminal, without colour
    pub fn render(&self, error: &DriverError) -> String {
        if let DriverError::Lower { error, .. } = error
            && let Some(diagnostic) = self.lower_diagnostic(error)
            && let Some(text) = self.emit(&diagnostic)
        {
            return text;
        }
        self.plain(error)
    }

    /// Snippet diagnostic, when every labelled file has text
    fn lower_diagnostic(&self, error: &LowerError) -> Option<Diagnostic<usize>> {
        let labels = match error {
            LowerError::UnsupportedConstruct { span, .. } => vec![self.label(*span, true, "not supported")?],
            LowerError::NamePoolExhausted { span, .. } => vec![self.label(*span, true, "in this function")?],
            LowerError::AmbiguousOverrideRule { span, .. } | LowerError::TemplateArity { span, .. } => {
                vec![self.label(*span, true, "used here")?]
            }
            LowerError::MultipleEntryPoints { first, second, .. } => vec![
                self.label(*second, true, "second entry point")?,
                self.label(*first, false, "first entry point")?,
            ],
        };
        let notes = match error {
            LowerError::AmbiguousOverrideRule { first, second, .. } => {
                vec![format!("first rule: {first}"), format!("second rule: {second}")]
            }
            LowerError::TemplateArity { template, .. } => vec![format!("template: {template}")],
            _ => Vec::new(),
        };
        Some(
            Diagnostic::error()
                .with_message(error.to_string())
                .with_labels(labels)
                .with_notes(notes),
        )
    }

    fn label(&self, span: FileSpan, primary: bool, message: &str) -> Option<Label<usize>> {
        let file = *self.ids.get(&span.file)?;
        let label = if primary {
            Label::primary(file, span.range())
        } else {
            Label::secondary(file, span.range())
        };
        Some(label.with_message(message))
    }

    fn emit(&self, diagnostic: &Diagnostic<usize>) -> Option<String> {
        let mut buffer = Vec::new();
        let config = Config::default();
        #[allow(deprecated, reason = "plain byte buffer output")]
        term::emit(&mut buffer, &config, &self.files, diagnostic).ok()?;
        String::from_utf8(buffer).ok()
    }

    fn location(&self, span: FileSpan) -> String {
        let path = self
            .paths
            .get(&span.file)
            .map_or_else(|| span.file.to_string(), String::clone);
        format!("{path}@{}..{}", span.span.start, span.span.end)
    }

    /// `error: message`, locations, then the cause chain
    fn plain(&self, error: &DriverError) -> String {
        let mut lines = vec![format!("error: {error}")];
        if let DriverError::Lower { error, .. } = error {
            lines.extend(error.spans().into_iter().map(|span| format!("  --> {}", self.location(span))));
        }
        if let DriverError::Metadata(error) = error {
            lines.extend(error.locations().into_iter().map(|location| format!("  = rule: {location}")));
        }
        let mut cause = error.source();
        while let Some(inner) = cause {
            lines.push(format!("  = caused by: {inner}"));
            cause = inner.source();
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lm_span::Span;

    fn unit(text: Option<&str>) -> CompilationUnit {
        CompilationUnit {
            file: FileId::new(3),
            path: "src/Program.cs".to_owned(),
            text: text.map(str::to_owned),
            members: Vec::new(),
        }
    }

    fn unsupported() -> DriverError {
        DriverError::Lower {
            unit: "src/Program.cs".to_owned(),
            error: LowerError::UnsupportedConstruct {
                what: "`stackalloc` expression".to_owned(),
                span: FileSpan::new(FileId::new(3), Span::new(22, 32)),
            },
        }
    }

    #[test]
    fn test_snippet_when_text_is_known() {
        let source = "class A {\n  int* p = stackalloc int[4];\n}\n";
        let diagnostics = Diagnostics::new(&[unit(Some(source))]);
        let text = diagnostics.render(&unsupported());
        assert!(text.starts_with("error: no lowering rule for `stackalloc` expression"));
        assert!(text.contains("src/Program.cs:2:"));
        assert!(text.contains("not supported"));
    }

    #[test]
    fn test_offsets_without_text() {
        let diagnostics = Diagnostics::new(&[unit(None)]);
        let text = diagnostics.render(&unsupported());
        expect_test::expect![[r#"
            error: no lowering rule for `stackalloc` expression
              --> src/Program.cs@22..32
        "#]]
        .assert_eq(&text);
    }
}
