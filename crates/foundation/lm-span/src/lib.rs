//! Source file spans and locations
//!
//! Every node the front end hands over carries a [`Span`]; every fatal
//! error the compiler raises carries a [`FileSpan`] so it can be reported
//! against the original source text.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A unique identifier for a source file
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Display)]
#[display("#{_0}")]
pub struct FileId(pub u32);

impl FileId {
    /// Create a file id from its raw index
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw index, usable as a position in a file table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A byte offset span in a source file
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Inclusive start offset
    pub start: u32,
    /// Exclusive end offset
    pub end: u32,
}

impl Span {
    /// Create a span from its offsets
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Span covering nothing at offset zero, used for synthesized nodes
    pub const fn detached() -> Self {
        Self { start: 0, end: 0 }
    }

    /// Byte range for slicing source text
    pub fn range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }

    /// Length in bytes
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span is empty
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Smallest span covering both `self` and `other`
    #[must_use]
    pub fn cover(self, other: Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A span with associated file
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct FileSpan {
    /// File the span points into
    pub file: FileId,
    /// Byte span inside that file
    pub span: Span,
}

impl FileSpan {
    /// Pair a span with its file
    pub fn new(file: FileId, span: Span) -> Self {
        Self { file, span }
    }

    /// Byte range for slicing source text
    pub fn range(&self) -> Range<usize> {
        self.span.range()
    }
}

/// A one-based line and column
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize, Display)]
#[display("{line}:{column}")]
pub struct LineCol {
    /// One-based line
    pub line: u32,
    /// One-based column, counted in bytes
    pub column: u32,
}

/// Offsets of line starts for one source text
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    /// Index the line starts of `text`
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, byte)| *byte == b'\n')
                .map(|(offset, _)| offset as u32 + 1),
        );
        Self { line_starts }
    }

    /// Number of lines in the indexed text
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Resolve a byte offset to a line and column
    pub fn line_col(&self, offset: u32) -> LineCol {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        };
        let start = self.line_starts.get(line).copied().unwrap_or_default();
        LineCol {
            line: line as u32 + 1,
            column: offset - start + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col_resolution() {
        let index = LineIndex::new("class A {\n  int x;\n}\n");
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.line_col(0), LineCol { line: 1, column: 1 });
        assert_eq!(index.line_col(12), LineCol { line: 2, column: 3 });
        assert_eq!(index.line_col(19), LineCol { line: 3, column: 1 });
    }

    #[test]
    fn test_span_cover() {
        let merged = Span::new(4, 8).cover(Span::new(2, 5));
        assert_eq!(merged, Span::new(2, 8));
        assert_eq!(merged.len(), 6);
        assert!(Span::detached().is_empty());
    }

    #[test]
    fn test_line_col_display() {
        let position = LineCol { line: 3, column: 14 };
        assert_eq!(position.to_string(), "3:14");
        assert_eq!(FileId::new(2).to_string(), "#2");
    }
}
