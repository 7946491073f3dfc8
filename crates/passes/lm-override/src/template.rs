//! Code templates
//!
//! A template is target code with positional placeholders: `{this}` for the
//! receiver, `{0}`, `{1}`, ... for call arguments and `` {`0} ``, ... for
//! generic type arguments. Binding substitutes already lowered expressions;
//! nothing beyond the placeholders is parsed. Braces that do not form a
//! placeholder are kept verbatim, so table constructors survive.

use lm_target::{Expr, TemplatePart};
use std::mem;
use thiserror::Error;

/// One placeholder slot
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum Placeholder {
    /// `{this}`
    Receiver,
    /// `{N}`
    Arg(usize),
    /// `` {`N} ``
    TypeArg(usize),
}

/// Parsed template segment
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// Verbatim text
    Text(String),
    /// Slot to fill
    Slot(Placeholder),
}

/// A placeholder had nothing to bind to
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("template `{template}` uses {placeholder} but the call site does not supply it")]
pub struct TemplateError {
    /// Template source
    pub template: String,
    /// The unbound placeholder as written
    pub placeholder: String,
}

/// Parsed code template
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeTemplate {
    source: String,
    segments: Vec<Segment>,
}

fn parse_placeholder(inner: &str) -> Option<Placeholder> {
    if inner == "this" {
        return Some(Placeholder::Receiver);
    }
    if let Some(digits) = inner.strip_prefix('`') {
        return digits.parse().ok().map(Placeholder::TypeArg);
    }
    if !inner.is_empty() && inner.bytes().all(|byte| byte.is_ascii_digit()) {
        return inner.parse().ok().map(Placeholder::Arg);
    }
    None
}

impl CodeTemplate {
    /// Split `source` into text and placeholder segments
    pub fn parse(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut rest = source;
        while let Some(open) = rest.find('{') {
            let (before, from_brace) = rest.split_at(open);
            text.push_str(before);
            let slot = from_brace
                .find('}')
                .and_then(|close| parse_placeholder(&from_brace[1..close]).map(|slot| (slot, close)));
            match slot {
                Some((slot, close)) => {
                    if !text.is_empty() {
                        segments.push(Segment::Text(mem::take(&mut text)));
                    }
                    segments.push(Segment::Slot(slot));
                    rest = &from_brace[close + 1..];
                }
                None => {
                    text.push('{');
                    rest = &from_brace[1..];
                }
            }
        }
        text.push_str(rest);
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }
        Self {
            source: source.to_owned(),
            segments,
        }
    }

    /// Template as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether the template reads the receiver
    pub fn uses_receiver(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| *segment == Segment::Slot(Placeholder::Receiver))
    }

    /// Highest argument index referenced, plus one
    pub fn arg_arity(&self) -> usize {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Slot(Placeholder::Arg(index)) => Some(index + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Substitute lowered expressions into the placeholders
    pub fn bind(&self, receiver: Option<&Expr>, args: &[Expr], type_args: &[Expr]) -> Result<Expr, TemplateError> {
        let mut parts = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => parts.push(TemplatePart::Text(text.clone())),
                Segment::Slot(slot) => {
                    let bound = match slot {
                        Placeholder::Receiver => receiver,
                        Placeholder::Arg(index) => args.get(*index),
                        Placeholder::TypeArg(index) => type_args.get(*index),
                    };
                    let Some(bound) = bound else {
                        return Err(self.unbound(*slot));
                    };
                    parts.push(TemplatePart::Expr(guard(bound.clone())));
                }
            }
        }
        Ok(Expr::Template(parts))
    }

    fn unbound(&self, slot: Placeholder) -> TemplateError {
        let placeholder = match slot {
            Placeholder::Receiver => "{this}".to_owned(),
            Placeholder::Arg(index) => format!("{{{index}}}"),
            Placeholder::TypeArg(index) => format!("{{`{index}}}"),
        };
        TemplateError {
            template: self.source.clone(),
            placeholder,
        }
    }
}

/// Operators bind differently once spliced into foreign text
fn guard(expr: Expr) -> Expr {
    match expr {
        Expr::Binary { .. } | Expr::Unary { .. } | Expr::Function(_) | Expr::Template(_) => Expr::Paren(Box::new(expr)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lm_target::BinOp;

    #[test]
    fn test_parse_keeps_table_braces() {
        let template = CodeTemplate::parse("System.setmetatable({}, {0})");
        assert_eq!(
            template.segments(),
            &[
                Segment::Text("System.setmetatable({}, ".to_owned()),
                Segment::Slot(Placeholder::Arg(0)),
                Segment::Text(")".to_owned()),
            ]
        );
        assert_eq!(template.arg_arity(), 1);
    }

    #[test]
    fn test_bind_all_placeholder_kinds() {
        let template = CodeTemplate::parse("{this}:Cast({`0}, {1})");
        assert!(template.uses_receiver());
        let bound = template.bind(
            Some(&Expr::ident("list")),
            &[Expr::int(0), Expr::binary(BinOp::Add, Expr::int(1), Expr::int(2))],
            &[Expr::path("System.Int32")],
        );
        let Ok(Expr::Template(parts)) = bound else {
            panic!("binding failed: {bound:?}");
        };
        assert_eq!(parts.len(), 6);
        assert_eq!(parts[0], TemplatePart::Expr(Expr::ident("list")));
        assert!(matches!(&parts[4], TemplatePart::Expr(Expr::Paren(_))));
    }

    #[test]
    fn test_unbound_placeholder_is_reported() {
        let template = CodeTemplate::parse("math.max({0}, {2})");
        let error = template.bind(None, &[Expr::int(1), Expr::int(2)], &[]);
        assert_eq!(
            error,
            Err(TemplateError {
                template: "math.max({0}, {2})".to_owned(),
                placeholder: "{2}".to_owned(),
            })
        );
    }
}
