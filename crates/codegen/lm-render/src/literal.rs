//! Literal spelling

use lm_target::Literal;

/// Reserved words of the target language
pub const KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in", "local",
    "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// Whether `text` can be written as a bare identifier
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    let starts_well = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_');
    starts_well
        && chars.all(|rest| rest.is_ascii_alphanumeric() || rest == '_')
        && !KEYWORDS.contains(&text)
}

/// Quote a string, choosing a long bracket for text with newlines or
/// backslashes
pub fn quote_string(value: &str) -> String {
    if value.contains('\n') || value.contains('\\') {
        long_bracket(value)
    } else {
        short_string(value)
    }
}

fn short_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            control if control.is_control() => {
                out.push_str(&format!("\\{}", u32::from(control)));
            }
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn long_bracket(value: &str) -> String {
    let mut level = 0;
    loop {
        let close = format!("]{}]", "=".repeat(level));
        let joined = format!("{value}{close}");
        if joined.find(&close) == Some(value.len()) {
            let open = format!("[{}[", "=".repeat(level));
            let lead = if value.starts_with('\n') { "\n" } else { "" };
            return format!("{open}{lead}{value}{close}");
        }
        level += 1;
    }
}

fn render_float(value: f64) -> String {
    if value.is_nan() {
        return "(0 / 0)".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "math.huge" } else { "(-math.huge)" }.to_owned();
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value:?}")
    }
}

/// Spell a literal
pub fn render_literal(literal: &Literal) -> String {
    match literal {
        Literal::Nil => "nil".to_owned(),
        Literal::Bool(value) => value.to_string(),
        Literal::Int(value) => value.to_string(),
        Literal::Float(value) => render_float(*value),
        Literal::Str(value) => quote_string(value),
        Literal::Char(ch) => {
            let code = u32::from(*ch);
            if ch.is_control() || *ch == ']' {
                code.to_string()
            } else {
                format!("{code} --[[{}]]", short_string(&ch.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_bracket_level_avoids_early_close() {
        assert_eq!(quote_string("a\\b"), "[[a\\b]]");
        assert_eq!(quote_string("x]]\ny"), "[=[x]]\ny]=]");
        assert_eq!(quote_string("x\n]"), "[=[x\n]]=]");
        assert_eq!(quote_string("\nlead"), "[[\n\nlead]]");
    }

    #[test]
    fn test_short_string_escapes() {
        assert_eq!(quote_string("say \"hi\"\t"), "\"say \\\"hi\\\"\\t\"");
    }

    #[test]
    fn test_number_spelling() {
        assert_eq!(render_literal(&Literal::Float(2.0)), "2.0");
        assert_eq!(render_literal(&Literal::Float(0.25)), "0.25");
        assert_eq!(render_literal(&Literal::Int(-4)), "-4");
        assert_eq!(render_literal(&Literal::Char('A')), "65 --[[\"A\"]]");
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("_value1"));
        assert!(!is_identifier("1value"));
        assert!(!is_identifier("until"));
        assert!(!is_identifier("a-b"));
    }
}
