//! Names the output must never declare

/// Target keywords
pub const KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in", "local",
    "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// Globals the runtime relies on being unshadowed
pub const RUNTIME_GLOBALS: &[&str] = &["System", "Linq", "global", "math", "string", "table", "type"];

/// Whether `name` is a keyword
pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Whether declaring `name` as a local would break keywords or runtime access
pub fn is_reserved(name: &str) -> bool {
    is_keyword(name) || RUNTIME_GLOBALS.contains(&name)
}
