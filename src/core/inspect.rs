//! Shallow, regex-based inspection of program text.
//!
//! Nothing here parses the program. Lookups match the escaped variable name
//! case-sensitively against an `=` and only ever look at the first match in
//! source order, so redefinitions further down are invisible.

use once_cell::sync::Lazy;
use regex::Regex;

static INTEGER_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static FLOAT_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\d+$").unwrap());

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiteralType {
    String,
    Integer,
    Float,
    List,
    Dict,
    Unknown,
}

impl LiteralType {
    pub fn name(self) -> &'static str {
        match self {
            LiteralType::String => "string",
            LiteralType::Integer => "integer",
            LiteralType::Float => "float",
            LiteralType::List => "list",
            LiteralType::Dict => "dict",
            LiteralType::Unknown => "unknown",
        }
    }

    /// Canonical names plus the `str` / `int` spellings callers often send.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" | "str" => Some(LiteralType::String),
            "integer" | "int" => Some(LiteralType::Integer),
            "float" => Some(LiteralType::Float),
            "list" => Some(LiteralType::List),
            "dict" => Some(LiteralType::Dict),
            "unknown" => Some(LiteralType::Unknown),
            _ => None,
        }
    }
}

/// Classifies a right-hand side by its spelling. First rule that matches wins.
pub fn infer_literal_type(value: &str) -> LiteralType {
    let quoted = |q: char| value.starts_with(q) && value.ends_with(q);

    if quoted('"') || quoted('\'') {
        LiteralType::String
    } else if INTEGER_LITERAL.is_match(value) {
        LiteralType::Integer
    } else if FLOAT_LITERAL.is_match(value) {
        LiteralType::Float
    } else if value.starts_with('[') && value.ends_with(']') {
        LiteralType::List
    } else if value.starts_with('{') && value.ends_with('}') {
        LiteralType::Dict
    } else {
        LiteralType::Unknown
    }
}

fn build(pattern: String) -> Option<Regex> {
    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(err) => {
            tracing::warn!("Unusable lookup pattern: {}", err);
            None
        }
    }
}

/// Whether `variable` appears as a whole word followed by `=` anywhere.
pub fn has_assignment(source: &str, variable: &str) -> bool {
    build(format!(r"\b{}\s*=", regex::escape(variable)))
        .is_some_and(|re| re.is_match(source))
}

/// Trimmed right-hand side of the first `variable = ...` line.
pub fn first_assignment<'a>(source: &'a str, variable: &str) -> Option<&'a str> {
    let re = build(format!(r"{}\s*=\s*(.+?)(?:\n|$)", regex::escape(variable)))?;
    re.captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Raw text between the brackets of the first single-line
/// `variable = [...]` literal. An empty literal is not found.
pub fn first_list_literal<'a>(source: &'a str, variable: &str) -> Option<&'a str> {
    let re = build(format!(r"{}\s*=\s*\[(.+?)\]", regex::escape(variable)))?;
    re.captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Comma separated, trimmed, non-empty items.
pub fn count_list_items(content: &str) -> usize {
    content
        .split(',')
        .filter(|item| !item.trim().is_empty())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_literal_type() {
        assert_eq!(infer_literal_type(r#""Alice""#), LiteralType::String);
        assert_eq!(infer_literal_type("'Alice'"), LiteralType::String);
        assert_eq!(infer_literal_type("42"), LiteralType::Integer);
        assert_eq!(infer_literal_type("3.14"), LiteralType::Float);
        assert_eq!(infer_literal_type("[1, 2]"), LiteralType::List);
        assert_eq!(infer_literal_type("{'a': 1}"), LiteralType::Dict);
        assert_eq!(infer_literal_type("-5"), LiteralType::Unknown);
        assert_eq!(infer_literal_type("len(x)"), LiteralType::Unknown);
        assert_eq!(infer_literal_type("3."), LiteralType::Unknown);
    }

    #[test]
    fn test_literal_type_aliases() {
        assert_eq!(LiteralType::parse("str"), Some(LiteralType::String));
        assert_eq!(LiteralType::parse("int"), Some(LiteralType::Integer));
        assert_eq!(LiteralType::parse("string"), Some(LiteralType::String));
        assert_eq!(LiteralType::parse("tuple"), None);
    }

    #[test]
    fn test_has_assignment_requires_word_boundary() {
        let source = "username = 'bob'\n";
        assert!(has_assignment(source, "username"));
        assert!(!has_assignment(source, "name"));
        assert!(has_assignment("x=1", "x"));
        assert!(!has_assignment("print(x)", "x"));
    }

    #[test]
    fn test_has_assignment_escapes_variable() {
        assert!(!has_assignment("ab = 1", "a.b"));
        assert!(has_assignment("a.b = 1", "a.b"));
    }

    #[test]
    fn test_first_assignment_takes_first_match_only() {
        let source = "count = 1\nprint(count)\ncount = 'two'\n";
        assert_eq!(first_assignment(source, "count"), Some("1"));
    }

    #[test]
    fn test_first_assignment_trims_and_stops_at_line_end() {
        let source = "greeting =   \"hi\"   \nother = 2";
        assert_eq!(first_assignment(source, "greeting"), Some("\"hi\""));
        assert_eq!(first_assignment(source, "other"), Some("2"));
        assert_eq!(first_assignment(source, "missing"), None);
    }

    #[test]
    fn test_list_literal_lookup() {
        let source = "fruits = [\"apple\", \"banana\", \"cherry\"]\n";
        let content = first_list_literal(source, "fruits").unwrap();
        assert_eq!(content, "\"apple\", \"banana\", \"cherry\"");
        assert_eq!(count_list_items(content), 3);
    }

    #[test]
    fn test_list_literal_not_found_cases() {
        assert_eq!(first_list_literal("items = []", "items"), None);
        assert_eq!(first_list_literal("items = [\n1,\n2]", "items"), None);
        assert_eq!(first_list_literal("items = list()", "items"), None);
    }

    #[test]
    fn test_count_list_items_skips_blanks() {
        assert_eq!(count_list_items("1, 2, 3,"), 3);
        assert_eq!(count_list_items(" , "), 0);
    }
}
