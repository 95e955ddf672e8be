//! Precompiled patterns shared by the tokenizer, the parser and the binding layer.
//!
//! Each pattern is compiled once per process on first use.

use regex::Regex;
use std::sync::OnceLock;

fn variable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@?[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid pattern"))
}

fn alias_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@([A-Za-z_$][A-Za-z0-9_$]*)").expect("valid pattern"))
}

fn numeric_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?$").expect("valid pattern")
    })
}

fn index_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:0|[1-9]\d*)$").expect("valid pattern"))
}

fn markup_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("valid pattern"))
}

pub(crate) fn camel_separator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-_\s]+(.)?").expect("valid pattern"))
}

/// Returns `true` if `name` is a legal variable name (optionally `@`-prefixed).
///
/// ```
/// use bindery_util::is_valid_variable;
///
/// assert!(is_valid_variable("foo"));
/// assert!(is_valid_variable("$index"));
/// assert!(is_valid_variable("@item"));
/// assert!(!is_valid_variable("2abc"));
/// assert!(!is_valid_variable("a-b"));
/// ```
pub fn is_valid_variable(name: &str) -> bool {
    variable_regex().is_match(name)
}

/// Returns `true` if `name` is an alias reference (`@name`).
pub fn is_alias(name: &str) -> bool {
    alias_regex().is_match(name)
}

/// Returns the root name of an alias reference without the `@`.
///
/// ```
/// use bindery_util::alias_root;
///
/// assert_eq!(alias_root("@item.name"), Some("item"));
/// assert_eq!(alias_root("item"), None);
/// ```
pub fn alias_root(identifier: &str) -> Option<&str> {
    alias_regex()
        .captures(identifier)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Returns `true` if `text` is a numeric literal (decimal, optional signed exponent).
pub fn is_numeric(text: &str) -> bool {
    numeric_regex().is_match(text)
}

/// Returns `true` if `text` is a canonical array index (`0`, `12`, not `012`).
pub fn is_index(text: &str) -> bool {
    index_regex().is_match(text)
}

/// Returns the trimmed expressions found between `{{` and `}}` markers.
///
/// ```
/// use bindery_util::find_markup;
///
/// assert_eq!(find_markup("Hello {{ user.name }}, {{count + 1}}!"), vec!["user.name", "count + 1"]);
/// assert!(find_markup("plain text").is_empty());
/// ```
pub fn find_markup(text: &str) -> Vec<String> {
    markup_regex()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
