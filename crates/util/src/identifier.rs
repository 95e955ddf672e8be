//! Identifier paths: the dot-separated route from a context root to a value.
//!
//! Bracket accessors are accepted on input and normalized to dot form, so
//! `items[3].name`, `items.3.name` and `items['3'].name` all denote the same
//! path. Keys that cannot be written after a dot keep a quoted bracket.

use crate::strings::is_identifier_part;

/// Splits an identifier into its path segments.
///
/// ```
/// use bindery_util::split_identifier;
///
/// assert_eq!(split_identifier("items[3].name"), vec!["items", "3", "name"]);
/// assert_eq!(split_identifier("a['b c'].d"), vec!["a", "b c", "d"]);
/// assert!(split_identifier("").is_empty());
/// ```
pub fn split_identifier(identifier: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = identifier.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '.' => flush(&mut segments, &mut current),
            '[' => {
                flush(&mut segments, &mut current);
                let quote = match chars.peek() {
                    Some(&q) if q == '\'' || q == '"' => {
                        chars.next();
                        Some(q)
                    }
                    _ => None,
                };
                let mut key = String::new();
                while let Some(c) = chars.next() {
                    match quote {
                        Some(q) if c == q => {
                            // Skip to the closing bracket.
                            for rest in chars.by_ref() {
                                if rest == ']' {
                                    break;
                                }
                            }
                            break;
                        }
                        None if c == ']' => break,
                        _ => key.push(c),
                    }
                }
                let key = if quote.is_some() { key } else { key.trim().to_string() };
                if !key.is_empty() {
                    segments.push(key);
                }
            }
            c if c.is_whitespace() && current.is_empty() => {}
            c => current.push(c),
        }
    }
    flush(&mut segments, &mut current);
    segments
}

fn flush(segments: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        segments.push(trimmed.to_string());
    }
    current.clear();
}

/// Joins path segments back into an identifier.
///
/// Segments that are not plain identifier or index runs (anything holding a
/// `.`, a bracket, a quote or whitespace) are written in quoted bracket form
/// so that [`split_identifier`] gives them back unchanged.
///
/// ```
/// use bindery_util::join_identifier;
///
/// assert_eq!(join_identifier(&["items", "0", "name"]), "items.0.name");
/// assert_eq!(join_identifier(&["a", "x.y", "b"]), r#"a["x.y"].b"#);
/// assert_eq!(join_identifier(&["say \"hi\""]), r#"['say "hi"']"#);
/// ```
pub fn join_identifier<S: AsRef<str>>(segments: &[S]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        let segment = segment.as_ref();
        if is_plain_segment(segment) {
            if i > 0 {
                out.push('.');
            }
            out.push_str(segment);
        } else {
            let quote = if segment.contains('"') { '\'' } else { '"' };
            out.push('[');
            out.push(quote);
            out.push_str(segment);
            out.push(quote);
            out.push(']');
        }
    }
    out
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(is_identifier_part)
}

/// Rewrites an identifier into canonical dot form.
///
/// ```
/// use bindery_util::normalize_identifier;
///
/// assert_eq!(normalize_identifier("list[0]['name']"), "list.0.name");
/// ```
pub fn normalize_identifier(identifier: &str) -> String {
    join_identifier(&split_identifier(identifier))
}

/// Returns `true` if `child` lies strictly below `parent`. Both must be in
/// the canonical form produced by [`normalize_identifier`].
///
/// ```
/// use bindery_util::is_descendant;
///
/// assert!(is_descendant("a.b.c", "a.b"));
/// assert!(is_descendant(r#"a["x.y"]"#, "a"));
/// assert!(!is_descendant("a.bc", "a.b"));
/// assert!(!is_descendant("a.b", "a.b"));
/// ```
pub fn is_descendant(child: &str, parent: &str) -> bool {
    child.len() > parent.len() + 1
        && child.starts_with(parent)
        && matches!(child.as_bytes()[parent.len()], b'.' | b'[')
}
