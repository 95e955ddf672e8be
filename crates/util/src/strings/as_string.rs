/// Quotes text as a JSON string literal.
///
/// Used when rendering string values and offending expressions in
/// diagnostics.
///
/// # Examples
///
/// ```
/// use bindery_util::strings::as_string;
///
/// assert_eq!(as_string("hello"), "\"hello\"");
/// assert_eq!(as_string("say \"hi\""), "\"say \\\"hi\\\"\"");
/// ```
pub fn as_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_string_empty() {
        assert_eq!(as_string(""), "\"\"");
    }

    #[test]
    fn test_as_string_newline() {
        assert_eq!(as_string("a\nb"), "\"a\\nb\"");
    }
}
