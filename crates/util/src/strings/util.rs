/// A predicate function for checking character properties.
pub type CharPredicate = fn(char) -> bool;

/// Check if a character may start an identifier (`@` marks an alias root).
///
/// # Examples
///
/// ```
/// use bindery_util::strings::is_identifier_start;
///
/// assert!(is_identifier_start('a'));
/// assert!(is_identifier_start('_'));
/// assert!(is_identifier_start('$'));
/// assert!(is_identifier_start('@'));
/// assert!(!is_identifier_start('1'));
/// ```
pub fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || ch == '$' || ch == '@'
}

/// Check if a character may continue an identifier or numeric run.
pub fn is_identifier_part(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$' || ch == '@'
}

/// Check if a character is an ASCII digit.
pub fn is_digit(ch: char) -> bool {
    ch.is_ascii_digit()
}

/// Check if a character is whitespace.
pub fn is_whitespace(ch: char) -> bool {
    ch.is_whitespace()
}

/// Check if a character is a string literal delimiter.
pub fn is_quote(ch: char) -> bool {
    ch == '\'' || ch == '"'
}

/// Check if a character can be part of an operator lexeme.
///
/// # Examples
///
/// ```
/// use bindery_util::strings::is_operator_char;
///
/// assert!(is_operator_char('='));
/// assert!(is_operator_char('&'));
/// assert!(!is_operator_char('('));
/// assert!(!is_operator_char('a'));
/// ```
pub fn is_operator_char(ch: char) -> bool {
    matches!(
        ch,
        '+' | '-' | '*' | '/' | '%' | '!' | '=' | '<' | '>' | '&' | '|' | '^'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_start() {
        assert!(is_identifier_start('Z'));
        assert!(is_identifier_start('α'));
        assert!(!is_identifier_start('9'));
        assert!(!is_identifier_start('.'));
        assert!(!is_identifier_start(' '));
    }

    #[test]
    fn test_identifier_part() {
        assert!(is_identifier_part('9'));
        assert!(is_identifier_part('_'));
        assert!(!is_identifier_part('.'));
        assert!(!is_identifier_part('['));
    }

    #[test]
    fn test_quote() {
        assert!(is_quote('\''));
        assert!(is_quote('"'));
        assert!(!is_quote('`'));
    }

    #[test]
    fn test_operator_chars() {
        for ch in "+-*/%!=<>&|^".chars() {
            assert!(is_operator_char(ch), "{ch}");
        }
        for ch in "()[]{},.?:'\"".chars() {
            assert!(!is_operator_char(ch), "{ch}");
        }
    }
}
