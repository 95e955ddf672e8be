use crate::patterns::camel_separator_regex;

/// Converts dash, underscore or space separated words to camel case.
///
/// # Examples
///
/// ```
/// use bindery_util::strings::camel_case;
///
/// assert_eq!(camel_case("data-foo-bar"), "dataFooBar");
/// assert_eq!(camel_case("plat_context"), "platContext");
/// assert_eq!(camel_case("already"), "already");
/// ```
pub fn camel_case(s: &str) -> String {
    camel_separator_regex()
        .replace_all(s, |caps: &regex::Captures<'_>| {
            caps.get(1)
                .map(|m| m.as_str().to_uppercase())
                .unwrap_or_default()
        })
        .into_owned()
}
