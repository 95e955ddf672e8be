//! String utilities.
//!
//! Character classes used by the tokenizer, camel casing for attribute names
//! and JSON-style quoting for diagnostics.

mod as_string;
mod camel_case;
mod util;

pub use as_string::as_string;
pub use camel_case::camel_case;
pub use util::{
    is_digit, is_identifier_part, is_identifier_start, is_operator_char, is_quote, is_whitespace,
    CharPredicate,
};
