//! bindery-util - shared helpers for the bindery expression and binding crates.
//!
//! Precompiled patterns, identifier path handling and small string helpers.

pub mod identifier;
pub mod patterns;
pub mod strings;

// Re-exports for convenience
pub use identifier::{
    is_descendant, join_identifier, normalize_identifier, split_identifier,
};
pub use patterns::{
    alias_root, find_markup, is_alias, is_index, is_numeric, is_valid_variable,
};
pub use strings::{as_string, camel_case};
