//! Runtime configuration.

use crate::error::ContextError;
use bindery_expression::ParserOptions;
use serde::{Deserialize, Serialize};

/// Nested change notifications deeper than this are dropped.
pub const DEFAULT_MAX_NOTIFICATION_DEPTH: usize = 64;

/// Options for a [`Runtime`](crate::Runtime). Every field has a default, so
/// `{}` is a valid configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    pub parser: ParserOptions,
    /// How many change notifications may nest before a manager stops
    /// propagating. Guards against listeners that keep writing to the paths
    /// they observe.
    pub max_notification_depth: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            parser: ParserOptions::default(),
            max_notification_depth: DEFAULT_MAX_NOTIFICATION_DEPTH,
        }
    }
}

impl RuntimeOptions {
    /// Reads options from a JSON document.
    ///
    /// ```
    /// use bindery_context::RuntimeOptions;
    ///
    /// let options = RuntimeOptions::from_json_str(r#"{"parser": {"cache_capacity": 128}}"#).unwrap();
    /// assert_eq!(options.parser.cache_capacity, Some(128));
    /// assert_eq!(options.max_notification_depth, 64);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, ContextError> {
        Ok(serde_json::from_str(json)?)
    }
}
