//! bindery-context - observe paths in a context graph and keep expressions live.
//!
//! # Overview
//!
//! A [`Runtime`] hands every [`Control`] its own [`ContextManager`]. The
//! manager watches identifier paths such as `user.address.city`: writing the
//! last segment, or replacing any object along the way, fires the listeners
//! of that path with the new and old value. Arrays additionally report their
//! mutating calls (`push`, `splice`, ...).
//!
//! [`Runtime::observe_expression`] builds on that: it observes every path an
//! expression reads and re-evaluates the expression when one of them changes.
//!
//! # Example
//!
//! ```
//! use bindery_context::{Control, Listener, Runtime};
//! use bindery_expression::Value;
//! use serde_json::json;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! struct Form(Value);
//!
//! impl Control for Form {
//!     fn uid(&self) -> &str { "form" }
//!     fn context(&self) -> Value { self.0.clone() }
//! }
//!
//! let runtime = Runtime::default();
//! let form = Form(Value::from(json!({"user": {"name": "ada"}})));
//! let manager = runtime.get_manager(&form);
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = Rc::clone(&seen);
//! let remove = manager.observe("user.name", Listener::new("label", move |new: &Value, _: &Value| {
//!     sink.borrow_mut().push(new.to_string());
//! }));
//!
//! form.0.as_object().unwrap().set("user", Value::from(json!({"name": "grace"})));
//! assert_eq!(*seen.borrow(), ["grace"]);
//! remove.remove();
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod runtime;

pub use config::{RuntimeOptions, DEFAULT_MAX_NOTIFICATION_DEPTH};
pub use error::ContextError;
pub use manager::{
    ArrayCallback, ChangeCallback, ContextManager, Listener, RemoveListener, WeakContextManager,
};
pub use runtime::{Control, ExpressionBinding, IntoExpression, Runtime};
