//! The binding runtime: one parser and one context manager per control.

use crate::config::RuntimeOptions;
use crate::error::ContextError;
use crate::manager::{ContextManager, Listener, RemoveListener};
use bindery_expression::{ParseError, ParsedExpression, Parser, Value};
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use tracing::{debug, warn};

/// Something that owns a context and binds expressions against it.
pub trait Control {
    /// Unique id; the runtime keeps one manager per uid.
    fn uid(&self) -> &str;

    /// The root context expressions are evaluated against.
    fn context(&self) -> Value;

    /// Values for `@name` roots.
    fn aliases(&self) -> Value {
        Value::Undefined
    }
}

/// Expression text or an already parsed expression.
pub trait IntoExpression {
    fn into_expression(self, parser: &Parser) -> Result<Rc<ParsedExpression>, ParseError>;
}

impl IntoExpression for &str {
    fn into_expression(self, parser: &Parser) -> Result<Rc<ParsedExpression>, ParseError> {
        parser.parse(self)
    }
}

impl IntoExpression for &String {
    fn into_expression(self, parser: &Parser) -> Result<Rc<ParsedExpression>, ParseError> {
        parser.parse(self)
    }
}

impl IntoExpression for Rc<ParsedExpression> {
    fn into_expression(self, _: &Parser) -> Result<Rc<ParsedExpression>, ParseError> {
        Ok(self)
    }
}

impl IntoExpression for &Rc<ParsedExpression> {
    fn into_expression(self, _: &Parser) -> Result<Rc<ParsedExpression>, ParseError> {
        Ok(Rc::clone(self))
    }
}

impl IntoExpression for ParsedExpression {
    fn into_expression(self, _: &Parser) -> Result<Rc<ParsedExpression>, ParseError> {
        Ok(Rc::new(self))
    }
}

/// A live expression observation created by [`Runtime::observe_expression`].
///
/// Observation lasts as long as the binding: dropping it removes its
/// listeners, the same as [`dispose`](Self::dispose).
#[must_use = "dropping the binding stops observing the expression"]
pub struct ExpressionBinding {
    expression: Rc<ParsedExpression>,
    value: Rc<RefCell<Value>>,
    removers: Rc<RefCell<Vec<RemoveListener>>>,
}

impl ExpressionBinding {
    /// The most recent value of the expression.
    pub fn value(&self) -> Value {
        self.value.borrow().clone()
    }

    pub fn expression(&self) -> &ParsedExpression {
        &self.expression
    }

    /// Whether any of the underlying listeners is still registered.
    pub fn is_active(&self) -> bool {
        self.removers.borrow().iter().any(RemoveListener::is_active)
    }

    /// Stops observing. Safe to call more than once.
    pub fn dispose(&self) {
        for remover in self.removers.borrow().iter() {
            remover.remove();
        }
    }
}

impl Drop for ExpressionBinding {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for ExpressionBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionBinding")
            .field("expression", &self.expression.expression())
            .field("value", &*self.value.borrow())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Owns the expression parser and the context managers of every control.
///
/// ```
/// use bindery_context::{Control, Runtime};
/// use bindery_expression::Value;
/// use serde_json::json;
///
/// struct Panel(Value);
///
/// impl Control for Panel {
///     fn uid(&self) -> &str { "panel" }
///     fn context(&self) -> Value { self.0.clone() }
/// }
///
/// let runtime = Runtime::default();
/// let panel = Panel(Value::from(json!({"price": 3, "qty": 2})));
/// let total = runtime.observe_expression(&panel, "price * qty", "total", |_, _| {}).unwrap();
/// assert_eq!(total.value(), Value::from(6));
///
/// panel.0.as_object().unwrap().set("qty", 5);
/// assert_eq!(total.value(), Value::from(15));
/// ```
pub struct Runtime {
    options: RuntimeOptions,
    parser: Parser,
    managers: RefCell<IndexMap<String, ContextManager>>,
    next_owner: Cell<u64>,
}

impl Runtime {
    pub fn new(options: RuntimeOptions) -> Self {
        Runtime {
            parser: Parser::with_options(options.parser.clone()),
            options,
            managers: RefCell::new(IndexMap::new()),
            next_owner: Cell::new(1),
        }
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    /// Parses through the shared cache.
    pub fn parse(&self, expression: &str) -> Result<Rc<ParsedExpression>, ParseError> {
        self.parser.parse(expression)
    }

    /// The manager of `control`, created on first use with the control's
    /// current context as root.
    pub fn get_manager(&self, control: &dyn Control) -> ContextManager {
        if let Some(manager) = self.managers.borrow().get(control.uid()) {
            return manager.clone();
        }
        let owner = self.next_owner.get();
        self.next_owner.set(owner + 1);
        let manager = ContextManager::new(
            control.uid(),
            owner,
            control.context(),
            self.options.max_notification_depth,
        );
        self.managers
            .borrow_mut()
            .insert(control.uid().to_string(), manager.clone());
        manager
    }

    /// The manager registered for `uid`, if any.
    pub fn manager(&self, uid: &str) -> Option<ContextManager> {
        self.managers.borrow().get(uid).cloned()
    }

    pub fn manager_count(&self) -> usize {
        self.managers.borrow().len()
    }

    /// See [`ContextManager::create_context`].
    pub fn create_context(&self, control: &dyn Control, identifier: &str) -> Value {
        self.get_manager(control).create_context(identifier)
    }

    /// One-shot evaluation against the control's aliases and the same
    /// context [`observe_expression`](Self::observe_expression) reads: the
    /// root of the control's manager, or `control.context()` while the
    /// control has none. Never creates a manager.
    pub fn evaluate_expression(
        &self,
        expression: impl IntoExpression,
        control: &dyn Control,
    ) -> Result<Value, ContextError> {
        let parsed = expression.into_expression(&self.parser)?;
        let context = match self.manager(control.uid()) {
            Some(manager) => manager.root(),
            None => control.context(),
        };
        Ok(parsed.evaluate(&context, &control.aliases())?)
    }

    /// Evaluates `expression` now and re-evaluates it whenever one of the
    /// paths it reads changes, or an array at one of those paths is mutated.
    /// `callback` receives `(new, old)` when the value changed; array
    /// mutations report even when the array instance stayed the same.
    ///
    /// A one-time expression that already has a value is evaluated once and
    /// never observed. One that is still `Undefined` stops observing after
    /// the first change that gives it a value.
    pub fn observe_expression<F>(
        &self,
        control: &dyn Control,
        expression: impl IntoExpression,
        uid: &str,
        callback: F,
    ) -> Result<ExpressionBinding, ContextError>
    where
        F: Fn(&Value, &Value) + 'static,
    {
        let parsed = expression.into_expression(&self.parser)?;
        let manager = self.get_manager(control);
        let aliases = control.aliases();
        let initial = parsed.evaluate(&manager.root(), &aliases)?;

        let binding = ExpressionBinding {
            expression: Rc::clone(&parsed),
            value: Rc::new(RefCell::new(initial.clone())),
            removers: Rc::new(RefCell::new(Vec::new())),
        };
        if parsed.is_one_time() && !initial.is_undefined() {
            return Ok(binding);
        }

        let refresh: Rc<dyn Fn(bool)> = {
            let parsed = Rc::clone(&parsed);
            let value = Rc::clone(&binding.value);
            let removers = Rc::clone(&binding.removers);
            let manager = manager.downgrade();
            Rc::new(move |mutated: bool| {
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                let next = match parsed.evaluate(&manager.root(), &aliases) {
                    Ok(next) => next,
                    Err(err) => {
                        warn!(expression = parsed.expression(), %err, "re-evaluation failed");
                        return;
                    }
                };
                let previous = {
                    let mut slot = value.borrow_mut();
                    if !mutated && slot.strict_equals(&next) {
                        return;
                    }
                    std::mem::replace(&mut *slot, next.clone())
                };
                if parsed.is_one_time() && !next.is_undefined() {
                    for remover in removers.borrow().iter() {
                        remover.remove();
                    }
                }
                callback(&next, &previous);
            })
        };

        for identifier in parsed.identifiers() {
            let on_change = Rc::clone(&refresh);
            let remover = manager.observe(
                identifier,
                Listener::new(uid, move |_: &Value, _: &Value| on_change(false)),
            );
            binding.removers.borrow_mut().push(remover);

            let current = manager.get_context(&bindery_util::split_identifier(identifier));
            let on_mutation = Rc::clone(&refresh);
            let remover = manager.observe_array(
                uid,
                move |_| on_mutation(true),
                identifier,
                &current,
                &Value::Undefined,
            );
            binding.removers.borrow_mut().push(remover);
        }
        debug!(uid, expression = parsed.expression(), "expression observed");
        Ok(binding)
    }

    /// Drops the listeners of observer `uid` from every manager.
    pub fn dispose_observer(&self, uid: &str) {
        let managers: Vec<ContextManager> = self.managers.borrow().values().cloned().collect();
        for manager in managers {
            manager.remove_observer(uid);
        }
    }

    /// Disposes the manager of control `uid`. With `persist_context` the
    /// manager stays registered with its root, ready for new observations;
    /// otherwise it is forgotten.
    pub fn dispose_manager(&self, uid: &str, persist_context: bool) {
        let Some(manager) = self.manager(uid) else {
            return;
        };
        manager.dispose(persist_context);
        if !persist_context {
            self.managers.borrow_mut().shift_remove(uid);
        }
    }

    /// Disposes every manager and empties the parse cache.
    pub fn dispose_all(&self) {
        let managers: Vec<ContextManager> = self
            .managers
            .borrow_mut()
            .drain(..)
            .map(|(_, manager)| manager)
            .collect();
        for manager in &managers {
            manager.dispose(false);
        }
        self.parser.clear_cache();
        debug!(disposed = managers.len(), "runtime disposed");
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeOptions::default())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("options", &self.options)
            .field("managers", &self.managers.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}
