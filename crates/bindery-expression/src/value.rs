//! The dynamic value graph that expressions evaluate against.
//!
//! Objects and arrays are shared, identity-bearing nodes: cloning a [`Value`]
//! that holds one clones the handle, not the contents. Every write goes
//! through the node API, which is where property interception happens. A node
//! keeps, per property key, one interceptor entry per owner; the entry is
//! reference counted so that several observed paths can share it.

use crate::builtins;
use crate::error::EvalError;
use crate::util;
use indexmap::IndexMap;
use serde_json::Value as Json;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Called after an intercepted property changed, with `(new, old)`.
pub type PropertyHook = Rc<dyn Fn(&Value, &Value)>;

/// Called after a mutating array method ran on an observed instance.
pub type MutationHook = Rc<dyn Fn(&ArrayChange)>;

/// Signature of native functions: `(this, arguments)`.
pub type NativeFn = dyn Fn(&Value, &[Value]) -> Result<Value, EvalError>;

/// Any value reachable from a binding context.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(FunctionRef),
}

impl Value {
    /// A fresh empty object.
    pub fn object() -> Value {
        Value::Object(ObjectRef::new())
    }

    /// A fresh array holding `items`.
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(ArrayRef::new(items))
    }

    pub fn string(s: impl AsRef<str>) -> Value {
        Value::String(Rc::from(s.as_ref()))
    }

    /// Wraps a native closure as a callable value.
    pub fn function<F>(f: F) -> Value
    where
        F: Fn(&Value, &[Value]) -> Result<Value, EvalError> + 'static,
    {
        Value::Function(FunctionRef::new(f))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// `null` or `undefined`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Objects and arrays: values that have properties of their own.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Object(_) | Value::Array(_) | Value::Function(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionRef> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Reads a property. Never fails: anything that has no such property
    /// yields `Undefined`.
    ///
    /// Strings and arrays expose `length`, their indices and a small set of
    /// built-in methods.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(o) => o.get(key),
            Value::Array(a) => {
                let own = a.get_key(key);
                if own.is_undefined() {
                    builtins::array_method(key).unwrap_or_default()
                } else {
                    own
                }
            }
            Value::String(s) => {
                if key == "length" {
                    return Value::Number(s.chars().count() as f64);
                }
                if let Some(i) = parse_index(key) {
                    return s
                        .chars()
                        .nth(i)
                        .map(|c| Value::string(c.to_string()))
                        .unwrap_or_default();
                }
                builtins::string_method(key).unwrap_or_default()
            }
            _ => Value::Undefined,
        }
    }

    /// Resolves a path of property keys, yielding `Undefined` as soon as a
    /// segment is missing.
    pub fn get_path<S: AsRef<str>>(&self, segments: &[S]) -> Value {
        let mut current = self.clone();
        for segment in segments {
            if current.is_nullish() {
                return Value::Undefined;
            }
            current = current.get(segment.as_ref());
        }
        current
    }

    /// Identity of the underlying node for objects, arrays and functions.
    pub fn node_id(&self) -> Option<usize> {
        match self {
            Value::Object(o) => Some(o.id()),
            Value::Array(a) => Some(a.id()),
            Value::Function(f) => Some(f.id()),
            _ => None,
        }
    }

    /// `===`.
    pub fn strict_equals(&self, other: &Value) -> bool {
        util::strict_equals(self, other)
    }

    /// Deep copy into a JSON document, as `JSON.stringify` would see it.
    pub fn to_json(&self) -> Json {
        self.to_json_at(0)
    }

    fn to_json_at(&self, depth: usize) -> Json {
        if depth > MAX_JSON_DEPTH {
            return Json::Null;
        }
        match self {
            Value::Undefined | Value::Null | Value::Function(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => {
                Json::from(*n as i64)
            }
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.to_string()),
            Value::Array(a) => Json::Array(
                a.to_vec()
                    .iter()
                    .map(|item| item.to_json_at(depth + 1))
                    .collect(),
            ),
            Value::Object(o) => {
                let mut map = serde_json::Map::new();
                for (key, value) in o.entries() {
                    if matches!(value, Value::Undefined | Value::Function(_)) {
                        continue;
                    }
                    map.insert(key, value.to_json_at(depth + 1));
                }
                Json::Object(map)
            }
        }
    }
}

const MAX_JSON_DEPTH: usize = 128;

/// Largest integer an f64 holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Parses a canonical array index.
pub(crate) fn parse_index(key: &str) -> Option<usize> {
    if bindery_util::is_index(key) {
        key.parse().ok()
    } else {
        None
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        util::strict_equals(self, other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&util::format_number(*n)),
            Value::String(s) => f.write_str(&bindery_util::as_string(s)),
            Value::Array(_) | Value::Object(_) => write!(f, "{}", self.to_json()),
            Value::Function(_) => f.write_str("function"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&util::to_js_string(self))
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(Rc::from(s)),
            Json::Array(items) => Value::array(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => {
                let object = ObjectRef::new();
                {
                    let mut props = object.0.props.borrow_mut();
                    for (key, value) in map {
                        props.insert(key, Value::from(value));
                    }
                }
                Value::Object(object)
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

impl From<ArrayRef> for Value {
    fn from(a: ArrayRef) -> Self {
        Value::Array(a)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

// ------------------------------------------------------------------ Interception

struct Interceptor {
    owner: u64,
    refs: usize,
    hook: PropertyHook,
}

/// Per-key interceptor table of one node.
#[derive(Default)]
struct Slots {
    entries: RefCell<BTreeMap<String, Vec<Interceptor>>>,
}

impl Slots {
    fn intercept(&self, key: &str, owner: u64, hook: PropertyHook) -> bool {
        let mut entries = self.entries.borrow_mut();
        let slot = entries.entry(key.to_string()).or_default();
        if let Some(existing) = slot.iter_mut().find(|i| i.owner == owner) {
            existing.refs += 1;
            return false;
        }
        slot.push(Interceptor {
            owner,
            refs: 1,
            hook,
        });
        true
    }

    fn release(&self, key: &str, owner: u64) -> bool {
        let mut entries = self.entries.borrow_mut();
        let Some(slot) = entries.get_mut(key) else {
            return false;
        };
        let Some(pos) = slot.iter().position(|i| i.owner == owner) else {
            return false;
        };
        slot[pos].refs -= 1;
        if slot[pos].refs > 0 {
            return false;
        }
        slot.remove(pos);
        if slot.is_empty() {
            entries.remove(key);
        }
        true
    }

    fn release_owner(&self, owner: u64) {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|_, slot| {
            slot.retain(|i| i.owner != owner);
            !slot.is_empty()
        });
    }

    fn is_intercepted(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    fn interceptor_refs(&self, key: &str, owner: u64) -> usize {
        self.entries
            .borrow()
            .get(key)
            .and_then(|slot| slot.iter().find(|i| i.owner == owner))
            .map(|i| i.refs)
            .unwrap_or(0)
    }

    fn hooks(&self, key: &str) -> Vec<PropertyHook> {
        self.entries
            .borrow()
            .get(key)
            .map(|slot| slot.iter().map(|i| Rc::clone(&i.hook)).collect())
            .unwrap_or_default()
    }

    fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

fn fire(hooks: Vec<PropertyHook>, new_value: &Value, old_value: &Value) {
    for hook in hooks {
        hook(new_value, old_value);
    }
}

// ------------------------------------------------------------------ Objects

struct ObjectNode {
    props: RefCell<IndexMap<String, Value>>,
    slots: Slots,
}

/// Shared handle to an object node. Clones refer to the same object.
#[derive(Clone)]
pub struct ObjectRef(Rc<ObjectNode>);

impl ObjectRef {
    pub fn new() -> Self {
        ObjectRef(Rc::new(ObjectNode {
            props: RefCell::new(IndexMap::new()),
            slots: Slots::default(),
        }))
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn get(&self, key: &str) -> Value {
        self.0.props.borrow().get(key).cloned().unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.props.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.props.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.props.borrow().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.props.borrow().keys().cloned().collect()
    }

    /// Snapshot of the own properties in insertion order.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0
            .props
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Writes a property and notifies its interceptors when the value changed.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let old = self
            .0
            .props
            .borrow_mut()
            .insert(key.to_string(), value.clone())
            .unwrap_or_default();
        if old.strict_equals(&value) {
            return;
        }
        fire(self.0.slots.hooks(key), &value, &old);
    }

    /// Deletes a property; interceptors see the value become `undefined`.
    pub fn remove(&self, key: &str) -> Value {
        let old = self.0.props.borrow_mut().shift_remove(key).unwrap_or_default();
        if !old.is_undefined() {
            fire(self.0.slots.hooks(key), &Value::Undefined, &old);
        }
        old
    }

    /// Installs `owner`'s interceptor on `key`, or adds a reference to the
    /// one it already has. Returns `true` when a hook was installed.
    pub fn intercept(&self, key: &str, owner: u64, hook: PropertyHook) -> bool {
        self.0.slots.intercept(key, owner, hook)
    }

    /// Drops one reference to `owner`'s interceptor on `key`. Returns `true`
    /// when the interceptor was removed.
    pub fn release(&self, key: &str, owner: u64) -> bool {
        self.0.slots.release(key, owner)
    }

    /// Removes every interceptor `owner` holds on this object.
    pub fn release_owner(&self, owner: u64) {
        self.0.slots.release_owner(owner)
    }

    /// Whether any owner intercepts `key`.
    pub fn is_intercepted(&self, key: &str) -> bool {
        self.0.slots.is_intercepted(key)
    }

    /// Number of references `owner` holds on `key`.
    pub fn interceptor_refs(&self, key: &str, owner: u64) -> usize {
        self.0.slots.interceptor_refs(key, owner)
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        ObjectRef::new()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:#x})", self.id())
    }
}

// ------------------------------------------------------------------ Arrays

/// The mutating array methods that observation reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayMethod {
    Push,
    Pop,
    Shift,
    Unshift,
    Splice,
    Sort,
    Reverse,
}

impl ArrayMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ArrayMethod::Push => "push",
            ArrayMethod::Pop => "pop",
            ArrayMethod::Shift => "shift",
            ArrayMethod::Unshift => "unshift",
            ArrayMethod::Splice => "splice",
            ArrayMethod::Sort => "sort",
            ArrayMethod::Reverse => "reverse",
        }
    }
}

impl fmt::Display for ArrayMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a mutation hook receives.
#[derive(Debug, Clone)]
pub struct ArrayChange {
    pub method: ArrayMethod,
    pub arguments: Vec<Value>,
    pub return_value: Value,
    /// Contents before the call.
    pub old_array: Vec<Value>,
    /// The mutated instance itself.
    pub new_array: ArrayRef,
}

struct MutationInterceptor {
    owner: u64,
    tag: String,
    hook: MutationHook,
}

struct ArrayNode {
    items: RefCell<Vec<Value>>,
    slots: Slots,
    mutation_hooks: RefCell<Vec<MutationInterceptor>>,
}

/// Shared handle to an array node. Clones refer to the same array.
#[derive(Clone)]
pub struct ArrayRef(Rc<ArrayNode>);

impl ArrayRef {
    pub fn new(items: Vec<Value>) -> Self {
        ArrayRef(Rc::new(ArrayNode {
            items: RefCell::new(items),
            slots: Slots::default(),
            mutation_hooks: RefCell::new(Vec::new()),
        }))
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.items.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Value {
        self.0.items.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Reads an own key: an index or `length`.
    pub fn get_key(&self, key: &str) -> Value {
        if key == "length" {
            return Value::Number(self.len() as f64);
        }
        parse_index(key).map(|i| self.get(i)).unwrap_or_default()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    /// Writes an element, growing the array with `undefined` holes if needed.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let value = value.into();
        let (old, old_len) = {
            let mut items = self.0.items.borrow_mut();
            let old_len = items.len();
            if index >= items.len() {
                items.resize(index + 1, Value::Undefined);
            }
            let old = std::mem::replace(&mut items[index], value.clone());
            (old, old_len)
        };
        if !old.strict_equals(&value) {
            fire(self.0.slots.hooks(&index.to_string()), &value, &old);
        }
        let new_len = self.len();
        if new_len != old_len {
            fire(
                self.0.slots.hooks("length"),
                &Value::from(new_len),
                &Value::from(old_len),
            );
        }
    }

    pub fn push(&self, values: Vec<Value>) -> usize {
        let arguments = values.clone();
        self.mutate(
            ArrayMethod::Push,
            arguments,
            |items| {
                items.extend(values);
                items.len()
            },
            |len| Value::from(*len),
        )
    }

    pub fn pop(&self) -> Value {
        self.mutate(
            ArrayMethod::Pop,
            Vec::new(),
            |items| items.pop().unwrap_or_default(),
            Value::clone,
        )
    }

    pub fn shift(&self) -> Value {
        self.mutate(
            ArrayMethod::Shift,
            Vec::new(),
            |items| {
                if items.is_empty() {
                    Value::Undefined
                } else {
                    items.remove(0)
                }
            },
            Value::clone,
        )
    }

    pub fn unshift(&self, values: Vec<Value>) -> usize {
        let arguments = values.clone();
        self.mutate(
            ArrayMethod::Unshift,
            arguments,
            |items| {
                items.splice(0..0, values);
                items.len()
            },
            |len| Value::from(*len),
        )
    }

    /// `Array.prototype.splice`: negative `start` counts from the end, a
    /// missing `delete_count` removes everything from `start`.
    pub fn splice(&self, start: i64, delete_count: Option<i64>, insert: Vec<Value>) -> Vec<Value> {
        let mut arguments = vec![Value::from(start)];
        if let Some(count) = delete_count {
            arguments.push(Value::from(count));
        }
        arguments.extend(insert.iter().cloned());
        self.mutate(
            ArrayMethod::Splice,
            arguments,
            |items| {
                let len = items.len() as i64;
                let from = if start < 0 {
                    (len + start).max(0)
                } else {
                    start.min(len)
                } as usize;
                let count = match delete_count {
                    None => items.len() - from,
                    Some(c) => c.clamp(0, len - from as i64) as usize,
                };
                items.splice(from..from + count, insert).collect::<Vec<_>>()
            },
            |removed| Value::array(removed.clone()),
        )
    }

    /// Stable sort. Without a comparator, elements compare by their string
    /// form and `undefined` sorts last.
    pub fn sort(&self, compare: Option<&mut dyn FnMut(&Value, &Value) -> Ordering>) {
        self.mutate(
            ArrayMethod::Sort,
            Vec::new(),
            |items| match compare {
                Some(cmp) => items.sort_by(|a, b| match (a.is_undefined(), b.is_undefined()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => cmp(a, b),
                }),
                None => items.sort_by(util::default_sort_order),
            },
            |_| Value::Undefined,
        );
    }

    pub fn reverse(&self) {
        self.mutate(ArrayMethod::Reverse, Vec::new(), |items| items.reverse(), |_| {
            Value::Undefined
        });
    }

    fn mutate<R>(
        &self,
        method: ArrayMethod,
        arguments: Vec<Value>,
        apply: impl FnOnce(&mut Vec<Value>) -> R,
        returned: impl FnOnce(&R) -> Value,
    ) -> R {
        let observed = !self.0.slots.is_empty() || !self.0.mutation_hooks.borrow().is_empty();
        let snapshot = observed.then(|| self.to_vec());

        // The borrow is released while `apply` runs: a sort comparator may
        // call back into the graph.
        let mut items = std::mem::take(&mut *self.0.items.borrow_mut());
        let result = apply(&mut items);
        *self.0.items.borrow_mut() = items;

        if let Some(old_array) = snapshot {
            let change = ArrayChange {
                method,
                arguments,
                return_value: returned(&result),
                old_array,
                new_array: self.clone(),
            };
            self.after_mutation(&change);
        }
        result
    }

    fn after_mutation(&self, change: &ArrayChange) {
        let hooks: Vec<MutationHook> = self
            .0
            .mutation_hooks
            .borrow()
            .iter()
            .map(|m| Rc::clone(&m.hook))
            .collect();
        for hook in hooks {
            hook(change);
        }

        for key in self.0.slots.keys() {
            let old = if key == "length" {
                Value::from(change.old_array.len())
            } else {
                parse_index(&key)
                    .and_then(|i| change.old_array.get(i).cloned())
                    .unwrap_or_default()
            };
            let new = self.get_key(&key);
            if !old.strict_equals(&new) {
                fire(self.0.slots.hooks(&key), &new, &old);
            }
        }
    }

    /// Installs a mutation hook for `(owner, tag)`. Installing the same pair
    /// twice keeps the first hook. Returns `true` when a hook was installed.
    pub fn observe_mutations(&self, owner: u64, tag: &str, hook: MutationHook) -> bool {
        let mut hooks = self.0.mutation_hooks.borrow_mut();
        if hooks.iter().any(|m| m.owner == owner && m.tag == tag) {
            return false;
        }
        hooks.push(MutationInterceptor {
            owner,
            tag: tag.to_string(),
            hook,
        });
        true
    }

    /// Removes the mutation hook of `(owner, tag)`.
    pub fn unobserve_mutations(&self, owner: u64, tag: &str) -> bool {
        let mut hooks = self.0.mutation_hooks.borrow_mut();
        let before = hooks.len();
        hooks.retain(|m| !(m.owner == owner && m.tag == tag));
        hooks.len() != before
    }

    /// Whether any mutation hook is installed on this instance.
    pub fn is_mutation_observed(&self) -> bool {
        !self.0.mutation_hooks.borrow().is_empty()
    }

    pub fn intercept(&self, key: &str, owner: u64, hook: PropertyHook) -> bool {
        self.0.slots.intercept(key, owner, hook)
    }

    pub fn release(&self, key: &str, owner: u64) -> bool {
        self.0.slots.release(key, owner)
    }

    /// Removes every interceptor and mutation hook `owner` holds here.
    pub fn release_owner(&self, owner: u64) {
        self.0.slots.release_owner(owner);
        self.0.mutation_hooks.borrow_mut().retain(|m| m.owner != owner);
    }

    pub fn is_intercepted(&self, key: &str) -> bool {
        self.0.slots.is_intercepted(key)
    }

    pub fn interceptor_refs(&self, key: &str, owner: u64) -> usize {
        self.0.slots.interceptor_refs(key, owner)
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArrayRef({:#x})", self.id())
    }
}

// ------------------------------------------------------------------ Functions

/// Shared handle to a native function.
#[derive(Clone)]
pub struct FunctionRef(Rc<NativeFn>);

impl FunctionRef {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, EvalError> + 'static,
    {
        FunctionRef(Rc::new(f))
    }

    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value, EvalError> {
        (self.0)(this, args)
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &FunctionRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionRef({:#x})", self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<usize>>, PropertyHook) {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        (count, Rc::new(move |_: &Value, _: &Value| c.set(c.get() + 1)))
    }

    #[test]
    fn test_clone_shares_node() {
        let a = Value::from(json!({"x": 1}));
        let b = a.clone();
        b.as_object().unwrap().set("x", 2);
        assert_eq!(a.get("x"), Value::from(2));
        assert_eq!(a, b);
        assert_ne!(a, Value::from(json!({"x": 2})));
    }

    #[test]
    fn test_set_same_value_does_not_fire() {
        let obj = ObjectRef::new();
        obj.set("x", 1);
        let (count, hook) = counter();
        obj.intercept("x", 1, hook);
        obj.set("x", 1);
        assert_eq!(count.get(), 0);
        obj.set("x", 2);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_intercept_is_refcounted_per_owner() {
        let obj = ObjectRef::new();
        let (count, hook) = counter();
        assert!(obj.intercept("x", 7, Rc::clone(&hook)));
        assert!(!obj.intercept("x", 7, hook));
        assert_eq!(obj.interceptor_refs("x", 7), 2);
        obj.set("x", 1);
        assert_eq!(count.get(), 1, "a second reference must not double-wrap");
        assert!(!obj.release("x", 7));
        assert!(obj.is_intercepted("x"));
        assert!(obj.release("x", 7));
        assert!(!obj.is_intercepted("x"));
    }

    #[test]
    fn test_owners_are_independent() {
        let obj = ObjectRef::new();
        let (a, hook_a) = counter();
        let (b, hook_b) = counter();
        obj.intercept("x", 1, hook_a);
        obj.intercept("x", 2, hook_b);
        obj.release_owner(1);
        obj.set("x", 5);
        assert_eq!(a.get(), 0);
        assert_eq!(b.get(), 1);
    }

    #[test]
    fn test_remove_fires_undefined() {
        let obj = ObjectRef::new();
        obj.set("x", 3);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        obj.intercept(
            "x",
            1,
            Rc::new(move |new: &Value, old: &Value| s.borrow_mut().push((new.clone(), old.clone()))),
        );
        assert_eq!(obj.remove("x"), Value::from(3));
        assert_eq!(*seen.borrow(), vec![(Value::Undefined, Value::from(3))]);
        assert!(!obj.contains_key("x"));
    }

    #[test]
    fn test_array_reads() {
        let arr = Value::from(json!([1, 2, 3]));
        assert_eq!(arr.get("length"), Value::from(3));
        assert_eq!(arr.get("1"), Value::from(2));
        assert_eq!(arr.get("7"), Value::Undefined);
        assert!(arr.get("push").is_function());
    }

    #[test]
    fn test_string_reads() {
        let s = Value::from("héllo");
        assert_eq!(s.get("length"), Value::from(5));
        assert_eq!(s.get("1"), Value::from("é"));
        assert_eq!(s.get("nope"), Value::Undefined);
    }

    #[test]
    fn test_get_path_is_defensive() {
        let v = Value::from(json!({"a": {"b": [10, {"c": "x"}]}}));
        assert_eq!(v.get_path(&["a", "b", "1", "c"]), Value::from("x"));
        assert_eq!(v.get_path(&["a", "missing", "c"]), Value::Undefined);
        assert_eq!(v.get_path(&["a", "b", "0", "c"]), Value::Undefined);
    }

    #[test]
    fn test_splice_semantics() {
        let arr = ArrayRef::new((1..=5).map(Value::from).collect());
        let removed = arr.splice(-2, None, vec![]);
        assert_eq!(removed, vec![Value::from(4), Value::from(5)]);
        let removed = arr.splice(1, Some(1), vec![Value::from("a"), Value::from("b")]);
        assert_eq!(removed, vec![Value::from(2)]);
        assert_eq!(
            Value::Array(arr).to_json(),
            json!([1, "a", "b", 3])
        );
    }

    #[test]
    fn test_default_sort_is_lexicographic() {
        let arr = ArrayRef::new(vec![
            Value::from(10),
            Value::Undefined,
            Value::from(9),
            Value::from(1),
        ]);
        arr.sort(None);
        assert_eq!(
            arr.to_vec(),
            vec![Value::from(1), Value::from(10), Value::from(9), Value::Undefined]
        );
    }

    #[test]
    fn test_mutation_hook_payload() {
        let arr = ArrayRef::new(vec![Value::from(1)]);
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        assert!(arr.observe_mutations(
            3,
            "items",
            Rc::new(move |change: &ArrayChange| *s.borrow_mut() = Some(change.clone()))
        ));
        assert!(!arr.observe_mutations(3, "items", Rc::new(|_: &ArrayChange| {})));
        assert_eq!(arr.push(vec![Value::from(5)]), 2);

        let change = seen.borrow_mut().take().unwrap();
        assert_eq!(change.method, ArrayMethod::Push);
        assert_eq!(change.arguments, vec![Value::from(5)]);
        assert_eq!(change.return_value, Value::from(2));
        assert_eq!(change.old_array, vec![Value::from(1)]);
        assert!(change.new_array.ptr_eq(&arr));

        assert!(arr.unobserve_mutations(3, "items"));
        arr.pop();
        assert!(seen.borrow().is_none());
    }

    #[test]
    fn test_mutators_fire_index_and_length_slots() {
        let arr = ArrayRef::new(vec![Value::from("a"), Value::from("b")]);
        let (len_count, len_hook) = counter();
        let (first_count, first_hook) = counter();
        arr.intercept("length", 1, len_hook);
        arr.intercept("0", 1, first_hook);
        arr.reverse();
        assert_eq!(len_count.get(), 0);
        assert_eq!(first_count.get(), 1);
        arr.push(vec![Value::from("c")]);
        assert_eq!(len_count.get(), 1);
        assert_eq!(first_count.get(), 1);
        arr.set(5, "z");
        assert_eq!(len_count.get(), 2);
        assert_eq!(arr.len(), 6);
    }

    #[test]
    fn test_json_roundtrip_drops_functions() {
        let v = Value::from(json!({"a": [1, null, "x"], "b": {"c": true}}));
        v.as_object().unwrap().set("f", Value::function(|_, _| Ok(Value::Null)));
        v.as_object().unwrap().set("u", Value::Undefined);
        assert_eq!(v.to_json(), json!({"a": [1, null, "x"], "b": {"c": true}}));
    }
}
