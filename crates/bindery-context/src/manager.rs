//! Per-control observation of a context graph.
//!
//! A [`ContextManager`] watches identifier paths under one root context. For
//! every observed path it intercepts each segment on the node that currently
//! holds it, so replacing any ancestor is noticed too. Interception is
//! reference counted per prefix inside the manager and per `(node, key,
//! owner)` on the node itself, which keeps managers that share sub-objects
//! independent of each other.

use bindery_expression::{ArrayChange, ArrayRef, MutationHook, ObjectRef, PropertyHook, Value};
use bindery_util::{is_descendant, is_index, join_identifier, normalize_identifier, split_identifier};
use indexmap::{IndexMap, IndexSet};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

/// Receives `(new, old)` for an observed identifier.
pub type ChangeCallback = Rc<dyn Fn(&Value, &Value)>;

/// Receives the details of a mutating array call.
pub type ArrayCallback = Rc<dyn Fn(&ArrayChange)>;

/// A property listener and the observer it belongs to.
#[derive(Clone)]
pub struct Listener {
    pub uid: String,
    pub callback: ChangeCallback,
}

impl Listener {
    pub fn new<F>(uid: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Value, &Value) + 'static,
    {
        Listener {
            uid: uid.into(),
            callback: Rc::new(callback),
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("uid", &self.uid).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerKind {
    Property,
    Array,
}

/// Detaches one listener. Removing twice is a no-op, and a removed listener
/// never fires again, even for a notification already in flight.
#[must_use]
pub struct RemoveListener {
    manager: WeakContextManager,
    kind: ListenerKind,
    identifier: String,
    id: u64,
    active: Rc<Cell<bool>>,
}

impl RemoveListener {
    pub fn remove(&self) {
        if !self.active.replace(false) {
            return;
        }
        if let Some(manager) = self.manager.upgrade() {
            manager.detach(self.kind, &self.identifier, self.id);
        }
    }

    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// The normalized identifier the listener watches.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl fmt::Debug for RemoveListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoveListener")
            .field("kind", &self.kind)
            .field("identifier", &self.identifier)
            .field("active", &self.active.get())
            .finish()
    }
}

#[derive(Clone)]
struct Entry<C> {
    id: u64,
    uid: String,
    callback: C,
    active: Rc<Cell<bool>>,
}

/// A node that can carry interceptors.
#[derive(Clone)]
enum Container {
    Object(ObjectRef),
    Array(ArrayRef),
}

impl Container {
    fn of(value: &Value) -> Option<Container> {
        match value {
            Value::Object(o) => Some(Container::Object(o.clone())),
            Value::Array(a) => Some(Container::Array(a.clone())),
            _ => None,
        }
    }

    fn id(&self) -> usize {
        match self {
            Container::Object(o) => o.id(),
            Container::Array(a) => a.id(),
        }
    }

    fn intercept(&self, key: &str, owner: u64, hook: PropertyHook) -> bool {
        match self {
            Container::Object(o) => o.intercept(key, owner, hook),
            Container::Array(a) => a.intercept(key, owner, hook),
        }
    }

    fn release(&self, key: &str, owner: u64) -> bool {
        match self {
            Container::Object(o) => o.release(key, owner),
            Container::Array(a) => a.release(key, owner),
        }
    }

    fn release_owner(&self, owner: u64) {
        match self {
            Container::Object(o) => o.release_owner(owner),
            Container::Array(a) => a.release_owner(owner),
        }
    }
}

struct Target {
    container: Container,
    key: String,
}

/// Interception of one path prefix: how many observed identifiers need it
/// and where it is currently installed.
#[derive(Default)]
struct Binding {
    refs: usize,
    target: Option<Target>,
}

#[derive(Default)]
struct State {
    root: Value,
    listeners: IndexMap<String, Vec<Entry<ChangeCallback>>>,
    array_listeners: IndexMap<String, Vec<Entry<ArrayCallback>>>,
    bindings: HashMap<String, Binding>,
    /// `(node id, key)` → prefixes intercepted there.
    bound: HashMap<(usize, String), IndexSet<String>>,
    /// Identifier → array instance carrying this manager's mutation hook.
    arrays: HashMap<String, ArrayRef>,
}

struct Inner {
    uid: String,
    owner: u64,
    max_depth: usize,
    depth: Cell<usize>,
    next_id: Cell<u64>,
    state: RefCell<State>,
}

/// Observation registry of one control. Clones share the same manager.
#[derive(Clone)]
pub struct ContextManager {
    inner: Rc<Inner>,
}

/// Non-owning handle to a [`ContextManager`].
#[derive(Clone)]
pub struct WeakContextManager(Weak<Inner>);

impl WeakContextManager {
    pub fn upgrade(&self) -> Option<ContextManager> {
        self.0.upgrade().map(|inner| ContextManager { inner })
    }
}

struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

fn prefixes(identifier: &str) -> Vec<String> {
    let segments = split_identifier(identifier);
    (1..=segments.len())
        .map(|n| join_identifier(&segments[..n]))
        .collect()
}

/// Whether `identifier` lies under `scope`; everything lies under the root.
fn below(identifier: &str, scope: Option<&str>) -> bool {
    scope.map_or(true, |scope| is_descendant(identifier, scope))
}

/// Own properties only: array methods are not part of the graph.
fn own_property(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(o) => o.get(key),
        Value::Array(a) => a.get_key(key),
        _ => Value::Undefined,
    }
}

impl ContextManager {
    pub(crate) fn new(uid: &str, owner: u64, context: Value, max_depth: usize) -> Self {
        debug!(uid, owner, "context manager created");
        ContextManager {
            inner: Rc::new(Inner {
                uid: uid.to_string(),
                owner,
                max_depth,
                depth: Cell::new(0),
                next_id: Cell::new(0),
                state: RefCell::new(State {
                    root: context,
                    ..State::default()
                }),
            }),
        }
    }

    /// Uid of the owning control.
    pub fn uid(&self) -> &str {
        &self.inner.uid
    }

    /// Owner id stamped on every interceptor this manager installs.
    pub fn owner(&self) -> u64 {
        self.inner.owner
    }

    pub fn downgrade(&self) -> WeakContextManager {
        WeakContextManager(Rc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &ContextManager) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The root context.
    pub fn root(&self) -> Value {
        self.inner.state.borrow().root.clone()
    }

    /// Resolves a split path from the root. Missing intermediates yield
    /// `Undefined`.
    pub fn get_context<S: AsRef<str>>(&self, segments: &[S]) -> Value {
        self.root().get_path(segments)
    }

    /// Number of live property listeners on `identifier`.
    pub fn listener_count(&self, identifier: &str) -> usize {
        let identifier = normalize_identifier(identifier);
        self.inner
            .state
            .borrow()
            .listeners
            .get(&identifier)
            .map_or(0, Vec::len)
    }

    /// Number of live array listeners on `identifier`.
    pub fn array_listener_count(&self, identifier: &str) -> usize {
        let identifier = normalize_identifier(identifier);
        self.inner
            .state
            .borrow()
            .array_listeners
            .get(&identifier)
            .map_or(0, Vec::len)
    }

    /// Watches `identifier`. The listener fires with `(new, old)` whenever
    /// the resolved value changes, whether the last segment was written or
    /// an ancestor was replaced.
    ///
    /// Paths that do not resolve yet are accepted; they start notifying once
    /// an ancestor write makes them resolvable.
    pub fn observe(&self, identifier: &str, listener: Listener) -> RemoveListener {
        let identifier = normalize_identifier(identifier);
        let id = self.next_id();
        let active = Rc::new(Cell::new(true));
        {
            let mut state = self.inner.state.borrow_mut();
            let state = &mut *state;
            let entries = state.listeners.entry(identifier.clone()).or_default();
            let first = entries.is_empty();
            entries.push(Entry {
                id,
                uid: listener.uid,
                callback: listener.callback,
                active: Rc::clone(&active),
            });
            if first {
                self.acquire(state, &identifier);
            }
        }
        trace!(uid = %self.inner.uid, identifier = %identifier, "observing");
        RemoveListener {
            manager: self.downgrade(),
            kind: ListenerKind::Property,
            identifier,
            id,
            active,
        }
    }

    /// Watches mutating calls on the array at `identifier`.
    ///
    /// The hook lives on the `array` instance. When `old_array` is a
    /// different instance, this manager's hook for `identifier` is taken off
    /// it. Replacing the array through a write to the path or to any ancestor
    /// moves the hook to the new instance.
    pub fn observe_array<F>(
        &self,
        uid: &str,
        listener: F,
        identifier: &str,
        array: &Value,
        old_array: &Value,
    ) -> RemoveListener
    where
        F: Fn(&ArrayChange) + 'static,
    {
        let identifier = normalize_identifier(identifier);
        let owner = self.inner.owner;
        let id = self.next_id();
        let active = Rc::new(Cell::new(true));
        {
            let mut state = self.inner.state.borrow_mut();
            let state = &mut *state;
            let same = |a: &ArrayRef| array.as_array().is_some_and(|b| a.ptr_eq(b));

            if let Value::Array(old) = old_array {
                if !same(old) {
                    old.unobserve_mutations(owner, &identifier);
                }
            }
            if let Some(installed) = state.arrays.get(&identifier) {
                if !same(installed) {
                    installed.unobserve_mutations(owner, &identifier);
                    state.arrays.remove(&identifier);
                }
            }
            if let Value::Array(new) = array {
                new.observe_mutations(owner, &identifier, self.mutation_hook(&identifier));
                state.arrays.insert(identifier.clone(), new.clone());
            }

            let entries = state.array_listeners.entry(identifier.clone()).or_default();
            let first = entries.is_empty();
            entries.push(Entry {
                id,
                uid: uid.to_string(),
                callback: Rc::new(listener),
                active: Rc::clone(&active),
            });
            if first {
                self.acquire(state, &identifier);
            }
        }
        trace!(uid = %self.inner.uid, identifier = %identifier, "observing array");
        RemoveListener {
            manager: self.downgrade(),
            kind: ListenerKind::Array,
            identifier,
            id,
            active,
        }
    }

    /// Swaps the root context. Every observed path is re-resolved on the new
    /// root; listeners whose value changed fire, with `Undefined` as the new
    /// value for paths that no longer resolve.
    pub fn set_context(&self, context: Value) {
        let old_root = std::mem::replace(&mut self.inner.state.borrow_mut().root, context);
        debug!(uid = %self.inner.uid, "context replaced");
        let Some(_depth) = self.enter("") else {
            return;
        };
        self.propagate(None, &old_root);
    }

    /// Makes sure every segment of `identifier` exists, creating arrays for
    /// segments followed by an index and objects otherwise. Returns the value
    /// at the full path, or `Undefined` if a primitive is in the way.
    pub fn create_context(&self, identifier: &str) -> Value {
        let segments = split_identifier(identifier);
        let mut current = self.root();
        if !current.is_container() {
            debug!(uid = %self.inner.uid, identifier, "no container root to create context in");
            return Value::Undefined;
        }
        for (i, segment) in segments.iter().enumerate() {
            let existing = own_property(&current, segment);
            if !existing.is_nullish() {
                current = existing;
                continue;
            }
            let fresh = match segments.get(i + 1) {
                Some(next) if is_index(next) => Value::array(Vec::new()),
                _ => Value::object(),
            };
            match &current {
                Value::Object(o) => o.set(segment, fresh.clone()),
                Value::Array(a) => match segment.parse::<usize>() {
                    Ok(index) if is_index(segment) => a.set(index, fresh.clone()),
                    _ => return Value::Undefined,
                },
                _ => return Value::Undefined,
            }
            current = fresh;
        }
        current
    }

    /// Drops every listener registered by observer `uid`.
    pub fn remove_observer(&self, uid: &str) {
        let (properties, arrays) = {
            let state = self.inner.state.borrow();
            let mut properties = Vec::new();
            for (identifier, entries) in &state.listeners {
                for entry in entries.iter().filter(|e| e.uid == uid) {
                    entry.active.set(false);
                    properties.push((identifier.clone(), entry.id));
                }
            }
            let mut arrays = Vec::new();
            for (identifier, entries) in &state.array_listeners {
                for entry in entries.iter().filter(|e| e.uid == uid) {
                    entry.active.set(false);
                    arrays.push((identifier.clone(), entry.id));
                }
            }
            (properties, arrays)
        };
        for (identifier, id) in properties {
            self.detach(ListenerKind::Property, &identifier, id);
        }
        for (identifier, id) in arrays {
            self.detach(ListenerKind::Array, &identifier, id);
        }
    }

    /// Releases every interceptor and mutation hook this manager installed
    /// and forgets all listeners. Unless `persist_context` is set, the root
    /// context is dropped as well.
    pub fn dispose(&self, persist_context: bool) {
        let owner = self.inner.owner;
        let mut state = self.inner.state.borrow_mut();
        for entry in state.listeners.values().flatten() {
            entry.active.set(false);
        }
        for entry in state.array_listeners.values().flatten() {
            entry.active.set(false);
        }
        for binding in state.bindings.values() {
            if let Some(target) = &binding.target {
                target.container.release_owner(owner);
            }
        }
        for array in state.arrays.values() {
            array.release_owner(owner);
        }
        state.listeners.clear();
        state.array_listeners.clear();
        state.bindings.clear();
        state.bound.clear();
        state.arrays.clear();
        if !persist_context {
            state.root = Value::Undefined;
        }
        debug!(uid = %self.inner.uid, persist_context, "context manager disposed");
    }

    // ---------------------------------------------------------------- bookkeeping

    fn next_id(&self) -> u64 {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        id
    }

    fn detach(&self, kind: ListenerKind, identifier: &str, id: u64) {
        let mut state = self.inner.state.borrow_mut();
        let state = &mut *state;
        let emptied = match kind {
            ListenerKind::Property => remove_entry(&mut state.listeners, identifier, id),
            ListenerKind::Array => remove_entry(&mut state.array_listeners, identifier, id),
        };
        if !emptied {
            return;
        }
        if kind == ListenerKind::Array {
            if let Some(array) = state.arrays.remove(identifier) {
                array.unobserve_mutations(self.inner.owner, identifier);
            }
        }
        self.release(state, identifier);
        trace!(uid = %self.inner.uid, identifier, ?kind, "last listener removed");
    }

    /// Takes a reference on every prefix of `identifier`, intercepting the
    /// prefixes that were not needed before.
    fn acquire(&self, state: &mut State, identifier: &str) {
        for prefix in prefixes(identifier) {
            let binding = state.bindings.entry(prefix.clone()).or_default();
            binding.refs += 1;
            if binding.refs == 1 {
                self.bind(state, &prefix);
            }
        }
    }

    fn release(&self, state: &mut State, identifier: &str) {
        for prefix in prefixes(identifier).into_iter().rev() {
            let Some(binding) = state.bindings.get_mut(&prefix) else {
                continue;
            };
            binding.refs = binding.refs.saturating_sub(1);
            if binding.refs == 0 {
                self.unbind(state, &prefix);
                state.bindings.remove(&prefix);
            }
        }
    }

    /// Intercepts the last segment of `prefix` on the node currently holding
    /// it. A prefix whose parent is not a container stays unbound.
    fn bind(&self, state: &mut State, prefix: &str) {
        let segments = split_identifier(prefix);
        let Some((key, parent_path)) = segments.split_last() else {
            return;
        };
        let parent = state.root.get_path(parent_path);
        let Some(container) = Container::of(&parent) else {
            return;
        };
        let node_id = container.id();
        let installed = container.intercept(key, self.inner.owner, self.property_hook(node_id, key));
        trace!(uid = %self.inner.uid, identifier = prefix, installed, "intercepted");
        state
            .bound
            .entry((node_id, key.clone()))
            .or_default()
            .insert(prefix.to_string());
        if let Some(binding) = state.bindings.get_mut(prefix) {
            binding.target = Some(Target {
                container,
                key: key.clone(),
            });
        }
    }

    fn unbind(&self, state: &mut State, prefix: &str) {
        let Some(target) = state
            .bindings
            .get_mut(prefix)
            .and_then(|binding| binding.target.take())
        else {
            return;
        };
        let removed = target.container.release(&target.key, self.inner.owner);
        trace!(uid = %self.inner.uid, identifier = prefix, removed, "released");
        let slot = (target.container.id(), target.key);
        if let Some(prefixes) = state.bound.get_mut(&slot) {
            prefixes.shift_remove(prefix);
            if prefixes.is_empty() {
                state.bound.remove(&slot);
            }
        }
    }

    /// Moves the interception of `prefix` when its parent node changed.
    fn rebind(&self, state: &mut State, prefix: &str) {
        let segments = split_identifier(prefix);
        let Some((_, parent_path)) = segments.split_last() else {
            return;
        };
        let parent = state.root.get_path(parent_path);
        let current = state
            .bindings
            .get(prefix)
            .and_then(|binding| binding.target.as_ref())
            .map(|target| target.container.id());
        if current.is_some() && current == parent.node_id() {
            return;
        }
        self.unbind(state, prefix);
        self.bind(state, prefix);
    }

    /// Puts this manager's mutation hooks on the arrays currently found at
    /// observed array identifiers under `scope` (the scope itself included).
    fn migrate_arrays(&self, state: &mut State, scope: Option<&str>) {
        let owner = self.inner.owner;
        let identifiers: Vec<String> = state
            .array_listeners
            .keys()
            .filter(|id| scope == Some(id.as_str()) || below(id, scope))
            .cloned()
            .collect();
        for identifier in identifiers {
            let current = state.root.get_path(&split_identifier(&identifier));
            let installed = state.arrays.get(&identifier).cloned();
            if let (Some(old), Value::Array(new)) = (&installed, &current) {
                if old.ptr_eq(new) {
                    continue;
                }
            }
            if let Some(old) = installed {
                old.unobserve_mutations(owner, &identifier);
                state.arrays.remove(&identifier);
            }
            if let Value::Array(new) = current {
                new.observe_mutations(owner, &identifier, self.mutation_hook(&identifier));
                state.arrays.insert(identifier.clone(), new);
            }
            trace!(uid = %self.inner.uid, identifier = %identifier, "array hook migrated");
        }
    }

    // ---------------------------------------------------------------- notification

    fn property_hook(&self, node_id: usize, key: &str) -> PropertyHook {
        let manager = self.downgrade();
        let key = key.to_string();
        Rc::new(move |new: &Value, old: &Value| {
            if let Some(manager) = manager.upgrade() {
                manager.property_changed(node_id, &key, new, old);
            }
        })
    }

    fn mutation_hook(&self, identifier: &str) -> MutationHook {
        let manager = self.downgrade();
        let identifier = identifier.to_string();
        Rc::new(move |change: &ArrayChange| {
            if let Some(manager) = manager.upgrade() {
                manager.array_mutated(&identifier, change);
            }
        })
    }

    fn enter(&self, identifier: &str) -> Option<DepthGuard<'_>> {
        let depth = self.inner.depth.get();
        if depth >= self.inner.max_depth {
            warn!(
                uid = %self.inner.uid,
                identifier,
                depth,
                "notification depth limit reached, change not propagated"
            );
            return None;
        }
        self.inner.depth.set(depth + 1);
        Some(DepthGuard(&self.inner.depth))
    }

    fn property_changed(&self, node_id: usize, key: &str, new: &Value, old: &Value) {
        let prefixes: Vec<String> = self
            .inner
            .state
            .borrow()
            .bound
            .get(&(node_id, key.to_string()))
            .map(|prefixes| prefixes.iter().cloned().collect())
            .unwrap_or_default();
        for prefix in prefixes {
            let Some(_depth) = self.enter(&prefix) else {
                return;
            };
            trace!(uid = %self.inner.uid, identifier = %prefix, "changed");
            self.fire(&prefix, new, old);
            self.propagate(Some(&prefix), old);
        }
    }

    fn array_mutated(&self, identifier: &str, change: &ArrayChange) {
        let Some(_depth) = self.enter(identifier) else {
            return;
        };
        let entries = self
            .inner
            .state
            .borrow()
            .array_listeners
            .get(identifier)
            .cloned()
            .unwrap_or_default();
        trace!(uid = %self.inner.uid, identifier, method = %change.method, "array mutated");
        for entry in entries {
            if entry.active.get() {
                (entry.callback)(change);
            }
        }
    }

    /// Calls the listeners of one identifier in registration order.
    fn fire(&self, identifier: &str, new: &Value, old: &Value) {
        let entries = self
            .inner
            .state
            .borrow()
            .listeners
            .get(identifier)
            .cloned()
            .unwrap_or_default();
        for entry in entries {
            if entry.active.get() {
                (entry.callback)(new, old);
            }
        }
    }

    /// After the value at `scope` (or the root, for `None`) was replaced:
    /// moves interception below it onto the new sub-graph, then notifies
    /// listeners below it whose resolved value changed. `old_base` is the
    /// replaced value.
    fn propagate(&self, scope: Option<&str>, old_base: &Value) {
        let depth = scope.map_or(0, |scope| split_identifier(scope).len());
        let pending: Vec<(String, Value)> = {
            let mut state = self.inner.state.borrow_mut();
            let state = &mut *state;
            let mut stale: Vec<String> = state
                .bindings
                .keys()
                .filter(|prefix| below(prefix, scope))
                .cloned()
                .collect();
            stale.sort_by_key(|prefix| split_identifier(prefix).len());
            for prefix in &stale {
                self.rebind(state, prefix);
            }
            self.migrate_arrays(state, scope);
            state
                .listeners
                .keys()
                .filter(|identifier| below(identifier, scope))
                .map(|identifier| {
                    let relative = &split_identifier(identifier)[depth..];
                    (identifier.clone(), old_base.get_path(relative))
                })
                .collect()
        };
        for (identifier, old_value) in pending {
            let new_value = self.get_context(&split_identifier(&identifier));
            if !new_value.strict_equals(&old_value) {
                self.fire(&identifier, &new_value, &old_value);
            }
        }
    }
}

/// Removes one entry; returns `true` when that emptied the identifier.
fn remove_entry<C>(map: &mut IndexMap<String, Vec<Entry<C>>>, identifier: &str, id: u64) -> bool {
    let Some(entries) = map.get_mut(identifier) else {
        return false;
    };
    let before = entries.len();
    entries.retain(|entry| entry.id != id);
    if entries.len() == before || !entries.is_empty() {
        return false;
    }
    map.shift_remove(identifier);
    true
}

impl fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("ContextManager")
            .field("uid", &self.inner.uid)
            .field("owner", &self.inner.owner)
            .field("listeners", &state.listeners.keys().collect::<Vec<_>>())
            .field("arrays", &state.array_listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}
