// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module registry and waiter queue
//!
//! One record per canonical module id, created on first reference and never
//! removed. The record's state encodes the load lifecycle; its waiter list
//! holds the continuations of every caller blocked on the module finishing
//! initialization. The registry itself is not synchronized: the loader owns
//! it behind a single mutex and drains waiters outside that lock.

use std::collections::{HashMap, HashSet};

use crate::resolver::ModuleId;
use crate::value::{ObjectRef, Value};

/// Lifecycle state of a module record.
///
/// An id with no record at all is unrequested. `Initialized` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// A resource load is in flight; exactly one request is outstanding
    Requested,
    /// The factory is registered and initialization has begun, but the
    /// module's own dependencies are not all resolved yet
    FactoryPending,
    /// The factory has run and the export value is fixed
    Initialized,
}

/// Continuation invoked, at most once, when a module initializes
pub(crate) type Waiter = Box<dyn FnOnce() + Send>;

struct ModuleRecord {
    state: ModuleState,
    /// Mutable exports object created when initialization begins; circular
    /// requires observe this before the module commits
    placeholder: Option<ObjectRef>,
    /// Committed export value; write-once, set at `Initialized`
    exports: Option<Value>,
    /// FIFO continuations waiting on `Initialized`
    waiters: Vec<Waiter>,
    /// Dependency ids this record is still waiting on; consulted for
    /// back-edge detection while `FactoryPending`
    pending_deps: Vec<ModuleId>,
}

impl ModuleRecord {
    fn requested() -> Self {
        Self {
            state: ModuleState::Requested,
            placeholder: None,
            exports: None,
            waiters: Vec::new(),
            pending_deps: Vec::new(),
        }
    }
}

/// Map from canonical module id to its record
#[derive(Default)]
pub struct ModuleRegistry {
    records: HashMap<ModuleId, ModuleRecord>,
}

impl ModuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no module has been referenced yet
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current state of an id, or `None` if it was never referenced
    pub fn state_of(&self, id: &ModuleId) -> Option<ModuleState> {
        self.records.get(id).map(|record| record.state)
    }

    /// Committed exports of an initialized module
    pub(crate) fn exports_of(&self, id: &ModuleId) -> Option<Value> {
        let record = self.records.get(id)?;
        match record.state {
            ModuleState::Initialized => record.exports.clone(),
            _ => None,
        }
    }

    /// Best available value for a dependency slot: committed exports once
    /// initialized, the placeholder while the factory is pending
    pub(crate) fn current_exports(&self, id: &ModuleId) -> Value {
        match self.records.get(id) {
            Some(record) => match record.state {
                ModuleState::Initialized => record.exports.clone().unwrap_or(Value::Undefined),
                _ => record
                    .placeholder
                    .clone()
                    .map(Value::Object)
                    .unwrap_or(Value::Undefined),
            },
            None => Value::Undefined,
        }
    }

    /// Create a record in `Requested` state. The caller owns the invariant
    /// that a record does not already exist for this id.
    pub(crate) fn create_requested(&mut self, id: ModuleId) {
        debug_assert!(!self.records.contains_key(&id));
        self.records.insert(id, ModuleRecord::requested());
    }

    /// Transition a record into `FactoryPending` and install its exports
    /// placeholder, creating the record if the id was never requested (a
    /// definition arriving without a fetch, e.g. from a bundle).
    pub(crate) fn begin_initialization(&mut self, id: &ModuleId, placeholder: ObjectRef) {
        let record = self
            .records
            .entry(id.clone())
            .or_insert_with(ModuleRecord::requested);
        record.state = ModuleState::FactoryPending;
        record.placeholder = Some(placeholder);
    }

    /// Commit the export value and return the waiters to invoke, in FIFO
    /// registration order. Safe against re-entrant calls: committing an id
    /// that is already `Initialized` is a no-op yielding no waiters.
    #[must_use]
    pub(crate) fn mark_initialized(&mut self, id: &ModuleId, exports: Value) -> Vec<Waiter> {
        let record = self
            .records
            .entry(id.clone())
            .or_insert_with(ModuleRecord::requested);
        if record.state == ModuleState::Initialized {
            return Vec::new();
        }
        record.state = ModuleState::Initialized;
        record.exports = Some(exports);
        record.pending_deps.clear();
        std::mem::take(&mut record.waiters)
    }

    /// Register a continuation to run when `id` initializes. If the module is
    /// already `Initialized` the waiter is handed back so the caller can
    /// invoke it immediately, outside any lock.
    #[must_use]
    pub(crate) fn add_waiter(&mut self, id: &ModuleId, waiter: Waiter) -> Option<Waiter> {
        let record = self
            .records
            .entry(id.clone())
            .or_insert_with(ModuleRecord::requested);
        if record.state == ModuleState::Initialized {
            return Some(waiter);
        }
        record.waiters.push(waiter);
        None
    }

    /// Record that `from` is waiting on `to` before it can initialize
    pub(crate) fn add_pending_edge(&mut self, from: &ModuleId, to: ModuleId) {
        if let Some(record) = self.records.get_mut(from) {
            record.pending_deps.push(to);
        }
    }

    /// Whether `from` transitively waits on `target` through modules that are
    /// still pending. Used to spot dependency-cycle back-edges.
    pub(crate) fn depends_transitively(&self, from: &ModuleId, target: &ModuleId) -> bool {
        let mut visited: HashSet<&ModuleId> = HashSet::new();
        let mut stack: Vec<&ModuleId> = vec![from];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(record) = self.records.get(id) {
                stack.extend(record.pending_deps.iter());
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn id(s: &str) -> ModuleId {
        ModuleId::new(s)
    }

    #[test]
    fn waiters_drain_in_registration_order() {
        let mut registry = ModuleRegistry::new();
        registry.create_requested(id("a"));

        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            let returned = registry.add_waiter(&id("a"), Box::new(move || order.lock().unwrap().push(n)));
            assert!(returned.is_none());
        }

        let waiters = registry.mark_initialized(&id("a"), Value::from("done"));
        assert_eq!(waiters.len(), 3);
        for waiter in waiters {
            waiter();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn mark_initialized_is_idempotent() {
        let mut registry = ModuleRegistry::new();
        registry.create_requested(id("a"));
        let first = registry.mark_initialized(&id("a"), Value::from("first"));
        assert!(first.is_empty());

        let again = registry.mark_initialized(&id("a"), Value::from("second"));
        assert!(again.is_empty());
        // Exports are write-once.
        assert_eq!(registry.exports_of(&id("a")), Some(Value::from("first")));
    }

    #[test]
    fn waiter_on_initialized_module_is_handed_back() {
        let mut registry = ModuleRegistry::new();
        registry.create_requested(id("a"));
        let _ = registry.mark_initialized(&id("a"), Value::from("done"));

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let returned = registry.add_waiter(&id("a"), Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let waiter = returned.expect("waiter should be handed back for immediate invocation");
        waiter();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn placeholder_is_visible_while_pending() {
        let mut registry = ModuleRegistry::new();
        let placeholder = ObjectRef::new();
        registry.begin_initialization(&id("a"), placeholder.clone());
        assert_eq!(registry.state_of(&id("a")), Some(ModuleState::FactoryPending));
        assert_eq!(registry.exports_of(&id("a")), None);

        let current = registry.current_exports(&id("a"));
        assert!(current.as_object().unwrap().ptr_eq(&placeholder));
    }

    #[test]
    fn transitive_pending_dependencies() {
        let mut registry = ModuleRegistry::new();
        registry.begin_initialization(&id("a"), ObjectRef::new());
        registry.begin_initialization(&id("b"), ObjectRef::new());
        registry.add_pending_edge(&id("a"), id("b"));
        registry.add_pending_edge(&id("b"), id("c"));

        assert!(registry.depends_transitively(&id("a"), &id("c")));
        assert!(!registry.depends_transitively(&id("c"), &id("a")));

        // Edges vanish once the module initializes.
        let _ = registry.mark_initialized(&id("a"), Value::Undefined);
        assert!(!registry.depends_transitively(&id("a"), &id("c")));
    }
}
