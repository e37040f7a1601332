// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module definition and dependency resolution engine
//!
//! [`Loader`] is the explicit owner of all loader state: the module registry,
//! the anonymous-definition capture slot, and the resolution config, all
//! behind one mutex. Handles are cheap to clone and share. Everything is
//! callback-driven: a `require` registers continuations and returns, waiters
//! fire when their module initializes, and a require that is satisfiable
//! immediately still resumes on a later scheduling turn so callers observe a
//! uniform asynchrony contract.
//!
//! Loader methods schedule work with `tokio::spawn` and must be called from
//! within a tokio runtime.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::AmdMarker;
use crate::config::{ConfigUpdate, LoaderConfig};
use crate::error::{LoaderError, Result};
use crate::registry::{ModuleRegistry, ModuleState};
use crate::resolver::{self, ModuleId, Resolved};
use crate::transport::ResourceTransport;
use crate::value::{ObjectRef, Value};

/// Dependency names injected into every definition context; the default
/// dependency list for definitions that do not declare one
pub const DEFAULT_DEPENDENCIES: [&str; 3] = ["require", "exports", "module"];

/// Continuation of an asynchronous require, invoked with the resolved
/// dependency values in declared order
pub type RequireCallback = Box<dyn FnOnce(Vec<Value>) + Send>;

/// Factory body: receives the resolved dependency values positionally and
/// produces the export value, or `None` to keep the exports placeholder
pub type FactoryFn = Box<dyn FnOnce(&[Value]) -> Option<Value> + Send>;

/// Caller-injected name bindings consulted before the registry when resolving
/// a dependency list
pub type Context = HashMap<String, Value>;

/// What a definition initializes its module with
pub enum Factory {
    /// A plain value committed directly, without a call
    Value(Value),
    /// A function invoked once the dependency set is satisfied
    Function(FactoryFn),
}

impl Factory {
    /// Wrap a factory function
    pub fn function<F>(factory: F) -> Self
    where
        F: FnOnce(&[Value]) -> Option<Value> + Send + 'static,
    {
        Self::Function(Box::new(factory))
    }
}

impl From<Value> for Factory {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Factory {
    fn from(value: &str) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<String> for Factory {
    fn from(value: String) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<f64> for Factory {
    fn from(value: f64) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<bool> for Factory {
    fn from(value: bool) -> Self {
        Self::Value(Value::from(value))
    }
}

impl From<ObjectRef> for Factory {
    fn from(value: ObjectRef) -> Self {
        Self::Value(Value::from(value))
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Factory::Value").field(value).finish(),
            Self::Function(_) => f.write_str("Factory::Function"),
        }
    }
}

/// A `require` bound to a module's own id, so relative dependency names
/// inside its factory resolve against that module's location
#[derive(Clone)]
pub struct ScopedRequire {
    loader: Loader,
    base: ModuleId,
}

impl ScopedRequire {
    /// Synchronous lookup of an already-initialized module, resolved against
    /// this scope's base id
    pub fn sync(&self, id: &str) -> Result<Value> {
        self.loader.require_sync_from(id, &self.base)
    }

    /// Asynchronous require resolved against this scope's base id
    pub fn load<F>(&self, dependencies: &[&str], callback: F) -> Result<()>
    where
        F: FnOnce(Vec<Value>) + Send + 'static,
    {
        self.loader
            .require_from(dependencies, Some(Box::new(callback)), Context::new(), self.base.clone())
    }

    /// The module id this require is scoped to
    pub fn base(&self) -> &ModuleId {
        &self.base
    }
}

impl fmt::Debug for ScopedRequire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedRequire").field("base", &self.base).finish()
    }
}

struct AnonymousDefinition {
    dependencies: Vec<String>,
    factory: Factory,
}

struct LoaderState {
    registry: ModuleRegistry,
    config: LoaderConfig,
    /// Capture slot for the most recent anonymous definition, bound to
    /// whichever resource id signals readiness next. Last write wins; a named
    /// definition clears it.
    anonymous: Option<AnonymousDefinition>,
}

struct Shared {
    state: Mutex<LoaderState>,
    transport: Arc<dyn ResourceTransport>,
}

/// Handle to the module loader. Clones share the same registry.
#[derive(Clone)]
pub struct Loader {
    shared: Arc<Shared>,
}

/// One pending asynchronous require: the countdown of unsatisfied
/// dependencies and everything needed to finish once it reaches zero.
struct PendingRequire {
    remaining: usize,
    slots: Vec<DepSlot>,
    context: Context,
    callback: Option<RequireCallback>,
    loader: Loader,
    completed: bool,
}

/// Where a dependency's value comes from at completion time, in declared order
enum DepSlot {
    /// Context-injected binding, looked up by raw name
    Context(String),
    /// Registry module, looked up by canonical id
    Module(ModuleId),
}

type PendingHandle = Arc<Mutex<PendingRequire>>;

fn waiter_fired(handle: &PendingHandle) {
    {
        let mut pending = handle.lock();
        pending.remaining = pending.remaining.saturating_sub(1);
    }
    try_complete(handle);
}

fn try_complete(handle: &PendingHandle) {
    let finished = {
        let mut pending = handle.lock();
        if pending.remaining == 0 && !pending.completed {
            pending.completed = true;
            Some((
                std::mem::take(&mut pending.slots),
                std::mem::take(&mut pending.context),
                pending.callback.take(),
                pending.loader.clone(),
            ))
        } else {
            None
        }
    };
    if let Some((slots, context, callback, loader)) = finished {
        loader.finish_pending(slots, context, callback);
    }
}

impl Loader {
    /// Marker advertising that this loader implements the AMD-style
    /// module-wiring contract, for bundlers and host tooling
    pub const AMD: AmdMarker = AmdMarker;

    /// Create a loader with default configuration
    pub fn new(transport: Arc<dyn ResourceTransport>) -> Self {
        Self::with_config(transport, LoaderConfig::default())
    }

    /// Create a loader with explicit configuration
    pub fn with_config(transport: Arc<dyn ResourceTransport>, config: LoaderConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LoaderState {
                    registry: ModuleRegistry::new(),
                    config,
                    anonymous: None,
                }),
                transport,
            }),
        }
    }

    /// Register a named module definition and begin initializing it.
    ///
    /// A second definition for an id that is already initializing or
    /// initialized is silently ignored; the factory of the first definition
    /// is the one that runs. Dependency names that cannot be resolved surface
    /// here and leave the registry untouched.
    pub fn define(&self, id: &str, dependencies: &[&str], factory: Factory) -> Result<()> {
        // A named definition supersedes any unbound anonymous capture, so a
        // resource that defined something named never leaks an earlier
        // anonymous definition into its own readiness step.
        self.shared.state.lock().anonymous = None;
        self.define_bound(ModuleId::new(id), owned_names(dependencies), factory)
    }

    /// Register an anonymous module definition.
    ///
    /// The definition is captured and bound to whichever resource id signals
    /// readiness next, since its true identity is unknown until the resource
    /// that contains it finishes loading.
    pub fn define_anonymous(&self, dependencies: &[&str], factory: Factory) {
        self.shared.state.lock().anonymous = Some(AnonymousDefinition {
            dependencies: owned_names(dependencies),
            factory,
        });
    }

    /// Asynchronous require: load `dependencies` and invoke `callback` with
    /// their values positionally, in declared order.
    ///
    /// The callback never runs inline; even a dependency list that is empty
    /// or fully satisfied resumes on a later scheduling turn.
    pub fn require<F>(&self, dependencies: &[&str], callback: F) -> Result<()>
    where
        F: FnOnce(Vec<Value>) + Send + 'static,
    {
        self.require_with_context(dependencies, callback, Context::new())
    }

    /// Asynchronous require with caller-injected name bindings. Names found
    /// in `context` are satisfied from it instead of the registry.
    pub fn require_with_context<F>(&self, dependencies: &[&str], callback: F, context: Context) -> Result<()>
    where
        F: FnOnce(Vec<Value>) + Send + 'static,
    {
        self.require_from(dependencies, Some(Box::new(callback)), context, ModuleId::root())
    }

    /// Load `dependencies` without reporting a result
    pub fn prefetch(&self, dependencies: &[&str]) -> Result<()> {
        self.require_from(dependencies, None, Context::new(), ModuleId::root())
    }

    /// Synchronous require: the committed exports of an already-initialized
    /// module. Never triggers loading; fails with
    /// [`LoaderError::NotInitialized`] otherwise.
    pub fn require_sync(&self, id: &str) -> Result<Value> {
        self.require_sync_from(id, &ModuleId::root())
    }

    /// Update the resolution configuration. Applies to resolutions performed
    /// afterwards; requests already in flight keep the locations they were
    /// issued with.
    pub fn configure(&self, update: ConfigUpdate) {
        self.shared.state.lock().config.apply(update);
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> LoaderConfig {
        self.shared.state.lock().config.clone()
    }

    /// Lifecycle state of a module id, or `None` if it was never referenced
    pub fn module_state(&self, id: &str) -> Option<ModuleState> {
        self.shared.state.lock().registry.state_of(&ModuleId::new(id))
    }

    fn require_from(
        &self,
        dependencies: &[&str],
        callback: Option<RequireCallback>,
        mut context: Context,
        base: ModuleId,
    ) -> Result<()> {
        context.insert(
            "require".to_string(),
            Value::Require(ScopedRequire {
                loader: self.clone(),
                base: base.clone(),
            }),
        );
        self.resolve_dependencies(&owned_names(dependencies), &base, None, context, callback)
    }

    fn require_sync_from(&self, raw: &str, base: &ModuleId) -> Result<Value> {
        let state = self.shared.state.lock();
        let resolved = resolver::resolve(raw, base, &state.config)?;
        state
            .registry
            .exports_of(&resolved.id)
            .ok_or(LoaderError::NotInitialized(resolved.id))
    }

    /// Begin initializing `id` from a definition: build the execution context
    /// (scoped require, exports placeholder, module metadata), resolve the
    /// declared dependencies, and commit the factory's result once they are
    /// all satisfied.
    fn define_bound(&self, id: ModuleId, dependencies: Vec<String>, factory: Factory) -> Result<()> {
        let placeholder = ObjectRef::new();
        let metadata = ObjectRef::new();
        metadata.insert("id", Value::String(id.as_str().to_string()));
        metadata.insert("exports", Value::Object(placeholder.clone()));

        let mut context = Context::new();
        context.insert(
            "require".to_string(),
            Value::Require(ScopedRequire {
                loader: self.clone(),
                base: id.clone(),
            }),
        );
        context.insert("exports".to_string(), Value::Object(placeholder.clone()));
        context.insert("module".to_string(), Value::Object(metadata));

        let loader = self.clone();
        let commit_id = id.clone();
        let commit_placeholder = placeholder.clone();
        let callback: RequireCallback = Box::new(move |values| {
            let produced = match factory {
                Factory::Value(value) => Some(value),
                Factory::Function(invoke) => invoke(&values),
            };
            // A factory that produced nothing keeps its (possibly mutated)
            // placeholder as the export value.
            let exports = match produced {
                Some(value) if !value.is_undefined() => value,
                _ => Value::Object(commit_placeholder),
            };
            loader.commit(&commit_id, exports);
        });

        let base = id.clone();
        self.resolve_dependencies(
            &dependencies,
            &base,
            Some((id, placeholder)),
            context,
            Some(callback),
        )
    }

    /// The dependency resolution algorithm shared by `require` and
    /// definitions. When `defining` is set this call initializes that module:
    /// its record transitions to `FactoryPending` and its unsatisfied
    /// dependencies are tracked as pending edges for back-edge detection.
    fn resolve_dependencies(
        &self,
        names: &[String],
        base: &ModuleId,
        defining: Option<(ModuleId, ObjectRef)>,
        mut context: Context,
        callback: Option<RequireCallback>,
    ) -> Result<()> {
        enum Planned {
            Context(String),
            Module(Resolved),
        }

        let handle: PendingHandle = Arc::new(Mutex::new(PendingRequire {
            remaining: names.len(),
            slots: Vec::new(),
            context: Context::new(),
            callback,
            loader: self.clone(),
            completed: false,
        }));

        let mut requests: Vec<(ModuleId, String)> = Vec::new();
        let ready = {
            let mut state = self.shared.state.lock();

            if let Some((id, _)) = &defining {
                match state.registry.state_of(id) {
                    Some(ModuleState::FactoryPending) | Some(ModuleState::Initialized) => {
                        debug!("ignoring duplicate definition of '{}'", id);
                        return Ok(());
                    }
                    _ => {}
                }
            }

            // Resolve every name before touching the registry, so a malformed
            // dependency surfaces at this call site without partial records.
            let mut planned = Vec::with_capacity(names.len());
            for name in names {
                if context.contains_key(name.as_str()) {
                    planned.push(Planned::Context(name.clone()));
                } else {
                    planned.push(Planned::Module(resolver::resolve(name, base, &state.config)?));
                }
            }

            if let Some((id, placeholder)) = &defining {
                state.registry.begin_initialization(id, placeholder.clone());
            }
            let from = defining.map(|(id, _)| id);

            let mut satisfied = 0usize;
            let mut slots = Vec::with_capacity(names.len());
            for plan in planned {
                match plan {
                    Planned::Context(name) => {
                        satisfied += 1;
                        slots.push(DepSlot::Context(name));
                    }
                    Planned::Module(Resolved { id, location }) => {
                        match state.registry.state_of(&id) {
                            Some(ModuleState::Initialized) => satisfied += 1,
                            Some(ModuleState::FactoryPending)
                                if from.as_ref().is_some_and(|from| {
                                    id == *from || state.registry.depends_transitively(&id, from)
                                }) =>
                            {
                                // Dependency-cycle back-edge: hand over the
                                // current placeholder instead of waiting.
                                trace!("back-edge to pending module '{}'", id);
                                satisfied += 1;
                            }
                            Some(ModuleState::FactoryPending) | Some(ModuleState::Requested) => {
                                if attach(&mut state.registry, from.as_ref(), &id, &handle) {
                                    satisfied += 1;
                                }
                            }
                            None => {
                                state.registry.create_requested(id.clone());
                                if attach(&mut state.registry, from.as_ref(), &id, &handle) {
                                    satisfied += 1;
                                }
                                requests.push((id.clone(), location));
                            }
                        }
                        slots.push(DepSlot::Module(id));
                    }
                }
            }

            // Waiters cannot fire while the state lock is held (draining them
            // requires it), so the countdown is settled before any can run.
            let mut pending = handle.lock();
            pending.slots = slots;
            pending.context = std::mem::take(&mut context);
            pending.remaining -= satisfied;
            pending.remaining == 0
        };

        for (id, location) in requests {
            debug!("requesting resource for '{}' at {}", id, location);
            let transport = Arc::clone(&self.shared.transport);
            let loader = self.clone();
            tokio::spawn(async move {
                transport.fetch(loader.clone(), id.clone(), location).await;
                loader.resource_ready(&id);
            });
        }

        if ready {
            // Uniform asynchrony: an already-satisfiable require still
            // resumes only after the caller's current execution segment.
            let handle = Arc::clone(&handle);
            tokio::spawn(async move {
                try_complete(&handle);
            });
        }

        Ok(())
    }

    /// Readiness step for a fetched resource: bind any captured anonymous
    /// definition to the resource's id and begin initializing it.
    pub(crate) fn resource_ready(&self, id: &ModuleId) {
        let captured = self.shared.state.lock().anonymous.take();
        if let Some(definition) = captured {
            trace!("binding anonymous definition to '{}'", id);
            if let Err(error) = self.define_bound(id.clone(), definition.dependencies, definition.factory) {
                warn!("anonymous definition bound to '{}' failed to resolve: {}", id, error);
            }
            return;
        }

        // A named definition during evaluation already advanced the record; a
        // record still in Requested got neither, and its waiters stay pending.
        let stalled = matches!(
            self.shared.state.lock().registry.state_of(id),
            Some(ModuleState::Requested)
        );
        if stalled {
            warn!(
                "resource for '{}' finished loading without defining it; waiters stay pending",
                id
            );
        }
    }

    /// Commit an export value and drain the module's waiters, outside the lock
    fn commit(&self, id: &ModuleId, exports: Value) {
        let waiters = self.shared.state.lock().registry.mark_initialized(id, exports);
        debug!("module '{}' initialized", id);
        for waiter in waiters {
            waiter();
        }
    }

    /// Gather dependency values in declared order and invoke the continuation
    fn finish_pending(&self, slots: Vec<DepSlot>, context: Context, callback: Option<RequireCallback>) {
        let Some(callback) = callback else {
            return;
        };
        let values = {
            let state = self.shared.state.lock();
            slots
                .iter()
                .map(|slot| match slot {
                    DepSlot::Context(name) => {
                        context.get(name).cloned().unwrap_or(Value::Undefined)
                    }
                    DepSlot::Module(id) => state.registry.current_exports(id),
                })
                .collect::<Vec<_>>()
        };
        callback(values);
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("Loader")
            .field("modules", &state.registry.len())
            .field("config", &state.config)
            .finish()
    }
}

/// Attach this call's completion handler as a waiter on `id`, recording the
/// pending edge when the call is a definition. Returns `true` if the module
/// turned out to be already initialized (the dependency counts as satisfied).
fn attach(
    registry: &mut ModuleRegistry,
    from: Option<&ModuleId>,
    id: &ModuleId,
    handle: &PendingHandle,
) -> bool {
    if let Some(from) = from {
        registry.add_pending_edge(from, id.clone());
    }
    let handle = Arc::clone(handle);
    registry
        .add_waiter(id, Box::new(move || waiter_fired(&handle)))
        .is_some()
}

fn owned_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InertTransport;

    fn loader() -> Loader {
        Loader::new(Arc::new(InertTransport))
    }

    #[tokio::test]
    async fn sync_require_fails_before_initialization() {
        let loader = loader();
        let error = loader.require_sync("notloaded").unwrap_err();
        assert!(matches!(error, LoaderError::NotInitialized(id) if id.as_str() == "notloaded"));
    }

    #[tokio::test]
    async fn definition_advances_state() {
        let loader = loader();
        assert_eq!(loader.module_state("a"), None);
        loader.define("a", &[], Factory::from("A")).unwrap();
        assert_eq!(loader.module_state("a"), Some(ModuleState::FactoryPending));

        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(loader.module_state("a"), Some(ModuleState::Initialized));
        assert_eq!(loader.require_sync("a").unwrap(), Value::from("A"));
    }

    #[tokio::test]
    async fn malformed_dependency_surfaces_without_partial_records() {
        let loader = loader();
        let result = loader.define("top", &["../escape"], Factory::from("x"));
        assert!(matches!(result, Err(LoaderError::Resolution { .. })));
        // The failed definition left nothing behind.
        assert_eq!(loader.module_state("top"), None);
    }

    #[tokio::test]
    async fn requested_module_is_fetched_once() {
        let loader = loader();
        loader.prefetch(&["shared"]).unwrap();
        assert_eq!(loader.module_state("shared"), Some(ModuleState::Requested));
        // Second require attaches a waiter instead of issuing a new request;
        // the state is unchanged and nothing panics on the inert transport.
        loader.require(&["shared"], |_| {}).unwrap();
        assert_eq!(loader.module_state("shared"), Some(ModuleState::Requested));
    }
}
