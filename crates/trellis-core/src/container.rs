//! The construction engine.
//!
//! [`Container`] owns every registry and resolves requested types into fully
//! wired singletons. Resolution of a type that is not cached yet runs inside a
//! *resolution frame*:
//!
//! 1. Map the requested key to something buildable: an explicit interface
//!    binding, then a declared default implementation, then a component
//!    descriptor.
//! 2. Resolve constructor parameters (named instances first), call the
//!    constructor and wrap the result in a [`Proxy`] if the component declares
//!    async or listener methods.
//! 3. Publish the value into the frame as a *partial* and wire its fields.
//!    A field whose type is already being built on the current path receives
//!    that partial; a lazy field receives a deferred handle instead of
//!    recursing.
//! 4. Resolve `${...}` properties and run the initializer hook.
//! 5. Stage the finished instance. When the outermost resolution returns, all
//!    staged instances and listener subscriptions are committed together;
//!    any failure discards the whole frame. A nested failure that a hook
//!    recovers from still drops everything staged while the failed component
//!    was being built.
//!
//! One re-entrant construction lock serializes frames, so each type is built
//! at most once. Cached singletons are read without taking it.
//!
//! # Example
//!
//! ```rust,ignore
//! let container = Container::builder()
//!     .property("db.url", "postgres://localhost/orders")
//!     .executor("mail", 2)
//!     .build()?;
//!
//! container.register_component::<OrderService>()?;
//! container.register_implementation(implementation!(dyn OrderRepository => SqlRepository))?;
//!
//! let orders = container.get::<OrderService>()?;
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::{debug, debug_span, info, trace};

use crate::descriptor::{
    Arguments, Component, ComponentDescriptor, FieldSpec, Implementation, Interface,
};
use crate::error::{ContainerError, ContainerResult};
use crate::event::{EventBus, Listener};
use crate::executor::{DEFAULT_EXECUTOR, DEFAULT_WORKERS, ExecutorRegistry};
use crate::instance::Instance;
use crate::key::TypeKey;
use crate::property::Properties;
use crate::proxy::Proxy;
use crate::registry::{DescriptorTable, ImplementationRegistry, InstanceRegistry};
use crate::slot::DeferredResolve;


// ─── Frame ───────────────────────────────────────────────────────────────────

/// State of the resolution in progress on the thread holding the lock.
#[derive(Default)]
struct Frame {
    /// Nesting of `resolve` calls; the frame commits when it returns to 0.
    depth: usize,
    /// Components under construction, outermost first.
    path: Vec<TypeKey>,
    /// Constructed but not yet fully wired components.
    partials: HashMap<TypeKey, Instance>,
    /// Finished components awaiting commit, in completion order.
    staged: Vec<(TypeKey, Instance)>,
    listeners: Vec<Listener>,
}

impl Frame {
    fn staged(&self, key: TypeKey) -> Option<Instance> {
        self.staged
            .iter()
            .find(|(staged, _)| *staged == key)
            .map(|(_, instance)| instance.clone())
    }

    fn cycle(&self, key: TypeKey) -> ContainerError {
        let start = self.path.iter().position(|k| *k == key).unwrap_or(0);
        let mut path: Vec<&'static str> = self.path[start..].iter().map(|k| k.name()).collect();
        path.push(key.name());
        ContainerError::CircularDependency { path }
    }
}

type FrameGuard<'a> = ReentrantMutexGuard<'a, RefCell<Frame>>;

// ─── ContainerInner ──────────────────────────────────────────────────────────

pub(crate) struct ContainerInner {
    instances: InstanceRegistry,
    implementations: ImplementationRegistry,
    descriptors: DescriptorTable,
    properties: Properties,
    executors: Arc<ExecutorRegistry>,
    events: Arc<EventBus>,
    construction: ReentrantMutex<RefCell<Frame>>,
}

impl ContainerInner {
    fn new(properties: Properties, executors: Arc<ExecutorRegistry>) -> Self {
        let events = Arc::new(EventBus::new(Arc::clone(&executors)));
        let instances =
            InstanceRegistry::seeded(TypeKey::of::<EventBus>(), Instance::new(Arc::clone(&events)));
        Self {
            instances,
            implementations: ImplementationRegistry::default(),
            descriptors: DescriptorTable::default(),
            properties,
            executors,
            events,
            construction: ReentrantMutex::new(RefCell::new(Frame::default())),
        }
    }

    /// Returns a committed singleton for `key`, following interface bindings.
    fn lookup_finished(&self, key: TypeKey) -> ContainerResult<Option<Instance>> {
        if let Some(found) = self.instances.get(key) {
            return Ok(Some(found));
        }
        let Some(binding) = self.implementations.get(key) else {
            return Ok(None);
        };
        self.instances
            .get(binding.concrete())
            .map(|concrete| binding.upcast(&concrete))
            .transpose()
    }

    /// Returns a committed, staged or partial instance for `key`.
    fn lookup_existing(
        &self,
        guard: &FrameGuard<'_>,
        key: TypeKey,
    ) -> ContainerResult<Option<Instance>> {
        if let Some(found) = self.lookup_finished(key)? {
            return Ok(Some(found));
        }
        let binding = self.implementations.get(key);
        let concrete = binding.as_ref().map_or(key, Implementation::concrete);
        let found = {
            let frame = guard.borrow();
            frame
                .staged(concrete)
                .or_else(|| frame.partials.get(&concrete).cloned())
        };
        match (found, binding) {
            (Some(found), Some(binding)) => binding.upcast(&found).map(Some),
            (found, _) => Ok(found),
        }
    }

    pub(crate) fn resolve_key(self: &Arc<Self>, key: TypeKey) -> ContainerResult<Instance> {
        if let Some(found) = self.lookup_finished(key)? {
            trace!(key = %key, "Resolved from cache");
            return Ok(found);
        }

        self.in_frame(|guard| {
            // Another frame may have committed it while we waited for the lock.
            if let Some(found) = self.lookup_finished(key)? {
                return Ok(found);
            }
            let binding = self.implementations.get(key);
            let concrete = binding.as_ref().map_or(key, Implementation::concrete);
            let staged = guard.borrow().staged(concrete);
            match (staged, binding) {
                (Some(staged), Some(binding)) => binding.upcast(&staged),
                (Some(staged), None) => Ok(staged),
                (None, Some(binding)) => {
                    trace!(interface = %key, concrete = %concrete, "Following binding");
                    self.descriptors
                        .declare_if_absent(concrete, binding.descriptor_fn());
                    let instance = self.resolve_key(concrete)?;
                    binding.upcast(&instance)
                }
                (None, None) => match self.descriptors.get(key) {
                    Some(descriptor) => self.construct(guard, &descriptor),
                    None => Err(ContainerError::unresolved(
                        key.name(),
                        "no binding, default implementation or component registered",
                    )),
                },
            }
        })
    }

    /// Runs `f` inside the current frame, opening one if needed.
    ///
    /// Closing the outermost frame commits on success and discards on error.
    fn in_frame<R>(
        self: &Arc<Self>,
        f: impl FnOnce(&FrameGuard<'_>) -> ContainerResult<R>,
    ) -> ContainerResult<R> {
        let guard = self.construction.lock();
        guard.borrow_mut().depth += 1;

        let result = match catch_unwind(AssertUnwindSafe(|| f(&guard))) {
            Ok(result) => result,
            Err(panic) => {
                let mut frame = guard.borrow_mut();
                frame.depth -= 1;
                if frame.depth == 0 {
                    *frame = Frame::default();
                }
                drop(frame);
                resume_unwind(panic);
            }
        };

        let finished = {
            let mut frame = guard.borrow_mut();
            frame.depth -= 1;
            (frame.depth == 0).then(|| std::mem::take(&mut *frame))
        };
        let Some(frame) = finished else {
            return result;
        };

        match result {
            Ok(value) => {
                self.commit(frame)?;
                Ok(value)
            }
            Err(error) => {
                debug!(
                    error = %error,
                    discarded = frame.staged.len(),
                    "Resolution failed, frame discarded"
                );
                Err(error)
            }
        }
    }

    fn commit(&self, frame: Frame) -> ContainerResult<()> {
        if frame.staged.is_empty() && frame.listeners.is_empty() {
            return Ok(());
        }
        let components = frame.staged.len();
        self.instances.insert_all(frame.staged)?;
        for listener in frame.listeners {
            self.events.subscribe(listener)?;
        }
        debug!(components, "Resolution committed");
        Ok(())
    }

    fn construct(
        self: &Arc<Self>,
        guard: &FrameGuard<'_>,
        descriptor: &ComponentDescriptor,
    ) -> ContainerResult<Instance> {
        let key = descriptor.key();
        {
            let mut frame = guard.borrow_mut();
            if frame.path.contains(&key) {
                return Err(frame.cycle(key));
            }
            frame.path.push(key);
        }

        let span = debug_span!("resolve", component = descriptor.name());
        let _entered = span.enter();
        debug!("Constructing component");

        let (staged_mark, listeners_mark) = {
            let frame = guard.borrow();
            (frame.staged.len(), frame.listeners.len())
        };
        let result = self.assemble(guard, descriptor);

        let mut frame = guard.borrow_mut();
        frame.path.pop();
        frame.partials.remove(&key);
        let (instance, listeners) = match result {
            Ok(built) => built,
            Err(error) => {
                // Whatever was staged since this component started may hold its partial.
                frame.staged.truncate(staged_mark);
                frame.listeners.truncate(listeners_mark);
                return Err(error);
            }
        };
        frame.staged.push((key, instance.clone()));
        frame.listeners.extend(listeners);
        debug!("Component staged");
        Ok(instance)
    }

    fn assemble(
        self: &Arc<Self>,
        guard: &FrameGuard<'_>,
        descriptor: &ComponentDescriptor,
    ) -> ContainerResult<(Instance, Vec<Listener>)> {
        let mut arguments = Vec::with_capacity(descriptor.params().len());
        for param in descriptor.params() {
            let value = match param.named().and_then(|name| self.instances.get_named(name)) {
                Some(named) => named,
                None => self.resolve_key(param.target())?,
            };
            arguments.push((param.target(), value));
        }

        let raw = descriptor.construct(&mut Arguments::new(descriptor.name(), arguments))?;
        let instance = if descriptor.is_intercepted() {
            descriptor.intercept(raw, &self.executors)?
        } else {
            raw
        };
        guard
            .borrow_mut()
            .partials
            .insert(descriptor.key(), instance.clone());

        let listeners = self.bind_listeners(descriptor, &instance)?;
        self.wire(guard, descriptor, &instance)?;
        descriptor.initialize(&instance)?;
        Ok((instance, listeners))
    }

    fn bind_listeners(
        &self,
        descriptor: &ComponentDescriptor,
        instance: &Instance,
    ) -> ContainerResult<Vec<Listener>> {
        let mut listeners = Vec::new();
        for spec in descriptor.methods() {
            let Some(bound) = spec.bind(instance) else {
                continue;
            };
            let mut listener = bound?;
            listener.routing_key()?;
            if let Some(executor) = descriptor.executor_of(spec.method()) {
                listener = listener.on_executor(executor);
            }
            listeners.push(listener);
        }
        Ok(listeners)
    }

    /// Wires fields and properties of `instance`.
    fn wire(
        self: &Arc<Self>,
        guard: &FrameGuard<'_>,
        descriptor: &ComponentDescriptor,
        instance: &Instance,
    ) -> ContainerResult<()> {
        for field in descriptor.fields() {
            trace!(field = field.name(), target = %field.target(), "Wiring field");
            self.wire_field(guard, field, instance)?;
        }
        for value in descriptor.values() {
            trace!(field = value.name(), placeholder = value.placeholder(), "Resolving property");
            value.apply(instance, &self.properties)?;
        }
        Ok(())
    }

    fn wire_field(
        self: &Arc<Self>,
        guard: &FrameGuard<'_>,
        field: &FieldSpec,
        instance: &Instance,
    ) -> ContainerResult<()> {
        if let Some(named) = field.named().and_then(|name| self.instances.get_named(name)) {
            return field.inject(instance, &named);
        }

        let target = field.target();
        if field.is_lazy() {
            return match self.lookup_existing(guard, target)? {
                Some(existing) => field.inject(instance, &existing),
                None => field.defer(instance, self.deferred(target)),
            };
        }

        let binding = self.implementations.get(target);
        let concrete = binding.as_ref().map_or(target, Implementation::concrete);
        let partial = {
            let frame = guard.borrow();
            if frame.path.contains(&concrete) {
                match frame.partials.get(&concrete) {
                    Some(partial) => Some(partial.clone()),
                    None => return Err(frame.cycle(concrete)),
                }
            } else {
                None
            }
        };

        let value = match (partial, binding) {
            (Some(partial), Some(binding)) => binding.upcast(&partial)?,
            (Some(partial), None) => partial,
            (None, _) => self.resolve_key(target)?,
        };
        field.inject(instance, &value)
    }

    fn deferred(self: &Arc<Self>, key: TypeKey) -> DeferredResolve {
        let container = Arc::downgrade(self);
        Box::new(move || {
            let container = container
                .upgrade()
                .ok_or(ContainerError::ContainerDropped {
                    type_name: key.name(),
                })?;
            let instance = container.resolve_key(key)?;
            let committed = container.lookup_finished(key)?.is_some();
            Ok((instance, committed))
        })
    }
}

// ─── Container ───────────────────────────────────────────────────────────────

/// The dependency-injection container.
///
/// Cheap to clone; clones share every registry. Resolution is synchronous on
/// the calling thread. Async-marked methods and async listeners run on the
/// container's named executors.
///
/// Constructors, initializers and [`Lazy::get`](crate::Lazy::get) may resolve
/// further types on the same thread. They must not block on work that
/// resolves a not-yet-built type from another thread, since that thread
/// waits for the construction lock held by the caller.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// Creates an empty container without executors or properties.
    pub fn new() -> Self {
        Self::from_parts(Properties::new(), Arc::new(ExecutorRegistry::new()))
    }

    /// Starts configuring a container.
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::default()
    }

    fn from_parts(properties: Properties, executors: Arc<ExecutorRegistry>) -> Self {
        Self {
            inner: Arc::new(ContainerInner::new(properties, executors)),
        }
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Makes component `C` resolvable. Its descriptor is derived on first use.
    pub fn register_component<C: Component>(&self) -> ContainerResult<()> {
        let key = TypeKey::of::<C>();
        self.inner.descriptors.declare(key, C::descriptor)?;
        info!(component = key.name(), "Component registered");
        Ok(())
    }

    /// Makes the described component resolvable.
    pub fn register_descriptor(&self, descriptor: ComponentDescriptor) -> ContainerResult<()> {
        let name = descriptor.name();
        self.inner.descriptors.insert(descriptor)?;
        info!(component = name, "Component registered");
        Ok(())
    }

    /// Records the default implementation declared by interface `I`, if any.
    pub fn register_interface<I: Interface + ?Sized>(&self) -> ContainerResult<()> {
        let key = TypeKey::of::<I>();
        let Some(default) = I::default_implementation() else {
            return Ok(());
        };
        if default.interface() != key {
            return Err(ContainerError::mismatch(
                default.interface().name(),
                key.name(),
            ));
        }
        let concrete = default.concrete();
        if self.inner.implementations.declare_default(default) {
            debug!(interface = %key, default = %concrete, "Default implementation declared");
        }
        Ok(())
    }

    /// Binds an interface to its concrete component.
    ///
    /// The concrete component is registered as well if it is not yet known.
    pub fn register_implementation(&self, implementation: Implementation) -> ContainerResult<()> {
        let interface = implementation.interface();
        let concrete = implementation.concrete();
        let descriptor = implementation.descriptor_fn();
        self.inner.implementations.bind(implementation)?;
        self.inner.descriptors.declare_if_absent(concrete, descriptor);
        info!(interface = %interface, concrete = %concrete, "Implementation registered");
        Ok(())
    }

    /// Binds a ready-made singleton under its type.
    pub fn register_instance<T>(&self, instance: Arc<T>) -> ContainerResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        self.inner.instances.insert(key, Instance::new(instance))?;
        info!(type_name = key.name(), "Instance registered");
        Ok(())
    }

    /// Binds a value under a string key.
    pub fn register_named<T>(&self, key: impl Into<String>, instance: Arc<T>) -> ContainerResult<()>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = key.into();
        debug!(key = %key, type_name = std::any::type_name::<T>(), "Named instance registered");
        self.inner.instances.insert_named(key, Instance::new(instance))
    }

    // ─── Resolution ──────────────────────────────────────────────────────────

    /// Returns the singleton for `T`, building it and its dependencies on first use.
    ///
    /// A component with async methods is only reachable through its proxy:
    /// asking for it here fails with [`ContainerError::TypeMismatch`]. Use
    /// [`proxy`](Self::proxy), a `proxy_field` or a proxied interface binding.
    ///
    /// Construction holds a re-entrant lock for the whole call tree. A
    /// constructor or initializer that blocks on another thread which is
    /// itself resolving a new type will deadlock.
    pub fn get<T>(&self) -> ContainerResult<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = TypeKey::of::<T>();
        self.inner.resolve_key(key)?.expect_type::<T>(key)
    }

    /// Like [`get`](Self::get), registering `C` first if it is unknown.
    pub fn get_component<C: Component>(&self) -> ContainerResult<Arc<C>> {
        self.inner
            .descriptors
            .declare_if_absent(TypeKey::of::<C>(), C::descriptor);
        self.get::<C>()
    }

    /// Returns the intercepting stand-in of component `C`.
    pub fn proxy<C: Send + Sync + 'static>(&self) -> ContainerResult<Arc<Proxy<C>>> {
        let key = TypeKey::of::<C>();
        self.inner.resolve_key(key)?.expect_type::<Proxy<C>>(key)
    }

    /// Returns the value bound under `key`, if any and if it is a `T`.
    pub fn get_named<T: ?Sized + 'static>(&self, key: &str) -> Option<Arc<T>> {
        self.inner.instances.get_named(key)?.downcast::<T>()
    }

    /// Wires fields and properties of an externally created component.
    ///
    /// The value is not cached and its initializer does not run.
    pub fn decorate<C: Component>(&self, value: &Arc<C>) -> ContainerResult<()> {
        let key = TypeKey::of::<C>();
        let descriptor = self
            .inner
            .descriptors
            .get(key)
            .unwrap_or_else(|| Arc::new(C::descriptor()));
        let instance = Instance::new(Arc::clone(value));
        self.inner
            .in_frame(|guard| self.inner.wire(guard, &descriptor, &instance))
    }

    // ─── Events ──────────────────────────────────────────────────────────────

    /// Publishes `event` to every listener of its exact type.
    pub fn publish_event<E: Any + Send + Sync>(&self, event: E) -> ContainerResult<usize> {
        self.inner.events.publish(event)
    }

    /// The container's event bus, also injectable as `Inject<EventBus>`.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    // ─── Introspection ───────────────────────────────────────────────────────

    /// Whether a finished singleton exists for `T`.
    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.inner.instances.contains(TypeKey::of::<T>())
    }

    /// The descriptor of `T`, deriving it if needed.
    pub fn descriptor_of<T: 'static>(&self) -> Option<Arc<ComponentDescriptor>> {
        self.inner.descriptors.get(TypeKey::of::<T>())
    }

    /// The loaded property set.
    pub fn properties(&self) -> &Properties {
        &self.inner.properties
    }

    /// The named executor pools.
    pub fn executors(&self) -> &Arc<ExecutorRegistry> {
        &self.inner.executors
    }

    /// Stops every executor, waiting up to `timeout` per pool.
    ///
    /// Must not be called from inside an async context.
    pub fn shutdown(&self, timeout: Duration) {
        info!("Shutting down container executors");
        self.inner.executors.shutdown(timeout);
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (typed, named) = self.inner.instances.len();
        f.debug_struct("Container")
            .field("instances", &typed)
            .field("named", &named)
            .field("properties", &self.inner.properties.len())
            .field("executors", &self.inner.executors.names())
            .finish()
    }
}

// ─── ContainerBuilder ────────────────────────────────────────────────────────

/// Configures properties and executors, then creates a [`Container`].
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    properties: Properties,
    pools: Vec<(String, usize)>,
    enable_async: bool,
}

impl ContainerBuilder {
    /// Adds one property.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key, value);
        self
    }

    /// Adds a property set; later values win.
    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties.merge(properties);
        self
    }

    /// Declares a named pool with a fixed worker count.
    pub fn executor(mut self, name: impl Into<String>, workers: usize) -> Self {
        self.pools.push((name.into(), workers));
        self
    }

    /// Creates the default `"application"` pool unless one is declared.
    pub fn enable_async(mut self, enabled: bool) -> Self {
        self.enable_async = enabled;
        self
    }

    /// Starts the executors and creates the container.
    pub fn build(self) -> ContainerResult<Container> {
        let executors = Arc::new(ExecutorRegistry::new());
        for (name, workers) in self.pools {
            executors.register(name, workers)?;
        }
        if self.enable_async && !executors.contains(DEFAULT_EXECUTOR) {
            executors.register(DEFAULT_EXECUTOR, DEFAULT_WORKERS)?;
        }
        info!(
            properties = self.properties.len(),
            executors = ?executors.names(),
            "Container created"
        );
        Ok(Container::from_parts(self.properties, executors))
    }
}
