//! Component descriptors and their typed builder.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{BoxError, ContainerError, ContainerResult};
use crate::event::Listener;
use crate::executor::{DEFAULT_EXECUTOR, ExecutorRegistry};
use crate::instance::Instance;
use crate::key::TypeKey;
use crate::property::Properties;
use crate::proxy::Proxy;
use crate::slot::{DeferredResolve, Inject, Lazy, Property};

/// A type the container can construct.
///
/// ```rust,ignore
/// struct OrderService {
///     repo: Inject<dyn OrderRepository>,
///     currency: Property<String>,
/// }
///
/// impl Component for OrderService {
///     fn descriptor() -> ComponentDescriptor {
///         ComponentDescriptor::builder(|_| {
///             Ok(Self { repo: Inject::new(), currency: Property::new() })
///         })
///         .field::<dyn OrderRepository>("repo", |s| &s.repo)
///         .value("currency", "${orders.currency}", |s| &s.currency)
///         .build()
///     }
/// }
/// ```
pub trait Component: Send + Sync + Sized + 'static {
    /// Declares how to build and wire this type.
    fn descriptor() -> ComponentDescriptor;
}

// ─── Erased hooks ────────────────────────────────────────────────────────────

type ConstructFn = Box<dyn Fn(&mut Arguments) -> ContainerResult<Instance> + Send + Sync>;
type InjectFn = Box<dyn Fn(&Instance, &Instance) -> ContainerResult<()> + Send + Sync>;
type DeferFn = Box<dyn Fn(&Instance, DeferredResolve) -> ContainerResult<()> + Send + Sync>;
type ValueFn = Box<dyn Fn(&Instance, &Properties) -> ContainerResult<()> + Send + Sync>;
type InitFn = Box<dyn Fn(&Instance) -> ContainerResult<()> + Send + Sync>;
type InterceptFn = Box<
    dyn Fn(Instance, &Arc<ExecutorRegistry>) -> ContainerResult<Instance> + Send + Sync,
>;
type BindFn = Box<dyn Fn(&Instance) -> ContainerResult<Listener> + Send + Sync>;

// ─── Specs ───────────────────────────────────────────────────────────────────

/// One constructor parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    target: TypeKey,
    named: Option<String>,
}

impl ParamSpec {
    /// Type resolved for this parameter.
    pub fn target(&self) -> TypeKey {
        self.target
    }

    /// Named-instance key that takes priority over type resolution.
    pub fn named(&self) -> Option<&str> {
        self.named.as_deref()
    }
}

/// One injectable field.
pub struct FieldSpec {
    name: &'static str,
    target: TypeKey,
    named: Option<String>,
    lazy: bool,
    inject: InjectFn,
    defer: Option<DeferFn>,
}

impl FieldSpec {
    /// Field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type resolved for this field.
    pub fn target(&self) -> TypeKey {
        self.target
    }

    /// Named-instance key that takes priority over type resolution.
    pub fn named(&self) -> Option<&str> {
        self.named.as_deref()
    }

    /// Whether the field is a deferred [`Lazy`] handle.
    pub fn is_lazy(&self) -> bool {
        self.lazy
    }

    pub(crate) fn inject(&self, target: &Instance, value: &Instance) -> ContainerResult<()> {
        (self.inject)(target, value)
    }

    pub(crate) fn defer(&self, target: &Instance, resolve: DeferredResolve) -> ContainerResult<()> {
        match &self.defer {
            Some(defer) => defer(target, resolve),
            None => Err(ContainerError::unresolved(
                self.target.name(),
                format!("field '{}' is not lazy", self.name),
            )),
        }
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("named", &self.named)
            .field("lazy", &self.lazy)
            .finish_non_exhaustive()
    }
}

/// One `${...}` property field.
pub struct ValueSpec {
    name: &'static str,
    placeholder: String,
    apply: ValueFn,
}

impl ValueSpec {
    /// Field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The declared placeholder text.
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub(crate) fn apply(&self, target: &Instance, properties: &Properties) -> ContainerResult<()> {
        (self.apply)(target, properties)
    }
}

impl fmt::Debug for ValueSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueSpec")
            .field("name", &self.name)
            .field("placeholder", &self.placeholder)
            .finish_non_exhaustive()
    }
}

/// Cross-cutting behavior attached to a method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodBehavior {
    /// Calls run on the named executor.
    Async {
        /// Pool name.
        executor: String,
    },
    /// The method receives published events of this payload type.
    EventListener {
        /// `None` when the method takes no payload.
        event: Option<TypeKey>,
    },
}

/// A behavior declaration for one method.
pub struct MethodSpec {
    method: &'static str,
    behavior: MethodBehavior,
    bind: Option<BindFn>,
}

impl MethodSpec {
    /// Method name.
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// The declared behavior.
    pub fn behavior(&self) -> &MethodBehavior {
        &self.behavior
    }

    /// Builds the listener for an event-listener method, bound to the raw target.
    pub(crate) fn bind(&self, target: &Instance) -> Option<ContainerResult<Listener>> {
        self.bind.as_ref().map(|bind| bind(target))
    }
}

impl fmt::Debug for MethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodSpec")
            .field("method", &self.method)
            .field("behavior", &self.behavior)
            .finish()
    }
}

// ─── Arguments ───────────────────────────────────────────────────────────────

/// Resolved constructor parameters, consumed in declaration order.
pub struct Arguments {
    component: &'static str,
    values: std::vec::IntoIter<(TypeKey, Instance)>,
}

impl Arguments {
    pub(crate) fn new(component: &'static str, values: Vec<(TypeKey, Instance)>) -> Self {
        Self {
            component,
            values: values.into_iter(),
        }
    }

    /// Takes the next parameter as `T`.
    ///
    /// Fails with [`ContainerError::TypeMismatch`] if the declared parameter
    /// is not a `T`, or [`ContainerError::UnresolvedDependency`] if the
    /// constructor asks for more parameters than were declared.
    pub fn next<T: ?Sized + 'static>(&mut self) -> ContainerResult<Arc<T>> {
        let (key, value) = self.values.next().ok_or_else(|| {
            ContainerError::unresolved(
                std::any::type_name::<T>(),
                format!("constructor of '{}' read past its declared parameters", self.component),
            )
        })?;
        value.expect_type::<T>(key)
    }

    /// Parameters not yet consumed.
    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("component", &self.component)
            .field("remaining", &self.remaining())
            .finish()
    }
}

// ─── ComponentDescriptor ─────────────────────────────────────────────────────

/// Immutable metadata describing how to build and wire one component.
///
/// Created through [`ComponentDescriptor::builder`]; the container derives
/// it once per type on first resolution and never changes it afterwards.
pub struct ComponentDescriptor {
    key: TypeKey,
    name: &'static str,
    params: Vec<ParamSpec>,
    construct: ConstructFn,
    fields: Vec<FieldSpec>,
    values: Vec<ValueSpec>,
    methods: Vec<MethodSpec>,
    initializer: Option<InitFn>,
    intercept: InterceptFn,
}

impl ComponentDescriptor {
    /// Starts a descriptor for `C` built by `constructor`.
    pub fn builder<C, F>(constructor: F) -> DescriptorBuilder<C>
    where
        C: Send + Sync + 'static,
        F: Fn(&mut Arguments) -> ContainerResult<C> + Send + Sync + 'static,
    {
        DescriptorBuilder::new(constructor)
    }

    /// Starts a descriptor for `C` built by [`Default`].
    pub fn with_default<C>() -> DescriptorBuilder<C>
    where
        C: Default + Send + Sync + 'static,
    {
        DescriptorBuilder::new(|_| Ok(C::default()))
    }

    /// Identity of the described type.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Type name used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Constructor parameters, in order.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Injectable fields, in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Property fields.
    pub fn values(&self) -> &[ValueSpec] {
        &self.values
    }

    /// Method behavior declarations.
    pub fn methods(&self) -> &[MethodSpec] {
        &self.methods
    }

    /// Whether an initializer hook is declared.
    pub fn has_initializer(&self) -> bool {
        self.initializer.is_some()
    }

    /// Whether instances are wrapped in a [`Proxy`].
    pub fn is_intercepted(&self) -> bool {
        !self.methods.is_empty()
    }

    /// Whether consumers only ever see the [`Proxy`].
    ///
    /// True once any method is async-marked. Plain fields, parameters,
    /// `get::<C>()` and non-proxied bindings of such a component fail with
    /// [`ContainerError::TypeMismatch`].
    pub fn is_sealed(&self) -> bool {
        self.methods
            .iter()
            .any(|spec| matches!(spec.behavior, MethodBehavior::Async { .. }))
    }

    /// Executor of an async-marked method.
    pub fn executor_of(&self, method: &str) -> Option<&str> {
        self.methods.iter().find_map(|spec| match &spec.behavior {
            MethodBehavior::Async { executor } if spec.method == method => Some(executor.as_str()),
            _ => None,
        })
    }

    pub(crate) fn construct(&self, arguments: &mut Arguments) -> ContainerResult<Instance> {
        (self.construct)(arguments)
    }

    pub(crate) fn intercept(
        &self,
        raw: Instance,
        executors: &Arc<ExecutorRegistry>,
    ) -> ContainerResult<Instance> {
        (self.intercept)(raw, executors)
    }

    pub(crate) fn initialize(&self, instance: &Instance) -> ContainerResult<()> {
        match &self.initializer {
            Some(init) => init(instance),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ComponentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("fields", &self.fields)
            .field("values", &self.values)
            .field("methods", &self.methods)
            .field("initializer", &self.has_initializer())
            .finish()
    }
}

// ─── DescriptorBuilder ───────────────────────────────────────────────────────

/// Typed builder for a [`ComponentDescriptor`].
///
/// Field and property accessors are plain function pointers from the
/// component to its slot, so the declarations stay next to the struct
/// without any runtime introspection.
pub struct DescriptorBuilder<C> {
    key: TypeKey,
    name: &'static str,
    params: Vec<ParamSpec>,
    construct: ConstructFn,
    fields: Vec<FieldSpec>,
    values: Vec<ValueSpec>,
    methods: Vec<MethodSpec>,
    initializer: Option<InitFn>,
    _marker: std::marker::PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static> DescriptorBuilder<C> {
    fn new<F>(constructor: F) -> Self
    where
        F: Fn(&mut Arguments) -> ContainerResult<C> + Send + Sync + 'static,
    {
        Self {
            key: TypeKey::of::<C>(),
            name: std::any::type_name::<C>(),
            params: Vec::new(),
            construct: Box::new(move |args: &mut Arguments| {
                constructor(args).map(|c| Instance::new(Arc::new(c)))
            }),
            fields: Vec::new(),
            values: Vec::new(),
            methods: Vec::new(),
            initializer: None,
            _marker: std::marker::PhantomData,
        }
    }

    // ─── Constructor parameters ──────────────────────────────────────────────

    /// Declares the next constructor parameter.
    pub fn param<T: ?Sized + 'static>(mut self) -> Self {
        self.params.push(ParamSpec {
            target: TypeKey::of::<T>(),
            named: None,
        });
        self
    }

    /// Declares the next constructor parameter, preferring the named instance `key`.
    pub fn named_param<T: ?Sized + 'static>(mut self, key: impl Into<String>) -> Self {
        self.params.push(ParamSpec {
            target: TypeKey::of::<T>(),
            named: Some(key.into()),
        });
        self
    }

    // ─── Fields ──────────────────────────────────────────────────────────────

    /// Declares an eagerly wired field.
    pub fn field<T>(self, name: &'static str, slot: fn(&C) -> &Inject<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.push_field::<T, T>(name, None, slot)
    }

    /// Declares a field that prefers the named instance `key`.
    pub fn named_field<T>(
        self,
        name: &'static str,
        key: impl Into<String>,
        slot: fn(&C) -> &Inject<T>,
    ) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.push_field::<T, T>(name, Some(key.into()), slot)
    }

    /// Declares a field holding the intercepting [`Proxy`] of component `P`.
    pub fn proxy_field<P>(self, name: &'static str, slot: fn(&C) -> &Inject<Proxy<P>>) -> Self
    where
        P: Send + Sync + 'static,
    {
        self.push_field::<P, Proxy<P>>(name, None, slot)
    }

    fn push_field<K, T>(
        mut self,
        name: &'static str,
        named: Option<String>,
        slot: fn(&C) -> &Inject<T>,
    ) -> Self
    where
        K: ?Sized + 'static,
        T: ?Sized + Send + Sync + 'static,
    {
        let owner = self.key;
        self.fields.push(FieldSpec {
            name,
            target: TypeKey::of::<K>(),
            named,
            lazy: false,
            inject: Box::new(move |target: &Instance, value: &Instance| {
                let component = target.expect_raw::<C>(owner)?;
                let value = value.expect_type::<T>(TypeKey::of::<K>())?;
                slot(&component).set(value);
                Ok(())
            }),
            defer: None,
        });
        self
    }

    /// Declares a deferred field, resolved on first [`Lazy::get`].
    ///
    /// A lazy edge never recurses during construction, which is what lets it
    /// close a dependency cycle.
    pub fn lazy_field<T>(mut self, name: &'static str, slot: fn(&C) -> &Lazy<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let owner = self.key;
        let target = TypeKey::of::<T>();
        self.fields.push(FieldSpec {
            name,
            target,
            named: None,
            lazy: true,
            inject: Box::new(move |component: &Instance, value: &Instance| {
                let component = component.expect_raw::<C>(owner)?;
                slot(&component).fill(value.expect_type::<T>(target)?);
                Ok(())
            }),
            defer: Some(Box::new(move |component: &Instance, resolve: DeferredResolve| {
                let component = component.expect_raw::<C>(owner)?;
                slot(&component).bind(resolve);
                Ok(())
            })),
        });
        self
    }

    // ─── Properties ──────────────────────────────────────────────────────────

    /// Declares a property field filled from `placeholder` (`"${name}"`).
    pub fn value<T>(
        mut self,
        name: &'static str,
        placeholder: impl Into<String>,
        slot: fn(&C) -> &Property<T>,
    ) -> Self
    where
        T: FromStr + Send + Sync + 'static,
        T::Err: fmt::Display,
    {
        let owner = self.key;
        let placeholder = placeholder.into();
        let declared = placeholder.clone();
        self.values.push(ValueSpec {
            name,
            placeholder,
            apply: Box::new(move |component: &Instance, properties: &Properties| {
                let parsed = properties.resolve_as::<T>(&declared)?;
                let component = component.expect_raw::<C>(owner)?;
                slot(&component).set(parsed);
                Ok(())
            }),
        });
        self
    }

    // ─── Methods ─────────────────────────────────────────────────────────────

    /// Marks `method` as async on the default `"application"` pool.
    pub fn async_method(self, method: &'static str) -> Self {
        self.async_method_on(method, DEFAULT_EXECUTOR)
    }

    /// Marks `method` as async on the named pool.
    ///
    /// The pool is looked up when the method is invoked, not here.
    pub fn async_method_on(mut self, method: &'static str, executor: impl Into<String>) -> Self {
        self.methods.push(MethodSpec {
            method,
            behavior: MethodBehavior::Async {
                executor: executor.into(),
            },
            bind: None,
        });
        self
    }

    /// Subscribes `method` to events of type `E`.
    ///
    /// `handler` receives the raw component. If `method` is also async-marked
    /// the bus delivers through that method's pool.
    pub fn listener<E, F>(mut self, method: &'static str, handler: F) -> Self
    where
        E: Send + Sync + 'static,
        F: Fn(&C, &E) + Send + Sync + 'static,
    {
        let owner = self.key;
        let name = self.name;
        let handler = Arc::new(handler);
        self.methods.push(MethodSpec {
            method,
            behavior: MethodBehavior::EventListener {
                event: Some(TypeKey::of::<E>()),
            },
            bind: Some(Box::new(move |raw: &Instance| {
                let target = raw.expect_raw::<C>(owner)?;
                let handler = Arc::clone(&handler);
                Ok(Listener::new(name, method, move |event: &E| {
                    handler(target.as_ref(), event)
                }))
            })),
        });
        self
    }

    /// Marks a method that takes no event payload as a listener.
    ///
    /// Such a method cannot be routed; resolving the component fails with
    /// [`ContainerError::InvalidListener`].
    pub fn payloadless_listener<F>(mut self, method: &'static str, handler: F) -> Self
    where
        F: Fn(&C) + Send + Sync + 'static,
    {
        let owner = self.key;
        let name = self.name;
        let handler = Arc::new(handler);
        self.methods.push(MethodSpec {
            method,
            behavior: MethodBehavior::EventListener { event: None },
            bind: Some(Box::new(move |raw: &Instance| {
                let target = raw.expect_raw::<C>(owner)?;
                let handler = Arc::clone(&handler);
                Ok(Listener::without_payload(name, method, move || {
                    handler(target.as_ref())
                }))
            })),
        });
        self
    }

    // ─── Hooks ───────────────────────────────────────────────────────────────

    /// Runs `hook` once the component is fully wired.
    ///
    /// An error aborts the resolution with [`ContainerError::InitializerFailed`].
    pub fn initializer<F>(mut self, hook: F) -> Self
    where
        F: Fn(&C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let owner = self.key;
        let name = self.name;
        self.initializer = Some(Box::new(move |instance: &Instance| {
            let component = instance.expect_raw::<C>(owner)?;
            hook(&component).map_err(|source| ContainerError::InitializerFailed {
                component: name,
                source,
            })
        }));
        self
    }

    /// Finishes the descriptor.
    pub fn build(self) -> ComponentDescriptor {
        let owner = self.key;
        let name = self.name;
        let sealed = self
            .methods
            .iter()
            .any(|spec| matches!(spec.behavior, MethodBehavior::Async { .. }));
        let async_methods: Arc<HashMap<&'static str, String>> = Arc::new(
            self.methods
                .iter()
                .filter_map(|spec| match &spec.behavior {
                    MethodBehavior::Async { executor } => Some((spec.method, executor.clone())),
                    MethodBehavior::EventListener { .. } => None,
                })
                .collect(),
        );

        ComponentDescriptor {
            key: self.key,
            name: self.name,
            params: self.params,
            construct: self.construct,
            fields: self.fields,
            values: self.values,
            methods: self.methods,
            initializer: self.initializer,
            intercept: Box::new(move |raw: Instance, executors: &Arc<ExecutorRegistry>| {
                let target = raw.expect_raw::<C>(owner)?;
                let proxy = Proxy::new(
                    target,
                    name,
                    Arc::clone(&async_methods),
                    Arc::clone(executors),
                );
                Ok(raw.with_proxy(Arc::new(proxy), sealed))
            }),
        }
    }
}

impl<C> fmt::Debug for DescriptorBuilder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorBuilder")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .field("fields", &self.fields.len())
            .field("methods", &self.methods.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Clock;

    struct Scheduler {
        clock: Inject<Clock>,
        later: Lazy<Clock>,
        interval: Property<u64>,
    }

    struct Tick;

    fn scheduler_descriptor() -> ComponentDescriptor {
        ComponentDescriptor::builder(|_| {
            Ok(Scheduler {
                clock: Inject::new(),
                later: Lazy::new(),
                interval: Property::new(),
            })
        })
        .field::<Clock>("clock", |s| &s.clock)
        .lazy_field::<Clock>("later", |s| &s.later)
        .value("interval", "${scheduler.interval}", |s| &s.interval)
        .async_method_on("run", "timers")
        .listener::<Tick, _>("run", |_, _| {})
        .build()
    }

    #[test]
    fn test_descriptor_metadata() {
        let descriptor = scheduler_descriptor();
        assert_eq!(descriptor.key(), TypeKey::of::<Scheduler>());
        assert_eq!(descriptor.fields().len(), 2);
        assert!(!descriptor.fields()[0].is_lazy());
        assert!(descriptor.fields()[1].is_lazy());
        assert_eq!(descriptor.values()[0].placeholder(), "${scheduler.interval}");
        assert_eq!(descriptor.executor_of("run"), Some("timers"));
        assert_eq!(descriptor.executor_of("stop"), None);
        assert!(descriptor.is_intercepted());
        assert!(!descriptor.has_initializer());
    }

    #[test]
    fn test_field_and_value_wiring() {
        let descriptor = scheduler_descriptor();
        let instance = descriptor.construct(&mut Arguments::new("test", Vec::new())).unwrap();
        let clock = Instance::new(Arc::new(Clock));

        descriptor.fields()[0].inject(&instance, &clock).unwrap();
        let props: Properties = [("scheduler.interval", "30")].into_iter().collect();
        descriptor.values()[0].apply(&instance, &props).unwrap();

        let scheduler = instance.downcast::<Scheduler>().unwrap();
        assert!(scheduler.clock.is_wired());
        assert!(!scheduler.later.is_resolved());
        assert_eq!(*scheduler.interval, 30);
    }

    #[test]
    fn test_arguments_cursor() {
        let mut args = Arguments::new(
            "test",
            vec![
                (TypeKey::of::<u32>(), Instance::new(Arc::new(5u32))),
                (TypeKey::of::<String>(), Instance::new(Arc::new("x".to_string()))),
            ],
        );
        assert_eq!(*args.next::<u32>().unwrap(), 5);
        assert!(matches!(
            args.next::<u32>(),
            Err(ContainerError::TypeMismatch { .. })
        ));
        assert!(matches!(
            args.next::<u32>(),
            Err(ContainerError::UnresolvedDependency { .. })
        ));
    }

    #[test]
    fn test_initializer_error_is_wrapped() {
        let descriptor = ComponentDescriptor::with_default::<u8>()
            .initializer(|_| Err("not ready".into()))
            .build();
        let instance = descriptor.construct(&mut Arguments::new("u8", Vec::new())).unwrap();
        assert!(matches!(
            descriptor.initialize(&instance),
            Err(ContainerError::InitializerFailed { .. })
        ));
    }
}
