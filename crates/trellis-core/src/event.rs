//! Synchronous / asynchronous event delivery.
//!
//! The [`EventBus`] maps an event payload type to the ordered list of
//! [`Listener`]s subscribed to it. [`publish`](EventBus::publish) delivers an
//! event to every listener registered for its **exact** type, in subscription
//! order. Listeners bound to an executor are handed to that pool instead of
//! running on the publishing thread.
//!
//! Listeners are usually created by the container from a component's
//! `listener` declarations, but may also be subscribed by hand:
//!
//! ```rust,ignore
//! bus.subscribe(Listener::new("audit", "on_login", |e: &LoginEvent| {
//!     println!("login: {}", e.user);
//! }))?;
//! bus.publish(LoginEvent { user: "ada".into() })?;
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{ContainerError, ContainerResult};
use crate::executor::ExecutorRegistry;
use crate::key::TypeKey;

/// Shared, type-erased event payload.
pub type EventArc = Arc<dyn Any + Send + Sync>;

type ListenerFn = Arc<dyn Fn(&(dyn Any + Send + Sync)) + Send + Sync>;

// ─── Listener ────────────────────────────────────────────────────────────────

/// One subscription: a target method bound to an event payload type.
pub struct Listener {
    component: &'static str,
    method: &'static str,
    /// `None` when the method declares no payload parameter.
    event: Option<TypeKey>,
    executor: Option<String>,
    handler: ListenerFn,
}

impl Listener {
    /// Creates a listener for payload type `E`.
    pub fn new<E, F>(component: &'static str, method: &'static str, handler: F) -> Self
    where
        E: Any + Send + Sync,
        F: Fn(&E) + Send + Sync + 'static,
    {
        Self {
            component,
            method,
            event: Some(TypeKey::of::<E>()),
            executor: None,
            handler: Arc::new(move |event: &(dyn Any + Send + Sync)| {
                if let Some(event) = event.downcast_ref::<E>() {
                    handler(event);
                }
            }),
        }
    }

    /// Creates a listener whose method takes no payload.
    ///
    /// Such a listener cannot be routed; [`EventBus::subscribe`] rejects it
    /// with [`ContainerError::InvalidListener`].
    pub fn without_payload<F>(component: &'static str, method: &'static str, handler: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            component,
            method,
            event: None,
            executor: None,
            handler: Arc::new(move |_: &(dyn Any + Send + Sync)| handler()),
        }
    }

    /// Delivers through the named pool instead of the publishing thread.
    pub fn on_executor(mut self, executor: impl Into<String>) -> Self {
        self.executor = Some(executor.into());
        self
    }

    /// Owning component name.
    pub fn component(&self) -> &'static str {
        self.component
    }

    /// Target method name.
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Payload type this listener receives.
    pub fn event_type(&self) -> Option<TypeKey> {
        self.event
    }

    /// Pool used for delivery, if asynchronous.
    pub fn executor(&self) -> Option<&str> {
        self.executor.as_deref()
    }

    /// Returns the routing key, or [`ContainerError::InvalidListener`].
    pub(crate) fn routing_key(&self) -> ContainerResult<TypeKey> {
        self.event.ok_or(ContainerError::InvalidListener {
            component: self.component,
            method: self.method,
        })
    }

    fn deliver(&self, event: &EventArc, executors: &ExecutorRegistry) -> ContainerResult<()> {
        match &self.executor {
            Some(name) => {
                let pool = executors.get(name)?;
                let handler = Arc::clone(&self.handler);
                let event = Arc::clone(event);
                pool.execute(move || handler(event.as_ref()))
            }
            None => {
                (self.handler)(event.as_ref());
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("component", &self.component)
            .field("method", &self.method)
            .field("event", &self.event)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

// ─── EventBus ────────────────────────────────────────────────────────────────

/// Routes published events to their subscribed listeners.
///
/// There is no unsubscribe: listeners live as long as the bus.
pub struct EventBus {
    listeners: RwLock<HashMap<TypeKey, Vec<Arc<Listener>>>>,
    executors: Arc<ExecutorRegistry>,
}

impl EventBus {
    /// Creates an empty bus that dispatches asynchronous listeners through `executors`.
    pub fn new(executors: Arc<ExecutorRegistry>) -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            executors,
        }
    }

    /// Appends a listener for its payload type.
    pub fn subscribe(&self, listener: Listener) -> ContainerResult<()> {
        let key = listener.routing_key()?;
        debug!(
            event = %key,
            component = listener.component,
            method = listener.method,
            "Listener subscribed"
        );
        self.listeners
            .write()
            .entry(key)
            .or_default()
            .push(Arc::new(listener));
        Ok(())
    }

    /// Delivers `event` to every listener of type `E`, in subscription order.
    ///
    /// Returns how many listeners received (or were handed) the event.
    /// Delivery stops at the first listener whose executor cannot accept
    /// work; listeners before it have already run.
    pub fn publish<E: Any + Send + Sync>(&self, event: E) -> ContainerResult<usize> {
        let key = TypeKey::of::<E>();
        // Snapshot so listeners may publish or subscribe re-entrantly.
        let listeners: Vec<Arc<Listener>> = match self.listeners.read().get(&key) {
            Some(list) => list.clone(),
            None => {
                trace!(event = %key, "No listeners for event");
                return Ok(0);
            }
        };

        let event: EventArc = Arc::new(event);
        for listener in &listeners {
            trace!(
                event = %key,
                component = listener.component,
                method = listener.method,
                "Delivering event"
            );
            listener.deliver(&event, &self.executors)?;
        }
        Ok(listeners.len())
    }

    /// Number of listeners subscribed to `E`.
    pub fn listener_count<E: Any>(&self) -> usize {
        self.listeners
            .read()
            .get(&TypeKey::of::<E>())
            .map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.read();
        let counts: HashMap<&'static str, usize> =
            listeners.iter().map(|(k, v)| (k.name(), v.len())).collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}
