//! The interception layer.
//!
//! A component that declares async or event-listener methods is wrapped in a
//! [`Proxy`] right after construction. The proxy forwards every call to the
//! raw target, and for async-marked methods it moves the call onto the
//! method's named executor. Once a component has an async method, the
//! container only hands out its proxy.
//!
//! Capability traits are implemented for `Proxy<C>` by forwarding through the
//! intercepting entry points, then bound with
//! [`Implementation::proxied`](crate::Implementation::proxied):
//!
//! ```rust,ignore
//! impl Notifier for Proxy<EmailNotifier> {
//!     fn notify(&self, to: String) -> ContainerResult<()> {
//!         self.spawn("notify", move |target| target.notify(to))
//!     }
//!
//!     fn render(&self, id: u64) -> ContainerResult<AsyncResult<String>> {
//!         self.submit("render", move |target| target.render(id))
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::{BoxError, ContainerError, ContainerResult};
use crate::executor::{AsyncResult, ExecutorRegistry};

/// Call-interposing stand-in for a component.
pub struct Proxy<C> {
    target: Arc<C>,
    component: &'static str,
    /// Method name → executor name.
    async_methods: Arc<HashMap<&'static str, String>>,
    executors: Arc<ExecutorRegistry>,
}

impl<C: Send + Sync + 'static> Proxy<C> {
    pub(crate) fn new(
        target: Arc<C>,
        component: &'static str,
        async_methods: Arc<HashMap<&'static str, String>>,
        executors: Arc<ExecutorRegistry>,
    ) -> Self {
        Self {
            target,
            component,
            async_methods,
            executors,
        }
    }

    /// The raw component.
    pub fn target(&self) -> &Arc<C> {
        &self.target
    }

    /// Whether `method` is async-marked.
    pub fn is_async(&self, method: &str) -> bool {
        self.async_methods.contains_key(method)
    }

    /// Executor declared for `method`.
    pub fn executor_of(&self, method: &str) -> Option<&str> {
        self.async_methods.get(method).map(String::as_str)
    }

    /// Forwards a plain call to the target on the current thread.
    ///
    /// Async-marked methods belong in [`spawn`](Self::spawn) or
    /// [`submit`](Self::submit); forwarding one here runs it inline.
    pub fn call<R>(&self, method: &'static str, f: impl FnOnce(&C) -> R) -> R {
        if self.is_async(method) {
            warn!(component = self.component, method, "Async method called inline");
        } else {
            trace!(component = self.component, method, "Forwarding call");
        }
        f(&self.target)
    }

    /// Invokes a method that returns nothing.
    ///
    /// Async-marked methods are handed to their executor and this returns
    /// before the body necessarily runs. Only submission can fail; a panic
    /// in the body is logged by the pool. Other methods run inline.
    pub fn spawn<F>(&self, method: &'static str, f: F) -> ContainerResult<()>
    where
        F: FnOnce(&C) + Send + 'static,
    {
        match self.executor_of(method) {
            Some(executor) => {
                let pool = self.executors.get(executor)?;
                let target = Arc::clone(&self.target);
                trace!(component = self.component, method, executor, "Dispatching async call");
                pool.execute(move || f(&target))
            }
            None => {
                self.call(method, f);
                Ok(())
            }
        }
    }

    /// Invokes a method that returns a value.
    ///
    /// The returned handle resolves to the method's return value. A panic in
    /// an async body surfaces as [`ContainerError::AsyncTaskFailed`] when the
    /// handle is observed.
    pub fn submit<F, R>(&self, method: &'static str, f: F) -> ContainerResult<AsyncResult<R>>
    where
        F: FnOnce(&C) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.try_submit(method, move |target| Ok::<R, BoxError>(f(target)))
    }

    /// Invokes a fallible method that returns a value.
    ///
    /// An `Err` from the body is rewrapped as
    /// [`ContainerError::AsyncTaskFailed`] with the original error as source.
    pub fn try_submit<F, R, E>(&self, method: &'static str, f: F) -> ContainerResult<AsyncResult<R>>
    where
        F: FnOnce(&C) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let rewrap = move |result: Result<R, E>| {
            result.map_err(|e| ContainerError::AsyncTaskFailed {
                method,
                source: e.into(),
            })
        };

        match self.executor_of(method) {
            Some(executor) => {
                let pool = self.executors.get(executor)?;
                let target = Arc::clone(&self.target);
                trace!(component = self.component, method, executor, "Submitting async call");
                let handle = pool.submit(move || rewrap(f(&target)))?;
                Ok(AsyncResult::pending(method, handle))
            }
            None => Ok(AsyncResult::ready(method, rewrap(self.call(method, f)))),
        }
    }
}

impl<C> fmt::Debug for Proxy<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.async_methods.iter().collect();
        methods.sort();
        f.debug_struct("Proxy")
            .field("component", &self.component)
            .field("async_methods", &methods)
            .finish()
    }
}
