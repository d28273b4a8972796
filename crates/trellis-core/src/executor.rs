//! Named worker pools for asynchronous method execution.
//!
//! Each [`NamedExecutor`] is a dedicated multi-threaded tokio runtime with a
//! fixed number of worker threads. Pools are created once when the container
//! is built and live until the container is dropped; they are never resized.
//!
//! Work submitted to a pool is ordinary synchronous code; it occupies one
//! worker for its whole duration.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ContainerError, ContainerResult};

/// Name of the pool created when async support is enabled without explicit pools.
pub const DEFAULT_EXECUTOR: &str = "application";

/// Worker count of the default pool.
pub const DEFAULT_WORKERS: usize = 16;

// ─── NamedExecutor ───────────────────────────────────────────────────────────

/// A fixed-size worker pool identified by name.
pub struct NamedExecutor {
    name: String,
    workers: usize,
    /// `None` once the pool has been shut down.
    runtime: Mutex<Option<Runtime>>,
}

impl NamedExecutor {
    /// Starts a pool with `workers` threads named `<name>-worker`.
    pub fn new(name: impl Into<String>, workers: usize) -> ContainerResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ContainerError::InvalidExecutor {
                name,
                reason: "pool name must not be empty".into(),
            });
        }
        if workers == 0 {
            return Err(ContainerError::InvalidExecutor {
                name,
                reason: "worker count must be greater than 0".into(),
            });
        }

        let runtime = Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name(format!("{name}-worker"))
            .enable_time()
            .build()
            .map_err(|e| ContainerError::InvalidExecutor {
                name: name.clone(),
                reason: e.to_string(),
            })?;

        info!(executor = %name, workers, "Executor pool started");

        Ok(Self {
            name,
            workers,
            runtime: Mutex::new(Some(runtime)),
        })
    }

    /// The pool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.runtime.lock().is_none()
    }

    /// Runs `f` on the pool without waiting for it.
    ///
    /// Only submission can fail. A panic inside `f` is logged and otherwise
    /// dropped, since nobody observes the outcome.
    pub fn execute<F>(&self, f: F) -> ContainerResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.runtime.lock();
        let runtime = guard.as_ref().ok_or_else(|| ContainerError::ExecutorShutdown {
            name: self.name.clone(),
        })?;

        let name = self.name.clone();
        runtime.spawn(async move {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
                warn!(
                    executor = %name,
                    panic = %panic_message(&*panic),
                    "Fire-and-forget task panicked"
                );
            }
        });
        Ok(())
    }

    /// Runs `f` on the pool and returns a handle to its output.
    pub fn submit<F, R>(&self, f: F) -> ContainerResult<JoinHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let guard = self.runtime.lock();
        let runtime = guard.as_ref().ok_or_else(|| ContainerError::ExecutorShutdown {
            name: self.name.clone(),
        })?;
        Ok(runtime.spawn(async move { f() }))
    }

    /// Stops accepting work and waits up to `timeout` for running tasks.
    ///
    /// Must not be called from inside an async context.
    pub fn shutdown(&self, timeout: Duration) {
        let runtime = self.runtime.lock().take();
        if let Some(runtime) = runtime {
            runtime.shutdown_timeout(timeout);
            info!(executor = %self.name, "Executor pool stopped");
        }
    }
}

impl Drop for NamedExecutor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for NamedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedExecutor")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ─── ExecutorRegistry ────────────────────────────────────────────────────────

/// All named pools known to a container.
///
/// Pools are looked up by name at invocation time, so a descriptor may refer
/// to a pool that does not exist; the failure surfaces on first use as
/// [`ContainerError::ExecutorNotFound`].
#[derive(Default)]
pub struct ExecutorRegistry {
    pools: RwLock<HashMap<String, Arc<NamedExecutor>>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts and registers a pool.
    pub fn register(
        &self,
        name: impl Into<String>,
        workers: usize,
    ) -> ContainerResult<Arc<NamedExecutor>> {
        let name = name.into();
        let mut pools = self.pools.write();
        if pools.contains_key(&name) {
            return Err(ContainerError::duplicate(format!("executor:{name}")));
        }
        let pool = Arc::new(NamedExecutor::new(name.clone(), workers)?);
        pools.insert(name, Arc::clone(&pool));
        Ok(pool)
    }

    /// Looks up a pool by name.
    pub fn get(&self, name: &str) -> ContainerResult<Arc<NamedExecutor>> {
        self.pools
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::ExecutorNotFound {
                name: name.to_string(),
            })
    }

    /// Whether a pool with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.pools.read().contains_key(name)
    }

    /// Registered pool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Shuts every pool down, waiting up to `timeout` for each.
    pub fn shutdown(&self, timeout: Duration) {
        let pools: Vec<Arc<NamedExecutor>> = self.pools.read().values().cloned().collect();
        for pool in pools {
            debug!(executor = %pool.name(), "Shutting down executor pool");
            pool.shutdown(timeout);
        }
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("pools", &self.names())
            .finish()
    }
}

// ─── AsyncResult ─────────────────────────────────────────────────────────────

enum State<R> {
    Ready(Option<ContainerResult<R>>),
    Pending(JoinHandle<ContainerResult<R>>),
}

/// Handle to the result of an intercepted async method.
///
/// Resolves to the method's return value once the background execution
/// completes. Failures (an `Err` returned by the method, or a panic) are
/// rewrapped as [`ContainerError::AsyncTaskFailed`].
///
/// Await it from async code or call [`wait`](Self::wait) to block the
/// current thread. Dropping the handle does not cancel the task.
pub struct AsyncResult<R> {
    method: &'static str,
    state: State<R>,
}

impl<R> AsyncResult<R> {
    pub(crate) fn ready(method: &'static str, value: ContainerResult<R>) -> Self {
        Self {
            method,
            state: State::Ready(Some(value)),
        }
    }

    pub(crate) fn pending(method: &'static str, handle: JoinHandle<ContainerResult<R>>) -> Self {
        Self {
            method,
            state: State::Pending(handle),
        }
    }

    /// The intercepted method this handle belongs to.
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Whether the background execution has completed.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            State::Ready(_) => true,
            State::Pending(handle) => handle.is_finished(),
        }
    }

    /// Blocks the current thread until the result is available.
    pub fn wait(self) -> ContainerResult<R> {
        futures::executor::block_on(self)
    }
}

// The result value is never pinned in place; it is moved out on completion.
impl<R> Unpin for AsyncResult<R> {}

impl<R> Future for AsyncResult<R> {
    type Output = ContainerResult<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let method = this.method;
        match &mut this.state {
            State::Ready(value) => match value.take() {
                Some(value) => Poll::Ready(value),
                None => panic!("AsyncResult for '{method}' polled after completion"),
            },
            State::Pending(handle) => Pin::new(handle).poll(cx).map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(ContainerError::AsyncTaskFailed {
                    method,
                    source: Box::new(e),
                }),
            }),
        }
    }
}

impl<R> std::fmt::Debug for AsyncResult<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncResult")
            .field("method", &self.method)
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_register_and_lookup() {
        let registry = ExecutorRegistry::new();
        registry.register("io", 2).unwrap();

        assert_eq!(registry.get("io").unwrap().workers(), 2);
        assert!(matches!(
            registry.get("cpu"),
            Err(ContainerError::ExecutorNotFound { .. })
        ));
        assert!(matches!(
            registry.register("io", 4),
            Err(ContainerError::DuplicateRegistration { .. })
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            NamedExecutor::new("empty", 0),
            Err(ContainerError::InvalidExecutor { .. })
        ));
    }

    #[test]
    fn test_execute_runs_on_worker_thread() {
        let pool = NamedExecutor::new("probe", 1).unwrap();
        let (tx, rx) = mpsc::channel();
        pool.execute(move || {
            let name = std::thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        })
        .unwrap();

        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("probe-worker"));
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let pool = NamedExecutor::new("closing", 1).unwrap();
        pool.shutdown(Duration::from_secs(1));
        assert!(pool.is_shutdown());
        assert!(matches!(
            pool.execute(|| {}),
            Err(ContainerError::ExecutorShutdown { .. })
        ));
    }

    #[test]
    fn test_async_result_wait_and_panic() {
        let pool = NamedExecutor::new("math", 1).unwrap();
        let ok = AsyncResult::pending("add", pool.submit(|| Ok(2 + 2)).unwrap());
        assert_eq!(ok.wait().unwrap(), 4);

        let failed: AsyncResult<u32> =
            AsyncResult::pending("boom", pool.submit(|| panic!("boom")).unwrap());
        assert!(matches!(
            failed.wait(),
            Err(ContainerError::AsyncTaskFailed { method: "boom", .. })
        ));
    }
}
