//! Injection slots embedded in component structs.
//!
//! Components own their dependencies through write-once slots that the
//! container fills after the constructor returns:
//!
//! - [`Inject<T>`]: an eagerly wired dependency.
//! - [`Lazy<T>`]: a deferred handle resolved on first use; breaks cycles.
//! - [`Property<T>`]: a configuration value parsed from a `${...}` placeholder.
//!
//! ```rust,ignore
//! struct OrderService {
//!     audit: Inject<AuditLog>,
//!     mailer: Lazy<dyn Mailer>,
//!     currency: Property<String>,
//! }
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use crate::error::{ContainerError, ContainerResult};
use crate::instance::Instance;
use crate::key::TypeKey;

// ─── Inject ──────────────────────────────────────────────────────────────────

/// A field dependency wired once after construction.
///
/// # Panics
///
/// Dereferencing an unwired slot panics. Slots declared in the component's
/// descriptor are always wired before the instance leaves the container; use
/// [`get`](Self::get) when touching a peer from inside an initializer of a
/// cycle.
pub struct Inject<T: ?Sized> {
    cell: OnceLock<Arc<T>>,
}

impl<T: ?Sized> Inject<T> {
    /// Creates an empty slot.
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Creates a slot that is already wired.
    pub fn with(value: Arc<T>) -> Self {
        let slot = Self::new();
        let _ = slot.cell.set(value);
        slot
    }

    /// Returns the wired value, if any.
    pub fn get(&self) -> Option<&Arc<T>> {
        self.cell.get()
    }

    /// Whether the container has wired this slot.
    pub fn is_wired(&self) -> bool {
        self.cell.get().is_some()
    }

    pub(crate) fn set(&self, value: Arc<T>) -> bool {
        self.cell.set(value).is_ok()
    }
}

impl<T: ?Sized> Default for Inject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Deref for Inject<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.cell.get() {
            Some(value) => value,
            None => panic!(
                "Inject<{}> dereferenced before it was wired",
                std::any::type_name::<T>()
            ),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Inject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inject")
            .field("type", &std::any::type_name::<T>())
            .field("wired", &self.is_wired())
            .finish()
    }
}

// ─── Lazy ────────────────────────────────────────────────────────────────────

/// Resolves the erased instance behind a deferred handle, flagging whether it
/// is committed to the container and may be cached.
pub(crate) type DeferredResolve =
    Box<dyn Fn() -> ContainerResult<(Instance, bool)> + Send + Sync>;

/// A deferred dependency.
///
/// The container binds the slot to "resolve `T` later" instead of recursing
/// into `T` during construction. The first [`get`](Self::get) performs the
/// real resolution and caches the result in place of the handle; later calls
/// return the cached value.
///
/// A `get` made while another resolution is still open (from a constructor
/// or initializer) returns the instance without caching it, since that
/// resolution may still fail and discard it.
pub struct Lazy<T: ?Sized> {
    cell: OnceLock<Arc<T>>,
    source: OnceLock<DeferredResolve>,
}

impl<T: ?Sized + 'static> Lazy<T> {
    /// Creates an unbound handle.
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
            source: OnceLock::new(),
        }
    }

    /// Returns the dependency, resolving it on first use.
    pub fn get(&self) -> ContainerResult<Arc<T>> {
        if let Some(value) = self.cell.get() {
            return Ok(Arc::clone(value));
        }
        let resolve = self.source.get().ok_or_else(|| {
            ContainerError::unresolved(
                std::any::type_name::<T>(),
                "lazy handle was never bound by the container",
            )
        })?;
        let (instance, committed) = resolve()?;
        let value = instance.expect_type::<T>(TypeKey::of::<T>())?;
        if !committed {
            return Ok(value);
        }
        // Another thread may have won the race; both resolved the same singleton.
        let _ = self.cell.set(Arc::clone(&value));
        Ok(self.cell.get().map_or(value, Arc::clone))
    }

    /// Whether the real instance has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.cell.get().is_some()
    }

    pub(crate) fn fill(&self, value: Arc<T>) -> bool {
        self.cell.set(value).is_ok()
    }

    pub(crate) fn bind(&self, resolve: DeferredResolve) -> bool {
        self.source.set(resolve).is_ok()
    }
}

impl<T: ?Sized + 'static> Default for Lazy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("type", &std::any::type_name::<T>())
            .field("resolved", &self.cell.get().is_some())
            .finish()
    }
}

// ─── Property ────────────────────────────────────────────────────────────────

/// A configuration value injected from a `${name}` placeholder.
///
/// # Panics
///
/// Dereferencing before the property resolver ran panics.
pub struct Property<T = String> {
    cell: OnceLock<T>,
}

impl<T> Property<T> {
    /// Creates an empty slot.
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Returns the resolved value, if any.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    pub(crate) fn set(&self, value: T) -> bool {
        self.cell.set(value).is_ok()
    }
}

impl<T> Default for Property<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deref for Property<T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.cell.get() {
            Some(value) => value,
            None => panic!(
                "Property<{}> dereferenced before it was resolved",
                std::any::type_name::<T>()
            ),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Property").field(&self.cell.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_write_once() {
        let slot: Inject<u32> = Inject::new();
        assert!(!slot.is_wired());
        assert!(slot.set(Arc::new(1)));
        assert!(!slot.set(Arc::new(2)));
        assert_eq!(*slot, 1);
    }

    #[test]
    #[should_panic(expected = "before it was wired")]
    fn test_inject_deref_unwired_panics() {
        let slot: Inject<u32> = Inject::new();
        let _ = *slot;
    }

    #[test]
    fn test_lazy_resolves_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy: Lazy<String> = Lazy::new();
        assert!(lazy.bind(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok((Instance::new(Arc::new("ready".to_string())), true))
        })));

        assert!(!lazy.is_resolved());
        assert_eq!(*lazy.get().unwrap(), "ready");
        assert_eq!(*lazy.get().unwrap(), "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unbound_lazy_errors() {
        let lazy: Lazy<String> = Lazy::new();
        assert!(matches!(
            lazy.get(),
            Err(ContainerError::UnresolvedDependency { .. })
        ));
    }
}
