//! Type-erased shared instances.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{ContainerError, ContainerResult};
use crate::key::TypeKey;

/// Erased value stored in the registries.
///
/// The inner `dyn Any` is always an `Arc<X>` (possibly `Arc<dyn Trait>`), so
/// unsized interface values round-trip through the same map as concrete
/// components.
pub type ErasedArc = Arc<dyn Any + Send + Sync>;

/// A cheaply clonable handle to one shared value.
///
/// Intercepted components carry two views: the raw target and the
/// [`Proxy`](crate::proxy::Proxy) stand-in. [`downcast`](Self::downcast)
/// prefers the stand-in, so anything asking for the wrapped form gets it.
/// A component with async methods is *sealed*: its raw view is only
/// reachable from inside the container, so consumers cannot call an
/// async-marked method on the caller's thread by accident.
#[derive(Clone)]
pub struct Instance {
    value: ErasedArc,
    proxy: Option<ErasedArc>,
    sealed: bool,
    type_name: &'static str,
}

impl Instance {
    /// Erases a shared value.
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self {
            value: Arc::new(value),
            proxy: None,
            sealed: false,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Attaches the intercepting stand-in for this value.
    ///
    /// A `sealed` value hides its raw view from [`downcast`](Self::downcast).
    pub(crate) fn with_proxy<P>(mut self, proxy: Arc<P>, sealed: bool) -> Self
    where
        P: Send + Sync + 'static,
    {
        self.proxy = Some(Arc::new(proxy));
        self.sealed = sealed;
        self
    }

    /// Returns the value as `Arc<T>` if either view holds a `T`.
    ///
    /// The raw view of a sealed value is never returned.
    pub fn downcast<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        let wrapped = self.proxy.as_ref().and_then(|p| p.downcast_ref::<Arc<T>>());
        match wrapped {
            Some(found) => Some(Arc::clone(found)),
            None if self.sealed => None,
            None => self.raw::<T>(),
        }
    }

    /// Like [`downcast`](Self::downcast) but reports a [`ContainerError::TypeMismatch`].
    pub fn expect_type<T: ?Sized + 'static>(&self, key: TypeKey) -> ContainerResult<Arc<T>> {
        if let Some(found) = self.downcast::<T>() {
            return Ok(found);
        }
        if self.sealed && self.raw::<T>().is_some() {
            return Err(ContainerError::mismatch(
                std::any::type_name::<T>(),
                format!(
                    "{} (intercepted; use `Container::proxy`, `proxy_field` or a proxied binding)",
                    key.name()
                ),
            ));
        }
        Err(ContainerError::mismatch(std::any::type_name::<T>(), key.name()))
    }

    /// The raw view, even when sealed. Used to wire the component itself.
    pub(crate) fn raw<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    /// Like [`raw`](Self::raw) but reports a [`ContainerError::TypeMismatch`].
    pub(crate) fn expect_raw<T: ?Sized + 'static>(&self, key: TypeKey) -> ContainerResult<Arc<T>> {
        self.raw::<T>()
            .ok_or_else(|| ContainerError::mismatch(std::any::type_name::<T>(), key.name()))
    }

    /// Whether this value is wrapped by the interception layer.
    pub fn is_intercepted(&self) -> bool {
        self.proxy.is_some()
    }

    /// Whether the raw view is hidden from consumers.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Name of the raw value's type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether both handles point at the same raw allocation.
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .field("intercepted", &self.is_intercepted())
            .field("sealed", &self.sealed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[test]
    fn test_downcast_concrete_and_trait_object() {
        let concrete = Instance::new(Arc::new(English));
        assert!(concrete.downcast::<English>().is_some());
        assert!(concrete.downcast::<String>().is_none());

        let object: Arc<dyn Greeter> = Arc::new(English);
        let erased = Instance::new(object);
        assert_eq!(erased.downcast::<dyn Greeter>().unwrap().greet(), "hello");
    }

    #[test]
    fn test_expect_type_reports_mismatch() {
        let instance = Instance::new(Arc::new(7u32));
        let err = instance
            .expect_type::<String>(TypeKey::of::<u32>())
            .unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_sealed_value_hides_raw_view() {
        let raw = Arc::new(English);
        let open = Instance::new(Arc::clone(&raw)).with_proxy(Arc::new(7u32), false);
        assert!(open.downcast::<English>().is_some());
        assert_eq!(*open.downcast::<u32>().unwrap(), 7);

        let sealed = Instance::new(Arc::clone(&raw)).with_proxy(Arc::new(7u32), true);
        assert!(sealed.is_sealed());
        assert!(sealed.downcast::<English>().is_none());
        assert!(Arc::ptr_eq(&sealed.raw::<English>().unwrap(), &raw));
        let err = sealed.expect_type::<English>(TypeKey::of::<English>()).err();
        assert!(matches!(
            err,
            Some(ContainerError::TypeMismatch { ref key, .. }) if key.contains("proxy_field")
        ));
    }
}
