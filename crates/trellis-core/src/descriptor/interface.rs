//! Interface types and their bindings to concrete components.

use std::fmt;
use std::sync::Arc;

use super::component::{Component, ComponentDescriptor};
use crate::error::ContainerResult;
use crate::instance::Instance;
use crate::key::TypeKey;
use crate::proxy::Proxy;

/// An abstract type resolved through a binding.
///
/// Implemented for trait objects. Overriding
/// [`default_implementation`](Self::default_implementation) is the
/// equivalent of annotating the trait with its default concrete type; an
/// explicit binding registered on the container always wins over it.
///
/// ```rust,ignore
/// pub trait Mailer: Send + Sync {
///     fn send(&self, to: &str, body: &str);
/// }
///
/// impl Interface for dyn Mailer {
///     fn default_implementation() -> Option<Implementation> {
///         Some(implementation!(dyn Mailer => SmtpMailer))
///     }
/// }
/// ```
pub trait Interface: Send + Sync + 'static {
    /// The concrete type used when no explicit binding exists.
    fn default_implementation() -> Option<Implementation> {
        None
    }
}

type UpcastFn = Arc<dyn Fn(&Instance) -> ContainerResult<Instance> + Send + Sync>;

/// A binding from an interface to the concrete component that satisfies it.
#[derive(Clone)]
pub struct Implementation {
    interface: TypeKey,
    concrete: TypeKey,
    descriptor: fn() -> ComponentDescriptor,
    upcast: UpcastFn,
}

impl Implementation {
    /// Binds `I` to the raw component `C`.
    ///
    /// Resolving fails with a type mismatch if `C` has async methods; bind
    /// those with [`proxied`](Self::proxied).
    pub fn of<I, C>(upcast: fn(Arc<C>) -> Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: Component,
    {
        let concrete = TypeKey::of::<C>();
        Self {
            interface: TypeKey::of::<I>(),
            concrete,
            descriptor: C::descriptor,
            upcast: Arc::new(move |instance: &Instance| {
                let component = instance.expect_type::<C>(concrete)?;
                Ok(Instance::new(upcast(component)))
            }),
        }
    }

    /// Binds `I` to the intercepting [`Proxy`] of `C`.
    ///
    /// `C` must declare at least one async or listener method, otherwise it
    /// is never wrapped and resolving `I` fails with a type mismatch.
    pub fn proxied<I, C>(upcast: fn(Arc<Proxy<C>>) -> Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: Component,
    {
        let concrete = TypeKey::of::<C>();
        Self {
            interface: TypeKey::of::<I>(),
            concrete,
            descriptor: C::descriptor,
            upcast: Arc::new(move |instance: &Instance| {
                let proxy = instance.expect_type::<Proxy<C>>(concrete)?;
                Ok(Instance::new(upcast(proxy)))
            }),
        }
    }

    /// The bound interface.
    pub fn interface(&self) -> TypeKey {
        self.interface
    }

    /// The concrete component.
    pub fn concrete(&self) -> TypeKey {
        self.concrete
    }

    pub(crate) fn descriptor_fn(&self) -> fn() -> ComponentDescriptor {
        self.descriptor
    }

    /// Converts a concrete instance into the interface view.
    pub(crate) fn upcast(&self, concrete: &Instance) -> ContainerResult<Instance> {
        (self.upcast)(concrete)
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("interface", &self.interface)
            .field("concrete", &self.concrete)
            .finish()
    }
}
