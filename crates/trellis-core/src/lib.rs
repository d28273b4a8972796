//! # Trellis Core
//!
//! A small dependency-injection container that builds a singleton object
//! graph from statically declared component descriptors.
//!
//! ## Building Blocks
//!
//! - **Descriptors**: what a component needs and how it behaves
//!   ([`ComponentDescriptor`], [`Component`], [`Interface`], [`Implementation`])
//! - **Slots**: write-once fields the container fills ([`Inject`], [`Lazy`], [`Property`])
//! - **Construction engine**: resolution, cycle handling and caching ([`Container`])
//! - **Interception**: async dispatch through named pools ([`Proxy`], [`AsyncResult`])
//! - **Events**: exact-type publish/subscribe ([`EventBus`], [`Listener`])
//! - **Configuration values**: `${name}` placeholders ([`Properties`])
//!
//! ## Resolution Flow
//!
//! ```text
//! get::<T>() ──▶ cache hit? ──yes──▶ Arc<T>
//!                    │ no
//!                    ▼
//!        binding / default / descriptor
//!                    │
//!                    ▼
//!   params ─▶ constructor ─▶ Proxy? ─▶ fields ─▶ properties ─▶ initializer
//!                    │
//!                    ▼
//!      staged ──(outermost get returns)──▶ committed + listeners subscribed
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use trellis_core::prelude::*;
//!
//! #[derive(Default)]
//! struct Greeter {
//!     greeting: Property<String>,
//! }
//!
//! impl Component for Greeter {
//!     fn descriptor() -> ComponentDescriptor {
//!         ComponentDescriptor::with_default::<Self>()
//!             .value("greeting", "${app.greeting}", |g| &g.greeting)
//!             .build()
//!     }
//! }
//!
//! let container = Container::builder().property("app.greeting", "hello").build()?;
//! container.register_component::<Greeter>()?;
//! assert_eq!(*container.get::<Greeter>()?.greeting, "hello");
//! ```

mod container;
mod descriptor;
mod error;
mod event;
mod executor;
mod instance;
mod key;
mod macros;
mod property;
mod proxy;
mod registry;
mod slot;

pub use container::{Container, ContainerBuilder};
pub use descriptor::{
    Arguments, Component, ComponentDescriptor, DescriptorBuilder, FieldSpec, Implementation,
    Interface, MethodBehavior, MethodSpec, ParamSpec, ValueSpec,
};
pub use error::{BoxError, ContainerError, ContainerResult};
pub use event::{EventArc, EventBus, Listener};
pub use executor::{AsyncResult, DEFAULT_EXECUTOR, DEFAULT_WORKERS, ExecutorRegistry, NamedExecutor};
pub use instance::{ErasedArc, Instance};
pub use key::TypeKey;
pub use property::{Properties, parse_placeholder};
pub use proxy::Proxy;
pub use slot::{Inject, Lazy, Property};

/// Commonly used types for declaring and resolving components.
pub mod prelude {
    pub use crate::implementation;
    pub use crate::{
        AsyncResult, BoxError, Component, ComponentDescriptor, Container, ContainerError,
        ContainerResult, EventBus, Implementation, Inject, Interface, Lazy, Properties, Property,
        Proxy,
    };
}
