//! # Trellis
//!
//! A small dependency-injection container that assembles a graph of
//! singleton components from declared dependencies, with async method
//! interception, an in-process event bus and `${name}` configuration values.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────────────────────────────────────┐
//! │   Runtime    │────▶│ Container                                      │
//! │ config, logs │     │  descriptors ─▶ construction engine ─▶ cache   │
//! └──────────────┘     │                     │            │             │
//!                      │            Proxy<C> (async) EventBus           │
//!                      │                     │            │             │
//!                      │              named executor pools              │
//!                      └────────────────────────────────────────────────┘
//! ```
//!
//! - **Runtime**: loads `trellis.toml`, installs logging, starts pools
//! - **Container**: resolves components and interfaces into singletons
//! - **Proxy**: runs async-marked methods on their executor
//! - **EventBus**: exact-type publish/subscribe between components
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trellis::prelude::*;
//!
//! trait Notifier: Send + Sync {
//!     fn notify(&self, message: &str) -> ContainerResult<()>;
//! }
//! impl Interface for dyn Notifier {}
//!
//! #[derive(Default)]
//! struct EmailNotifier;
//!
//! impl Component for EmailNotifier {
//!     fn descriptor() -> ComponentDescriptor {
//!         ComponentDescriptor::with_default::<Self>()
//!             .async_method("notify")
//!             .build()
//!     }
//! }
//!
//! impl Notifier for Proxy<EmailNotifier> {
//!     fn notify(&self, message: &str) -> ContainerResult<()> {
//!         let message = message.to_string();
//!         self.spawn("notify", move |_| println!("sending {message}"))
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = Application::builder().build()?;
//!     let container = app.container();
//!     container.register_implementation(implementation!(proxied dyn Notifier => EmailNotifier))?;
//!     container.get::<dyn Notifier>()?.notify("hello")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use trellis_core as core;
pub use trellis_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use trellis::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use trellis_runtime::{Application, ConfigLoader, RuntimeError, RuntimeResult};

    // Declaring components
    pub use trellis_core::implementation;
    pub use trellis_core::{
        Arguments, Component, ComponentDescriptor, Implementation, Interface, MethodBehavior,
    };

    // Slots
    pub use trellis_core::{Inject, Lazy, Property};

    // Resolution, interception and events
    pub use trellis_core::{
        AsyncResult, BoxError, Container, ContainerError, ContainerResult, EventBus, Properties,
        Proxy,
    };
}
