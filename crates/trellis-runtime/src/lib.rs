//! Trellis Runtime - bootstrap layer for the Trellis container.
//!
//! This crate provides:
//! - Layered configuration loading (`ConfigLoader`, `TrellisConfig`)
//! - Logging setup (`LoggingBuilder`, `logging::init_from_config`)
//! - An `Application` that turns configuration into a ready `Container`
//!
//! ```rust,ignore
//! use trellis_runtime::Application;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads trellis.toml / TRELLIS_* variables, installs logging,
//!     // starts the configured executor pools.
//!     let app = Application::builder().build()?;
//!     app.container().register_component::<Greeter>()?;
//!     app.container().get::<Greeter>()?.greet();
//!     Ok(())
//! }
//! ```

pub mod application;
pub mod config;
pub mod error;
pub mod logging;

pub use application::{Application, ApplicationBuilder, container_from_config};
pub use config::{ConfigError, ConfigLoader, ConfigResult, TrellisConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for application code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
