//! Configuration module for the Trellis runtime.
//!
//! Layered loading through figment, a serde schema covering logging,
//! executor pools and application properties, and validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ExecutorsConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, PoolConfig,
    SpanEventConfig, TrellisConfig,
};
pub use validation::validate_config;
