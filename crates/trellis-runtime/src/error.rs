//! Runtime error types.

use thiserror::Error;
use trellis_core::ContainerError;

use crate::config::ConfigError;

/// Errors that can occur while bootstrapping an application.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Creating or populating the container failed.
    #[error(transparent)]
    Container(#[from] ContainerError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
