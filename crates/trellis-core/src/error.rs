//! Error types for the Trellis container.

use thiserror::Error;

/// Boxed error returned by user hooks (initializers, fallible async methods).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while registering, resolving or invoking components.
///
/// Every variant aborts the enclosing `get` / `publish` call. The container
/// never recovers from them on its own.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// An abstract type has neither an explicit binding nor a default
    /// implementation, or a concrete type was never registered.
    #[error("unresolved dependency '{type_name}': {reason}")]
    UnresolvedDependency {
        /// Name of the type that could not be resolved.
        type_name: &'static str,
        /// What was missing.
        reason: String,
    },

    /// A type, key, interface binding or executor name was registered twice.
    #[error("duplicate registration for '{key}'")]
    DuplicateRegistration {
        /// The key that is already bound.
        key: String,
    },

    /// A non-lazy cycle was found on the active construction path.
    #[error("circular dependency: {}", path.join(" -> "))]
    CircularDependency {
        /// Type names along the cycle, closing type last.
        path: Vec<&'static str>,
    },

    /// An async method or listener references a pool that does not exist.
    #[error("executor '{name}' not found")]
    ExecutorNotFound {
        /// The missing pool name.
        name: String,
    },

    /// A pool refused work because it has been shut down.
    #[error("executor '{name}' has been shut down")]
    ExecutorShutdown {
        /// The closed pool name.
        name: String,
    },

    /// A pool was configured with an unusable shape.
    #[error("invalid executor '{name}': {reason}")]
    InvalidExecutor {
        /// The pool name.
        name: String,
        /// Why the pool was rejected.
        reason: String,
    },

    /// An event-listener method declares no event payload parameter.
    #[error("event listener '{component}::{method}' has no event parameter")]
    InvalidListener {
        /// Owning component.
        component: &'static str,
        /// Listener method.
        method: &'static str,
    },

    /// A property declaration is not a single `${identifier}` placeholder.
    #[error("invalid property format '{placeholder}': expected ${{property_name}}")]
    InvalidPropertyFormat {
        /// The declared placeholder text.
        placeholder: String,
    },

    /// A placeholder named a property absent from the loaded set.
    #[error("no property with name '{name}' was found")]
    PropertyNotFound {
        /// The property key.
        name: String,
    },

    /// A property value could not be parsed into the field's type.
    #[error("property '{name}' has invalid value '{value}': {reason}")]
    InvalidPropertyValue {
        /// The property key.
        name: String,
        /// The raw configured value.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// An erased value did not hold the requested type.
    #[error("type mismatch: expected '{expected}' for '{key}'")]
    TypeMismatch {
        /// The requested type name.
        expected: &'static str,
        /// The key that was looked up.
        key: String,
    },

    /// A component's initializer hook returned an error.
    #[error("initializer of '{component}' failed: {source}")]
    InitializerFailed {
        /// The component whose hook failed.
        component: &'static str,
        /// The hook's error.
        #[source]
        source: BoxError,
    },

    /// A background invocation failed; surfaced through its result handle.
    #[error("async method '{method}' failed: {source}")]
    AsyncTaskFailed {
        /// The intercepted method.
        method: &'static str,
        /// The original failure.
        #[source]
        source: BoxError,
    },

    /// A deferred handle was used after its container was dropped.
    #[error("container dropped before '{type_name}' could be resolved")]
    ContainerDropped {
        /// The type the handle was meant to resolve.
        type_name: &'static str,
    },
}

impl ContainerError {
    /// Creates an unresolved dependency error.
    pub fn unresolved(type_name: &'static str, reason: impl Into<String>) -> Self {
        Self::UnresolvedDependency {
            type_name,
            reason: reason.into(),
        }
    }

    /// Creates a duplicate registration error.
    pub fn duplicate(key: impl Into<String>) -> Self {
        Self::DuplicateRegistration { key: key.into() }
    }

    /// Creates a type mismatch error.
    pub fn mismatch(expected: &'static str, key: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected,
            key: key.into(),
        }
    }
}

/// Result type for container operations.
pub type ContainerResult<T> = Result<T, ContainerError>;
