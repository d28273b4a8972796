//! Application bootstrap: configuration → logging → container.
//!
//! ```rust,ignore
//! use trellis_runtime::Application;
//!
//! let app = Application::builder().profile("production").build()?;
//! app.container().register_component::<OrderService>()?;
//!
//! let orders = app.container().get::<OrderService>()?;
//! // ...
//! app.shutdown(Duration::from_secs(5));
//! ```

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;
use trellis_core::{Container, ContainerResult};

use crate::config::{ConfigLoader, TrellisConfig, validate_config};
use crate::error::RuntimeResult;
use crate::logging;

/// A configured container plus the configuration it was built from.
#[derive(Debug)]
pub struct Application {
    config: TrellisConfig,
    container: Container,
}

impl Application {
    /// Creates a builder that loads configuration from the default locations.
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// Validates `config` and creates the container it describes.
    ///
    /// Logging is not touched; see [`ApplicationBuilder::with_logging`].
    pub fn from_config(config: TrellisConfig) -> RuntimeResult<Self> {
        validate_config(&config)?;
        let container = container_from_config(&config)?;

        info!(
            executors = ?container.executors().names(),
            properties = container.properties().len(),
            "Application initialized from configuration"
        );

        Ok(Self { config, container })
    }

    /// The loaded configuration.
    pub fn config(&self) -> &TrellisConfig {
        &self.config
    }

    /// The application container.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Stops every executor pool, waiting up to `timeout` per pool.
    pub fn shutdown(&self, timeout: Duration) {
        info!("Application shutting down");
        self.container.shutdown(timeout);
    }
}

/// Creates a container with the pools and properties from `config`.
pub fn container_from_config(config: &TrellisConfig) -> ContainerResult<Container> {
    let mut builder = Container::builder()
        .properties(config.flattened_properties())
        .enable_async(config.executors.enable_async);
    for pool in &config.executors.pools {
        builder = builder.executor(pool.name.clone(), pool.workers);
    }
    builder.build()
}

/// Configures how an [`Application`] is bootstrapped.
pub struct ApplicationBuilder {
    loader: ConfigLoader,
    config: Option<TrellisConfig>,
    init_logging: bool,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    /// Loads from the default locations and installs logging.
    pub fn new() -> Self {
        Self {
            loader: ConfigLoader::new(),
            config: None,
            init_logging: true,
        }
    }

    /// Loads this file instead of searching.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.loader = self.loader.file(path.into());
        self
    }

    /// Selects the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.loader = self.loader.search_path(path.into());
        self
    }

    /// Overrides a property after every configuration source.
    pub fn property(mut self, key: &str, value: impl Into<String>) -> Self {
        self.loader = self.loader.property(key, value);
        self
    }

    /// Ignores `TRELLIS_*` environment variables.
    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    /// Uses an already loaded configuration; file and env sources are skipped.
    pub fn config(mut self, config: TrellisConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Whether to install the global tracing subscriber (default: true).
    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// Loads configuration, installs logging and creates the container.
    pub fn build(self) -> RuntimeResult<Application> {
        let config = match self.config {
            Some(config) => config,
            None => self.loader.load()?,
        };
        if self.init_logging {
            logging::init_from_config(&config.logging);
        }
        Application::from_config(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigError, PoolConfig};
    use crate::error::RuntimeError;
    use serde_json::json;
    use trellis_core::{Component, ComponentDescriptor, DEFAULT_EXECUTOR, Property};

    #[derive(Default)]
    struct Settings {
        url: Property<String>,
        pool: Property<u32>,
    }

    impl Component for Settings {
        fn descriptor() -> ComponentDescriptor {
            ComponentDescriptor::with_default::<Self>()
                .value("url", "${db.url}", |s| &s.url)
                .value("pool", "${db.pool}", |s| &s.pool)
                .build()
        }
    }

    fn config() -> TrellisConfig {
        let mut config = TrellisConfig::default();
        config.executors.enable_async = true;
        config.executors.pools.push(PoolConfig {
            name: "mail".into(),
            workers: 2,
        });
        config
            .properties
            .insert("db".into(), json!({ "url": "jdbc:test", "pool": 8 }));
        config
    }

    #[test]
    fn test_container_from_config() {
        let app = Application::builder()
            .config(config())
            .with_logging(false)
            .build()
            .unwrap();

        let executors = app.container().executors();
        assert_eq!(executors.names(), vec![DEFAULT_EXECUTOR, "mail"]);
        assert_eq!(executors.get("mail").unwrap().workers(), 2);

        app.container().register_component::<Settings>().unwrap();
        let settings = app.container().get::<Settings>().unwrap();
        assert_eq!(*settings.url, "jdbc:test");
        assert_eq!(*settings.pool, 8);

        app.shutdown(Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.executors.pools.push(PoolConfig {
            name: "mail".into(),
            workers: 1,
        });
        assert!(matches!(
            Application::from_config(config),
            Err(RuntimeError::Config(ConfigError::DuplicateExecutor(_)))
        ));
    }
}
