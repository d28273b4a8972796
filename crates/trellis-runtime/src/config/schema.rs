//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use trellis_core::Properties;

/// Root configuration structure.
///
/// ```toml
/// [logging]
/// level = "debug"
///
/// [executors]
/// enable_async = true
/// pools = [{ name = "mail", workers = 2 }]
///
/// [properties.db]
/// url = "postgres://localhost/orders"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrellisConfig {
    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named worker pools for async methods and listeners.
    #[serde(default)]
    pub executors: ExecutorsConfig,

    /// Values for `${name}` placeholders. Nested tables become dotted keys.
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl TrellisConfig {
    /// Flattens the `properties` table into dotted keys with string values.
    ///
    /// `[properties.db] url = "x"` becomes `db.url = "x"`. Numbers and
    /// booleans are stringified, arrays are joined with `,`, and nulls are
    /// skipped.
    pub fn flattened_properties(&self) -> Properties {
        let mut properties = Properties::new();
        for (key, value) in &self.properties {
            flatten_into(&mut properties, key, value);
        }
        properties
    }
}

fn flatten_into(properties: &mut Properties, key: &str, value: &Value) {
    match value {
        Value::Object(table) => {
            for (child, value) in table {
                flatten_into(properties, &format!("{key}.{child}"), value);
            }
        }
        Value::Null => {}
        scalar_or_array => {
            if let Some(text) = stringify(scalar_or_array) {
                properties.insert(key, text);
            }
        }
    }
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(stringify)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Null | Value::Object(_) => None,
    }
}

// ─── Executors ───────────────────────────────────────────────────────────────

/// Executor pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutorsConfig {
    /// Create the default `"application"` pool unless `pools` declares it.
    #[serde(default)]
    pub enable_async: bool,

    /// Explicitly sized pools.
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

/// One named pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    /// Pool name referenced by async method declarations.
    pub name: String,

    /// Fixed number of worker threads.
    pub workers: usize,
}

// ─── Logging ─────────────────────────────────────────────────────────────────

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Global level. `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Span lifecycle events to log.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread IDs.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include thread names; useful to see which executor ran a task.
    #[serde(default)]
    pub thread_names: bool,

    /// Include file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Rotation of the log file.
    #[serde(default)]
    pub rotation: LogRotation,

    /// Per-module levels, e.g. `trellis_core = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            thread_names: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::default(),
            filters: BTreeMap::new(),
        }
    }
}

/// Log verbosity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level name as used in filter directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to the `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Needs the `json-log` feature; falls back to `Full` without it.
    Json,
}

/// Output destination.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Log file rotation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events to log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_properties_flattened() {
        let config: TrellisConfig = serde_json::from_value(json!({
            "properties": {
                "db": { "url": "jdbc:test", "pool": { "size": 4 } },
                "feature.enabled": true,
                "hosts": ["a", "b"],
                "unset": null
            }
        }))
        .unwrap();

        let properties = config.flattened_properties();
        assert_eq!(properties.get("db.url"), Some("jdbc:test"));
        assert_eq!(properties.get("db.pool.size"), Some("4"));
        assert_eq!(properties.get("feature.enabled"), Some("true"));
        assert_eq!(properties.get("hosts"), Some("a,b"));
        assert!(!properties.contains("unset"));
        assert_eq!(properties.len(), 4);
    }

    #[test]
    fn test_logging_defaults() {
        let config = TrellisConfig::default();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.logging.output, LogOutput::Stdout);
        assert!(!config.executors.enable_async);
        assert!(config.properties.is_empty());
    }
}
