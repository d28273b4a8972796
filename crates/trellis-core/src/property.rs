//! `${name}` placeholder resolution.
//!
//! A component declares property fields with a placeholder such as
//! `"${db.url}"`. After construction the resolver parses the placeholder,
//! looks the identifier up in the container's [`Properties`] and parses the
//! raw string into the field's type.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{ContainerError, ContainerResult};

// ─── Properties ──────────────────────────────────────────────────────────────

/// The loaded key/value property set.
///
/// Keys are flat dotted names (`db.url`); values are raw strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    /// Creates an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any earlier value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.values.insert(key.into(), value.into())
    }

    /// Raw value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates properties in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copies every property of `other` into `self`, `other` winning on conflicts.
    pub fn merge(&mut self, other: Properties) {
        self.values.extend(other.values);
    }

    /// Resolves a placeholder to its raw value.
    pub fn resolve(&self, placeholder: &str) -> ContainerResult<&str> {
        let name = parse_placeholder(placeholder)?;
        self.get(name).ok_or_else(|| ContainerError::PropertyNotFound {
            name: name.to_string(),
        })
    }

    /// Resolves a placeholder and parses the value into `T`.
    pub fn resolve_as<T>(&self, placeholder: &str) -> ContainerResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let name = parse_placeholder(placeholder)?;
        let raw = self.get(name).ok_or_else(|| ContainerError::PropertyNotFound {
            name: name.to_string(),
        })?;
        raw.parse::<T>()
            .map_err(|e| ContainerError::InvalidPropertyValue {
                name: name.to_string(),
                value: raw.to_string(),
                reason: e.to_string(),
            })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Properties {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.values
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

// ─── Placeholder parsing ─────────────────────────────────────────────────────

/// Extracts the identifier from a `${identifier}` placeholder.
///
/// The whole string must be exactly one placeholder. Identifiers are
/// non-empty and made of ASCII alphanumerics, `.`, `_` and `-`.
pub fn parse_placeholder(placeholder: &str) -> ContainerResult<&str> {
    let invalid = || ContainerError::InvalidPropertyFormat {
        placeholder: placeholder.to_string(),
    };

    let name = placeholder
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or_else(invalid)?;

    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid { Ok(name) } else { Err(invalid()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_placeholder() {
        assert_eq!(parse_placeholder("${db.url}").unwrap(), "db.url");
        assert_eq!(parse_placeholder("${pool_size-2}").unwrap(), "pool_size-2");

        for bad in ["db.url", "${}", "${db.url", "x${db.url}", "${db.url}x", "${a b}", "${${a}}"] {
            assert!(
                matches!(
                    parse_placeholder(bad),
                    Err(ContainerError::InvalidPropertyFormat { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_resolve_present_and_missing() {
        let props: Properties = [("db.url", "jdbc:test")].into_iter().collect();
        assert_eq!(props.resolve("${db.url}").unwrap(), "jdbc:test");
        assert!(matches!(
            props.resolve("${missing}"),
            Err(ContainerError::PropertyNotFound { name }) if name == "missing"
        ));
    }

    #[test]
    fn test_resolve_as_parses_value() {
        let mut props = Properties::new();
        props.insert("pool.size", "8");
        props.insert("pool.name", "eight");

        assert_eq!(props.resolve_as::<u16>("${pool.size}").unwrap(), 8);
        assert!(matches!(
            props.resolve_as::<u16>("${pool.name}"),
            Err(ContainerError::InvalidPropertyValue { .. })
        ));
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base: Properties = [("a", "1"), ("b", "2")].into_iter().collect();
        base.merge([("b", "3")].into_iter().collect());
        assert_eq!(base.get("a"), Some("1"));
        assert_eq!(base.get("b"), Some("3"));
        assert_eq!(base.len(), 2);
    }
}
