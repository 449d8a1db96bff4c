// crates/nimbus-config/src/accessor.rs
// ============================================================================
// Module: Config Accessor
// Description: Opaque typed view over provider settings.
// Purpose: Decouple providers from the configuration file format.
// Dependencies: toml
// ============================================================================

//! ## Overview
//! Providers declare required and optional configuration keys and read them
//! through this accessor. The view is a snapshot: mutations to the source
//! configuration after construction are not observed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

// ============================================================================
// SECTION: Accessor
// ============================================================================

/// Opaque typed view over one provider's settings.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Settings snapshot keyed by setting name.
    values: BTreeMap<String, toml::Value>,
}

impl Config {
    /// Creates an accessor over a settings snapshot.
    #[must_use]
    pub const fn new(values: BTreeMap<String, toml::Value>) -> Self {
        Self {
            values,
        }
    }

    /// Creates an accessor from string pairs, for tests and env overlays.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), toml::Value::String(value.into())))
            .collect();
        Self {
            values,
        }
    }

    /// Returns a copy with a string value inserted under `key`.
    ///
    /// Used for environment overlays at bootstrap; existing values are
    /// replaced.
    #[must_use]
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), toml::Value::String(value.into()));
        self
    }

    /// Returns the string value under `key`.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(|value| value.as_str()).map(str::to_string)
    }

    /// Returns the boolean value under `key`.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(toml::Value::as_bool)
    }

    /// Returns the integer value under `key`.
    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(toml::Value::as_integer)
    }

    /// Returns the string map under `key`, dropping non-string entries.
    #[must_use]
    pub fn get_string_map(&self, key: &str) -> Option<BTreeMap<String, String>> {
        let table = self.values.get(key)?.as_table()?;
        Some(
            table
                .iter()
                .filter_map(|(key, value)| {
                    value.as_str().map(|value| (key.clone(), value.to_string()))
                })
                .collect(),
        )
    }

    /// Returns true when a value exists under `key`.
    #[must_use]
    pub fn is_set(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the keys missing from this view.
    #[must_use]
    pub fn missing_keys(&self, required: &[String]) -> Vec<String> {
        required.iter().filter(|key| !self.is_set(key)).cloned().collect()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions."
    )]

    use std::collections::BTreeMap;

    use super::Config;

    #[test]
    fn typed_reads_respect_value_types() {
        let mut values = BTreeMap::new();
        values.insert("api_token".to_string(), toml::Value::String("t".to_string()));
        values.insert("timeout_ms".to_string(), toml::Value::Integer(2_000));
        values.insert("verify_tls".to_string(), toml::Value::Boolean(true));
        let config = Config::new(values);

        assert_eq!(config.get_string("api_token").as_deref(), Some("t"));
        assert_eq!(config.get_int("timeout_ms"), Some(2_000));
        assert_eq!(config.get_bool("verify_tls"), Some(true));
        // Type mismatches read as absent.
        assert_eq!(config.get_string("timeout_ms"), None);
        assert!(config.is_set("timeout_ms"));
        assert!(!config.is_set("missing"));
    }

    #[test]
    fn missing_keys_reports_absences_in_order() {
        let config = Config::from_pairs([("api_token", "t")]);
        let required =
            vec!["api_token".to_string(), "api_url".to_string(), "region".to_string()];
        assert_eq!(config.missing_keys(&required), vec!["api_url", "region"]);
    }
}
