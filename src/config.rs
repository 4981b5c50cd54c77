//! Engine Configuration Module
//!
//! Typed engine settings, loaded from TOML or from the flat dotted
//! parameters a launcher passes along.
//!
//! ```toml
//! [timeout]
//! default = "5 s"
//! test = "250 ms"
//! thread_mode = "separate_thread"
//!
//! [order]
//! tests = "random"
//! seed = 42
//!
//! [instance]
//! lifecycle = "per_container"
//! ```
//!
//! Values are validated when loaded; the engine only sees typed settings.

use std::fs;
use std::path::Path;

use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::{DeserializeOwned, IntoDeserializer};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LifecycleError, Result};
use crate::extension::Lifecycle;
use crate::order::OrdererKind;
use crate::timeout::{ThreadMode, TimeoutDuration};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub timeout: TimeoutConfig,

    #[serde(default)]
    pub order: OrderConfig,

    #[serde(default)]
    pub instance: InstanceConfig,
}

/// Deadline settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Master switch; when off, no deadline is applied anywhere
    pub enabled: bool,

    /// Applies to every timeout-able invocation without a closer setting
    pub default: Option<TimeoutDuration>,

    /// Applies to test bodies; overrides `default`
    pub test: Option<TimeoutDuration>,

    pub thread_mode: ThreadMode,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default: None,
            test: None,
            thread_mode: ThreadMode::Inferred,
        }
    }
}

/// Sibling ordering settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrderConfig {
    /// Orderer for nested containers
    pub containers: OrdererKind,

    /// Orderer for the tests of a container
    pub tests: OrdererKind,

    /// Seed for `random`; generated and logged when unset
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstanceConfig {
    /// Lifecycle for containers that do not declare one
    pub lifecycle: Lifecycle,
}

fn invalid(key: &str, reason: impl ToString) -> LifecycleError {
    LifecycleError::InvalidConfig {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a unit-variant enum from its snake_case id
fn parse_id<T: DeserializeOwned>(key: &str, value: &str) -> Result<T> {
    let de: StrDeserializer<'_, ValueError> = value.trim().into_deserializer();
    T::deserialize(de).map_err(|e| invalid(key, e))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        other => Err(invalid(key, format!("expected a boolean, got '{other}'"))),
    }
}

impl EngineConfig {
    /// Parse TOML content
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| invalid("<toml>", e.message()))
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| invalid(&path.display().to_string(), format!("failed to read: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Serialize to pretty TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| invalid("<toml>", e))
    }

    /// Apply flat `section.key = value` parameters on top of `self`.
    ///
    /// Unknown keys are skipped; malformed values fail.
    pub fn with_parameters<'a, I>(mut self, parameters: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in parameters {
            match key {
                "timeout.enabled" => self.timeout.enabled = parse_bool(key, value)?,
                "timeout.default" => {
                    self.timeout.default =
                        Some(TimeoutDuration::parse(value).map_err(|e| invalid(key, e))?)
                }
                "timeout.test" => {
                    self.timeout.test =
                        Some(TimeoutDuration::parse(value).map_err(|e| invalid(key, e))?)
                }
                "timeout.thread_mode" => self.timeout.thread_mode = parse_id(key, value)?,
                "order.containers" => self.order.containers = value.parse()?,
                "order.tests" => self.order.tests = value.parse()?,
                "order.seed" | "order.random.seed" => {
                    self.order.seed = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|e| invalid(key, format!("expected an unsigned seed: {e}")))?,
                    )
                }
                "instance.lifecycle" => self.instance.lifecycle = parse_id(key, value)?,
                _ => debug!(key, "ignoring unknown configuration parameter"),
            }
        }
        Ok(self)
    }

    /// Defaults plus `parameters`
    pub fn from_parameters<'a, I>(parameters: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self::default().with_parameters(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeout::TimeUnit;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert!(config.timeout.enabled);
        assert_eq!(config.timeout.thread_mode, ThreadMode::Inferred);
        assert_eq!(config.order.tests, OrdererKind::Default);
        assert_eq!(config.instance.lifecycle, Lifecycle::PerTest);
    }

    #[test]
    fn parses_toml_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            [timeout]
            default = "5 s"
            test = "250ms"
            thread_mode = "separate_thread"

            [order]
            tests = "random"
            containers = "name"
            seed = 42

            [instance]
            lifecycle = "per_container"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.timeout.default,
            Some(TimeoutDuration::new(5, TimeUnit::Seconds).unwrap())
        );
        assert_eq!(
            config.timeout.test,
            Some(TimeoutDuration::new(250, TimeUnit::Milliseconds).unwrap())
        );
        assert_eq!(config.timeout.thread_mode, ThreadMode::SeparateThread);
        assert_eq!(config.order.tests, OrdererKind::Random);
        assert_eq!(config.order.containers, OrdererKind::Name);
        assert_eq!(config.order.seed, Some(42));
        assert_eq!(config.instance.lifecycle, Lifecycle::PerContainer);
    }

    #[test]
    fn toml_rejects_malformed_durations() {
        let err = EngineConfig::from_toml_str("[timeout]\ndefault = \"05s\"\n").unwrap_err();
        assert_eq!(err.code(), "CAD-003");
    }

    #[test]
    fn toml_round_trip() {
        let config = EngineConfig::from_parameters([("timeout.default", "3 minutes"), ("order.seed", "9")])
            .unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn flat_parameters() {
        let config = EngineConfig::from_parameters([
            ("timeout.enabled", "false"),
            ("timeout.test", "10 ms"),
            ("timeout.thread_mode", "same_thread"),
            ("order.tests", "declared_order"),
            ("order.random.seed", "1234"),
            ("instance.lifecycle", "per_container"),
            ("unrelated.key", "whatever"),
        ])
        .unwrap();

        assert!(!config.timeout.enabled);
        assert_eq!(config.timeout.test.unwrap().amount(), 10);
        assert_eq!(config.timeout.thread_mode, ThreadMode::SameThread);
        assert_eq!(config.order.tests, OrdererKind::DeclaredOrder);
        assert_eq!(config.order.seed, Some(1234));
        assert_eq!(config.instance.lifecycle, Lifecycle::PerContainer);
    }

    #[test]
    fn flat_parameters_reject_bad_values() {
        let err = EngineConfig::from_parameters([("timeout.default", "0")]).unwrap_err();
        assert_eq!(err.code(), "CAD-003");
        assert!(err.to_string().contains("timeout.default"));

        let err = EngineConfig::from_parameters([("order.tests", "alphabetical")]).unwrap_err();
        assert_eq!(err.code(), "CAD-007");

        let err = EngineConfig::from_parameters([("instance.lifecycle", "per_run")]).unwrap_err();
        assert_eq!(err.code(), "CAD-003");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = EngineConfig::load("/nonexistent/cadence.toml").unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
