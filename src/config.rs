//! Registry configuration.
//!
//! Configuration is plain data with serde support so it can be embedded in an
//! application's own config file. Every field has a default; a JSON document
//! only needs to name the fields it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::container::ExecutionPolicy;
use crate::error::{ConfigError, ValidationError, WeakPubResult};

/// Maximum length of a registry name.
pub const MAX_NAME_LENGTH: usize = 256;

/// What a notify pass does with the expired entries it finds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepPolicy {
    /// Remove at most as many expired entries as the pass counted.
    Bounded,
    /// Remove every expired entry, rechecking liveness during the sweep.
    #[default]
    Full,
    /// Leave expired entries in place; only `cleanup_expired` removes them.
    Deferred,
}

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Optional human-readable name, used in log lines.
    pub name: Option<String>,
    /// Expired-entry handling during notify.
    pub sweep: SweepPolicy,
    /// How scans and callback delivery are executed.
    pub execution: ExecutionPolicy,
    /// Sweep expired entries before answering `has_subscriber`.
    pub cleanup_on_query: bool,
    /// Queue capacity of a background notifier spawned for this registry.
    pub notifier_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            name: None,
            sweep: SweepPolicy::Full,
            execution: ExecutionPolicy::Sequential,
            cleanup_on_query: false,
            notifier_capacity: 1024,
        }
    }
}

impl RegistryConfig {
    /// Starts a builder from the defaults.
    #[must_use]
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder::default()
    }

    /// Checks field ranges.
    ///
    /// # Errors
    /// - `InvalidCapacity` if `notifier_capacity` is zero
    /// - `EmptyName` / `FieldTooLong` for a blank or oversized name
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.notifier_capacity == 0 {
            return Err(ValidationError::InvalidCapacity {
                field: "notifier_capacity".to_string(),
                value: self.notifier_capacity,
            });
        }

        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ValidationError::EmptyName);
            }
            if name.len() > MAX_NAME_LENGTH {
                return Err(ValidationError::FieldTooLong {
                    field: "name".to_string(),
                    max_length: MAX_NAME_LENGTH,
                });
            }
        }

        Ok(())
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> WeakPubResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> WeakPubResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }
}

/// Builder for [`RegistryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RegistryConfigBuilder {
    config: RegistryConfig,
}

impl RegistryConfigBuilder {
    /// Sets the registry name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Sets the sweep policy.
    #[must_use]
    pub fn sweep(mut self, sweep: SweepPolicy) -> Self {
        self.config.sweep = sweep;
        self
    }

    /// Sets the execution policy.
    #[must_use]
    pub fn execution(mut self, execution: ExecutionPolicy) -> Self {
        self.config.execution = execution;
        self
    }

    /// Enables or disables the sweep before `has_subscriber`.
    #[must_use]
    pub fn cleanup_on_query(mut self, enabled: bool) -> Self {
        self.config.cleanup_on_query = enabled;
        self
    }

    /// Sets the background notifier queue capacity.
    #[must_use]
    pub fn notifier_capacity(mut self, capacity: usize) -> Self {
        self.config.notifier_capacity = capacity;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> Result<RegistryConfig, ValidationError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RegistryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sweep, SweepPolicy::Full);
        assert_eq!(config.execution, ExecutionPolicy::Sequential);
    }

    #[test]
    fn test_builder() {
        let config = RegistryConfig::builder()
            .name("prices")
            .sweep(SweepPolicy::Deferred)
            .execution(ExecutionPolicy::Parallel)
            .cleanup_on_query(true)
            .notifier_capacity(16)
            .build()
            .unwrap();

        assert_eq!(config.name.as_deref(), Some("prices"));
        assert_eq!(config.sweep, SweepPolicy::Deferred);
        assert!(config.cleanup_on_query);
        assert_eq!(config.notifier_capacity, 16);
    }

    #[test]
    fn test_builder_rejects_zero_capacity() {
        let err = RegistryConfig::builder().notifier_capacity(0).build().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidCapacity { value: 0, .. }));
    }

    #[test]
    fn test_validate_name() {
        let blank = RegistryConfig {
            name: Some("   ".to_string()),
            ..RegistryConfig::default()
        };
        assert!(matches!(blank.validate(), Err(ValidationError::EmptyName)));

        let long = RegistryConfig {
            name: Some("x".repeat(MAX_NAME_LENGTH + 1)),
            ..RegistryConfig::default()
        };
        assert!(matches!(long.validate(), Err(ValidationError::FieldTooLong { .. })));
    }

    #[test]
    fn test_from_json_partial_document() {
        let config = RegistryConfig::from_json_str(r#"{ "sweep": "bounded", "cleanup_on_query": true }"#).unwrap();
        assert_eq!(config.sweep, SweepPolicy::Bounded);
        assert!(config.cleanup_on_query);
        assert_eq!(config.notifier_capacity, 1024);
    }

    #[test]
    fn test_from_json_errors() {
        let err = RegistryConfig::from_json_str("{ not json").unwrap_err();
        assert!(err.is_config());

        let err = RegistryConfig::from_json_str(r#"{ "notifier_capacity": 0 }"#).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "name": "orders", "execution": "parallel" }}"#).unwrap();

        let config = RegistryConfig::from_path(file.path()).unwrap();
        assert_eq!(config.name.as_deref(), Some("orders"));
        assert_eq!(config.execution, ExecutionPolicy::Parallel);

        let missing = RegistryConfig::from_path(file.path().with_extension("missing")).unwrap_err();
        assert!(missing.is_config());
    }
}
