//! Propagation engine configuration loading.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{PropagationError, PropagationResult};

/// Engine-wide settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PropagationConfig {
    /// Default per-call deadline when a connector instance sets none.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Read the remote object before and after each call.
    #[serde(default = "default_read_remote_objects")]
    pub read_remote_objects: bool,

    /// Prefix of the failure reason recorded for cascade failures.
    #[serde(default = "default_cascade_reason_prefix")]
    pub cascade_reason_prefix: String,
}

fn default_request_timeout() -> u64 {
    60
}

fn default_read_remote_objects() -> bool {
    true
}

fn default_cascade_reason_prefix() -> String {
    "Propagation aborted after failure on primary resource".to_string()
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            read_remote_objects: default_read_remote_objects(),
            cascade_reason_prefix: default_cascade_reason_prefix(),
        }
    }
}

impl PropagationConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> PropagationResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PropagationError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(content: &str) -> PropagationResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| PropagationError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(timeout) = std::env::var("PROPEL_REQUEST_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                if timeout > 0 {
                    self.request_timeout_secs = timeout;
                }
            }
        }
        if let Ok(read) = std::env::var("PROPEL_READ_REMOTE_OBJECTS") {
            if let Ok(read) = read.parse() {
                self.read_remote_objects = read;
            }
        }
        if let Ok(prefix) = std::env::var("PROPEL_CASCADE_REASON_PREFIX") {
            self.cascade_reason_prefix = prefix;
        }
    }

    pub fn validate(&self) -> PropagationResult<()> {
        if self.request_timeout_secs == 0 {
            return Err(PropagationError::Config(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Reason recorded on a task abandoned because `resource` failed.
    #[must_use]
    pub fn cascade_reason(&self, resource: &str) -> String {
        format!("{} '{}'", self.cascade_reason_prefix, resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PropagationConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert!(config.read_remote_objects);
        assert_eq!(
            config.cascade_reason("ldap"),
            "Propagation aborted after failure on primary resource 'ldap'"
        );
    }

    #[test]
    fn test_from_yaml() {
        let config = PropagationConfig::from_yaml(
            "request_timeout_secs: 15\nread_remote_objects: false\n",
        )
        .unwrap();
        assert_eq!(config.request_timeout_secs, 15);
        assert!(!config.read_remote_objects);

        let empty = PropagationConfig::from_yaml("{}").unwrap();
        assert_eq!(empty.request_timeout_secs, 60);
    }

    #[test]
    fn test_from_yaml_rejects_zero_timeout() {
        let err = PropagationConfig::from_yaml("request_timeout_secs: 0").unwrap_err();
        assert!(matches!(err, PropagationError::Config(_)));
    }

    #[test]
    fn test_from_file_missing() {
        let err = PropagationConfig::from_file("/nonexistent/propel.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
