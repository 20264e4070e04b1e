//! Connector instance configuration
//!
//! The per-resource view of a connector: what it can do and how long a call
//! may take.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, ConnectorResult};
use crate::types::{CapabilitySet, ConnectorCapability};

/// Configuration of one connector instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorInstance {
    /// Display name used in logs.
    pub display_name: String,

    /// Declared capabilities.
    #[serde(default)]
    pub capabilities: CapabilitySet,

    /// Per-call deadline override in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Name of the cipher/hash algorithm the target expects passwords in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_cipher_algorithm: Option<String>,

    /// Connector-specific properties.
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
}

impl ConnectorInstance {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            capabilities: CapabilitySet::empty(),
            request_timeout_secs: None,
            password_cipher_algorithm: None,
            properties: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    #[must_use]
    pub fn with_capability(mut self, capability: ConnectorCapability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    pub fn with_password_cipher_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.password_cipher_algorithm = Some(algorithm.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Per-call deadline override, if any.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(|v| v.as_str())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.display_name.trim().is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "display_name must not be empty".to_string(),
            });
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ConnectorError::InvalidConfiguration {
                message: format!(
                    "request_timeout_secs must be positive for connector '{}'",
                    self.display_name
                ),
            });
        }
        Ok(())
    }
}
