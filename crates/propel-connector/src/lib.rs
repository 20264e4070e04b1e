//! # Connector Layer
//!
//! The vocabulary shared between the propagation engine and the connectors
//! that reach external resources (directories, databases, SaaS APIs).
//!
//! ## Architecture
//!
//! Connectors are opaque clients behind a single async trait. Whether a call
//! may be made at all is decided by the capabilities the connector instance
//! declares, not by the connector itself:
//!
//! - [`ConnectorFacade`] - The uniform client trait connectors implement
//! - [`ConnectorGateway`] - Capability check, deadline and cancellation around every call
//! - [`CapabilitySet`] - Closed set of declared [`ConnectorCapability`] flags
//! - [`AttributeSet`] - Ordered, one-entry-per-name attributes with union merge
//!
//! ## Example
//!
//! ```ignore
//! use propel_connector::prelude::*;
//!
//! let instance = ConnectorInstance::new("corporate-ldap")
//!     .with_capability(ConnectorCapability::OnePhaseCreate)
//!     .with_capability(ConnectorCapability::Search);
//!
//! let gateway = ConnectorGateway::new("ldap", &instance, facade, DEFAULT_REQUEST_TIMEOUT);
//!
//! let attrs = AttributeSet::new()
//!     .with("__NAME__", "uid=jdoe,ou=people,o=isp")
//!     .with("mail", "jdoe@example.com");
//! let uid = gateway.create(PropagationMode::OnePhase, "__ACCOUNT__", attrs).await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`types`] - Operations, modes, capabilities, trace levels
//! - [`error`] - Error types with transient/permanent classification
//! - [`operation`] - Attributes, attribute sets, remote objects
//! - [`traits`] - The connector facade trait and sync types
//! - [`schema`] - Schema types
//! - [`config`] - Connector instance configuration
//! - [`crypto`] - Stored credential algorithms and re-encoding
//! - [`mapping`] - Mapping items and transforms
//! - [`transform`] - Transform engine
//! - [`gateway`] - The capability gateway

pub mod config;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod mapping;
pub mod operation;
pub mod schema;
pub mod traits;
pub mod transform;
pub mod types;

pub use gateway::ConnectorGateway;
pub use operation::AttributeSet;
pub use traits::ConnectorFacade;
pub use types::{CapabilitySet, ConnectorCapability};

/// Prelude module for convenient imports.
///
/// ```
/// use propel_connector::prelude::*;
/// ```
pub mod prelude {
    // Types and enums
    pub use crate::types::{
        CapabilitySet, ConnectorCapability, PropagationMode, ResourceOperation, TraceLevel,
    };

    // Error handling
    pub use crate::error::{ConnectorError, ConnectorResult};

    // Traits
    pub use crate::traits::{ConnectorFacade, SyncChange, SyncChangeType, SyncResult};

    // Schema
    pub use crate::schema::{ObjectClass, Schema, SchemaAttribute};

    // Operations
    pub use crate::operation::{
        Attribute, AttributeSet, AttributeValue, ConnectorObject, Uid, ENABLE_ATTR,
        MANDATORY_MISSING_ATTR, NAME_ATTR, PASSWORD_ATTR, UID_ATTR,
    };

    // Configuration
    pub use crate::config::ConnectorInstance;

    // Crypto
    pub use crate::crypto::CipherAlgorithm;

    // Mapping
    pub use crate::mapping::{ItemSource, Mapping, MappingItem, MappingPurpose, Transform};

    // Transform engine
    pub use crate::transform::TransformEngine;

    // Gateway
    pub use crate::gateway::{
        ConnectorGateway, GatewayError, GatewayOperation, GatewayResult, DEFAULT_REQUEST_TIMEOUT,
    };
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _mode = PropagationMode::TwoPhases;
        let _op = ResourceOperation::Update;
        let _caps = CapabilitySet::empty().with(ConnectorCapability::Sync);
        let _uid = Uid::from_value("jdoe");
        let _attrs = AttributeSet::new().with(NAME_ATTR, "jdoe");
        let _item = MappingItem::plain("mail", "email");
        let _alg = CipherAlgorithm::Sha1;
    }
}
