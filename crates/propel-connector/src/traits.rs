//! Connector facade trait
//!
//! The uniform client every external resource is reached through. The
//! gateway decides whether a call may be made; implementations only perform
//! it.

use async_trait::async_trait;

use crate::error::{ConnectorError, ConnectorResult};
use crate::operation::{AttributeSet, ConnectorObject, Uid};
use crate::schema::Schema;

/// Client for one external resource.
///
/// Implementations must be cheap to share behind an `Arc`: the gateway moves
/// a clone into a spawned task for every call so that the call can be
/// cancelled independently of the caller.
#[async_trait]
pub trait ConnectorFacade: Send + Sync {
    /// Display name of this connector instance.
    fn display_name(&self) -> &str;

    /// Create an object and return its uid.
    async fn create(&self, object_class: &str, attributes: AttributeSet) -> ConnectorResult<Uid>;

    /// Replace the given attributes on an existing object.
    ///
    /// Returns the uid after the update, which differs from `uid` on rename.
    async fn update(
        &self,
        object_class: &str,
        uid: &Uid,
        attributes: AttributeSet,
    ) -> ConnectorResult<Uid>;

    /// Delete an object.
    async fn delete(&self, object_class: &str, uid: &Uid) -> ConnectorResult<()>;

    /// Read one object, returning only `attributes_to_get` when non-empty.
    async fn get_object(
        &self,
        object_class: &str,
        uid: &Uid,
        attributes_to_get: &[String],
    ) -> ConnectorResult<Option<ConnectorObject>>;

    /// Fetch changes since `token`.
    async fn sync(&self, object_class: &str, token: Option<&str>) -> ConnectorResult<SyncResult> {
        let _ = (object_class, token);
        Err(ConnectorError::UnsupportedOperation {
            operation: "sync".to_string(),
        })
    }

    /// Current sync token of the target system.
    async fn latest_sync_token(&self, object_class: &str) -> ConnectorResult<Option<String>> {
        let _ = object_class;
        Err(ConnectorError::UnsupportedOperation {
            operation: "latest_sync_token".to_string(),
        })
    }

    /// Schema of the target system.
    async fn schema(&self) -> ConnectorResult<Schema>;

    /// Test the connection to the target system.
    async fn test(&self) -> ConnectorResult<()>;

    /// Validate the connector configuration without contacting the target.
    async fn validate(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

/// A change detected on a target system.
#[derive(Debug, Clone)]
pub struct SyncChange {
    pub uid: Uid,
    pub change_type: SyncChangeType,
    pub object_class: String,
    /// Current attributes of the object (for create/update).
    pub attributes: Option<AttributeSet>,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

impl SyncChange {
    pub fn created(uid: Uid, object_class: impl Into<String>, attributes: AttributeSet) -> Self {
        Self {
            uid,
            change_type: SyncChangeType::Create,
            object_class: object_class.into(),
            attributes: Some(attributes),
            timestamp: None,
        }
    }

    pub fn updated(uid: Uid, object_class: impl Into<String>, attributes: AttributeSet) -> Self {
        Self {
            uid,
            change_type: SyncChangeType::Update,
            object_class: object_class.into(),
            attributes: Some(attributes),
            timestamp: None,
        }
    }

    pub fn deleted(uid: Uid, object_class: impl Into<String>) -> Self {
        Self {
            uid,
            change_type: SyncChangeType::Delete,
            object_class: object_class.into(),
            attributes: None,
            timestamp: None,
        }
    }
}

/// Type of change detected during synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncChangeType {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for SyncChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncChangeType::Create => write!(f, "create"),
            SyncChangeType::Update => write!(f, "update"),
            SyncChangeType::Delete => write!(f, "delete"),
        }
    }
}

/// Changes fetched by one sync call.
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub changes: Vec<SyncChange>,
    /// Token to resume from; `None` when unchanged.
    pub new_token: Option<String>,
}

impl SyncResult {
    #[must_use]
    pub fn with_changes(changes: Vec<SyncChange>) -> Self {
        Self {
            changes,
            new_token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.new_token = Some(token.into());
        self
    }
}
