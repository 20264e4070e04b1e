//! Connector Capability Gateway
//!
//! Every call to an external resource goes through a [`ConnectorGateway`]. The
//! gateway checks the capability the call needs against the capabilities the
//! connector instance declares, then runs the call on its own task under a
//! deadline. When the deadline passes the task is aborted and the caller gets
//! [`GatewayError::Timeout`].
//!
//! A gateway is built per resource and carries no state between calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ConnectorInstance;
use crate::error::{ConnectorError, ConnectorResult};
use crate::operation::{AttributeSet, ConnectorObject, Uid};
use crate::schema::Schema;
use crate::traits::{ConnectorFacade, SyncResult};
use crate::types::{CapabilitySet, ConnectorCapability, PropagationMode, ResourceOperation};

/// Default per-call deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Operation dispatched through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOperation {
    Create,
    Update,
    Delete,
    GetObject,
    Sync,
    LatestSyncToken,
    Schema,
    Test,
    Validate,
}

impl GatewayOperation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayOperation::Create => "create",
            GatewayOperation::Update => "update",
            GatewayOperation::Delete => "delete",
            GatewayOperation::GetObject => "get_object",
            GatewayOperation::Sync => "sync",
            GatewayOperation::LatestSyncToken => "latest_sync_token",
            GatewayOperation::Schema => "schema",
            GatewayOperation::Test => "test",
            GatewayOperation::Validate => "validate",
        }
    }
}

impl std::fmt::Display for GatewayOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ResourceOperation> for GatewayOperation {
    fn from(operation: ResourceOperation) -> Self {
        match operation {
            ResourceOperation::Create => GatewayOperation::Create,
            ResourceOperation::Update => GatewayOperation::Update,
            ResourceOperation::Delete => GatewayOperation::Delete,
        }
    }
}

/// Outcome of a gateway call other than success.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The connector lacks the capability; nothing was sent.
    #[error(
        "{operation} was attempted on '{resource}', although the connector only has these capabilities: {capabilities}. No action."
    )]
    CapabilityNotSupported {
        resource: String,
        operation: GatewayOperation,
        required: ConnectorCapability,
        capabilities: CapabilitySet,
    },

    /// The call did not finish before the deadline and was cancelled.
    #[error("request timeout")]
    Timeout {
        operation: GatewayOperation,
        timeout: Duration,
    },

    /// The connector returned an error.
    #[error("{source}")]
    Connector {
        operation: GatewayOperation,
        #[source]
        source: ConnectorError,
    },

    /// The spawned call panicked or was cancelled from elsewhere.
    #[error("{operation} did not complete: {message}")]
    Join {
        operation: GatewayOperation,
        message: String,
    },
}

impl GatewayError {
    /// Whether the call was skipped rather than failed.
    #[must_use]
    pub fn is_not_attempted(&self) -> bool {
        matches!(self, GatewayError::CapabilityNotSupported { .. })
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout { .. })
    }

    /// The wrapped connector error, if any.
    #[must_use]
    pub fn connector_error(&self) -> Option<&ConnectorError> {
        match self {
            GatewayError::Connector { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Capability-gated, deadline-bounded access to one resource's connector.
#[derive(Clone)]
pub struct ConnectorGateway {
    resource: String,
    capabilities: CapabilitySet,
    timeout: Duration,
    facade: Arc<dyn ConnectorFacade>,
}

impl std::fmt::Debug for ConnectorGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorGateway")
            .field("resource", &self.resource)
            .field("connector", &self.facade.display_name())
            .field("capabilities", &self.capabilities)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ConnectorGateway {
    /// Build a gateway for `resource`.
    ///
    /// The instance's own request timeout wins over `default_timeout`.
    pub fn new(
        resource: impl Into<String>,
        instance: &ConnectorInstance,
        facade: Arc<dyn ConnectorFacade>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            resource: resource.into(),
            capabilities: instance.capabilities,
            timeout: instance.request_timeout().unwrap_or(default_timeout),
            facade,
        }
    }

    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    #[must_use]
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fail with [`GatewayError::CapabilityNotSupported`] unless `required`
    /// is declared.
    pub fn check(
        &self,
        operation: GatewayOperation,
        required: ConnectorCapability,
    ) -> GatewayResult<()> {
        if self.capabilities.contains(required) {
            return Ok(());
        }
        info!(
            resource = %self.resource,
            operation = %operation,
            required = %required,
            capabilities = %self.capabilities,
            "Operation attempted without the required connector capability, no action"
        );
        Err(GatewayError::CapabilityNotSupported {
            resource: self.resource.clone(),
            operation,
            required,
            capabilities: self.capabilities,
        })
    }

    pub async fn create(
        &self,
        mode: PropagationMode,
        object_class: &str,
        attributes: AttributeSet,
    ) -> GatewayResult<Uid> {
        let operation = GatewayOperation::Create;
        self.check(
            operation,
            ConnectorCapability::required_for(ResourceOperation::Create, mode),
        )?;

        let facade = Arc::clone(&self.facade);
        let object_class = object_class.to_string();
        self.dispatch(operation, async move {
            facade.create(&object_class, attributes).await
        })
        .await
    }

    pub async fn update(
        &self,
        mode: PropagationMode,
        object_class: &str,
        uid: &Uid,
        attributes: AttributeSet,
    ) -> GatewayResult<Uid> {
        let operation = GatewayOperation::Update;
        self.check(
            operation,
            ConnectorCapability::required_for(ResourceOperation::Update, mode),
        )?;

        let facade = Arc::clone(&self.facade);
        let object_class = object_class.to_string();
        let uid = uid.clone();
        self.dispatch(operation, async move {
            facade.update(&object_class, &uid, attributes).await
        })
        .await
    }

    pub async fn delete(
        &self,
        mode: PropagationMode,
        object_class: &str,
        uid: &Uid,
    ) -> GatewayResult<()> {
        let operation = GatewayOperation::Delete;
        self.check(
            operation,
            ConnectorCapability::required_for(ResourceOperation::Delete, mode),
        )?;

        let facade = Arc::clone(&self.facade);
        let object_class = object_class.to_string();
        let uid = uid.clone();
        self.dispatch(operation, async move { facade.delete(&object_class, &uid).await })
            .await
    }

    /// Read one object.
    ///
    /// Needs `SEARCH`. When `on_behalf_of` names a propagation operation and
    /// mode, the capability for that operation is required as well.
    pub async fn get_object(
        &self,
        on_behalf_of: Option<(ResourceOperation, PropagationMode)>,
        object_class: &str,
        uid: &Uid,
        attributes_to_get: &[String],
    ) -> GatewayResult<Option<ConnectorObject>> {
        let operation = GatewayOperation::GetObject;
        self.check(operation, ConnectorCapability::Search)?;
        if let Some((resource_operation, mode)) = on_behalf_of {
            self.check(
                operation,
                ConnectorCapability::required_for(resource_operation, mode),
            )?;
        }

        let facade = Arc::clone(&self.facade);
        let object_class = object_class.to_string();
        let uid = uid.clone();
        let attributes_to_get = attributes_to_get.to_vec();
        self.dispatch(operation, async move {
            facade
                .get_object(&object_class, &uid, &attributes_to_get)
                .await
        })
        .await
    }

    pub async fn sync(&self, object_class: &str, token: Option<&str>) -> GatewayResult<SyncResult> {
        let operation = GatewayOperation::Sync;
        self.check(operation, ConnectorCapability::Sync)?;

        let facade = Arc::clone(&self.facade);
        let object_class = object_class.to_string();
        let token = token.map(str::to_string);
        self.dispatch(operation, async move {
            facade.sync(&object_class, token.as_deref()).await
        })
        .await
    }

    pub async fn latest_sync_token(&self, object_class: &str) -> GatewayResult<Option<String>> {
        let operation = GatewayOperation::LatestSyncToken;
        self.check(operation, ConnectorCapability::Sync)?;

        let facade = Arc::clone(&self.facade);
        let object_class = object_class.to_string();
        self.dispatch(operation, async move {
            facade.latest_sync_token(&object_class).await
        })
        .await
    }

    pub async fn schema(&self) -> GatewayResult<Schema> {
        let facade = Arc::clone(&self.facade);
        self.dispatch(GatewayOperation::Schema, async move { facade.schema().await })
            .await
    }

    /// Attribute names of the resource schema.
    pub async fn schema_names(&self, show_all: bool) -> GatewayResult<Vec<String>> {
        Ok(self.schema().await?.attribute_names(show_all))
    }

    pub async fn test(&self) -> GatewayResult<()> {
        let facade = Arc::clone(&self.facade);
        self.dispatch(GatewayOperation::Test, async move { facade.test().await })
            .await
    }

    pub async fn validate(&self) -> GatewayResult<()> {
        let facade = Arc::clone(&self.facade);
        self.dispatch(GatewayOperation::Validate, async move { facade.validate().await })
            .await
    }

    /// Run `call` on its own task and wait for it at most `self.timeout`.
    async fn dispatch<T, F>(&self, operation: GatewayOperation, call: F) -> GatewayResult<T>
    where
        T: Send + 'static,
        F: Future<Output = ConnectorResult<T>> + Send + 'static,
    {
        debug!(
            resource = %self.resource,
            operation = %operation,
            timeout_ms = self.timeout.as_millis() as u64,
            "Dispatching connector call"
        );

        let mut handle = tokio::spawn(call);
        match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(source))) => {
                warn!(
                    resource = %self.resource,
                    operation = %operation,
                    error_code = source.error_code(),
                    transient = source.is_transient(),
                    cause = %source.root_cause_message(),
                    "Connector call failed"
                );
                Err(GatewayError::Connector { operation, source })
            }
            Ok(Err(join_err)) => {
                warn!(
                    resource = %self.resource,
                    operation = %operation,
                    error = %join_err,
                    "Connector call did not complete"
                );
                Err(GatewayError::Join {
                    operation,
                    message: join_err.to_string(),
                })
            }
            Err(_) => {
                handle.abort();
                warn!(
                    resource = %self.resource,
                    operation = %operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Connector call timed out and was cancelled"
                );
                Err(GatewayError::Timeout {
                    operation,
                    timeout: self.timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::NAME_ATTR;
    use crate::traits::SyncChange;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Sets its flag when dropped, i.e. when the call future is cancelled.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct SlowConnector {
        calls: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
        dropped: Arc<AtomicBool>,
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ConnectorFacade for SlowConnector {
        fn display_name(&self) -> &str {
            "slow"
        }

        async fn create(&self, _object_class: &str, attributes: AttributeSet) -> ConnectorResult<Uid> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _guard = DropFlag(Arc::clone(&self.dropped));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(ConnectorError::ConstraintViolation {
                    message: "mail already taken".to_string(),
                });
            }
            self.finished.store(true, Ordering::SeqCst);
            Ok(Uid::from_value(attributes.name().unwrap_or_default()))
        }

        async fn update(
            &self,
            _object_class: &str,
            uid: &Uid,
            _attributes: AttributeSet,
        ) -> ConnectorResult<Uid> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(uid.clone())
        }

        async fn delete(&self, _object_class: &str, _uid: &Uid) -> ConnectorResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn get_object(
            &self,
            object_class: &str,
            uid: &Uid,
            _attributes_to_get: &[String],
        ) -> ConnectorResult<Option<ConnectorObject>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(ConnectorObject::new(object_class, uid.clone(), uid.value())))
        }

        async fn sync(&self, object_class: &str, token: Option<&str>) -> ConnectorResult<SyncResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let changes = match token {
                None => vec![
                    SyncChange::created(
                        Uid::from_value("jdoe"),
                        object_class,
                        AttributeSet::new().with(NAME_ATTR, "jdoe"),
                    ),
                    SyncChange::deleted(Uid::from_value("asmith"), object_class),
                ],
                Some(_) => Vec::new(),
            };
            Ok(SyncResult::with_changes(changes).with_token("42"))
        }

        async fn schema(&self) -> ConnectorResult<Schema> {
            Ok(Schema::new())
        }

        async fn test(&self) -> ConnectorResult<()> {
            Ok(())
        }
    }

    fn gateway(connector: Arc<SlowConnector>, capabilities: CapabilitySet) -> ConnectorGateway {
        let instance = ConnectorInstance::new("slow").with_capabilities(capabilities);
        ConnectorGateway::new("res", &instance, connector, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_create_success_returns_result_unchanged() {
        let connector = Arc::new(SlowConnector::default());
        let gw = gateway(
            Arc::clone(&connector),
            CapabilitySet::empty().with(ConnectorCapability::OnePhaseCreate),
        );

        let uid = gw
            .create(
                PropagationMode::OnePhase,
                "__ACCOUNT__",
                AttributeSet::new().with(NAME_ATTR, "jdoe"),
            )
            .await
            .unwrap();

        assert_eq!(uid.value(), "jdoe");
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_capability_skips_call() {
        let connector = Arc::new(SlowConnector::default());
        let gw = gateway(
            Arc::clone(&connector),
            CapabilitySet::empty().with(ConnectorCapability::OnePhaseCreate),
        );

        let err = gw
            .create(PropagationMode::TwoPhases, "__ACCOUNT__", AttributeSet::new())
            .await
            .unwrap_err();

        assert!(err.is_not_attempted());
        assert!(matches!(
            err,
            GatewayError::CapabilityNotSupported {
                required: ConnectorCapability::TwoPhasesCreate,
                ..
            }
        ));
        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_cancels_in_flight_call() {
        let connector = Arc::new(SlowConnector {
            delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let gw = gateway(
            Arc::clone(&connector),
            CapabilitySet::empty().with(ConnectorCapability::OnePhaseCreate),
        );

        let started = std::time::Instant::now();
        let err = gw
            .create(PropagationMode::OnePhase, "__ACCOUNT__", AttributeSet::new())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "request timeout");
        assert!(started.elapsed() < Duration::from_secs(5));

        // Give the runtime a moment to drop the aborted task.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(connector.dropped.load(Ordering::SeqCst));
        assert!(!connector.finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_connector_error_preserves_cause() {
        let connector = Arc::new(SlowConnector {
            fail: true,
            ..Default::default()
        });
        let gw = gateway(
            Arc::clone(&connector),
            CapabilitySet::empty().with(ConnectorCapability::OnePhaseCreate),
        );

        let err = gw
            .create(PropagationMode::OnePhase, "__ACCOUNT__", AttributeSet::new())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "constraint violation: mail already taken");
        assert_eq!(
            err.connector_error().map(ConnectorError::error_code),
            Some("CONSTRAINT_VIOLATION")
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn test_get_object_requires_search_and_operation_capability() {
        let connector = Arc::new(SlowConnector::default());
        let gw = gateway(
            Arc::clone(&connector),
            CapabilitySet::empty().with(ConnectorCapability::Search),
        );
        let uid = Uid::from_value("jdoe");

        // Plain read only needs SEARCH.
        let obj = gw.get_object(None, "__ACCOUNT__", &uid, &[]).await.unwrap();
        assert!(obj.is_some());

        // On behalf of an update it also needs the update capability.
        let err = gw
            .get_object(
                Some((ResourceOperation::Update, PropagationMode::OnePhase)),
                "__ACCOUNT__",
                &uid,
                &[],
            )
            .await
            .unwrap_err();
        assert!(err.is_not_attempted());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sync_needs_capability_and_schema_does_not() {
        let connector = Arc::new(SlowConnector::default());
        let gw = gateway(Arc::clone(&connector), CapabilitySet::empty());

        assert!(gw.sync("__ACCOUNT__", None).await.unwrap_err().is_not_attempted());
        assert!(gw.schema_names(false).await.unwrap().is_empty());
        assert!(gw.test().await.is_ok());
        assert!(gw.validate().await.is_ok());
    }

    #[tokio::test]
    async fn test_sync_returns_changes_and_token() {
        let connector = Arc::new(SlowConnector::default());
        let gw = gateway(
            Arc::clone(&connector),
            CapabilitySet::empty().with(ConnectorCapability::Sync),
        );

        let result = gw.sync("__ACCOUNT__", None).await.unwrap();
        let kinds: Vec<String> = result
            .changes
            .iter()
            .map(|c| c.change_type.to_string())
            .collect();
        assert_eq!(kinds, vec!["create", "delete"]);
        assert_eq!(result.new_token.as_deref(), Some("42"));

        let again = gw.sync("__ACCOUNT__", Some("42")).await.unwrap();
        assert!(again.changes.is_empty());
    }

    #[test]
    fn test_instance_timeout_overrides_default() {
        let connector: Arc<dyn ConnectorFacade> = Arc::new(SlowConnector::default());
        let instance = ConnectorInstance::new("slow").with_request_timeout(5);
        let gw = ConnectorGateway::new("res", &instance, connector, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(gw.timeout(), Duration::from_secs(5));
    }
}
