//! Common test utilities for propagation integration tests.
//!
//! Connectors are in-memory mocks sharing a call log, so tests can assert the
//! order in which resources were reached.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;

use propel_connector::error::{ConnectorError, ConnectorResult};
use propel_connector::operation::{
    is_operational, AttributeSet, ConnectorObject, Uid, NAME_ATTR, UID_ATTR,
};
use propel_connector::schema::Schema;
use propel_connector::traits::ConnectorFacade;
use propel_propagation::error::PropagationResult;
use propel_propagation::history::ExecutionSink;
use propel_propagation::notify::PropagationNotifier;
use propel_propagation::reporter::PropagationStatus;
use propel_propagation::task::{PropagationTask, TaskExecution};

static INIT: Once = Once::new();

/// Install a tracing subscriber once, only when `RUST_LOG` is set.
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }
    });
}

/// Write calls made across all mock connectors of a test, as `resource:op`.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// In-memory connector.
pub struct MockConnector {
    resource: String,
    log: CallLog,
    objects: Mutex<HashMap<String, ConnectorObject>>,
    received: Mutex<Vec<AttributeSet>>,
    fail_with: Option<String>,
    delay: Option<Duration>,
}

impl MockConnector {
    pub fn new(resource: &str, log: &CallLog) -> Self {
        Self {
            resource: resource.to_string(),
            log: Arc::clone(log),
            objects: Mutex::new(HashMap::new()),
            received: Mutex::new(Vec::new()),
            fail_with: None,
            delay: None,
        }
    }

    /// Every write call fails with a connector error carrying `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    /// Every write call sleeps for `delay` first.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Seed an existing remote object.
    pub fn with_object(self, uid: &str, name: &str, attributes: AttributeSet) -> Self {
        let obj = ConnectorObject::new("__ACCOUNT__", Uid::from_value(uid), name)
            .with_attributes(attributes);
        self.objects
            .lock()
            .unwrap()
            .insert(uid.to_string(), obj);
        self
    }

    pub fn object(&self, uid: &str) -> Option<ConnectorObject> {
        self.objects.lock().unwrap().get(uid).cloned()
    }

    /// Attribute sets passed to create and update, in call order.
    pub fn received(&self) -> Vec<AttributeSet> {
        self.received.lock().unwrap().clone()
    }

    async fn write_call(&self, operation: &str, attributes: Option<&AttributeSet>) -> ConnectorResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{operation}", self.resource));
        if let Some(attributes) = attributes {
            self.received.lock().unwrap().push(attributes.clone());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail_with {
            Some(message) => Err(ConnectorError::operation_failed(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConnectorFacade for MockConnector {
    fn display_name(&self) -> &str {
        &self.resource
    }

    async fn create(&self, object_class: &str, attributes: AttributeSet) -> ConnectorResult<Uid> {
        self.write_call("create", Some(&attributes)).await?;

        let name = attributes.name().unwrap_or_default().to_string();
        let uid = attributes
            .get_string(UID_ATTR)
            .map_or_else(|| name.clone(), str::to_string);
        let mut stored = attributes.clone();
        stored.retain(|a| !is_operational(a.name()));

        let obj = ConnectorObject::new(object_class, Uid::from_value(uid.clone()), name)
            .with_attributes(stored);
        self.objects.lock().unwrap().insert(uid.clone(), obj);
        Ok(Uid::from_value(uid))
    }

    async fn update(
        &self,
        _object_class: &str,
        uid: &Uid,
        attributes: AttributeSet,
    ) -> ConnectorResult<Uid> {
        self.write_call("update", Some(&attributes)).await?;

        let mut objects = self.objects.lock().unwrap();
        let obj = objects
            .get_mut(uid.value())
            .ok_or_else(|| ConnectorError::ObjectNotFound {
                identifier: uid.value().to_string(),
            })?;
        for attribute in attributes {
            if attribute.name() == NAME_ATTR {
                obj.name = attribute.first_string().unwrap_or_default().to_string();
            } else if !is_operational(attribute.name()) {
                obj.attributes.set(attribute);
            }
        }
        Ok(uid.clone())
    }

    async fn delete(&self, _object_class: &str, uid: &Uid) -> ConnectorResult<()> {
        self.write_call("delete", None).await?;
        self.objects.lock().unwrap().remove(uid.value());
        Ok(())
    }

    async fn get_object(
        &self,
        _object_class: &str,
        uid: &Uid,
        _attributes_to_get: &[String],
    ) -> ConnectorResult<Option<ConnectorObject>> {
        Ok(self.objects.lock().unwrap().get(uid.value()).cloned())
    }

    async fn schema(&self) -> ConnectorResult<Schema> {
        Ok(Schema::default())
    }

    async fn test(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

/// History sink keeping every execution it is given.
#[derive(Default)]
pub struct RecordingSink {
    executions: Mutex<Vec<TaskExecution>>,
}

impl RecordingSink {
    pub fn executions(&self) -> Vec<TaskExecution> {
        self.executions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionSink for RecordingSink {
    async fn save_exec(&self, execution: &TaskExecution) -> PropagationResult<()> {
        self.executions.lock().unwrap().push(execution.clone());
        Ok(())
    }
}

/// Notifier keeping the statuses and task resources of each run.
#[derive(Default)]
pub struct RecordingNotifier {
    runs: Mutex<Vec<(Vec<PropagationStatus>, Vec<String>)>>,
}

impl RecordingNotifier {
    pub fn runs(&self) -> Vec<(Vec<PropagationStatus>, Vec<String>)> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl PropagationNotifier for RecordingNotifier {
    async fn notify(
        &self,
        statuses: &[PropagationStatus],
        tasks: &[PropagationTask],
    ) -> PropagationResult<()> {
        let resources = tasks.iter().map(|t| t.resource_name().to_string()).collect();
        self.runs.lock().unwrap().push((statuses.to_vec(), resources));
        Ok(())
    }
}
