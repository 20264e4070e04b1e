//! Priority execution of propagation tasks.
//!
//! Tasks run one at a time, ordered by their resource's priority. Each task
//! goes through its resource's gateway; the outcome is recorded on the
//! reporter, optionally handed to the history sink, and a failure on a
//! primary resource aborts the run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};

use propel_connector::gateway::ConnectorGateway;
use propel_connector::operation::{
    Attribute, AttributeSet, ConnectorObject, Uid, MANDATORY_MISSING_ATTR, NAME_ATTR, UID_ATTR,
};
use propel_connector::types::{ConnectorCapability, ResourceOperation};

use crate::actions::ActionsRegistry;
use crate::config::PropagationConfig;
use crate::error::{PropagationError, PropagationResult};
use crate::history::{ExecutionSink, NoopExecutionSink};
use crate::ids::RunId;
use crate::notify::{NoopNotifier, PropagationNotifier};
use crate::provider::ConnectorProvider;
use crate::reporter::{DefaultPropagationReporter, PropagationReporter, PropagationStatus};
use crate::subject::Subject;
use crate::task::{ExecStatus, PropagationTask, TaskExecution};

/// What a remote read found.
#[derive(Debug, Clone)]
enum Remote {
    /// The read was not possible.
    Unknown,
    Missing,
    Found(ConnectorObject),
}

impl Remote {
    fn object(&self) -> Option<&ConnectorObject> {
        match self {
            Remote::Found(obj) => Some(obj),
            Remote::Unknown | Remote::Missing => None,
        }
    }

    fn into_object(self) -> Option<ConnectorObject> {
        match self {
            Remote::Found(obj) => Some(obj),
            Remote::Unknown | Remote::Missing => None,
        }
    }
}

/// What the connector was asked to do.
#[derive(Debug)]
enum Dispatched {
    Created(Uid),
    Updated(Uid),
    Unchanged(Uid),
    Deleted,
    NothingToDelete,
}

impl Dispatched {
    fn uid(&self) -> Option<&Uid> {
        match self {
            Dispatched::Created(uid) | Dispatched::Updated(uid) | Dispatched::Unchanged(uid) => {
                Some(uid)
            }
            Dispatched::Deleted | Dispatched::NothingToDelete => None,
        }
    }
}

struct TaskOutcome {
    status: ExecStatus,
    message: Option<String>,
    before: Option<ConnectorObject>,
    after: Option<ConnectorObject>,
    started_at: DateTime<Utc>,
}

impl TaskOutcome {
    fn not_attempted(started_at: DateTime<Utc>) -> Self {
        Self {
            status: ExecStatus::NotAttempted,
            message: None,
            before: None,
            after: None,
            started_at,
        }
    }
}

/// Attributes of `prepared` that differ from the remote object.
///
/// `__NAME__` is kept only when it changes. An empty attribute the remote
/// object does not have is not a change.
#[must_use]
pub fn strictly_modified(prepared: &AttributeSet, before: &ConnectorObject) -> AttributeSet {
    prepared
        .iter()
        .filter(|attr| {
            if attr.name() == NAME_ATTR {
                return attr.first_string() != Some(before.name.as_str());
            }
            match before.attribute(attr.name()) {
                Some(current) => !attr.same_values(current),
                None => !attr.is_empty(),
            }
        })
        .cloned()
        .collect()
}

/// Operation actually sent for `task`. A delete for a subject still assigned
/// to the resource becomes an update.
fn effective_operation(subject: &Subject, task: &PropagationTask) -> ResourceOperation {
    if task.operation == ResourceOperation::Delete && subject.has_resource(task.resource_name()) {
        ResourceOperation::Update
    } else {
        task.operation
    }
}

/// Order tasks by resource priority, keeping plan order on ties.
pub fn sort_by_priority(tasks: &mut [PropagationTask]) {
    tasks.sort_by_key(|t| t.resource.priority_key());
}

/// Sequential, priority-ordered task executor.
pub struct PriorityExecutor {
    config: PropagationConfig,
    provider: Arc<dyn ConnectorProvider>,
    actions: Arc<ActionsRegistry>,
    sink: Arc<dyn ExecutionSink>,
    notifier: Arc<dyn PropagationNotifier>,
}

impl std::fmt::Debug for PriorityExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityExecutor")
            .field("config", &self.config)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

impl PriorityExecutor {
    #[must_use]
    pub fn new(config: PropagationConfig, provider: Arc<dyn ConnectorProvider>) -> Self {
        Self {
            config,
            provider,
            actions: Arc::new(ActionsRegistry::new()),
            sink: Arc::new(NoopExecutionSink),
            notifier: Arc::new(NoopNotifier),
        }
    }

    #[must_use]
    pub fn with_actions(mut self, actions: Arc<ActionsRegistry>) -> Self {
        self.actions = actions;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn ExecutionSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn PropagationNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Run `tasks` and return one status per attempted resource.
    pub async fn execute(
        &self,
        subject: &Subject,
        tasks: Vec<PropagationTask>,
    ) -> Vec<PropagationStatus> {
        let mut reporter = DefaultPropagationReporter::new();
        if let Err(e) = self.execute_with(subject, tasks, &mut reporter).await {
            debug!(error = %e, "Propagation run ended early");
        }
        reporter.into_statuses()
    }

    /// Run `tasks`, recording outcomes on `reporter`.
    ///
    /// Returns [`PropagationError::PrimaryResourceFailure`] when a primary
    /// resource did not succeed. The reporter is complete either way: tasks
    /// left unexecuted are recorded as cascade failures.
    #[instrument(skip_all, fields(subject = %subject.key, task_count = tasks.len()))]
    pub async fn execute_with<R>(
        &self,
        subject: &Subject,
        mut tasks: Vec<PropagationTask>,
        reporter: &mut R,
    ) -> PropagationResult<()>
    where
        R: PropagationReporter + ?Sized,
    {
        let run_id = RunId::new();
        sort_by_priority(&mut tasks);
        info!(run_id = %run_id, task_count = tasks.len(), "Executing propagation tasks");

        let mut aborted: Option<PropagationError> = None;

        for index in 0..tasks.len() {
            let outcome = self.execute_task(subject, &mut tasks[index]).await;
            let task = &tasks[index];

            if outcome.status == ExecStatus::NotAttempted {
                continue;
            }

            let failed = !outcome.status.is_successful();
            let reason = outcome.message.clone();
            reporter.record(
                task.resource_name(),
                outcome.status,
                outcome.message,
                outcome.before,
                outcome.after,
            );

            if failed && task.is_primary() {
                error!(
                    run_id = %run_id,
                    resource = %task.resource_name(),
                    status = %outcome.status,
                    "Propagation failed on primary resource, aborting remaining tasks"
                );
                let cascade_reason = self.config.cascade_reason(task.resource_name());
                for rest in &tasks[index + 1..] {
                    if !reporter.contains(rest.resource_name()) {
                        reporter.record(
                            rest.resource_name(),
                            ExecStatus::Failure,
                            Some(cascade_reason.clone()),
                            None,
                            None,
                        );
                    }
                }
                aborted = Some(PropagationError::PrimaryResourceFailure {
                    resource: task.resource_name().to_string(),
                    reason: reason.unwrap_or_else(|| outcome.status.to_string()),
                });
                break;
            }
        }

        if let Err(e) = self.notifier.notify(reporter.statuses(), &tasks).await {
            warn!(run_id = %run_id, error = %e, "Could not notify propagation outcome");
        }

        info!(
            run_id = %run_id,
            recorded = reporter.statuses().len(),
            aborted = aborted.is_some(),
            "Propagation run completed"
        );

        match aborted {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    #[instrument(skip_all, fields(
        task_id = %task.id,
        resource = %task.resource_name(),
        operation = %task.operation,
        mode = %task.mode
    ))]
    async fn execute_task(&self, subject: &Subject, task: &mut PropagationTask) -> TaskOutcome {
        let started_at = Utc::now();

        let Some(facade) = self.provider.connector(task.resource_name()) else {
            let e = PropagationError::ConnectorNotFound {
                name: task.resource_name().to_string(),
            };
            error!(error = %e, "Cannot propagate");
            let outcome = TaskOutcome {
                status: ExecStatus::for_outcome(task.mode, false),
                message: Some(e.to_string()),
                before: None,
                after: None,
                started_at,
            };
            self.register(subject, task, &outcome, None).await;
            return outcome;
        };
        let gateway = ConnectorGateway::new(
            task.resource_name(),
            &task.resource.connector,
            facade,
            self.config.request_timeout(),
        );

        let operation = effective_operation(subject, task);
        if operation != task.operation {
            info!("Subject is still assigned to the resource, updating instead of deleting");
        }
        if gateway
            .check(
                operation.into(),
                ConnectorCapability::required_for(operation, task.mode),
            )
            .is_err()
        {
            return TaskOutcome::not_attempted(started_at);
        }

        let lookup = task.lookup_account_id().map(str::to_string);
        let before = self
            .read_remote(&gateway, task, operation, lookup.as_deref())
            .await;

        if let Err(e) = self
            .actions
            .run_before(subject, task, before.object())
            .await
        {
            let outcome = TaskOutcome {
                status: ExecStatus::for_outcome(task.mode, false),
                message: Some(PropagationError::from(e).to_string()),
                before: before.into_object(),
                after: None,
                started_at,
            };
            self.register(subject, task, &outcome, None).await;
            return outcome;
        }
        task.attributes.remove(MANDATORY_MISSING_ATTR);

        let outcome = match self.dispatch(&gateway, task, operation, &before).await {
            Ok(dispatched) => {
                let after = match dispatched.uid() {
                    Some(uid) => self
                        .read_remote(&gateway, task, operation, Some(uid.value()))
                        .await
                        .into_object(),
                    None => None,
                };
                TaskOutcome {
                    status: ExecStatus::for_outcome(task.mode, true),
                    message: None,
                    before: before.into_object(),
                    after,
                    started_at,
                }
            }
            Err(PropagationError::Gateway(e)) if e.is_not_attempted() => {
                return TaskOutcome::not_attempted(started_at);
            }
            Err(e) => {
                warn!(error = %e, "Propagation task failed");
                TaskOutcome {
                    status: ExecStatus::for_outcome(task.mode, false),
                    message: Some(e.to_string()),
                    before: before.into_object(),
                    after: None,
                    started_at,
                }
            }
        };

        self.register(subject, task, &outcome, outcome.after.as_ref())
            .await;
        outcome
    }

    async fn dispatch(
        &self,
        gateway: &ConnectorGateway,
        task: &PropagationTask,
        operation: ResourceOperation,
        before: &Remote,
    ) -> PropagationResult<Dispatched> {
        match operation {
            ResourceOperation::Create | ResourceOperation::Update => {
                self.create_or_update(gateway, task, operation, before).await
            }
            ResourceOperation::Delete => {
                let uid = match before {
                    Remote::Found(obj) => obj.uid.clone(),
                    Remote::Missing => {
                        debug!("Remote object not found, nothing to delete");
                        return Ok(Dispatched::NothingToDelete);
                    }
                    Remote::Unknown => Uid::from_value(self.account_id(task)?),
                };
                gateway.delete(task.mode, &task.object_class, &uid).await?;
                info!(target_uid = %uid, "Deleted account on resource");
                Ok(Dispatched::Deleted)
            }
        }
    }

    async fn create_or_update(
        &self,
        gateway: &ConnectorGateway,
        task: &PropagationTask,
        operation: ResourceOperation,
        before: &Remote,
    ) -> PropagationResult<Dispatched> {
        match before {
            Remote::Found(obj) => {
                let modified = strictly_modified(&task.attributes, obj);
                if modified.is_empty() {
                    debug!(target_uid = %obj.uid, "No changes to apply, skipping update");
                    return Ok(Dispatched::Unchanged(obj.uid.clone()));
                }
                let uid = gateway
                    .update(task.mode, &task.object_class, &obj.uid, modified)
                    .await?;
                info!(target_uid = %uid, "Updated account on resource");
                Ok(Dispatched::Updated(uid))
            }
            Remote::Unknown if operation == ResourceOperation::Update => {
                let uid = Uid::from_value(self.account_id(task)?);
                let uid = gateway
                    .update(task.mode, &task.object_class, &uid, task.attributes.clone())
                    .await?;
                info!(target_uid = %uid, "Updated account on resource");
                Ok(Dispatched::Updated(uid))
            }
            Remote::Unknown | Remote::Missing => {
                let mut attributes = task.attributes.clone();
                if let Some(account_id) = task.account_id.as_deref() {
                    if attributes.name() != Some(account_id) {
                        attributes.set(Attribute::single(UID_ATTR, account_id));
                    }
                }
                let uid = gateway
                    .create(task.mode, &task.object_class, attributes)
                    .await?;
                info!(target_uid = %uid, "Created account on resource");
                Ok(Dispatched::Created(uid))
            }
        }
    }

    fn account_id<'t>(&self, task: &'t PropagationTask) -> PropagationResult<&'t str> {
        task.lookup_account_id()
            .ok_or_else(|| PropagationError::MissingAccountId {
                resource: task.resource_name().to_string(),
            })
    }

    /// Read the remote object by `account_id`. Failures are logged, not
    /// propagated.
    async fn read_remote(
        &self,
        gateway: &ConnectorGateway,
        task: &PropagationTask,
        operation: ResourceOperation,
        account_id: Option<&str>,
    ) -> Remote {
        if !self.config.read_remote_objects {
            return Remote::Unknown;
        }
        let Some(account_id) = account_id else {
            return Remote::Missing;
        };
        let attributes_to_get = task
            .resource
            .provision(task.subject_kind)
            .map(|p| p.mapping.attributes_to_get())
            .unwrap_or_default();

        match gateway
            .get_object(
                Some((operation, task.mode)),
                &task.object_class,
                &Uid::from_value(account_id),
                &attributes_to_get,
            )
            .await
        {
            Ok(Some(obj)) => Remote::Found(obj),
            Ok(None) => Remote::Missing,
            Err(e) if e.is_not_attempted() => Remote::Unknown,
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "Could not read remote object");
                Remote::Unknown
            }
        }
    }

    /// Run after actions and hand the execution to the history sink.
    async fn register(
        &self,
        subject: &Subject,
        task: &PropagationTask,
        outcome: &TaskOutcome,
        after: Option<&ConnectorObject>,
    ) {
        let execution = TaskExecution {
            task_id: task.id,
            resource: task.resource_name().to_string(),
            operation: task.operation,
            status: outcome.status,
            message: outcome.message.clone(),
            started_at: outcome.started_at,
            ended_at: Utc::now(),
        };

        if let Err(e) = self
            .actions
            .run_after(subject, task, &execution, after)
            .await
        {
            error!(error = %e, "After action failed");
        }

        let failed = !outcome.status.is_successful();
        if task
            .resource
            .trace_level(task.operation)
            .should_register(failed)
        {
            if let Err(e) = self.sink.save_exec(&execution).await {
                warn!(task_id = %task.id, error = %e, "Could not save task execution");
            }
        } else {
            debug!(status = %outcome.status, "Execution not registered per trace level");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TaskId;
    use crate::resource::ExternalResource;
    use crate::subject::SubjectKind;
    use propel_connector::config::ConnectorInstance;
    use propel_connector::types::PropagationMode;

    fn task(resource: ExternalResource) -> PropagationTask {
        PropagationTask {
            id: TaskId::new(),
            subject_kind: SubjectKind::User,
            subject_key: "u-1".to_string(),
            resource: Arc::new(resource),
            operation: ResourceOperation::Update,
            mode: PropagationMode::OnePhase,
            object_class: "__ACCOUNT__".to_string(),
            account_id: None,
            old_account_id: None,
            attributes: AttributeSet::new(),
        }
    }

    fn named(name: &str, priority: Option<i32>) -> ExternalResource {
        let resource = ExternalResource::new(name, ConnectorInstance::new(name));
        match priority {
            Some(p) => resource.with_priority(p),
            None => resource,
        }
    }

    #[test]
    fn test_unprioritized_first_and_stable() {
        let mut tasks = vec![
            task(named("five", Some(5))),
            task(named("unset-a", None)),
            task(named("one", Some(1))),
            task(named("negative", Some(-100))),
            task(named("unset-b", None)),
            task(named("one-again", Some(1))),
            task(named("floor", Some(i32::MIN))),
        ];

        sort_by_priority(&mut tasks);

        let order: Vec<&str> = tasks.iter().map(PropagationTask::resource_name).collect();
        assert_eq!(
            order,
            vec!["unset-a", "unset-b", "floor", "negative", "one", "one-again", "five"]
        );
    }

    #[test]
    fn test_strictly_modified() {
        let before = ConnectorObject::new("__ACCOUNT__", Uid::from_value("jdoe"), "jdoe")
            .with_attributes(
                AttributeSet::new()
                    .with("mail", "jdoe@example.com")
                    .with("cn", "John"),
            );
        let prepared = AttributeSet::new()
            .with(NAME_ATTR, "jdoe")
            .with("mail", "jdoe@example.com")
            .with("cn", "John Doe")
            .with("sn", "Doe");
        let mut cleared = prepared.clone();
        cleared.merge(Attribute::new("description"));

        let modified = strictly_modified(&cleared, &before);

        let names: Vec<&str> = modified.names().collect();
        assert_eq!(names, vec!["cn", "sn"]);

        let renamed = AttributeSet::new().with(NAME_ATTR, "john.doe");
        assert!(strictly_modified(&renamed, &before).has(NAME_ATTR));
    }
}
