//! Task building.
//!
//! Converts a [`PropagationByResource`] plan into resource-scoped
//! [`PropagationTask`]s, one per resource.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use propel_connector::operation::{Attribute, ENABLE_ATTR, NAME_ATTR};
use propel_connector::types::ResourceOperation;

use crate::ids::TaskId;
use crate::plan::PropagationByResource;
use crate::resolver::AttributeResolver;
use crate::resource::{ExternalResource, ResourceCatalog};
use crate::subject::Subject;
use crate::task::PropagationTask;

/// Builds the tasks of one run.
#[derive(Debug, Clone)]
pub struct TaskBuilder {
    resolver: Arc<AttributeResolver>,
}

impl TaskBuilder {
    #[must_use]
    pub fn new(resolver: Arc<AttributeResolver>) -> Self {
        Self { resolver }
    }

    /// Build tasks for `subject` following `plan`.
    ///
    /// The plan is purged first, so a resource yields at most one task.
    /// Tasks come out in create, update, delete order, each in plan order.
    #[instrument(skip_all, fields(subject = %subject.key, kind = %subject.kind))]
    pub fn build(
        &self,
        subject: &Subject,
        password: Option<&str>,
        enable: Option<bool>,
        plan: &PropagationByResource,
        catalog: &ResourceCatalog,
    ) -> Vec<PropagationTask> {
        let mut plan = plan.clone();
        plan.purge();

        let mut seen: HashSet<&str> = HashSet::new();
        let mut tasks = Vec::new();

        for operation in ResourceOperation::all().iter().copied() {
            for name in plan.get(operation) {
                if !seen.insert(name.as_str()) {
                    continue;
                }
                let Some(resource) = catalog.get(name) else {
                    warn!(resource = %name, "Resource in plan is not configured, skipped");
                    continue;
                };
                if let Some(task) =
                    self.build_task(subject, password, enable, &plan, operation, resource)
                {
                    tasks.push(task);
                }
            }
        }

        debug!(task_count = tasks.len(), "Propagation tasks built");
        tasks
    }

    fn build_task(
        &self,
        subject: &Subject,
        password: Option<&str>,
        enable: Option<bool>,
        plan: &PropagationByResource,
        operation: ResourceOperation,
        resource: Arc<ExternalResource>,
    ) -> Option<PropagationTask> {
        let Some(provision) = resource.provision(subject.kind) else {
            info!(
                resource = %resource.name,
                kind = %subject.kind,
                "No provision for this subject kind, ignoring"
            );
            return None;
        };
        let mapping = &provision.mapping;
        if mapping.propagation_items().next().is_none() {
            info!(
                resource = %resource.name,
                kind = %subject.kind,
                "Requesting propagation but no propagation mapping items defined, ignoring"
            );
            return None;
        }

        let resolved = self.resolver.resolve(subject, password, mapping);
        let mut attributes = resolved.attributes;

        let name = match mapping.account_link() {
            Some(link) => match self
                .resolver
                .evaluator()
                .evaluate_string(link, &subject.expression_context())
            {
                Ok(Some(value)) => Some(value),
                Ok(None) => resolved.account_id.clone(),
                Err(e) => {
                    warn!(
                        resource = %resource.name,
                        error = %e,
                        "Account link could not be evaluated, using account id"
                    );
                    resolved.account_id.clone()
                }
            },
            None => resolved.account_id.clone(),
        };
        if let Some(name) = name {
            attributes.set(Attribute::single(NAME_ATTR, name));
        }
        if let Some(enable) = enable {
            attributes.set(Attribute::single(ENABLE_ATTR, enable));
        }

        if resolved.account_id.is_none() {
            error!(
                resource = %resource.name,
                subject = %subject.key,
                "Missing value for conn object key"
            );
        }

        let old_account_id = match operation {
            ResourceOperation::Update => plan.old_account_id(&resource.name).map(str::to_string),
            _ => None,
        };

        Some(PropagationTask {
            id: TaskId::new(),
            subject_kind: subject.kind,
            subject_key: subject.key.clone(),
            operation,
            mode: resource.propagation_mode,
            object_class: mapping.object_class.clone(),
            account_id: resolved.account_id,
            old_account_id,
            attributes,
            resource,
        })
    }
}
