//! Propagation entry point.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::actions::ActionsRegistry;
use crate::builder::TaskBuilder;
use crate::config::PropagationConfig;
use crate::executor::PriorityExecutor;
use crate::expression::{ExpressionEvaluator, RhaiEvaluator};
use crate::history::{ExecutionSink, NoopExecutionSink};
use crate::notify::{NoopNotifier, PropagationNotifier};
use crate::plan::PropagationByResource;
use crate::provider::ConnectorProvider;
use crate::reporter::PropagationStatus;
use crate::resolver::{AttributeResolver, NoopVirtualAttributeCache, VirtualAttributeCache};
use crate::resource::ResourceCatalog;
use crate::subject::Subject;

/// Per-call options of [`PropagationManager::propagate`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropagationRequest {
    /// Cleartext password, when the change carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Requested account status, stamped as `__ENABLE__`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,

    /// Resources left out of this run.
    #[serde(default)]
    pub excluded_resources: Vec<String>,
}

impl PropagationRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_enable(mut self, enable: bool) -> Self {
        self.enable = Some(enable);
        self
    }

    pub fn excluding(mut self, resource: impl Into<String>) -> Self {
        self.excluded_resources.push(resource.into());
        self
    }
}

/// Builds tasks for a subject and executes them.
#[derive(Debug)]
pub struct PropagationManager {
    catalog: Arc<ResourceCatalog>,
    builder: TaskBuilder,
    executor: PriorityExecutor,
}

impl PropagationManager {
    /// Start configuring a manager.
    #[must_use]
    pub fn builder(
        config: PropagationConfig,
        catalog: Arc<ResourceCatalog>,
        provider: Arc<dyn ConnectorProvider>,
    ) -> PropagationManagerBuilder {
        PropagationManagerBuilder {
            config,
            catalog,
            provider,
            evaluator: None,
            cache: Arc::new(NoopVirtualAttributeCache),
            actions: None,
            sink: Arc::new(NoopExecutionSink),
            notifier: Arc::new(NoopNotifier),
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &ResourceCatalog {
        &self.catalog
    }

    /// Propagate `subject` following `plan`.
    pub async fn build_and_execute(
        &self,
        subject: &Subject,
        password: Option<&str>,
        plan: &PropagationByResource,
    ) -> Vec<PropagationStatus> {
        let request = PropagationRequest {
            password: password.map(str::to_string),
            ..PropagationRequest::default()
        };
        self.propagate(subject, &request, plan).await
    }

    /// Propagate `subject` following `plan`, with per-call options.
    #[instrument(skip_all, fields(subject = %subject.key, kind = %subject.kind))]
    pub async fn propagate(
        &self,
        subject: &Subject,
        request: &PropagationRequest,
        plan: &PropagationByResource,
    ) -> Vec<PropagationStatus> {
        let mut plan = plan.clone();
        if !request.excluded_resources.is_empty() {
            debug!(excluded = ?request.excluded_resources, "Excluding resources from propagation");
            plan.exclude(request.excluded_resources.iter().map(String::as_str));
        }
        if plan.is_empty() {
            debug!("Nothing to propagate");
            return Vec::new();
        }

        let tasks = self.builder.build(
            subject,
            request.password.as_deref(),
            request.enable,
            &plan,
            &self.catalog,
        );
        if tasks.is_empty() {
            info!("No propagation task built");
            return Vec::new();
        }

        self.executor.execute(subject, tasks).await
    }
}

/// Builder for [`PropagationManager`].
pub struct PropagationManagerBuilder {
    config: PropagationConfig,
    catalog: Arc<ResourceCatalog>,
    provider: Arc<dyn ConnectorProvider>,
    evaluator: Option<Arc<dyn ExpressionEvaluator>>,
    cache: Arc<dyn VirtualAttributeCache>,
    actions: Option<ActionsRegistry>,
    sink: Arc<dyn ExecutionSink>,
    notifier: Arc<dyn PropagationNotifier>,
}

impl PropagationManagerBuilder {
    /// Expression evaluator; Rhai by default.
    #[must_use]
    pub fn evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    #[must_use]
    pub fn virtual_attribute_cache(mut self, cache: Arc<dyn VirtualAttributeCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Action registry; the built-in actions by default.
    #[must_use]
    pub fn actions(mut self, actions: ActionsRegistry) -> Self {
        self.actions = Some(actions);
        self
    }

    #[must_use]
    pub fn execution_sink(mut self, sink: Arc<dyn ExecutionSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn PropagationNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn build(self) -> PropagationManager {
        let evaluator = self
            .evaluator
            .unwrap_or_else(|| Arc::new(RhaiEvaluator::new()) as Arc<dyn ExpressionEvaluator>);
        let actions = self
            .actions
            .unwrap_or_else(|| ActionsRegistry::with_defaults(Arc::clone(&evaluator)));
        let resolver = AttributeResolver::new(evaluator).with_cache(self.cache);

        PropagationManager {
            catalog: self.catalog,
            builder: TaskBuilder::new(Arc::new(resolver)),
            executor: PriorityExecutor::new(self.config, self.provider)
                .with_actions(Arc::new(actions))
                .with_sink(self.sink)
                .with_notifier(self.notifier),
        }
    }
}
