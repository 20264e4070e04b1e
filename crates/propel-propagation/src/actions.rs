//! Propagation action hooks.
//!
//! Actions are per-resource strategies that adjust a task around its
//! connector call: before dispatch they may rewrite the prepared attributes
//! (fill a password, add group links), after dispatch they see the execution
//! record and the object read back from the resource.
//!
//! Resources reference actions by name through [`ActionBinding`]s; the
//! [`ActionsRegistry`] resolves names to implementations and applies the
//! enabled bindings sorted by their `order`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use propel_connector::crypto::directory_password_value;
use propel_connector::operation::{
    Attribute, AttributeValue, ConnectorObject, MANDATORY_MISSING_ATTR, PASSWORD_ATTR,
};
use propel_connector::types::ResourceOperation;

use crate::expression::ExpressionEvaluator;
use crate::resource::ExternalResource;
use crate::subject::{Subject, SubjectKind};
use crate::task::{PropagationTask, TaskExecution};

/// Default attribute receiving group links.
pub const DEFAULT_GROUP_ATTRIBUTE: &str = "ldapGroups";

/// Action hook errors.
#[derive(Debug, Error)]
pub enum ActionError {
    /// No action is registered under the bound name.
    #[error("Action not found: {name}")]
    NotFound { name: String },

    /// The action ran and failed.
    #[error("Action '{action}' failed: {message}")]
    Failed { action: String, message: String },

    /// The binding configuration is unusable.
    #[error("Invalid action configuration: {message}")]
    InvalidConfiguration { message: String },
}

/// Result type for action hooks.
pub type ActionResult<T> = Result<T, ActionError>;

/// How a failing action affects its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCriticality {
    /// The task fails.
    Fatal,
    /// Logged, the task continues.
    #[default]
    Partial,
    /// Silently dropped.
    Ignore,
}

/// Reference from a resource to a registered action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionBinding {
    /// Registered action name.
    pub name: String,

    /// Lower runs first; equal orders keep configuration order.
    #[serde(default)]
    pub order: i32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub criticality: ActionCriticality,

    /// Action-specific settings.
    #[serde(default)]
    pub config: serde_json::Value,
}

fn default_enabled() -> bool {
    true
}

impl ActionBinding {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: 0,
            enabled: true,
            criticality: ActionCriticality::default(),
            config: serde_json::Value::Null,
        }
    }

    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn with_criticality(mut self, criticality: ActionCriticality) -> Self {
        self.criticality = criticality;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(serde_json::Value::as_str)
    }
}

/// What an action sees besides the task itself.
#[derive(Debug, Clone, Copy)]
pub struct ActionContext<'a> {
    pub subject: &'a Subject,
    pub resource: &'a ExternalResource,
    pub binding: &'a ActionBinding,
}

/// A per-resource propagation strategy.
#[async_trait]
pub trait PropagationActions: Send + Sync {
    /// Name resources bind this action by.
    fn name(&self) -> &'static str;

    /// Adjust the task before it is dispatched.
    async fn before(
        &self,
        _ctx: ActionContext<'_>,
        _task: &mut PropagationTask,
        _before: Option<&ConnectorObject>,
    ) -> ActionResult<()> {
        Ok(())
    }

    /// Observe the outcome of the dispatch.
    async fn after(
        &self,
        _ctx: ActionContext<'_>,
        _task: &PropagationTask,
        _execution: &TaskExecution,
        _after: Option<&ConnectorObject>,
    ) -> ActionResult<()> {
        Ok(())
    }
}

/// Named action implementations.
#[derive(Default, Clone)]
pub struct ActionsRegistry {
    actions: HashMap<String, Arc<dyn PropagationActions>>,
}

impl std::fmt::Debug for ActionsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ActionsRegistry")
            .field("actions", &names)
            .finish()
    }
}

impl ActionsRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in actions.
    #[must_use]
    pub fn with_defaults(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PasswordFillActions::verbatim()));
        registry.register(Arc::new(PasswordFillActions::directory()));
        registry.register(Arc::new(GroupMembershipActions::new(evaluator)));
        registry
    }

    /// Register an action under its own name, replacing any previous one.
    pub fn register(&mut self, action: Arc<dyn PropagationActions>) {
        self.actions.insert(action.name().to_string(), action);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn PropagationActions>> {
        self.actions.get(name).cloned()
    }

    fn bindings(resource: &ExternalResource) -> Vec<&ActionBinding> {
        let mut bindings: Vec<&ActionBinding> =
            resource.actions.iter().filter(|b| b.enabled).collect();
        bindings.sort_by_key(|b| b.order);
        bindings
    }

    fn lookup(&self, binding: &ActionBinding) -> ActionResult<Arc<dyn PropagationActions>> {
        self.get(&binding.name).ok_or_else(|| ActionError::NotFound {
            name: binding.name.clone(),
        })
    }

    /// Apply the resource's `before` actions to `task`.
    ///
    /// Only a failing action bound as [`ActionCriticality::Fatal`] returns an
    /// error.
    #[instrument(skip_all, fields(resource = %task.resource_name(), operation = %task.operation))]
    pub async fn run_before(
        &self,
        subject: &Subject,
        task: &mut PropagationTask,
        before: Option<&ConnectorObject>,
    ) -> ActionResult<()> {
        let resource = Arc::clone(&task.resource);
        let bindings = Self::bindings(&resource);
        if bindings.is_empty() {
            return Ok(());
        }

        for binding in bindings {
            let ctx = ActionContext {
                subject,
                resource: &resource,
                binding,
            };
            let outcome = match self.lookup(binding) {
                Ok(action) => {
                    debug!(action = %binding.name, "Running before action");
                    action.before(ctx, task, before).await
                }
                Err(e) => Err(e),
            };
            Self::handle(binding, outcome)?;
        }
        Ok(())
    }

    /// Apply the resource's `after` actions.
    #[instrument(skip_all, fields(resource = %task.resource_name(), status = %execution.status))]
    pub async fn run_after(
        &self,
        subject: &Subject,
        task: &PropagationTask,
        execution: &TaskExecution,
        after: Option<&ConnectorObject>,
    ) -> ActionResult<()> {
        let resource = Arc::clone(&task.resource);
        for binding in Self::bindings(&resource) {
            let ctx = ActionContext {
                subject,
                resource: &resource,
                binding,
            };
            let outcome = match self.lookup(binding) {
                Ok(action) => action.after(ctx, task, execution, after).await,
                Err(e) => Err(e),
            };
            Self::handle(binding, outcome)?;
        }
        Ok(())
    }

    fn handle(binding: &ActionBinding, outcome: ActionResult<()>) -> ActionResult<()> {
        let Err(e) = outcome else {
            return Ok(());
        };
        match binding.criticality {
            ActionCriticality::Fatal => {
                error!(action = %binding.name, error = %e, "Fatal action failure");
                Err(e)
            }
            ActionCriticality::Partial => {
                warn!(action = %binding.name, error = %e, "Action failed, continuing");
                Ok(())
            }
            ActionCriticality::Ignore => {
                debug!(action = %binding.name, error = %e, "Ignoring action failure");
                Ok(())
            }
        }
    }
}

/// How [`PasswordFillActions`] renders the stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordEncoding {
    /// The stored value as is.
    Verbatim,
    /// `{alg}base64` of the stored hex digest.
    Directory,
}

/// Fills a mandatory but missing password from the subject's stored
/// credential.
///
/// Acts only when the `__MANDATORY_MISSING__` marker lists `__PASSWORD__`
/// and the connector's configured cipher algorithm matches the credential's.
#[derive(Debug, Clone, Copy)]
pub struct PasswordFillActions {
    encoding: PasswordEncoding,
}

impl PasswordFillActions {
    #[must_use]
    pub fn verbatim() -> Self {
        Self {
            encoding: PasswordEncoding::Verbatim,
        }
    }

    #[must_use]
    pub fn directory() -> Self {
        Self {
            encoding: PasswordEncoding::Directory,
        }
    }

    fn password_missing(task: &PropagationTask) -> bool {
        task.attributes
            .get(MANDATORY_MISSING_ATTR)
            .is_some_and(|a| a.contains(&AttributeValue::from(PASSWORD_ATTR)))
    }

    fn clear_marker(task: &mut PropagationTask) {
        let now_empty = match task.attributes.get_mut(MANDATORY_MISSING_ATTR) {
            Some(marker) => {
                marker.remove_value(&AttributeValue::from(PASSWORD_ATTR));
                marker.is_empty()
            }
            None => false,
        };
        if now_empty {
            task.attributes.remove(MANDATORY_MISSING_ATTR);
        }
    }
}

#[async_trait]
impl PropagationActions for PasswordFillActions {
    fn name(&self) -> &'static str {
        match self.encoding {
            PasswordEncoding::Verbatim => "password",
            PasswordEncoding::Directory => "hashed_password",
        }
    }

    async fn before(
        &self,
        ctx: ActionContext<'_>,
        task: &mut PropagationTask,
        _before: Option<&ConnectorObject>,
    ) -> ActionResult<()> {
        if task.operation == ResourceOperation::Delete || !Self::password_missing(task) {
            return Ok(());
        }
        let Some(credential) = ctx.subject.credential.as_ref() else {
            debug!(subject = %ctx.subject.key, "No stored credential to fill the password with");
            return Ok(());
        };
        let Some(connector_algorithm) = ctx.resource.connector.password_cipher_algorithm.as_deref()
        else {
            debug!(resource = %ctx.resource.name, "Connector has no password cipher algorithm");
            return Ok(());
        };
        if !credential.algorithm.matches_connector(connector_algorithm) {
            info!(
                resource = %ctx.resource.name,
                stored = %credential.algorithm,
                configured = %connector_algorithm,
                "Stored credential algorithm does not match the connector, password not propagated"
            );
            return Ok(());
        }

        let value = match self.encoding {
            PasswordEncoding::Verbatim => credential.value.clone(),
            PasswordEncoding::Directory => {
                directory_password_value(credential.algorithm, &credential.value).map_err(|e| {
                    ActionError::Failed {
                        action: self.name().to_string(),
                        message: e.to_string(),
                    }
                })?
            }
        };

        task.attributes.set(Attribute::single(PASSWORD_ATTR, value));
        Self::clear_marker(task);
        debug!(resource = %ctx.resource.name, "Filled password from stored credential");
        Ok(())
    }
}

/// Adds the account links of the subject's groups to a multi-valued
/// attribute, for resources that provision both users and groups.
pub struct GroupMembershipActions {
    evaluator: Arc<dyn ExpressionEvaluator>,
}

impl GroupMembershipActions {
    #[must_use]
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl PropagationActions for GroupMembershipActions {
    fn name(&self) -> &'static str {
        "group_membership"
    }

    async fn before(
        &self,
        ctx: ActionContext<'_>,
        task: &mut PropagationTask,
        _before: Option<&ConnectorObject>,
    ) -> ActionResult<()> {
        if task.operation == ResourceOperation::Delete || ctx.subject.kind != SubjectKind::User {
            return Ok(());
        }
        let Some(link) = ctx
            .resource
            .provision(SubjectKind::Group)
            .and_then(|p| p.mapping.account_link())
        else {
            debug!(resource = %ctx.resource.name, "No group account link configured");
            return Ok(());
        };

        let attribute = ctx
            .binding
            .config_str("group_attribute")
            .unwrap_or(DEFAULT_GROUP_ATTRIBUTE);
        if attribute.trim().is_empty() {
            return Err(ActionError::InvalidConfiguration {
                message: "group_attribute must not be empty".to_string(),
            });
        }

        let mut links = Attribute::new(attribute);
        for membership in ctx
            .subject
            .memberships
            .iter()
            .filter(|m| m.resources.contains(&ctx.resource.name))
        {
            match self
                .evaluator
                .evaluate_string(link, &membership.expression_context())
            {
                Ok(Some(value)) => {
                    links.push(value);
                }
                Ok(None) => {
                    debug!(group = %membership.group_name, "Group account link is empty");
                }
                Err(e) => {
                    warn!(
                        group = %membership.group_name,
                        resource = %ctx.resource.name,
                        error = %e,
                        "Could not evaluate group account link, group skipped"
                    );
                }
            }
        }

        if !links.is_empty() {
            debug!(attribute = %attribute, count = links.values().len(), "Adding group links");
            task.attributes.merge(links);
        }
        Ok(())
    }
}
