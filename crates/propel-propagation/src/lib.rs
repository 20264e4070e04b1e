//! # Propagation Engine
//!
//! Projects a change to a subject (user, group, any-object) onto the external
//! resources it is provisioned on.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────┐     ┌───────────────────┐
//! │ PropagationBy-   │────►│ Task Builder │────►│ Priority Executor │
//! │ Resource (plan)  │     │              │     │                   │
//! └──────────────────┘     └──────┬───────┘     └─────────┬─────────┘
//!                                 │                       │ one task at a time
//!                    ┌────────────┴──────┐                ▼
//!                    │ Attribute Resolver│       ┌──────────────────┐     ┌────────────┐
//!                    │ + Expression      │       │ Action hooks     │────►│ Connector  │
//!                    └───────────────────┘       │ (before / after) │     │ Gateway    │
//!                                                └────────┬─────────┘     └────────────┘
//!                                                         ▼
//!                                 ┌──────────┐   ┌──────────────────┐
//!                                 │ History  │◄──│ Reporter         │──► Notifier
//!                                 │ sink     │   │ (statuses)       │
//!                                 └──────────┘   └──────────────────┘
//! ```
//!
//! Tasks are ordered by resource priority (unset priorities first, ties in
//! plan order). A failure on a primary resource aborts the run; resources
//! not yet reached are recorded as cascade failures.
//!
//! ## Example
//!
//! ```ignore
//! use propel_propagation::prelude::*;
//!
//! let catalog = Arc::new(ResourceCatalog::from_file("resources.yaml")?);
//! let provider = Arc::new(StaticConnectorProvider::new().with("ldap", ldap_connector));
//!
//! let manager = PropagationManager::builder(PropagationConfig::default(), catalog, provider)
//!     .execution_sink(history)
//!     .build();
//!
//! let plan = PropagationByResource::new().with(ResourceOperation::Create, "ldap");
//! let statuses = manager.build_and_execute(&subject, Some("s3cret"), &plan).await;
//! ```

pub mod actions;
pub mod builder;
pub mod config;
pub mod error;
pub mod executor;
pub mod expression;
pub mod history;
pub mod ids;
pub mod manager;
pub mod notify;
pub mod plan;
pub mod provider;
pub mod reporter;
pub mod resolver;
pub mod resource;
pub mod subject;
pub mod task;

pub use config::PropagationConfig;
pub use error::{PropagationError, PropagationResult};
pub use manager::{PropagationManager, PropagationRequest};
pub use plan::PropagationByResource;
pub use reporter::PropagationStatus;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::actions::{
        ActionBinding, ActionContext, ActionCriticality, ActionError, ActionsRegistry,
        PropagationActions,
    };
    pub use crate::builder::TaskBuilder;
    pub use crate::config::PropagationConfig;
    pub use crate::error::{PropagationError, PropagationResult};
    pub use crate::executor::PriorityExecutor;
    pub use crate::expression::{ExpressionEvaluator, RhaiEvaluator, TemplateEvaluator};
    pub use crate::history::{ExecutionSink, NoopExecutionSink};
    pub use crate::ids::{RunId, TaskId};
    pub use crate::manager::{PropagationManager, PropagationRequest};
    pub use crate::notify::{NoopNotifier, PropagationNotifier};
    pub use crate::plan::PropagationByResource;
    pub use crate::provider::{ConnectorProvider, StaticConnectorProvider};
    pub use crate::reporter::{DefaultPropagationReporter, PropagationReporter, PropagationStatus};
    pub use crate::resolver::{AttributeResolver, VirtualAttributeCache};
    pub use crate::resource::{ExternalResource, Provision, ResourceCatalog};
    pub use crate::subject::{GroupMembership, StoredCredential, Subject, SubjectKind};
    pub use crate::task::{ExecStatus, PropagationTask, TaskExecution};

    pub use propel_connector::prelude::*;
}
