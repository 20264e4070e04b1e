//! External resource configuration.
//!
//! Resources are read-only for the duration of a run; the catalog hands them
//! out behind `Arc` so tasks can reference them without copying.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use propel_connector::config::ConnectorInstance;
use propel_connector::mapping::Mapping;
use propel_connector::types::{CapabilitySet, PropagationMode, ResourceOperation, TraceLevel};

use crate::actions::ActionBinding;
use crate::error::{PropagationError, PropagationResult};
use crate::subject::SubjectKind;

/// How one subject kind is provisioned on a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provision {
    pub kind: SubjectKind,
    pub mapping: Mapping,
}

impl Provision {
    #[must_use]
    pub fn new(kind: SubjectKind, mapping: Mapping) -> Self {
        Self { kind, mapping }
    }
}

/// Configuration of one connected system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalResource {
    /// Unique resource name.
    pub name: String,

    pub connector: ConnectorInstance,

    #[serde(default)]
    pub propagation_mode: PropagationMode,

    /// Lower runs first; unset runs before any set value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagation_priority: Option<i32>,

    /// A failure on a primary resource aborts the rest of the run.
    #[serde(default)]
    pub propagation_primary: bool,

    #[serde(default)]
    pub create_trace_level: TraceLevel,
    #[serde(default)]
    pub update_trace_level: TraceLevel,
    #[serde(default)]
    pub delete_trace_level: TraceLevel,

    #[serde(default)]
    pub provisions: Vec<Provision>,

    /// Action hooks, applied sorted by their `order`.
    #[serde(default)]
    pub actions: Vec<ActionBinding>,
}

impl ExternalResource {
    pub fn new(name: impl Into<String>, connector: ConnectorInstance) -> Self {
        Self {
            name: name.into(),
            connector,
            propagation_mode: PropagationMode::default(),
            propagation_priority: None,
            propagation_primary: false,
            create_trace_level: TraceLevel::default(),
            update_trace_level: TraceLevel::default(),
            delete_trace_level: TraceLevel::default(),
            provisions: Vec::new(),
            actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: PropagationMode) -> Self {
        self.propagation_mode = mode;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.propagation_priority = Some(priority);
        self
    }

    #[must_use]
    pub fn primary(mut self) -> Self {
        self.propagation_primary = true;
        self
    }

    #[must_use]
    pub fn with_provision(mut self, provision: Provision) -> Self {
        self.provisions.push(provision);
        self
    }

    #[must_use]
    pub fn with_action(mut self, binding: ActionBinding) -> Self {
        self.actions.push(binding);
        self
    }

    #[must_use]
    pub fn with_trace_levels(mut self, level: TraceLevel) -> Self {
        self.create_trace_level = level;
        self.update_trace_level = level;
        self.delete_trace_level = level;
        self
    }

    #[must_use]
    pub fn provision(&self, kind: SubjectKind) -> Option<&Provision> {
        self.provisions.iter().find(|p| p.kind == kind)
    }

    #[must_use]
    pub fn capabilities(&self) -> CapabilitySet {
        self.connector.capabilities
    }

    #[must_use]
    pub fn trace_level(&self, operation: ResourceOperation) -> TraceLevel {
        match operation {
            ResourceOperation::Create => self.create_trace_level,
            ResourceOperation::Update => self.update_trace_level,
            ResourceOperation::Delete => self.delete_trace_level,
        }
    }

    /// Key the executor sorts by. Unset priorities sort before every set one,
    /// `i32::MIN` included.
    #[must_use]
    pub fn priority_key(&self) -> (bool, i32) {
        (
            self.propagation_priority.is_some(),
            self.propagation_priority.unwrap_or_default(),
        )
    }
}

/// Read-only lookup of configured resources.
#[derive(Debug, Clone, Default)]
pub struct ResourceCatalog {
    resources: HashMap<String, Arc<ExternalResource>>,
}

impl ResourceCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a list of resources from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> PropagationResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PropagationError::Config(format!(
                "Failed to read resources file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a list of resources from a YAML string.
    pub fn from_yaml(content: &str) -> PropagationResult<Self> {
        let resources: Vec<ExternalResource> = serde_yaml::from_str(content)
            .map_err(|e| PropagationError::Config(format!("Failed to parse resources: {e}")))?;

        let mut catalog = Self::new();
        for resource in resources {
            resource
                .connector
                .validate()
                .map_err(|e| PropagationError::Config(format!("{}: {e}", resource.name)))?;
            if catalog.get(&resource.name).is_some() {
                return Err(PropagationError::Config(format!(
                    "duplicate resource name '{}'",
                    resource.name
                )));
            }
            catalog.insert(resource);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, resource: ExternalResource) {
        self.resources
            .insert(resource.name.clone(), Arc::new(resource));
    }

    #[must_use]
    pub fn with(mut self, resource: ExternalResource) -> Self {
        self.insert(resource);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ExternalResource>> {
        self.resources.get(name).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use propel_connector::types::ConnectorCapability;

    const RESOURCES_YAML: &str = r#"
- name: ldap
  propagation_primary: true
  propagation_priority: 10
  update_trace_level: failures
  connector:
    display_name: corporate-ldap
    capabilities: [one_phase_create, one_phase_update, search]
    password_cipher_algorithm: SHA
  provisions:
    - kind: user
      mapping:
        object_class: inetOrgPerson
        account_link: "'uid=' + username + ',ou=people'"
        items:
          - ext_attr_name: uid
            source: { type: username }
            conn_object_key: true
  actions:
    - name: hashed_password
- name: db
  propagation_mode: two_phases
  connector:
    display_name: hr-db
"#;

    #[test]
    fn test_catalog_from_yaml() {
        let catalog = ResourceCatalog::from_yaml(RESOURCES_YAML).unwrap();
        assert_eq!(catalog.len(), 2);

        let ldap = catalog.get("ldap").unwrap();
        assert!(ldap.propagation_primary);
        assert_eq!(ldap.priority_key(), (true, 10));
        assert_eq!(ldap.trace_level(ResourceOperation::Update), TraceLevel::Failures);
        assert_eq!(ldap.trace_level(ResourceOperation::Create), TraceLevel::All);
        assert!(ldap.capabilities().contains(ConnectorCapability::Search));
        assert!(ldap.provision(SubjectKind::User).is_some());
        assert!(ldap.provision(SubjectKind::Group).is_none());
        assert_eq!(ldap.actions[0].name, "hashed_password");

        let db = catalog.get("db").unwrap();
        assert_eq!(db.propagation_mode, PropagationMode::TwoPhases);
        assert_eq!(db.priority_key(), (false, 0));
        assert!(catalog.get("ghost").is_none());
    }

    #[test]
    fn test_catalog_rejects_duplicates() {
        let yaml = r#"
- name: ldap
  connector: { display_name: a }
- name: ldap
  connector: { display_name: b }
"#;
        assert!(ResourceCatalog::from_yaml(yaml).is_err());
    }
}
