//! Propagation plan
//!
//! [`PropagationByResource`] says, per operation, which resources a run acts
//! on. It is produced upstream by diffing desired and current state; this
//! crate only normalizes and consumes it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use propel_connector::types::ResourceOperation;

/// Resource names grouped by operation, plus prior account ids for renames.
///
/// Within one operation a name appears at most once and insertion order is
/// kept; that order is the plan order the executor falls back to on ties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationByResource {
    #[serde(default)]
    to_create: Vec<String>,
    #[serde(default)]
    to_update: Vec<String>,
    #[serde(default)]
    to_delete: Vec<String>,
    #[serde(default)]
    old_account_ids: HashMap<String, String>,
}

impl PropagationByResource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`PropagationByResource::add`].
    pub fn with(mut self, operation: ResourceOperation, resource: impl Into<String>) -> Self {
        self.add(operation, resource);
        self
    }

    fn list(&self, operation: ResourceOperation) -> &Vec<String> {
        match operation {
            ResourceOperation::Create => &self.to_create,
            ResourceOperation::Update => &self.to_update,
            ResourceOperation::Delete => &self.to_delete,
        }
    }

    fn list_mut(&mut self, operation: ResourceOperation) -> &mut Vec<String> {
        match operation {
            ResourceOperation::Create => &mut self.to_create,
            ResourceOperation::Update => &mut self.to_update,
            ResourceOperation::Delete => &mut self.to_delete,
        }
    }

    /// Add a resource under an operation. Returns `false` if already there.
    pub fn add(&mut self, operation: ResourceOperation, resource: impl Into<String>) -> bool {
        let resource = resource.into();
        let list = self.list_mut(operation);
        if list.contains(&resource) {
            return false;
        }
        list.push(resource);
        true
    }

    pub fn add_all<I, S>(&mut self, operation: ResourceOperation, resources: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for resource in resources {
            self.add(operation, resource);
        }
    }

    pub fn remove(&mut self, operation: ResourceOperation, resource: &str) -> bool {
        let list = self.list_mut(operation);
        let before = list.len();
        list.retain(|r| r != resource);
        list.len() < before
    }

    /// Replace the resources of one operation.
    pub fn set<I, S>(&mut self, operation: ResourceOperation, resources: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.list_mut(operation).clear();
        self.add_all(operation, resources);
    }

    #[must_use]
    pub fn get(&self, operation: ResourceOperation) -> &[String] {
        self.list(operation)
    }

    #[must_use]
    pub fn contains(&self, operation: ResourceOperation, resource: &str) -> bool {
        self.list(operation).iter().any(|r| r == resource)
    }

    /// Operation a resource is planned for, checked in create, update, delete
    /// order.
    #[must_use]
    pub fn operation_of(&self, resource: &str) -> Option<ResourceOperation> {
        ResourceOperation::all()
            .iter()
            .copied()
            .find(|op| self.contains(*op, resource))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// All resource names, in operation order then plan order.
    #[must_use]
    pub fn resources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for op in ResourceOperation::all() {
            for name in self.list(*op) {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Make operations mutually exclusive per resource.
    ///
    /// A resource listed under UPDATE and also under CREATE or DELETE is
    /// dropped from UPDATE. A resource under both CREATE and DELETE keeps
    /// DELETE only.
    pub fn purge(&mut self) {
        let create = self.to_create.clone();
        let delete = self.to_delete.clone();

        self.to_update
            .retain(|r| !create.contains(r) && !delete.contains(r));
        self.to_create.retain(|r| !delete.contains(r));
    }

    /// Add everything from `other`. Old account ids already set here win.
    pub fn merge(&mut self, other: &PropagationByResource) {
        for op in ResourceOperation::all() {
            self.add_all(*op, other.list(*op).iter().cloned());
        }
        for (resource, old) in &other.old_account_ids {
            self.old_account_ids
                .entry(resource.clone())
                .or_insert_with(|| old.clone());
        }
    }

    /// Drop the named resources from every operation.
    pub fn exclude<'a, I>(&mut self, resources: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for resource in resources {
            for op in ResourceOperation::all() {
                self.remove(*op, resource);
            }
            self.old_account_ids.remove(resource);
        }
    }

    /// Record the account id the resource knew the subject by before this
    /// change.
    pub fn add_old_account_id(
        &mut self,
        resource: impl Into<String>,
        old_account_id: impl Into<String>,
    ) {
        self.old_account_ids
            .insert(resource.into(), old_account_id.into());
    }

    #[must_use]
    pub fn old_account_id(&self, resource: &str) -> Option<&str> {
        self.old_account_ids.get(resource).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ResourceOperation::{Create, Delete, Update};

    #[test]
    fn test_add_deduplicates_and_keeps_order() {
        let mut plan = PropagationByResource::new();
        assert!(plan.add(Update, "ldap"));
        assert!(plan.add(Update, "db"));
        assert!(!plan.add(Update, "ldap"));

        assert_eq!(plan.get(Update), ["ldap", "db"]);
    }

    #[test]
    fn test_purge() {
        let mut plan = PropagationByResource::new()
            .with(Create, "ldap")
            .with(Create, "ad")
            .with(Update, "ldap")
            .with(Update, "db")
            .with(Update, "crm")
            .with(Delete, "crm")
            .with(Delete, "ad");

        plan.purge();

        assert_eq!(plan.get(Create), ["ldap"]);
        assert_eq!(plan.get(Update), ["db"]);
        assert_eq!(plan.get(Delete), ["crm", "ad"]);
        assert_eq!(plan.operation_of("ad"), Some(Delete));
    }

    #[test]
    fn test_merge_and_old_account_ids() {
        let mut plan = PropagationByResource::new().with(Update, "ldap");
        plan.add_old_account_id("ldap", "uid=old");

        let mut other = PropagationByResource::new()
            .with(Update, "ldap")
            .with(Delete, "db");
        other.add_old_account_id("ldap", "uid=other");
        other.add_old_account_id("db", "42");

        plan.merge(&other);
        assert_eq!(plan.get(Update), ["ldap"]);
        assert_eq!(plan.get(Delete), ["db"]);
        assert_eq!(plan.old_account_id("ldap"), Some("uid=old"));
        assert_eq!(plan.old_account_id("db"), Some("42"));
    }

    #[test]
    fn test_exclude() {
        let mut plan = PropagationByResource::new()
            .with(Create, "ldap")
            .with(Update, "db");
        plan.add_old_account_id("ldap", "x");

        plan.exclude(["ldap"]);
        assert!(!plan.contains(Create, "ldap"));
        assert!(plan.old_account_id("ldap").is_none());
        assert_eq!(plan.resources(), vec!["db"]);
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_set_replaces() {
        let mut plan = PropagationByResource::new().with(Create, "a");
        plan.set(Create, ["b", "c"]);
        assert_eq!(plan.get(Create), ["b", "c"]);
        assert!(plan.remove(Create, "b"));
        assert!(!plan.remove(Create, "b"));
    }
}
