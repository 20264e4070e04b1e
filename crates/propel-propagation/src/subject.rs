//! Subject snapshots
//!
//! A [`Subject`] is the read-only view of the user, group or any-object whose
//! state is being propagated. It is supplied by the caller for one run.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use propel_connector::crypto::CipherAlgorithm;
use propel_connector::operation::AttributeValue;

/// Kind of subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    User,
    Group,
    AnyObject,
}

impl SubjectKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::User => "user",
            SubjectKind::Group => "group",
            SubjectKind::AnyObject => "any_object",
        }
    }
}

impl std::fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A password as stored internally: hex digest (or ciphertext) plus the
/// algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub value: String,
    pub algorithm: CipherAlgorithm,
}

impl StoredCredential {
    pub fn new(value: impl Into<String>, algorithm: CipherAlgorithm) -> Self {
        Self {
            value: value.into(),
            algorithm,
        }
    }
}

/// A group the subject belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupMembership {
    pub group_key: String,
    pub group_name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<AttributeValue>>,
    /// Resources the group itself is assigned to.
    #[serde(default)]
    pub resources: BTreeSet<String>,
}

impl GroupMembership {
    pub fn new(group_key: impl Into<String>, group_name: impl Into<String>) -> Self {
        Self {
            group_key: group_key.into(),
            group_name: group_name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.insert(resource.into());
        self
    }

    /// Variables exposed to account-link expressions evaluated for the group.
    #[must_use]
    pub fn expression_context(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut context = attributes_context(&self.attributes);
        context.insert("key".to_string(), self.group_key.clone().into());
        context.insert("name".to_string(), self.group_name.clone().into());
        context
    }
}

/// Snapshot of the subject being propagated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub key: String,
    /// Username for users, name for groups and any-objects.
    pub username: String,
    #[serde(default)]
    pub plain_attrs: BTreeMap<String, Vec<AttributeValue>>,
    #[serde(default)]
    pub virtual_attrs: BTreeMap<String, Vec<AttributeValue>>,
    #[serde(default)]
    pub memberships: Vec<GroupMembership>,
    /// Resources currently assigned to the subject.
    #[serde(default)]
    pub resources: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<StoredCredential>,
}

impl Subject {
    pub fn new(kind: SubjectKind, key: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            username: username.into(),
            plain_attrs: BTreeMap::new(),
            virtual_attrs: BTreeMap::new(),
            memberships: Vec::new(),
            resources: BTreeSet::new(),
            credential: None,
        }
    }

    pub fn user(key: impl Into<String>, username: impl Into<String>) -> Self {
        Self::new(SubjectKind::User, key, username)
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.plain_attrs
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_virtual_attr(
        mut self,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.virtual_attrs
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    #[must_use]
    pub fn with_membership(mut self, membership: GroupMembership) -> Self {
        self.memberships.push(membership);
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.insert(resource.into());
        self
    }

    #[must_use]
    pub fn with_credential(mut self, credential: StoredCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    #[must_use]
    pub fn plain(&self, name: &str) -> &[AttributeValue] {
        self.plain_attrs.get(name).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn virtual_values(&self, name: &str) -> &[AttributeValue] {
        self.virtual_attrs.get(name).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn has_resource(&self, resource: &str) -> bool {
        self.resources.contains(resource)
    }

    /// Variables exposed to expressions evaluated against this subject.
    ///
    /// Plain attributes come first, then virtual ones; `key` and `username`
    /// always win over attributes of the same name.
    #[must_use]
    pub fn expression_context(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut context = attributes_context(&self.plain_attrs);
        for (name, value) in attributes_context(&self.virtual_attrs) {
            context.entry(name).or_insert(value);
        }
        context.insert("key".to_string(), self.key.clone().into());
        context.insert("username".to_string(), self.username.clone().into());
        context
    }
}

/// Single values are exposed as scalars, multiple values as arrays.
fn attributes_context(
    attrs: &BTreeMap<String, Vec<AttributeValue>>,
) -> serde_json::Map<String, serde_json::Value> {
    attrs
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(name, values)| {
            let value = if values.len() == 1 {
                values[0].to_json()
            } else {
                serde_json::Value::Array(values.iter().map(AttributeValue::to_json).collect())
            };
            (name.clone(), value)
        })
        .collect()
}
