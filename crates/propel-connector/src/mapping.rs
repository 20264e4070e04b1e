//! Attribute mapping types for propagation.
//!
//! Defines how internal subject attributes map onto a resource's attributes.

use serde::{Deserialize, Serialize};

/// Default object class for accounts.
pub const ACCOUNT_OBJECT_CLASS: &str = "__ACCOUNT__";

/// The mapping of one subject kind onto one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    /// Object class on the resource.
    #[serde(default = "default_object_class")]
    pub object_class: String,

    /// Ordered mapping items.
    #[serde(default)]
    pub items: Vec<MappingItem>,

    /// Expression producing the account link (`__NAME__`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_link: Option<String>,
}

fn default_object_class() -> String {
    ACCOUNT_OBJECT_CLASS.to_string()
}

impl Mapping {
    pub fn new(object_class: impl Into<String>) -> Self {
        Self {
            object_class: object_class.into(),
            items: Vec::new(),
            account_link: None,
        }
    }

    #[must_use]
    pub fn with_item(mut self, item: MappingItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_account_link(mut self, expression: impl Into<String>) -> Self {
        self.account_link = Some(expression.into());
        self
    }

    /// Items used when pushing changes out, in configured order.
    pub fn propagation_items(&self) -> impl Iterator<Item = &MappingItem> {
        self.items.iter().filter(|i| i.purpose.is_propagation())
    }

    /// The item whose value identifies the remote object.
    #[must_use]
    pub fn conn_object_key_item(&self) -> Option<&MappingItem> {
        self.items.iter().find(|i| i.conn_object_key)
    }

    /// External names worth reading back from the resource.
    #[must_use]
    pub fn attributes_to_get(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for item in self.propagation_items() {
            if item.is_password() || names.contains(&item.ext_attr_name) {
                continue;
            }
            names.push(item.ext_attr_name.clone());
        }
        names
    }

    #[must_use]
    pub fn account_link(&self) -> Option<&str> {
        self.account_link
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// One internal-to-external attribute rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingItem {
    /// Attribute name on the resource.
    pub ext_attr_name: String,

    /// Where the value comes from.
    pub source: ItemSource,

    #[serde(default)]
    pub purpose: MappingPurpose,

    /// Whether this item's value is the remote key (account id).
    #[serde(default)]
    pub conn_object_key: bool,

    /// `"true"`, `"false"` or an expression evaluating to a boolean.
    #[serde(default = "default_mandatory_condition")]
    pub mandatory_condition: String,

    /// Transforms applied to the resolved values, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<Transform>,
}

fn default_mandatory_condition() -> String {
    "false".to_string()
}

impl MappingItem {
    pub fn new(ext_attr_name: impl Into<String>, source: ItemSource) -> Self {
        Self {
            ext_attr_name: ext_attr_name.into(),
            source,
            purpose: MappingPurpose::default(),
            conn_object_key: false,
            mandatory_condition: default_mandatory_condition(),
            transforms: Vec::new(),
        }
    }

    /// Item mapping a plain attribute.
    pub fn plain(ext_attr_name: impl Into<String>, int_attr_name: impl Into<String>) -> Self {
        Self::new(
            ext_attr_name,
            ItemSource::Plain {
                name: int_attr_name.into(),
            },
        )
    }

    /// Item mapping the password onto `__PASSWORD__`.
    #[must_use]
    pub fn password() -> Self {
        Self::new(crate::operation::PASSWORD_ATTR, ItemSource::Password)
    }

    #[must_use]
    pub fn as_conn_object_key(mut self) -> Self {
        self.conn_object_key = true;
        self
    }

    pub fn mandatory_when(mut self, condition: impl Into<String>) -> Self {
        self.mandatory_condition = condition.into();
        self
    }

    #[must_use]
    pub fn with_purpose(mut self, purpose: MappingPurpose) -> Self {
        self.purpose = purpose;
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    #[must_use]
    pub fn is_password(&self) -> bool {
        matches!(self.source, ItemSource::Password)
    }
}

/// Source of a mapped value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemSource {
    /// A stored attribute of the subject.
    Plain { name: String },
    /// A computed attribute.
    Derived { name: String, expression: String },
    /// An attribute whose values live on another system.
    Virtual { name: String },
    /// The subject's internal key.
    Key,
    /// The subject's username (or group name).
    Username,
    /// The subject's password.
    Password,
    /// A constant value.
    Constant { value: String },
    /// A free expression over the subject.
    Expression { expression: String },
}

/// What a mapping item is used for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingPurpose {
    /// Outbound only.
    Propagation,
    /// Inbound only.
    Pull,
    /// Both directions.
    #[default]
    Both,
    /// Disabled.
    None,
}

impl MappingPurpose {
    #[must_use]
    pub fn is_propagation(&self) -> bool {
        matches!(self, MappingPurpose::Propagation | MappingPurpose::Both)
    }
}

/// Transformation applied to string values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    Lowercase,
    Uppercase,
    Trim,
    Replace {
        from: String,
        to: String,
    },
    Prefix {
        value: String,
    },
    Suffix {
        value: String,
    },
    /// Character-based substring.
    Substring {
        start: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        end: Option<usize>,
    },
    /// Keep a regex capture group (0 for the whole match).
    Regex {
        pattern: String,
        #[serde(default)]
        group: usize,
    },
    /// Supply a value when none was resolved.
    Default {
        value: String,
    },
    Chain {
        transforms: Vec<Transform>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_deserialize() {
        let json = r#"{
            "object_class": "inetOrgPerson",
            "account_link": "'uid=' + username + ',ou=people,o=isp'",
            "items": [
                {
                    "ext_attr_name": "uid",
                    "source": {"type": "username"},
                    "conn_object_key": true,
                    "mandatory_condition": "true"
                },
                {
                    "ext_attr_name": "mail",
                    "source": {"type": "plain", "name": "email"},
                    "transforms": [{"type": "lowercase"}]
                },
                {
                    "ext_attr_name": "__PASSWORD__",
                    "source": {"type": "password"},
                    "purpose": "propagation"
                },
                {
                    "ext_attr_name": "employeeNumber",
                    "source": {"type": "plain", "name": "employee_id"},
                    "purpose": "pull"
                }
            ]
        }"#;

        let mapping: Mapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.object_class, "inetOrgPerson");
        assert_eq!(mapping.propagation_items().count(), 3);
        assert_eq!(mapping.conn_object_key_item().unwrap().ext_attr_name, "uid");
        assert_eq!(mapping.attributes_to_get(), vec!["uid", "mail"]);
        assert!(mapping.account_link().is_some());
        assert!(matches!(
            mapping.items[1].transforms[0],
            Transform::Lowercase
        ));
    }

    #[test]
    fn test_defaults() {
        let mapping: Mapping = serde_json::from_str(r#"{"account_link": "  "}"#).unwrap();
        assert_eq!(mapping.object_class, ACCOUNT_OBJECT_CLASS);
        assert!(mapping.account_link().is_none());

        let item = MappingItem::plain("cn", "fullname");
        assert_eq!(item.mandatory_condition, "false");
        assert_eq!(item.purpose, MappingPurpose::Both);
        assert!(!item.is_password());
        assert!(MappingItem::password().is_password());
    }
}
