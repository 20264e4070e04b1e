//! Schema types
//!
//! Object classes and attributes advertised by a connector.

use serde::{Deserialize, Serialize};

use crate::operation::is_operational;

/// Schema advertised by a connector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub object_classes: Vec<ObjectClass>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_object_class(mut self, object_class: ObjectClass) -> Self {
        self.object_classes.push(object_class);
        self
    }

    #[must_use]
    pub fn get_object_class(&self, name: &str) -> Option<&ObjectClass> {
        self.object_classes
            .iter()
            .find(|oc| oc.name.eq_ignore_ascii_case(name))
    }

    /// Attribute names across all object classes, deduplicated and sorted.
    ///
    /// Operational `__X__` names are left out unless `show_all` is set.
    #[must_use]
    pub fn attribute_names(&self, show_all: bool) -> Vec<String> {
        let mut names: Vec<String> = self
            .object_classes
            .iter()
            .flat_map(|oc| oc.attributes.iter())
            .filter(|attr| show_all || !is_operational(&attr.name))
            .map(|attr| attr.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// An object class in the target system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectClass {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<SchemaAttribute>,
}

impl ObjectClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: SchemaAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<&SchemaAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// An attribute of an object class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaAttribute {
    pub name: String,
    #[serde(default)]
    pub multi_valued: bool,
    #[serde(default)]
    pub required: bool,
}

impl SchemaAttribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            multi_valued: false,
            required: false,
        }
    }

    #[must_use]
    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}
