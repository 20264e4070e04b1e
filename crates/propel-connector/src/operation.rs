//! Operation types
//!
//! Attributes, attribute sets and remote objects exchanged with connectors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute carrying the account identifier of a remote object.
pub const NAME_ATTR: &str = "__NAME__";

/// Attribute carrying the native unique id of a remote object.
pub const UID_ATTR: &str = "__UID__";

/// Attribute carrying the enabled/disabled status.
pub const ENABLE_ATTR: &str = "__ENABLE__";

/// Attribute carrying the password.
pub const PASSWORD_ATTR: &str = "__PASSWORD__";

/// Marker attribute listing mandatory attributes that could not be resolved.
pub const MANDATORY_MISSING_ATTR: &str = "__MANDATORY_MISSING__";

/// Check whether an attribute name is one of the `__X__` operational names.
#[must_use]
pub fn is_operational(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

/// Unique identifier of an object in the target system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uid {
    attribute_name: String,
    value: String,
}

impl Uid {
    pub fn new(attribute_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute_name: attribute_name.into(),
            value: value.into(),
        }
    }

    /// Uid stored under the default `__UID__` attribute.
    pub fn from_value(value: impl Into<String>) -> Self {
        Self::new(UID_ATTR, value)
    }

    pub fn attribute_name(&self) -> &str {
        &self.attribute_name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Float(f64),
    Binary(Vec<u8>),
}

impl AttributeValue {
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert a JSON value into attribute values.
    ///
    /// Arrays are flattened one level; nulls and objects yield nothing.
    pub fn from_json(value: &serde_json::Value) -> Vec<AttributeValue> {
        match value {
            serde_json::Value::Null | serde_json::Value::Object(_) => Vec::new(),
            serde_json::Value::Bool(b) => vec![AttributeValue::Boolean(*b)],
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => vec![AttributeValue::Integer(i)],
                None => n
                    .as_f64()
                    .map(AttributeValue::Float)
                    .into_iter()
                    .collect(),
            },
            serde_json::Value::String(s) => vec![AttributeValue::String(s.clone())],
            serde_json::Value::Array(items) => {
                items.iter().flat_map(AttributeValue::from_json).collect()
            }
        }
    }

    /// JSON representation used when exposing values to expressions.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::String(s) => serde_json::Value::String(s.clone()),
            AttributeValue::Integer(i) => serde_json::Value::from(*i),
            AttributeValue::Boolean(b) => serde_json::Value::Bool(*b),
            AttributeValue::Float(f) => serde_json::Value::from(*f),
            AttributeValue::Binary(bytes) => serde_json::Value::from(bytes.clone()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{s}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            AttributeValue::Boolean(b) => write!(f, "{b}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Float(f)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Binary(bytes)
    }
}

/// A named attribute with an ordered, duplicate-free list of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    name: String,
    #[serde(default)]
    values: Vec<AttributeValue>,
}

impl Attribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values<I, V>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        let mut attr = Self::new(name);
        for value in values {
            attr.push(value);
        }
        attr
    }

    pub fn single(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::with_values(name, [value])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[AttributeValue] {
        &self.values
    }

    /// Append a value unless an equal value is already present.
    ///
    /// Returns `true` if the value was added.
    pub fn push(&mut self, value: impl Into<AttributeValue>) -> bool {
        let value = value.into();
        if self.values.contains(&value) {
            return false;
        }
        self.values.push(value);
        true
    }

    pub fn extend<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<AttributeValue>,
    {
        for value in values {
            self.push(value);
        }
    }

    pub fn remove_value(&mut self, value: &AttributeValue) -> bool {
        let before = self.values.len();
        self.values.retain(|v| v != value);
        self.values.len() < before
    }

    pub fn contains(&self, value: &AttributeValue) -> bool {
        self.values.contains(value)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// First value as a string, if any.
    pub fn first_string(&self) -> Option<&str> {
        self.values.first().and_then(AttributeValue::as_string)
    }

    /// Compare values ignoring order.
    pub fn same_values(&self, other: &Attribute) -> bool {
        self.values.len() == other.values.len()
            && self.values.iter().all(|v| other.values.contains(v))
    }

    pub fn into_values(self) -> Vec<AttributeValue> {
        self.values
    }
}

/// Ordered collection of attributes with at most one entry per name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet {
    attributes: Vec<Attribute>,
}

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`AttributeSet::merge`] for a single value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.merge(Attribute::single(name, value));
        self
    }

    /// Add an attribute, unioning its values into an existing entry of the
    /// same name.
    pub fn merge(&mut self, attribute: Attribute) {
        match self.get_mut(attribute.name()) {
            Some(existing) => existing.extend(attribute.into_values()),
            None => self.attributes.push(attribute),
        }
    }

    /// Replace the entry with the same name, keeping its position.
    pub fn set(&mut self, attribute: Attribute) {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name() == attribute.name())
        {
            Some(existing) => *existing = attribute,
            None => self.attributes.push(attribute),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes.iter_mut().find(|a| a.name() == name)
    }

    /// First string value of the named attribute.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Attribute::first_string)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        let index = self.attributes.iter().position(|a| a.name() == name)?;
        Some(self.attributes.remove(index))
    }

    pub fn retain<F>(&mut self, f: F)
    where
        F: FnMut(&Attribute) -> bool,
    {
        self.attributes.retain(f);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(Attribute::name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Value of `__NAME__`.
    pub fn name(&self) -> Option<&str> {
        self.get_string(NAME_ATTR)
    }

    /// Value of `__ENABLE__`.
    pub fn enabled(&self) -> Option<bool> {
        self.get(ENABLE_ATTR)
            .and_then(|a| a.values().first())
            .and_then(AttributeValue::as_boolean)
    }
}

impl FromIterator<Attribute> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        let mut set = AttributeSet::new();
        for attribute in iter {
            set.merge(attribute);
        }
        set
    }
}

impl IntoIterator for AttributeSet {
    type Item = Attribute;
    type IntoIter = std::vec::IntoIter<Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.into_iter()
    }
}

/// An object as read back from an external resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorObject {
    pub object_class: String,
    pub uid: Uid,
    pub name: String,
    #[serde(default)]
    pub attributes: AttributeSet,
}

impl ConnectorObject {
    pub fn new(object_class: impl Into<String>, uid: Uid, name: impl Into<String>) -> Self {
        Self {
            object_class: object_class.into(),
            uid,
            name: name.into(),
            attributes: AttributeSet::new(),
        }
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_deduplicates_values() {
        let mut attr = Attribute::new("mail");
        assert!(attr.push("a@example.com"));
        assert!(!attr.push("a@example.com"));
        assert!(attr.push("b@example.com"));

        assert_eq!(attr.values().len(), 2);
        assert_eq!(attr.first_string(), Some("a@example.com"));
    }

    #[test]
    fn test_attribute_set_merge_unions_values() {
        let mut set = AttributeSet::new();
        set.merge(Attribute::with_values("mail", ["a@example.com", "b@example.com"]));
        set.merge(Attribute::single("cn", "John"));
        set.merge(Attribute::with_values("mail", ["b@example.com", "c@example.com"]));

        assert_eq!(set.len(), 2);
        let mail = set.get("mail").unwrap();
        let values: Vec<&str> = mail.values().iter().filter_map(|v| v.as_string()).collect();
        assert_eq!(values, vec!["a@example.com", "b@example.com", "c@example.com"]);

        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["mail", "cn"]);
    }

    #[test]
    fn test_attribute_set_set_replaces_in_place() {
        let mut set = AttributeSet::new()
            .with("cn", "John")
            .with("sn", "Doe");
        set.set(Attribute::single("cn", "Johnny"));

        assert_eq!(set.get_string("cn"), Some("Johnny"));
        assert_eq!(set.names().next(), Some("cn"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_operational_accessors() {
        let set = AttributeSet::new()
            .with(NAME_ATTR, "jdoe")
            .with(ENABLE_ATTR, false);

        assert_eq!(set.name(), Some("jdoe"));
        assert_eq!(set.enabled(), Some(false));
        assert!(is_operational(NAME_ATTR));
        assert!(!is_operational("mail"));
        assert!(!is_operational("____"));
    }

    #[test]
    fn test_same_values_ignores_order() {
        let a = Attribute::with_values("member", ["x", "y"]);
        let b = Attribute::with_values("member", ["y", "x"]);
        let c = Attribute::with_values("member", ["x"]);

        assert!(a.same_values(&b));
        assert!(!a.same_values(&c));
    }

    #[test]
    fn test_from_json_flattens_arrays() {
        let values = AttributeValue::from_json(&serde_json::json!(["a", 1, true, null]));
        assert_eq!(
            values,
            vec![
                AttributeValue::from("a"),
                AttributeValue::Integer(1),
                AttributeValue::Boolean(true)
            ]
        );
    }
}
