//! Value transformation engine.
//!
//! Applies the [`Transform`]s configured on a mapping item to the values
//! resolved for it.

use regex::Regex;

use crate::error::{ConnectorError, ConnectorResult};
use crate::mapping::Transform;
use crate::operation::AttributeValue;

/// Applies mapping transforms to resolved values.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformEngine;

impl TransformEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Apply `transforms` in order to a list of values.
    ///
    /// Only string values are rewritten; other values pass through untouched.
    /// String values that become empty are dropped.
    pub fn apply_all(
        &self,
        transforms: &[Transform],
        values: Vec<AttributeValue>,
    ) -> ConnectorResult<Vec<AttributeValue>> {
        let mut current = values;
        for transform in transforms {
            current = self.apply(transform, current)?;
        }
        Ok(current)
    }

    fn apply(
        &self,
        transform: &Transform,
        values: Vec<AttributeValue>,
    ) -> ConnectorResult<Vec<AttributeValue>> {
        match transform {
            Transform::Default { value } => {
                let has_value = values
                    .iter()
                    .any(|v| v.as_string().map_or(true, |s| !s.is_empty()));
                if has_value {
                    Ok(values)
                } else {
                    Ok(vec![AttributeValue::String(value.clone())])
                }
            }
            Transform::Chain { transforms } => self.apply_all(transforms, values),
            Transform::Regex { pattern, .. } => {
                let re = Regex::new(pattern).map_err(|e| ConnectorError::InvalidConfiguration {
                    message: format!("invalid regex transform '{pattern}': {e}"),
                })?;
                self.map_strings(values, |s| Self::capture(&re, transform, s))
            }
            _ => self.map_strings(values, |s| Ok(Self::apply_to_str(transform, s))),
        }
    }

    fn map_strings<F>(&self, values: Vec<AttributeValue>, f: F) -> ConnectorResult<Vec<AttributeValue>>
    where
        F: Fn(&str) -> ConnectorResult<String>,
    {
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            match value {
                AttributeValue::String(s) => {
                    let transformed = f(&s)?;
                    if !transformed.is_empty() {
                        out.push(AttributeValue::String(transformed));
                    }
                }
                other => out.push(other),
            }
        }
        Ok(out)
    }

    fn capture(re: &Regex, transform: &Transform, value: &str) -> ConnectorResult<String> {
        let group = match transform {
            Transform::Regex { group, .. } => *group,
            _ => 0,
        };
        Ok(re
            .captures(value)
            .and_then(|caps| caps.get(group))
            .map_or_else(String::new, |m| m.as_str().to_string()))
    }

    /// Apply a single non-regex transform to one string.
    #[must_use]
    pub fn apply_to_str(transform: &Transform, value: &str) -> String {
        match transform {
            Transform::Lowercase => value.to_lowercase(),
            Transform::Uppercase => value.to_uppercase(),
            Transform::Trim => value.trim().to_string(),
            Transform::Replace { from, to } => value.replace(from.as_str(), to),
            Transform::Prefix { value: prefix } => format!("{prefix}{value}"),
            Transform::Suffix { value: suffix } => format!("{value}{suffix}"),
            Transform::Substring { start, end } => {
                let chars: Vec<char> = value.chars().collect();
                let start = (*start).min(chars.len());
                let end = end.map_or(chars.len(), |e| e.min(chars.len())).max(start);
                chars[start..end].iter().collect()
            }
            Transform::Default { value: default } => {
                if value.is_empty() {
                    default.clone()
                } else {
                    value.to_string()
                }
            }
            Transform::Chain { transforms } => transforms
                .iter()
                .fold(value.to_string(), |acc, t| Self::apply_to_str(t, &acc)),
            Transform::Regex { .. } => value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[AttributeValue]) -> Vec<&str> {
        values.iter().filter_map(|v| v.as_string()).collect()
    }

    #[test]
    fn test_chain_of_transforms() {
        let engine = TransformEngine::new();
        let out = engine
            .apply_all(
                &[
                    Transform::Trim,
                    Transform::Lowercase,
                    Transform::Suffix {
                        value: "@example.com".to_string(),
                    },
                ],
                vec!["  JDoe ".into()],
            )
            .unwrap();

        assert_eq!(strings(&out), vec!["jdoe@example.com"]);
    }

    #[test]
    fn test_default_only_when_empty() {
        let engine = TransformEngine::new();
        let default = [Transform::Default {
            value: "n/a".to_string(),
        }];

        let out = engine.apply_all(&default, Vec::new()).unwrap();
        assert_eq!(strings(&out), vec!["n/a"]);

        let out = engine.apply_all(&default, vec!["x".into()]).unwrap();
        assert_eq!(strings(&out), vec!["x"]);
    }

    #[test]
    fn test_regex_capture_and_drop_empty() {
        let engine = TransformEngine::new();
        let regex = [Transform::Regex {
            pattern: r"^(\w+)@".to_string(),
            group: 1,
        }];

        let out = engine
            .apply_all(&regex, vec!["jdoe@example.com".into(), "no-at-sign".into()])
            .unwrap();
        assert_eq!(strings(&out), vec!["jdoe"]);
    }

    #[test]
    fn test_invalid_regex_is_error() {
        let engine = TransformEngine::new();
        let result = engine.apply_all(
            &[Transform::Regex {
                pattern: "(".to_string(),
                group: 0,
            }],
            vec!["x".into()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_non_strings_pass_through() {
        let engine = TransformEngine::new();
        let out = engine
            .apply_all(&[Transform::Uppercase], vec![AttributeValue::Integer(7)])
            .unwrap();
        assert_eq!(out, vec![AttributeValue::Integer(7)]);
    }

    #[test]
    fn test_substring_bounds() {
        let t = Transform::Substring {
            start: 2,
            end: Some(100),
        };
        assert_eq!(TransformEngine::apply_to_str(&t, "abcdef"), "cdef");

        let t = Transform::Substring {
            start: 10,
            end: Some(1),
        };
        assert_eq!(TransformEngine::apply_to_str(&t, "abc"), "");
    }
}
