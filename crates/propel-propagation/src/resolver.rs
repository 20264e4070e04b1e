//! Attribute projection.
//!
//! Turns a subject snapshot into the attribute set one resource expects,
//! following the propagation items of a [`Mapping`].

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use propel_connector::mapping::{ItemSource, Mapping, MappingItem};
use propel_connector::operation::{
    Attribute, AttributeSet, AttributeValue, MANDATORY_MISSING_ATTR, PASSWORD_ATTR,
};
use propel_connector::transform::TransformEngine;

use crate::error::{PropagationError, PropagationResult};
use crate::expression::{EvalContext, ExpressionEvaluator};
use crate::subject::{Subject, SubjectKind};

/// Cache of virtual attribute values, owned elsewhere.
///
/// The resolver only signals that a cached value was touched.
pub trait VirtualAttributeCache: Send + Sync {
    fn expire(&self, kind: SubjectKind, subject_key: &str, schema: &str);
}

/// Cache that holds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopVirtualAttributeCache;

impl VirtualAttributeCache for NoopVirtualAttributeCache {
    fn expire(&self, _kind: SubjectKind, _subject_key: &str, _schema: &str) {}
}

/// Output of one resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedAttributes {
    /// Value of the conn-object-key item.
    pub account_id: Option<String>,
    pub attributes: AttributeSet,
}

/// Projects subject attributes through a mapping.
pub struct AttributeResolver {
    evaluator: Arc<dyn ExpressionEvaluator>,
    transforms: TransformEngine,
    cache: Arc<dyn VirtualAttributeCache>,
}

impl std::fmt::Debug for AttributeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeResolver")
            .field("evaluator", &self.evaluator.evaluator_type())
            .finish_non_exhaustive()
    }
}

impl AttributeResolver {
    #[must_use]
    pub fn new(evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        Self {
            evaluator,
            transforms: TransformEngine::new(),
            cache: Arc::new(NoopVirtualAttributeCache),
        }
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn VirtualAttributeCache>) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn evaluator(&self) -> &Arc<dyn ExpressionEvaluator> {
        &self.evaluator
    }

    /// Resolve every propagation item of `mapping` for `subject`.
    ///
    /// Items targeting the same external name are merged by value union. An
    /// item that fails to evaluate is logged and skipped.
    #[instrument(skip_all, fields(subject = %subject.key, object_class = %mapping.object_class))]
    pub fn resolve(
        &self,
        subject: &Subject,
        password: Option<&str>,
        mapping: &Mapping,
    ) -> ResolvedAttributes {
        let context = subject.expression_context();
        let mut resolved = ResolvedAttributes::default();
        let mut missing = Attribute::new(MANDATORY_MISSING_ATTR);

        for item in mapping.propagation_items() {
            if item.is_password() {
                match password.filter(|p| !p.is_empty()) {
                    Some(password) => resolved
                        .attributes
                        .merge(Attribute::single(PASSWORD_ATTR, password)),
                    None if self.is_mandatory(item, &context) => {
                        missing.push(PASSWORD_ATTR);
                    }
                    None => {}
                }
                continue;
            }

            let values = match self.item_values(subject, item, &context) {
                Ok(values) => values,
                Err(e) => {
                    warn!(
                        ext_attr_name = %item.ext_attr_name,
                        error = %e,
                        "Mapping item could not be evaluated, skipped"
                    );
                    continue;
                }
            };

            if item.conn_object_key {
                match values.first() {
                    Some(value) if resolved.account_id.is_none() => {
                        resolved.account_id = Some(match value {
                            AttributeValue::String(s) => s.clone(),
                            other => other.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => warn!(
                        ext_attr_name = %item.ext_attr_name,
                        "Conn object key item resolved to no value"
                    ),
                }
            }

            if values.is_empty() && self.is_mandatory(item, &context) {
                missing.push(item.ext_attr_name.clone());
            }

            resolved
                .attributes
                .merge(Attribute::with_values(item.ext_attr_name.clone(), values));
        }

        if !missing.is_empty() {
            debug!(missing = ?missing.values(), "Mandatory attributes without value");
            resolved.attributes.merge(missing);
        }
        resolved
    }

    fn is_mandatory(&self, item: &MappingItem, context: &EvalContext) -> bool {
        self.evaluator
            .evaluate_bool(&item.mandatory_condition, context)
            .unwrap_or_else(|e| {
                warn!(
                    ext_attr_name = %item.ext_attr_name,
                    error = %e,
                    "Mandatory condition could not be evaluated, assuming optional"
                );
                false
            })
    }

    fn item_values(
        &self,
        subject: &Subject,
        item: &MappingItem,
        context: &EvalContext,
    ) -> PropagationResult<Vec<AttributeValue>> {
        let evaluation_error = |message: String| PropagationError::MappingEvaluation {
            ext_attr_name: item.ext_attr_name.clone(),
            message,
        };

        let values = match &item.source {
            ItemSource::Plain { name } => subject.plain(name).to_vec(),
            ItemSource::Virtual { name } => {
                self.cache.expire(subject.kind, &subject.key, name);
                subject.virtual_values(name).to_vec()
            }
            ItemSource::Derived { expression, .. } | ItemSource::Expression { expression } => {
                let value = self
                    .evaluator
                    .evaluate(expression, context)
                    .map_err(|e| evaluation_error(e.to_string()))?;
                AttributeValue::from_json(&value)
            }
            ItemSource::Key => vec![AttributeValue::from(subject.key.clone())],
            ItemSource::Username => vec![AttributeValue::from(subject.username.clone())],
            ItemSource::Constant { value } => vec![AttributeValue::from(value.clone())],
            ItemSource::Password => Vec::new(),
        };

        if item.transforms.is_empty() {
            return Ok(values);
        }
        self.transforms
            .apply_all(&item.transforms, values)
            .map_err(|e| evaluation_error(e.to_string()))
    }
}
