//! Connector type definitions
//!
//! Operations, propagation modes, capabilities and trace levels shared by the
//! gateway and the propagation engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operation requested on an external resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceOperation {
    /// Create the external object.
    Create,
    /// Update the external object.
    Update,
    /// Delete the external object.
    Delete,
}

impl ResourceOperation {
    /// All operations, in the order a propagation plan is walked.
    #[must_use]
    pub fn all() -> &'static [ResourceOperation] {
        &[
            ResourceOperation::Create,
            ResourceOperation::Update,
            ResourceOperation::Delete,
        ]
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceOperation::Create => "create",
            ResourceOperation::Update => "update",
            ResourceOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for ResourceOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceOperation {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(ResourceOperation::Create),
            "update" => Ok(ResourceOperation::Update),
            "delete" => Ok(ResourceOperation::Delete),
            _ => Err(ParseTypeError::new(
                "resource operation",
                s,
                "create, update, delete",
            )),
        }
    }
}

/// Execution style of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationMode {
    /// The call is fire-and-forget.
    #[default]
    OnePhase,
    /// The call is submitted first and confirmed later.
    TwoPhases,
}

impl PropagationMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PropagationMode::OnePhase => "one_phase",
            PropagationMode::TwoPhases => "two_phases",
        }
    }
}

impl fmt::Display for PropagationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PropagationMode {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "one_phase" => Ok(PropagationMode::OnePhase),
            "two_phases" => Ok(PropagationMode::TwoPhases),
            _ => Err(ParseTypeError::new(
                "propagation mode",
                s,
                "one_phase, two_phases",
            )),
        }
    }
}

/// A feature declared by a connector instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorCapability {
    OnePhaseCreate,
    TwoPhasesCreate,
    OnePhaseUpdate,
    TwoPhasesUpdate,
    OnePhaseDelete,
    TwoPhasesDelete,
    Search,
    Sync,
    Authenticate,
}

impl ConnectorCapability {
    #[must_use]
    pub fn all() -> &'static [ConnectorCapability] {
        &[
            ConnectorCapability::OnePhaseCreate,
            ConnectorCapability::TwoPhasesCreate,
            ConnectorCapability::OnePhaseUpdate,
            ConnectorCapability::TwoPhasesUpdate,
            ConnectorCapability::OnePhaseDelete,
            ConnectorCapability::TwoPhasesDelete,
            ConnectorCapability::Search,
            ConnectorCapability::Sync,
            ConnectorCapability::Authenticate,
        ]
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorCapability::OnePhaseCreate => "one_phase_create",
            ConnectorCapability::TwoPhasesCreate => "two_phases_create",
            ConnectorCapability::OnePhaseUpdate => "one_phase_update",
            ConnectorCapability::TwoPhasesUpdate => "two_phases_update",
            ConnectorCapability::OnePhaseDelete => "one_phase_delete",
            ConnectorCapability::TwoPhasesDelete => "two_phases_delete",
            ConnectorCapability::Search => "search",
            ConnectorCapability::Sync => "sync",
            ConnectorCapability::Authenticate => "authenticate",
        }
    }

    /// Capability required to run `operation` under `mode`.
    #[must_use]
    pub fn required_for(operation: ResourceOperation, mode: PropagationMode) -> Self {
        match (operation, mode) {
            (ResourceOperation::Create, PropagationMode::OnePhase) => {
                ConnectorCapability::OnePhaseCreate
            }
            (ResourceOperation::Create, PropagationMode::TwoPhases) => {
                ConnectorCapability::TwoPhasesCreate
            }
            (ResourceOperation::Update, PropagationMode::OnePhase) => {
                ConnectorCapability::OnePhaseUpdate
            }
            (ResourceOperation::Update, PropagationMode::TwoPhases) => {
                ConnectorCapability::TwoPhasesUpdate
            }
            (ResourceOperation::Delete, PropagationMode::OnePhase) => {
                ConnectorCapability::OnePhaseDelete
            }
            (ResourceOperation::Delete, PropagationMode::TwoPhases) => {
                ConnectorCapability::TwoPhasesDelete
            }
        }
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for ConnectorCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConnectorCapability {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('-', "_");
        ConnectorCapability::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| ParseTypeError::new("connector capability", s, "see ConnectorCapability"))
    }
}

/// Set of capabilities declared by a connector instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(
    from = "Vec<ConnectorCapability>",
    into = "Vec<ConnectorCapability>"
)]
pub struct CapabilitySet(u16);

impl CapabilitySet {
    #[must_use]
    pub fn empty() -> Self {
        Self(0)
    }

    /// Every known capability.
    #[must_use]
    pub fn full() -> Self {
        ConnectorCapability::all().iter().copied().collect()
    }

    #[must_use]
    pub fn with(mut self, capability: ConnectorCapability) -> Self {
        self.insert(capability);
        self
    }

    pub fn insert(&mut self, capability: ConnectorCapability) {
        self.0 |= capability.bit();
    }

    pub fn remove(&mut self, capability: ConnectorCapability) {
        self.0 &= !capability.bit();
    }

    #[must_use]
    pub fn contains(&self, capability: ConnectorCapability) -> bool {
        self.0 & capability.bit() != 0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = ConnectorCapability> + '_ {
        ConnectorCapability::all()
            .iter()
            .copied()
            .filter(|c| self.contains(*c))
    }
}

impl FromIterator<ConnectorCapability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = ConnectorCapability>>(iter: I) -> Self {
        let mut set = CapabilitySet::empty();
        for capability in iter {
            set.insert(capability);
        }
        set
    }
}

impl From<Vec<ConnectorCapability>> for CapabilitySet {
    fn from(capabilities: Vec<ConnectorCapability>) -> Self {
        capabilities.into_iter().collect()
    }
}

impl From<CapabilitySet> for Vec<ConnectorCapability> {
    fn from(set: CapabilitySet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|c| c.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// How much of a resource's execution history is kept.
///
/// Variants are ordered from least to most verbose.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    None,
    Failures,
    Summary,
    #[default]
    All,
}

impl TraceLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceLevel::None => "none",
            TraceLevel::Failures => "failures",
            TraceLevel::Summary => "summary",
            TraceLevel::All => "all",
        }
    }

    /// Whether an execution with the given outcome must be registered.
    #[must_use]
    pub fn should_register(&self, failed: bool) -> bool {
        *self == TraceLevel::All || (failed && *self >= TraceLevel::Failures)
    }
}

impl fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TraceLevel {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(TraceLevel::None),
            "failures" => Ok(TraceLevel::Failures),
            "summary" => Ok(TraceLevel::Summary),
            "all" => Ok(TraceLevel::All),
            _ => Err(ParseTypeError::new(
                "trace level",
                s,
                "none, failures, summary, all",
            )),
        }
    }
}

/// Error parsing one of the enums in this module from a string.
#[derive(Debug, Clone)]
pub struct ParseTypeError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

impl ParseTypeError {
    fn new(kind: &'static str, value: &str, expected: &'static str) -> Self {
        Self {
            kind,
            value: value.to_string(),
            expected,
        }
    }
}

impl fmt::Display for ParseTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} '{}', expected one of: {}",
            self.kind, self.value, self.expected
        )
    }
}

impl std::error::Error for ParseTypeError {}
