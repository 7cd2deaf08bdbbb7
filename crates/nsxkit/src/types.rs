//! Core types for NSX objects.
//!
//! Remote records (`SecurityGroup`, `ApplicationService`, `SecurityPolicy`)
//! mirror the manager's JSON with camelCase field names. The dynamic
//! membership definition has a domain form, where the rules operator is a
//! per-set attribute, and a wire form, where every rule repeats it.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scope of the global root namespace.
pub const GLOBAL_SCOPE: &str = "globalroot-0";

/// Namespace under which named objects are looked up and created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    /// Create a scope from its identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The global root scope.
    #[must_use]
    pub fn global() -> Self {
        Self(GLOBAL_SCOPE.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::global()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Scope {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Boolean operator combining rules or sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "AND")]
    And,
    #[default]
    #[serde(rename = "OR")]
    Or,
}

impl Operator {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            other => Err(Error::validation(
                "operator",
                format!("{:?} must be one of \"OR\" or \"AND\"", other),
            )),
        }
    }
}

/// Attribute a dynamic membership rule matches on.
///
/// Remote records may carry keys this crate does not know about; those are
/// kept verbatim in `Other` so reads never fail, but they are rejected in
/// desired state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MatchKey {
    SecurityTag,
    GuestOsFullName,
    GuestHostName,
    VmName,
    Entity,
    Other(String),
}

impl MatchKey {
    /// All keys accepted in desired state.
    pub const KNOWN: [MatchKey; 5] = [
        MatchKey::SecurityTag,
        MatchKey::GuestOsFullName,
        MatchKey::GuestHostName,
        MatchKey::VmName,
        MatchKey::Entity,
    ];

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SecurityTag => "VM.SECURITY_TAG",
            Self::GuestOsFullName => "VM.GUEST_OS_FULL_NAME",
            Self::GuestHostName => "VM.GUEST_HOST_NAME",
            Self::VmName => "VM.NAME",
            Self::Entity => "ENTITY",
            Self::Other(s) => s,
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for MatchKey {
    fn from(s: String) -> Self {
        Self::KNOWN
            .iter()
            .find(|k| k.as_str() == s)
            .cloned()
            .unwrap_or(Self::Other(s))
    }
}

impl From<MatchKey> for String {
    fn from(k: MatchKey) -> Self {
        k.as_str().to_string()
    }
}

impl FromStr for MatchKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match MatchKey::from(s.to_string()) {
            MatchKey::Other(_) => Err(Error::validation(
                "key",
                format!(
                    "{:?} must be a valid key, one of {}",
                    s,
                    Self::KNOWN.map(|k| k.as_str().to_string()).join(", ")
                ),
            )),
            known => Ok(known),
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a rule compares the attribute against its value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Comparator {
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    Contains,
    BelongsTo,
    SimilarTo,
    Other(String),
}

impl Comparator {
    /// All comparators accepted in desired state.
    pub const KNOWN: [Comparator; 7] = [
        Comparator::Equals,
        Comparator::NotEquals,
        Comparator::StartsWith,
        Comparator::EndsWith,
        Comparator::Contains,
        Comparator::BelongsTo,
        Comparator::SimilarTo,
    ];

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Contains => "contains",
            Self::BelongsTo => "belongs_to",
            Self::SimilarTo => "similar_to",
            Self::Other(s) => s,
        }
    }

    #[must_use]
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for Comparator {
    fn from(s: String) -> Self {
        Self::KNOWN
            .iter()
            .find(|c| c.as_str() == s)
            .cloned()
            .unwrap_or(Self::Other(s))
    }
}

impl From<Comparator> for String {
    fn from(c: Comparator) -> Self {
        c.as_str().to_string()
    }
}

impl FromStr for Comparator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Comparator::from(s.to_string()) {
            Comparator::Other(_) => Err(Error::validation(
                "criteria",
                format!(
                    "{:?} must be a valid criteria value, one of {}",
                    s,
                    Self::KNOWN.map(|c| c.as_str().to_string()).join(", ")
                ),
            )),
            known => Ok(known),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single membership rule: `key comparator value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Criterion {
    pub key: MatchKey,
    pub value: String,
    pub comparator: Comparator,
}

impl Criterion {
    pub fn new(key: MatchKey, value: impl Into<String>, comparator: Comparator) -> Self {
        Self {
            key,
            value: value.into(),
            comparator,
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:?}", self.key, self.comparator, self.value)
    }
}

/// A group of rules combined by `rules_operator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriteriaSet {
    /// Combines this set with the previous one.
    pub operator: Operator,
    /// Combines the rules inside this set.
    pub rules_operator: Operator,
    pub criteria: Vec<Criterion>,
}

impl CriteriaSet {
    /// Same set, rule order ignored.
    fn equivalent(&self, other: &CriteriaSet) -> bool {
        if self.operator != other.operator
            || self.rules_operator != other.rules_operator
            || self.criteria.len() != other.criteria.len()
        {
            return false;
        }
        let mut a: Vec<&Criterion> = self.criteria.iter().collect();
        let mut b: Vec<&Criterion> = other.criteria.iter().collect();
        a.sort();
        b.sort();
        a == b
    }
}

/// Rules deciding which entities belong to a security group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "DynamicMemberDefinition", into = "DynamicMemberDefinition")]
pub struct DynamicMembership {
    pub sets: Vec<CriteriaSet>,
}

impl DynamicMembership {
    pub fn new(sets: Vec<CriteriaSet>) -> Self {
        Self { sets }
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Compare set by set, ignoring rule order inside each set.
    ///
    /// The manager does not preserve rule order, so a plain `==` would report
    /// drift on every pass.
    #[must_use]
    pub fn equivalent(&self, other: &DynamicMembership) -> bool {
        self.sets.len() == other.sets.len()
            && self
                .sets
                .iter()
                .zip(&other.sets)
                .all(|(a, b)| a.equivalent(b))
    }
}

impl fmt::Display for DynamicMembership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, set) in self.sets.iter().enumerate() {
            if i > 0 {
                write!(f, " {} ", set.operator)?;
            }
            let rules: Vec<String> = set.criteria.iter().map(ToString::to_string).collect();
            write!(f, "({})", rules.join(&format!(" {} ", set.rules_operator)))?;
        }
        Ok(())
    }
}

// =============================================================================
// Wire form of the membership definition
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DynamicMemberDefinition {
    #[serde(default)]
    dynamic_set: Vec<DynamicSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DynamicSet {
    #[serde(default)]
    operator: Operator,
    #[serde(default)]
    dynamic_criteria: Vec<DynamicCriteria>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DynamicCriteria {
    #[serde(default)]
    operator: Operator,
    key: MatchKey,
    criteria: Comparator,
    #[serde(default)]
    value: String,
}

impl From<DynamicMemberDefinition> for DynamicMembership {
    fn from(def: DynamicMemberDefinition) -> Self {
        let sets = def
            .dynamic_set
            .into_iter()
            .map(|set| CriteriaSet {
                operator: set.operator,
                // Stored per rule, meaningful per set: the first rule decides.
                rules_operator: set
                    .dynamic_criteria
                    .first()
                    .map(|c| c.operator)
                    .unwrap_or(set.operator),
                criteria: set
                    .dynamic_criteria
                    .into_iter()
                    .map(|c| Criterion {
                        key: c.key,
                        value: c.value,
                        comparator: c.criteria,
                    })
                    .collect(),
            })
            .collect();
        Self { sets }
    }
}

impl From<DynamicMembership> for DynamicMemberDefinition {
    fn from(membership: DynamicMembership) -> Self {
        let dynamic_set = membership
            .sets
            .into_iter()
            .map(|set| {
                let rules_operator = set.rules_operator;
                DynamicSet {
                    operator: set.operator,
                    dynamic_criteria: set
                        .criteria
                        .into_iter()
                        .map(|c| DynamicCriteria {
                            operator: rules_operator,
                            key: c.key,
                            criteria: c.comparator,
                            value: c.value,
                        })
                        .collect(),
                }
            })
            .collect();
        Self { dynamic_set }
    }
}

// =============================================================================
// Remote records
// =============================================================================

/// Common shape of records returned by a directory listing.
pub trait RemoteObject {
    /// Remote id; may be empty on malformed listings.
    fn object_id(&self) -> &str;

    /// Human-readable name used for lookup.
    fn name(&self) -> &str;
}

/// A security group as stored by the manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub object_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(
        rename = "dynamicMemberDefinition",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub dynamic_membership: Option<DynamicMembership>,
}

impl RemoteObject for SecurityGroup {
    fn object_id(&self) -> &str {
        &self.object_id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Protocol and port specification of an application service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceElement {
    pub application_protocol: String,
    /// Port, port range or comma-separated list; empty for portless protocols.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
}

/// An application service as stored by the manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationService {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub object_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub element: Vec<ServiceElement>,
}

impl ApplicationService {
    /// Protocol of the first element.
    #[must_use]
    pub fn protocol(&self) -> &str {
        self.element
            .first()
            .map(|e| e.application_protocol.as_str())
            .unwrap_or_default()
    }

    /// Ports of the first element.
    #[must_use]
    pub fn ports(&self) -> &str {
        self.element
            .first()
            .map(|e| e.value.as_str())
            .unwrap_or_default()
    }
}

impl RemoteObject for ApplicationService {
    fn object_id(&self) -> &str {
        &self.object_id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Reference to a security group bound to a policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBinding {
    pub object_id: String,
}

/// A security policy as stored by the manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub object_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub precedence: String,
    #[serde(default)]
    pub security_group_binding: Vec<GroupBinding>,
}

impl SecurityPolicy {
    /// Ids of the bound security groups, in binding order.
    #[must_use]
    pub fn security_groups(&self) -> Vec<String> {
        self.security_group_binding
            .iter()
            .map(|b| b.object_id.clone())
            .collect()
    }
}

impl RemoteObject for SecurityPolicy {
    fn object_id(&self) -> &str {
        &self.object_id
    }

    fn name(&self) -> &str {
        &self.name
    }
}
