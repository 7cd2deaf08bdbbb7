//! Manifest schema
//!
//! Resources are declared in labelled tables, one table per kind. The label
//! is the local handle kept in state; the `name` is what the manager sees.
//!
//! ```toml
//! [security_group.web]
//! name = "web"
//!
//! [[security_group.web.dynamic_membership]]
//! set_operator = "OR"
//! rules_operator = "AND"
//! rules = [{ key = "VM.NAME", value = "web", criteria = "starts_with" }]
//!
//! [service.https]
//! name = "https"
//! description = "TLS"
//! protocol = "TCP"
//! ports = "443"
//!
//! [security_policy.web]
//! name = "web-policy"
//! precedence = 4300
//! description = "web tier"
//! security_groups = ["security_group.web"]
//! ```
//!
//! Policy `security_groups` entries are either remote ids or references to a
//! declared group (`security_group.<label>`), resolved from state once the
//! group is bound.

use anyhow::{Context, Result, anyhow, bail};
use nsxkit::{
    Comparator, CriteriaSet, Criterion, DynamicMembership, MatchKey, Operator, Scope,
    SecurityGroupSpec, SecurityPolicySpec, ServiceSpec,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

/// Prefix of a policy entry that refers to a declared group by label
pub const GROUP_REF_PREFIX: &str = "security_group.";

// ============================================================================
// Manifest
// ============================================================================

/// Declared resources, keyed by label per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub security_group: BTreeMap<String, GroupDecl>,

    #[serde(default)]
    pub service: BTreeMap<String, ServiceDecl>,

    #[serde(default)]
    pub security_policy: BTreeMap<String, PolicyDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupDecl {
    /// Defaults to the global scope
    #[serde(default)]
    pub scope: Option<String>,
    pub name: String,
    #[serde(default)]
    pub no_delete: bool,
    /// Omit to leave membership unmanaged
    #[serde(default)]
    pub dynamic_membership: Option<Vec<SetDecl>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetDecl {
    pub set_operator: String,
    pub rules_operator: String,
    pub rules: Vec<RuleDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDecl {
    pub key: String,
    pub value: String,
    pub criteria: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceDecl {
    #[serde(default)]
    pub scope: Option<String>,
    pub name: String,
    pub description: String,
    pub protocol: String,
    #[serde(default)]
    pub ports: Option<String>,
    #[serde(default)]
    pub no_delete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyDecl {
    pub name: String,
    pub precedence: Precedence,
    pub description: String,
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub no_delete: bool,
}

/// Policy precedence, written either as a number or a string
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Precedence {
    Number(i64),
    Text(String),
}

impl fmt::Display for Precedence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
        }
    }
}

impl Manifest {
    /// Load and validate a manifest file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Manifest not found: {}", path.display());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let manifest = Self::parse(&content)
            .with_context(|| format!("Invalid manifest: {}", path.display()))?;

        log::debug!(
            "Loaded manifest from {} ({} resources)",
            path.display(),
            manifest.len()
        );
        Ok(manifest)
    }

    /// Parse and validate manifest content
    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn len(&self) -> usize {
        self.security_group.len() + self.service.len() + self.security_policy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check every declaration without contacting the manager
    pub fn validate(&self) -> Result<()> {
        let groups = self.security_groups()?;
        let mut seen = HashMap::new();
        for (label, spec) in &groups {
            spec.validate()
                .with_context(|| format!("security_group.{}", label))?;
            claim(&mut seen, "security_group", label, spec.scope.as_str(), &spec.name)?;
        }

        let mut seen = HashMap::new();
        for (label, spec) in self.services() {
            spec.validate().with_context(|| format!("service.{}", label))?;
            claim(&mut seen, "service", &label, spec.scope.as_str(), &spec.name)?;
        }

        let mut seen = HashMap::new();
        for (label, decl) in &self.security_policy {
            let address = format!("security_policy.{}", label);
            if let Some(missing) = decl.group_refs().find(|g| !groups.contains_key(*g)) {
                bail!("{}: security group '{}' is not declared", address, missing);
            }
            // Placeholder ids: only the shape is checked here
            let spec = decl
                .to_spec(|group| Some(format!("{}{}", GROUP_REF_PREFIX, group)))
                .with_context(|| address.clone())?;
            spec.validate().with_context(|| address.clone())?;
            claim(&mut seen, "security_policy", label, "", &spec.name)?;
        }
        Ok(())
    }

    /// Declared groups as controller input
    pub fn security_groups(&self) -> Result<BTreeMap<String, SecurityGroupSpec>> {
        self.security_group
            .iter()
            .map(|(label, decl)| {
                let spec = decl
                    .to_spec()
                    .with_context(|| format!("security_group.{}", label))?;
                Ok((label.clone(), spec))
            })
            .collect()
    }

    /// Declared services as controller input
    pub fn services(&self) -> BTreeMap<String, ServiceSpec> {
        self.service
            .iter()
            .map(|(label, decl)| (label.clone(), decl.to_spec()))
            .collect()
    }
}

/// Reject two labels that would manage the same remote object
fn claim(
    seen: &mut HashMap<(String, String), String>,
    kind: &str,
    label: &str,
    scope: &str,
    name: &str,
) -> Result<()> {
    let key = (scope.to_string(), name.to_string());
    if let Some(first) = seen.get(&key) {
        bail!(
            "{}.{} and {}.{} both declare '{}'",
            kind,
            first,
            kind,
            label,
            name
        );
    }
    seen.insert(key, label.to_string());
    Ok(())
}

// ============================================================================
// Conversion
// ============================================================================

fn scope(scope: Option<&str>) -> Scope {
    scope.map(Scope::new).unwrap_or_default()
}

fn operator(value: &str, field: &str) -> Result<Operator> {
    value.parse().with_context(|| field.to_string())
}

impl GroupDecl {
    pub fn to_spec(&self) -> Result<SecurityGroupSpec> {
        let dynamic_membership = match &self.dynamic_membership {
            Some(sets) => {
                let sets = sets
                    .iter()
                    .enumerate()
                    .map(|(i, set)| {
                        set.to_set().with_context(|| format!("dynamic_membership[{}]", i))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some(DynamicMembership::new(sets))
            }
            None => None,
        };

        Ok(SecurityGroupSpec {
            scope: scope(self.scope.as_deref()),
            name: self.name.clone(),
            no_delete: self.no_delete,
            dynamic_membership,
        })
    }
}

impl SetDecl {
    fn to_set(&self) -> Result<CriteriaSet> {
        let criteria = self
            .rules
            .iter()
            .enumerate()
            .map(|(j, rule)| rule.to_criterion().with_context(|| format!("rules[{}]", j)))
            .collect::<Result<Vec<_>>>()?;

        Ok(CriteriaSet {
            operator: operator(&self.set_operator, "set_operator")?,
            rules_operator: operator(&self.rules_operator, "rules_operator")?,
            criteria,
        })
    }
}

impl RuleDecl {
    fn to_criterion(&self) -> Result<Criterion> {
        let key: MatchKey = self.key.parse().context("key")?;
        let comparator: Comparator = self.criteria.parse().context("criteria")?;
        Ok(Criterion::new(key, &self.value, comparator))
    }
}

impl ServiceDecl {
    pub fn to_spec(&self) -> ServiceSpec {
        ServiceSpec {
            scope: scope(self.scope.as_deref()),
            name: self.name.clone(),
            description: self.description.clone(),
            protocol: self.protocol.clone(),
            ports: self.ports.clone(),
            no_delete: self.no_delete,
        }
    }
}

impl PolicyDecl {
    /// Group labels this policy refers to
    pub fn group_refs(&self) -> impl Iterator<Item = &str> {
        self.security_groups
            .iter()
            .filter_map(|g| g.strip_prefix(GROUP_REF_PREFIX))
    }

    /// Build controller input, mapping group references to remote ids
    ///
    /// `resolve` gets the group label and returns its remote id, or `None`
    /// while the group is not bound.
    pub fn to_spec(&self, resolve: impl Fn(&str) -> Option<String>) -> Result<SecurityPolicySpec> {
        let security_groups = self
            .security_groups
            .iter()
            .map(|entry| match entry.strip_prefix(GROUP_REF_PREFIX) {
                Some(label) => resolve(label)
                    .ok_or_else(|| anyhow!("security group '{}' is not bound yet", label)),
                None => Ok(entry.clone()),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SecurityPolicySpec {
            name: self.name.clone(),
            precedence: self.precedence.to_string(),
            description: self.description.clone(),
            security_groups,
            no_delete: self.no_delete,
        })
    }
}
