//! Desired state for each object kind.
//!
//! These are the shapes handed over by the front-end. `validate` runs before
//! any remote call; a failure there never reaches the manager.

use crate::error::{Error, Result};
use crate::types::{DynamicMembership, Scope};
use serde::{Deserialize, Serialize};

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Desired security group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupSpec {
    #[serde(default)]
    pub scope: Scope,
    pub name: String,
    #[serde(default)]
    pub no_delete: bool,
    /// `None` leaves membership unmanaged; an empty membership clears it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_membership: Option<DynamicMembership>,
}

impl SecurityGroupSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scope: Scope::default(),
            name: name.into(),
            no_delete: false,
            dynamic_membership: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("scope", self.scope.as_str())?;
        require("name", &self.name)?;

        let Some(membership) = &self.dynamic_membership else {
            return Ok(());
        };
        for (i, set) in membership.sets.iter().enumerate() {
            if set.criteria.is_empty() {
                return Err(Error::validation(
                    format!("dynamic_membership[{}].rules", i),
                    "at least one rule is required",
                ));
            }
            for (j, rule) in set.criteria.iter().enumerate() {
                let field = format!("dynamic_membership[{}].rules[{}]", i, j);
                if !rule.key.is_known() {
                    return Err(Error::validation(
                        format!("{}.key", field),
                        format!("unsupported key {:?}", rule.key.as_str()),
                    ));
                }
                if !rule.comparator.is_known() {
                    return Err(Error::validation(
                        format!("{}.criteria", field),
                        format!("unsupported criteria {:?}", rule.comparator.as_str()),
                    ));
                }
                require(&format!("{}.value", field), &rule.value)?;
            }
        }
        Ok(())
    }
}

/// Desired application service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(default)]
    pub scope: Scope,
    pub name: String,
    pub description: String,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<String>,
    #[serde(default)]
    pub no_delete: bool,
}

impl ServiceSpec {
    pub fn validate(&self) -> Result<()> {
        require("scope", self.scope.as_str())?;
        require("name", &self.name)?;
        require("description", &self.description)?;
        require("protocol", &self.protocol)?;
        if let Some(ports) = &self.ports {
            require("ports", ports)?;
        }
        Ok(())
    }

    /// Ports as compared against the remote element value.
    #[must_use]
    pub fn ports_value(&self) -> &str {
        self.ports.as_deref().unwrap_or_default()
    }
}

/// Desired security policy.
///
/// Policies are global and immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPolicySpec {
    pub name: String,
    pub precedence: String,
    pub description: String,
    /// Remote ids of the bound security groups.
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub no_delete: bool,
}

impl SecurityPolicySpec {
    pub fn validate(&self) -> Result<()> {
        require("name", &self.name)?;
        require("precedence", &self.precedence)?;
        require("description", &self.description)?;
        if self.security_groups.is_empty() {
            return Err(Error::validation(
                "security_groups",
                "at least one security group is required",
            ));
        }
        if self.security_groups.iter().any(|g| g.trim().is_empty()) {
            return Err(Error::validation(
                "security_groups",
                "empty element found in security groups",
            ));
        }
        Ok(())
    }
}
