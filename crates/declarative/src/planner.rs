//! Planner - decides which controller operation a resource needs

use crate::controller::{Controller, Entry};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation planned for one declared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Not bound yet: adopt by name or create
    Create,
    /// Bound: diff against remote and patch
    ///
    /// `changed` tells whether the desired attributes moved since the last
    /// pass. Update runs either way to correct remote drift.
    Update { changed: bool },
    /// Bound, but the change needs delete-then-create
    Replace,
    /// Bound, kind has no update path: only observe
    Refresh,
    /// No longer declared: delete
    Delete,
    /// No longer declared and never bound: drop the record
    Forget,
}

impl Action {
    /// Whether the action may issue remote mutations
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::Refresh | Self::Forget | Self::Update { changed: false }
        )
    }

    /// One-character marker for plan output
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Create => "+",
            Self::Update { changed: true } => "~",
            Self::Update { changed: false } | Self::Refresh => "=",
            Self::Replace => "±",
            Self::Delete => "-",
            Self::Forget => ".",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update { changed: true } => "update",
            Self::Update { changed: false } => "in sync",
            Self::Replace => "replace",
            Self::Refresh => "refresh",
            Self::Delete => "delete",
            Self::Forget => "forget",
        };
        write!(f, "{}", s)
    }
}

/// Plan the operation for one resource
///
/// `entry` is what the last pass persisted, `desired` what is declared now.
/// Returns `None` when there is nothing at all to do.
pub fn plan<C: Controller>(
    controller: &C,
    entry: Option<&Entry<C::Desired, C::Observed>>,
    desired: Option<&C::Desired>,
) -> Option<Action> {
    let bound = entry.filter(|e| e.identity.is_bound());

    match (bound, desired) {
        (None, Some(_)) => Some(Action::Create),
        (Some(entry), Some(desired)) => {
            if controller.requires_replacement(&entry.applied, desired) {
                Some(Action::Replace)
            } else if !controller.supports_update() {
                Some(Action::Refresh)
            } else {
                Some(Action::Update {
                    changed: entry.applied != *desired,
                })
            }
        }
        (Some(_), None) => Some(Action::Delete),
        (None, None) if entry.is_some() => Some(Action::Forget),
        (None, None) => None,
    }
}

/// A `kind[.label]` filter for restricting a pass to some resources
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Target {
    pub kind: Option<String>,
    pub label: Option<String>,
}

impl Target {
    /// Parse a target string like "security_group.web"
    pub fn parse(target: &str) -> Self {
        let parts: Vec<&str> = target.split('.').collect();
        match parts.len() {
            1 => Self {
                kind: Some(parts[0].to_string()),
                label: None,
            },
            2 => Self {
                kind: Some(parts[0].to_string()),
                label: Some(parts[1].to_string()),
            },
            _ => Self {
                kind: None,
                label: Some(target.to_string()),
            },
        }
    }

    /// Check if a resource matches the filter
    pub fn matches(&self, kind: &str, label: &str) -> bool {
        if let Some(k) = &self.kind
            && k != kind
        {
            return false;
        }

        if let Some(l) = &self.label
            && l != label
        {
            return false;
        }

        true
    }
}
