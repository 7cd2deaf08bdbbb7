//! Per-field change sets
//!
//! Controllers diff desired attributes against the resolved remote object
//! and only issue an update call when the change set is non-empty.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single attribute that differs between remote and desired state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Attribute name (e.g. "name", "protocol/ports")
    pub field: String,
    /// Value observed remotely
    pub from: String,
    /// Desired value
    pub to: String,
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?} -> {:?}", self.field, self.from, self.to)
    }
}

/// Ordered collection of field changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: Vec<FieldChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change when `from != to`
    ///
    /// Returns whether a change was recorded.
    pub fn compare<T: PartialEq + fmt::Debug + ?Sized>(
        &mut self,
        field: &str,
        from: &T,
        to: &T,
    ) -> bool {
        if from == to {
            return false;
        }
        self.push(field, format!("{:?}", from), format!("{:?}", to));
        true
    }

    /// Record a change unconditionally
    pub fn push(&mut self, field: &str, from: impl Into<String>, to: impl Into<String>) {
        self.changes.push(FieldChange {
            field: field.to_string(),
            from: from.into(),
            to: to.into(),
        });
    }

    /// Whether the field was recorded as changed
    pub fn touches(&self, field: &str) -> bool {
        self.changes.iter().any(|c| c.field == field)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter()
    }

    /// Comma separated list of changed field names
    pub fn fields(&self) -> String {
        self.changes
            .iter()
            .map(|c| c.field.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.changes.is_empty() {
            return write!(f, "no changes");
        }
        for (i, change) in self.changes.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", change)?;
        }
        Ok(())
    }
}
