//! Persisted identity and the resource lifecycle
//!
//! A managed object is looked up by name until it has been created or
//! adopted. From then on the remote-assigned id is its durable identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who is allowed to destroy a remote object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    /// Created by us, may be deleted by us
    #[default]
    Owned,
    /// Found by name on create and bound without a create call
    Adopted,
    /// Created by us but marked no-delete
    Protected,
}

impl Ownership {
    /// Whether a delete may issue a remote call
    pub fn may_delete(self) -> bool {
        matches!(self, Self::Owned)
    }

    /// The `existing` flag of the persisted identity
    pub fn is_existing(self) -> bool {
        matches!(self, Self::Adopted)
    }

    /// The `no_delete` flag of the persisted identity
    pub fn is_no_delete(self) -> bool {
        matches!(self, Self::Protected)
    }

    /// Re-derive ownership after the desired `no_delete` flag changed.
    ///
    /// Adoption is sticky: an adopted object never becomes owned.
    pub fn with_protection(self, no_delete: bool) -> Self {
        match self {
            Self::Adopted => Self::Adopted,
            _ if no_delete => Self::Protected,
            _ => Self::Owned,
        }
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owned => write!(f, "owned"),
            Self::Adopted => write!(f, "adopted"),
            Self::Protected => write!(f, "protected"),
        }
    }
}

/// Identity of a managed object as persisted between passes
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Identity {
    /// Remote id; empty until first create or adoption
    #[serde(default)]
    pub remote_id: String,
    /// Name the object was last observed under remotely
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ownership: Ownership,
}

impl Identity {
    /// Identity of an object that does not exist yet
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            remote_id: String::new(),
            name: name.into(),
            ownership: Ownership::Owned,
        }
    }

    /// Identity of an object we just created
    pub fn owned(remote_id: impl Into<String>, name: impl Into<String>, no_delete: bool) -> Self {
        Self {
            remote_id: remote_id.into(),
            name: name.into(),
            ownership: Ownership::Owned.with_protection(no_delete),
        }
    }

    /// Identity of a pre-existing object bound by name
    pub fn adopted(remote_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            remote_id: remote_id.into(),
            name: name.into(),
            ownership: Ownership::Adopted,
        }
    }

    /// Whether a remote id has been bound
    pub fn is_bound(&self) -> bool {
        !self.remote_id.is_empty()
    }

    /// Drop the remote binding, keeping the lookup name
    pub fn cleared(&self) -> Self {
        Self::absent(self.name.clone())
    }

    /// Same identity observed under a different name
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    pub fn is_existing(&self) -> bool {
        self.ownership.is_existing()
    }

    pub fn is_no_delete(&self) -> bool {
        self.ownership.is_no_delete()
    }

    /// Resting lifecycle state implied by this identity
    pub fn state(&self) -> LifecycleState {
        if !self.is_bound() {
            LifecycleState::Absent
        } else if self.ownership == Ownership::Adopted {
            LifecycleState::Adopted
        } else {
            LifecycleState::Owned
        }
    }
}

/// Lifecycle of a managed object
///
/// `Absent -> Adopted | Owned -> Updating -> Owned -> Deleting -> Absent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Absent,
    Adopted,
    Owned,
    Updating,
    Deleting,
}

impl LifecycleState {
    /// Whether `self -> next` is a permitted edge.
    ///
    /// Staying in the same state is always allowed (no-op passes and failed
    /// remote calls).
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (Absent, Adopted | Owned)
                | (Adopted, Updating | Deleting | Absent)
                | (Owned, Updating | Deleting | Absent)
                | (Updating, Owned | Adopted | Absent)
                | (Deleting, Absent | Owned | Adopted)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::Adopted => "adopted",
            Self::Owned => "owned",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
        };
        write!(f, "{}", s)
    }
}
