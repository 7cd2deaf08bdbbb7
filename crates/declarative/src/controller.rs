//! Controller trait for declarative reconciliation
//!
//! A Controller owns the reconciliation protocol for one resource kind:
//! locate-or-adopt on create, diff-and-patch on update, re-read to observe,
//! and ownership-gated delete.

use crate::identity::Identity;
use crate::types::ApplyResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a controller reports after an operation
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<O> {
    /// Identity to persist; unbound when the object is gone
    pub identity: Identity,
    /// Observed attributes, `None` when the object is gone
    pub observed: Option<O>,
    pub result: ApplyResult,
}

impl<O> Outcome<O> {
    /// Object exists remotely with the given observed attributes
    pub fn present(identity: Identity, observed: O, result: ApplyResult) -> Self {
        Self {
            identity,
            observed: Some(observed),
            result,
        }
    }

    /// Object is gone; local identity converges to empty
    pub fn cleared(identity: &Identity, result: ApplyResult) -> Self {
        Self {
            identity: identity.cleared(),
            observed: None,
            result,
        }
    }

    /// Replace the result, keeping identity and observation
    pub fn with_result(self, result: ApplyResult) -> Self {
        Self { result, ..self }
    }
}

/// Reconciliation protocol for one resource kind
///
/// Operations are blocking and issue at most a couple of sequential remote
/// calls. Callers serialize passes per object.
///
/// # Example
///
/// ```ignore
/// use declarative::{Controller, Identity, Outcome, ApplyResult};
///
/// struct FileController;
///
/// impl Controller for FileController {
///     type Desired = FileSpec;
///     type Observed = FileInfo;
///     type Error = std::io::Error;
///
///     fn kind(&self) -> &'static str { "file" }
///
///     fn create(&self, desired: &FileSpec) -> Result<Outcome<FileInfo>, Self::Error> {
///         std::fs::write(&desired.path, &desired.content)?;
///         self.read(desired, &Identity::owned(&desired.path, &desired.path, false))
///             .map(|o| o.with_result(ApplyResult::Created))
///     }
///     // read, update, delete ...
/// }
/// ```
pub trait Controller {
    /// Desired attributes handed over by the front-end
    type Desired: Clone + PartialEq + fmt::Debug;
    /// Attributes observed remotely
    type Observed: Clone + fmt::Debug;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Resource kind (e.g. "security_group")
    fn kind(&self) -> &'static str;

    /// Adopt an object with the desired name, or create one
    fn create(&self, desired: &Self::Desired) -> Result<Outcome<Self::Observed>, Self::Error>;

    /// Look the object up under `identity.name` and project its attributes
    ///
    /// Not found is not an error: the returned identity is cleared.
    fn read(
        &self,
        desired: &Self::Desired,
        identity: &Identity,
    ) -> Result<Outcome<Self::Observed>, Self::Error>;

    /// Diff desired against the object found under `identity.name` and patch it
    fn update(
        &self,
        desired: &Self::Desired,
        identity: &Identity,
    ) -> Result<Outcome<Self::Observed>, Self::Error>;

    /// Destroy the object if we own it; otherwise only clear local identity
    fn delete(
        &self,
        applied: &Self::Desired,
        identity: &Identity,
    ) -> Result<Outcome<Self::Observed>, Self::Error>;

    /// Whether moving from `applied` to `desired` needs delete-then-create
    fn requires_replacement(&self, _applied: &Self::Desired, _desired: &Self::Desired) -> bool {
        false
    }

    /// Whether the kind has an update path at all
    fn supports_update(&self) -> bool {
        true
    }
}

/// Persisted record for one declared resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<D, O> {
    /// Desired attributes as of the last successful pass
    pub applied: D,
    pub identity: Identity,
    #[serde(default)]
    pub observed: Option<O>,
}

impl<D, O> Entry<D, O> {
    /// Build an entry from an outcome, or `None` when the object is gone
    pub fn from_outcome(applied: D, outcome: Outcome<O>) -> Option<Self> {
        if !outcome.identity.is_bound() {
            return None;
        }
        Some(Self {
            applied,
            identity: outcome.identity,
            observed: outcome.observed,
        })
    }
}
