//! Reconciliation controllers, one per object kind.
//!
//! Each implements [`declarative::Controller`] on top of an [`NsxClient`]:
//!
//! - create: resolve by name and adopt, or create and read back
//! - read: resolve by last observed name and project remote attributes
//! - update: resolve by last observed name, diff, patch, read back
//! - delete: skip adopted and protected objects, otherwise resolve and delete
//!
//! [`NsxClient`]: crate::NsxClient

pub mod security_group;
pub mod security_policy;
pub mod service;

pub use security_group::SecurityGroupController;
pub use security_policy::SecurityPolicyController;
pub use service::ServiceController;

use declarative::{ApplyResult, Identity, Outcome};
use log::warn;

/// Whether a resolved record is the object `identity` is bound to.
///
/// Unbound identities match anything; that is how adoption works.
pub(crate) fn same_object(identity: &Identity, remote_id: &str) -> bool {
    !identity.is_bound() || identity.remote_id == remote_id
}

/// Identity re-bound to what was just observed remotely.
pub(crate) fn observed_identity(
    identity: &Identity,
    remote_id: &str,
    remote_name: &str,
    no_delete: bool,
) -> Identity {
    Identity {
        remote_id: remote_id.to_string(),
        name: remote_name.to_string(),
        ownership: identity.ownership.with_protection(no_delete),
    }
}

/// Outcome of the read that follows a create call.
///
/// A read that misses the new object keeps its id bound, so the next pass
/// does not create a second one.
pub(crate) fn created<O>(target: &str, identity: Identity, read: Outcome<O>) -> Outcome<O> {
    if read.identity.is_bound() {
        return read.with_result(ApplyResult::Created);
    }
    warn!("{}: created but not visible in listing yet", target);
    Outcome {
        identity,
        observed: None,
        result: ApplyResult::Created,
    }
}

/// Outcome of an adoption that fell through to update.
pub(crate) fn adopted<O>(outcome: Outcome<O>) -> Outcome<O> {
    if outcome.identity.is_bound() {
        outcome.with_result(ApplyResult::Adopted)
    } else {
        outcome
    }
}

/// Outcome of the read that follows a successful update call.
pub(crate) fn modified<O>(outcome: Outcome<O>) -> Outcome<O> {
    if outcome.identity.is_bound() {
        outcome.with_result(ApplyResult::Modified)
    } else {
        outcome
    }
}

/// Outcome of the read that follows a swallowed update failure.
pub(crate) fn update_failed<O>(outcome: Outcome<O>, error: &crate::Error) -> Outcome<O> {
    if outcome.identity.is_bound() {
        outcome.with_result(ApplyResult::Skipped {
            reason: format!("update failed: {}", error.root()),
        })
    } else {
        outcome
    }
}

/// Outcome of a delete that must not touch the remote object.
pub(crate) fn left_in_place<O>(identity: &Identity) -> Outcome<O> {
    Outcome::cleared(
        identity,
        ApplyResult::Skipped {
            reason: format!("{} object left in place", identity.ownership),
        },
    )
}
