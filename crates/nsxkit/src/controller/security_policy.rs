//! Security policy controller.
//!
//! Policies are global and have no update path: any change to the declared
//! attributes replaces the policy.

use crate::backend::Executor;
use crate::client::NsxClient;
use crate::controller::{created, left_in_place, observed_identity, same_object};
use crate::desired::SecurityPolicySpec;
use crate::error::{Error, Result, target};
use crate::resolver::resolve_security_policy;
use crate::types::{GroupBinding, SecurityPolicy};
use declarative::{ApplyResult, Controller, Identity, Outcome};
use log::{info, warn};

/// Reconciles security policies.
pub struct SecurityPolicyController<'a, E> {
    client: &'a NsxClient<E>,
    force_delete: bool,
}

impl<'a, E: Executor> SecurityPolicyController<'a, E> {
    pub fn new(client: &'a NsxClient<E>) -> Self {
        Self {
            client,
            force_delete: false,
        }
    }

    /// Delete policies even while they are in use.
    #[must_use]
    pub fn with_force_delete(mut self, force: bool) -> Self {
        self.force_delete = force;
        self
    }

    fn target(name: &str, id: &str) -> String {
        target("security policy", None, name, id)
    }

    fn resolve(&self, name: &str) -> Result<Option<SecurityPolicy>> {
        resolve_security_policy(self.client, name)
            .map_err(|e| e.for_target(Self::target(name, "")))
    }

    fn record(desired: &SecurityPolicySpec) -> SecurityPolicy {
        SecurityPolicy {
            object_id: String::new(),
            name: desired.name.clone(),
            description: desired.description.clone(),
            precedence: desired.precedence.clone(),
            security_group_binding: desired
                .security_groups
                .iter()
                .map(|id| GroupBinding {
                    object_id: id.clone(),
                })
                .collect(),
        }
    }

    fn observe(
        desired: &SecurityPolicySpec,
        identity: &Identity,
        remote: SecurityPolicy,
        result: ApplyResult,
    ) -> Outcome<SecurityPolicy> {
        let identity =
            observed_identity(identity, &remote.object_id, &remote.name, desired.no_delete);
        Outcome::present(identity, remote, result)
    }
}

impl<E: Executor> Controller for SecurityPolicyController<'_, E> {
    type Desired = SecurityPolicySpec;
    type Observed = SecurityPolicy;
    type Error = Error;

    fn kind(&self) -> &'static str {
        "security_policy"
    }

    fn create(&self, desired: &SecurityPolicySpec) -> Result<Outcome<SecurityPolicy>> {
        desired
            .validate()
            .map_err(|e| e.for_target(Self::target(&desired.name, "")))?;

        if let Some(remote) = self.resolve(&desired.name)? {
            let identity = Identity::adopted(&remote.object_id, &remote.name);
            info!(
                "adopting existing {}",
                Self::target(&remote.name, &remote.object_id)
            );
            return Ok(Self::observe(desired, &identity, remote, ApplyResult::Adopted));
        }

        let id = self
            .client
            .create_security_policy(&Self::record(desired))
            .map_err(|e| e.for_target(Self::target(&desired.name, "")))?;
        let what = Self::target(&desired.name, &id);
        info!("created {}", what);

        let identity = Identity::owned(id, &desired.name, desired.no_delete);
        let read = self.read(desired, &identity)?;
        Ok(created(&what, identity, read))
    }

    fn read(
        &self,
        desired: &SecurityPolicySpec,
        identity: &Identity,
    ) -> Result<Outcome<SecurityPolicy>> {
        let what = Self::target(&identity.name, &identity.remote_id);
        match self.resolve(&identity.name)? {
            Some(remote) if same_object(identity, &remote.object_id) => Ok(Self::observe(
                desired,
                identity,
                remote,
                ApplyResult::NoChange,
            )),
            Some(remote) => {
                warn!(
                    "{} now resolves to {}, clearing local identity",
                    what, remote.object_id
                );
                Ok(Outcome::cleared(identity, ApplyResult::Cleared))
            }
            None => {
                info!("{} no longer exists, clearing local identity", what);
                Ok(Outcome::cleared(identity, ApplyResult::Cleared))
            }
        }
    }

    /// No update path: only observe.
    fn update(
        &self,
        desired: &SecurityPolicySpec,
        identity: &Identity,
    ) -> Result<Outcome<SecurityPolicy>> {
        self.read(desired, identity)
    }

    fn delete(
        &self,
        _applied: &SecurityPolicySpec,
        identity: &Identity,
    ) -> Result<Outcome<SecurityPolicy>> {
        let what = Self::target(&identity.name, &identity.remote_id);
        if !identity.ownership.may_delete() {
            info!("{} is {}, not deleting", what, identity.ownership);
            return Ok(left_in_place(identity));
        }

        let Some(remote) = self.resolve(&identity.name)? else {
            info!("{} already gone", what);
            return Ok(Outcome::cleared(identity, ApplyResult::Cleared));
        };
        if !same_object(identity, &remote.object_id) {
            warn!(
                "{} now resolves to {}, not deleting",
                what, remote.object_id
            );
            return Ok(Outcome::cleared(identity, ApplyResult::Cleared));
        }

        self.client
            .delete_security_policy(&remote.object_id, self.force_delete)
            .map_err(|e| e.for_target(what.clone()))?;
        info!("deleted {}", what);
        Ok(Outcome::cleared(identity, ApplyResult::Removed))
    }

    fn requires_replacement(
        &self,
        applied: &SecurityPolicySpec,
        desired: &SecurityPolicySpec,
    ) -> bool {
        applied.name != desired.name
            || applied.precedence != desired.precedence
            || applied.description != desired.description
            || applied.security_groups != desired.security_groups
    }

    fn supports_update(&self) -> bool {
        false
    }
}
