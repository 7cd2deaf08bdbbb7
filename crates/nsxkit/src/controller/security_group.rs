//! Security group controller.

use crate::backend::Executor;
use crate::client::NsxClient;
use crate::controller::{
    adopted, created, left_in_place, modified, observed_identity, same_object, update_failed,
};
use crate::desired::SecurityGroupSpec;
use crate::error::{Error, Result, target};
use crate::merge::{MergeStrategy, merge_criteria};
use crate::resolver::resolve_security_group;
use crate::types::SecurityGroup;
use declarative::{ApplyResult, ChangeSet, Controller, Identity, Outcome};
use log::{debug, info, warn};

/// Reconciles security groups and their dynamic membership.
pub struct SecurityGroupController<'a, E> {
    client: &'a NsxClient<E>,
    strategy: MergeStrategy,
}

impl<'a, E: Executor> SecurityGroupController<'a, E> {
    pub fn new(client: &'a NsxClient<E>) -> Self {
        Self {
            client,
            strategy: MergeStrategy::default(),
        }
    }

    /// Use a different criteria merge strategy on read.
    #[must_use]
    pub fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    fn target(desired: &SecurityGroupSpec, name: &str, id: &str) -> String {
        target("security group", Some(desired.scope.as_str()), name, id)
    }

    fn resolve(&self, desired: &SecurityGroupSpec, name: &str) -> Result<Option<SecurityGroup>> {
        resolve_security_group(self.client, &desired.scope, name)
            .map_err(|e| e.for_target(Self::target(desired, name, "")))
    }

    /// Fields where `remote` differs from `desired`.
    fn diff(desired: &SecurityGroupSpec, remote: &SecurityGroup) -> ChangeSet {
        let mut changes = ChangeSet::new();
        changes.compare("name", remote.name.as_str(), desired.name.as_str());

        if let Some(want) = &desired.dynamic_membership {
            let have = remote.dynamic_membership.clone().unwrap_or_default();
            if !have.equivalent(want) {
                changes.push("dynamic_membership", have.to_string(), want.to_string());
            }
        }
        changes
    }

    /// Body for create and update calls.
    ///
    /// An empty desired membership sends no definition, which clears it.
    fn record(desired: &SecurityGroupSpec, remote: Option<&SecurityGroup>) -> SecurityGroup {
        let dynamic_membership = match &desired.dynamic_membership {
            Some(want) if want.is_empty() => None,
            Some(want) => Some(want.clone()),
            None => remote.and_then(|r| r.dynamic_membership.clone()),
        };
        SecurityGroup {
            object_id: String::new(),
            name: desired.name.clone(),
            description: remote.and_then(|r| r.description.clone()),
            dynamic_membership,
        }
    }

    /// Project a resolved record onto the desired shape.
    fn observe(
        &self,
        desired: &SecurityGroupSpec,
        identity: &Identity,
        mut remote: SecurityGroup,
        result: ApplyResult,
    ) -> Outcome<SecurityGroup> {
        if let (Some(want), Some(have)) = (&desired.dynamic_membership, &remote.dynamic_membership)
        {
            remote.dynamic_membership = Some(merge_criteria(want, have, self.strategy));
        }
        let identity =
            observed_identity(identity, &remote.object_id, &remote.name, desired.no_delete);
        Outcome::present(identity, remote, result)
    }

    fn vanished(desired: &SecurityGroupSpec, identity: &Identity) -> Outcome<SecurityGroup> {
        info!(
            "{} no longer exists, clearing local identity",
            Self::target(desired, &identity.name, &identity.remote_id)
        );
        Outcome::cleared(identity, ApplyResult::Cleared)
    }

    fn replaced(
        desired: &SecurityGroupSpec,
        identity: &Identity,
        found: &str,
    ) -> Outcome<SecurityGroup> {
        warn!(
            "{} now resolves to {}, clearing local identity",
            Self::target(desired, &identity.name, &identity.remote_id),
            found
        );
        Outcome::cleared(identity, ApplyResult::Cleared)
    }
}

impl<E: Executor> Controller for SecurityGroupController<'_, E> {
    type Desired = SecurityGroupSpec;
    type Observed = SecurityGroup;
    type Error = Error;

    fn kind(&self) -> &'static str {
        "security_group"
    }

    fn create(&self, desired: &SecurityGroupSpec) -> Result<Outcome<SecurityGroup>> {
        desired
            .validate()
            .map_err(|e| e.for_target(Self::target(desired, &desired.name, "")))?;

        if let Some(remote) = self.resolve(desired, &desired.name)? {
            let identity = Identity::adopted(&remote.object_id, &remote.name);
            info!(
                "adopting existing {}",
                Self::target(desired, &remote.name, &remote.object_id)
            );
            if Self::diff(desired, &remote).is_empty() {
                return Ok(self.observe(desired, &identity, remote, ApplyResult::Adopted));
            }
            return self.update(desired, &identity).map(adopted);
        }

        let id = self
            .client
            .create_security_group(&desired.scope, &Self::record(desired, None))
            .map_err(|e| e.for_target(Self::target(desired, &desired.name, "")))?;
        let what = Self::target(desired, &desired.name, &id);
        info!("created {}", what);

        let identity = Identity::owned(id, &desired.name, desired.no_delete);
        let read = self.read(desired, &identity)?;
        Ok(created(&what, identity, read))
    }

    fn read(
        &self,
        desired: &SecurityGroupSpec,
        identity: &Identity,
    ) -> Result<Outcome<SecurityGroup>> {
        match self.resolve(desired, &identity.name)? {
            Some(remote) if same_object(identity, &remote.object_id) => {
                Ok(self.observe(desired, identity, remote, ApplyResult::NoChange))
            }
            Some(remote) => Ok(Self::replaced(desired, identity, &remote.object_id)),
            None => Ok(Self::vanished(desired, identity)),
        }
    }

    fn update(
        &self,
        desired: &SecurityGroupSpec,
        identity: &Identity,
    ) -> Result<Outcome<SecurityGroup>> {
        desired
            .validate()
            .map_err(|e| e.for_target(Self::target(desired, &desired.name, &identity.remote_id)))?;

        let Some(remote) = self.resolve(desired, &identity.name)? else {
            return Ok(Self::vanished(desired, identity));
        };
        if !same_object(identity, &remote.object_id) {
            return Ok(Self::replaced(desired, identity, &remote.object_id));
        }

        let what = Self::target(desired, &remote.name, &remote.object_id);
        let changes = Self::diff(desired, &remote);
        if changes.is_empty() {
            debug!("{} is up to date", what);
            return Ok(self.observe(desired, identity, remote, ApplyResult::NoChange));
        }

        debug!("{}: {}", what, changes);
        let record = Self::record(desired, Some(&remote));
        match self.client.update_security_group(&remote.object_id, &record) {
            Ok(()) => {
                info!("updated {} ({})", what, changes.fields());
                let read = self.read(desired, &identity.renamed(&desired.name))?;
                Ok(modified(read))
            }
            Err(e) => {
                warn!(
                    "{}: update failed ({}), reading current state: {}",
                    what,
                    e.category(),
                    e
                );
                let read = self.read(desired, identity)?;
                Ok(update_failed(read, &e))
            }
        }
    }

    fn delete(
        &self,
        applied: &SecurityGroupSpec,
        identity: &Identity,
    ) -> Result<Outcome<SecurityGroup>> {
        let what = Self::target(applied, &identity.name, &identity.remote_id);
        if !identity.ownership.may_delete() {
            info!("{} is {}, not deleting", what, identity.ownership);
            return Ok(left_in_place(identity));
        }

        let Some(remote) = self.resolve(applied, &identity.name)? else {
            return Ok(Self::vanished(applied, identity));
        };
        if !same_object(identity, &remote.object_id) {
            return Ok(Self::replaced(applied, identity, &remote.object_id));
        }

        self.client
            .delete_security_group(&remote.object_id)
            .map_err(|e| e.for_target(what.clone()))?;
        info!("deleted {}", what);
        Ok(Outcome::cleared(identity, ApplyResult::Removed))
    }

    fn requires_replacement(
        &self,
        applied: &SecurityGroupSpec,
        desired: &SecurityGroupSpec,
    ) -> bool {
        applied.scope != desired.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Method;
    use crate::backend::mock::MockExecutor;
    use crate::types::{
        Comparator, CriteriaSet, Criterion, DynamicMembership, MatchKey, Operator, Scope,
    };
    use declarative::{Action, Entry, ExecuteOptions, NoProgress, Ownership, converge, plan};

    fn setup() -> (MockExecutor, NsxClient<MockExecutor>) {
        let mock = MockExecutor::new();
        (mock.clone(), NsxClient::new(mock))
    }

    fn membership(rules: Vec<Criterion>) -> DynamicMembership {
        DynamicMembership::new(vec![CriteriaSet {
            operator: Operator::And,
            rules_operator: Operator::And,
            criteria: rules,
        }])
    }

    fn spec(scope: &str, name: &str) -> SecurityGroupSpec {
        SecurityGroupSpec {
            scope: Scope::new(scope),
            ..SecurityGroupSpec::new(name)
        }
    }

    fn web_rules() -> DynamicMembership {
        membership(vec![
            Criterion::new(MatchKey::VmName, "web", Comparator::StartsWith),
            Criterion::new(MatchKey::SecurityTag, "prod", Comparator::Contains),
        ])
    }

    #[test]
    fn test_create_new_group() {
        let (mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let desired = SecurityGroupSpec {
            dynamic_membership: Some(web_rules()),
            ..spec("globalroot-0", "web")
        };

        let outcome = controller.create(&desired).unwrap();
        assert_eq!(outcome.result, ApplyResult::Created);
        assert_eq!(outcome.identity.ownership, Ownership::Owned);
        assert!(!outcome.identity.is_existing());

        let stored = mock.group(&outcome.identity.remote_id).unwrap();
        assert!(stored.dynamic_membership.unwrap().equivalent(&web_rules()));
        assert_eq!(mock.count(Method::Post), 1);
    }

    #[test]
    fn test_adopts_existing_group_without_create_call() {
        let (mock, client) = setup();
        let id = mock.add_group(
            "s",
            SecurityGroup {
                name: "n".into(),
                ..Default::default()
            },
        );
        let controller = SecurityGroupController::new(&client);

        let outcome = controller.create(&spec("s", "n")).unwrap();
        assert_eq!(outcome.result, ApplyResult::Adopted);
        assert_eq!(outcome.identity.remote_id, id);
        assert!(outcome.identity.is_existing());
        assert_eq!(mock.mutations(), 0);
    }

    #[test]
    fn test_adoption_falls_through_to_update_for_membership() {
        let (mock, client) = setup();
        let id = mock.add_group(
            "s",
            SecurityGroup {
                name: "n".into(),
                ..Default::default()
            },
        );
        let controller = SecurityGroupController::new(&client);
        let desired = SecurityGroupSpec {
            dynamic_membership: Some(web_rules()),
            ..spec("s", "n")
        };

        let outcome = controller.create(&desired).unwrap();
        assert_eq!(outcome.result, ApplyResult::Adopted);
        assert_eq!(outcome.identity.ownership, Ownership::Adopted);
        assert_eq!(mock.count(Method::Post), 0);
        assert_eq!(mock.count(Method::Put), 1);
        assert!(mock.group(&id).unwrap().dynamic_membership.is_some());
    }

    #[test]
    fn test_update_is_idempotent() {
        let (mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let desired = SecurityGroupSpec {
            dynamic_membership: Some(web_rules()),
            ..spec("globalroot-0", "web")
        };
        let identity = controller.create(&desired).unwrap().identity;
        mock.reset_calls();

        let first = controller.update(&desired, &identity).unwrap();
        let second = controller.update(&desired, &first.identity).unwrap();
        assert_eq!(second.result, ApplyResult::NoChange);
        assert_eq!(mock.mutations(), 0);
    }

    #[test]
    fn test_rule_reordering_is_not_drift() {
        let mock = MockExecutor::new().with_rule_reordering();
        let client = NsxClient::new(mock.clone());
        let controller = SecurityGroupController::new(&client);
        let desired = SecurityGroupSpec {
            dynamic_membership: Some(web_rules()),
            ..spec("globalroot-0", "web")
        };
        let identity = controller.create(&desired).unwrap().identity;
        mock.reset_calls();

        let outcome = controller.update(&desired, &identity).unwrap();
        assert_eq!(outcome.result, ApplyResult::NoChange);
        assert_eq!(mock.mutations(), 0);
    }

    #[test]
    fn test_empty_membership_clears_remote_rules() {
        let (mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let desired = SecurityGroupSpec {
            dynamic_membership: Some(web_rules()),
            ..spec("globalroot-0", "g")
        };
        let identity = controller.create(&desired).unwrap().identity;
        mock.reset_calls();

        let cleared = SecurityGroupSpec {
            dynamic_membership: Some(DynamicMembership::default()),
            ..spec("globalroot-0", "g")
        };
        let outcome = controller.update(&cleared, &identity).unwrap();
        assert_eq!(outcome.result, ApplyResult::Modified);
        assert_eq!(mock.count(Method::Put), 1);
        assert!(mock.group(&identity.remote_id).unwrap().dynamic_membership.is_none());

        let again = controller.update(&cleared, &outcome.identity).unwrap();
        assert_eq!(again.result, ApplyResult::NoChange);
        assert_eq!(mock.count(Method::Put), 1);
    }

    #[test]
    fn test_unmanaged_membership_is_left_alone() {
        let (mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let desired = SecurityGroupSpec {
            dynamic_membership: Some(web_rules()),
            ..spec("globalroot-0", "g")
        };
        let identity = controller.create(&desired).unwrap().identity;

        let outcome = controller
            .update(&spec("globalroot-0", "g"), &identity)
            .unwrap();
        assert_eq!(outcome.result, ApplyResult::NoChange);
        assert!(mock.group(&identity.remote_id).unwrap().dynamic_membership.is_some());
    }

    #[test]
    fn test_rename_looks_up_old_name() {
        let (mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let identity = controller.create(&spec("globalroot-0", "old")).unwrap().identity;

        let renamed = spec("globalroot-0", "new");
        let outcome = controller.update(&renamed, &identity).unwrap();
        assert_eq!(outcome.result, ApplyResult::Modified);
        assert_eq!(outcome.identity.name, "new");
        assert_eq!(outcome.identity.remote_id, identity.remote_id);
        assert_eq!(mock.group(&identity.remote_id).unwrap().name, "new");
    }

    #[test]
    fn test_rename_with_vanished_old_name_clears() {
        let (mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let identity = controller.create(&spec("globalroot-0", "old")).unwrap().identity;
        mock.rename(&identity.remote_id, "someone-else");
        mock.reset_calls();

        let outcome = controller
            .update(&spec("globalroot-0", "new"), &identity)
            .unwrap();
        assert_eq!(outcome.result, ApplyResult::Cleared);
        assert!(!outcome.identity.is_bound());
        assert_eq!(mock.count(Method::Put), 0);
    }

    #[test]
    fn test_failed_update_still_reads() {
        let (mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let identity = controller.create(&spec("globalroot-0", "old")).unwrap().identity;
        mock.fail_with_status(Method::Put, 409, "<error>locked</error>");

        let outcome = controller
            .update(&spec("globalroot-0", "new"), &identity)
            .unwrap();
        assert!(matches!(outcome.result, ApplyResult::Skipped { .. }));
        // the old name still resolves, so identity survives
        assert_eq!(outcome.identity.remote_id, identity.remote_id);
        assert_eq!(outcome.identity.name, "old");
        assert_eq!(outcome.observed.unwrap().name, "old");
    }

    #[test]
    fn test_transport_failure_on_update_is_swallowed() {
        let (mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let identity = controller.create(&spec("globalroot-0", "g")).unwrap().identity;
        mock.fail_transport(Method::Put, "reset by peer");

        let desired = SecurityGroupSpec {
            dynamic_membership: Some(web_rules()),
            ..spec("globalroot-0", "g")
        };
        let outcome = controller.update(&desired, &identity).unwrap();
        assert!(outcome.result.is_success());
        assert!(outcome.identity.is_bound());
    }

    #[test]
    fn test_read_clears_on_external_deletion() {
        let (mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let desired = spec("globalroot-0", "g");
        let identity = controller.create(&desired).unwrap().identity;
        mock.remove(&identity.remote_id);

        let outcome = controller.read(&desired, &identity).unwrap();
        assert_eq!(outcome.result, ApplyResult::Cleared);
        assert!(!outcome.identity.is_bound());
        assert!(outcome.observed.is_none());
    }

    #[test]
    fn test_read_merges_remote_keys() {
        let (mock, client) = setup();
        mock.add_group(
            "globalroot-0",
            SecurityGroup {
                name: "g".into(),
                dynamic_membership: Some(membership(vec![Criterion::new(
                    MatchKey::SecurityTag,
                    "v1",
                    Comparator::Contains,
                )])),
                ..Default::default()
            },
        );
        let controller = SecurityGroupController::new(&client);
        let desired = SecurityGroupSpec {
            dynamic_membership: Some(membership(vec![Criterion::new(
                MatchKey::VmName,
                "v1",
                Comparator::Equals,
            )])),
            ..spec("globalroot-0", "g")
        };

        let outcome = controller.read(&desired, &Identity::absent("g")).unwrap();
        let observed = outcome.observed.unwrap().dynamic_membership.unwrap();
        assert_eq!(observed.sets[0].criteria[0].key, MatchKey::SecurityTag);
        assert_eq!(observed.sets[0].criteria[0].comparator, Comparator::Contains);
        assert_eq!(observed.sets[0].criteria[0].value, "v1");
    }

    #[test]
    fn test_delete_is_gated_by_ownership() {
        let (mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let desired = spec("globalroot-0", "g");

        for identity in [
            Identity::adopted("securitygroup-7", "g"),
            Identity::owned("securitygroup-7", "g", true),
        ] {
            let outcome = controller.delete(&desired, &identity).unwrap();
            assert!(outcome.result.is_success());
            assert!(!outcome.identity.is_bound());
        }
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_delete_owned() {
        let (mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let desired = spec("globalroot-0", "g");
        let identity = controller.create(&desired).unwrap().identity;

        let outcome = controller.delete(&desired, &identity).unwrap();
        assert_eq!(outcome.result, ApplyResult::Removed);
        assert!(mock.group(&identity.remote_id).is_none());

        // already gone
        let outcome = controller.delete(&desired, &identity).unwrap();
        assert_eq!(outcome.result, ApplyResult::Cleared);
    }

    #[test]
    fn test_delete_failure_surfaces_body() {
        let (mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let desired = spec("globalroot-0", "g");
        let identity = controller.create(&desired).unwrap().identity;
        mock.fail_with_status(Method::Delete, 400, "<error>in use by policy</error>");

        let err = controller.delete(&desired, &identity).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("in use by policy"));
        assert!(message.contains(&identity.remote_id));
    }

    #[test]
    fn test_validation_happens_before_remote_calls() {
        let (mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let desired = SecurityGroupSpec {
            dynamic_membership: Some(membership(vec![Criterion::new(
                MatchKey::VmName,
                "v",
                Comparator::Other("like".into()),
            )])),
            ..spec("globalroot-0", "g")
        };

        let err = controller.create(&desired).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Validation);
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_scope_change_plans_replace() {
        let (_mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let entry = Entry {
            applied: spec("s1", "g"),
            identity: Identity::owned("securitygroup-1", "g", false),
            observed: None,
        };
        assert_eq!(
            plan(&controller, Some(&entry), Some(&spec("s2", "g"))),
            Some(Action::Replace)
        );
    }

    #[test]
    fn test_converge_replace_moves_scope() {
        let (mock, client) = setup();
        let controller = SecurityGroupController::new(&client);
        let opts = ExecuteOptions::default();

        let first = converge(
            &controller,
            "security_group.g",
            None,
            Some(&spec("s1", "g")),
            &opts,
            &mut NoProgress,
        );
        let moved = converge(
            &controller,
            "security_group.g",
            first.entry,
            Some(&spec("s2", "g")),
            &opts,
            &mut NoProgress,
        );

        assert_eq!(moved.result, ApplyResult::Created);
        assert!(mock.groups("s1").is_empty());
        assert_eq!(mock.groups("s2").len(), 1);
    }
}
