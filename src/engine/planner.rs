//! Pass planning - what each kind converges toward

use crate::schema::{GROUP_REF_PREFIX, Manifest};
use crate::state::State;
use anyhow::Result;
use nsxkit::{DynamicMembership, SecurityGroupSpec, SecurityPolicySpec, ServiceSpec};
use std::collections::BTreeMap;

/// Declared attributes per label
///
/// An `Err` marks a declaration that cannot be converged this pass; the
/// resource is reported as failed and its state entry is left alone.
pub type Declared<D> = BTreeMap<String, Result<D, String>>;

/// Declared groups, with membership cleared where a declaration dropped it
///
/// A group whose last applied spec managed membership keeps managing it: once
/// the block is removed the group converges to no membership at all.
pub fn security_groups(
    manifest: &Manifest,
    state: &State,
) -> Result<Declared<SecurityGroupSpec>> {
    Ok(manifest
        .security_groups()?
        .into_iter()
        .map(|(label, mut spec)| {
            let managed = state
                .security_groups
                .get(&label)
                .is_some_and(|entry| entry.applied.dynamic_membership.is_some());
            if spec.dynamic_membership.is_none() && managed {
                spec.dynamic_membership = Some(DynamicMembership::default());
            }
            (label, Ok(spec))
        })
        .collect())
}

pub fn services(manifest: &Manifest) -> Declared<ServiceSpec> {
    manifest
        .services()
        .into_iter()
        .map(|(label, spec)| (label, Ok(spec)))
        .collect()
}

/// Resolve policy group references against the groups bound in `state`
///
/// With `lenient`, an unbound reference stays as its literal text so a dry
/// pass can still plan the policy.
pub fn security_policies(
    manifest: &Manifest,
    state: &State,
    lenient: bool,
) -> Declared<SecurityPolicySpec> {
    manifest
        .security_policy
        .iter()
        .map(|(label, decl)| {
            let spec = decl
                .to_spec(|group| match state.group_id(group) {
                    Some(id) => Some(id.to_string()),
                    None if lenient => Some(format!("{}{}", GROUP_REF_PREFIX, group)),
                    None => None,
                })
                .map_err(|e| format!("{:#}", e));
            (label.clone(), spec)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Entry, Identity};
    use nsxkit::{Comparator, CriteriaSet, Criterion, MatchKey, Operator};

    fn manifest() -> Manifest {
        Manifest::parse(
            r#"
[security_group.web]
name = "web"

[security_policy.web]
name = "web-policy"
precedence = 10
description = "web tier"
security_groups = ["security_group.web"]
"#,
        )
        .unwrap()
    }

    fn bound(applied: SecurityGroupSpec) -> State {
        let mut state = State::default();
        state.security_groups.insert(
            "web".into(),
            Entry {
                applied,
                identity: Identity::owned("securitygroup-4", "web", false),
                observed: None,
            },
        );
        state
    }

    #[test]
    fn test_dropped_membership_is_cleared() {
        let applied = SecurityGroupSpec {
            dynamic_membership: Some(DynamicMembership::new(vec![CriteriaSet {
                operator: Operator::Or,
                rules_operator: Operator::Or,
                criteria: vec![Criterion::new(MatchKey::VmName, "web", Comparator::StartsWith)],
            }])),
            ..SecurityGroupSpec::new("web")
        };

        let declared = security_groups(&manifest(), &bound(applied)).unwrap();
        let spec = declared["web"].as_ref().unwrap();
        assert_eq!(spec.dynamic_membership, Some(DynamicMembership::default()));
    }

    #[test]
    fn test_never_managed_membership_stays_unmanaged() {
        let state = bound(SecurityGroupSpec::new("web"));
        let declared = security_groups(&manifest(), &state).unwrap();
        assert!(declared["web"].as_ref().unwrap().dynamic_membership.is_none());

        let declared = security_groups(&manifest(), &State::default()).unwrap();
        assert!(declared["web"].as_ref().unwrap().dynamic_membership.is_none());
    }

    #[test]
    fn test_unbound_reference_fails_policy() {
        let declared = security_policies(&manifest(), &State::default(), false);
        let err = declared["web"].as_ref().unwrap_err();
        assert!(err.contains("not bound yet"));
    }

    #[test]
    fn test_lenient_keeps_reference_text() {
        let declared = security_policies(&manifest(), &State::default(), true);
        let spec = declared["web"].as_ref().unwrap();
        assert_eq!(spec.security_groups, vec!["security_group.web"]);
    }

    #[test]
    fn test_bound_reference_uses_remote_id() {
        let state = bound(SecurityGroupSpec::new("web"));
        let declared = security_policies(&manifest(), &state, false);
        let spec = declared["web"].as_ref().unwrap();
        assert_eq!(spec.security_groups, vec!["securitygroup-4"]);
    }
}
