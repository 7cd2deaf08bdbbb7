//! Application service controller.

use crate::backend::Executor;
use crate::client::NsxClient;
use crate::controller::{
    adopted, created, left_in_place, modified, observed_identity, same_object, update_failed,
};
use crate::desired::ServiceSpec;
use crate::error::{Error, Result, target};
use crate::resolver::resolve_service;
use crate::types::{ApplicationService, ServiceElement};
use declarative::{ApplyResult, ChangeSet, Controller, Identity, Outcome};
use log::{debug, info, warn};

/// Reconciles application services (protocol and ports).
pub struct ServiceController<'a, E> {
    client: &'a NsxClient<E>,
}

impl<'a, E: Executor> ServiceController<'a, E> {
    pub fn new(client: &'a NsxClient<E>) -> Self {
        Self { client }
    }

    fn target(desired: &ServiceSpec, name: &str, id: &str) -> String {
        target("service", Some(desired.scope.as_str()), name, id)
    }

    fn resolve(&self, desired: &ServiceSpec, name: &str) -> Result<Option<ApplicationService>> {
        resolve_service(self.client, &desired.scope, name)
            .map_err(|e| e.for_target(Self::target(desired, name, "")))
    }

    /// Protocol and ports change together.
    fn diff(desired: &ServiceSpec, remote: &ApplicationService) -> ChangeSet {
        let mut changes = ChangeSet::new();
        changes.compare("name", remote.name.as_str(), desired.name.as_str());
        changes.compare(
            "description",
            remote.description.as_str(),
            desired.description.as_str(),
        );
        let have = (remote.protocol(), remote.ports());
        let want = (desired.protocol.as_str(), desired.ports_value());
        if have != want {
            changes.push(
                "protocol/ports",
                format!("{}:{}", have.0, have.1),
                format!("{}:{}", want.0, want.1),
            );
        }
        changes
    }

    fn record(desired: &ServiceSpec) -> ApplicationService {
        ApplicationService {
            object_id: String::new(),
            name: desired.name.clone(),
            description: desired.description.clone(),
            element: vec![ServiceElement {
                application_protocol: desired.protocol.clone(),
                value: desired.ports_value().to_string(),
            }],
        }
    }

    fn observe(
        desired: &ServiceSpec,
        identity: &Identity,
        remote: ApplicationService,
        result: ApplyResult,
    ) -> Outcome<ApplicationService> {
        let identity =
            observed_identity(identity, &remote.object_id, &remote.name, desired.no_delete);
        Outcome::present(identity, remote, result)
    }

    fn vanished(desired: &ServiceSpec, identity: &Identity) -> Outcome<ApplicationService> {
        info!(
            "{} no longer exists, clearing local identity",
            Self::target(desired, &identity.name, &identity.remote_id)
        );
        Outcome::cleared(identity, ApplyResult::Cleared)
    }

    fn replaced(
        desired: &ServiceSpec,
        identity: &Identity,
        found: &str,
    ) -> Outcome<ApplicationService> {
        warn!(
            "{} now resolves to {}, clearing local identity",
            Self::target(desired, &identity.name, &identity.remote_id),
            found
        );
        Outcome::cleared(identity, ApplyResult::Cleared)
    }
}

impl<E: Executor> Controller for ServiceController<'_, E> {
    type Desired = ServiceSpec;
    type Observed = ApplicationService;
    type Error = Error;

    fn kind(&self) -> &'static str {
        "service"
    }

    fn create(&self, desired: &ServiceSpec) -> Result<Outcome<ApplicationService>> {
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
                return Ok(Self::observe(desired, &identity, remote, ApplyResult::Adopted));
            }
            return self.update(desired, &identity).map(adopted);
        }

        let id = self
            .client
            .create_service(&desired.scope, &Self::record(desired))
            .map_err(|e| e.for_target(Self::target(desired, &desired.name, "")))?;
        let what = Self::target(desired, &desired.name, &id);
        info!("created {}", what);

        let identity = Identity::owned(id, &desired.name, desired.no_delete);
        let read = self.read(desired, &identity)?;
        Ok(created(&what, identity, read))
    }

    fn read(
        &self,
        desired: &ServiceSpec,
        identity: &Identity,
    ) -> Result<Outcome<ApplicationService>> {
        match self.resolve(desired, &identity.name)? {
            Some(remote) if same_object(identity, &remote.object_id) => Ok(Self::observe(
                desired,
                identity,
                remote,
                ApplyResult::NoChange,
            )),
            Some(remote) => Ok(Self::replaced(desired, identity, &remote.object_id)),
            None => Ok(Self::vanished(desired, identity)),
        }
    }

    fn update(
        &self,
        desired: &ServiceSpec,
        identity: &Identity,
    ) -> Result<Outcome<ApplicationService>> {
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
            return Ok(Self::observe(desired, identity, remote, ApplyResult::NoChange));
        }

        debug!("{}: {}", what, changes);
        match self
            .client
            .update_service(&remote.object_id, &Self::record(desired))
        {
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
        applied: &ServiceSpec,
        identity: &Identity,
    ) -> Result<Outcome<ApplicationService>> {
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
            .delete_service(&remote.object_id)
            .map_err(|e| e.for_target(what.clone()))?;
        info!("deleted {}", what);
        Ok(Outcome::cleared(identity, ApplyResult::Removed))
    }

    fn requires_replacement(&self, applied: &ServiceSpec, desired: &ServiceSpec) -> bool {
        applied.scope != desired.scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Method;
    use crate::backend::mock::MockExecutor;
    use crate::types::Scope;

    fn setup() -> (MockExecutor, NsxClient<MockExecutor>) {
        let mock = MockExecutor::new();
        (mock.clone(), NsxClient::new(mock))
    }

    fn https() -> ServiceSpec {
        ServiceSpec {
            scope: Scope::global(),
            name: "https".into(),
            description: "tls".into(),
            protocol: "TCP".into(),
            ports: Some("443".into()),
            no_delete: false,
        }
    }

    #[test]
    fn test_create_sends_single_element() {
        let (mock, client) = setup();
        let controller = ServiceController::new(&client);

        let outcome = controller.create(&https()).unwrap();
        assert_eq!(outcome.result, ApplyResult::Created);

        let stored = mock.service(&outcome.identity.remote_id).unwrap();
        assert_eq!(stored.protocol(), "TCP");
        assert_eq!(stored.ports(), "443");
        assert_eq!(stored.description, "tls");
    }

    #[test]
    fn test_portless_service() {
        let (mock, client) = setup();
        let controller = ServiceController::new(&client);
        let icmp = ServiceSpec {
            name: "ping".into(),
            protocol: "ICMP".into(),
            ports: None,
            ..https()
        };

        let identity = controller.create(&icmp).unwrap().identity;
        assert_eq!(mock.service(&identity.remote_id).unwrap().ports(), "");

        mock.reset_calls();
        let outcome = controller.update(&icmp, &identity).unwrap();
        assert_eq!(outcome.result, ApplyResult::NoChange);
        assert_eq!(mock.mutations(), 0);
    }

    #[test]
    fn test_update_protocol_and_ports_as_unit() {
        let (mock, client) = setup();
        let controller = ServiceController::new(&client);
        let identity = controller.create(&https()).unwrap().identity;

        let alt = ServiceSpec {
            ports: Some("8443".into()),
            ..https()
        };
        let outcome = controller.update(&alt, &identity).unwrap();
        assert_eq!(outcome.result, ApplyResult::Modified);
        assert_eq!(outcome.observed.unwrap().ports(), "8443");
        assert_eq!(mock.count(Method::Put), 1);

        mock.reset_calls();
        controller.update(&alt, &outcome.identity).unwrap();
        assert_eq!(mock.mutations(), 0);
    }

    #[test]
    fn test_adopts_and_corrects_drift() {
        let (mock, client) = setup();
        let id = mock.add_service(
            "globalroot-0",
            ApplicationService {
                name: "https".into(),
                description: "legacy".into(),
                element: vec![ServiceElement {
                    application_protocol: "TCP".into(),
                    value: "443".into(),
                }],
                ..Default::default()
            },
        );
        let controller = ServiceController::new(&client);

        let outcome = controller.create(&https()).unwrap();
        assert_eq!(outcome.result, ApplyResult::Adopted);
        assert!(outcome.identity.is_existing());
        assert_eq!(mock.count(Method::Post), 0);
        assert_eq!(mock.service(&id).unwrap().description, "tls");
    }

    #[test]
    fn test_rejected_create_carries_body() {
        let (mock, client) = setup();
        mock.fail_with_status(Method::Post, 400, "<error>bad port range</error>");
        let controller = ServiceController::new(&client);

        let err = controller.create(&https()).unwrap_err();
        assert!(err.to_string().contains("bad port range"));
        assert!(err.to_string().contains("service 'https' (scope globalroot-0)"));
    }

    #[test]
    fn test_protected_service_is_not_deleted() {
        let (mock, client) = setup();
        let controller = ServiceController::new(&client);
        let protected = ServiceSpec {
            no_delete: true,
            ..https()
        };
        let identity = controller.create(&protected).unwrap().identity;
        assert!(identity.is_no_delete());
        mock.reset_calls();

        let outcome = controller.delete(&protected, &identity).unwrap();
        assert!(matches!(outcome.result, ApplyResult::Skipped { .. }));
        assert!(mock.calls().is_empty());
        assert!(mock.service(&identity.remote_id).is_some());
    }

    #[test]
    fn test_toggling_no_delete_rederives_ownership() {
        let (_mock, client) = setup();
        let controller = ServiceController::new(&client);
        let identity = controller.create(&https()).unwrap().identity;

        let protected = ServiceSpec {
            no_delete: true,
            ..https()
        };
        let outcome = controller.update(&protected, &identity).unwrap();
        assert!(outcome.identity.is_no_delete());

        let outcome = controller.update(&https(), &outcome.identity).unwrap();
        assert!(!outcome.identity.is_no_delete());
    }
}
