//! In-memory NSX manager for tests.
//!
//! Routes the same paths as the live API, stores records per scope, assigns
//! ids, and records every request so tests can count remote mutations.
//! Failures can be injected per method.

use crate::backend::{Executor, Method, Request, Response};
use crate::error::{Error, Result};
use crate::types::{ApplicationService, SecurityGroup, SecurityPolicy};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const PREFIX: &str = "/api/2.0/services/";

/// A failure to return for the next request with a given method.
#[derive(Debug, Clone)]
enum Injected {
    Status(u16, String),
    Transport(String),
}

#[derive(Debug, Default)]
struct State {
    groups: BTreeMap<String, Vec<SecurityGroup>>,
    services: BTreeMap<String, Vec<ApplicationService>>,
    policies: Vec<SecurityPolicy>,
    next_id: u64,
    calls: Vec<Request>,
    injected: Vec<(Method, VecDeque<Injected>)>,
    reorder_rules: bool,
    last_force: Option<bool>,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn take_injected(&mut self, method: Method) -> Option<Injected> {
        self.injected
            .iter_mut()
            .find(|(m, _)| *m == method)
            .and_then(|(_, queue)| queue.pop_front())
    }

    fn group_mut(&mut self, id: &str) -> Option<&mut SecurityGroup> {
        self.groups
            .values_mut()
            .flat_map(|v| v.iter_mut())
            .find(|g| g.object_id == id)
    }

    fn service_mut(&mut self, id: &str) -> Option<&mut ApplicationService> {
        self.services
            .values_mut()
            .flat_map(|v| v.iter_mut())
            .find(|s| s.object_id == id)
    }

    fn stored_group(&self, mut group: SecurityGroup) -> SecurityGroup {
        if self.reorder_rules
            && let Some(membership) = &mut group.dynamic_membership
        {
            for set in &mut membership.sets {
                set.criteria.reverse();
            }
        }
        group
    }
}

/// Mock executor emulating the manager's directory.
#[derive(Debug, Clone, Default)]
pub struct MockExecutor {
    state: Arc<Mutex<State>>,
}

impl MockExecutor {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store rules in reverse order, like a manager that does not keep order.
    #[must_use]
    pub fn with_rule_reordering(self) -> Self {
        self.state().reorder_rules = true;
        self
    }

    /// Seed a security group; assigns an id when the record has none.
    pub fn add_group(&self, scope: &str, mut group: SecurityGroup) -> String {
        let mut state = self.state();
        if group.object_id.is_empty() {
            group.object_id = state.id("securitygroup");
        }
        let id = group.object_id.clone();
        state.groups.entry(scope.to_string()).or_default().push(group);
        id
    }

    /// Seed an application service; assigns an id when the record has none.
    pub fn add_service(&self, scope: &str, mut service: ApplicationService) -> String {
        let mut state = self.state();
        if service.object_id.is_empty() {
            service.object_id = state.id("application");
        }
        let id = service.object_id.clone();
        state
            .services
            .entry(scope.to_string())
            .or_default()
            .push(service);
        id
    }

    /// Seed a security policy; assigns an id when the record has none.
    pub fn add_policy(&self, mut policy: SecurityPolicy) -> String {
        let mut state = self.state();
        if policy.object_id.is_empty() {
            policy.object_id = state.id("policy");
        }
        let id = policy.object_id.clone();
        state.policies.push(policy);
        id
    }

    /// Security group by id.
    pub fn group(&self, id: &str) -> Option<SecurityGroup> {
        self.state().group_mut(id).cloned()
    }

    /// All security groups in a scope, in listing order.
    pub fn groups(&self, scope: &str) -> Vec<SecurityGroup> {
        self.state().groups.get(scope).cloned().unwrap_or_default()
    }

    /// Application service by id.
    pub fn service(&self, id: &str) -> Option<ApplicationService> {
        self.state().service_mut(id).cloned()
    }

    /// All application services in a scope, in listing order.
    pub fn services(&self, scope: &str) -> Vec<ApplicationService> {
        self.state().services.get(scope).cloned().unwrap_or_default()
    }

    /// Security policy by id.
    pub fn policy(&self, id: &str) -> Option<SecurityPolicy> {
        self.state()
            .policies
            .iter()
            .find(|p| p.object_id == id)
            .cloned()
    }

    /// Rename any object out-of-band.
    pub fn rename(&self, id: &str, name: &str) -> bool {
        let mut state = self.state();
        if let Some(group) = state.group_mut(id) {
            group.name = name.to_string();
            return true;
        }
        if let Some(service) = state.service_mut(id) {
            service.name = name.to_string();
            return true;
        }
        if let Some(policy) = state.policies.iter_mut().find(|p| p.object_id == id) {
            policy.name = name.to_string();
            return true;
        }
        false
    }

    /// Delete any object out-of-band.
    pub fn remove(&self, id: &str) -> bool {
        let mut state = self.state();
        remove_group(&mut state, id)
            || remove_service(&mut state, id)
            || remove_policy(&mut state, id)
    }

    /// Answer the next `method` request with `status` and `body`.
    pub fn fail_with_status(&self, method: Method, status: u16, body: impl Into<String>) {
        self.inject(method, Injected::Status(status, body.into()));
    }

    /// Fail the next `method` request at the transport level.
    pub fn fail_transport(&self, method: Method, message: impl Into<String>) {
        self.inject(method, Injected::Transport(message.into()));
    }

    fn inject(&self, method: Method, failure: Injected) {
        let mut state = self.state();
        if let Some((_, queue)) = state.injected.iter_mut().find(|(m, _)| *m == method) {
            queue.push_back(failure);
        } else {
            state.injected.push((method, VecDeque::from([failure])));
        }
    }

    /// Every request received so far.
    pub fn calls(&self) -> Vec<Request> {
        self.state().calls.clone()
    }

    /// Number of requests received with `method`.
    pub fn count(&self, method: Method) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    /// Number of requests that could change remote state.
    pub fn mutations(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|r| r.method.is_mutation())
            .count()
    }

    /// Forget recorded requests.
    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    /// `force` flag of the last policy delete.
    pub fn last_force(&self) -> Option<bool> {
        self.state().last_force
    }
}

fn remove_group(state: &mut State, id: &str) -> bool {
    for groups in state.groups.values_mut() {
        if let Some(pos) = groups.iter().position(|g| g.object_id == id) {
            groups.remove(pos);
            return true;
        }
    }
    false
}

fn remove_service(state: &mut State, id: &str) -> bool {
    for services in state.services.values_mut() {
        if let Some(pos) = services.iter().position(|s| s.object_id == id) {
            services.remove(pos);
            return true;
        }
    }
    false
}

fn remove_policy(state: &mut State, id: &str) -> bool {
    if let Some(pos) = state.policies.iter().position(|p| p.object_id == id) {
        state.policies.remove(pos);
        return true;
    }
    false
}

fn ok(body: impl Into<String>) -> Response {
    Response::new(200, body)
}

fn not_found(what: &str) -> Response {
    Response::new(404, format!("<error><details>{} not found</details></error>", what))
}

fn bad_request(message: &str) -> Response {
    Response::new(400, format!("<error><details>{}</details></error>", message))
}

fn list<T: serde::Serialize>(items: &[T]) -> Response {
    match serde_json::to_string(items) {
        Ok(body) => ok(body),
        Err(e) => Response::new(500, e.to_string()),
    }
}

fn route(state: &mut State, request: &Request) -> Response {
    let Some(rest) = request.path.strip_prefix(PREFIX) else {
        return not_found(&request.path);
    };
    let (rest, query) = rest.split_once('?').unwrap_or((rest, ""));
    let segments: Vec<&str> = rest.split('/').collect();
    let body = request.body.as_deref().unwrap_or_default();

    match (request.method, segments.as_slice()) {
        (Method::Get, ["securitygroup", "scope", scope]) => {
            list(state.groups.get(*scope).map_or(&[][..], Vec::as_slice))
        }
        (Method::Post, ["securitygroup", "bulk", scope]) => {
            match serde_json::from_str::<SecurityGroup>(body) {
                Ok(group) => {
                    let mut group = state.stored_group(group);
                    group.object_id = state.id("securitygroup");
                    let id = group.object_id.clone();
                    state.groups.entry((*scope).to_string()).or_default().push(group);
                    Response::new(201, id)
                }
                Err(e) => bad_request(&e.to_string()),
            }
        }
        (Method::Put, ["securitygroup", "bulk", id]) => {
            match serde_json::from_str::<SecurityGroup>(body) {
                Ok(update) => {
                    let update = state.stored_group(update);
                    match state.group_mut(id) {
                        Some(group) => {
                            group.name = update.name;
                            group.description = update.description;
                            group.dynamic_membership = update.dynamic_membership;
                            ok("")
                        }
                        None => not_found(id),
                    }
                }
                Err(e) => bad_request(&e.to_string()),
            }
        }
        (Method::Delete, ["securitygroup", id]) => {
            if remove_group(state, id) {
                ok("")
            } else {
                not_found(id)
            }
        }
        (Method::Get, ["application", "scope", scope]) => {
            list(state.services.get(*scope).map_or(&[][..], Vec::as_slice))
        }
        (Method::Post, ["application", scope]) => {
            match serde_json::from_str::<ApplicationService>(body) {
                Ok(mut service) => {
                    service.object_id = state.id("application");
                    let id = service.object_id.clone();
                    state
                        .services
                        .entry((*scope).to_string())
                        .or_default()
                        .push(service);
                    Response::new(201, id)
                }
                Err(e) => bad_request(&e.to_string()),
            }
        }
        (Method::Put, ["application", id]) => {
            match serde_json::from_str::<ApplicationService>(body) {
                Ok(update) => match state.service_mut(id) {
                    Some(service) => {
                        service.name = update.name;
                        service.description = update.description;
                        service.element = update.element;
                        ok("")
                    }
                    None => not_found(id),
                },
                Err(e) => bad_request(&e.to_string()),
            }
        }
        (Method::Delete, ["application", id]) => {
            if remove_service(state, id) {
                ok("")
            } else {
                not_found(id)
            }
        }
        (Method::Get, ["policy", "securitypolicy", "all"]) => list(&state.policies),
        (Method::Post, ["policy", "securitypolicy"]) => {
            match serde_json::from_str::<SecurityPolicy>(body) {
                Ok(mut policy) => {
                    policy.object_id = state.id("policy");
                    let id = policy.object_id.clone();
                    state.policies.push(policy);
                    Response::new(201, id)
                }
                Err(e) => bad_request(&e.to_string()),
            }
        }
        (Method::Delete, ["policy", "securitypolicy", id]) => {
            state.last_force = query
                .strip_prefix("force=")
                .and_then(|v| v.parse::<bool>().ok());
            if remove_policy(state, id) {
                ok("")
            } else {
                not_found(id)
            }
        }
        _ => not_found(&request.path),
    }
}

impl Executor for MockExecutor {
    fn execute(&self, request: &Request) -> Result<Response> {
        let mut state = self.state();
        state.calls.push(request.clone());

        match state.take_injected(request.method) {
            Some(Injected::Status(status, body)) => Ok(Response::new(status, body)),
            Some(Injected::Transport(message)) => {
                Err(Error::transport(request.to_string(), message))
            }
            None => Ok(route(&mut state, request)),
        }
    }
}
