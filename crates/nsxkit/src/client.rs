//! Typed client for the NSX directory API.
//!
//! One method per verb and kind. Status codes are checked here: list, update
//! and delete expect 200, create expects 201 with the new id as body. Any
//! other status becomes [`Error::RemoteRejected`] with the raw body.

use crate::backend::{Executor, Request, Response};
use crate::error::{Error, Result};
use crate::types::{ApplicationService, Scope, SecurityGroup, SecurityPolicy};
use log::debug;

const BASE: &str = "/api/2.0/services";

const STATUS_OK: u16 = 200;
const STATUS_CREATED: u16 = 201;

/// NSX client over any [`Executor`].
#[derive(Debug, Clone)]
pub struct NsxClient<E> {
    executor: E,
}

impl<E: Executor> NsxClient<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    /// The underlying executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn send(&self, operation: &str, request: Request, expected: u16) -> Result<Response> {
        debug!("{}: {}", operation, request);
        let response = self.executor.execute(&request).map_err(|e| match e {
            Error::Transport { message, .. } => Error::transport(operation, message),
            other => other,
        })?;
        if response.status != expected {
            return Err(Error::rejected(operation, response.status, response.body));
        }
        Ok(response)
    }

    fn create(&self, operation: &str, path: String, body: String) -> Result<String> {
        let response = self.send(operation, Request::post(path, body), STATUS_CREATED)?;
        let id = response.body.trim().to_string();
        if id.is_empty() {
            return Err(Error::InvalidResponse {
                operation: operation.to_string(),
                message: "empty id in create response".to_string(),
            });
        }
        Ok(id)
    }

    fn encode<T: serde::Serialize>(operation: &str, record: &T) -> Result<String> {
        serde_json::to_string(record).map_err(|e| Error::InvalidResponse {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }

    // =========================================================================
    // Security groups
    // =========================================================================

    pub fn list_security_groups(&self, scope: &Scope) -> Result<Vec<SecurityGroup>> {
        let op = "list security groups";
        let path = format!("{}/securitygroup/scope/{}", BASE, scope);
        self.send(op, Request::get(path), STATUS_OK)?.json(op)
    }

    /// Create a group and return its id.
    pub fn create_security_group(&self, scope: &Scope, group: &SecurityGroup) -> Result<String> {
        let op = "create security group";
        let path = format!("{}/securitygroup/bulk/{}", BASE, scope);
        self.create(op, path, Self::encode(op, group)?)
    }

    pub fn update_security_group(&self, id: &str, group: &SecurityGroup) -> Result<()> {
        let op = "update security group";
        let path = format!("{}/securitygroup/bulk/{}", BASE, id);
        self.send(op, Request::put(path, Self::encode(op, group)?), STATUS_OK)
            .map(drop)
    }

    pub fn delete_security_group(&self, id: &str) -> Result<()> {
        let op = "delete security group";
        let path = format!("{}/securitygroup/{}", BASE, id);
        self.send(op, Request::delete(path), STATUS_OK).map(drop)
    }

    // =========================================================================
    // Application services
    // =========================================================================

    pub fn list_services(&self, scope: &Scope) -> Result<Vec<ApplicationService>> {
        let op = "list services";
        let path = format!("{}/application/scope/{}", BASE, scope);
        self.send(op, Request::get(path), STATUS_OK)?.json(op)
    }

    /// Create a service and return its id.
    pub fn create_service(&self, scope: &Scope, service: &ApplicationService) -> Result<String> {
        let op = "create service";
        let path = format!("{}/application/{}", BASE, scope);
        self.create(op, path, Self::encode(op, service)?)
    }

    pub fn update_service(&self, id: &str, service: &ApplicationService) -> Result<()> {
        let op = "update service";
        let path = format!("{}/application/{}", BASE, id);
        self.send(op, Request::put(path, Self::encode(op, service)?), STATUS_OK)
            .map(drop)
    }

    pub fn delete_service(&self, id: &str) -> Result<()> {
        let op = "delete service";
        let path = format!("{}/application/{}", BASE, id);
        self.send(op, Request::delete(path), STATUS_OK).map(drop)
    }

    // =========================================================================
    // Security policies (global, no update)
    // =========================================================================

    pub fn list_security_policies(&self) -> Result<Vec<SecurityPolicy>> {
        let op = "list security policies";
        let path = format!("{}/policy/securitypolicy/all", BASE);
        self.send(op, Request::get(path), STATUS_OK)?.json(op)
    }

    /// Create a policy and return its id.
    pub fn create_security_policy(&self, policy: &SecurityPolicy) -> Result<String> {
        let op = "create security policy";
        let path = format!("{}/policy/securitypolicy", BASE);
        self.create(op, path, Self::encode(op, policy)?)
    }

    /// Delete a policy; `force` also removes it while still in use.
    pub fn delete_security_policy(&self, id: &str, force: bool) -> Result<()> {
        let op = "delete security policy";
        let path = format!("{}/policy/securitypolicy/{}?force={}", BASE, id, force);
        self.send(op, Request::delete(path), STATUS_OK).map(drop)
    }
}
