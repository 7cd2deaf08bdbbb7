//! Name resolution.
//!
//! Names are not unique remotely. Each lookup lists the whole scope (no
//! cache) and takes the first exact match in listing order.

use crate::backend::Executor;
use crate::client::NsxClient;
use crate::error::Result;
use crate::types::{ApplicationService, RemoteObject, Scope, SecurityGroup, SecurityPolicy};
use log::warn;

/// First record named `name`, or `None`.
///
/// A first match with an empty id counts as not found.
pub fn first_named<T: RemoteObject>(kind: &str, items: Vec<T>, name: &str) -> Option<T> {
    let mut matches = items.into_iter().filter(|item| item.name() == name);
    let first = matches.next()?;

    let extra = matches.count();
    if extra > 0 {
        warn!(
            "{} name '{}' is ambiguous: {} objects share it, using {}",
            kind,
            name,
            extra + 1,
            first.object_id()
        );
    }

    if first.object_id().is_empty() {
        return None;
    }
    Some(first)
}

/// Find a security group by name in a scope.
pub fn resolve_security_group<E: Executor>(
    client: &NsxClient<E>,
    scope: &Scope,
    name: &str,
) -> Result<Option<SecurityGroup>> {
    let groups = client.list_security_groups(scope)?;
    Ok(first_named("security group", groups, name))
}

/// Find an application service by name in a scope.
pub fn resolve_service<E: Executor>(
    client: &NsxClient<E>,
    scope: &Scope,
    name: &str,
) -> Result<Option<ApplicationService>> {
    let services = client.list_services(scope)?;
    Ok(first_named("service", services, name))
}

/// Find a security policy by name; policies are global.
pub fn resolve_security_policy<E: Executor>(
    client: &NsxClient<E>,
    name: &str,
) -> Result<Option<SecurityPolicy>> {
    let policies = client.list_security_policies()?;
    Ok(first_named("security policy", policies, name))
}
