//! Execution engine for nsxctl
//!
//! The engine orchestrates one pass over the manifest and state:
//! 1. Planning - Assemble declared attributes per kind, resolving policy group references
//! 2. Executing - Converge kinds in dependency order, recording outcomes in state

pub mod executor;
pub mod planner;

pub use executor::{Mode, Pass, run};

use nsxkit::backend::{Executor, Method, Request, Response};
use std::sync::{Mutex, PoisonError};

/// Executor for passes that must never reach the manager
///
/// Dry passes make no requests; this executor turns an unexpected one into a
/// transport error instead of a network call.
pub struct Offline;

impl Executor for Offline {
    fn execute(&self, request: &Request) -> nsxkit::Result<Response> {
        Err(nsxkit::Error::transport(
            request.to_string(),
            "no manager connection in offline mode",
        ))
    }
}

/// Executor that reads from the manager but holds back every write
///
/// Held writes are answered with the status the client expects, so a pass
/// run through it reports what it would change without changing anything.
pub struct ReadOnly<E> {
    inner: E,
    held: Mutex<Vec<Request>>,
}

impl<E: Executor> ReadOnly<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            held: Mutex::new(Vec::new()),
        }
    }

    /// Writes that were not sent
    pub fn held(&self) -> Vec<Request> {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<E: Executor> Executor for ReadOnly<E> {
    fn execute(&self, request: &Request) -> nsxkit::Result<Response> {
        if !request.method.is_mutation() {
            return self.inner.execute(request);
        }

        log::debug!("holding back {}", request);
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let status = if request.method == Method::Post { 201 } else { 200 };
        Ok(Response::new(status, ""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsxkit::backend::mock::MockExecutor;

    #[test]
    fn test_offline_refuses_requests() {
        let err = Offline
            .execute(&Request::get("/api/2.0/services/policy/securitypolicy/all"))
            .unwrap_err();
        assert!(err.to_string().contains("offline"));
    }

    #[test]
    fn test_read_only_forwards_reads_and_holds_writes() {
        let mock = MockExecutor::new();
        let guarded = ReadOnly::new(&mock);
        let groups = "/api/2.0/services/securitygroup/scope/globalroot-0";

        let listed = guarded.execute(&Request::get(groups)).unwrap();
        assert_eq!(listed.status, 200);

        let put = Request::put("/api/2.0/services/securitygroup/bulk/securitygroup-1", "{}");
        let held = guarded.execute(&put).unwrap();
        assert_eq!(held.status, 200);
        assert_eq!(guarded.held(), vec![put]);
        assert_eq!(mock.calls().len(), 1);
        assert_eq!(mock.mutations(), 0);
    }
}
