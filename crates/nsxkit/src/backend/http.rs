//! HTTP executor for a live NSX manager.
//!
//! Blocking `ureq` agent with basic authentication and a global timeout.
//! Non-success statuses are returned as responses, not errors.

use crate::backend::{Executor, Method, Request, Response};
use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Executor talking to the manager over HTTPS.
///
/// # Example
///
/// ```no_run
/// use nsxkit::backend::http::HttpExecutor;
/// use nsxkit::NsxClient;
///
/// let executor = HttpExecutor::new("https://nsx.example.com", "admin", "secret");
/// let client = NsxClient::new(executor);
/// ```
pub struct HttpExecutor {
    agent: ureq::Agent,
    base_url: String,
    authorization: String,
}

impl HttpExecutor {
    /// Create an executor with the default timeout.
    pub fn new(base_url: impl Into<String>, username: &str, password: &str) -> Self {
        Self::with_timeout(base_url, username, password, DEFAULT_TIMEOUT)
    }

    /// Create an executor with a custom global timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();

        let base_url: String = base_url.into();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: basic_auth(username, password),
        }
    }

    /// Base URL without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, request: &Request) -> String {
        format!("{}{}", self.base_url, request.path)
    }
}

fn basic_auth(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", username, password))
    )
}

impl Executor for HttpExecutor {
    fn execute(&self, request: &Request) -> Result<Response> {
        let url = self.url(request);
        debug!("{} {}", request.method, url);

        let body = request.body.as_deref().unwrap_or_default();
        let result = match request.method {
            Method::Get => self
                .agent
                .get(&url)
                .header("Authorization", &self.authorization)
                .header("Accept", "application/json")
                .call(),
            Method::Delete => self
                .agent
                .delete(&url)
                .header("Authorization", &self.authorization)
                .header("Accept", "application/json")
                .call(),
            Method::Post => self
                .agent
                .post(&url)
                .header("Authorization", &self.authorization)
                .header("Accept", "application/json")
                .header("Content-Type", "application/json")
                .send(body),
            Method::Put => self
                .agent
                .put(&url)
                .header("Authorization", &self.authorization)
                .header("Accept", "application/json")
                .header("Content-Type", "application/json")
                .send(body),
        };

        let mut response =
            result.map_err(|e| Error::transport(request.to_string(), e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| Error::transport(request.to_string(), e.to_string()))?;

        debug!("{} {} -> {}", request.method, request.path, status);
        Ok(Response { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_header() {
        assert_eq!(basic_auth("admin", "secret"), "Basic YWRtaW46c2VjcmV0");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let executor = HttpExecutor::new("https://nsx.example.com/", "u", "p");
        assert_eq!(executor.base_url(), "https://nsx.example.com");
        assert_eq!(
            executor.url(&Request::get("/api/2.0/services/policy/securitypolicy/all")),
            "https://nsx.example.com/api/2.0/services/policy/securitypolicy/all"
        );
    }

    #[test]
    fn test_unreachable_manager_is_transport_error() {
        let executor = HttpExecutor::with_timeout(
            "http://127.0.0.1:1",
            "u",
            "p",
            Duration::from_millis(500),
        );
        let err = executor
            .execute(&Request::get("/api/2.0/services/policy/securitypolicy/all"))
            .unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::Transport);
    }
}
