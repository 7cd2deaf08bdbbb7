//! Executors that carry requests to the NSX manager.
//!
//! This module provides the [`Executor`] trait and its implementations. The
//! production implementation is [`http::HttpExecutor`]; tests use
//! [`mock::MockExecutor`], an in-memory manager.
//!
//! # Testing
//!
//! ```
//! use nsxkit::backend::{Executor, Request, mock::MockExecutor};
//!
//! let mock = MockExecutor::new();
//! let response = mock
//!     .execute(&Request::get("/api/2.0/services/securitygroup/scope/globalroot-0"))
//!     .unwrap();
//! assert_eq!(response.status, 200);
//! assert_eq!(response.body, "[]");
//! ```

pub mod http;
pub mod mock;

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the method changes remote state.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request relative to the manager's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Path and query, starting with `/`.
    pub path: String,
    /// JSON body.
    pub body: Option<String>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body.into()),
        }
    }

    pub fn put(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            body: Some(body.into()),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Status and raw body of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self, operation: &str) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| Error::InvalidResponse {
            operation: operation.to_string(),
            message: e.to_string(),
        })
    }
}

/// Carries one request to the manager and returns its response.
///
/// Any status is a successful execution; interpreting it is the caller's job.
/// An `Err` means the request could not be completed at all.
pub trait Executor: Send + Sync {
    fn execute(&self, request: &Request) -> Result<Response>;
}

impl<E: Executor + ?Sized> Executor for &E {
    fn execute(&self, request: &Request) -> Result<Response> {
        (**self).execute(request)
    }
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn execute(&self, request: &Request) -> Result<Response> {
        (**self).execute(request)
    }
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, request: &Request) -> Result<Response> {
        (**self).execute(request)
    }
}
