//! Error types for NSX operations.
//!
//! Errors are categorized so callers can tell a malformed declaration from
//! an unreachable manager from a request the manager refused.
//!
//! "Not found" is deliberately absent: lookups return `Option` and a missing
//! object is a convergence signal, not a failure.

use std::fmt;

/// Result type alias for NSX operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of NSX errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Desired state is malformed; no remote call was made.
    Validation,
    /// The request could not be completed.
    Transport,
    /// The manager answered with a non-success status.
    Rejected,
    /// The manager answered with something we could not decode.
    Format,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Validation => "Invalid desired state",
            Self::Transport => "Could not reach the NSX manager",
            Self::Rejected => "Request rejected by the NSX manager",
            Self::Format => "Unexpected response from the NSX manager",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur during NSX operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A desired-state field is missing or malformed.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// The executor could not complete the request.
    #[error("transport failure during {operation}: {message}")]
    Transport {
        /// Operation being attempted (e.g. "list security groups").
        operation: String,
        /// Error message.
        message: String,
    },

    /// The manager answered with a non-success status.
    #[error("{operation} rejected with status {status}: {body}")]
    RemoteRejected {
        /// Operation being attempted.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The response could not be decoded.
    #[error("invalid response for {operation}: {message}")]
    InvalidResponse {
        /// Operation being attempted.
        operation: String,
        /// Error message.
        message: String,
    },

    /// An error annotated with the object it concerns.
    #[error("{target}: {source}")]
    Resource {
        /// Kind, scope, name and id of the object.
        target: String,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a transport error.
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a rejected-request error.
    pub fn rejected(operation: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::RemoteRejected {
            operation: operation.into(),
            status,
            body: body.into(),
        }
    }

    /// Attach object context (kind, scope, name, id).
    pub fn for_target(self, target: impl Into<String>) -> Self {
        Self::Resource {
            target: target.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with context wrappers peeled off.
    #[must_use]
    pub fn root(&self) -> &Error {
        match self {
            Error::Resource { source, .. } => source.root(),
            other => other,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self.root() {
            Error::Validation { .. } => ErrorCategory::Validation,
            Error::Transport { .. } => ErrorCategory::Transport,
            Error::RemoteRejected { .. } => ErrorCategory::Rejected,
            Error::InvalidResponse { .. } => ErrorCategory::Format,
            Error::Resource { .. } => unreachable!("root() never returns a wrapper"),
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Self::Transport {
            operation: "request".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse {
            operation: "decode".to_string(),
            message: err.to_string(),
        }
    }
}

/// Describe an object for error context.
pub(crate) fn target(kind: &str, scope: Option<&str>, name: &str, id: &str) -> String {
    let mut out = format!("{} '{}'", kind, name);
    match (scope, id.is_empty()) {
        (Some(scope), false) => out.push_str(&format!(" (scope {}, id {})", scope, id)),
        (Some(scope), true) => out.push_str(&format!(" (scope {})", scope)),
        (None, false) => out.push_str(&format!(" (id {})", id)),
        (None, true) => {}
    }
    out
}
