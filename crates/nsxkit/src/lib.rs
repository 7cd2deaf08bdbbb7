//! # nsxkit
//!
//! Pure Rust client and reconciliation controllers for NSX network-policy
//! objects: security groups, security policies and application services.
//!
//! ## Features
//!
//! - **Typed records** for the NSX directory API with lossless membership mapping
//! - **Name resolution** with adoption of pre-existing objects
//! - **Controllers** implementing [`declarative::Controller`] per object kind
//! - **Criteria merge** folding remote rule keys onto the declared shape
//! - **Testable**: [`backend::mock::MockExecutor`] emulates the manager in memory
//!
//! ## Example
//!
//! ```no_run
//! use declarative::Controller;
//! use nsxkit::backend::http::HttpExecutor;
//! use nsxkit::{NsxClient, SecurityGroupController, SecurityGroupSpec};
//!
//! let client = NsxClient::new(HttpExecutor::new("https://nsx.example.com", "admin", "secret"));
//! let groups = SecurityGroupController::new(&client);
//!
//! let outcome = groups.create(&SecurityGroupSpec::new("web"))?;
//! println!("bound to {}", outcome.identity.remote_id);
//! # Ok::<(), nsxkit::Error>(())
//! ```

pub mod backend;
pub mod client;
pub mod controller;
pub mod desired;
pub mod error;
pub mod merge;
pub mod resolver;
pub mod types;

// Re-export main types at crate root
pub use client::NsxClient;
pub use controller::{SecurityGroupController, SecurityPolicyController, ServiceController};
pub use desired::{SecurityGroupSpec, SecurityPolicySpec, ServiceSpec};
pub use error::{Error, ErrorCategory, Result};
pub use merge::{MergeStrategy, merge_criteria};
pub use types::{
    ApplicationService, Comparator, CriteriaSet, Criterion, DynamicMembership, GLOBAL_SCOPE,
    GroupBinding, MatchKey, Operator, RemoteObject, Scope, SecurityGroup, SecurityPolicy,
    ServiceElement,
};
