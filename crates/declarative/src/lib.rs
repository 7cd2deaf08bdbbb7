//! # Declarative
//!
//! A framework for reconciling declared resources against a remote system.
//!
//! This crate provides the kind-agnostic half of the protocol: persisted
//! identity, the lifecycle state machine, the controller contract, planning,
//! and a single-resource converge executor.
//!
//! ## Core Concepts
//!
//! - **Identity**: remote id, last observed name, and [`Ownership`]
//! - **Controller**: create (locate-or-adopt), read, update (diff-and-patch), delete
//! - **Action**: what a pass will do for one resource (create, update, replace, ...)
//! - **converge**: runs the planned action and returns the record to persist
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{converge, ExecuteOptions, NoProgress};
//!
//! let out = converge(
//!     &controller,
//!     "security_group.web",
//!     state.take("web"),
//!     Some(&desired),
//!     &ExecuteOptions::default(),
//!     &mut NoProgress,
//! );
//! if let Some(entry) = out.entry {
//!     state.insert("web", entry);
//! }
//! ```
//!
//! ## Provider Traits
//!
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks.

pub mod context;
pub mod controller;
pub mod diff;
pub mod executor;
pub mod identity;
pub mod planner;
pub mod types;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use controller::{Controller, Entry, Outcome};
pub use diff::{ChangeSet, FieldChange};
pub use executor::{Converged, converge};
pub use identity::{Identity, LifecycleState, Ownership};
pub use planner::{Action, Target, plan};
pub use types::{ApplyResult, ExecuteOptions, ExecuteSummary};
