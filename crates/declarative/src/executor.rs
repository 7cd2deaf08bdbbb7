//! Execution engine - runs the planned controller operation for a resource

use crate::context::ProgressCallback;
use crate::controller::{Controller, Entry, Outcome};
use crate::identity::LifecycleState;
use crate::planner::{Action, plan};
use crate::types::{ApplyResult, ExecuteOptions};

/// Result of converging one resource
#[derive(Debug)]
pub struct Converged<D, O> {
    /// Record to persist; `None` once the object is gone or was never bound
    pub entry: Option<Entry<D, O>>,
    pub result: ApplyResult,
}

/// Converge one declared resource
///
/// Plans the operation from the persisted `entry` and the `desired`
/// declaration, runs it, and returns the record to persist. A failed
/// operation leaves the persisted record untouched, except when a replacement
/// deleted the object and then failed to create its successor: the record is
/// dropped so the next pass plans a create.
pub fn converge<C: Controller>(
    controller: &C,
    address: &str,
    entry: Option<Entry<C::Desired, C::Observed>>,
    desired: Option<&C::Desired>,
    opts: &ExecuteOptions,
    progress: &mut dyn ProgressCallback,
) -> Converged<C::Desired, C::Observed> {
    let action = if opts.refresh_only {
        entry
            .as_ref()
            .filter(|e| e.identity.is_bound())
            .map(|_| Action::Refresh)
    } else {
        plan(controller, entry.as_ref(), desired)
    };

    let Some(action) = action else {
        return Converged {
            entry,
            result: ApplyResult::NoChange,
        };
    };

    progress.on_resource_start(address, &action);

    if opts.dry_run {
        let result = ApplyResult::Skipped {
            reason: format!("dry run ({})", action),
        };
        progress.on_resource_complete(address, &result);
        return Converged { entry, result };
    }

    let from = entry
        .as_ref()
        .map(|e| e.identity.state())
        .unwrap_or(LifecycleState::Absent);

    // A refresh-only pass observes what was applied, not what is declared
    let desired = if opts.refresh_only { None } else { desired };

    let converged = match run(controller, action, entry.as_ref(), desired) {
        Ok((applied, outcome)) => {
            let to = outcome.identity.state();
            if valid_path(from, action, to) {
                if from != to {
                    log::debug!("{}: {} -> {}", address, from, to);
                }
                Converged {
                    result: outcome.result.clone(),
                    entry: applied.and_then(|d| Entry::from_outcome(d, outcome)),
                }
            } else {
                log::error!(
                    "{}: refusing illegal transition {} -> {} during {}",
                    address,
                    from,
                    to,
                    action
                );
                Converged {
                    entry,
                    result: ApplyResult::Failed {
                        error: format!("illegal transition {} -> {}", from, to),
                    },
                }
            }
        }
        Err(Failure { error, stale }) => {
            log::error!("{}: {} failed: {}", address, action, error);
            Converged {
                entry: if stale { None } else { entry },
                result: ApplyResult::Failed {
                    error: error.to_string(),
                },
            }
        }
    };

    progress.on_resource_complete(address, &converged.result);
    converged
}

/// A failed operation
struct Failure<E> {
    error: E,
    /// The persisted record no longer names a remote object
    stale: bool,
}

impl<E> From<E> for Failure<E> {
    fn from(error: E) -> Self {
        Self {
            error,
            stale: false,
        }
    }
}

type RunOutput<C> = (
    Option<<C as Controller>::Desired>,
    Outcome<<C as Controller>::Observed>,
);

/// Run the controller operation(s) for an action
///
/// Returns the desired attributes to record as applied alongside the outcome.
fn run<C: Controller>(
    controller: &C,
    action: Action,
    entry: Option<&Entry<C::Desired, C::Observed>>,
    desired: Option<&C::Desired>,
) -> Result<RunOutput<C>, Failure<C::Error>> {
    match (action, entry, desired) {
        (Action::Create, _, Some(desired)) => {
            let outcome = controller.create(desired)?;
            Ok((Some(desired.clone()), outcome))
        }
        (Action::Update { .. }, Some(entry), Some(desired)) => {
            let outcome = controller.update(desired, &entry.identity)?;
            Ok((Some(desired.clone()), outcome))
        }
        (Action::Refresh, Some(entry), desired) => {
            let spec = desired.unwrap_or(&entry.applied);
            let outcome = controller.read(spec, &entry.identity)?;
            Ok((Some(spec.clone()), outcome))
        }
        (Action::Replace, Some(entry), Some(desired)) => {
            controller.delete(&entry.applied, &entry.identity)?;
            let outcome = controller
                .create(desired)
                .map_err(|error| Failure { error, stale: true })?;
            Ok((Some(desired.clone()), outcome))
        }
        (Action::Delete, Some(entry), _) => {
            let outcome = controller.delete(&entry.applied, &entry.identity)?;
            Ok((None, outcome))
        }
        (Action::Forget, Some(entry), _) => Ok((
            None,
            Outcome::cleared(&entry.identity, ApplyResult::NoChange),
        )),
        (action, entry, desired) => unreachable!(
            "planner produced {} with entry={} desired={}",
            action,
            entry.is_some(),
            desired.is_some()
        ),
    }
}

/// Check the lifecycle edges an action walks through
fn valid_path(from: LifecycleState, action: Action, to: LifecycleState) -> bool {
    use LifecycleState::*;

    let path: &[LifecycleState] = match action {
        Action::Create => &[Absent],
        Action::Update { .. } => &[from, Updating],
        Action::Refresh => &[from],
        Action::Replace => &[from, Deleting, Absent],
        Action::Delete => &[from, Deleting],
        Action::Forget => &[from],
    };

    let mut current = from;
    for &next in path.iter().chain(std::iter::once(&to)) {
        if !current.can_transition_to(next) {
            return false;
        }
        current = next;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use crate::identity::Identity;
    use std::cell::{Cell, RefCell};
    use std::fmt;

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "remote said no")
        }
    }

    impl std::error::Error for Boom {}

    /// In-memory controller recording which operations ran
    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<&'static str>>,
        fail_create: Cell<bool>,
        vanish_on_update: Cell<bool>,
    }

    impl Controller for Recorder {
        type Desired = String;
        type Observed = String;
        type Error = Boom;

        fn kind(&self) -> &'static str {
            "recorder"
        }

        fn create(&self, desired: &String) -> Result<Outcome<String>, Boom> {
            self.calls.borrow_mut().push("create");
            if self.fail_create.get() {
                return Err(Boom);
            }
            Ok(Outcome::present(
                Identity::owned("obj-1", desired.clone(), false),
                desired.clone(),
                ApplyResult::Created,
            ))
        }

        fn read(&self, desired: &String, identity: &Identity) -> Result<Outcome<String>, Boom> {
            self.calls.borrow_mut().push("read");
            Ok(Outcome::present(
                identity.clone(),
                desired.clone(),
                ApplyResult::NoChange,
            ))
        }

        fn update(&self, desired: &String, identity: &Identity) -> Result<Outcome<String>, Boom> {
            self.calls.borrow_mut().push("update");
            if self.vanish_on_update.get() {
                return Ok(Outcome::cleared(identity, ApplyResult::Cleared));
            }
            Ok(Outcome::present(
                identity.renamed(desired.clone()),
                desired.clone(),
                ApplyResult::Modified,
            ))
        }

        fn delete(&self, _applied: &String, identity: &Identity) -> Result<Outcome<String>, Boom> {
            self.calls.borrow_mut().push("delete");
            Ok(Outcome::cleared(identity, ApplyResult::Removed))
        }
    }

    /// Recorder whose every change needs delete-then-create
    struct Replacing(Recorder);

    impl Controller for Replacing {
        type Desired = String;
        type Observed = String;
        type Error = Boom;

        fn kind(&self) -> &'static str {
            "replacing"
        }
        fn create(&self, d: &String) -> Result<Outcome<String>, Boom> {
            self.0.create(d)
        }
        fn read(&self, d: &String, i: &Identity) -> Result<Outcome<String>, Boom> {
            self.0.read(d, i)
        }
        fn update(&self, d: &String, i: &Identity) -> Result<Outcome<String>, Boom> {
            self.0.update(d, i)
        }
        fn delete(&self, d: &String, i: &Identity) -> Result<Outcome<String>, Boom> {
            self.0.delete(d, i)
        }
        fn requires_replacement(&self, applied: &String, desired: &String) -> bool {
            applied != desired
        }
    }

    fn bound(name: &str) -> Entry<String, String> {
        Entry {
            applied: name.to_string(),
            identity: Identity::owned("obj-1", name, false),
            observed: Some(name.to_string()),
        }
    }

    #[test]
    fn test_converge_creates() {
        let c = Recorder::default();
        let desired = "web".to_string();
        let out = converge(
            &c,
            "recorder.web",
            None,
            Some(&desired),
            &ExecuteOptions::default(),
            &mut NoProgress,
        );

        assert_eq!(out.result, ApplyResult::Created);
        let entry = out.entry.unwrap();
        assert_eq!(entry.identity.remote_id, "obj-1");
        assert_eq!(entry.applied, "web");
        assert_eq!(*c.calls.borrow(), vec!["create"]);
    }

    #[test]
    fn test_converge_failure_keeps_prior_entry() {
        let c = Recorder::default();
        c.fail_create.set(true);
        let desired = "web".to_string();
        let out = converge(
            &c,
            "recorder.web",
            None,
            Some(&desired),
            &ExecuteOptions::default(),
            &mut NoProgress,
        );

        assert!(matches!(out.result, ApplyResult::Failed { .. }));
        assert!(out.entry.is_none());
    }

    #[test]
    fn test_converge_update_vanished_drops_entry() {
        let c = Recorder::default();
        c.vanish_on_update.set(true);
        let desired = "web".to_string();
        let out = converge(
            &c,
            "recorder.web",
            Some(bound("web")),
            Some(&desired),
            &ExecuteOptions::default(),
            &mut NoProgress,
        );

        assert_eq!(out.result, ApplyResult::Cleared);
        assert!(out.entry.is_none());
    }

    #[test]
    fn test_converge_replace_deletes_then_creates() {
        let c = Replacing(Recorder::default());
        let desired = "db".to_string();
        let out = converge(
            &c,
            "replacing.x",
            Some(bound("web")),
            Some(&desired),
            &ExecuteOptions::default(),
            &mut NoProgress,
        );

        assert_eq!(out.result, ApplyResult::Created);
        assert_eq!(out.entry.unwrap().applied, "db");
        assert_eq!(*c.0.calls.borrow(), vec!["delete", "create"]);
    }

    #[test]
    fn test_failed_replacement_drops_deleted_entry() {
        let c = Replacing(Recorder::default());
        c.0.fail_create.set(true);
        let desired = "db".to_string();
        let out = converge(
            &c,
            "replacing.x",
            Some(bound("web")),
            Some(&desired),
            &ExecuteOptions::default(),
            &mut NoProgress,
        );

        assert!(matches!(out.result, ApplyResult::Failed { .. }));
        assert!(out.entry.is_none());
        assert_eq!(*c.0.calls.borrow(), vec!["delete", "create"]);
    }

    #[test]
    fn test_converge_delete() {
        let c = Recorder::default();
        let out = converge(
            &c,
            "recorder.web",
            Some(bound("web")),
            None,
            &ExecuteOptions::default(),
            &mut NoProgress,
        );

        assert_eq!(out.result, ApplyResult::Removed);
        assert!(out.entry.is_none());
    }

    #[test]
    fn test_dry_run_makes_no_calls() {
        let c = Recorder::default();
        let desired = "web".to_string();
        let opts = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };
        let out = converge(&c, "recorder.web", None, Some(&desired), &opts, &mut NoProgress);

        assert!(matches!(out.result, ApplyResult::Skipped { .. }));
        assert!(c.calls.borrow().is_empty());
    }

    #[test]
    fn test_refresh_only_reads_bound_entries() {
        let c = Recorder::default();
        let desired = "renamed".to_string();
        let opts = ExecuteOptions {
            refresh_only: true,
            ..Default::default()
        };

        let out = converge(
            &c,
            "recorder.web",
            Some(bound("web")),
            Some(&desired),
            &opts,
            &mut NoProgress,
        );
        assert_eq!(out.result, ApplyResult::NoChange);
        assert_eq!(out.entry.unwrap().applied, "web");
        assert_eq!(*c.calls.borrow(), vec!["read"]);

        let out = converge(&c, "recorder.new", None, Some(&desired), &opts, &mut NoProgress);
        assert_eq!(out.result, ApplyResult::NoChange);
        assert_eq!(c.calls.borrow().len(), 1);
    }

    #[test]
    fn test_valid_path() {
        use LifecycleState::*;

        assert!(valid_path(Absent, Action::Create, Owned));
        assert!(valid_path(Absent, Action::Create, Adopted));
        assert!(valid_path(Owned, Action::Update { changed: true }, Owned));
        assert!(valid_path(Adopted, Action::Update { changed: true }, Absent));
        assert!(valid_path(Owned, Action::Delete, Absent));
        assert!(valid_path(Owned, Action::Replace, Owned));
        assert!(!valid_path(Absent, Action::Update { changed: true }, Owned));
        assert!(!valid_path(Absent, Action::Delete, Absent));
    }
}
