//! Pass executor - converges every targeted resource, kind by kind

use crate::engine::planner::{self, Declared};
use crate::schema::Manifest;
use crate::state::State;
use anyhow::Result;
use declarative::{
    ApplyResult, Controller, Entry, ExecuteOptions, ExecuteSummary, ProgressCallback, Target,
    converge,
};
use nsxkit::backend::Executor;
use nsxkit::{
    MergeStrategy, NsxClient, SecurityGroupController, SecurityPolicyController,
    ServiceController,
};
use std::collections::BTreeMap;

/// What a pass does with the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Converge the manager toward the manifest
    Apply,
    /// Read every bound entry, never mutate
    Refresh,
    /// Delete everything recorded in state
    Destroy,
}

/// Options for one pass
#[derive(Debug, Clone)]
pub struct Pass {
    pub mode: Mode,
    pub target: Target,
    /// Plan and report only
    pub dry_run: bool,
    pub merge_strategy: MergeStrategy,
    pub force_policy_delete: bool,
}

impl Pass {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            target: Target::default(),
            dry_run: false,
            merge_strategy: MergeStrategy::default(),
            force_policy_delete: false,
        }
    }
}

struct Run<'p> {
    target: Target,
    opts: ExecuteOptions,
    progress: &'p mut dyn ProgressCallback,
    summary: ExecuteSummary,
}

/// Run one pass, updating `state` in place
///
/// Removals run first, dependents before what they depend on (policies,
/// services, groups); declarations run in the opposite order so policies see
/// the ids of groups bound earlier in the same pass. Only an invalid manifest
/// fails the whole pass; per-resource failures land in the summary.
pub fn run<E: Executor>(
    client: &NsxClient<E>,
    manifest: &Manifest,
    state: &mut State,
    pass: &Pass,
    progress: &mut dyn ProgressCallback,
) -> Result<ExecuteSummary> {
    let groups = SecurityGroupController::new(client).with_strategy(pass.merge_strategy);
    let services = ServiceController::new(client);
    let policies =
        SecurityPolicyController::new(client).with_force_delete(pass.force_policy_delete);

    let mut run = Run {
        target: pass.target.clone(),
        opts: ExecuteOptions {
            dry_run: pass.dry_run,
            refresh_only: pass.mode == Mode::Refresh,
        },
        progress,
        summary: ExecuteSummary::default(),
    };

    match pass.mode {
        Mode::Refresh => {
            observe(&groups, &mut state.security_groups, &mut run);
            observe(&services, &mut state.services, &mut run);
            observe(&policies, &mut state.security_policies, &mut run);
        }
        Mode::Destroy => {
            remove(&policies, &mut state.security_policies, |_| false, &mut run);
            remove(&services, &mut state.services, |_| false, &mut run);
            remove(&groups, &mut state.security_groups, |_| false, &mut run);
        }
        Mode::Apply => {
            let declared_groups = planner::security_groups(manifest, state)?;
            let declared_services = planner::services(manifest);
            let declared_policies = &manifest.security_policy;

            remove(
                &policies,
                &mut state.security_policies,
                |label| declared_policies.contains_key(label),
                &mut run,
            );
            remove(
                &services,
                &mut state.services,
                |label| declared_services.contains_key(label),
                &mut run,
            );
            remove(
                &groups,
                &mut state.security_groups,
                |label| declared_groups.contains_key(label),
                &mut run,
            );

            declare(&groups, &mut state.security_groups, &declared_groups, &mut run);
            declare(&services, &mut state.services, &declared_services, &mut run);
            let declared_policies = planner::security_policies(manifest, state, pass.dry_run);
            declare(&policies, &mut state.security_policies, &declared_policies, &mut run);
        }
    }

    log::debug!(
        "{:?} pass done: {} resources, {} changes, {} failed",
        pass.mode,
        run.summary.total(),
        run.summary.total_changes(),
        run.summary.failed
    );
    Ok(run.summary)
}

type Entries<C> = BTreeMap<String, Entry<<C as Controller>::Desired, <C as Controller>::Observed>>;

/// Delete entries whose label is no longer declared
fn remove<C: Controller>(
    controller: &C,
    entries: &mut Entries<C>,
    declared: impl Fn(&str) -> bool,
    run: &mut Run<'_>,
) {
    let labels = entries
        .keys()
        .filter(|label| !declared(label))
        .cloned()
        .collect();
    visit(controller, entries, labels, &Declared::new(), run);
}

/// Converge every declared label
fn declare<C: Controller>(
    controller: &C,
    entries: &mut Entries<C>,
    declared: &Declared<C::Desired>,
    run: &mut Run<'_>,
) {
    let labels = declared.keys().cloned().collect();
    visit(controller, entries, labels, declared, run);
}

/// Read back every recorded entry
fn observe<C: Controller>(controller: &C, entries: &mut Entries<C>, run: &mut Run<'_>) {
    let labels = entries.keys().cloned().collect();
    visit(controller, entries, labels, &Declared::new(), run);
}

fn visit<C: Controller>(
    controller: &C,
    entries: &mut Entries<C>,
    labels: Vec<String>,
    declared: &Declared<C::Desired>,
    run: &mut Run<'_>,
) {
    let kind = controller.kind();
    let labels: Vec<String> = labels
        .into_iter()
        .filter(|label| run.target.matches(kind, label))
        .collect();
    if labels.is_empty() {
        return;
    }

    run.progress.on_batch_start(kind, labels.len());
    for label in labels {
        let address = format!("{}.{}", kind, label);
        let desired = match declared.get(&label) {
            Some(Ok(spec)) => Some(spec),
            Some(Err(reason)) => {
                log::error!("{}: {}", address, reason);
                let result = ApplyResult::Failed {
                    error: reason.clone(),
                };
                run.progress.on_resource_complete(&address, &result);
                run.summary.add_result(&result);
                continue;
            }
            None => None,
        };

        let converged = converge(
            controller,
            &address,
            entries.remove(&label),
            desired,
            &run.opts,
            &mut *run.progress,
        );
        run.summary.add_result(&converged.result);
        if let Some(entry) = converged.entry {
            entries.insert(label, entry);
        }
    }
    run.progress.on_batch_complete();
}
