pub mod apply;
pub mod destroy;
pub mod plan;
pub mod refresh;

use crate::Context;
use crate::config::Config;
use crate::engine::{self, Mode, Offline, Pass, ReadOnly};
use crate::progress::{PlanPrinter, Spinner};
use crate::schema::Manifest;
use crate::state::State;
use crate::ui;
use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{ConfirmCallback, ExecuteSummary, NoProgress, Target};
use nsxkit::NsxClient;
use nsxkit::backend::Executor;
use nsxkit::backend::http::HttpExecutor;

// ============================================================================
// Loading
// ============================================================================

/// Load config and layer command-line overrides on top
pub fn load_config(ctx: &Context) -> Result<Config> {
    let config = Config::load(ctx.config.as_deref())?;
    Ok(config.with_overrides(&ctx.overrides))
}

/// Build a client for the configured manager
pub fn connect(config: &Config) -> Result<NsxClient<HttpExecutor>> {
    let conn = config.connection()?;
    log::debug!("Connecting to {} as {}", conn.url, conn.username);
    Ok(NsxClient::new(HttpExecutor::with_timeout(
        conn.url,
        &conn.username,
        &conn.password,
        conn.timeout,
    )))
}

/// Pass options from the command line and config
pub fn pass(mode: Mode, target: Option<&str>, config: &Config) -> Pass {
    Pass {
        target: target.map(Target::parse).unwrap_or_default(),
        merge_strategy: config.merge_strategy,
        force_policy_delete: config.force_policy_delete,
        ..Pass::new(mode)
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Interactive confirmation through dialoguer
pub struct Prompt {
    default: bool,
}

impl Prompt {
    pub fn new(default: bool) -> Self {
        Self { default }
    }
}

impl ConfirmCallback for Prompt {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        use dialoguer::Confirm;

        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(self.default)
            .interact()?;

        Ok(confirmed)
    }
}

/// Print the plan of a pass without contacting the manager
pub fn preview(
    manifest: &Manifest,
    state: &State,
    pass: &Pass,
    quiet: bool,
) -> Result<PlanPrinter> {
    let client = NsxClient::new(Offline);
    let mut scratch = state.clone();
    let mut printer = PlanPrinter::new(quiet);
    let dry = Pass {
        dry_run: true,
        ..pass.clone()
    };

    engine::run(&client, manifest, &mut scratch, &dry, &mut printer)?;

    if !quiet && !printer.actions().is_empty() {
        println!();
        ui::info(&format!("Plan: {}", printer.tally()));
    }
    Ok(printer)
}

/// Count the writes a pass would send, reading the manager but never writing
pub fn drift<E: Executor>(
    client: &NsxClient<E>,
    manifest: &Manifest,
    state: &State,
    pass: &Pass,
) -> Result<usize> {
    let guarded = NsxClient::new(ReadOnly::new(client.executor()));
    let mut scratch = state.clone();
    engine::run(&guarded, manifest, &mut scratch, pass, &mut NoProgress)?;
    Ok(guarded.executor().held().len())
}

/// Preview a pass, confirm it when it would change the manager, then run it
///
/// A plan with no declared change is checked against the manager first, so
/// correcting remote drift asks for confirmation too. Returns `None` when
/// nothing was targeted or the user declined.
pub fn execute<E: Executor>(
    client: &NsxClient<E>,
    manifest: &Manifest,
    state: &mut State,
    pass: &Pass,
    confirm: &mut dyn ConfirmCallback,
    quiet: bool,
) -> Result<Option<ExecuteSummary>> {
    let plan = preview(manifest, state, pass, quiet)?;
    if plan.actions().is_empty() && plan.failures() == 0 {
        ui::success("Nothing to do");
        return Ok(None);
    }

    let drifted = if plan.mutations() == 0 {
        drift(client, manifest, state, pass)?
    } else {
        0
    };
    if drifted > 0 && !quiet {
        println!();
        ui::warn(&format!("{} changes needed to correct drift on the manager", drifted));
    }

    if plan.mutations() > 0 || drifted > 0 {
        println!();
        if !confirm.confirm("Continue?")? {
            println!();
            println!("  {} Aborted", "✗".red());
            return Ok(None);
        }
    }

    let mut spinner = Spinner::new(quiet);
    let summary = engine::run(client, manifest, state, pass, &mut spinner)?;
    Ok(Some(summary))
}

/// Print the outcome of a pass
pub fn print_summary(summary: &ExecuteSummary, what: &str) {
    println!();
    if summary.is_success() {
        println!("  {} {} completed successfully!", "✓".green().bold(), what);
    } else {
        println!("  {} {} completed with errors", "⚠".yellow().bold(), what);
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.adopted > 0 {
        println!("    • {} existing resources adopted", summary.adopted);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.cleared > 0 {
        println!("    • {} resources gone remotely", summary.cleared);
    }
    if summary.no_change > 0 {
        println!("    • {} resources in sync", summary.no_change);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}

/// Turn failed resources into a non-zero exit
pub fn finish(summary: &ExecuteSummary) -> Result<()> {
    if !summary.is_success() {
        bail!("{} of {} resources failed", summary.failed, summary.total());
    }
    Ok(())
}
