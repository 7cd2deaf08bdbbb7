//! Progress reporting for converge passes.
//!
//! [`Spinner`] drives an indicatif spinner while a resource converges;
//! [`PlanPrinter`] prints the planned actions of a dry pass and tallies them.

use crate::ui;
use colored::Colorize;
use declarative::{Action, ApplyResult, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("  {spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

// ============================================================================
// Spinner
// ============================================================================

/// Live progress for a pass that talks to the manager
pub struct Spinner {
    bar: Option<ProgressBar>,
    quiet: bool,
}

impl Spinner {
    pub fn new(quiet: bool) -> Self {
        Self { bar: None, quiet }
    }
}

impl ProgressCallback for Spinner {
    fn on_batch_start(&mut self, kind: &str, count: usize) {
        if !self.quiet {
            ui::section(&format!("{} ({})", kind, count));
        }
    }

    fn on_resource_start(&mut self, address: &str, action: &Action) {
        if self.quiet {
            return;
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.set_message(format!("{} {}", action, address));
        bar.enable_steady_tick(Duration::from_millis(80));
        self.bar = Some(bar);
    }

    fn on_resource_complete(&mut self, address: &str, result: &ApplyResult) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }

        if self.quiet {
            if let ApplyResult::Failed { error } = result {
                ui::error(&format!("{}: {}", address, error));
            }
            return;
        }

        let detail = ui::describe_result(result);
        let detail = match result {
            ApplyResult::NoChange => detail.dimmed(),
            ApplyResult::Failed { .. } => detail.red(),
            _ => detail.normal(),
        };
        println!("  {} {} {}", ui::result_marker(result), address, detail);
    }

    fn on_batch_complete(&mut self) {}
}

// ============================================================================
// Plan Printer
// ============================================================================

/// Prints the actions of a dry pass and keeps count
#[derive(Default)]
pub struct PlanPrinter {
    actions: Vec<(String, Action)>,
    failures: usize,
    quiet: bool,
}

impl PlanPrinter {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            ..Default::default()
        }
    }

    /// Planned actions, in pass order
    pub fn actions(&self) -> &[(String, Action)] {
        &self.actions
    }

    /// Number of actions that may change remote objects
    pub fn mutations(&self) -> usize {
        self.actions.iter().filter(|(_, a)| a.is_mutation()).count()
    }

    /// Resources that could not even be planned
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// One-line tally, e.g. "2 to create, 1 to update, 0 to replace, 1 to delete"
    pub fn tally(&self) -> String {
        let count = |f: fn(&Action) -> bool| self.actions.iter().filter(|(_, a)| f(a)).count();
        format!(
            "{} to create, {} to update, {} to replace, {} to delete",
            count(|a| matches!(a, Action::Create)),
            count(|a| matches!(a, Action::Update { changed: true })),
            count(|a| matches!(a, Action::Replace)),
            count(|a| matches!(a, Action::Delete)),
        )
    }
}

impl ProgressCallback for PlanPrinter {
    fn on_batch_start(&mut self, kind: &str, _count: usize) {
        if !self.quiet {
            ui::section(kind);
        }
    }

    fn on_resource_start(&mut self, address: &str, action: &Action) {
        self.actions.push((address.to_string(), *action));
        if !self.quiet {
            println!(
                "  {} {} {}",
                ui::action_marker(action),
                address,
                format!("({})", action).dimmed()
            );
        }
    }

    fn on_resource_complete(&mut self, address: &str, result: &ApplyResult) {
        if let ApplyResult::Failed { error } = result {
            self.failures += 1;
            ui::error(&format!("{}: {}", address, error));
        }
    }

    fn on_batch_complete(&mut self) {}
}
