use colored::{ColoredString, Colorize};
use declarative::{Action, ApplyResult};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Plan and Result Rendering
// ============================================================================

/// Colored plan marker for an action
pub fn action_marker(action: &Action) -> ColoredString {
    let symbol = action.symbol();
    match action {
        Action::Create => symbol.green().bold(),
        Action::Update { changed: true } => symbol.yellow().bold(),
        Action::Replace => symbol.magenta().bold(),
        Action::Delete => symbol.red().bold(),
        Action::Update { changed: false } | Action::Refresh | Action::Forget => symbol.dimmed(),
    }
}

/// Colored marker for a finished resource
pub fn result_marker(result: &ApplyResult) -> ColoredString {
    match result {
        ApplyResult::Created | ApplyResult::Adopted | ApplyResult::Modified => "✓".green(),
        ApplyResult::Removed => "-".red(),
        ApplyResult::NoChange => "=".dimmed(),
        ApplyResult::Cleared | ApplyResult::Skipped { .. } => "⚠".yellow(),
        ApplyResult::Failed { .. } => "✗".red(),
    }
}

/// Short description of a finished resource
pub fn describe_result(result: &ApplyResult) -> String {
    match result {
        ApplyResult::NoChange => "in sync".to_string(),
        ApplyResult::Created => "created".to_string(),
        ApplyResult::Adopted => "adopted existing object".to_string(),
        ApplyResult::Modified => "updated".to_string(),
        ApplyResult::Removed => "deleted".to_string(),
        ApplyResult::Cleared => "gone remotely, dropped from state".to_string(),
        ApplyResult::Skipped { reason } => format!("skipped: {}", reason),
        ApplyResult::Failed { error } => format!("failed: {}", error),
    }
}
