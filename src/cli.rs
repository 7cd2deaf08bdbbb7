use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "nsxctl")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(
    about = "Declarative reconciliation of NSX security groups, services and security policies",
    long_about = None
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file [default: ~/.config/nsxctl/config.toml]
    #[arg(long, global = true, env = "NSXCTL_CONFIG")]
    pub config: Option<String>,

    /// Manifest declaring the desired resources
    #[arg(short, long, global = true, default_value = "nsx.toml")]
    pub manifest: String,

    /// State file recording bound resources
    #[arg(long, global = true, default_value = "nsxctl.state.json")]
    pub state: String,

    /// NSX manager URL
    #[arg(long, global = true, env = "NSX_URL")]
    pub url: Option<String>,

    /// NSX manager user
    #[arg(long, global = true, env = "NSX_USERNAME")]
    pub username: Option<String>,

    /// NSX manager password
    #[arg(long, global = true, env = "NSX_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would do (no manager calls)
    Plan(TargetArgs),

    /// Converge the manager toward the manifest
    Apply(ApplyArgs),

    /// Re-read every bound resource and update state
    Refresh(TargetArgs),

    /// Delete every resource recorded in state
    Destroy(DestroyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct TargetArgs {
    /// Limit to a kind or a single resource (e.g. security_group, service.https)
    #[arg(short, long)]
    pub target: Option<String>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Limit to a kind or a single resource (e.g. security_group, service.https)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show the plan without changing anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct DestroyArgs {
    /// Limit to a kind or a single resource (e.g. security_policy.web)
    #[arg(short, long)]
    pub target: Option<String>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "nsxctl",
            "-vv",
            "--manifest",
            "prod.toml",
            "apply",
            "--target",
            "security_group.web",
            "--yes",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.manifest, "prod.toml");
        assert_eq!(cli.state, "nsxctl.state.json");
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.target.as_deref(), Some("security_group.web"));
                assert!(args.yes);
                assert!(!args.dry_run);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["nsxctl", "plan", "-q", "--state", "/tmp/s.json"]).unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.state, "/tmp/s.json");
        assert!(matches!(cli.command, Command::Plan(TargetArgs { target: None })));
    }
}
