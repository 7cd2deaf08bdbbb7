use crate::Context;
use crate::cli::ApplyArgs;
use crate::commands::{self, Prompt};
use crate::engine::Mode;
use crate::schema::Manifest;
use crate::state::State;
use crate::ui;
use anyhow::Result;
use declarative::{AutoConfirm, ConfirmCallback};

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let config = commands::load_config(ctx)?;
    let manifest = Manifest::load(&ctx.manifest)?;
    let mut state = State::load(&ctx.state)?;
    let pass = commands::pass(Mode::Apply, args.target.as_deref(), &config);

    if !ctx.quiet {
        ui::header("Apply");
        if ctx.verbose > 0 {
            ui::kv("manifest", &ctx.manifest.display().to_string());
            ui::kv("state", &ctx.state.display().to_string());
        }
    }

    if manifest.is_empty() && !state.is_empty() {
        ui::warn("Manifest declares no resources; everything in state will be removed");
    }

    if args.dry_run {
        let plan = commands::preview(&manifest, &state, &pass, ctx.quiet)?;
        if plan.actions().is_empty() {
            ui::success("Nothing to do");
        }
        println!();
        ui::info("Dry run - no changes made");
        return Ok(());
    }

    let client = commands::connect(&config)?;
    let mut confirm: Box<dyn ConfirmCallback> = if args.yes {
        Box::new(AutoConfirm)
    } else {
        Box::new(Prompt::new(true))
    };

    let Some(summary) = commands::execute(
        &client,
        &manifest,
        &mut state,
        &pass,
        confirm.as_mut(),
        ctx.quiet,
    )?
    else {
        return Ok(());
    };

    state.save(&ctx.state)?;
    commands::print_summary(&summary, "Apply");
    commands::finish(&summary)
}
