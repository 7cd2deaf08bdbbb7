use crate::Context;
use crate::cli::TargetArgs;
use crate::commands;
use crate::engine::Mode;
use crate::schema::Manifest;
use crate::state::State;
use crate::ui;
use anyhow::{Result, bail};

pub fn run(ctx: &Context, args: TargetArgs) -> Result<()> {
    let config = commands::load_config(ctx)?;
    let manifest = Manifest::load(&ctx.manifest)?;
    let state = State::load(&ctx.state)?;
    let pass = commands::pass(Mode::Apply, args.target.as_deref(), &config);

    if !ctx.quiet {
        ui::header("Plan");
        if ctx.verbose > 0 {
            ui::kv("manifest", &ctx.manifest.display().to_string());
            ui::kv("state", &ctx.state.display().to_string());
            if let Some(updated) = state.last_updated {
                ui::kv("state saved", &updated.to_rfc3339());
            }
        }
    }

    let plan = commands::preview(&manifest, &state, &pass, ctx.quiet)?;
    if plan.failures() > 0 {
        bail!("{} resources cannot be planned", plan.failures());
    }
    if plan.mutations() == 0 {
        println!();
        ui::success("No declared changes. Apply still checks the manager for drift.");
    } else {
        println!();
        ui::dim("Run `nsxctl apply` to make these changes.");
    }
    Ok(())
}
