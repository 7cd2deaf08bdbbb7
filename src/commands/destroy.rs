use crate::Context;
use crate::cli::DestroyArgs;
use crate::commands::{self, Prompt};
use crate::engine::Mode;
use crate::schema::Manifest;
use crate::state::State;
use crate::ui;
use anyhow::Result;
use declarative::{AutoConfirm, ConfirmCallback};

pub fn run(ctx: &Context, args: DestroyArgs) -> Result<()> {
    let config = commands::load_config(ctx)?;
    let mut state = State::load(&ctx.state)?;
    let pass = commands::pass(Mode::Destroy, args.target.as_deref(), &config);

    if !ctx.quiet {
        ui::header("Destroy");
    }
    if state.is_empty() {
        ui::info(&format!("No resources recorded in {}", ctx.state.display()));
        return Ok(());
    }

    let client = commands::connect(&config)?;
    let mut confirm: Box<dyn ConfirmCallback> = if args.yes {
        Box::new(AutoConfirm)
    } else {
        ui::warn("Owned resources will be deleted from the manager");
        Box::new(Prompt::new(false))
    };

    let Some(summary) = commands::execute(
        &client,
        &Manifest::default(),
        &mut state,
        &pass,
        confirm.as_mut(),
        ctx.quiet,
    )?
    else {
        return Ok(());
    };

    state.save(&ctx.state)?;
    commands::print_summary(&summary, "Destroy");
    commands::finish(&summary)
}
