use crate::Context;
use crate::cli::TargetArgs;
use crate::commands;
use crate::engine::{self, Mode};
use crate::progress::Spinner;
use crate::schema::Manifest;
use crate::state::State;
use crate::ui;
use anyhow::Result;

pub fn run(ctx: &Context, args: TargetArgs) -> Result<()> {
    let config = commands::load_config(ctx)?;
    let mut state = State::load(&ctx.state)?;
    let pass = commands::pass(Mode::Refresh, args.target.as_deref(), &config);

    if !ctx.quiet {
        ui::header("Refresh");
    }
    if state.is_empty() {
        ui::info(&format!("No resources recorded in {}", ctx.state.display()));
        return Ok(());
    }

    let client = commands::connect(&config)?;
    let mut spinner = Spinner::new(ctx.quiet);
    let summary = engine::run(&client, &Manifest::default(), &mut state, &pass, &mut spinner)?;

    state.save(&ctx.state)?;
    commands::print_summary(&summary, "Refresh");
    commands::finish(&summary)
}
