use crate::program;
use crate::utils;
use colored::Colorize;
use sealbucket_cloud::{CloudProvider, Context, RunMode, RunReport, StateManager};
use sealbucket_config::StackSettings;
use std::path::Path;

/// Run the program against the stored state without touching anything
pub async fn run_preview(
    provider: &dyn CloudProvider,
    store: &StateManager,
) -> anyhow::Result<RunReport> {
    let state = store.load().await?;
    let mut ctx = Context::new(provider, state, RunMode::Preview);
    let outcome = program::run(&mut ctx).await;
    Ok(ctx.finish(outcome).await)
}

pub async fn handle(settings: &StackSettings, project_root: &Path) -> anyhow::Result<()> {
    utils::print_header("Previewing", settings);

    let provider = utils::build_provider(settings).await;
    let store = utils::state_manager(project_root, settings);

    let report = run_preview(provider.as_ref(), &store).await?;
    utils::print_plan(&report.plan);

    if let Some(e) = report.error {
        return Err(e.into());
    }

    utils::print_outputs(&report.outputs);
    if !report.plan.has_changes() {
        println!();
        println!("{}", "✓ Stack is up to date".green());
    }
    Ok(())
}
