use crate::commands::preview;
use crate::program;
use crate::utils;
use colored::Colorize;
use sealbucket_cloud::{Context, ResourceStatus, RunMode};
use sealbucket_config::StackSettings;
use std::path::Path;

pub async fn handle(settings: &StackSettings, project_root: &Path, yes: bool) -> anyhow::Result<()> {
    utils::print_header("Updating", settings);

    let provider = utils::build_provider(settings).await;
    utils::ensure_authenticated(provider.as_ref()).await?;
    let store = utils::state_manager(project_root, settings);

    if !yes {
        let report = preview::run_preview(provider.as_ref(), &store).await?;
        utils::print_plan(&report.plan);
        if let Some(e) = report.error {
            return Err(e.into());
        }
        if report.plan.has_changes() {
            println!();
            println!("Re-run with {} to apply these changes.", "--yes".cyan());
        }
        return Ok(());
    }

    let lock = store.acquire_lock().await?;
    let state = store.load().await?;

    let mut ctx = Context::new(provider.as_ref(), state, RunMode::Update).with_checkpoints(&store);
    let outcome = program::run(&mut ctx).await;
    let report = ctx.finish(outcome).await;

    lock.release().await?;
    utils::print_plan(&report.plan);

    if let Some(e) = report.error {
        eprintln!(
            "{} {} resource(s) recorded in {}",
            "Update failed.".red().bold(),
            report.state.resources.len(),
            store.state_path().display()
        );
        for resource in report
            .state
            .resources
            .values()
            .filter(|r| r.status != ResourceStatus::Ready)
        {
            eprintln!("  {} {} ({})", "!".red(), resource.key(), resource.status);
        }
        return Err(e.into());
    }

    utils::print_outputs(&report.outputs);
    println!();
    println!(
        "{}",
        format!(
            "✓ Stack '{}' updated in {}ms",
            settings.stack, report.result.duration_ms
        )
        .green()
        .bold()
    );
    Ok(())
}
