use crate::utils;
use colored::Colorize;
use sealbucket_cloud::{Context, RunMode};
use sealbucket_config::StackSettings;
use std::path::Path;

pub async fn handle(settings: &StackSettings, project_root: &Path, yes: bool) -> anyhow::Result<()> {
    utils::print_header("Destroying", settings);

    let provider = utils::build_provider(settings).await;
    let store = utils::state_manager(project_root, settings);

    if !yes {
        let state = store.load().await?;
        if state.is_empty() {
            println!("  Nothing to destroy");
            return Ok(());
        }
        let report = Context::new(provider.as_ref(), state, RunMode::Preview)
            .destroy()
            .await;
        utils::print_plan(&report.plan);
        if let Some(e) = report.error {
            return Err(e.into());
        }
        println!();
        println!(
            "{}",
            "⚠ This deletes the bucket and schedules the KMS key for deletion."
                .red()
                .bold()
        );
        println!("  Re-run with {} to proceed.", "--yes".cyan());
        return Ok(());
    }

    utils::ensure_authenticated(provider.as_ref()).await?;
    let lock = store.acquire_lock().await?;
    let state = store.load().await?;

    let report = Context::new(provider.as_ref(), state, RunMode::Update)
        .with_checkpoints(&store)
        .destroy()
        .await;

    lock.release().await?;
    utils::print_plan(&report.plan);

    if let Some(e) = report.error {
        eprintln!(
            "{} {} resource(s) remain in {}",
            "Destroy failed.".red().bold(),
            report.state.resources.len(),
            store.state_path().display()
        );
        return Err(e.into());
    }

    println!();
    println!(
        "{}",
        format!("✓ Stack '{}' destroyed", settings.stack)
            .green()
            .bold()
    );
    Ok(())
}
