use crate::utils;
use sealbucket_config::StackSettings;
use std::path::Path;

pub async fn handle(
    settings: &StackSettings,
    project_root: &Path,
    name: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let store = utils::state_manager(project_root, settings);
    let state = store.load().await?;

    match name {
        Some(name) => {
            let value = state.outputs.get(&name).ok_or_else(|| {
                let available: Vec<_> = state.outputs.keys().collect();
                anyhow::anyhow!(
                    "Output '{}' not found in stack '{}'. Available: {:?}",
                    name,
                    settings.stack,
                    available
                )
            })?;
            if json {
                println!("{}", serde_json::to_string_pretty(value)?);
            } else {
                println!("{}", utils::display_value(value));
            }
        }
        None => {
            if json {
                println!("{}", serde_json::to_string_pretty(&state.outputs)?);
            } else if state.outputs.is_empty() {
                println!("No outputs in stack '{}'", settings.stack);
            } else {
                for (name, value) in &state.outputs {
                    println!("{}: {}", name, utils::display_value(value));
                }
            }
        }
    }
    Ok(())
}
