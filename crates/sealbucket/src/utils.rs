use colored::Colorize;
use sealbucket_cloud::{ActionType, CloudProvider, MemoryProvider, Plan, StateManager};
use sealbucket_cloud_aws::AwsProvider;
use sealbucket_config::{ProviderKind, StackSettings};
use std::collections::BTreeMap;
use std::path::Path;

/// Build the provider selected by the settings
pub async fn build_provider(settings: &StackSettings) -> Box<dyn CloudProvider> {
    match settings.provider {
        ProviderKind::Aws => Box::new(
            AwsProvider::from_env(settings.region.clone(), settings.profile.clone()).await,
        ),
        ProviderKind::Memory => Box::new(
            settings
                .fail_on
                .iter()
                .fold(MemoryProvider::new(), |provider, name| provider.fail_on(name.clone())),
        ),
    }
}

pub fn state_manager(project_root: &Path, settings: &StackSettings) -> StateManager {
    StateManager::new(project_root, &settings.stack)
}

/// Fail early when the provider has no usable credentials
pub async fn ensure_authenticated(provider: &dyn CloudProvider) -> anyhow::Result<()> {
    let auth = provider.check_auth().await?;
    if !auth.authenticated {
        anyhow::bail!(
            "{} is not authenticated: {}",
            provider.display_name(),
            auth.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    if let Some(account) = auth.account_info {
        println!("  Provider: {} ({})", provider.display_name().cyan(), account);
    }
    Ok(())
}

pub fn print_header(action: &str, settings: &StackSettings) {
    println!(
        "{}",
        format!("{} stack '{}'...", action, settings.stack)
            .blue()
            .bold()
    );
}

/// Print each action of a plan
pub fn print_plan(plan: &Plan) {
    println!();
    for action in &plan.actions {
        let line = format!(
            "  {} {:<28} {}",
            action.action_type.symbol(),
            action.name,
            action.resource_type
        );
        let line = match action.action_type {
            ActionType::Create => line.green(),
            ActionType::Update => line.yellow(),
            ActionType::Delete => line.red(),
            ActionType::NoOp => line.dimmed(),
        };
        if action.changed_fields.is_empty() {
            println!("{}", line);
        } else {
            println!("{}  [{}]", line, action.changed_fields.join(", "));
        }
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
}

/// Render an output value the way a shell user expects it
pub fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn print_outputs(outputs: &BTreeMap<String, serde_json::Value>) {
    if outputs.is_empty() {
        return;
    }
    println!();
    println!("{}", "Outputs:".bold());
    for (name, value) in outputs {
        println!("  {:<14} {}", name.cyan(), display_value(value));
    }
}
