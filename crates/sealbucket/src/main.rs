mod commands;
mod program;
mod utils;

use clap::{Parser, Subcommand};
use sealbucket_config::ProviderKind;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sealbucket")]
#[command(about = "KMS-encrypted, versioned, private S3 bucket in one command", long_about = None)]
struct Cli {
    /// Stack name (selects the state file)
    #[arg(short, long, global = true, env = "SEALBUCKET_STACK")]
    stack: Option<String>,

    /// Provider backing the stack (aws, memory)
    #[arg(short, long, global = true, env = "SEALBUCKET_PROVIDER")]
    provider: Option<ProviderKind>,

    /// Resource names the memory provider rejects (comma separated)
    #[arg(
        long,
        global = true,
        env = "SEALBUCKET_MEMORY_FAIL",
        value_delimiter = ',',
        hide = true
    )]
    memory_fail: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update the key, alias, bucket and access block
    Up {
        /// Apply the changes (without this only the plan is shown)
        #[arg(short, long)]
        yes: bool,
    },
    /// Show what `up` would change
    Preview,
    /// Delete every resource of the stack
    Destroy {
        /// Apply the deletion (without this only the plan is shown)
        #[arg(short, long)]
        yes: bool,
    },
    /// Print stack outputs
    Output {
        /// Output name (all outputs when omitted)
        name: Option<String>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries command output; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if matches!(cli.command, Commands::Version) {
        println!("sealbucket {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut settings =
        sealbucket_config::load_settings()?.with_overrides(cli.stack, cli.provider)?;
    if !cli.memory_fail.is_empty() {
        settings.fail_on = cli.memory_fail;
    }
    let project_root = std::env::current_dir()?;
    tracing::debug!(stack = %settings.stack, provider = %settings.provider, "settings loaded");

    match cli.command {
        Commands::Up { yes } => commands::up::handle(&settings, &project_root, yes).await?,
        Commands::Preview => commands::preview::handle(&settings, &project_root).await?,
        Commands::Destroy { yes } => {
            commands::destroy::handle(&settings, &project_root, yes).await?
        }
        Commands::Output { name, json } => {
            commands::output::handle(&settings, &project_root, name, json).await?
        }
        Commands::Version => {}
    }

    Ok(())
}
