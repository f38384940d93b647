use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sanebot_workers::SystemHost;
use sanebotd::config::{env_key, load_key_values, AgentConfig};
use sanebotd::publish::RestSink;
use sanebotd::Agent;

#[derive(Parser)]
#[command(name = "sanebotd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Automated sanity review for Gerrit-style review servers", long_about = None)]
struct Cli {
    /// Path to the key=value configuration file
    #[arg(short, long, env = "SANEBOT_CONFIG")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Only add reviewers, never post verdicts
    #[arg(long)]
    invite_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let values = load_key_values(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let mut config = AgentConfig::from_lookup(|key| {
        std::env::var(env_key(key))
            .ok()
            .or_else(|| values.get(key).cloned())
    })?;
    if cli.verbose {
        config.verbose = true;
    }
    if cli.invite_only {
        config.invite_only = true;
    }

    let default_filter = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    tracing::info!(
        host = %config.ssh_host,
        workers = config.workers.len(),
        "sanebotd starting"
    );

    let sink = Arc::new(RestSink::new(
        config.rest_url.clone(),
        config.rest_user.clone(),
        config.rest_password.clone(),
    ));
    Agent::new(config, Arc::new(SystemHost), sink).run().await
}
