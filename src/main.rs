use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use storybot::config;
use storybot::jobs::{self, Services};
use storybot::scheduler::JobScheduler;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let cancel = CancellationToken::new();
    let services = Services::from_config(&cfg, cancel.clone())?;

    let mut scheduler = JobScheduler::new();
    for (kind, at) in jobs::triggers(&cfg.schedule)? {
        scheduler.register(at, Arc::new(services.job(kind)));
    }
    let used_ids = services.demotivator.stats().await;
    info!(data_dir = %cfg.app.data_dir, %used_ids, "starting story bot");
    let handle = scheduler.run(cancel.clone());

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutting down");
    cancel.cancel();
    if let Err(err) = handle.await {
        error!(?err, "scheduler task failed");
    }
    Ok(())
}
