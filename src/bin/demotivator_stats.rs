use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use storybot::config;
use storybot::jobs::demotivator_source;
use storybot::used_ids::UsedIdTracker;

#[derive(Debug, Parser)]
#[command(author, version, about = "Show used demotivator id statistics")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Also pick one random unused page and print its image URL (marks it used)
    #[arg(long, default_value_t = false)]
    resolve: bool,

    /// Forget every used id and delete the persisted file
    #[arg(long, default_value_t = false, conflicts_with = "resolve")]
    reset: bool,
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

    let path = cfg.used_ids_path();
    let mut tracker = UsedIdTracker::load(&path, cfg.demotivator.max_id);
    println!("File: {}", path.display());
    println!("Used: {}", tracker.stats());

    if args.reset {
        tracker.reset();
        println!("Reset: {}", tracker.stats());
        return Ok(());
    }

    if args.resolve {
        let source = demotivator_source(&cfg)?;
        let item = source.random_asset_url().await?;
        println!(
            "Id {}: {}",
            item.id,
            item.resolved_asset_url.as_deref().unwrap_or("-")
        );
        println!("Used: {}", source.stats().await);
    }
    Ok(())
}
