use anyhow::{bail, Context, Result};
use chrono::{Datelike, Local};
use clap::Parser;
use std::path::PathBuf;
use storybot::config;
use storybot::jobs::{JobKind, Services};
use storybot::upload::story_file_name;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about = "Run one story job immediately")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Job to run
    #[arg(long, value_enum)]
    job: JobKind,

    /// Only generate the images into the data dir, skip the upload
    #[arg(long, default_value_t = false)]
    dry_run: bool,
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
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let services = Services::from_config(&cfg, cancel)?;
    let weekday = Local::now().weekday();
    let mut failed = 0;
    for (label, generator) in services.stories(args.job) {
        if args.dry_run {
            let path = cfg.data_dir().join(story_file_name(&label, weekday));
            match generator.generate(&path).await {
                Ok(()) => println!("{label}: {}", path.display()),
                Err(err) => {
                    let message = format!("{err:#}");
                    error!(%label, error = %message, "generation failed");
                    failed += 1;
                }
            }
            continue;
        }
        match services.uploader.try_upload_on(&label, weekday, generator.as_ref()).await {
            Ok(published) => println!("{label}: published media {}", published.media_id),
            Err(err) => {
                error!(%label, error = %err, "upload failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} {} story upload(s) failed", args.job.as_str());
    }
    info!(job = args.job.as_str(), dry_run = args.dry_run, "done");
    Ok(())
}
