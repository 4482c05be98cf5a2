//! Story generators and the daily jobs that upload them.
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use url::Url;

use crate::compose::{self, FontSet};
use crate::config::{self, Config};
use crate::demotivator::DemotivatorSource;
use crate::horoscope::HoroscopeClient;
use crate::instagram::{GraphApi, InstagramClient};
use crate::scheduler::{DailyAt, ScheduledJob};
use crate::screenshot::{self, BrowserScreenshotter, Screenshotter};
use crate::upload::{ImageGenerator, UploadSettings, Uploader};
use crate::used_ids::UsedIdTracker;

/// The daily jobs the bot knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum JobKind {
    Calendar,
    Horoscope,
    Demotivator,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Calendar, JobKind::Horoscope, JobKind::Demotivator];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Calendar => "calendar",
            JobKind::Horoscope => "horoscope",
            JobKind::Demotivator => "demotivator",
        }
    }

    pub fn rule<'a>(&self, schedule: &'a config::Schedule) -> &'a str {
        match self {
            JobKind::Calendar => &schedule.calendar,
            JobKind::Horoscope => &schedule.horoscope,
            JobKind::Demotivator => &schedule.demotivator,
        }
    }
}

pub struct CalendarGenerator {
    shooter: Arc<dyn Screenshotter>,
}

impl CalendarGenerator {
    pub fn new(shooter: Arc<dyn Screenshotter>) -> Self {
        Self { shooter }
    }
}

#[async_trait]
impl ImageGenerator for CalendarGenerator {
    async fn generate(&self, output_path: &Path) -> Result<()> {
        screenshot::compose_calendar_image(self.shooter.as_ref(), output_path).await
    }
}

/// Renders one page of today's horoscope. The entry is fetched per page.
pub struct HoroscopePageGenerator {
    client: HoroscopeClient,
    fonts: config::Fonts,
    page: usize,
}

impl HoroscopePageGenerator {
    pub fn new(client: HoroscopeClient, fonts: config::Fonts, page: usize) -> Self {
        Self { client, fonts, page }
    }
}

#[async_trait]
impl ImageGenerator for HoroscopePageGenerator {
    async fn generate(&self, output_path: &Path) -> Result<()> {
        let entry = self
            .client
            .current_entry()
            .await
            .context("failed to fetch horoscope")?;
        let page = compose::page(&entry, self.page)?;
        let fonts = self.fonts.clone();
        let path = output_path.to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let fonts = FontSet::load(&fonts)?;
            compose::compose_horoscope_page(&entry, &page, &path, &fonts)?;
            Ok(())
        })
        .await
        .context("render task failed")??;
        Ok(())
    }
}

pub struct DemotivatorGenerator {
    source: Arc<DemotivatorSource>,
}

impl DemotivatorGenerator {
    pub fn new(source: Arc<DemotivatorSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl ImageGenerator for DemotivatorGenerator {
    async fn generate(&self, output_path: &Path) -> Result<()> {
        let item = self.source.download_random_image(output_path).await?;
        info!(id = item.id, "demotivator story image ready");
        Ok(())
    }
}

/// A named list of stories uploaded one after another.
pub struct StoryJob {
    kind: JobKind,
    uploader: Arc<Uploader>,
    stories: Vec<(String, Arc<dyn ImageGenerator>)>,
}

impl StoryJob {
    pub fn new(kind: JobKind, uploader: Arc<Uploader>, stories: Vec<(String, Arc<dyn ImageGenerator>)>) -> Self {
        Self { kind, uploader, stories }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn stories(&self) -> &[(String, Arc<dyn ImageGenerator>)] {
        &self.stories
    }
}

#[async_trait]
impl ScheduledJob for StoryJob {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    #[instrument(skip_all)]
    async fn run(&self) -> Result<()> {
        for (label, generator) in &self.stories {
            self.uploader.upload(label, generator.as_ref()).await;
        }
        Ok(())
    }
}

/// Long-lived instances shared by all jobs, built once at startup.
pub struct Services {
    pub uploader: Arc<Uploader>,
    pub horoscope: HoroscopeClient,
    pub fonts: config::Fonts,
    pub demotivator: Arc<DemotivatorSource>,
    pub screenshotter: Arc<dyn Screenshotter>,
}

impl Services {
    pub fn from_config(cfg: &Config, cancel: CancellationToken) -> Result<Self> {
        let api: Arc<dyn GraphApi> =
            Arc::new(InstagramClient::from_config(cfg).context("invalid instagram.api_base")?);
        let uploader = Arc::new(Uploader::new(api, UploadSettings::from_config(cfg), cancel));
        Ok(Self {
            uploader,
            horoscope: HoroscopeClient::new(cfg.horoscope.api_url.clone()),
            fonts: cfg.horoscope.fonts.clone(),
            demotivator: Arc::new(demotivator_source(cfg)?),
            screenshotter: Arc::new(BrowserScreenshotter::from_config(&cfg.calendar)),
        })
    }

    /// Story labels and their generators, in upload order.
    pub fn stories(&self, kind: JobKind) -> Vec<(String, Arc<dyn ImageGenerator>)> {
        match kind {
            JobKind::Calendar => vec![(
                "calendar".to_string(),
                Arc::new(CalendarGenerator::new(Arc::clone(&self.screenshotter))) as Arc<dyn ImageGenerator>,
            )],
            JobKind::Horoscope => (1..=compose::TOTAL_PAGES)
                .map(|page| {
                    let generator = HoroscopePageGenerator::new(self.horoscope.clone(), self.fonts.clone(), page);
                    (format!("horoscope_{page}"), Arc::new(generator) as Arc<dyn ImageGenerator>)
                })
                .collect(),
            JobKind::Demotivator => vec![(
                "demotivator".to_string(),
                Arc::new(DemotivatorGenerator::new(Arc::clone(&self.demotivator))) as Arc<dyn ImageGenerator>,
            )],
        }
    }

    pub fn job(&self, kind: JobKind) -> StoryJob {
        StoryJob::new(kind, Arc::clone(&self.uploader), self.stories(kind))
    }
}

/// Build the demotivator source with the persisted used-id set.
pub fn demotivator_source(cfg: &Config) -> Result<DemotivatorSource> {
    let site_base = Url::parse(&cfg.demotivator.site_base).context("invalid demotivator.site_base")?;
    let tracker = UsedIdTracker::load(cfg.used_ids_path(), cfg.demotivator.max_id);
    Ok(DemotivatorSource::new(site_base, tracker, cfg.demotivator.max_attempts))
}

/// Parse every job's trigger rule.
pub fn triggers(schedule: &config::Schedule) -> Result<Vec<(JobKind, DailyAt)>> {
    JobKind::ALL
        .into_iter()
        .map(|kind| {
            let rule = kind.rule(schedule);
            let at = DailyAt::parse(rule).with_context(|| format!("invalid schedule.{}: {rule:?}", kind.as_str()))?;
            Ok((kind, at))
        })
        .collect()
}
