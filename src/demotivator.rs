//! Random demotivational image source.
//!
//! Pages on the content site are addressed by a bounded integer id. Each page
//! is scraped for its thumbnail, which is mapped to the full-size image URL.
//! The set of ids already posted is owned here, behind a mutex, so one
//! process never races itself on the persisted file.
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::error::ContentError;
use crate::model::ContentItem;
use crate::used_ids::{UsageStats, UsedIdTracker};

static THUMB_IMG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img[^>]+src="([^"]*media/demotivators/thumb/[^"]+)""#).unwrap());

pub struct DemotivatorSource {
    http: Client,
    site_base: Url,
    max_attempts: u32,
    tracker: Mutex<UsedIdTracker>,
}

impl std::fmt::Debug for DemotivatorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemotivatorSource")
            .field("site_base", &self.site_base)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// Find the first thumbnail image on a page and turn it into an absolute
/// full-resolution URL.
pub fn extract_asset_url(html: &str, site_base: &Url) -> Option<String> {
    let caps = THUMB_IMG_RE.captures(html)?;
    let thumb = caps.get(1)?.as_str();
    let full = thumb.replacen("/thumb/", "/", 1);
    if full.starts_with("http://") || full.starts_with("https://") {
        return Some(full);
    }
    if let Some(rest) = full.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    site_base.join(full.trim_start_matches('/')).ok().map(|u| u.to_string())
}

impl DemotivatorSource {
    pub fn new(site_base: Url, tracker: UsedIdTracker, max_attempts: u32) -> Self {
        let http = Client::builder()
            .user_agent("storybot/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            site_base,
            max_attempts: max_attempts.max(1),
            tracker: Mutex::new(tracker),
        }
    }

    pub async fn stats(&self) -> UsageStats {
        self.tracker.lock().await.stats()
    }

    fn page_url(&self, id: u32) -> Result<Url, ContentError> {
        self.site_base
            .join(&format!("geriausi/filter_all/{id}/po_1.html"))
            .map_err(|e| ContentError::Parse(format!("invalid page url for id {id}: {e}")))
    }

    /// Fetch the page for `id` and extract its image, if it has one.
    pub async fn fetch_asset_url(&self, id: u32) -> Result<Option<String>, ContentError> {
        let url = self.page_url(id)?;
        let res = self
            .http
            .get(url.clone())
            .header("x-requested-with", "XMLHttpRequest")
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(ContentError::Fetch {
                url: url.to_string(),
                status: res.status().as_u16(),
            });
        }
        let html = res.text().await?;
        Ok(extract_asset_url(&html, &self.site_base))
    }

    /// Pick unused ids until one resolves to an image, marking it used.
    ///
    /// Pages without an image are skipped; network failures abort.
    #[instrument(skip_all)]
    pub async fn random_asset_url(&self) -> Result<ContentItem, ContentError> {
        let mut tracker = self.tracker.lock().await;
        for attempt in 1..=self.max_attempts {
            let id = tracker.random_unused()?;
            info!(id, attempt, "fetching demotivator page");
            match self.fetch_asset_url(id).await? {
                Some(url) => {
                    tracker.mark_used(id).await;
                    info!(id, %url, "found demotivator image");
                    return Ok(ContentItem { id, resolved_asset_url: Some(url) });
                }
                None => warn!(id, "no image on page, trying another id"),
            }
        }
        Err(ContentError::ExhaustedRetries { attempts: self.max_attempts })
    }

    /// Download a random image and store it at `output_path`, re-encoded in
    /// the format the file extension names.
    #[instrument(skip_all, fields(path = %output_path.display()))]
    pub async fn download_random_image(&self, output_path: &Path) -> Result<ContentItem, ContentError> {
        let item = self.random_asset_url().await?;
        let url = item
            .resolved_asset_url
            .clone()
            .ok_or_else(|| ContentError::Parse(format!("id {} has no asset url", item.id)))?;

        let res = self.http.get(&url).send().await?;
        if !res.status().is_success() {
            return Err(ContentError::Fetch { url, status: res.status().as_u16() });
        }
        let bytes = res.bytes().await?;

        if let Some(dir) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let decoded = image::load_from_memory(&bytes)?;
        decoded.save(output_path)?;
        info!(id = item.id, "demotivator image saved");
        Ok(item)
    }
}
