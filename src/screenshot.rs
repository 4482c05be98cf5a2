//! Calendar image capture through a headless Chromium.
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config;

#[async_trait]
pub trait Screenshotter: Send + Sync {
    /// Capture the page region as a PNG at `output_path`.
    async fn capture(&self, output_path: &Path) -> Result<()>;
}

/// Screenshots one element of a web page.
#[derive(Debug, Clone)]
pub struct BrowserScreenshotter {
    browser: PathBuf,
    url: String,
    selector: String,
    width: u32,
    height: u32,
    timeout: Duration,
}

impl BrowserScreenshotter {
    pub fn from_config(cfg: &config::Calendar) -> Self {
        Self {
            browser: PathBuf::from(&cfg.browser),
            url: cfg.url.clone(),
            selector: cfg.selector.clone(),
            width: cfg.viewport_width,
            height: cfg.viewport_height,
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.width,
            height: self.height,
            device_scale_factor: Some(1.0),
            ..Default::default()
        }
    }

    pub fn browser_config(&self) -> Result<BrowserConfig> {
        BrowserConfig::builder()
            .chrome_executable(&self.browser)
            .window_size(self.width, self.height)
            .viewport(self.viewport())
            .request_timeout(self.timeout)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--hide-scrollbars")
            .arg("--mute-audio")
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))
    }

    async fn shoot_element(&self, browser: &Browser) -> Result<Vec<u8>> {
        let page = browser
            .new_page(self.url.as_str())
            .await
            .with_context(|| format!("failed to open {}", self.url))?;
        page.wait_for_navigation()
            .await
            .with_context(|| format!("navigation to {} failed", self.url))?;
        let element = page
            .find_element(self.selector.as_str())
            .await
            .with_context(|| format!("element {:?} not found on {}", self.selector, self.url))?;
        let png = element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .with_context(|| format!("failed to screenshot {:?}", self.selector))?;
        if let Err(err) = page.close().await {
            debug!(%err, "page close failed");
        }
        Ok(png)
    }
}

#[async_trait]
impl Screenshotter for BrowserScreenshotter {
    #[instrument(skip_all)]
    async fn capture(&self, output_path: &Path) -> Result<()> {
        debug!(url = %self.url, selector = %self.selector, browser = %self.browser.display(), "capturing screenshot");
        let (mut browser, mut handler) = Browser::launch(self.browser_config()?)
            .await
            .with_context(|| format!("failed to launch {}", self.browser.display()))?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let shot = tokio::time::timeout(self.timeout, self.shoot_element(&browser)).await;

        if let Err(err) = browser.close().await {
            warn!(%err, "browser close failed, killing it");
            let _ = browser.kill().await;
        }
        if let Err(err) = browser.wait().await {
            debug!(%err, "browser wait failed");
        }
        events.abort();

        let png = shot.map_err(|_| anyhow!("timed out after {:?} capturing {}", self.timeout, self.url))??;
        tokio::fs::write(output_path, &png)
            .await
            .with_context(|| format!("failed to write screenshot {}", output_path.display()))?;
        debug!(bytes = png.len(), "element screenshot saved");
        Ok(())
    }
}

/// Capture the calendar page into `output_path`, creating its directory.
pub async fn compose_calendar_image(shooter: &dyn Screenshotter, output_path: &Path) -> Result<()> {
    if let Some(dir) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    shooter.capture(output_path).await?;
    info!(path=%output_path.display(), "calendar image saved");
    Ok(())
}
