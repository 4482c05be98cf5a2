//! Story upload: generate the image, create a media container, poll it until
//! it is ready and publish it.
use async_trait::async_trait;
use chrono::{Datelike, Local, Weekday};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::error::UploadError;
use crate::instagram::GraphApi;
use crate::model::MediaUploadState;

/// Something that can (re)create the image file for a story.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, output_path: &Path) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub data_dir: PathBuf,
    pub public_base_url: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl UploadSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            data_dir: cfg.data_dir(),
            public_base_url: cfg.app.public_base_url.clone(),
            poll_interval: Duration::from_secs(cfg.instagram.poll_interval_secs),
            max_polls: cfg.instagram.max_polls,
        }
    }

    pub fn public_url(&self, file_name: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), file_name)
    }
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMedia {
    pub label: String,
    pub file_name: String,
    pub container_id: String,
    pub media_id: String,
    pub polls: u32,
}

/// `{label}_{weekday}.png`, weekday counted from Sunday = 0, so a week of
/// files rotates without collisions.
pub fn story_file_name(label: &str, weekday: Weekday) -> String {
    format!("{}_{}.png", label, weekday.num_days_from_sunday())
}

pub struct Uploader {
    api: Arc<dyn GraphApi>,
    settings: UploadSettings,
    cancel: CancellationToken,
}

impl Uploader {
    pub fn new(api: Arc<dyn GraphApi>, settings: UploadSettings, cancel: CancellationToken) -> Self {
        Self { api, settings, cancel }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Run a whole upload and log the outcome. Never fails: one broken story
    /// must not take the scheduler down.
    #[instrument(skip_all, fields(label = %label))]
    pub async fn upload(&self, label: &str, generator: &dyn ImageGenerator) {
        match self.try_upload(label, generator).await {
            Ok(published) => info!(
                label,
                container_id = %published.container_id,
                media_id = %published.media_id,
                polls = published.polls,
                "story published"
            ),
            Err(err) => error!(label, error = %err, "story upload failed"),
        }
    }

    pub async fn try_upload(
        &self,
        label: &str,
        generator: &dyn ImageGenerator,
    ) -> Result<PublishedMedia, UploadError> {
        self.try_upload_on(label, Local::now().weekday(), generator).await
    }

    pub async fn try_upload_on(
        &self,
        label: &str,
        weekday: Weekday,
        generator: &dyn ImageGenerator,
    ) -> Result<PublishedMedia, UploadError> {
        let file_name = story_file_name(label, weekday);
        let output_path = self.settings.data_dir.join(&file_name);
        info!(label, path=%output_path.display(), "generating story image");
        generator
            .generate(&output_path)
            .await
            .map_err(UploadError::Generation)?;

        let public_url = self.settings.public_url(&file_name);
        info!(label, %public_url, "creating media container");
        let container_id = self.api.create_container(&public_url).await?;
        info!(label, %container_id, "media container created");

        let (media_id, polls) = self.wait_and_publish(&container_id).await?;
        Ok(PublishedMedia {
            label: label.to_string(),
            file_name,
            container_id,
            media_id,
            polls,
        })
    }

    /// Poll the container every `poll_interval` until it settles, then publish
    /// it. Returns the published media id and the number of polls made.
    async fn wait_and_publish(&self, container_id: &str) -> Result<(String, u32), UploadError> {
        let mut state = MediaUploadState::Created;
        for poll in 1..=self.settings.max_polls {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    warn!(%container_id, state = state.as_str(), "polling cancelled");
                    return Err(UploadError::Cancelled);
                }
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }

            let code = self.api.container_status(container_id).await?;
            state = MediaUploadState::from_status_code(&code);
            info!(%container_id, poll, status = state.as_str(), "media status");

            match state {
                ref s if s.is_pending() => continue,
                MediaUploadState::Finished => {
                    let media_id = self.api.publish(container_id).await?;
                    return Ok((media_id, poll));
                }
                ref s if s.is_failure() => {
                    return Err(UploadError::MediaProcessing {
                        container_id: container_id.to_string(),
                        status: s.as_str().to_string(),
                    });
                }
                other => {
                    return Err(UploadError::UnexpectedStatus {
                        container_id: container_id.to_string(),
                        status: other.as_str().to_string(),
                    });
                }
            }
        }
        Err(UploadError::ExhaustedRetries {
            container_id: container_id.to_string(),
            polls: self.settings.max_polls,
        })
    }
}
