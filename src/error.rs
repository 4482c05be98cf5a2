//! Error types shared across the content, rendering and upload pipeline.
use thiserror::Error;

/// Failures while retrieving remote content (scraped pages, APIs, downloads).
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("fetch of {url} failed with status {status}")]
    Fetch { url: String, status: u16 },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected content: {0}")]
    Parse(String),
    #[error("gave up after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Failures while reading or writing the used-id set.
///
/// These never abort a job: reads fall back to an empty set and writes are
/// logged and dropped.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to load font {path}: {reason}")]
    Font { path: String, reason: String },
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of one story upload, from image generation to publishing.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("image generation failed: {0:#}")]
    Generation(anyhow::Error),
    #[error("media container creation failed: {0}")]
    ContainerCreation(String),
    #[error("media status request failed: {0}")]
    Status(String),
    #[error("media {container_id} processing failed with status {status}")]
    MediaProcessing { container_id: String, status: String },
    #[error("publishing media failed: {0}")]
    Publish(String),
    #[error("unexpected status {status} for media {container_id}")]
    UnexpectedStatus { container_id: String, status: String },
    #[error("media {container_id} still not ready after {polls} polls")]
    ExhaustedRetries { container_id: String, polls: u32 },
    #[error("upload cancelled")]
    Cancelled,
}
