use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::UploadError;

const GRAPH_API_BASE: &str = "https://graph.instagram.com/v21.0/";

/// The three Graph API calls a story upload needs.
#[async_trait]
pub trait GraphApi: Send + Sync {
    /// Create a story media container for a publicly reachable image. Returns
    /// the container id.
    async fn create_container(&self, image_url: &str) -> Result<String, UploadError>;

    /// Current `status_code` of a container.
    async fn container_status(&self, container_id: &str) -> Result<String, UploadError>;

    /// Publish a finished container. Returns the published media id.
    async fn publish(&self, container_id: &str) -> Result<String, UploadError>;
}

#[derive(Clone)]
pub struct InstagramClient {
    http: Client,
    base_url: Url,
    app_id: String,
    access_token: String,
}

impl fmt::Debug for InstagramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstagramClient")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl InstagramClient {
    pub fn new(app_id: String, access_token: String) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(GRAPH_API_BASE)?;
        Ok(Self::with_base_url(app_id, access_token, base_url))
    }

    pub fn with_base_url(app_id: String, access_token: String, base_url: Url) -> Self {
        let http = Client::builder()
            .user_agent("storybot/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url,
            app_id,
            access_token,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(&cfg.instagram.api_base)?;
        Ok(Self::with_base_url(
            cfg.instagram.app_id.clone(),
            cfg.instagram.access_token.clone(),
            base_url,
        ))
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, String> {
        let mut url = self
            .base_url
            .join(path)
            .map_err(|e| format!("invalid Graph API url: {e}"))?;
        url.query_pairs_mut()
            .extend_pairs(query.iter().copied())
            .append_pair("access_token", &self.access_token);
        Ok(url)
    }

    pub fn build_create_request(&self, image_url: &str) -> Result<reqwest::Request, String> {
        let url = self.endpoint(
            &format!("{}/media", self.app_id),
            &[("image_url", image_url), ("media_type", "STORIES")],
        )?;
        self.http
            .request(Method::POST, url)
            .build()
            .map_err(|e| format!("failed to build request: {e}"))
    }

    pub fn build_status_request(&self, container_id: &str) -> Result<reqwest::Request, String> {
        let url = self.endpoint(container_id, &[("fields", "status_code")])?;
        self.http
            .request(Method::GET, url)
            .build()
            .map_err(|e| format!("failed to build request: {e}"))
    }

    pub fn build_publish_request(&self, container_id: &str) -> Result<reqwest::Request, String> {
        let url = self.endpoint(
            &format!("{}/media_publish", self.app_id),
            &[("creation_id", container_id)],
        )?;
        self.http
            .request(Method::POST, url)
            .build()
            .map_err(|e| format!("failed to build request: {e}"))
    }

    /// Send a request and return its JSON body, or the API's error message.
    async fn execute(&self, request: reqwest::Request) -> Result<Value, String> {
        debug!(method=%request.method(), path=%request.url().path(), "sending graph api request");
        let res = self
            .http
            .execute(request)
            .await
            .map_err(|e| format!("failed to reach Graph API: {e}"))?;
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        if let Some(message) = api_error(status, &body) {
            warn!(%status, %message, "graph api error");
            return Err(message);
        }
        Ok(body)
    }
}

/// Error message for a failed response: the body's `error.message` when
/// present, the HTTP status otherwise.
pub fn api_error(status: StatusCode, body: &Value) -> Option<String> {
    let error = body.get("error").filter(|e| !e.is_null());
    if status.is_success() && error.is_none() {
        return None;
    }
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string());
    Some(message)
}

fn string_field(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl GraphApi for InstagramClient {
    async fn create_container(&self, image_url: &str) -> Result<String, UploadError> {
        let request = self
            .build_create_request(image_url)
            .map_err(UploadError::ContainerCreation)?;
        let body = self.execute(request).await.map_err(UploadError::ContainerCreation)?;
        string_field(&body, "id")
            .ok_or_else(|| UploadError::ContainerCreation(format!("no container id in response: {body}")))
    }

    async fn container_status(&self, container_id: &str) -> Result<String, UploadError> {
        let request = self
            .build_status_request(container_id)
            .map_err(UploadError::Status)?;
        let body = self.execute(request).await.map_err(UploadError::Status)?;
        string_field(&body, "status_code")
            .ok_or_else(|| UploadError::Status(format!("no status_code in response: {body}")))
    }

    async fn publish(&self, container_id: &str) -> Result<String, UploadError> {
        let request = self
            .build_publish_request(container_id)
            .map_err(UploadError::Publish)?;
        let body = self.execute(request).await.map_err(UploadError::Publish)?;
        Ok(string_field(&body, "id").unwrap_or_default())
    }
}
