//! Client for the horoscope content API (a persisted GraphQL query).
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::error::ContentError;
use crate::model::HoroscopeEntry;

#[derive(Debug, Clone)]
pub struct HoroscopeClient {
    http: Client,
    api_url: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    data: Option<ApiData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiData {
    get_horoscopes: Option<HoroscopeList>,
}

#[derive(Deserialize)]
struct HoroscopeList {
    #[serde(default)]
    items: Vec<HoroscopeItem>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HoroscopeItem {
    current_entry: Option<HoroscopeEntry>,
}

impl HoroscopeClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .user_agent("storybot/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_url: api_url.into(),
        }
    }

    /// Fetch today's entry (the first item's `currentEntry`).
    #[instrument(skip_all)]
    pub async fn current_entry(&self) -> Result<HoroscopeEntry, ContentError> {
        let res = self
            .http
            .get(&self.api_url)
            .header("accept", "*/*")
            .header("accept-language", "lt,en-US;q=0.9,en;q=0.8")
            .header("content-type", "application/json")
            .header("referer", "https://www.delfi.lt/")
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(ContentError::Fetch {
                url: self.api_url.clone(),
                status: res.status().as_u16(),
            });
        }
        let body = res.text().await?;
        let entry = parse_current_entry(&body)?;
        debug!(period_start=%entry.period_start, signs = entry.zodiacs.len(), "fetched horoscope");
        Ok(entry)
    }
}

/// Pull `data.getHoroscopes.items[0].currentEntry` out of an API response body.
pub fn parse_current_entry(body: &str) -> Result<HoroscopeEntry, ContentError> {
    let response: ApiResponse = serde_json::from_str(body)
        .map_err(|e| ContentError::Parse(format!("invalid horoscope response: {e}")))?;
    let first = response
        .data
        .and_then(|d| d.get_horoscopes)
        .and_then(|list| list.items.into_iter().next())
        .ok_or_else(|| ContentError::Parse("no horoscope items in response".into()))?;
    first
        .current_entry
        .ok_or_else(|| ContentError::Parse("no current horoscope entry".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn parses_nested_entry() {
        let body = json!({
            "data": { "getHoroscopes": { "items": [
                { "currentEntry": {
                    "periodStart": "2025-06-01",
                    "zodiacs": [
                        { "type": "PISCES", "content": "Žuvys." },
                        { "type": "ARIES", "content": "Avinas." }
                    ]
                } },
                { "currentEntry": null }
            ] } }
        })
        .to_string();
        let entry = parse_current_entry(&body).unwrap();
        assert_eq!(entry.period_start, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(entry.zodiacs.len(), 2);
        assert_eq!(entry.zodiacs[0].sign, "PISCES");
    }

    #[test]
    fn missing_items_is_parse_error() {
        let body = json!({ "data": { "getHoroscopes": { "items": [] } } }).to_string();
        assert!(matches!(parse_current_entry(&body), Err(ContentError::Parse(_))));

        let body = json!({ "data": null }).to_string();
        assert!(matches!(parse_current_entry(&body), Err(ContentError::Parse(_))));

        let body = json!({ "data": { "getHoroscopes": { "items": [{ "currentEntry": null }] } } }).to_string();
        assert!(matches!(parse_current_entry(&body), Err(ContentError::Parse(_))));

        assert!(matches!(parse_current_entry("<html>"), Err(ContentError::Parse(_))));
    }
}
