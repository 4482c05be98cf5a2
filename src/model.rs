use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

/// The twelve zodiac signs in canonical order (Aries first, Pisces last).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZodiacSign {
    Aries,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpio,
    Sagittarius,
    Capricorn,
    Aquarius,
    Pisces,
}

impl ZodiacSign {
    pub const CANONICAL: [ZodiacSign; 12] = [
        ZodiacSign::Aries,
        ZodiacSign::Taurus,
        ZodiacSign::Gemini,
        ZodiacSign::Cancer,
        ZodiacSign::Leo,
        ZodiacSign::Virgo,
        ZodiacSign::Libra,
        ZodiacSign::Scorpio,
        ZodiacSign::Sagittarius,
        ZodiacSign::Capricorn,
        ZodiacSign::Aquarius,
        ZodiacSign::Pisces,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ZodiacSign::Aries => "ARIES",
            ZodiacSign::Taurus => "TAURUS",
            ZodiacSign::Gemini => "GEMINI",
            ZodiacSign::Cancer => "CANCER",
            ZodiacSign::Leo => "LEO",
            ZodiacSign::Virgo => "VIRGO",
            ZodiacSign::Libra => "LIBRA",
            ZodiacSign::Scorpio => "SCORPIO",
            ZodiacSign::Sagittarius => "SAGITTARIUS",
            ZodiacSign::Capricorn => "CAPRICORN",
            ZodiacSign::Aquarius => "AQUARIUS",
            ZodiacSign::Pisces => "PISCES",
        }
    }

    /// Case-insensitive lookup of an API tag such as `"ARIES"`.
    pub fn from_tag(tag: &str) -> Option<ZodiacSign> {
        let tag = tag.trim();
        Self::CANONICAL
            .iter()
            .copied()
            .find(|s| s.as_str().eq_ignore_ascii_case(tag))
    }

    pub fn canonical_index(&self) -> usize {
        *self as usize
    }

    /// Lithuanian display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            ZodiacSign::Aries => "Avinas",
            ZodiacSign::Taurus => "Jautis",
            ZodiacSign::Gemini => "Dvyniai",
            ZodiacSign::Cancer => "Vėžys",
            ZodiacSign::Leo => "Liūtas",
            ZodiacSign::Virgo => "Mergelė",
            ZodiacSign::Libra => "Svarstyklės",
            ZodiacSign::Scorpio => "Skorpionas",
            ZodiacSign::Sagittarius => "Šaulys",
            ZodiacSign::Capricorn => "Ožiaragis",
            ZodiacSign::Aquarius => "Vandenis",
            ZodiacSign::Pisces => "Žuvys",
        }
    }
}

/// One sign's text as delivered by the horoscope API. The raw tag is kept so
/// that signs we do not know still render under their own name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ZodiacReading {
    #[serde(rename = "type")]
    pub sign: String,
    pub content: String,
}

impl ZodiacReading {
    pub fn known_sign(&self) -> Option<ZodiacSign> {
        ZodiacSign::from_tag(&self.sign)
    }

    /// Translated name, or the raw tag when there is no translation.
    pub fn display_name(&self) -> &str {
        match self.known_sign() {
            Some(sign) => sign.display_name(),
            None => &self.sign,
        }
    }

    /// Sort key: canonical index, unknown tags first.
    pub fn order_key(&self) -> i32 {
        self.known_sign()
            .map(|s| s.canonical_index() as i32)
            .unwrap_or(-1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HoroscopeEntry {
    #[serde(deserialize_with = "deserialize_period_start")]
    pub period_start: NaiveDate,
    pub zodiacs: Vec<ZodiacReading>,
}

fn deserialize_period_start<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_period_start(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid periodStart: {raw}")))
}

/// Accepts either a plain `YYYY-MM-DD` date or an RFC 3339 timestamp, which is
/// converted to the local calendar day.
pub fn parse_period_start(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Local).date_naive())
}

/// A slice of a horoscope entry rendered onto one story image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPage {
    pub page_number: usize,
    pub total_pages: usize,
    pub zodiacs: Vec<ZodiacReading>,
}

/// A content-site id together with the asset it resolved to, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentItem {
    pub id: u32,
    pub resolved_asset_url: Option<String>,
}

/// Lifecycle of a remote media container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaUploadState {
    Created,
    InProgress,
    Uploading,
    Finished,
    Published,
    Error,
    Expired,
    Unknown(String),
}

impl MediaUploadState {
    /// Map a Graph API `status_code` to a state.
    pub fn from_status_code(code: &str) -> Self {
        match code {
            "IN_PROGRESS" => MediaUploadState::InProgress,
            "UPLOADING" => MediaUploadState::Uploading,
            "FINISHED" => MediaUploadState::Finished,
            "PUBLISHED" => MediaUploadState::Published,
            "ERROR" => MediaUploadState::Error,
            "EXPIRED" => MediaUploadState::Expired,
            other => MediaUploadState::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MediaUploadState::Created => "CREATED",
            MediaUploadState::InProgress => "IN_PROGRESS",
            MediaUploadState::Uploading => "UPLOADING",
            MediaUploadState::Finished => "FINISHED",
            MediaUploadState::Published => "PUBLISHED",
            MediaUploadState::Error => "ERROR",
            MediaUploadState::Expired => "EXPIRED",
            MediaUploadState::Unknown(code) => code,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, MediaUploadState::InProgress | MediaUploadState::Uploading)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, MediaUploadState::Error | MediaUploadState::Expired)
    }
}
