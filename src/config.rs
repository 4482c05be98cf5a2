//! Configuration loader and validator for the story bot.
//!
//! The YAML file carries the full layout; a handful of environment variables
//! (optionally from `.env`) override the deployment-specific secrets and paths.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::scheduler::DailyAt;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

pub const ENV_DATA_DIR: &str = "PATH_TO_SAVE";
pub const ENV_ACCESS_TOKEN: &str = "ACCESS_TOKEN";
pub const ENV_APP_ID: &str = "INSTAGRAM_APP_ID";
pub const ENV_PUBLIC_BASE_URL: &str = "DOMAIN_NAME";

const DEFAULT_HOROSCOPE_API: &str = "https://horoscope.api.delfi.lt/horoscope/v1/graphql?variables=%7B%7D&extensions=%7B%22persistedQuery%22%3A%7B%22version%22%3A1%2C%22sha256Hash%22%3A%22e9d52d0790992a2e4231e53e97dd54f2cf346edceeb3da6c62f3628593fd004e%22%7D%7D";

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub instagram: Instagram,
    #[serde(default)]
    pub horoscope: Horoscope,
    #[serde(default)]
    pub demotivator: Demotivator,
    #[serde(default)]
    pub calendar: Calendar,
    #[serde(default)]
    pub schedule: Schedule,
}

/// Output location and public URL of the generated story files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub public_base_url: String,
    #[serde(default)]
    pub used_ids_file: Option<String>,
}

/// Instagram Graph API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Instagram {
    pub access_token: String,
    pub app_id: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Horoscope {
    #[serde(default = "default_horoscope_api")]
    pub api_url: String,
    #[serde(default)]
    pub fonts: Fonts,
}

/// Font files used by the horoscope renderer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fonts {
    pub regular: String,
    pub bold: String,
    /// Falls back to `regular` when absent.
    #[serde(default)]
    pub italic: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Demotivator {
    #[serde(default = "default_site_base")]
    pub site_base: String,
    #[serde(default = "default_max_id")]
    pub max_id: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Calendar screenshot settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Calendar {
    pub url: String,
    pub browser: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub timeout_secs: u64,
    /// CSS selector of the element that is captured.
    #[serde(default = "default_calendar_selector")]
    pub selector: String,
}

fn default_calendar_selector() -> String {
    ".calendar-section.calendar-left.w-full".into()
}

/// Daily cron rules (`"M H * * *"`), one per content type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    pub calendar: String,
    pub horoscope: String,
    pub demotivator: String,
}

fn default_api_base() -> String {
    "https://graph.instagram.com/v21.0/".into()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_max_polls() -> u32 {
    60
}

fn default_horoscope_api() -> String {
    DEFAULT_HOROSCOPE_API.into()
}

fn default_site_base() -> String {
    "https://www.demotyvacijos.lt/".into()
}

fn default_max_id() -> u32 {
    101_208
}

fn default_max_attempts() -> u32 {
    20
}

impl Default for Horoscope {
    fn default() -> Self {
        Self {
            api_url: default_horoscope_api(),
            fonts: Fonts::default(),
        }
    }
}

impl Default for Fonts {
    fn default() -> Self {
        Self {
            regular: "fonts/NotoSans-Regular.ttf".into(),
            bold: "fonts/NotoSans-Bold.ttf".into(),
            italic: None,
        }
    }
}

impl Default for Demotivator {
    fn default() -> Self {
        Self {
            site_base: default_site_base(),
            max_id: default_max_id(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for Calendar {
    fn default() -> Self {
        Self {
            url: "https://day.lt".into(),
            browser: "chromium".into(),
            viewport_width: 1280,
            viewport_height: 800,
            timeout_secs: 10,
            selector: default_calendar_selector(),
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            calendar: "0 1 * * *".into(),
            horoscope: "0 2 * * *".into(),
            demotivator: "0 3 * * *".into(),
        }
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.app.data_dir)
    }

    /// Location of the persisted used-id set.
    pub fn used_ids_path(&self) -> PathBuf {
        match &self.app.used_ids_file {
            Some(p) if !p.trim().is_empty() => PathBuf::from(p),
            _ => self.data_dir().join("used_demotivator_ids.json"),
        }
    }

    /// Apply environment overrides on top of the file values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_DATA_DIR) {
            self.app.data_dir = v;
        }
        if let Some(v) = lookup(ENV_PUBLIC_BASE_URL) {
            self.app.public_base_url = v;
        }
        if let Some(v) = lookup(ENV_ACCESS_TOKEN) {
            self.instagram.access_token = v;
        }
        if let Some(v) = lookup(ENV_APP_ID) {
            self.instagram.app_id = v;
        }
    }
}

/// Load configuration from a YAML file, overlay the environment and validate.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    // A missing .env is the normal case in production.
    let _ = dotenvy::dotenv();
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()));
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    let base = cfg.app.public_base_url.trim();
    if base.is_empty() {
        return Err(ConfigError::Invalid("app.public_base_url must be non-empty"));
    }
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        return Err(ConfigError::Invalid("app.public_base_url must be an http(s) URL"));
    }

    if cfg.instagram.access_token.trim().is_empty() {
        return Err(ConfigError::Invalid("instagram.access_token must be non-empty"));
    }
    if cfg.instagram.app_id.trim().is_empty() {
        return Err(ConfigError::Invalid("instagram.app_id must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.instagram.api_base).is_err() {
        return Err(ConfigError::Invalid("instagram.api_base must be a valid URL"));
    }
    if cfg.instagram.poll_interval_secs == 0 {
        return Err(ConfigError::Invalid("instagram.poll_interval_secs must be > 0"));
    }
    if cfg.instagram.max_polls == 0 {
        return Err(ConfigError::Invalid("instagram.max_polls must be > 0"));
    }

    if cfg.horoscope.api_url.trim().is_empty() {
        return Err(ConfigError::Invalid("horoscope.api_url must be non-empty"));
    }
    if cfg.horoscope.fonts.regular.trim().is_empty() || cfg.horoscope.fonts.bold.trim().is_empty() {
        return Err(ConfigError::Invalid("horoscope.fonts.regular and horoscope.fonts.bold must be non-empty"));
    }

    if reqwest::Url::parse(&cfg.demotivator.site_base).is_err() {
        return Err(ConfigError::Invalid("demotivator.site_base must be a valid URL"));
    }
    if cfg.demotivator.max_id == 0 {
        return Err(ConfigError::Invalid("demotivator.max_id must be > 0"));
    }
    if cfg.demotivator.max_attempts == 0 {
        return Err(ConfigError::Invalid("demotivator.max_attempts must be > 0"));
    }

    if cfg.calendar.url.trim().is_empty() {
        return Err(ConfigError::Invalid("calendar.url must be non-empty"));
    }
    if cfg.calendar.browser.trim().is_empty() {
        return Err(ConfigError::Invalid("calendar.browser must be non-empty"));
    }
    if cfg.calendar.viewport_width == 0 || cfg.calendar.viewport_height == 0 {
        return Err(ConfigError::Invalid("calendar viewport must be non-zero"));
    }
    if cfg.calendar.selector.trim().is_empty() {
        return Err(ConfigError::Invalid("calendar.selector must be non-empty"));
    }
    if cfg.calendar.timeout_secs == 0 {
        return Err(ConfigError::Invalid("calendar.timeout_secs must be > 0"));
    }

    if DailyAt::parse(&cfg.schedule.calendar).is_err() {
        return Err(ConfigError::Invalid("schedule.calendar must be a daily \"M H * * *\" rule"));
    }
    if DailyAt::parse(&cfg.schedule.horoscope).is_err() {
        return Err(ConfigError::Invalid("schedule.horoscope must be a daily \"M H * * *\" rule"));
    }
    if DailyAt::parse(&cfg.schedule.demotivator).is_err() {
        return Err(ConfigError::Invalid("schedule.demotivator must be a daily \"M H * * *\" rule"));
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  public_base_url: "https://stories.example.com"

instagram:
  access_token: "YOUR_INSTAGRAM_ACCESS_TOKEN"
  app_id: "YOUR_INSTAGRAM_ACCOUNT_ID"
  poll_interval_secs: 10
  max_polls: 60

horoscope:
  fonts:
    regular: "fonts/NotoSans-Regular.ttf"
    bold: "fonts/NotoSans-Bold.ttf"

demotivator:
  max_id: 101208
  max_attempts: 20

calendar:
  url: "https://day.lt"
  browser: "chromium"
  viewport_width: 1280
  viewport_height: 800
  timeout_secs: 10
  selector: ".calendar-section.calendar-left.w-full"

schedule:
  calendar: "0 1 * * *"
  horoscope: "0 2 * * *"
  demotivator: "0 3 * * *"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_cfg() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_cfg();
        validate(&cfg).unwrap();
        assert_eq!(cfg.instagram.api_base, "https://graph.instagram.com/v21.0/");
        assert_eq!(cfg.demotivator.site_base, "https://www.demotyvacijos.lt/");
        assert_eq!(cfg.calendar, Calendar::default());
    }

    #[test]
    fn minimal_yaml_uses_defaults() {
        let yaml = r#"app:
  data_dir: "/tmp/out"
  public_base_url: "https://cdn.example.com"
instagram:
  access_token: "t"
  app_id: "1"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.instagram.poll_interval_secs, 10);
        assert_eq!(cfg.demotivator.max_id, 101_208);
        assert_eq!(cfg.schedule, Schedule::default());
        assert_eq!(cfg.used_ids_path(), PathBuf::from("/tmp/out/used_demotivator_ids.json"));
    }

    #[test]
    fn invalid_access_token() {
        let mut cfg = example_cfg();
        cfg.instagram.access_token = "".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("instagram.access_token")), _ => panic!("wrong error") }
    }

    #[test]
    fn invalid_public_base_url() {
        let mut cfg = example_cfg();
        cfg.app.public_base_url = "stories.example.com".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("public_base_url")), _ => panic!("wrong error") }
    }

    #[test]
    fn invalid_schedule_rule() {
        let mut cfg = example_cfg();
        cfg.schedule.horoscope = "*/5 * * * *".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("schedule.horoscope")), _ => panic!("wrong error") }
    }

    #[test]
    fn invalid_numeric_bounds() {
        let mut cfg = example_cfg();
        cfg.instagram.poll_interval_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.demotivator.max_id = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.calendar.selector = "  ".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = example_cfg();
        cfg.apply_env(|key| match key {
            ENV_DATA_DIR => Some("/srv/stories".into()),
            ENV_ACCESS_TOKEN => Some("secret".into()),
            ENV_APP_ID => Some("1789".into()),
            ENV_PUBLIC_BASE_URL => Some("https://img.example.org".into()),
            _ => None,
        });
        assert_eq!(cfg.app.data_dir, "/srv/stories");
        assert_eq!(cfg.instagram.access_token, "secret");
        assert_eq!(cfg.instagram.app_id, "1789");
        assert_eq!(cfg.app.public_base_url, "https://img.example.org");
        validate(&cfg).unwrap();
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg = example_cfg();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.schedule.calendar, "0 1 * * *");
    }
}
