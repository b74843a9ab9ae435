use std::{fs, path::Path, str::FromStr, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use chrono::format::{Item, StrftimeItems};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::utils;

pub const DEFAULT_SOURCE_URL: &str = "https://www.meetup.com/cities/au/sydney/";
pub const DEFAULT_IMAGE_HOST: &str = "https://secure.meetupstatic.com";

const ENV_PREFIX: &str = "SYDNEY_EVENTS_";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FetcherKind {
    #[default]
    Webdriver,
    Http,
}

impl FromStr for FetcherKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webdriver" | "browser" => Ok(Self::Webdriver),
            "http" => Ok(Self::Http),
            other => Err(anyhow!("unknown fetcher kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(anyhow!("unknown log format: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub port: u16,
    pub source_url: String,
    pub image_host: String,
    pub fetcher: FetcherKind,
    pub webdriver_url: String,
    pub navigation_timeout_secs: u64,
    pub max_browser_sessions: usize,
    pub user_agent: String,
    pub timezone: String,
    pub date_format: String,
    pub time_format: String,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 3001,
            source_url: DEFAULT_SOURCE_URL.to_string(),
            image_host: DEFAULT_IMAGE_HOST.to_string(),
            fetcher: FetcherKind::default(),
            webdriver_url: "http://localhost:9515".to_string(),
            navigation_timeout_secs: 60,
            max_browser_sessions: 2,
            user_agent: "SydneyEvents/0.1".to_string(),
            timezone: "Australia/Sydney".to_string(),
            // en-AU short date and time, e.g. 25/10/2025 and 7:00:00 pm
            date_format: "%-d/%-m/%Y".to_string(),
            time_format: "%-I:%M:%S %P".to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the JSON config file if present, then `SYDNEY_EVENTS_*` variables.
    pub fn load() -> Result<Self> {
        let path = utils::config_path();
        let mut config = read_config(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(value) = var("BIND_ADDR") {
            self.bind_addr = value;
        }
        if let Some(value) = var("PORT") {
            self.port = value
                .parse()
                .with_context(|| format!("invalid {ENV_PREFIX}PORT: {value}"))?;
        }
        if let Some(value) = var("SOURCE_URL") {
            self.source_url = value;
        }
        if let Some(value) = var("IMAGE_HOST") {
            self.image_host = value;
        }
        if let Some(value) = var("FETCHER") {
            self.fetcher = value.parse()?;
        }
        if let Some(value) = var("WEBDRIVER_URL") {
            self.webdriver_url = value;
        }
        if let Some(value) = var("TIMEOUT_SECS") {
            self.navigation_timeout_secs = value
                .parse()
                .with_context(|| format!("invalid {ENV_PREFIX}TIMEOUT_SECS: {value}"))?;
        }
        if let Some(value) = var("MAX_SESSIONS") {
            self.max_browser_sessions = value
                .parse()
                .with_context(|| format!("invalid {ENV_PREFIX}MAX_SESSIONS: {value}"))?;
        }
        if let Some(value) = var("USER_AGENT") {
            self.user_agent = value;
        }
        if let Some(value) = var("TIMEZONE") {
            self.timezone = value;
        }
        // Format strings keep their spacing, so read these untrimmed.
        if let Some(value) = lookup(&format!("{ENV_PREFIX}DATE_FORMAT")).filter(|v| !v.is_empty()) {
            self.date_format = value;
        }
        if let Some(value) = lookup(&format!("{ENV_PREFIX}TIME_FORMAT")).filter(|v| !v.is_empty()) {
            self.time_format = value;
        }
        if let Some(value) = var("LOG_FORMAT") {
            self.log_format = value.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.source_url()?;
        self.tz()?;
        Url::parse(&self.image_host)
            .with_context(|| format!("invalid image host: {}", self.image_host))?;
        if self.fetcher == FetcherKind::Webdriver {
            Url::parse(&self.webdriver_url)
                .with_context(|| format!("invalid webdriver url: {}", self.webdriver_url))?;
        }
        if self.max_browser_sessions == 0 {
            bail!("max_browser_sessions must be at least 1");
        }
        if self.navigation_timeout_secs == 0 {
            bail!("navigation_timeout_secs must be at least 1");
        }
        check_format("date_format", &self.date_format)?;
        check_format("time_format", &self.time_format)?;
        Ok(())
    }

    pub fn source_url(&self) -> Result<Url> {
        Url::parse(&self.source_url)
            .with_context(|| format!("invalid source url: {}", self.source_url))
    }

    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|err| anyhow!("unknown timezone {}: {err}", self.timezone))
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    /// Image host without a trailing slash, ready to be joined with a path-absolute image.
    pub fn image_origin(&self) -> String {
        self.image_host.trim_end_matches('/').to_string()
    }
}

fn check_format(field: &str, fmt: &str) -> Result<()> {
    if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
        bail!("invalid {field}: {fmt}");
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("unable to parse config file {}", path.display()))
}
