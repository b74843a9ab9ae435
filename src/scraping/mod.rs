pub mod base;
pub mod fetch;
pub mod jsonld;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::config::AppConfig;
use crate::models::Event;
use base::DisplaySettings;
use fetch::{FetchError, PageFetcher};

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
}

impl ScrapeError {
    pub fn is_timeout(&self) -> bool {
        match self {
            ScrapeError::Fetch(err) => err.is_timeout(),
        }
    }
}

/// Loads the listings page and turns its JSON-LD into [`Event`]s.
pub struct EventScraper {
    source_url: Url,
    fetcher: Arc<dyn PageFetcher>,
    settings: DisplaySettings,
}

impl EventScraper {
    pub fn new(source_url: Url, fetcher: Arc<dyn PageFetcher>, settings: DisplaySettings) -> Self {
        Self {
            source_url,
            fetcher,
            settings,
        }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            config.source_url()?,
            fetch::build_fetcher(config)?,
            DisplaySettings::from_config(config)?,
        ))
    }

    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    pub fn fetcher_name(&self) -> &'static str {
        self.fetcher.name()
    }

    pub async fn run(&self) -> Result<Vec<Event>, ScrapeError> {
        info!(url = %self.source_url, fetcher = self.fetcher.name(), "scraping events");
        let html = self.fetcher.fetch(&self.source_url).await?;
        let events = jsonld::extract_events(&html, &self.settings);
        info!(count = events.len(), "scraped events");
        Ok(events)
    }
}
