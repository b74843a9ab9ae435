pub mod config;
pub mod logging;
pub mod models;
pub mod scraping;
pub mod server;
mod utils;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use config::AppConfig;
use scraping::EventScraper;
use server::AppState;

pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    logging::init_logging(config.log_format)?;

    let scraper = EventScraper::from_config(&config).context("failed to build scraper")?;
    info!(
        source = %scraper.source_url(),
        fetcher = scraper.fetcher_name(),
        timeout_secs = config.navigation_timeout_secs,
        "scraper configured"
    );

    let state = AppState {
        scraper: Arc::new(scraper),
    };
    server::serve(state, &config.bind_addr, config.port).await
}
