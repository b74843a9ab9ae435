use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use fantoccini::{error::CmdError, wd::Capabilities, Client as WebDriverClient, ClientBuilder};
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{AppConfig, FetcherKind};

const CHROME_ARGS: [&str; 4] = [
    "--headless",
    "--disable-gpu",
    "--no-sandbox",
    "--disable-setuid-sandbox",
];
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("unexpected status {status} for {url}")]
    Status { status: u16, url: String },
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout(_))
    }
}

/// Loads a page and hands back its HTML once the DOM is ready.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, url: &Url) -> Result<String, FetchError>;
}

pub fn build_fetcher(config: &AppConfig) -> anyhow::Result<Arc<dyn PageFetcher>> {
    let fetcher: Arc<dyn PageFetcher> = match config.fetcher {
        FetcherKind::Webdriver => Arc::new(WebDriverFetcher::new(
            config.webdriver_url.clone(),
            config.user_agent.clone(),
            config.navigation_timeout(),
            config.max_browser_sessions,
        )),
        FetcherKind::Http => Arc::new(HttpFetcher::new(
            &config.user_agent,
            config.navigation_timeout(),
        )?),
    };
    Ok(fetcher)
}

/// Headless Chrome driven through a chromedriver endpoint. Each fetch opens its
/// own session and closes it afterwards; the semaphore caps how many run at once.
pub struct WebDriverFetcher {
    webdriver_url: String,
    user_agent: String,
    timeout: Duration,
    sessions: Arc<Semaphore>,
    control: Client,
}

impl WebDriverFetcher {
    pub fn new(
        webdriver_url: String,
        user_agent: String,
        timeout: Duration,
        max_sessions: usize,
    ) -> Self {
        Self {
            webdriver_url,
            user_agent,
            timeout,
            sessions: Arc::new(Semaphore::new(max_sessions.max(1))),
            control: Client::new(),
        }
    }

    fn capabilities(&self) -> Capabilities {
        let mut args: Vec<String> = CHROME_ARGS.iter().map(|arg| arg.to_string()).collect();
        if !self.user_agent.is_empty() {
            args.push(format!("--user-agent={}", self.user_agent));
        }

        let mut caps = Capabilities::new();
        // eager: navigation resolves on DOMContentLoaded
        caps.insert("pageLoadStrategy".to_string(), json!("eager"));
        // chromedriver aborts the navigation itself once this expires
        caps.insert(
            "timeouts".to_string(),
            json!({ "pageLoad": self.timeout.as_millis() as u64 }),
        );
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        caps
    }

    async fn open_session(&self) -> Result<WebDriverClient, FetchError> {
        let mut builder = ClientBuilder::native();
        builder.capabilities(self.capabilities());
        tokio::time::timeout(self.timeout, builder.connect(&self.webdriver_url))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
            .map_err(|err| FetchError::Launch(err.to_string()))
    }

    async fn close_session(&self, client: WebDriverClient) {
        match tokio::time::timeout(CLOSE_TIMEOUT, client.close()).await {
            Ok(Ok(())) => debug!("browser session closed"),
            Ok(Err(err)) => warn!(error = %err, "failed to close browser session"),
            Err(_) => warn!("browser session close timed out"),
        }
    }

    /// Deletes the session over the wire protocol directly. A stuck navigation
    /// still holds the client's command queue, so `close()` would wait behind it.
    async fn force_delete_session(&self, session_id: &str) {
        let url = format!(
            "{}/session/{}",
            self.webdriver_url.trim_end_matches('/'),
            session_id
        );
        match self
            .control
            .delete(&url)
            .timeout(CLOSE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!(session_id, "browser session deleted")
            }
            Ok(response) => {
                warn!(session_id, status = %response.status(), "session delete rejected")
            }
            Err(err) => warn!(session_id, error = %err, "failed to delete browser session"),
        }
    }
}

async fn load_source(client: &WebDriverClient, url: &Url) -> Result<String, CmdError> {
    client.goto(url.as_str()).await?;
    client.source().await
}

#[async_trait]
impl PageFetcher for WebDriverFetcher {
    fn name(&self) -> &'static str {
        "webdriver"
    }

    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let _permit = self
            .sessions
            .acquire()
            .await
            .map_err(|err| FetchError::Launch(err.to_string()))?;

        let client = self.open_session().await?;
        let session_id = client.session_id().await.ok().flatten();
        debug!(webdriver = %self.webdriver_url, ?session_id, "browser session opened");

        let loaded = tokio::time::timeout(self.timeout, load_source(&client, url)).await;

        match (&loaded, session_id.as_deref()) {
            (Err(_), Some(id)) => {
                self.force_delete_session(id).await;
                drop(client);
            }
            _ => self.close_session(client).await,
        }

        match loaded {
            Err(_) => Err(FetchError::Timeout(self.timeout)),
            Ok(Err(err)) => Err(FetchError::Navigation(err.to_string())),
            Ok(Ok(html)) => {
                info!(%url, bytes = html.len(), "page loaded");
                Ok(html)
            }
        }
    }
}

/// Plain GET, for pages that render their JSON-LD server side.
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("unable to build http client")?;
        Ok(Self { client, timeout })
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Navigation(err.to_string())
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| self.classify(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let html = response.text().await.map_err(|err| self.classify(err))?;
        info!(%url, bytes = html.len(), "page loaded");
        Ok(html)
    }
}
