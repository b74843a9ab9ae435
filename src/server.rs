use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::scraping::EventScraper;

pub const FETCH_FAILED: &str = "Failed to fetch events";
pub const FETCH_TIMED_OUT: &str = "Timed out fetching events";

#[derive(Clone)]
pub struct AppState {
    pub scraper: Arc<EventScraper>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/events", get(events_handler))
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

// Any origin may read; the client runs on a different port.
async fn cors_middleware(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type"),
    );
    response
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

async fn events_handler(State(state): State<AppState>) -> Response {
    match state.scraper.run().await {
        Ok(events) => Json(events).into_response(),
        Err(err) => {
            error!(error = %err, "event scrape failed");
            let message = if err.is_timeout() {
                FETCH_TIMED_OUT
            } else {
                FETCH_FAILED
            };
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message })),
            )
                .into_response()
        }
    }
}

pub async fn serve(state: AppState, bind_addr: &str, port: u16) -> anyhow::Result<()> {
    let ip: IpAddr = bind_addr.parse().unwrap_or_else(|_| {
        warn!(bind_addr, "invalid bind address, falling back to localhost");
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    });
    let addr = SocketAddr::new(ip, port);
    let listener = TcpListener::bind(addr).await?;
    info!("Scraper API running at http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "unable to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::models::Event;
    use crate::scraping::base::DisplaySettings;
    use crate::scraping::fetch::{HttpFetcher, PageFetcher};
    use crate::scraping::testing::StubFetcher;

    const FIXTURE_PAGE: &str = r#"<!DOCTYPE html>
    <html>
    <head>
        <title>Sydney events</title>
        <script type="application/ld+json">
        {
            "@type": "Event",
            "name": "Bondi to Bronte Coastal Walk",
            "url": "https://www.meetup.com/sydney-walkers/events/401/",
            "startDate": "2025-11-08T08:00:00+11:00",
            "image": "/photos/401.jpeg",
            "location": {"address": {"addressLocality": "Bondi"}}
        }
        </script>
        <script type="application/ld+json">{ "@type": "Event", "name": </script>
        <script type="application/ld+json">
        [{
            "@type": "Event",
            "name": "Sydney Rust Meetup",
            "url": "https://www.meetup.com/rust-sydney/events/402/",
            "description": "Talks and pizza."
        }]
        </script>
    </head>
    <body></body>
    </html>"#;

    async fn spawn_app(fetcher: Arc<dyn PageFetcher>, source_url: Url) -> String {
        let scraper = EventScraper::new(source_url, fetcher, DisplaySettings::default());
        let state = AppState {
            scraper: Arc::new(scraper),
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, build_router(state))
                .await
                .expect("serve");
        });
        format!("http://{addr}")
    }

    async fn spawn_with_stub(fetcher: StubFetcher) -> String {
        let source = Url::parse("https://www.meetup.com/cities/au/sydney/").expect("url");
        spawn_app(Arc::new(fetcher), source).await
    }

    #[tokio::test]
    async fn serves_events_from_fixture_page() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cities/au/sydney/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FIXTURE_PAGE))
            .mount(&upstream)
            .await;

        let fetcher = HttpFetcher::new("test-agent", Duration::from_secs(5)).expect("client");
        let source = Url::parse(&format!("{}/cities/au/sydney/", upstream.uri())).expect("url");
        let base = spawn_app(Arc::new(fetcher), source).await;

        let response = reqwest::get(format!("{base}/api/events"))
            .await
            .expect("request");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );

        let events: Vec<Event> = response.json().await.expect("json body");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "Bondi to Bronte Coastal Walk");
        assert_eq!(events[1].title, "Sydney Rust Meetup");
        for event in &events {
            assert!(!event.id.is_empty());
            assert!(!event.title.is_empty());
        }
        assert_eq!(events[0].date, "8/11/2025");
        assert_eq!(events[0].time, "8:00:00 am");
        assert_eq!(events[0].location, "Bondi");
        assert_eq!(
            events[0].images,
            vec!["https://secure.meetupstatic.com/photos/401.jpeg".to_string()]
        );
        assert_eq!(events[1].description, "Talks and pizza.");
    }

    #[tokio::test]
    async fn raw_payload_uses_client_field_names() {
        let base = spawn_with_stub(StubFetcher::Page(FIXTURE_PAGE.to_string())).await;
        let body: serde_json::Value = reqwest::get(format!("{base}/api/events"))
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        let first = &body[0];
        assert_eq!(
            first["ticketUrl"],
            "https://www.meetup.com/sydney-walkers/events/401/"
        );
        assert_eq!(first["id"], first["ticketUrl"]);
    }

    #[tokio::test]
    async fn page_without_events_returns_empty_array() {
        let page = r#"<script type="application/ld+json">{"@type": "WebSite"}</script>"#;
        let base = spawn_with_stub(StubFetcher::Page(page.to_string())).await;
        let response = reqwest::get(format!("{base}/api/events"))
            .await
            .expect("request");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = response.json().await.expect("json");
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn fetch_failure_returns_generic_error() {
        let base = spawn_with_stub(StubFetcher::Fail).await;
        let response = reqwest::get(format!("{base}/api/events"))
            .await
            .expect("request");
        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = response.json().await.expect("json");
        assert_eq!(body, json!({"error": FETCH_FAILED}));
    }

    #[tokio::test]
    async fn fetch_timeout_is_reported_separately() {
        let base = spawn_with_stub(StubFetcher::Timeout).await;
        let response = reqwest::get(format!("{base}/api/events"))
            .await
            .expect("request");
        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = response.json().await.expect("json");
        assert_eq!(body, json!({"error": FETCH_TIMED_OUT}));
    }

    #[tokio::test]
    async fn health_and_preflight() {
        let base = spawn_with_stub(StubFetcher::Fail).await;
        let health: serde_json::Value = reqwest::get(format!("{base}/health"))
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(health, json!({"status": "ok"}));

        let preflight = reqwest::Client::new()
            .request(reqwest::Method::OPTIONS, format!("{base}/api/events"))
            .send()
            .await
            .expect("preflight");
        assert_eq!(preflight.status(), reqwest::StatusCode::NO_CONTENT);
        assert!(preflight
            .headers()
            .get("access-control-allow-methods")
            .is_some());
    }
}
