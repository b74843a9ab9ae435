use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use super::base::{self, DisplaySettings};
use crate::models::Event;

const EVENT_TYPE: &str = "Event";

static LD_JSON_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("ld+json script selector")
});

/// Pulls every `Event` out of the page's JSON-LD blocks, in document order.
/// A block that fails to parse is logged and skipped.
pub fn extract_events(html: &str, settings: &DisplaySettings) -> Vec<Event> {
    let document = Html::parse_document(html);
    let mut events = Vec::new();

    for (block, script) in document.select(&LD_JSON_SELECTOR).enumerate() {
        let text = script.text().collect::<String>();
        let parsed: Value = match serde_json::from_str(text.trim()) {
            Ok(value) => value,
            Err(err) => {
                warn!(block, error = %err, "skipping malformed JSON-LD block");
                continue;
            }
        };

        match &parsed {
            Value::Array(items) => {
                events.extend(items.iter().filter_map(|item| normalize(item, settings)))
            }
            Value::Object(_) => events.extend(normalize(&parsed, settings)),
            _ => debug!(block, "JSON-LD block is neither an object nor an array"),
        }
    }

    events
}

pub fn normalize(item: &Value, settings: &DisplaySettings) -> Option<Event> {
    if item.get("@type").and_then(Value::as_str) != Some(EVENT_TYPE) {
        return None;
    }

    let (title, url) = match (
        base::non_empty_str(item, "name"),
        base::non_empty_str(item, "url"),
    ) {
        (Some(title), Some(url)) => (title, url),
        _ => {
            debug!("dropping Event without name or url");
            return None;
        }
    };

    let (date, time) =
        base::date_and_time(item.get("startDate").and_then(Value::as_str), settings);

    Some(Event {
        id: url.to_string(),
        title: title.to_string(),
        date,
        time,
        location: base::locality(item),
        images: base::image_urls(item.get("image"), &settings.image_origin),
        ticket_url: url.to_string(),
        description: item
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}
