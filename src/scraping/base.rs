use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::config::{AppConfig, DEFAULT_IMAGE_HOST};

/// Pins how start timestamps are rendered so output does not depend on the host locale.
#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub image_origin: String,
    pub timezone: Tz,
    pub date_format: String,
    pub time_format: String,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            image_origin: DEFAULT_IMAGE_HOST.to_string(),
            timezone: chrono_tz::Australia::Sydney,
            date_format: "%-d/%-m/%Y".to_string(),
            time_format: "%-I:%M:%S %P".to_string(),
        }
    }
}

impl DisplaySettings {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        Ok(Self {
            image_origin: config.image_origin(),
            timezone: config.tz()?,
            date_format: config.date_format.clone(),
            time_format: config.time_format.clone(),
        })
    }
}

/// A field counts as present only when it is a non-empty string.
pub fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

pub fn absolute_image(origin: &str, src: &str) -> String {
    if src.starts_with('/') {
        format!("{origin}{src}")
    } else {
        src.to_string()
    }
}

/// `image` may be missing, a string, an `ImageObject`, or a list of either.
pub fn image_urls(image: Option<&Value>, origin: &str) -> Vec<String> {
    match image {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(image_src)
            .map(|src| absolute_image(origin, src))
            .collect(),
        // a lone empty string means no image
        Some(Value::String(s)) if s.is_empty() => Vec::new(),
        Some(value) => image_src(value)
            .map(|src| vec![absolute_image(origin, src)])
            .unwrap_or_default(),
        None => Vec::new(),
    }
}

fn image_src(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(_) => non_empty_str(value, "url"),
        _ => None,
    }
}

pub fn locality(item: &Value) -> String {
    item.get("location")
        .and_then(|location| location.get("address"))
        .and_then(|address| non_empty_str(address, "addressLocality"))
        .map(str::to_string)
        .unwrap_or_default()
}

const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%dT%H:%M%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
];
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

pub fn parse_start(raw: &str, tz: Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&tz));
    }

    // Offsets RFC 3339 rejects: no seconds, `+1100`, or a bare `Z` after minutes.
    let with_offset = match raw.strip_suffix(&['Z', 'z'][..]) {
        Some(stripped) => format!("{stripped}+00:00"),
        None => raw.to_string(),
    };
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&with_offset, fmt) {
            return Some(dt.with_timezone(&tz));
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return resolve_local(&naive, tz);
        }
    }

    // Date-only values are midnight UTC.
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight).with_timezone(&tz))
}

/// Wall-clock times inside a DST gap move forward past the gap.
fn resolve_local(naive: &NaiveDateTime, tz: Tz) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(dt, _) => Some(dt),
        LocalResult::None => {
            let shifted = *naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .or_else(|| Some(Utc.from_utc_datetime(naive).with_timezone(&tz)))
        }
    }
}

/// Returns `(date, time)`; both empty when the timestamp is missing or unreadable.
pub fn date_and_time(start: Option<&str>, settings: &DisplaySettings) -> (String, String) {
    let Some(raw) = start else {
        return (String::new(), String::new());
    };
    match parse_start(raw, settings.timezone) {
        Some(dt) => (
            dt.format(&settings.date_format).to_string(),
            dt.format(&settings.time_format).to_string(),
        ),
        None => {
            tracing::debug!(start = raw, "unrecognized startDate");
            (String::new(), String::new())
        }
    }
}
