use dirs::config_dir;
use std::path::PathBuf;

const APP_DIR: &str = "sydney-events";

pub fn config_root() -> PathBuf {
    config_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
        .join(APP_DIR)
}

/// Config file location: `SYDNEY_EVENTS_CONFIG` wins, else `<config dir>/sydney-events/config.json`.
pub fn config_path() -> PathBuf {
    match std::env::var("SYDNEY_EVENTS_CONFIG") {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path.trim()),
        _ => config_root().join("config.json"),
    }
}
