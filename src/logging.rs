//! `tracing` setup for the server binary.
//!
//! [`init_logging`] installs a global subscriber once; later calls are no-ops.

use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "sydney_events=info,sydney_events_lib=info";

static INITIALISED: OnceLock<()> = OnceLock::new();

pub fn init_logging(format: LogFormat) -> anyhow::Result<()> {
    if INITIALISED.get().is_some() {
        return Ok(());
    }

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))?;

    let _ = INITIALISED.set(());
    Ok(())
}
