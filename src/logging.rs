//! Tracing subscriber setup for the gateway binary

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{GatewayError, Result};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` (usually the
/// configured `log_filter`) decides what is shown. Calling this twice keeps
/// the first subscriber.
pub fn init_logging(default_filter: &str) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(default_filter)?,
    };

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true);

    if tracing_subscriber::registry().with(env_filter).with(console_layer).try_init().is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
    Ok(())
}

/// Parse a filter directive string such as `info,fleetwire::protocol=trace`.
pub fn build_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives)
        .map_err(|e| GatewayError::config("log_filter", format!("{directives:?}: {e}")))
}
