//! Structured logging.
//!
//! # Responsibilities
//! - Install the process-wide `tracing` subscriber
//! - Let `RUST_LOG` override the configured level
//!
//! # Design Decisions
//! - Human-readable fmt output; the host's trace layer adds request spans

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `default_filter` is used when `RUST_LOG`
/// is unset or invalid, e.g. `"info"` or `"gateway_adapter=debug"`.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_logging(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

/// Default filter for a configured level: our crate and the HTTP trace
/// layer at `level`, everything else at `warn`.
pub fn default_filter(level: &str) -> String {
    format!("warn,gateway_adapter={level},tower_http={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_directives_parse() {
        let filter = default_filter("debug");
        assert!(EnvFilter::try_new(&filter).is_ok());
        assert!(filter.contains("gateway_adapter=debug"));
    }
}
