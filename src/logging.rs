//! Sets up logging by reading configuration from environment variables.
//!
//! Environment variables used:
//! - RUST_LOG: full `tracing` filter directive, takes precedence
//! - LOG_LEVEL: "trace", "debug", "info", "warn" or "error"; default is "info"
//! - LOG_FORMAT: "pretty" (default) or "json"

use std::env;
use tracing_subscriber::{fmt, EnvFilter};

pub fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        EnvFilter::try_new(level.to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let json = env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = fmt().with_env_filter(filter).with_target(false);
    // A global subscriber may already be installed (tests, embedding).
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
