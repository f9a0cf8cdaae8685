/*!
 * Structured Logging
 * Tracing subscriber setup for hosts and tests
 *
 * The library logs through the `log` facade and `tracing` spans. Installing
 * the subscriber here also bridges `log` records into `tracing`.
 */

use tracing::info;
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

fn use_json() -> bool {
    std::env::var("MEMPOOL_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false)
}

/// Install the global subscriber, returning false if one is already set
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - MEMPOOL_TRACE_JSON: Enable JSON output (default: false)
pub fn try_init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json(), "Memory pool tracing initialized");
    }
    installed
}

/// Install the global subscriber; a second call is a no-op
pub fn init_tracing() {
    if !try_init_tracing() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
