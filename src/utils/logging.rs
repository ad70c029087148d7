//! Logging initialization, grounded on the teacher's `utils/logging.rs`.
//!
//! Library code only ever emits `tracing` events; only the CLI binary calls
//! `init_logging` once at startup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging for the wallet client.
///
/// `RUST_LOG` always takes precedence over `filter`; absent both, defaults to
/// "info".
pub fn init_logging(filter: Option<&str>) {
    let mut env_filter = EnvFilter::from_default_env();

    if filter.is_some() && std::env::var("RUST_LOG").is_err() {
        if let Some(f) = filter {
            env_filter = EnvFilter::new(f);
        }
    }

    if std::env::var("RUST_LOG").is_err() && filter.is_none() {
        env_filter = EnvFilter::new("info");
    }

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(env_filter)
        .init();
}

/// Initialize logging with JSON output, for production/monitoring.
#[cfg(feature = "json-logging")]
pub fn init_json_logging(filter: Option<&str>) {
    let mut env_filter = EnvFilter::from_default_env();

    if filter.is_some() && std::env::var("RUST_LOG").is_err() {
        if let Some(f) = filter {
            env_filter = EnvFilter::new(f);
        }
    }

    if std::env::var("RUST_LOG").is_err() && filter.is_none() {
        env_filter = EnvFilter::new("info");
    }

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(env_filter)
        .init();
}

/// Initialize logging from [`crate::config::LoggingConfig`].
pub fn init_logging_from_config(config: Option<&crate::config::LoggingConfig>) {
    let filter = config.and_then(|c| c.filter.as_deref());

    if config.map(|c| c.json_format).unwrap_or(false) {
        #[cfg(feature = "json-logging")]
        {
            init_json_logging(filter);
        }
        #[cfg(not(feature = "json-logging"))]
        {
            init_logging(filter);
        }
    } else {
        init_logging(filter);
    }
}
