//! Small standalone helpers (logging setup, timestamps) shared across the
//! crate. Retry/backoff and timeout wrapping live on the state machines that
//! need them directly ([`crate::network::PeerManager`]'s reconnect backoff,
//! [`crate::chain::HeaderSyncState`]'s request timeout) rather than behind a
//! generic utility, since both are driven by an injectable [`crate::clock::Clock`]
//! and polled rather than `tokio::time::sleep`d.

pub mod logging;
pub mod time;

pub use logging::{init_logging, init_logging_from_config};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use time::{current_timestamp, current_timestamp_duration};
