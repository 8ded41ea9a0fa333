pub mod config;
pub mod error;
pub mod keys;
pub mod path;

pub use error::{Error, Result};

/// Hostname of the node this store instance runs on. Used as the locality
/// hint on block fetches and as the endpoint reported for local replicas.
pub fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Wall-clock milliseconds since the epoch, the column timestamp domain.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
