//! Dispatch-layer error types

use thiserror::Error;

/// Failures surfaced by the dispatch layer.
///
/// Nothing here is retried automatically; every variant carries enough
/// structure for the caller to decide on retry, alerting, or user-facing
/// messaging. When a response warrants key invalidation, the pool is updated
/// before the error is returned, so a follow-up call already selects from
/// the reduced key set.
#[derive(Debug, Error)]
pub enum Error {
    /// The key pool has no usable key. The exhaustion notifier has already
    /// received the diagnostic snapshot by the time this is returned.
    #[error("no usable api key: pool exhausted")]
    NoApiKey,

    /// Connection-level failure (refused, timeout, TLS). The key used is
    /// untouched; transport failures are not evidence of key invalidity.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The remote service answered with a non-success status.
    #[error("remote rejected request with status {status}")]
    RemoteRejected {
        status: u16,
        body: String,
        /// Whether the classification took the key out of rotation.
        invalidated: bool,
    },

    /// A success response whose body did not match the expected shape.
    #[error("failed to decode response body: {0}")]
    Decode(String),

    /// Caller-side validation failure, raised before anything is sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Operation could not be mapped to a URL (bad override or variable
    /// count mismatch).
    #[error("endpoint resolution failed: {0}")]
    Endpoint(String),

    /// Client construction failed (bad proxy URL, builder error).
    #[error("client initialization failed: {0}")]
    Init(String),
}

/// Result alias for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_rejected_display_names_the_status() {
        let err = Error::RemoteRejected {
            status: 429,
            body: "{}".into(),
            invalidated: false,
        };
        assert_eq!(err.to_string(), "remote rejected request with status 429");
    }

    #[test]
    fn no_api_key_display_is_stable() {
        // Callers and alerting match on this wording.
        assert_eq!(Error::NoApiKey.to_string(), "no usable api key: pool exhausted");
    }
}
