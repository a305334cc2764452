//! Exhaustion notification
//!
//! When a call finds no usable key, the dispatcher raises a single event to
//! an injected observer instead of broadcasting application-wide. The payload
//! is the pool's masked-fingerprint snapshot, so the event can be forwarded
//! to alerting without leaking raw secrets.

use tracing::error;

/// Observer notified when the pool has no usable key left.
///
/// Fire-and-forget from the dispatcher's perspective: the notification never
/// blocks or delays the failure being returned to the caller.
pub trait ExhaustionNotifier: Send + Sync {
    /// Called with the masked fingerprints of every invalidated key.
    fn exhausted(&self, invalidated: &[String]);
}

/// Default notifier: raises a structured error event in the log stream.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl ExhaustionNotifier for LogNotifier {
    fn exhausted(&self, invalidated: &[String]) {
        error!(
            invalidated = ?invalidated,
            "api key pool exhausted, no usable key remains"
        );
    }
}
