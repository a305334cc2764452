//! Metrics facade helpers
//!
//! Emits through the `metrics` facade; without an installed recorder every
//! call is a no-op, so the client works unchanged in embedders that don't
//! wire up metrics.
//!
//! - `openai_requests_total` (counter): labels `operation`, `status`
//! - `openai_request_duration_seconds` (histogram): label `operation`

/// Record a completed dispatch with its upstream status.
pub(crate) fn record_request(operation: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "openai_requests_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "openai_request_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration_secs);
}

/// Record a dispatch that never produced a response (connection-level failure).
pub(crate) fn record_transport_error(operation: &str) {
    metrics::counter!(
        "openai_transport_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        // When no recorder is installed, metrics calls are no-ops.
        record_request("chat-completions", 200, 0.131);
        record_transport_error("chat-completions");
    }
}
