//! Streaming relay for server-sent event endpoints
//!
//! Opens a persistent connection with the key selected for the call and
//! forwards each decoded event to the caller's sink in arrival order. The
//! relay runs on its own task; the sink sees at most one call in flight and
//! exactly one terminal `on_closed` notification, whose cause distinguishes
//! normal completion, remote rejection, transport failure, and caller
//! cancellation.

use std::sync::Arc;

use futures_util::StreamExt;
use openai_pool::{ErrorPolicy, KeyId, KeyPool, Verdict};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use crate::sse::SseEvent;
use crate::sse::SseDecoder;

/// Terminal outcome of a relayed stream.
#[derive(Debug)]
pub enum StreamEnd {
    /// Remote signaled end-of-stream: a `[DONE]` payload or a clean close.
    Completed,
    /// The caller cancelled; the connection was closed, the key untouched.
    Cancelled,
    /// Remote rejected the stream, either at open or through an in-stream
    /// error payload.
    Rejected {
        status: u16,
        body: String,
        /// Whether the classification took the key out of rotation.
        invalidated: bool,
    },
    /// Connection-level failure before or during the stream. The key is
    /// untouched.
    Transport(String),
}

/// Caller-supplied receiver for relayed events.
///
/// `on_event` runs once per event in arrival order; `on_closed` runs exactly
/// once, last. Both are called from the relay task.
pub trait EventSink: Send + 'static {
    fn on_event(&mut self, event: SseEvent);
    fn on_closed(&mut self, end: StreamEnd);
}

/// Handle to an open stream.
///
/// Dropping the handle detaches it: the relay keeps forwarding events until
/// the remote closes the stream.
#[derive(Debug)]
pub struct StreamHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Ask the relay to stop. The connection closes promptly and the sink
    /// receives a single `StreamEnd::Cancelled`. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    /// Wait until the relay task has finished and the sink has received its
    /// terminal notification.
    pub async fn closed(self) {
        let _ = self.task.await;
    }
}

/// Spawn the relay task for an already-built request.
///
/// The request must carry the selected key's authorization header; `key_id`
/// identifies that key for invalidation should the remote reject it.
pub(crate) fn spawn_relay(
    request: reqwest::RequestBuilder,
    key_id: KeyId,
    pool: Arc<KeyPool>,
    policy: Arc<ErrorPolicy>,
    request_id: String,
    sink: impl EventSink,
) -> StreamHandle {
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let task = tokio::spawn(relay(request, key_id, pool, policy, request_id, cancel_rx, sink));
    StreamHandle {
        cancel: Some(cancel_tx),
        task,
    }
}

async fn relay(
    request: reqwest::RequestBuilder,
    key_id: KeyId,
    pool: Arc<KeyPool>,
    policy: Arc<ErrorPolicy>,
    request_id: String,
    cancel_rx: oneshot::Receiver<()>,
    mut sink: impl EventSink,
) {
    // A dropped handle must detach rather than cancel, so the closed-channel
    // case parks forever instead of firing the cancellation arm.
    let cancelled = async move {
        match cancel_rx.await {
            Ok(()) => (),
            Err(_) => std::future::pending().await,
        }
    };
    tokio::pin!(cancelled);

    let response = tokio::select! {
        _ = &mut cancelled => {
            debug!(request_id, "stream cancelled before connect");
            sink.on_closed(StreamEnd::Cancelled);
            return;
        }
        response = request.send() => response,
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!(request_id, error = %e, "stream connect failed");
            sink.on_closed(StreamEnd::Transport(e.to_string()));
            return;
        }
    };

    let status = response.status().as_u16();
    if !(200..300).contains(&status) {
        let body = response.text().await.unwrap_or_default();
        let invalidated = policy.classify(status, &body) == Verdict::Invalidate;
        if invalidated {
            pool.invalidate(key_id);
        }
        warn!(request_id, status, invalidated, "stream rejected at open");
        sink.on_closed(StreamEnd::Rejected {
            status,
            body,
            invalidated,
        });
        return;
    }

    let mut decoder = SseDecoder::new();
    let mut bytes = response.bytes_stream();

    loop {
        let chunk = tokio::select! {
            _ = &mut cancelled => {
                debug!(request_id, "stream cancelled by caller");
                sink.on_closed(StreamEnd::Cancelled);
                return;
            }
            chunk = bytes.next() => chunk,
        };

        match chunk {
            None => {
                debug!(request_id, "stream closed by remote");
                sink.on_closed(StreamEnd::Completed);
                return;
            }
            Some(Err(e)) => {
                warn!(request_id, error = %e, "stream read failed");
                sink.on_closed(StreamEnd::Transport(e.to_string()));
                return;
            }
            Some(Ok(chunk)) => {
                for event in decoder.feed(&chunk) {
                    if event.data == "[DONE]" {
                        debug!(request_id, "stream completed");
                        sink.on_closed(StreamEnd::Completed);
                        return;
                    }
                    if is_error_payload(&event.data) {
                        let invalidated =
                            policy.classify_stream_payload(&event.data) == Verdict::Invalidate;
                        if invalidated {
                            pool.invalidate(key_id);
                        }
                        warn!(request_id, invalidated, "stream carried error payload");
                        sink.on_closed(StreamEnd::Rejected {
                            status,
                            body: event.data,
                            invalidated,
                        });
                        return;
                    }
                    sink.on_event(event);
                }
            }
        }
    }
}

/// Whether a data payload is a remote-signaled error object rather than an
/// ordinary event.
fn is_error_payload(data: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(data)
        .map(|value| value.get("error").is_some_and(|e| !e.is_null()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_payload_detection() {
        assert!(is_error_payload(
            r#"{"error":{"message":"invalid_api_key","type":"invalid_request_error"}}"#
        ));
        assert!(!is_error_payload(r#"{"id":"chatcmpl-1","choices":[]}"#));
        assert!(!is_error_payload(r#"{"error":null}"#));
        assert!(!is_error_payload("[DONE]"));
        assert!(!is_error_payload("not json"));
    }
}
