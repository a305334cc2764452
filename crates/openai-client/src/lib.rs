//! Client for an OpenAI-compatible API with weighted key rotation
//!
//! Every outbound call runs through the same core: a key is drawn from the
//! weighted pool, the logical operation is resolved to a URL, the request is
//! sent with the key's bearer token, and the response is classified. A
//! rejection that condemns the key (revocation, quota exhaustion) removes it
//! from rotation permanently; the remaining keys keep serving traffic until
//! the pool runs dry, at which point calls fail fast with a distinguished
//! error and an exhaustion event reaches the injected notifier.
//!
//! Two call shapes share that path:
//! - single-response dispatch (`chat_completions`, `embeddings`, ...)
//! - streaming relay (`stream_chat_completions`), which holds the connection
//!   open and forwards server-sent events to a caller-supplied sink
//!
//! The payload shapes under [`entity`] are declarative; all behavior lives in
//! [`client`], [`stream`], and the `openai-pool` crate.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod entity;
pub mod error;
mod metrics;
pub mod sse;
pub mod stream;

pub use client::OpenAiClient;
pub use config::{Config, KeyConfig, ProxyConfig};
pub use endpoint::{EndpointResolver, Operation};
pub use error::{Error, Result};
pub use sse::{SseDecoder, SseEvent};
pub use stream::{EventSink, StreamEnd, StreamHandle};
