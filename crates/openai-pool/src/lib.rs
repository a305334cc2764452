//! Weighted API key pool for an OpenAI-compatible API
//!
//! Holds the configured set of API keys with their selection weights and
//! answers one question per outbound call: which key should this request use?
//! Selection is weighted random over the keys that are still valid; a key that
//! the remote service rejects for quota or authentication reasons is removed
//! from rotation permanently.
//!
//! Key lifecycle:
//! 1. The pool is built once at startup from configured `(token, weight)` pairs
//! 2. Each outbound call selects a key with probability proportional to weight
//! 3. The classifier flags quota/auth rejections → `invalidate` removes the key
//! 4. Remaining keys absorb the traffic (graceful degradation)
//! 5. When no valid key remains, `select` returns the `Exhausted` error and the
//!    dispatcher raises the exhaustion event to the injected notifier

pub mod classify;
pub mod error;
pub mod notify;
pub mod pool;

pub use classify::{ErrorPolicy, Verdict};
pub use error::{Error, Result};
pub use notify::{ExhaustionNotifier, LogNotifier};
pub use pool::{KeyId, KeyPool, SelectedKey};
