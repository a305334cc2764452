//! Response classification for the dispatch layer
//!
//! Decides, per completed call, whether the response is a success, a transient
//! remote error, or evidence that the key used should leave rotation. Both
//! decision tables live on `ErrorPolicy` as plain data so an embedding
//! application can override them; the defaults cover the OpenAI status codes
//! and error-body phrasings.

/// Outcome of classifying an upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// 2xx - hand the body to the deserializer.
    Success,
    /// Remote error that does not poison the key (5xx, malformed request,
    /// per-minute rate limit). Safe to retry on the same key.
    Transient,
    /// The key itself was rejected (revoked, unauthorized, quota/billing
    /// exhausted). The dispatcher must invalidate it before surfacing the
    /// failure.
    Invalidate,
}

/// Invalidation phrases looked for in 429 and in-stream error payloads.
///
/// A 429 whose body matches none of these is an ordinary per-minute rate
/// limit and stays transient; only hard quota/billing/account errors take
/// the key out of rotation.
const DEFAULT_INVALIDATE_PATTERNS: &[&str] = &[
    "insufficient_quota",
    "exceeded your current quota",
    "billing hard limit",
    "account_deactivated",
    "access_terminated",
    "invalid_api_key",
    "incorrect api key",
];

/// Statuses that always invalidate the key regardless of body.
const DEFAULT_INVALIDATE_STATUSES: &[u16] = &[401, 403];

/// Table-driven classification policy.
#[derive(Debug, Clone)]
pub struct ErrorPolicy {
    /// Statuses that unconditionally invalidate the key used.
    pub invalidate_statuses: Vec<u16>,
    /// Case-insensitive body substrings that invalidate on 429 responses and
    /// in-stream error payloads.
    pub invalidate_patterns: Vec<String>,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            invalidate_statuses: DEFAULT_INVALIDATE_STATUSES.to_vec(),
            invalidate_patterns: DEFAULT_INVALIDATE_PATTERNS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ErrorPolicy {
    /// Classify a completed response by status and raw body.
    ///
    /// The success range is `[200, 300)`. Outside it, the status table is
    /// checked first; 429 falls back to body-pattern matching; everything
    /// else is transient.
    pub fn classify(&self, status: u16, body: &str) -> Verdict {
        if (200..300).contains(&status) {
            return Verdict::Success;
        }
        if self.invalidate_statuses.contains(&status) {
            return Verdict::Invalidate;
        }
        if status == 429 && self.matches_invalidate_pattern(body) {
            return Verdict::Invalidate;
        }
        Verdict::Transient
    }

    /// Classify a remote-signaled error payload carried inside an open
    /// stream, where no per-event status code exists. Pattern table only.
    pub fn classify_stream_payload(&self, body: &str) -> Verdict {
        if self.matches_invalidate_pattern(body) {
            Verdict::Invalidate
        } else {
            Verdict::Transient
        }
    }

    fn matches_invalidate_pattern(&self, body: &str) -> bool {
        let lower = body.to_lowercase();
        self.invalidate_patterns
            .iter()
            .any(|pattern| lower.contains(pattern.as_str()))
    }
}
