//! Secret wrapper for API tokens

use std::fmt;
use zeroize::Zeroize;

/// An API token - redacted in Debug/Display/logs, zeroized on drop.
///
/// Diagnostics that need to name a key (invalidation warnings, exhaustion
/// events) use `fingerprint()`, which keeps only the leading and trailing
/// characters of the token.
pub struct Secret(String);

impl Secret {
    /// Wrap a token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the raw token (use sparingly - authorization headers only).
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Masked form safe for logs and outbound diagnostics.
    ///
    /// Tokens of 9+ characters render as `sk-ab…yz` (first five, last two);
    /// anything shorter is fully masked since there is not enough material
    /// to mask meaningfully.
    pub fn fingerprint(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() < 9 {
            return "***".to_string();
        }
        let head: String = chars[..5].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{head}\u{2026}{tail}")
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_are_redacted() {
        let secret = Secret::new("sk-live-abcdef123456");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn expose_returns_raw_value() {
        let secret = Secret::new("sk-live-abcdef123456");
        assert_eq!(secret.expose(), "sk-live-abcdef123456");
    }

    #[test]
    fn fingerprint_masks_middle() {
        let secret = Secret::new("sk-live-abcdef123456");
        let fp = secret.fingerprint();
        assert_eq!(fp, "sk-li\u{2026}56");
        assert!(!fp.contains("abcdef"), "fingerprint must not leak the body");
    }

    #[test]
    fn short_tokens_are_fully_masked() {
        assert_eq!(Secret::new("sk-12345").fingerprint(), "***");
        assert_eq!(Secret::new("").fingerprint(), "***");
    }

    #[test]
    fn fingerprint_handles_multibyte_tokens() {
        // Must not panic on non-ASCII input even though real tokens are ASCII.
        let secret = Secret::new("ключ-секрет-123");
        let fp = secret.fingerprint();
        assert!(fp.contains('\u{2026}'));
    }
}
