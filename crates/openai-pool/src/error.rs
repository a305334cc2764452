//! Error types for pool operations

/// Errors from pool operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No key is eligible for selection. Raised both when every key has been
    /// invalidated and when the remaining valid keys all carry weight zero.
    #[error("key pool exhausted: {invalid} of {total} keys invalidated")]
    Exhausted { total: usize, invalid: usize },
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
