//! Common types shared by the key pool and client crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
