//! Request and response payload shapes, one module per endpoint family.
//!
//! These are declarative serde types; all behavior lives in the dispatch
//! layer. Optional request fields are skipped during serialization when
//! unset, optional response fields tolerate absence.

pub mod audio;
pub mod billing;
pub mod chat;
pub mod completions;
pub mod edit;
pub mod embedding;
pub mod file;
pub mod fine_tune;
pub mod image;
pub mod model;
pub mod moderation;
pub mod user;
