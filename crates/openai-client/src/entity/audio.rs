//! Audio transcription/translation payloads
//!
//! These requests travel as multipart form fields, not JSON; the dispatcher
//! applies each optional field to the form only when set.

use serde::Deserialize;

#[derive(Debug, Clone, Default)]
pub struct CreateAudioRequest {
    pub model: String,
    pub prompt: Option<String>,
    pub response_format: Option<String>,
    pub temperature: Option<f64>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAudioResponse {
    pub text: String,
}
