//! Edit payloads

use serde::{Deserialize, Serialize};

use super::chat::Usage;

#[derive(Debug, Clone, Default, Serialize)]
pub struct EditRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditChoice {
    pub text: String,
    pub index: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditResponse {
    pub object: String,
    pub created: u64,
    pub choices: Vec<EditChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}
