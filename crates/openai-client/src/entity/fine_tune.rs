//! Fine-tune payloads

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateFineTuneRequest {
    pub training_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_epochs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_loss_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FineTuneEvent {
    pub object: String,
    pub created_at: u64,
    pub level: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FineTune {
    pub id: String,
    pub object: String,
    pub model: String,
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: Option<u64>,
    #[serde(default)]
    pub fine_tuned_model: Option<String>,
    pub status: String,
    #[serde(default)]
    pub events: Option<Vec<FineTuneEvent>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListFineTunesResponse {
    #[serde(default)]
    pub object: Option<String>,
    pub data: Vec<FineTune>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListFineTuneEventsResponse {
    #[serde(default)]
    pub object: Option<String>,
    pub data: Vec<FineTuneEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteFineTuneModelResponse {
    pub id: String,
    pub object: String,
    pub deleted: bool,
}
