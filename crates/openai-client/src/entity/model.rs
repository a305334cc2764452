//! Model listing payloads

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    pub id: String,
    pub object: String,
    #[serde(default)]
    pub created: Option<u64>,
    pub owned_by: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListModelsResponse {
    pub object: String,
    pub data: Vec<Model>,
}
