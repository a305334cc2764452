//! File payloads

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
    pub object: String,
    pub bytes: u64,
    pub created_at: u64,
    pub filename: String,
    pub purpose: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListFilesResponse {
    #[serde(default)]
    pub object: Option<String>,
    pub data: Vec<FileObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteFileResponse {
    pub id: String,
    pub object: String,
    pub deleted: bool,
}
