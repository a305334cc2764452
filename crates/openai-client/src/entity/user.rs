//! Organization user payloads

use serde::Deserialize;

/// Organization membership listing. The payload shape is undocumented, so
/// members are kept as raw JSON for the caller to inspect.
#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    #[serde(default)]
    pub members: serde_json::Value,
}
