//! Billing dashboard payloads
//!
//! The dashboard endpoints are not part of the published API surface;
//! undocumented substructures are kept as raw JSON.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CreditGrantsResponse {
    #[serde(default)]
    pub object: Option<String>,
    pub total_granted: f64,
    pub total_used: f64,
    pub total_available: f64,
    #[serde(default)]
    pub grants: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionResponse {
    #[serde(default)]
    pub object: Option<String>,
    pub has_payment_method: bool,
    pub soft_limit_usd: f64,
    pub hard_limit_usd: f64,
    #[serde(default)]
    pub system_hard_limit_usd: Option<f64>,
    #[serde(default)]
    pub access_until: Option<u64>,
    #[serde(default)]
    pub plan: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsageResponse {
    #[serde(default)]
    pub object: Option<String>,
    pub total_usage: f64,
    #[serde(default)]
    pub daily_costs: Option<serde_json::Value>,
}
