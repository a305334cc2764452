//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The key list may be supplied through the `OPENAI_API_KEYS` env var
//! (comma-separated, weight 1 each), which replaces any keys from the TOML
//! so secrets never have to live in the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Root configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL joined with each operation's path suffix.
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
    /// Per-operation full-URL overrides, keyed by operation name
    /// (e.g. `chat-completions`).
    #[serde(default)]
    pub urls: BTreeMap<String, String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// End-to-end timeout for single-response calls. Streaming calls are
    /// exempt; they live until completion or cancellation.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

/// One API key with its selection weight.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyConfig {
    pub token: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

/// Forward proxy for outbound calls.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_domain() -> String {
    "https://api.openai.com".to_string()
}

fn default_weight() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    60
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment
    /// variables and validate.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        // OPENAI_API_KEYS replaces the configured key set entirely.
        if let Ok(raw) = std::env::var("OPENAI_API_KEYS") {
            let keys: Vec<KeyConfig> = raw
                .split(',')
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(|token| KeyConfig {
                    token: token.to_string(),
                    weight: default_weight(),
                })
                .collect();
            if !keys.is_empty() {
                config.keys = keys;
            }
        }

        if !config.domain.starts_with("http://") && !config.domain.starts_with("https://") {
            return Err(common::Error::Config(format!(
                "domain must start with http:// or https://, got: {}",
                config.domain
            )));
        }

        if config.request_timeout_secs == 0 {
            return Err(common::Error::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if config.keys.is_empty() {
            return Err(common::Error::Config(
                "no api keys configured: provide [[keys]] entries or OPENAI_API_KEYS".into(),
            ));
        }

        if let Some(bad) = config.keys.iter().find(|k| k.token.trim().is_empty()) {
            return Err(common::Error::Config(format!(
                "api key with weight {} has an empty token",
                bad.weight
            )));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or OPENAI_CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("OPENAI_CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("openai-client.toml")
    }

    /// `(token, weight)` pairs for pool construction.
    pub fn key_pairs(&self) -> impl Iterator<Item = (String, u32)> + '_ {
        self.keys.iter().map(|k| (k.token.clone(), k.weight))
    }
}
