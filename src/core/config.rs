use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_api_host")]
    pub api_host: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Reconciliation cadence for the connection health poller.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Shared token required on mutating API calls when non-empty.
    #[serde(default)]
    pub internal_token: String,

    #[serde(default)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_realtime_url")]
    pub realtime_url: String,

    #[serde(default = "default_stateless_url")]
    pub stateless_url: String,

    /// Usually supplied via STAGEHAND_API_KEY rather than the config file.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_realtime_model")]
    pub realtime_model: String,

    #[serde(default = "default_stateless_model")]
    pub stateless_model: String,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_api_host() -> String {
    "127.0.0.1".to_string()
}
fn default_api_port() -> u16 {
    18790
}
fn default_data_dir() -> String {
    "stagehand-data".to_string()
}
fn default_poll_interval() -> u64 {
    15
}
fn default_realtime_url() -> String {
    "wss://api.openai.com/v1/realtime".to_string()
}
fn default_stateless_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_realtime_model() -> String {
    "gpt-4o-realtime-preview".to_string()
}
fn default_stateless_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_output_tokens() -> u32 {
    2048
}

impl Default for DaemonConfig {
    fn default() -> Self {
        json5::from_str("{}").expect("empty config must deserialize")
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        json5::from_str("{}").expect("empty config must deserialize")
    }
}

impl DaemonConfig {
    /// Load `stagehand.json5` if present, then apply env overrides. A missing
    /// file is not an error; every field has a default.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config at {:?}", path))?;
            let parsed: DaemonConfig =
                json5::from_str(&raw).with_context(|| format!("parsing config at {:?}", path))?;
            info!("Loaded config from {:?}", path);
            parsed
        } else {
            DaemonConfig::default()
        };

        if let Ok(key) = std::env::var("STAGEHAND_API_KEY")
            && !key.is_empty()
        {
            config.provider.api_key = key;
        }
        if let Ok(dir) = std::env::var("STAGEHAND_DATA_DIR")
            && !dir.is_empty()
        {
            config.data_dir = dir;
        }
        if let Ok(token) = std::env::var("STAGEHAND_INTERNAL_TOKEN")
            && !token.is_empty()
        {
            config.internal_token = token;
        }

        Ok(config)
    }
}
