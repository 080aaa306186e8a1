use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ConciergeBotError, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LineConfig {
    pub channel_access_token: Option<String>,
    pub channel_secret: Option<String>,
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PollerConfig {
    pub poll_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    pub line: Option<LineConfig>,
    pub gemini: Option<GeminiConfig>,
    pub sqlite_path: Option<String>,
    pub utc_offset_hours: Option<i8>,
    pub poller: Option<PollerConfig>,
    /// Externally reachable base URL, used to build calendar-file download
    /// links. The daemon cannot infer this behind a proxy.
    pub public_base_url: Option<String>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConciergeBotError::Config(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConciergeBotError::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn from_store(db_path: &str) -> Result<Self> {
        crate::config_store::load_config(db_path)
    }

    pub fn sqlite_path(&self) -> String {
        self.sqlite_path
            .clone()
            .filter(|path| !path.trim().is_empty())
            .unwrap_or_else(default_db_path)
    }

    pub fn poll_seconds(&self) -> u64 {
        self.poller
            .as_ref()
            .and_then(|poller| poller.poll_seconds)
            .unwrap_or(60)
            .max(1)
    }

    /// Civil zone for every stored timestamp. Defaults to UTC+8.
    pub fn utc_offset_hours(&self) -> i8 {
        self.utc_offset_hours.unwrap_or(8)
    }

    pub fn public_base_url(&self) -> Option<String> {
        self.public_base_url
            .clone()
            .filter(|url| !url.trim().is_empty())
    }
}

pub fn default_db_path() -> String {
    "./data/concierge-bot.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_sections_missing() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.poll_seconds(), 60);
        assert_eq!(config.utc_offset_hours(), 8);
        assert_eq!(config.sqlite_path(), default_db_path());
    }
}
