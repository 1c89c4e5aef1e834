use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::common::{ChannelId, TeamId};

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";
const API_SUFFIX: &str = "/api/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: String,
    /// Derived from `api_base_url` when empty.
    pub socket_url: String,
    pub access_token: Option<String>,
    pub user_id: Option<String>,
    pub team_id: Option<TeamId>,
    pub channel_id: Option<ChannelId>,
    pub page_size: usize,
    pub typing_ttl_ms: u64,
    pub cache_path: PathBuf,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000/api/v1".to_string(),
            socket_url: String::new(),
            access_token: None,
            user_id: None,
            team_id: None,
            channel_id: None,
            page_size: 50,
            typing_ttl_ms: 2000,
            cache_path: PathBuf::from("data/session.db"),
            reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
        }
    }
}

impl AppConfig {
    /// Applies `CHAT_*` environment overrides and normalizes URLs.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CHAT_API_URL") {
            self.api_base_url = url;
        }
        if let Some(url) = lookup("CHAT_SOCKET_URL") {
            self.socket_url = url;
        }
        if let Some(token) = lookup("CHAT_TOKEN") {
            self.access_token = Some(token);
        }
        if let Some(user_id) = lookup("CHAT_USER_ID") {
            self.user_id = Some(user_id);
        }
        self.normalize()
    }

    fn normalize(mut self) -> Self {
        self.api_base_url = normalize_api_url(&self.api_base_url);
        if self.socket_url.trim().is_empty() {
            self.socket_url = derive_socket_url(&self.api_base_url);
        }
        self.page_size = self.page_size.max(1);
        self
    }

    pub fn typing_ttl(&self) -> Duration {
        Duration::from_millis(self.typing_ttl_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Trims trailing slashes and makes sure the path ends in `/api/v1`.
pub fn normalize_api_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.ends_with(API_SUFFIX) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{API_SUFFIX}")
    }
}

/// `http(s)://host:port/...` → `ws(s)://host:port/ws`.
pub fn derive_socket_url(api_base_url: &str) -> String {
    match Url::parse(api_base_url) {
        Ok(mut url) => {
            let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
            if url.set_scheme(scheme).is_err() {
                log::warn!("Cannot derive socket scheme from {api_base_url}");
            }
            url.set_path("/ws");
            url.set_query(None);
            url.to_string()
        }
        Err(err) => {
            log::warn!("Invalid API url {api_base_url}: {err}");
            "ws://127.0.0.1:8000/ws".to_string()
        }
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    let config = match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    };
    config.with_env(|name| std::env::var(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_normalization() {
        assert_eq!(normalize_api_url("http://host:8000/"), "http://host:8000/api/v1");
        assert_eq!(normalize_api_url("http://host:8000/api/v1//"), "http://host:8000/api/v1");
    }

    #[test]
    fn test_socket_url_derivation() {
        assert_eq!(derive_socket_url("http://host:8000/api/v1"), "ws://host:8000/ws");
        assert_eq!(derive_socket_url("https://chat.example.edu/api/v1"), "wss://chat.example.edu/ws");
    }

    #[test]
    fn test_env_overrides_file_values() {
        let config = AppConfig {
            access_token: Some("from-file".to_string()),
            ..AppConfig::default()
        }
        .with_env(|name| match name {
            "CHAT_API_URL" => Some("https://school.example/".to_string()),
            "CHAT_TOKEN" => Some("from-env".to_string()),
            _ => None,
        });
        assert_eq!(config.api_base_url, "https://school.example/api/v1");
        assert_eq!(config.socket_url, "wss://school.example/ws");
        assert_eq!(config.access_token.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"team_id": 3, "page_size": 0}"#).unwrap();
        let config = config.with_env(|_| None);
        assert_eq!(config.team_id, Some(3));
        assert_eq!(config.page_size, 1);
        assert_eq!(config.typing_ttl(), Duration::from_secs(2));
        assert_eq!(config.reconnect_attempts, 5);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = load_config(path.to_str().unwrap());
        assert_eq!(config.page_size, 50);
    }
}
