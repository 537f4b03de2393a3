//! Relay configuration: JSON file with defaults, plus environment overrides.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    services::session_channel::ChannelSettings, state::leaderboard::LeaderboardSettings,
};

/// Default location on disk where the relay looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "QUIZ_LEADERBOARD_CONFIG_PATH";
const SESSION_CODE_ENV: &str = "SESSION_CODE";
const SERVER_URL_ENV: &str = "SERVER_URL";
const PORT_ENV: &str = "PORT";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// Immutable runtime configuration shared across the relay.
pub struct AppConfig {
    /// STOMP WebSocket endpoint of the session server.
    pub server_url: String,
    /// Session joined at startup.
    pub session_code: String,
    /// Name used when joining; `"Host"` joins as a non-competing host.
    pub display_name: String,
    pub user_id: Option<String>,
    pub display_avatar: Option<String>,
    /// Port of the local HTTP surface.
    pub port: u16,
    pub update_throttle_ms: u64,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    /// Zero disables heart-beats.
    pub heartbeat_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8080/ws".into(),
            session_code: String::new(),
            display_name: "Host".into(),
            user_id: None,
            display_avatar: None,
            port: 8090,
            update_throttle_ms: 300,
            reconnect_delay_ms: 5000,
            connect_timeout_ms: 10_000,
            heartbeat_ms: 10_000,
        }
    }
}

impl AppConfig {
    /// Load the configuration from disk and apply environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_file(&resolve_config_path());
        config.apply_overrides(|key| env::var(key).ok());
        config
    }

    /// Read `path`, falling back to defaults when it is missing or invalid.
    fn load_file(path: &PathBuf) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded relay configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(code) = lookup(SESSION_CODE_ENV).filter(|value| !value.is_empty()) {
            self.session_code = code;
        }
        if let Some(url) = lookup(SERVER_URL_ENV).filter(|value| !value.is_empty()) {
            self.server_url = url;
        }
        if let Some(raw) = lookup(PORT_ENV) {
            match raw.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(err) => warn!(value = %raw, error = %err, "ignoring invalid PORT"),
            }
        }
    }

    /// Store tunables derived from this configuration.
    pub fn leaderboard_settings(&self) -> LeaderboardSettings {
        LeaderboardSettings {
            update_throttle: Duration::from_millis(self.update_throttle_ms),
        }
    }

    /// Channel tunables derived from this configuration.
    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            heartbeat: self.heartbeat(),
            ..ChannelSettings::default()
        }
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let config: AppConfig =
            serde_json::from_str(r#"{ "sessionCode": "QUIZ42", "updateThrottleMs": 50 }"#).unwrap();
        assert_eq!(config.session_code, "QUIZ42");
        assert_eq!(config.update_throttle_ms, 50);
        assert_eq!(config.reconnect_delay_ms, 5000);
        assert_eq!(
            config.leaderboard_settings().update_throttle,
            Duration::from_millis(50)
        );
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_file(&PathBuf::from("does/not/exist.json"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn environment_overrides_win() {
        let vars: HashMap<&str, &str> = [
            ("SESSION_CODE", "ENV1"),
            ("SERVER_URL", "wss://quiz.example/ws"),
            ("PORT", "not-a-port"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|value| value.to_string()));
        assert_eq!(config.session_code, "ENV1");
        assert_eq!(config.server_url, "wss://quiz.example/ws");
        assert_eq!(config.port, 8090);
    }
}
