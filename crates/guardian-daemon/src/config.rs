//! Agent configuration loaded from TOML.

use std::path::PathBuf;
use std::time::Duration;

use guardian_protocol::api::DEFAULT_DUPLICATE_SENTINEL;
use guardian_protocol::{ApiOptions, ChannelOptions};
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub quiz: QuizConfig,
}

/// Process-level settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Control server addressing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_url")]
    pub url: String,
    #[serde(default = "default_register_path")]
    pub register_path: String,
    /// Registration response body meaning "already registered".
    #[serde(default = "default_duplicate_sentinel")]
    pub duplicate_sentinel: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            register_path: default_register_path(),
            duplicate_sentinel: default_duplicate_sentinel(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn api_options(&self) -> ApiOptions {
        ApiOptions {
            server_url: self.url.clone(),
            register_path: self.register_path.clone(),
            duplicate_sentinel: self.duplicate_sentinel.clone(),
            request_timeout: self.request_timeout(),
        }
    }
}

/// Realtime channel reconnect settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl ChannelConfig {
    pub fn channel_options(&self, server: &ServerConfig) -> ChannelOptions {
        ChannelOptions {
            server_url: server.url.clone(),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
        }
    }
}

/// Questionnaire source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizConfig {
    /// TOML file with `[[questions]]`; the built-in set is used when unset.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_register_path() -> String {
    "/saveUid".to_string()
}

fn default_duplicate_sentinel() -> String {
    DEFAULT_DUPLICATE_SENTINEL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("url = \"http://localhost:3000\""));
        assert!(toml_str.contains("register_path = \"/saveUid\""));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.url, "http://localhost:3000");
        assert_eq!(config.server.duplicate_sentinel, DEFAULT_DUPLICATE_SENTINEL);
        assert_eq!(config.channel.initial_backoff_ms, 1000);
        assert!(config.quiz.file.is_none());
    }

    #[test]
    fn parse_example_config() {
        let toml_str = r#"
[daemon]
log_level = "debug"

[server]
url = "http://192.168.1.10:3000"
register_path = "/api/devices"
request_timeout_secs = 3

[channel]
initial_backoff_ms = 250
max_backoff_ms = 8000

[quiz]
file = "/etc/guardian/questions.toml"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.server.url, "http://192.168.1.10:3000");
        assert_eq!(config.server.request_timeout(), Duration::from_secs(3));

        let api = config.server.api_options();
        assert_eq!(api.register_path, "/api/devices");

        let channel = config.channel.channel_options(&config.server);
        assert_eq!(channel.server_url, "http://192.168.1.10:3000");
        assert_eq!(channel.initial_backoff, Duration::from_millis(250));
        assert_eq!(channel.max_backoff, Duration::from_millis(8000));
        assert_eq!(
            config.quiz.file.as_deref(),
            Some(std::path::Path::new("/etc/guardian/questions.toml"))
        );
    }

    #[test]
    fn max_backoff_never_below_initial() {
        let channel = ChannelConfig {
            initial_backoff_ms: 5000,
            max_backoff_ms: 100,
        };
        let options = channel.channel_options(&ServerConfig::default());
        assert_eq!(options.max_backoff, Duration::from_millis(5000));
    }
}
