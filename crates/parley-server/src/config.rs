//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (PARLEY_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Room listing configuration.
    #[serde(default)]
    pub rooms: RoomsConfig,

    /// Message store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// AI reply suggestion configuration.
    #[serde(default)]
    pub suggest: SuggestConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Room listing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomsConfig {
    /// Rooms advertised on `GET /api/rooms`. Joining other rooms is still
    /// allowed; this is the list the presentation layer offers.
    #[serde(default = "default_rooms")]
    pub available: Vec<String>,
}

/// Message store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the durable message log snapshot.
    #[serde(default = "default_store_path")]
    pub path: String,
}

/// AI reply suggestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestConfig {
    /// Text-generation API endpoint.
    #[serde(default = "default_suggest_api_url")]
    pub api_url: String,

    /// API key, appended as a query parameter. Defaults to the
    /// GEMINI_API_KEY environment variable.
    #[serde(default = "default_suggest_api_key")]
    pub api_key: Option<String>,

    /// Request timeout in milliseconds.
    #[serde(default = "default_suggest_timeout")]
    pub timeout_ms: u64,

    /// Suggestion returned when the upstream call fails.
    #[serde(default = "default_suggest_fallback")]
    pub fallback: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum inbound event size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("PARLEY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("PARLEY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_rooms() -> Vec<String> {
    vec![
        "general".to_string(),
        "random".to_string(),
        "help".to_string(),
    ]
}

fn default_store_path() -> String {
    std::env::var("PARLEY_STORE_PATH").unwrap_or_else(|_| "messages.json".to_string())
}

fn default_suggest_api_url() -> String {
    std::env::var("PARLEY_SUGGEST_URL").unwrap_or_else(|_| {
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:generateContent"
            .to_string()
    })
}

fn default_suggest_api_key() -> Option<String> {
    std::env::var("GEMINI_API_KEY").ok()
}

fn default_suggest_timeout() -> u64 {
    10_000 // 10 seconds
}

fn default_suggest_fallback() -> String {
    "I'm not sure how to respond to that.".to_string()
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KiB
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            rooms: RoomsConfig::default(),
            store: StoreConfig::default(),
            suggest: SuggestConfig::default(),
            limits: LimitsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            available: default_rooms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            api_url: default_suggest_api_url(),
            api_key: default_suggest_api_key(),
            timeout_ms: default_suggest_timeout(),
            fallback: default_suggest_fallback(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        // Try to load from default paths
        let config_paths = [
            "parley.toml",
            "/etc/parley/parley.toml",
            "~/.config/parley/parley.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(
            config.rooms.available,
            vec!["general", "random", "help"]
        );
        assert_eq!(config.suggest.timeout_ms, 10_000);
        assert_eq!(config.limits.max_message_size, 64 * 1024);
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 3001,
            ..Config::default()
        };
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 3001);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [rooms]
            available = ["lobby"]

            [store]
            path = "/var/lib/parley/messages.json"

            [suggest]
            timeout_ms = 5000

            [limits]
            max_message_size = 1024
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.rooms.available, vec!["lobby"]);
        assert_eq!(config.store.path, "/var/lib/parley/messages.json");
        assert_eq!(config.suggest.timeout_ms, 5000);
        assert_eq!(config.limits.max_message_size, 1024);
    }
}
