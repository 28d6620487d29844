//! Application configuration.

use crate::error::{AppError, AppResult};
use kiwoom_auth::{client::DEFAULT_BASE_URL, AuthConfig};
use kiwoom_telemetry::LogFormat;
use kiwoom_ws::{SessionConfig, DEFAULT_WS_URL};
use serde::Deserialize;
use std::fmt;

/// Env var naming the config file.
pub const CONFIG_ENV: &str = "KIWOOM_GATEWAY_CONFIG";
/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
pub const APPKEY_ENV: &str = "KIWOOM_APPKEY";
pub const SECRETKEY_ENV: &str = "KIWOOM_SECRETKEY";

/// REST credentials and token endpoint.
#[derive(Clone, Deserialize)]
pub struct AuthSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Overridden by `KIWOOM_APPKEY`.
    #[serde(default)]
    pub appkey: String,
    /// Overridden by `KIWOOM_SECRETKEY`.
    #[serde(default)]
    pub secretkey: String,
    /// Token request timeout (ms). Default: 10,000.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            appkey: String::new(),
            secretkey: String::new(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSection")
            .field("base_url", &self.base_url)
            .field("appkey", &self.appkey)
            .field("secretkey", &"<redacted>")
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Streaming connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Outbound frame queue size. Default: 1024.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Quote broadcast capacity per subscriber. Default: 4096.
    #[serde(default = "default_quote_buffer")]
    pub quote_buffer: usize,
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_outbound_buffer() -> usize {
    1024
}

fn default_quote_buffer() -> usize {
    4096
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            outbound_buffer: default_outbound_buffer(),
            quote_buffer: default_quote_buffer(),
        }
    }
}

/// Logging settings. `RUST_LOG` takes precedence over `filter`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub format: LogFormat,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub logging: LoggingSection,
    /// Stock codes registered on the `0B` channel after login.
    #[serde(default)]
    pub symbols: Vec<String>,
}

impl AppConfig {
    /// Resolve the config path: CLI arg > `KIWOOM_GATEWAY_CONFIG` > default.
    pub fn resolve_path(cli: Option<String>) -> String {
        cli.or_else(|| std::env::var(CONFIG_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    /// Load from a specific file and apply credential env overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;

        let mut config = Self::from_toml(&content)?;
        config.apply_credential_overrides(
            std::env::var(APPKEY_ENV).ok(),
            std::env::var(SECRETKEY_ENV).ok(),
        );
        Ok(config)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Replace credentials with non-empty override values.
    pub fn apply_credential_overrides(&mut self, appkey: Option<String>, secretkey: Option<String>) {
        if let Some(appkey) = appkey.filter(|v| !v.is_empty()) {
            self.auth.appkey = appkey;
        }
        if let Some(secretkey) = secretkey.filter(|v| !v.is_empty()) {
            self.auth.secretkey = secretkey;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.auth.appkey.trim().is_empty() {
            return Err(AppError::Config(format!(
                "auth.appkey is empty (set it in the file or via {APPKEY_ENV})"
            )));
        }
        if self.auth.secretkey.trim().is_empty() {
            return Err(AppError::Config(format!(
                "auth.secretkey is empty (set it in the file or via {SECRETKEY_ENV})"
            )));
        }
        if !self.auth.base_url.starts_with("http://") && !self.auth.base_url.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "auth.base_url must be an http(s) URL: {:?}",
                self.auth.base_url
            )));
        }
        if !self.stream.ws_url.starts_with("ws://") && !self.stream.ws_url.starts_with("wss://") {
            return Err(AppError::Config(format!(
                "stream.ws_url must be a ws(s) URL: {:?}",
                self.stream.ws_url
            )));
        }
        if self.stream.outbound_buffer == 0 || self.stream.quote_buffer == 0 {
            return Err(AppError::Config(
                "stream buffers must be greater than zero".to_string(),
            ));
        }
        if let Some(bad) = self
            .symbols
            .iter()
            .find(|s| s.is_empty() || s.chars().any(char::is_whitespace))
        {
            return Err(AppError::Config(format!("invalid symbol: {bad:?}")));
        }
        Ok(())
    }

    /// Configured symbols, de-duplicated in order.
    pub fn symbols(&self) -> Vec<String> {
        let mut seen = Vec::with_capacity(self.symbols.len());
        for symbol in &self.symbols {
            if !seen.contains(symbol) {
                seen.push(symbol.clone());
            }
        }
        seen
    }

    pub fn auth_config(&self) -> AuthConfig {
        let mut config = AuthConfig::new(self.auth.appkey.clone(), self.auth.secretkey.clone());
        config.base_url = self.auth.base_url.trim_end_matches('/').to_string();
        config.timeout_ms = self.auth.timeout_ms;
        config
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            url: self.stream.ws_url.clone(),
            outbound_buffer: self.stream.outbound_buffer,
        }
    }
}
