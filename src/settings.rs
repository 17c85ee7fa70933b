use crate::channel::ChannelOptions;
use serde::Deserialize;
use std::time::Duration;

/// Client-side settings for the console core.
///
/// Layered from an optional `botdeck` config file (YAML/TOML/JSON, working
/// directory) and `BOTDECK_*` environment variables; every field has a
/// default so a bare environment works out of the box.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// REST base URL, e.g. `http://localhost:3000`.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Push channel endpoint, e.g. `ws://localhost:3000/gateway`.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Consecutive failed connection attempts before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Coalescing window between the last edit and the persistence write.
    #[serde(default = "default_autosave_delay_ms")]
    pub autosave_delay_ms: u64,

    /// REST request timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default)]
    pub debug_mode: bool,
}

impl Settings {
    /// Load settings from `botdeck.{yaml,toml,json}` (optional) overlaid
    /// with `BOTDECK_*` environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("botdeck").required(false))
            .add_source(config::Environment::with_prefix("BOTDECK"))
            .build()?
            .try_deserialize()
    }

    /// Connection policy for [`crate::channel::PushChannel`].
    pub fn channel_options(&self) -> ChannelOptions {
        ChannelOptions {
            url: self.gateway_url.clone(),
            auto_reconnect: self.auto_reconnect,
            max_reconnect_attempts: Some(self.max_reconnect_attempts),
            reconnect_delay_ms: self.reconnect_delay_ms,
            max_reconnect_delay_ms: self.max_reconnect_delay_ms,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            gateway_url: default_gateway_url(),
            auto_reconnect: true,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            autosave_delay_ms: default_autosave_delay_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            log_dir: default_log_dir(),
            debug_mode: false,
        }
    }
}

fn default_api_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_gateway_url() -> String {
    "ws://localhost:3000/gateway".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_reconnect_delay_ms() -> u64 {
    500
}

fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_autosave_delay_ms() -> u64 {
    1_000
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_log_dir() -> String {
    "logs".to_string()
}
