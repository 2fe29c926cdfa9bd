use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use clawlink_protocol::{ClientInfo, MAX_PROTOCOL, MIN_PROTOCOL};

use crate::client::ClientOptions;
use crate::credentials::Credentials;
use crate::transport::WsOptions;

/// Where the bearer token travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenPlacement {
    /// `auth.token` inside the connect handshake (current gateways)
    #[default]
    Handshake,
    /// `Authorization: Bearer` on the upgrade request (older gateways)
    Header,
}

/// Wire format for outgoing chat messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    /// `{"type":"req","method":"chat.send"}`
    #[default]
    Enveloped,
    /// `{"kind":"session.send"}`
    Legacy,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Gateway URL, http:// or https:// (e.g. "https://gateway.example.com")
    #[serde(default)]
    pub gateway_url: Option<String>,

    /// Gateway authentication token
    #[serde(default)]
    pub auth_token: Credentials,

    /// Session key for chat messages. Defaults to "main".
    #[serde(default = "default_session_key")]
    pub session_key: String,

    #[serde(default)]
    pub token_placement: TokenPlacement,

    #[serde(default)]
    pub dialect: Dialect,

    /// Give up on a handshake that is not acknowledged in time.
    /// Unset means wait indefinitely.
    #[serde(default)]
    pub handshake_timeout_secs: Option<u64>,

    /// Socket open timeout in seconds. Defaults to 15.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Keep-alive ping interval in seconds; 0 disables. Defaults to 30.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    #[serde(default)]
    pub client: ClientIdentity,
}

/// Static descriptor sent with every handshake.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClientIdentity {
    #[serde(default = "default_client_id")]
    pub id: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default = "default_platform")]
    pub platform: String,

    #[serde(default = "default_device_family")]
    pub device_family: String,

    #[serde(default = "default_model_identifier")]
    pub model_identifier: String,

    #[serde(default = "default_mode")]
    pub mode: String,

    /// Stable per-install id, if the gateway should tell instances apart
    #[serde(default)]
    pub instance_id: Option<String>,

    #[serde(default = "default_min_protocol")]
    pub min_protocol: u32,

    #[serde(default = "default_max_protocol")]
    pub max_protocol: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_url: None,
            auth_token: Credentials::none(),
            session_key: default_session_key(),
            token_placement: TokenPlacement::default(),
            dialect: Dialect::default(),
            handshake_timeout_secs: None,
            connect_timeout_secs: default_connect_timeout(),
            ping_interval_secs: default_ping_interval(),
            client: ClientIdentity::default(),
        }
    }
}

impl Default for ClientIdentity {
    fn default() -> Self {
        Self {
            id: default_client_id(),
            version: default_version(),
            platform: default_platform(),
            device_family: default_device_family(),
            model_identifier: default_model_identifier(),
            mode: default_mode(),
            instance_id: None,
            min_protocol: default_min_protocol(),
            max_protocol: default_max_protocol(),
        }
    }
}

impl ClientIdentity {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.min_protocol == 0 || self.max_protocol == 0 {
            anyhow::bail!(
                "protocol versions must be positive (min_protocol = {}, max_protocol = {})",
                self.min_protocol,
                self.max_protocol
            );
        }
        if self.min_protocol > self.max_protocol {
            anyhow::bail!(
                "min_protocol ({}) is greater than max_protocol ({})",
                self.min_protocol,
                self.max_protocol
            );
        }
        Ok(())
    }

    pub fn client_info(&self) -> ClientInfo {
        ClientInfo {
            id: self.id.clone(),
            version: self.version.clone(),
            platform: self.platform.clone(),
            device_family: self.device_family.clone(),
            model_identifier: self.model_identifier.clone(),
            mode: self.mode.clone(),
            instance_id: self.instance_id.clone(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(config)
    }

    /// Default config location: ~/.clawlink/config.toml.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".clawlink")
            .join("config.toml")
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.client.validate()?;
        if self.session_key.trim().is_empty() {
            anyhow::bail!("session_key must not be empty");
        }
        Ok(())
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            identity: self.client.clone(),
            token_placement: self.token_placement,
            dialect: self.dialect,
            handshake_timeout: self.handshake_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn transport_options(&self) -> WsOptions {
        WsOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ping_interval: (self.ping_interval_secs > 0)
                .then(|| Duration::from_secs(self.ping_interval_secs)),
        }
    }
}

fn default_session_key() -> String {
    "main".to_string()
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_ping_interval() -> u64 {
    30
}

fn default_client_id() -> String {
    "cli".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_platform() -> String {
    std::env::consts::OS.to_string()
}

fn default_device_family() -> String {
    std::env::consts::FAMILY.to_string()
}

fn default_model_identifier() -> String {
    std::env::consts::ARCH.to_string()
}

fn default_mode() -> String {
    "cli".to_string()
}

fn default_min_protocol() -> u32 {
    MIN_PROTOCOL
}

fn default_max_protocol() -> u32 {
    MAX_PROTOCOL
}
