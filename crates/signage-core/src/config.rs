use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

/// Startup configuration problems are fatal — the agent cannot guarantee
/// any content without valid credentials and a reachable authority.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("backend_url is not set in {0}")]
    MissingBackendUrl(PathBuf),
    #[error("device_token is not set in {0}")]
    MissingDeviceToken(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Where the schedule authority lives and who this device is.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    /// Base URL of the schedule authority, e.g. `https://signage.example.com`.
    #[serde(default)]
    pub backend_url: String,
    /// Per-device token issued at registration.
    #[serde(default)]
    pub device_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Fine-grained activation check (cheap, local).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Coarse schedule fetch from the authority (network).
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval_secs: u64,
    /// Fixed UTC offset the schedule timestamps are interpreted in.
    /// Defaults to +05:30 (IST), matching the original fleet deployment.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_minutes: i32,
    /// Upper bound on simultaneous media downloads.
    #[serde(default = "default_max_downloads")]
    pub max_concurrent_downloads: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlayerMode {
    /// Spawn a fresh player process per playlist change.
    Process,
    /// One long-lived player driven over the RC channel (no restart flicker).
    #[default]
    RemoteControl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub mode: PlayerMode,
    #[serde(default = "default_rc_port")]
    pub rc_port: u16,
    #[serde(default = "default_fullscreen")]
    pub fullscreen: bool,
    /// Per-exchange timeout on the RC channel. Must stay well under the
    /// poll interval so a hung player never stalls the loop.
    #[serde(default = "default_control_timeout")]
    pub control_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory for downloaded media files.
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            fetch_interval_secs: default_fetch_interval(),
            utc_offset_minutes: default_utc_offset(),
            max_concurrent_downloads: default_max_downloads(),
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            mode: PlayerMode::default(),
            rc_port: default_rc_port(),
            fullscreen: default_fullscreen(),
            control_timeout_secs: default_control_timeout(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_http_port(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            media_dir: default_media_dir(),
        }
    }
}

fn default_poll_interval() -> u64 {
    5
}

fn default_fetch_interval() -> u64 {
    60
}

fn default_utc_offset() -> i32 {
    330
}

fn default_max_downloads() -> usize {
    2
}

fn default_rc_port() -> u16 {
    platform::PLAYER_RC_PORT
}

fn default_fullscreen() -> bool {
    true
}

fn default_control_timeout() -> u64 {
    2
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8791
}

fn default_media_dir() -> PathBuf {
    platform::media_dir()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            tracing::info!("created default config at {:?}", config_path);
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    /// Reject configs the agent cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.backend_url.trim().is_empty() {
            return Err(ConfigError::MissingBackendUrl(Self::config_path()));
        }
        if self.server.device_token.trim().is_empty() {
            return Err(ConfigError::MissingDeviceToken(Self::config_path()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.agent.poll_interval_secs, 5);
        assert_eq!(config.agent.fetch_interval_secs, 60);
        assert_eq!(config.agent.utc_offset_minutes, 330);
        assert_eq!(config.player.mode, PlayerMode::RemoteControl);
        assert!(config.http.enabled);
        assert!(config.player.control_timeout_secs < config.agent.poll_interval_secs);
    }

    #[test]
    fn test_validate_rejects_blank_credentials() {
        let config = Config::default();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingBackendUrl(_))
        ));

        let mut config = Config::default();
        config.server.backend_url = "https://signage.example.com".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingDeviceToken(_))
        ));

        config.server.device_token = "tok".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_round_trip_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.agent.max_concurrent_downloads, 2);
        assert_eq!(back.player.rc_port, platform::PLAYER_RC_PORT);
    }
}
