use std::path::PathBuf;
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::{WrapErr, eyre};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub spotify: SpotifyConfig,
    #[serde(default)]
    pub apple_music: AppleMusicConfig,
    #[serde(default)]
    pub sync: SyncSettings,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SpotifyConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppleMusicConfig {
    pub developer_token: Option<String>,
    pub media_user_token: Option<String>,
    #[serde(default = "default_storefront")]
    pub storefront: String,
}

impl Default for AppleMusicConfig {
    fn default() -> Self {
        Self {
            developer_token: None,
            media_user_token: None,
            storefront: default_storefront(),
        }
    }
}

/// Tuning for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Search results fetched per track lookup (capped at 10).
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Minimum confidence for a candidate to count as a match.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    /// Per-call timeout for external platform requests.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Retries per failed platform call, on top of the initial attempt.
    #[serde(default = "default_max_add_retries")]
    pub max_add_retries: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
            match_threshold: default_match_threshold(),
            call_timeout_secs: default_call_timeout_secs(),
            max_add_retries: default_max_add_retries(),
        }
    }
}

impl SyncSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

fn default_storefront() -> String {
    "us".to_string()
}

fn default_search_limit() -> usize {
    10
}

fn default_match_threshold() -> f64 {
    0.7
}

fn default_call_timeout_secs() -> u64 {
    10
}

fn default_max_add_retries() -> usize {
    2
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .wrap_err_with(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|path| path.join("harmony").join("config.toml"))
    }

    /// Load config from the default location; a missing file means defaults,
    /// since every credential can also come from the environment.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path().ok_or(eyre!("No config directory found"))?;
        if config_path.exists() {
            Self::from_file(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    /// Write a default config file, if one doesn't exist yet.
    pub fn create_default() -> Result<PathBuf> {
        let config_path = Self::config_path().ok_or(eyre!("No config directory found"))?;
        if config_path.exists() {
            return Ok(config_path);
        }
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("Failed to create {}", parent.display()))?;
        }
        let contents =
            toml::to_string_pretty(&Config::default()).wrap_err("Failed to serialize config")?;
        std::fs::write(&config_path, contents)
            .wrap_err_with(|| format!("Failed to write {}", config_path.display()))?;
        Ok(config_path)
    }

    /// Spotify app credentials, from the config file or the environment.
    pub fn spotify_credentials(&self) -> Result<(String, String)> {
        let client_id = self
            .spotify
            .client_id
            .clone()
            .or_else(|| std::env::var("SPOTIFY_CLIENT_ID").ok())
            .ok_or(eyre!(
                "Spotify client_id missing: set [spotify] client_id or SPOTIFY_CLIENT_ID"
            ))?;
        let client_secret = self
            .spotify
            .client_secret
            .clone()
            .or_else(|| std::env::var("SPOTIFY_CLIENT_SECRET").ok())
            .ok_or(eyre!(
                "Spotify client_secret missing: set [spotify] client_secret or SPOTIFY_CLIENT_SECRET"
            ))?;
        Ok((client_id, client_secret))
    }

    /// Apple Music tokens, from the config file or the environment.
    pub fn apple_music_tokens(&self) -> Result<(String, String)> {
        let developer_token = self
            .apple_music
            .developer_token
            .clone()
            .or_else(|| std::env::var("APPLE_MUSIC_DEVELOPER_TOKEN").ok())
            .ok_or(eyre!(
                "Apple Music developer token missing: set [apple_music] developer_token or APPLE_MUSIC_DEVELOPER_TOKEN"
            ))?;
        let media_user_token = self
            .apple_music
            .media_user_token
            .clone()
            .or_else(|| std::env::var("APPLE_MUSIC_MEDIA_USER_TOKEN").ok())
            .ok_or(eyre!(
                "Apple Music media user token missing: set [apple_music] media_user_token or APPLE_MUSIC_MEDIA_USER_TOKEN"
            ))?;
        Ok((developer_token, media_user_token))
    }
}
