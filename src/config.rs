//! Application configuration loaded from environment variables.
//!
//! The binary runs headless on a schedule (GitHub Actions), so everything
//! comes from env vars; a local `.env` file is honored for development.

use std::env;
use std::path::PathBuf;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// iGPSport account username
    pub igpsport_username: String,
    /// iGPSport account password
    pub igpsport_password: String,
    /// Garmin Connect account email
    pub garmin_email: String,
    /// Garmin Connect account password
    pub garmin_password: String,
    /// Garmin domain ("garmin.com", or "garmin.cn" for China region)
    pub garmin_domain: String,
    /// Path of the last-sync checkpoint file
    pub checkpoint_path: PathBuf,
    /// Directory for cached remote sessions
    pub session_dir: PathBuf,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self {
            igpsport_username: "test_user".to_string(),
            igpsport_password: "test_password".to_string(),
            garmin_email: "test@example.com".to_string(),
            garmin_password: "test_password".to_string(),
            garmin_domain: "garmin.com".to_string(),
            checkpoint_path: PathBuf::from("last_sync_date.json"),
            session_dir: PathBuf::from(".sessions"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            igpsport_username: env::var("IGPSPORT_USERNAME")
                .map_err(|_| ConfigError::Missing("IGPSPORT_USERNAME"))?,
            igpsport_password: env::var("IGPSPORT_PASSWORD")
                .map_err(|_| ConfigError::Missing("IGPSPORT_PASSWORD"))?,
            garmin_email: env::var("GARMIN_EMAIL")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GARMIN_EMAIL"))?,
            garmin_password: env::var("GARMIN_PASSWORD")
                .map_err(|_| ConfigError::Missing("GARMIN_PASSWORD"))?,
            garmin_domain: env::var("GARMIN_DOMAIN")
                .unwrap_or_else(|_| "garmin.com".to_string()),
            checkpoint_path: env::var("CHECKPOINT_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("last_sync_date.json")),
            session_dir: env::var("SESSION_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".sessions")),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("IGPSPORT_USERNAME", "rider");
        env::set_var("IGPSPORT_PASSWORD", "secret");
        env::set_var("GARMIN_EMAIL", "rider@example.com");
        env::set_var("GARMIN_PASSWORD", "secret2");
        env::remove_var("GARMIN_DOMAIN");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.igpsport_username, "rider");
        assert_eq!(config.garmin_email, "rider@example.com");
        assert_eq!(config.garmin_domain, "garmin.com");
        assert_eq!(config.checkpoint_path, PathBuf::from("last_sync_date.json"));
    }
}
