//! Server configuration.
//!
//! Loaded primarily from environment variables (teacher's
//! `AuthConfig::from_env` convention), additionally layered through
//! `figment` so a TOML file can supply the same keys in one place for local
//! development.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Recognized configuration, spec.md §6 "Configuration".
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    pub listen_host: String,
    pub listen_port: u16,
    pub db_uri: String,
    pub db_name: String,
    pub password_hash_cost: u32,
    /// Rating-window tiebreak for random pairing. `None` means unbounded
    /// (pure FIFO), the spec's stated default.
    pub match_rating_window: Option<u32>,
    pub idle_timeout_seconds: u64,
    pub challenge_ttl_seconds: u64,
    /// HMAC secret used to sign opaque session tokens (§4.4). Not part of
    /// spec.md's configuration table but required to drive `jsonwebtoken`;
    /// grounded in the teacher's `AUTH_SECRET` env convention.
    pub token_secret: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: "0.0.0.0".to_string(),
            listen_port: 8765,
            db_uri: "mongodb://localhost:27017".to_string(),
            db_name: "chess_arbiter".to_string(),
            password_hash_cost: 12,
            match_rating_window: None,
            idle_timeout_seconds: 300,
            challenge_ttl_seconds: 60,
            token_secret: "dev-secret-change-me".to_string(),
        }
    }
}

/// Error produced when configuration cannot be assembled.
#[derive(Debug, thiserror::Error)]
#[error("failed to load configuration: {0}")]
pub struct ConfigError(#[from] figment::Error);

impl Config {
    /// Load configuration from `CHESS_*` environment variables, optionally
    /// overlaid with a TOML file named by `CHESS_CONFIG_FILE` (or
    /// `chess-arbiter.toml` in the working directory if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        let toml_path = std::env::var("CHESS_CONFIG_FILE")
            .unwrap_or_else(|_| "chess-arbiter.toml".to_string());

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(toml_path))
            .merge(Env::prefixed("CHESS_").split("__"));

        Ok(figment.extract()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.listen_host, "0.0.0.0");
        assert_eq!(config.listen_port, 8765);
        assert_eq!(config.password_hash_cost, 12);
        assert_eq!(config.match_rating_window, None);
        assert_eq!(config.idle_timeout_seconds, 300);
        assert_eq!(config.challenge_ttl_seconds, 60);
    }

    #[test]
    fn env_override_takes_precedence() {
        std::env::set_var("CHESS_LISTEN_PORT", "9999");
        let config = Config::from_env().unwrap();
        assert_eq!(config.listen_port, 9999);
        std::env::remove_var("CHESS_LISTEN_PORT");
    }
}
