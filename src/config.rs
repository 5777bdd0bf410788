//! # Configuration Management
//!
//! Loads application configuration from multiple layered sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER__HOST, APP_MODEL__SIZE, etc. —
//!    a double underscore separates nesting levels, so snake_case field
//!    names like `max_upload_bytes` stay addressable)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! `HOST` and `PORT` are honored without the prefix because deployment
//! platforms commonly inject them that way.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub limits: LimitsConfig,
}

/// Server bind settings.
///
/// `host = "127.0.0.1"` keeps the service local; `0.0.0.0` exposes it to
/// the network, matching the original deployment default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Whisper model settings.
///
/// ## Fields:
/// - `size`: which Whisper variant to load ("tiny", "base", "small",
///   "medium", "large") — larger is more accurate and slower
/// - `device`: compute device preference ("auto", "cpu", "cuda", "metal")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub size: String,
    pub device: String,
}

/// Request-level guardrails.
///
/// ## Fields:
/// - `max_upload_bytes`: cap on the decoded payload size
/// - `transcription_timeout_secs`: deadline for a single model invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_upload_bytes: usize,
    pub transcription_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            model: ModelConfig {
                size: "base".to_string(), // 74MB, good accuracy/startup balance
                device: "auto".to_string(),
            },
            limits: LimitsConfig {
                max_upload_bytes: 50 * 1024 * 1024, // 50MB
                transcription_timeout_secs: 300,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml, and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: override the bind address
    /// - `APP_MODEL__SIZE=small`: override the Whisper variant
    /// - `APP_LIMITS__MAX_UPLOAD_BYTES=1048576`: override the upload cap
    /// - `HOST` / `PORT`: platform-injected overrides without the prefix
    pub fn load() -> Result<Self> {
        // Nesting levels are separated by a double underscore: a single
        // underscore would split snake_case field names like
        // `max_upload_bytes` into bogus nested paths.
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catches bad values at startup instead of on the first request:
    /// a zero port cannot be bound, an unknown model size would only fail
    /// after the HuggingFace download attempt, and zero limits would make
    /// every request fail.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        self.model
            .size
            .parse::<crate::transcription::ModelSize>()
            .map_err(|e| anyhow::anyhow!("Invalid model size: {}", e))?;

        self.model
            .device
            .parse::<crate::device::DevicePreference>()
            .map_err(|e| anyhow::anyhow!("Invalid device preference: {}", e))?;

        if self.limits.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Upload size limit must be greater than 0"));
        }

        if self.limits.transcription_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "Transcription timeout must be greater than 0"
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.model.size, "base");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_rejects_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_unknown_model() {
        let mut config = AppConfig::default();
        config.model.size = "gigantic".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_override_reaches_multiword_limit_keys() {
        std::env::set_var("APP_LIMITS__MAX_UPLOAD_BYTES", "1048576");
        std::env::set_var("APP_MODEL__SIZE", "small");

        let config = AppConfig::load().unwrap();

        std::env::remove_var("APP_LIMITS__MAX_UPLOAD_BYTES");
        std::env::remove_var("APP_MODEL__SIZE");

        assert_eq!(config.limits.max_upload_bytes, 1_048_576);
        assert_eq!(config.model.size, "small");
    }

    #[test]
    fn test_config_validation_rejects_zero_limits() {
        let mut config = AppConfig::default();
        config.limits.max_upload_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.limits.transcription_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
