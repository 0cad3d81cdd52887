//! # Configuration Management
//!
//! This module handles loading the relay configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` environment variables (deployment platforms set these)
//! 2. Environment variables (APP_SERVER__PORT, APP_SERVICES__SPEECH2SIGN, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Logical name of the speech-to-sign service.
pub const SPEECH2SIGN: &str = "speech2sign";

/// Logical name of the sign-to-speech service.
pub const SIGN2SPEECH: &str = "sign2speech";

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Server binding, the remote services and upload limits change for
/// different reasons, so each gets its own section in config.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub services: ServicesConfig,
    pub upload: UploadConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to
/// - `port`: TCP port number to listen on (`PORT` env var, 3000 when unset)
/// - `distinct_error_status`: map error kinds to 400/503/502 instead of a flat 500
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub distinct_error_status: bool,
}

/// Remote inference services, one URL per logical service name.
///
/// These are read once at startup and turned into service descriptors
/// for the connection registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub speech2sign: String,
    pub sign2speech: String,
}

/// Limits applied to uploaded files.
///
/// Uploads are buffered fully in memory, so this bounds the memory
/// a single request can hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_file_bytes: usize,
}

/// Static description of one remote service: logical name and address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub url: String,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                distinct_error_status: false,
            },
            services: ServicesConfig {
                speech2sign: "https://adelshousha-sahla-speech2sign.hf.space".to_string(),
                sign2speech: "https://adelshousha-sahla-sign2speech.hf.space".to_string(),
            },
            upload: UploadConfig {
                max_file_bytes: 50 * 1024 * 1024, // 50MB
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVICES__SPEECH2SIGN=http://localhost:7860`: Point speech2sign at a local Space
    /// - `APP_UPLOAD__MAX_FILE_BYTES=10485760`: Lower the upload limit to 10MB
    /// - `PORT=8080`: Listen on 8080 instead of 3000
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // Double underscore so field names containing `_` survive,
            // e.g. APP_UPLOAD__MAX_FILE_BYTES -> upload.max_file_bytes
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
    /// ## What this checks:
    /// - Server port is not 0
    /// - Every service URL is an http(s) URL
    /// - The upload limit allows at least one byte
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        for descriptor in self.service_descriptors() {
            let url = descriptor.url.trim();
            if url.is_empty() {
                return Err(anyhow::anyhow!("URL for service {} is empty", descriptor.name));
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow::anyhow!(
                    "URL for service {} must start with http:// or https:// (got {})",
                    descriptor.name,
                    url
                ));
            }
        }

        if self.upload.max_file_bytes == 0 {
            return Err(anyhow::anyhow!("Upload limit must be greater than 0"));
        }

        Ok(())
    }

    /// The fixed set of remote services the relay connects to at startup.
    pub fn service_descriptors(&self) -> Vec<ServiceDescriptor> {
        vec![
            ServiceDescriptor::new(SPEECH2SIGN, self.services.speech2sign.clone()),
            ServiceDescriptor::new(SIGN2SPEECH, self.services.sign2speech.clone()),
        ]
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Default configuration listens on 3000 and passes validation.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert!(!config.server.distinct_error_status);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.services.sign2speech = "ftp://example.com".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("sign2speech"));

        let mut config = AppConfig::default();
        config.services.speech2sign = "   ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.upload.max_file_bytes = 0;
        assert!(config.validate().is_err());
    }

    /// Both logical services are described, in a stable order.
    #[test]
    fn test_service_descriptors() {
        let config = AppConfig::default();
        let names: Vec<_> = config
            .service_descriptors()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec![SPEECH2SIGN, SIGN2SPEECH]);
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
    }

    /// `PORT` and `APP_` section variables override the defaults.
    #[test]
    fn test_load_reads_environment() {
        let keys = ["PORT", "APP_SERVICES__SPEECH2SIGN"];
        let saved: Vec<_> = keys.iter().map(|key| env::var(key).ok()).collect();

        env::set_var("PORT", "8081");
        env::set_var("APP_SERVICES__SPEECH2SIGN", "http://localhost:7860");
        let loaded = AppConfig::load();

        for (key, value) in keys.iter().zip(saved) {
            match value {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }

        let config = loaded.unwrap();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.services.speech2sign, "http://localhost:7860");
        assert_eq!(
            config.services.sign2speech,
            AppConfig::default().services.sign2speech
        );
        assert!(config.validate().is_ok());
    }
}
