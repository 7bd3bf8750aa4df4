//! MapSpace server configuration.

use mapspace_world::ViewPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Language code for prompts (`en`, `ja`)
    pub language: String,
    /// Upstream map provider
    pub provider: ProviderConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// View radii and bucket thresholds
    pub view: ViewPolicy,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ServiceResult<Self> {
        let defaults = Self::default();
        let config = Self {
            host: std::env::var("MAPSPACE_HOST").unwrap_or(defaults.host),
            port: match std::env::var("MAPSPACE_PORT") {
                Ok(port) => port
                    .parse()
                    .map_err(|_| ServiceError::Config(format!("MAPSPACE_PORT is not a port: {}", port)))?,
                Err(_) => defaults.port,
            },
            language: std::env::var("MAPSPACE_LANGUAGE").unwrap_or(defaults.language),
            provider: ProviderConfig::from_env()?,
            cors: defaults.cors,
            view: defaults.view,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> ServiceResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("Failed to read config: {}", e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ServiceResult<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| ServiceError::Config(format!("Failed to parse config: {}", e)))?;
        // A key in the environment wins over one checked into a file
        if let Ok(key) = std::env::var("MAPS_API_KEY") {
            config.provider.api_key = Some(key);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ServiceResult<()> {
        self.view
            .validate()
            .map_err(|e| ServiceError::Config(e.to_string()))?;
        if self.provider.timeout_secs == 0 {
            return Err(ServiceError::Config("provider.timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8091,
            language: "en".to_string(),
            provider: ProviderConfig::default(),
            cors: CorsConfig::default(),
            view: ViewPolicy::default(),
        }
    }
}

/// Upstream map provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key; provider calls fail with `NotConfigured` without one
    pub api_key: Option<String>,
    /// Directions / timezone / street view endpoints live under this URL
    pub maps_base_url: String,
    /// Places (text and nearby search) base URL
    pub places_base_url: String,
    /// Upper bound for any single provider call
    pub timeout_secs: u64,
    /// Language code sent with place searches
    pub language_code: String,
}

impl ProviderConfig {
    pub fn from_env() -> ServiceResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            api_key: std::env::var("MAPS_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            timeout_secs: match std::env::var("MAPS_TIMEOUT_SECS") {
                Ok(secs) => secs
                    .parse()
                    .map_err(|_| ServiceError::Config(format!("MAPS_TIMEOUT_SECS is not a number: {}", secs)))?,
                Err(_) => defaults.timeout_secs,
            },
            ..defaults
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            maps_base_url: "https://maps.googleapis.com/maps/api".to_string(),
            places_base_url: "https://places.googleapis.com/v1".to_string(),
            timeout_secs: 10,
            language_code: "en".to_string(),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; `*` allows any
    pub allowed_origins: Vec<String>,
    /// Max age for preflight cache
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            max_age_secs: 3600,
        }
    }
}
