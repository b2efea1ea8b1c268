use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Process settings for the server binary. Producer config lives in TOML;
/// the signing secret and bind address come from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub config_path: PathBuf,
    pub secret: String,
    pub host: String,
    pub port: u16,
    /// Wiki base URL used for job event URIs; defaults to `https://<domain>`.
    pub site_server: Option<String>,
    pub site_database: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let port = env::var("EVENTBUS_PORT").unwrap_or_else(|_| "8080".to_string());
        Ok(Self {
            config_path: env::var("EVENTBUS_CONFIG")
                .unwrap_or_else(|_| "eventbus.toml".to_string())
                .into(),
            secret: required_env("EVENTBUS_SECRET")?,
            host: env::var("EVENTBUS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: port
                .parse()
                .with_context(|| format!("EVENTBUS_PORT must be a port number, got {port:?}"))?,
            site_server: env::var("EVENTBUS_SITE_SERVER").ok(),
            site_database: env::var("EVENTBUS_SITE_DATABASE").unwrap_or_else(|_| "wiki".to_string()),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn required_env(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .with_context(|| format!("{key} environment variable is required"))
}
