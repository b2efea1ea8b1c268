use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{EventBusError, Result};
use crate::types::EventTypes;

pub const DEFAULT_PRODUCER_NAME: &str = "mediawiki_eventbus";
pub const DEFAULT_SERVICE_NAME: &str = "eventbus";
/// 4 MiB, the usual intake request limit.
pub const DEFAULT_MAX_BATCH_BYTES: usize = 4 * 1024 * 1024;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// TOML-backed producer configuration.
/// The job-signing secret is not part of it; it stays an env var.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventBusConfig {
    /// Name this producer goes by under `streams.<stream>.producers`.
    #[serde(default = "default_producer_name")]
    pub producer_name: String,
    #[serde(default = "default_service_name")]
    pub default_service: String,
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,
    #[serde(default)]
    pub enabled_event_types: EventTypes,
    /// Originating site identifier stamped into `meta.domain`.
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub services: HashMap<String, ServiceSettings>,
    #[serde(default)]
    pub streams: HashMap<String, StreamSettings>,
    /// Logical stream name -> wire stream name.
    #[serde(default)]
    pub stream_names: HashMap<String, String>,
}

/// One `[services.<name>]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSettings {
    pub url: Option<String>,
    pub timeout_secs: Option<f64>,
    #[serde(default)]
    pub forward_client_ip: bool,
    pub max_batch_bytes: Option<usize>,
}

/// Per-stream overrides, shaped like the external stream config registry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamSettings {
    /// Legacy top-level destination.
    pub destination_event_service: Option<String>,
    #[serde(default)]
    pub producers: HashMap<String, ProducerSettings>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProducerSettings {
    pub event_service_name: Option<String>,
    pub enabled: Option<bool>,
}

/// Resolved, immutable destination for one service.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub name: String,
    pub url: String,
    pub timeout: Duration,
    pub max_batch_bytes: usize,
    pub forward_client_ip: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            producer_name: default_producer_name(),
            default_service: default_service_name(),
            max_batch_bytes: default_max_batch_bytes(),
            enabled_event_types: EventTypes::ALL,
            domain: String::new(),
            services: HashMap::new(),
            streams: HashMap::new(),
            stream_names: HashMap::new(),
        }
    }
}

impl EventBusConfig {
    /// Build the `ServiceConfig` for a named service.
    ///
    /// Fails when the service is unknown or has no URL.
    pub fn service(&self, name: &str) -> Result<ServiceConfig> {
        let settings = self
            .services
            .get(name)
            .ok_or_else(|| EventBusError::UnknownService(name.to_string()))?;

        let url = settings
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| EventBusError::MissingUrl(name.to_string()))?;

        let timeout = settings
            .timeout_secs
            .filter(|t| t.is_finite() && *t > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(DEFAULT_TIMEOUT);

        Ok(ServiceConfig {
            name: name.to_string(),
            url: url.to_string(),
            timeout,
            max_batch_bytes: settings.max_batch_bytes.unwrap_or(self.max_batch_bytes),
            forward_client_ip: settings.forward_client_ip,
        })
    }

    /// Builder-style helper for registering a service, mostly for tests and embedding.
    pub fn with_service(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.services.insert(
            name.into(),
            ServiceSettings {
                url: Some(url.into()),
                ..Default::default()
            },
        );
        self
    }

    pub fn with_default_service(mut self, name: impl Into<String>) -> Self {
        self.default_service = name.into();
        self
    }

    pub fn with_enabled_event_types(mut self, types: EventTypes) -> Self {
        self.enabled_event_types = types;
        self
    }

    pub fn with_stream(mut self, stream: impl Into<String>, settings: StreamSettings) -> Self {
        self.streams.insert(stream.into(), settings);
        self
    }
}

impl StreamSettings {
    /// Route a stream to a service through this producer's settings.
    pub fn for_producer(producer: &str, service: &str) -> Self {
        let mut producers = HashMap::new();
        producers.insert(
            producer.to_string(),
            ProducerSettings {
                event_service_name: Some(service.to_string()),
                enabled: None,
            },
        );
        Self {
            destination_event_service: None,
            producers,
        }
    }

    /// Mark a stream disabled for this producer.
    pub fn disabled_for(producer: &str) -> Self {
        let mut producers = HashMap::new();
        producers.insert(
            producer.to_string(),
            ProducerSettings {
                event_service_name: None,
                enabled: Some(false),
            },
        );
        Self {
            destination_event_service: None,
            producers,
        }
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<EventBusConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        EventBusError::Config(format!("failed to read config file {}: {e}", path.display()))
    })?;
    parse_config(&content).map_err(|e| match e {
        EventBusError::Config(msg) => {
            EventBusError::Config(format!("failed to parse config file {}: {msg}", path.display()))
        }
        other => other,
    })
}

pub fn parse_config(content: &str) -> Result<EventBusConfig> {
    toml::from_str(content).map_err(|e| EventBusError::Config(e.to_string()))
}

fn default_producer_name() -> String {
    DEFAULT_PRODUCER_NAME.to_string()
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_max_batch_bytes() -> usize {
    DEFAULT_MAX_BATCH_BYTES
}
