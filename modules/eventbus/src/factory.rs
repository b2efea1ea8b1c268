//! Stream-to-service resolution and the per-service `EventBus` cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::bus::EventBus;
use crate::config::{EventBusConfig, ServiceConfig, DEFAULT_TIMEOUT};
use crate::error::Result;
use crate::transport::Transport;
use crate::types::EventTypes;

/// Pseudo service name for streams disabled for this producer.
pub const DISABLED_SERVICE_NAME: &str = "_disabled_eventbus_";

/// Where events for a stream should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Service(String),
    /// The stream is disabled for this producer: drop its events silently.
    Disabled,
}

impl Route {
    pub fn service_name(&self) -> &str {
        match self {
            Route::Service(name) => name,
            Route::Disabled => DISABLED_SERVICE_NAME,
        }
    }
}

/// Built once at startup and shared by every producer. Owns the config and
/// memoizes one `EventBus` per service name.
pub struct EventBusFactory {
    config: EventBusConfig,
    transport: Arc<dyn Transport>,
    instances: Mutex<HashMap<String, Arc<EventBus>>>,
}

impl EventBusFactory {
    pub fn new(config: EventBusConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Resolve the service for a stream.
    ///
    /// Lookup order: `producers.<producer>.event_service_name`, then the
    /// legacy `destination_event_service`, then the process default. A stream
    /// with `producers.<producer>.enabled = false` resolves to `Route::Disabled`.
    pub fn resolve_service_name(&self, stream: &str) -> Route {
        let Some(settings) = self.config.streams.get(stream) else {
            return Route::Service(self.config.default_service.clone());
        };

        let producer = settings.producers.get(&self.config.producer_name);
        if producer.and_then(|p| p.enabled) == Some(false) {
            debug!(stream, producer = %self.config.producer_name, "Stream disabled for producer");
            return Route::Disabled;
        }

        producer
            .and_then(|p| p.event_service_name.clone())
            .or_else(|| settings.destination_event_service.clone())
            .map(Route::Service)
            .unwrap_or_else(|| Route::Service(self.config.default_service.clone()))
    }

    /// The `EventBus` for a named service, constructed on first use.
    pub fn get_instance(&self, service_name: &str) -> Result<Arc<EventBus>> {
        let mut instances = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bus) = instances.get(service_name) {
            return Ok(bus.clone());
        }

        let bus = if service_name == DISABLED_SERVICE_NAME {
            self.disabled_instance()
        } else {
            let service = self.config.service(service_name)?;
            debug!(service = service_name, url = %service.url, "Creating EventBus instance");
            EventBus::new(
                Arc::new(service),
                self.config.enabled_event_types,
                self.transport.clone(),
            )
        };

        let bus = Arc::new(bus);
        instances.insert(service_name.to_string(), bus.clone());
        Ok(bus)
    }

    pub fn get_instance_for_route(&self, route: &Route) -> Result<Arc<EventBus>> {
        self.get_instance(route.service_name())
    }

    pub fn get_instance_for_stream(&self, stream: &str) -> Result<Arc<EventBus>> {
        self.get_instance_for_route(&self.resolve_service_name(stream))
    }

    /// The bus for the configured default service.
    pub fn get_default_instance(&self) -> Result<Arc<EventBus>> {
        self.get_instance(&self.config.default_service)
    }

    /// Wire name for a logical stream, or the logical name when unmapped.
    pub fn stream_name<'a>(&'a self, logical: &'a str) -> &'a str {
        self.config
            .stream_names
            .get(logical)
            .map(String::as_str)
            .unwrap_or(logical)
    }

    /// A bus that accepts nothing, so sends become no-ops.
    fn disabled_instance(&self) -> EventBus {
        let service = ServiceConfig {
            name: DISABLED_SERVICE_NAME.to_string(),
            url: String::new(),
            timeout: DEFAULT_TIMEOUT,
            max_batch_bytes: self.config.max_batch_bytes,
            forward_client_ip: false,
        };
        EventBus::new(Arc::new(service), EventTypes::NONE, self.transport.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SendOutcome;
    use crate::config::StreamSettings;
    use crate::error::EventBusError;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn factory(transport: Arc<MemoryTransport>) -> EventBusFactory {
        let config = EventBusConfig::default()
            .with_service("service-a", "http://a.example")
            .with_service("service-b", "http://b.example")
            .with_default_service("service-a")
            .with_stream(
                "other_stream",
                StreamSettings::for_producer("mediawiki_eventbus", "service-b"),
            )
            .with_stream(
                "legacy_stream",
                StreamSettings {
                    destination_event_service: Some("service-b".into()),
                    ..Default::default()
                },
            )
            .with_stream("off_stream", StreamSettings::disabled_for("mediawiki_eventbus"));
        EventBusFactory::new(config, transport)
    }

    #[test]
    fn stream_override_and_default() {
        let f = factory(Arc::new(MemoryTransport::new()));
        assert_eq!(f.get_instance_for_stream("other_stream").unwrap().url(), "http://b.example");
        assert_eq!(f.get_instance_for_stream("unconfigured_stream").unwrap().url(), "http://a.example");
    }

    #[test]
    fn legacy_destination_is_honoured() {
        let f = factory(Arc::new(MemoryTransport::new()));
        assert_eq!(f.resolve_service_name("legacy_stream"), Route::Service("service-b".into()));
    }

    #[test]
    fn other_producers_settings_are_ignored() {
        let config = EventBusConfig::default()
            .with_service("service-a", "http://a.example")
            .with_default_service("service-a")
            .with_stream("s", StreamSettings::disabled_for("someone_else"));
        let f = EventBusFactory::new(config, Arc::new(MemoryTransport::new()));
        assert_eq!(f.resolve_service_name("s"), Route::Service("service-a".into()));
    }

    #[tokio::test]
    async fn disabled_stream_never_transmits() {
        let transport = Arc::new(MemoryTransport::new());
        let f = factory(transport.clone());
        assert_eq!(f.resolve_service_name("off_stream"), Route::Disabled);

        let bus = f.get_instance_for_stream("off_stream").unwrap();
        let outcome = bus
            .send(vec![json!({"meta": {"stream": "off_stream"}})], EventTypes::EVENT)
            .await;
        assert_eq!(outcome, SendOutcome::Suppressed);
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn instances_are_memoized() {
        let f = factory(Arc::new(MemoryTransport::new()));
        let a = f.get_instance("service-a").unwrap();
        let b = f.get_instance("service-a").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unknown_service_fails() {
        let f = factory(Arc::new(MemoryTransport::new()));
        assert!(matches!(
            f.get_instance("service-z"),
            Err(EventBusError::UnknownService(_))
        ));
    }

    #[test]
    fn unknown_default_service_fails_for_unconfigured_stream() {
        let config = EventBusConfig::default().with_default_service("missing");
        let f = EventBusFactory::new(config, Arc::new(MemoryTransport::new()));
        assert!(f.get_instance_for_stream("anything").is_err());
    }

    #[test]
    fn stream_name_mapping() {
        let mut config = EventBusConfig::default();
        config
            .stream_names
            .insert("mediawiki.page_change.v1".into(), "mediawiki.page_change.staging".into());
        let f = EventBusFactory::new(config, Arc::new(MemoryTransport::new()));
        assert_eq!(f.stream_name("mediawiki.page_change.v1"), "mediawiki.page_change.staging");
        assert_eq!(f.stream_name("mediawiki.page-delete"), "mediawiki.page-delete");
    }
}
