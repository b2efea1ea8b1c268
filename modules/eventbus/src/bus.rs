//! The dispatcher: serialize, partition and deliver one batch to one service.

use std::net::IpAddr;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::config::ServiceConfig;
use crate::event::{stream_of, EventRecord};
use crate::partition::partition;
use crate::transport::{HttpOutcome, HttpRequest, Transport};
use crate::types::EventTypes;

pub const CLIENT_IP_HEADER: &str = "x-client-ip";
const EMPTY_BATCH_MESSAGE: &str = "Must call send with at least 1 event. Aborting send.";

/// What the caller hands to `send`.
#[derive(Debug, Clone)]
pub enum Payload {
    Events(Vec<EventRecord>),
    /// An already-encoded JSON array (or single object) of events.
    Serialized(String),
}

impl From<Vec<EventRecord>> for Payload {
    fn from(events: Vec<EventRecord>) -> Self {
        Payload::Events(events)
    }
}

impl From<String> for Payload {
    fn from(body: String) -> Self {
        Payload::Serialized(body)
    }
}

/// Per-call knobs.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Forwarded as `x-client-ip` when the service enables it.
    pub client_ip: Option<IpAddr>,
    /// Overrides the service's batch byte limit for this call.
    pub max_batch_bytes: Option<usize>,
}

/// Aggregate result of one `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Every sub-batch came back 201.
    Delivered,
    /// The event type is not enabled on this bus; nothing was sent.
    Suppressed,
    /// One message per failing sub-batch (or one for a rejected call).
    Failed(Vec<String>),
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Delivered)
    }

    pub fn errors(&self) -> &[String] {
        match self {
            SendOutcome::Failed(errors) => errors,
            _ => &[],
        }
    }
}

/// Bound to a single destination service. Holds no per-call state, so one
/// instance is shared by every caller in the process.
pub struct EventBus {
    service: Arc<ServiceConfig>,
    enabled_types: EventTypes,
    transport: Arc<dyn Transport>,
}

impl EventBus {
    pub fn new(service: Arc<ServiceConfig>, enabled_types: EventTypes, transport: Arc<dyn Transport>) -> Self {
        Self {
            service,
            enabled_types,
            transport,
        }
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    pub fn url(&self) -> &str {
        &self.service.url
    }

    pub fn enabled_types(&self) -> EventTypes {
        self.enabled_types
    }

    pub async fn send(&self, payload: impl Into<Payload>, event_type: EventTypes) -> SendOutcome {
        self.send_with(payload, event_type, &SendOptions::default()).await
    }

    /// Serialize, partition and deliver a batch. Never fails loudly: every
    /// problem is logged and folded into the returned `SendOutcome`.
    pub async fn send_with(
        &self,
        payload: impl Into<Payload>,
        event_type: EventTypes,
        options: &SendOptions,
    ) -> SendOutcome {
        if !self.enabled_types.contains(event_type) {
            debug!(
                service = %self.service.name,
                event_type = %event_type,
                enabled = %self.enabled_types,
                "Event type not enabled, skipping send"
            );
            return SendOutcome::Suppressed;
        }

        let max_bytes = options.max_batch_bytes.unwrap_or(self.service.max_batch_bytes);
        let bodies = match self.prepare_bodies(payload.into(), max_bytes) {
            Ok(bodies) => bodies,
            Err(message) => return SendOutcome::Failed(vec![message]),
        };

        let requests: Vec<HttpRequest> = bodies
            .into_iter()
            .map(|body| self.build_request(body, options.client_ip))
            .collect();
        let batches = requests.len();

        let outcomes = self.transport.run_multi(requests.clone()).await;

        let mut errors = Vec::new();
        for (request, outcome) in requests.iter().zip(outcomes.iter()) {
            if let Some(message) = self.classify(request, outcome) {
                errors.push(message);
            }
        }
        if outcomes.len() < batches {
            let message = format!(
                "Unable to deliver all events: transport returned {} outcomes for {batches} requests",
                outcomes.len()
            );
            error!(service = %self.service.name, "{message}");
            errors.push(message);
        }

        if errors.is_empty() {
            debug!(service = %self.service.name, batches, "Delivered events");
            SendOutcome::Delivered
        } else {
            SendOutcome::Failed(errors)
        }
    }

    /// Turn the payload into one or more JSON array bodies.
    fn prepare_bodies(&self, payload: Payload, max_bytes: usize) -> Result<Vec<String>, String> {
        let events = match payload {
            Payload::Events(events) => events,
            Payload::Serialized(body) => {
                let trimmed = body.trim();
                let empty_array = trimmed
                    .strip_prefix('[')
                    .and_then(|rest| rest.strip_suffix(']'))
                    .is_some_and(|inner| inner.trim().is_empty());
                if trimmed.is_empty() || empty_array {
                    error!(service = %self.service.name, "{EMPTY_BATCH_MESSAGE}");
                    return Err(EMPTY_BATCH_MESSAGE.to_string());
                }
                if trimmed.len() <= max_bytes && trimmed.starts_with('[') {
                    return Ok(vec![trimmed.to_string()]);
                }
                // Oversized bodies and bare objects are decoded so they can be
                // partitioned and always leave as an array.
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(Value::Array(events)) => events,
                    Ok(single @ Value::Object(_)) => vec![single],
                    Ok(_) | Err(_) => {
                        debug!(service = %self.service.name, "Serialized body not decodable, sending as-is");
                        return Ok(vec![trimmed.to_string()]);
                    }
                }
            }
        };

        if events.is_empty() {
            error!(service = %self.service.name, "{EMPTY_BATCH_MESSAGE}");
            return Err(EMPTY_BATCH_MESSAGE.to_string());
        }

        match partition(&events, max_bytes) {
            Ok(batches) => {
                if batches.len() > 1 {
                    debug!(
                        service = %self.service.name,
                        events = events.len(),
                        batches = batches.len(),
                        max_bytes,
                        "Partitioned oversized batch"
                    );
                }
                Ok(batches.into_iter().map(|b| b.body).collect())
            }
            Err(err) => {
                let payload = format!("{events:?}");
                error!(
                    service = %self.service.name,
                    error = %err,
                    payload = %payload,
                    "Exception encoding events"
                );
                Err(format!("Unable to serialize events: {err}"))
            }
        }
    }

    fn build_request(&self, body: String, client_ip: Option<IpAddr>) -> HttpRequest {
        let mut request = HttpRequest::post(&self.service.url, body, self.service.timeout)
            .with_header("content-type", "application/json");
        if self.service.forward_client_ip {
            if let Some(ip) = client_ip {
                request = request.with_header(CLIENT_IP_HEADER, ip.to_string());
            }
        }
        request
    }

    /// Returns the error message for a failed sub-batch, logging it.
    fn classify(&self, request: &HttpRequest, outcome: &HttpOutcome) -> Option<String> {
        if outcome.code == 201 {
            return None;
        }

        let detail = match &outcome.error {
            Some(err) if !err.is_empty() => err.clone(),
            _ => format!("{}: {}", outcome.code, outcome.reason),
        };
        let streams = streams_in_body(request.body_str());

        if outcome.code == 207 {
            error!(
                service = %self.service.name,
                url = %request.url,
                code = outcome.code,
                streams = %streams,
                body = %request.body_str(),
                "Partial delivery of events: {detail}"
            );
        } else {
            error!(
                service = %self.service.name,
                url = %request.url,
                code = outcome.code,
                streams = %streams,
                body = %request.body_str(),
                "Unable to deliver all events: {detail}"
            );
        }

        Some(format!("Unable to deliver all events: {detail}"))
    }
}

/// Distinct stream names in a body, for log context.
fn streams_in_body(body: &str) -> String {
    let Ok(Value::Array(events)) = serde_json::from_str::<Value>(body) else {
        return String::new();
    };
    let mut streams: Vec<&str> = Vec::new();
    for event in &events {
        let stream = stream_of(event);
        if !streams.contains(&stream) {
            streams.push(stream);
        }
    }
    streams.join(",")
}
