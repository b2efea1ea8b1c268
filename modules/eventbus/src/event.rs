//! Event Records: schema-tagged JSON objects carrying a `meta.stream` routing key.

use std::net::IpAddr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{EventBusError, Result};

/// Stream used for grouping records that carry no `meta.stream`.
pub const UNKNOWN_STREAM: &str = "unknown";

/// An event is a plain JSON object. Records are built once and never mutated
/// by the delivery path.
pub type EventRecord = Value;

/// Request-scoped values stamped into every event built for that request.
///
/// Passed explicitly instead of read from ambient state.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub client_ip: Option<IpAddr>,
    /// Originating site identifier, e.g. `en.wikipedia.org`.
    pub domain: String,
    pub timestamp: DateTime<Utc>,
}

impl RequestContext {
    /// A context with a fresh request id and the current time.
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            client_ip: None,
            domain: domain.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Builds one Event Record: `$schema`, `meta` and domain fields.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    schema: String,
    stream: String,
    uri: String,
    dt: Option<DateTime<Utc>>,
    fields: Map<String, Value>,
}

impl EventBuilder {
    pub fn new(schema: impl Into<String>, stream: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            stream: stream.into(),
            uri: uri.into(),
            dt: None,
            fields: Map::new(),
        }
    }

    /// Set `meta.dt`. Leave unset to let the intake service stamp ingestion time.
    pub fn dt(mut self, dt: DateTime<Utc>) -> Self {
        self.dt = Some(dt);
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Merge every key of `attrs` into the event body. Non-objects are ignored.
    pub fn fields(mut self, attrs: Value) -> Self {
        if let Value::Object(map) = attrs {
            self.fields.extend(map);
        }
        self
    }

    pub fn build(self, ctx: &RequestContext) -> EventRecord {
        let mut meta = Map::new();
        meta.insert("uri".into(), Value::String(self.uri));
        meta.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        if let Some(dt) = self.dt {
            meta.insert("dt".into(), Value::String(format_dt(&dt)));
        }
        meta.insert("domain".into(), Value::String(ctx.domain.clone()));
        meta.insert("stream".into(), Value::String(self.stream));
        meta.insert("request_id".into(), Value::String(ctx.request_id.clone()));

        let mut event = Map::new();
        event.insert("$schema".into(), Value::String(self.schema));
        event.insert("meta".into(), Value::Object(meta));
        // Domain fields never overwrite the envelope.
        for (key, value) in self.fields {
            if key != "$schema" && key != "meta" {
                event.insert(key, value);
            }
        }
        Value::Object(event)
    }
}

/// ISO-8601 with second precision and a `Z` suffix.
pub fn format_dt(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// The routing key of a record, or `"unknown"` when it has none.
pub fn stream_of(event: &EventRecord) -> &str {
    event
        .get("meta")
        .and_then(|m| m.get("stream"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_STREAM)
}

/// Guard used at enqueue time: every entry must be a JSON object.
pub fn ensure_event_list(events: &[EventRecord]) -> Result<()> {
    for (idx, event) in events.iter().enumerate() {
        if !event.is_object() {
            return Err(EventBusError::InvalidEvents(format!(
                "event at index {idx} is not an object: {}",
                type_name(event)
            )));
        }
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
