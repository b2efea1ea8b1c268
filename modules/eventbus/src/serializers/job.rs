use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::Site;
use crate::error::{EventBusError, Result};
use crate::event::{format_dt, EventBuilder, EventRecord, RequestContext};
use crate::signature::attach_signature;

pub const JOB_SCHEMA: &str = "/mediawiki/job/1.0.0";

/// Jobs of type `foo` travel on `mediawiki.job.foo`.
pub fn job_stream(job_type: &str) -> String {
    format!("mediawiki.job.{job_type}")
}

/// Root job info used by consumers to drop superseded duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootEvent {
    pub signature: String,
    pub dt: String,
}

/// A job as it travels inside an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_event: Option<RootEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_timestamp: Option<DateTime<Utc>>,
}

impl JobSpec {
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            params: Map::new(),
            root_event: None,
            release_timestamp: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Read the job back out of a received job event.
    pub fn from_event(event: &Value) -> Result<Self> {
        let job_type = event
            .get("type")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| EventBusError::InvalidEvents("job event has no type".into()))?;
        let params = match event.get("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(EventBusError::InvalidEvents("job params must be an object".into()))
            }
        };
        let root_event = event
            .get("root_event")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?;
        let release_timestamp = event
            .get("release_timestamp")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(Self {
            job_type: job_type.to_string(),
            params,
            root_event,
            release_timestamp,
        })
    }
}

/// Build and sign a job event.
pub fn job_event(site: &Site, ctx: &RequestContext, stream: &str, job: &JobSpec, secret: &str) -> Result<EventRecord> {
    let mut fields = Map::new();
    fields.insert("database".into(), json!(site.database));
    fields.insert("type".into(), json!(job.job_type));
    fields.insert("params".into(), Value::Object(job.params.clone()));
    if let Some(root) = &job.root_event {
        fields.insert("root_event".into(), serde_json::to_value(root)?);
    }
    if let Some(release) = &job.release_timestamp {
        fields.insert("release_timestamp".into(), json!(format_dt(release)));
    }

    let uri = site.page_url(&format!("Special:Badtitle/{}", job.job_type));
    let mut event = EventBuilder::new(JOB_SCHEMA, stream, uri)
        .dt(ctx.timestamp)
        .fields(Value::Object(fields))
        .build(ctx);
    attach_signature(&mut event, secret)?;
    Ok(event)
}
