use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use eventbus::serializers::job::JobSpec;
use eventbus::signature::verify_event_signature;
use eventbus::RequestContext;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::jobs::JobContext;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub time_ms: u64,
}

fn respond(code: StatusCode, started: Instant, error: Option<String>) -> Response {
    let body = JobResponse {
        status: error.is_none(),
        error,
        time_ms: started.elapsed().as_millis() as u64,
    };
    (code, Json(body)).into_response()
}

/// Run one signed job event synchronously.
pub async fn execute_job(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let started = Instant::now();

    let event: Value = match serde_json::from_slice(&body) {
        Ok(v @ Value::Object(_)) => v,
        Ok(_) => {
            return respond(StatusCode::BAD_REQUEST, started, Some("job event must be a JSON object".into()));
        }
        Err(e) => {
            return respond(StatusCode::BAD_REQUEST, started, Some(format!("invalid JSON: {e}")));
        }
    };

    if let Err(e) = verify_event_signature(&event, &state.secret) {
        warn!(error = %e, "Rejected job event");
        return respond(StatusCode::FORBIDDEN, started, Some(e.to_string()));
    }

    let job = match JobSpec::from_event(&event) {
        Ok(job) => job,
        Err(e) => return respond(StatusCode::BAD_REQUEST, started, Some(e.to_string())),
    };

    let Some(executor) = state.jobs.get(&job.job_type) else {
        return respond(
            StatusCode::BAD_REQUEST,
            started,
            Some(format!("unknown job type: {}", job.job_type)),
        );
    };

    let request = RequestContext::new(state.factory.config().domain.clone());
    let mut ctx = JobContext::new(request, state.hooks.clone());
    let result = executor.run(&job, &mut ctx).await;

    // Follow-up jobs go out even when this one failed part way.
    let report = ctx.into_queue().flush(&state.factory).await;
    if !report.is_success() {
        let errors: Vec<&String> = report.deliveries.iter().flat_map(|d| d.outcome.errors()).collect();
        error!(job_type = %job.job_type, errors = ?errors, "Failed to flush follow-up jobs");
    }

    match result {
        Ok(()) => {
            info!(job_type = %job.job_type, elapsed_ms = started.elapsed().as_millis() as u64, "Job executed");
            respond(StatusCode::OK, started, None)
        }
        Err(e) => {
            error!(job_type = %job.job_type, error = %e, "Job failed");
            respond(StatusCode::INTERNAL_SERVER_ERROR, started, Some(e.to_string()))
        }
    }
}
