//! Router tests for the job execution endpoint, no network required.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use eventbus::serializers::job::{job_event, job_stream, JobSpec};
use eventbus::serializers::Site;
use eventbus::signature::attach_signature;
use eventbus::{EventBusConfig, EventBusFactory, EventBusHooks, MemoryTransport, RequestContext};
use eventbus_server::jobs::{JobContext, JobError, JobExecutor, JobRegistry};
use eventbus_server::{router, AppState, EXECUTE_JOB_PATH};
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "test-secret";

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct FailingJob;

#[async_trait]
impl JobExecutor for FailingJob {
    async fn run(&self, _job: &JobSpec, _ctx: &mut JobContext) -> Result<(), JobError> {
        Err(JobError::Failed("boom".into()))
    }
}

fn site() -> Site {
    Site::new("https://en.wikipedia.org", "enwiki")
}

fn state(transport: Arc<MemoryTransport>) -> Arc<AppState> {
    let config = EventBusConfig::default()
        .with_service("intake-main", "http://intake.main")
        .with_default_service("intake-main");
    let factory = Arc::new(EventBusFactory::new(config, transport));
    let hooks = EventBusHooks::new(factory.clone(), site()).with_job_secret(SECRET);
    Arc::new(AppState {
        factory,
        hooks: Some(Arc::new(hooks)),
        jobs: JobRegistry::with_builtins().register("explode", FailingJob),
        secret: SECRET.to_string(),
    })
}

fn signed_job(job: &JobSpec, secret: &str) -> Value {
    let ctx = RequestContext::new("en.wikipedia.org");
    job_event(&site(), &ctx, &job_stream(&job.job_type), job, secret).unwrap()
}

async fn post_job(state: Arc<AppState>, body: String) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(EXECUTE_JOB_PATH)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();
    let response = router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_responds_ok() {
    let app = router(state(Arc::new(MemoryTransport::new())));
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn signed_null_job_runs() {
    let transport = Arc::new(MemoryTransport::new());
    let event = signed_job(&JobSpec::new("null").with_param("usleep", json!(10)), SECRET);

    let (status, body) = post_job(state(transport.clone()), event.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], true);
    assert!(body.get("error").is_none());
    assert!(body["timeMs"].is_u64());
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn null_job_with_lives_requeues_itself() {
    let transport = Arc::new(MemoryTransport::new());
    let event = signed_job(&JobSpec::new("null").with_param("lives", json!(3)), SECRET);

    let (status, _) = post_job(state(transport.clone()), event.to_string()).await;

    assert_eq!(status, StatusCode::OK);
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let sent: Vec<Value> = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent[0]["meta"]["stream"], "mediawiki.job.null");
    assert_eq!(sent[0]["params"]["lives"], 2);
}

#[tokio::test]
async fn wrong_signature_is_forbidden() {
    let event = signed_job(&JobSpec::new("null"), "someone-else");
    let (status, body) = post_job(state(Arc::new(MemoryTransport::new())), event.to_string()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], false);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let (status, body) = post_job(state(Arc::new(MemoryTransport::new())), "{not json".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("invalid JSON"));

    let (status, _) = post_job(state(Arc::new(MemoryTransport::new())), "[1, 2]".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_job_type_is_a_bad_request() {
    let event = signed_job(&JobSpec::new("refreshLinks"), SECRET);
    let (status, body) = post_job(state(Arc::new(MemoryTransport::new())), event.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unknown job type: refreshLinks");
}

#[tokio::test]
async fn signed_event_without_type_is_a_bad_request() {
    let mut event = json!({"params": {}});
    attach_signature(&mut event, SECRET).unwrap();
    let (status, _) = post_job(state(Arc::new(MemoryTransport::new())), event.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failing_job_is_a_server_error() {
    let event = signed_job(&JobSpec::new("explode"), SECRET);
    let (status, body) = post_job(state(Arc::new(MemoryTransport::new())), event.to_string()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], false);
    assert_eq!(body["error"], "job failed: boom");
}
