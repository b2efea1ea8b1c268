//! Single-job execution endpoint for replaying signed job events.

pub mod config;
pub mod jobs;
pub mod rest;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use eventbus::{EventBusFactory, EventBusHooks};

use jobs::JobRegistry;

pub const EXECUTE_JOB_PATH: &str = "/eventbus/v0/internal/job/execute";

pub struct AppState {
    pub factory: Arc<EventBusFactory>,
    /// Used by jobs that requeue follow-ups.
    pub hooks: Option<Arc<EventBusHooks>>,
    pub jobs: JobRegistry,
    pub secret: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        .route(EXECUTE_JOB_PATH, post(rest::execute_job))
        .with_state(state)
}
