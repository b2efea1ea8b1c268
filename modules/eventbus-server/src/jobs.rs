//! Job executors for the single-job endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eventbus::serializers::job::JobSpec;
use eventbus::{DeferredQueue, EventBusError, EventBusHooks, RequestContext};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job params: {0}")]
    InvalidParams(String),

    #[error("job failed: {0}")]
    Failed(String),

    #[error(transparent)]
    EventBus(#[from] EventBusError),
}

/// What a running job can touch: the request it runs in, and a queue for
/// follow-up jobs that is flushed once it returns.
pub struct JobContext {
    pub request: RequestContext,
    hooks: Option<Arc<EventBusHooks>>,
    queue: DeferredQueue,
}

impl JobContext {
    pub fn new(request: RequestContext, hooks: Option<Arc<EventBusHooks>>) -> Self {
        Self {
            queue: DeferredQueue::for_request(request.clone()),
            request,
            hooks,
        }
    }

    /// Push a job back onto the job stream after everything else this request queued.
    pub fn requeue(&mut self, job: JobSpec) -> Result<(), JobError> {
        let hooks = self
            .hooks
            .as_ref()
            .ok_or_else(|| JobError::Failed("job production is not configured".into()))?;
        hooks.requeue_jobs(&mut self.queue, &self.request, &[job])?;
        Ok(())
    }

    pub fn into_queue(self) -> DeferredQueue {
        self.queue
    }
}

#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn run(&self, job: &JobSpec, ctx: &mut JobContext) -> Result<(), JobError>;
}

/// Job type -> executor.
#[derive(Default, Clone)]
pub struct JobRegistry {
    executors: HashMap<String, Arc<dyn JobExecutor>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `null` job.
    pub fn with_builtins() -> Self {
        Self::new().register("null", NullJob)
    }

    pub fn register(mut self, job_type: impl Into<String>, executor: impl JobExecutor + 'static) -> Self {
        self.executors.insert(job_type.into(), Arc::new(executor));
        self
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobExecutor>> {
        self.executors.get(job_type).cloned()
    }
}

/// Does nothing, optionally slowly. With `lives > 1` it requeues itself
/// with one life fewer.
pub struct NullJob;

#[async_trait]
impl JobExecutor for NullJob {
    async fn run(&self, job: &JobSpec, ctx: &mut JobContext) -> Result<(), JobError> {
        let lives = int_param(&job.params, "lives")?.unwrap_or(1);
        let usleep = int_param(&job.params, "usleep")?.unwrap_or(0);

        if usleep > 0 {
            tokio::time::sleep(Duration::from_micros(usleep)).await;
        }

        if lives > 1 {
            debug!(lives, "Requeueing null job");
            let mut next = job.clone();
            next.params.insert("lives".into(), json!(lives - 1));
            ctx.requeue(next)?;
        }
        Ok(())
    }
}

fn int_param(params: &serde_json::Map<String, Value>, key: &str) -> Result<Option<u64>, JobError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| JobError::InvalidParams(format!("{key} must be a non-negative integer"))),
    }
}
