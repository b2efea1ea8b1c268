//! Delivery transport: submit N HTTP requests, get N outcomes back in order.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use reqwest::Method;
use tracing::debug;

/// One outgoing request. The body is reference counted, so clones share it.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Bytes,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn post(url: impl Into<String>, body: impl Into<Bytes>, timeout: Duration) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            body: body.into(),
            headers: Vec::new(),
            timeout,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The body as text; empty if it is not UTF-8.
    pub fn body_str(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Result of one request. `code` is 0 when no HTTP response was obtained,
/// in which case `error` holds the transport error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOutcome {
    pub code: u16,
    pub reason: String,
    pub error: Option<String>,
}

impl HttpOutcome {
    pub fn status(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            error: None,
        }
    }

    pub fn transport_error(error: impl Into<String>) -> Self {
        Self {
            code: 0,
            reason: String::new(),
            error: Some(error.into()),
        }
    }
}

/// Issues requests. Implementations may run them concurrently but must
/// return outcomes in submission order.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn run_multi(&self, requests: Vec<HttpRequest>) -> Vec<HttpOutcome>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn run_multi(&self, requests: Vec<HttpRequest>) -> Vec<HttpOutcome> {
        (**self).run_multi(requests).await
    }
}

// ---------------------------------------------------------------------------
// ReqwestTransport (production)
// ---------------------------------------------------------------------------

/// reqwest-backed transport. Requests in one call are sent concurrently.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn run_one(&self, request: HttpRequest) -> HttpOutcome {
        let mut builder = self
            .client
            .request(request.method, &request.url)
            .timeout(request.timeout)
            .body(request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        match builder.send().await {
            Ok(resp) => {
                let status = resp.status();
                if !status.is_success() {
                    let body = resp.text().await.unwrap_or_default();
                    debug!(code = status.as_u16(), body = %body, "Intake returned non-success");
                }
                HttpOutcome::status(status.as_u16(), status.canonical_reason().unwrap_or_default())
            }
            Err(err) => HttpOutcome::transport_error(err.to_string()),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn run_multi(&self, requests: Vec<HttpRequest>) -> Vec<HttpOutcome> {
        join_all(requests.into_iter().map(|r| self.run_one(r))).await
    }
}

// ---------------------------------------------------------------------------
// MemoryTransport (tests, no network required)
// ---------------------------------------------------------------------------

/// In-memory transport for testing. Records every request and answers with
/// scripted outcomes, falling back to 201 Created once the script runs out.
pub struct MemoryTransport {
    requests: Mutex<Vec<HttpRequest>>,
    calls: Mutex<usize>,
    script: Mutex<VecDeque<HttpOutcome>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            calls: Mutex::new(0),
            script: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue the outcome for the next unanswered request.
    pub fn respond_with(&self, outcome: HttpOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Every request seen so far (for test assertions).
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of `run_multi` invocations.
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn run_multi(&self, requests: Vec<HttpRequest>) -> Vec<HttpOutcome> {
        *self.calls.lock().unwrap() += 1;
        let mut script = self.script.lock().unwrap();
        let outcomes = requests
            .iter()
            .map(|_| {
                script
                    .pop_front()
                    .unwrap_or_else(|| HttpOutcome::status(201, "Created"))
            })
            .collect();
        self.requests.lock().unwrap().extend(requests);
        outcomes
    }
}
