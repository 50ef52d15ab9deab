//! Test utilities for cockpit-client
//!
//! Provides an in-process mock backend speaking the cockpit HTTP contract,
//! a server harness to run it on an ephemeral port, and an output sink that
//! records everything rendered.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::client::{ClientConfig, CockpitClient};
use crate::error::ClientError;
use crate::panel::{OutputSink, Region};

/// VIN reported by the mock backend
pub const MOCK_VIN: &str = "WF0XXXGCDX1234567";

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: CockpitClient,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve an axum Router on a free local port
    ///
    /// # Example
    ///
    /// ```ignore
    /// use cockpit_client::testing::{MockBackend, TestServer};
    ///
    /// let backend = MockBackend::new();
    /// let server = TestServer::start(backend.router()).await?;
    /// let status = server.client.get("/api/status").await?;
    /// ```
    pub async fn start(router: axum::Router) -> Result<Self, ClientError> {
        Self::start_with_config(
            router,
            ClientConfig {
                timeout: Some(Duration::from_secs(5)),
                connect_timeout: Duration::from_secs(2),
            },
        )
        .await
    }

    /// Serve a Router and connect a client with custom timeouts
    pub async fn start_with_config(
        router: axum::Router,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        // Bind to any available port
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        let client = CockpitClient::with_config(&format!("http://{}", addr), config)?;

        Ok(Self {
            addr,
            client,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Get the base URL of the test server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get a reference to the client
    pub fn client(&self) -> &CockpitClient {
        &self.client
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// =============================================================================
// Mock backend
// =============================================================================

/// A request as received by the mock backend
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Decoded query pairs
    pub query: Vec<(String, String)>,
    pub content_type: Option<String>,
    /// Raw body text
    pub body: String,
}

impl RecordedRequest {
    /// Body parsed as JSON, `None` if empty or invalid
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
enum ReplyBody {
    Json(Value),
    Text(String),
}

/// A scripted reply
#[derive(Debug, Clone)]
pub struct MockReply {
    status: u16,
    body: ReplyBody,
    delay: Option<Duration>,
}

impl MockReply {
    pub fn json(status: u16, value: Value) -> Self {
        Self {
            status,
            body: ReplyBody::Json(value),
            delay: None,
        }
    }

    /// Plain-text body (also used for non-JSON success bodies)
    pub fn text(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            body: ReplyBody::Text(text.into()),
            delay: None,
        }
    }

    pub fn empty(status: u16) -> Self {
        Self::text(status, "")
    }

    /// Hold the reply back for `delay`
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match self.body {
            ReplyBody::Json(value) => (status, Json(value)).into_response(),
            ReplyBody::Text(text) => (status, text).into_response(),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    requests: Mutex<Vec<RecordedRequest>>,
    replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
    polling_active: AtomicBool,
}

/// Mock cockpit backend
///
/// Without scripted replies it behaves like a healthy backend. Scripted
/// replies for a path are served in order and the last one repeats.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    inner: Arc<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router serving the backend contract
    pub fn router(&self) -> axum::Router {
        axum::Router::new()
            .fallback(handle_request)
            .with_state(self.clone())
    }

    /// Script the next reply for `path`
    pub fn reply(&self, path: &str, reply: MockReply) {
        self.inner
            .replies
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn set_polling_active(&self, active: bool) {
        self.inner.polling_active.store(active, Ordering::SeqCst);
    }

    pub fn polling_active(&self) -> bool {
        self.inner.polling_active.load(Ordering::SeqCst)
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.requests.lock().clone()
    }

    /// Requests received for `path`
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    fn scripted(&self, path: &str) -> Option<MockReply> {
        let mut replies = self.inner.replies.lock();
        let queue = replies.get_mut(path)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn default_reply(&self, request: &RecordedRequest) -> MockReply {
        match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/api/status") => MockReply::json(
                200,
                json!({
                    "elm_connected": true,
                    "elm_error": null,
                    "influx_connected": true,
                    "influx_error": null,
                    "active_profile": null,
                    "polling_active": self.polling_active(),
                    "polling_config": null,
                }),
            ),
            ("POST", "/api/elm/init") => MockReply::json(
                200,
                json!({"ok": true, "log": "$ ATZ\nELM327 v1.5\n\n>\n$ ATE0\nOK\n>"}),
            ),
            ("GET", "/api/vin/read") => MockReply::json(
                200,
                json!({
                    "vin": MOCK_VIN,
                    "profile": {"vin": MOCK_VIN, "ecus": [], "supported_pids": {}},
                }),
            ),
            ("POST", "/api/pids/scan") => MockReply::json(200, json!({"01": []})),
            ("POST", "/api/polling/start") => {
                self.set_polling_active(true);
                MockReply::json(200, json!({"ok": true}))
            }
            ("POST", "/api/polling/stop") => {
                self.set_polling_active(false);
                MockReply::json(200, json!({"ok": true}))
            }
            ("POST", "/api/command") => match request.query_value("command") {
                Some(command) => MockReply::json(
                    200,
                    json!({"command": command, "response": "41 0C 1A F8\r\r>"}),
                ),
                None => MockReply::text(422, "missing command"),
            },
            _ => MockReply::text(404, "Not Found"),
        }
    }
}

async fn handle_request(
    State(backend): State<MockBackend>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: url::form_urlencoded::parse(uri.query().unwrap_or("").as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    backend.inner.requests.lock().push(request.clone());

    let reply = backend
        .scripted(&request.path)
        .unwrap_or_else(|| backend.default_reply(&request));
    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }
    reply.into_response()
}

// =============================================================================
// Recording sink
// =============================================================================

/// Output sink keeping every render in order
#[derive(Debug, Default)]
pub struct RecordingSink {
    renders: Mutex<Vec<(Region, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn renders(&self) -> Vec<(Region, String)> {
        self.renders.lock().clone()
    }

    /// Everything rendered to `region`, oldest first
    pub fn history(&self, region: Region) -> Vec<String> {
        self.renders
            .lock()
            .iter()
            .filter(|(r, _)| *r == region)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Current content of `region`
    pub fn latest(&self, region: Region) -> Option<String> {
        self.history(region).pop()
    }
}

impl OutputSink for RecordingSink {
    fn render(&self, region: Region, text: &str) {
        self.renders.lock().push((region, text.to_string()));
    }
}

/// Wait for a condition with timeout
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    false
}
