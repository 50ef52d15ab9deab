//! Cockpit HTTP transport

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{ClientError, OperationError, Result};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connection timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP method of a backend request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single backend request, built per call and dropped afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    /// JSON payload. Ignored for GET.
    pub body: Option<Value>,
}

impl Request {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(path)
        }
    }

    /// Attach a JSON body
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a query parameter. The value is URL-encoded when sent.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// Timeouts applied by the underlying HTTP client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound on a whole request. `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Cockpit backend client
///
/// Normalizes every non-success response and transport failure into an
/// [`OperationError`]. No retries are performed.
#[derive(Debug, Clone)]
pub struct CockpitClient {
    client: Client,
    base_url: Url,
}

impl CockpitClient {
    /// Create a new client with default timeouts
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the backend (e.g., "http://localhost:8000")
    pub fn new(base_url: &str) -> std::result::Result<Self, ClientError> {
        Self::with_config(base_url, ClientConfig::default())
    }

    /// Create a new client with custom timeouts
    pub fn with_config(
        base_url: &str,
        config: ClientConfig,
    ) -> std::result::Result<Self, ClientError> {
        let mut builder = Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        let base_url = Url::parse(base_url)?;

        Ok(Self { client, base_url })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve the full URL of a request, query string included
    pub fn url_for(&self, request: &Request) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&request.path)
            .map_err(|e| OperationError::new(format!("Invalid URL: {}", e)))?;

        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }

        Ok(url)
    }

    /// GET `path` and decode the JSON body
    pub async fn get(&self, path: &str) -> Result<Value> {
        self.send(&Request::get(path)).await
    }

    /// POST `body` (or nothing) to `path`
    pub async fn post(&self, path: &str, body: Option<Value>) -> Result<Value> {
        let mut request = Request::post(path);
        request.body = body;
        self.send(&request).await
    }

    /// Send a request to the backend
    ///
    /// A GET success body must be JSON. A POST success body that is empty or
    /// not JSON resolves to an empty object.
    #[instrument(skip(self, request), fields(method = ?request.method, path = %request.path))]
    pub async fn send(&self, request: &Request) -> Result<Value> {
        let url = self.url_for(request)?;
        debug!("Sending request to {}", url);

        let builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => match &request.body {
                Some(body) => self.client.post(url).json(body),
                None => self.client.post(url),
            },
        };

        let response = builder.send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), "Response received");

        if !status.is_success() {
            warn!(status = status.as_u16(), "Backend returned an error");
            let message = match response.text().await {
                Ok(text) => text,
                Err(e) => e.to_string(),
            };
            return Err(OperationError::new(message));
        }

        match request.method {
            Method::Get => response
                .json()
                .await
                .map_err(|e| OperationError::new(format!("Failed to parse response: {}", e))),
            Method::Post => {
                let value = match response.bytes().await {
                    Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|_| empty_object()),
                    Err(_) => empty_object(),
                };
                Ok(value)
            }
        }
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}
