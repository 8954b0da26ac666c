//! HTTP transport.
//!
//! Stateless request/response: each call posts one JSON-encoded request
//! envelope and parses the counterpart response envelope. A batched call
//! (`__batch`) travels the same way; the request list is just the single
//! argument of the envelope. The transport carries no state between calls
//! beyond its id counter, and it never retries on its own.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::auth::AuthConfig;
use crate::protocol::{Request, Response, Result, RpcArgs, TetherError};
use crate::transport::Transport;

/// Default timeout for HTTP calls (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Header carrying the static API key, when one is configured.
const API_KEY_HEADER: &str = "X-API-Key";

/// Configuration for [`HttpTransport`].
#[derive(Clone, Debug)]
pub struct HttpConfig {
    /// Endpoint receiving POSTed request envelopes
    pub endpoint: String,
    /// Per-call response deadline
    pub timeout: Duration,
    /// Optional credentials, attached as the `X-API-Key` header
    pub auth: AuthConfig,
}

impl HttpConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
            auth: AuthConfig::disabled(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }
}

/// Stateless HTTP transport.
///
/// # Example
///
/// ```no_run
/// use tether_common::transport::{HttpTransport, Transport};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = HttpTransport::new("http://127.0.0.1:8080/rpc")?;
/// let result = transport.call("users.get", vec![json!(42)]).await?;
/// # Ok(())
/// # }
/// ```
pub struct HttpTransport {
    config: HttpConfig,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Creates a transport against the given endpoint with default settings.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_config(HttpConfig::new(endpoint))
    }

    /// Creates a transport from an explicit configuration.
    pub fn with_config(config: HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TetherError::Config(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            next_id: AtomicU64::new(0),
        })
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, method: &str, args: RpcArgs) -> Result<Value> {
        let request = Request::new(self.next_id(), method, args);

        let mut builder = self.client.post(&self.config.endpoint).json(&request);
        if let Some(key) = self.config.auth.api_key() {
            builder = builder.header(API_KEY_HEADER, key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TetherError::Timeout(self.config.timeout.as_millis() as u64)
            } else {
                TetherError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TetherError::Transport(format!(
                "HTTP request to {} failed with status {}",
                self.config.endpoint, status
            )));
        }

        let envelope: Response = response
            .json()
            .await
            .map_err(|e| TetherError::InvalidResponse(format!("decoding response body: {}", e)))?;

        envelope.into_result()
    }
}
