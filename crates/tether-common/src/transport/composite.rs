//! Composite failover transport.
//!
//! Wraps an ordered, non-empty list of transports. Each call starts its
//! failover sequence from the first transport; a prior call's failure never
//! skips a member (stateless failover, not circuit breaking).

use async_trait::async_trait;
use serde_json::Value;

use crate::protocol::{Result, RpcArgs, TetherError};
use crate::transport::{SharedTransport, Transport};

/// Ordered fallback chain of transports.
///
/// `call` tries members in order and resolves with the first success, or
/// rejects with the last encountered error once all are exhausted. `close`
/// closes every member best-effort.
pub struct CompositeTransport {
    transports: Vec<SharedTransport>,
}

impl std::fmt::Debug for CompositeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeTransport")
            .field("transports", &self.transports.len())
            .finish()
    }
}

impl CompositeTransport {
    /// Wraps an ordered list of transports. The list must be non-empty.
    pub fn new(transports: Vec<SharedTransport>) -> Result<Self> {
        if transports.is_empty() {
            return Err(TetherError::Config(
                "composite transport requires at least one transport".to_string(),
            ));
        }
        Ok(Self { transports })
    }
}

#[async_trait]
impl Transport for CompositeTransport {
    async fn call(&self, method: &str, args: RpcArgs) -> Result<Value> {
        let mut last_err = None;

        for (index, transport) in self.transports.iter().enumerate() {
            match transport.call(method, args.clone()).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    tracing::debug!(method, index, error = %err, "transport failed, trying next");
                    last_err = Some(err);
                }
            }
        }

        // The constructor guarantees at least one member, so at least one
        // error was recorded.
        Err(last_err.unwrap_or_else(|| {
            TetherError::Transport("composite transport has no members".to_string())
        }))
    }

    async fn close(&self) -> Result<()> {
        let mut last_err = None;

        for transport in &self.transports {
            if let Err(err) = transport.close().await {
                tracing::warn!(error = %err, "closing wrapped transport failed");
                last_err = Some(err);
            }
        }

        match last_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
