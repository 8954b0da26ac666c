//! Tether Transport Layer
//!
//! Every backend implements the [`Transport`] contract; everything above it
//! (middleware, batching, the dispatch proxy) is written against that
//! contract alone.
//!
//! # Components
//!
//! - **[`Transport`]**: the pluggable interface performing method-call I/O
//! - **[`HttpTransport`]**: stateless request/response over HTTP POST
//! - **[`SocketTransport`]**: persistent, reconnecting, length-prefixed TCP
//! - **[`BindingTransport`]**: zero-serialization in-process dispatch
//! - **[`CompositeTransport`]**: ordered per-call failover chain
//! - **[`Middleware`]** / **[`layer`]**: observation hooks around any transport
//! - **[`BatchTransport`]**: coalesces concurrent calls into one `__batch` call
//!
//! # Wire Format
//!
//! The socket transport frames JSON messages with a 4-byte big-endian length
//! prefix: `[u32 length] + [JSON data]`. The HTTP transport posts the same
//! request envelope as a JSON body.

pub mod batch;
pub mod binding;
pub mod codec;
pub mod composite;
pub mod http;
pub mod middleware;
pub mod socket;


use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::protocol::{Result, RpcArgs};

pub use batch::{BatchConfig, BatchObserver, BatchPolicy, BatchTransport};
pub use binding::BindingTransport;
pub use codec::JsonCodec;
pub use composite::CompositeTransport;
pub use http::{HttpConfig, HttpTransport};
pub use middleware::{layer, Middleware};
pub use socket::{ConnectionState, SocketConfig, SocketTransport};

/// The pluggable interface every backend implements.
///
/// `call` sends one method invocation and resolves with its result value or
/// rejects with an error carrying at least a human-readable message.
/// `close` releases any held resources; it is idempotent, and the default
/// implementation is a no-op for stateless transports.
///
/// Transports are shared as `Arc<dyn Transport>` across many concurrent
/// calls; implementations must be safe under that sharing.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, method: &str, args: RpcArgs) -> Result<Value>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A shareable transport handle.
pub type SharedTransport = Arc<dyn Transport>;
