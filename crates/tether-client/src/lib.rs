//! Tether RPC Client
//!
//! The outward-facing surface of the Tether RPC runtime: a client that
//! resolves its transport lazily (and at most once) and a recursive
//! dispatch proxy that turns namespace navigation into transport calls.
//!
//! # Example
//!
//! ```no_run
//! use tether_client::RpcClient;
//! use tether_common::transport::{BatchConfig, HttpTransport};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RpcClient::builder()
//!     .transport(HttpTransport::new("http://127.0.0.1:8080/rpc")?)
//!     .batching(BatchConfig::default())
//!     .build()?;
//!
//! // Direct invocation...
//! let user = client.call("users.get", vec![json!(42)]).await?;
//!
//! // ...or through the proxy.
//! let user = client
//!     .proxy()
//!     .navigate("users.get")
//!     .unwrap()
//!     .call(vec![json!(42)])
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod proxy;

pub use client::{ClientBuilder, RpcClient, TransportFactory};
pub use proxy::RpcProxy;
