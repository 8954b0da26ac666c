//! Tether Common Types and Transports
//!
//! This crate provides the protocol definitions and the transport layer for
//! the Tether RPC client runtime.
//!
//! # Overview
//!
//! Tether turns nested method paths (`users.get`, `posts.recent`) into
//! calls against a remote object over an interchangeable backend. This
//! crate contains everything below the client surface:
//!
//! - **Protocol Layer**: id-correlated request/response envelopes and the
//!   error taxonomy
//! - **Transport Layer**: the [`transport::Transport`] contract and its
//!   implementations, plus the middleware chain and the batching engine
//!
//! # Wire Format
//!
//! - **Serialization**: JSON
//! - **Socket framing**: `[4-byte length prefix as u32 big-endian] + [JSON data]`
//! - **Batching**: many calls coalesce into one `__batch` call whose single
//!   argument is the request list; responses correlate by id
//!
//! # Example
//!
//! ```
//! use tether_common::{Request, Response};
//! use serde_json::json;
//!
//! let request = Request::new(1, "users.get", vec![json!(42)]);
//! let response = Response::success(request.id, json!({"name": "ada"}));
//! ```

pub mod auth;
pub mod protocol;
pub mod transport;

pub use protocol::*;
