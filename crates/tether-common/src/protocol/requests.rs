use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type RequestId = u64;
pub type MethodName = String;
pub type RpcArgs = Vec<Value>;

/// Method name reserved by the batching engine. A transport receiving it
/// must treat the single argument as a `Vec<Request>` and produce a
/// `Vec<Response>` correlated by id.
pub const BATCH_METHOD: &str = "__batch";

/// Method name reserved for the socket handshake frame carrying credentials.
pub const AUTH_METHOD: &str = "__auth";

/// An id-correlated RPC request.
///
/// The same envelope is used for single calls (HTTP, socket frames) and as
/// the element type of a batched request list. Ids are assigned by the
/// issuing component from its own monotonic counter; they are unique within
/// that component's lifetime and never reused.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: MethodName,
    pub args: RpcArgs,
}

impl Request {
    pub fn new(id: RequestId, method: impl Into<String>, args: RpcArgs) -> Self {
        Request {
            id,
            method: method.into(),
            args,
        }
    }
}
