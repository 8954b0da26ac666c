use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use super::RequestId;

/// Application-level error payload returned by the remote side for a
/// specific call.
///
/// `code` and `data` are carried verbatim from the wire so callers can
/// branch on them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    /// Human-readable description of the failure
    pub message: String,
    /// Application-defined error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    /// Additional structured data attached by the remote side
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Creates an error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            data: None,
        }
    }

    /// Attaches an application-defined error code.
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    /// Attaches structured error data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Errors produced by the Tether transport and dispatch layer.
///
/// Every variant carries enough structure to reconstruct the original
/// failure; nothing is ever collapsed into a default success value. The enum
/// is `Clone` so a single transport-level failure can be fanned out to every
/// request that was in flight when it happened.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TetherError {
    /// The underlying I/O failed before any response was produced
    #[error("Transport error: {0}")]
    Transport(String),

    /// A connection could not be established or was lost
    #[error("Connection error: {0}")]
    Connection(String),

    /// An operation exceeded its configured deadline
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Encoding or decoding a protocol message failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The remote side produced a response this layer cannot interpret
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A flushed batch came back without a response for this request id
    #[error("No response received for request id {0}")]
    MissingResponse(RequestId),

    /// The method path does not resolve to a callable on the receiving side
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Credentials could not be obtained or were rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The socket transport gave up after exhausting its reconnect budget
    #[error("Reconnect attempts exhausted after {0} attempts")]
    ReconnectExhausted(u32),

    /// The transport was explicitly closed
    #[error("Transport closed")]
    Closed,

    /// The client or transport was constructed with invalid settings
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A well-formed error payload returned by the remote side
    #[error("{0}")]
    Rpc(RpcError),
}

impl TetherError {
    /// The application-level error payload, when this is a remote error.
    pub fn rpc_error(&self) -> Option<&RpcError> {
        match self {
            TetherError::Rpc(err) => Some(err),
            _ => None,
        }
    }

    /// Converts this error into a wire payload.
    ///
    /// Remote errors pass through verbatim; every other variant collapses to
    /// its display form. Used when a local transport (the binding transport)
    /// has to answer a batched request list itself.
    pub fn into_rpc_error(self) -> RpcError {
        match self {
            TetherError::Rpc(err) => err,
            other => RpcError::new(other.to_string()),
        }
    }
}

impl From<RpcError> for TetherError {
    fn from(err: RpcError) -> Self {
        TetherError::Rpc(err)
    }
}

impl From<serde_json::Error> for TetherError {
    fn from(err: serde_json::Error) -> Self {
        TetherError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for TetherError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TetherError::Transport(format!("I/O timed out: {}", err))
            }
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::UnexpectedEof => {
                TetherError::Connection(err.to_string())
            }
            _ => TetherError::Transport(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for TetherError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TetherError::Transport(format!("HTTP request timed out: {}", err))
        } else if err.is_connect() {
            TetherError::Connection(err.to_string())
        } else {
            TetherError::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, TetherError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rpc_error_display() {
        let plain = RpcError::new("boom");
        assert_eq!(plain.to_string(), "boom");

        let coded = RpcError::new("boom").with_code(-32601);
        assert_eq!(coded.to_string(), "boom (code -32601)");
    }

    #[test]
    fn test_rpc_error_preserves_code_and_data() {
        let err = RpcError::new("denied")
            .with_code(403)
            .with_data(json!({"resource": "users"}));

        let wrapped = TetherError::from(err.clone());
        let inner = wrapped.rpc_error().unwrap();
        assert_eq!(inner.code, Some(403));
        assert_eq!(inner.data, Some(json!({"resource": "users"})));
        assert_eq!(inner.message, "denied");
    }

    #[test]
    fn test_into_rpc_error_collapses_local_variants() {
        let err = TetherError::MethodNotFound("users.get".into());
        let wire = err.into_rpc_error();
        assert_eq!(wire.message, "Method not found: users.get");
        assert_eq!(wire.code, None);
    }

    #[test]
    fn test_into_rpc_error_passes_remote_through() {
        let remote = RpcError::new("bad input").with_code(-1);
        let wire = TetherError::Rpc(remote.clone()).into_rpc_error();
        assert_eq!(wire, remote);
    }

    #[test]
    fn test_io_error_mapping() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            TetherError::from(refused),
            TetherError::Connection(_)
        ));

        let other = std::io::Error::new(std::io::ErrorKind::InvalidData, "garbled");
        assert!(matches!(TetherError::from(other), TetherError::Transport(_)));
    }

    #[test]
    fn test_errors_are_cloneable() {
        let err = TetherError::MissingResponse(42);
        assert_eq!(err.clone(), err);
    }

    #[test]
    fn test_rpc_error_serde_omits_absent_fields() {
        let json = serde_json::to_string(&RpcError::new("boom")).unwrap();
        assert_eq!(json, r#"{"message":"boom"}"#);

        let parsed: RpcError = serde_json::from_str(r#"{"message":"boom","code":7}"#).unwrap();
        assert_eq!(parsed.code, Some(7));
        assert_eq!(parsed.data, None);
    }
}
