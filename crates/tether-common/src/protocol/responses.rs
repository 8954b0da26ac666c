//! RPC response envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{Result, RpcError, TetherError};
use super::RequestId;

/// An id-correlated RPC response.
///
/// Exactly one of `result` and `error` is expected to be present. A response
/// carrying neither resolves to JSON `null`, matching a remote method that
/// returned nothing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Request identifier this response corresponds to
    pub id: RequestId,
    /// Result value (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Creates a successful response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error response.
    pub fn error(id: RequestId, error: RpcError) -> Self {
        Response {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Resolves the envelope into the caller-visible outcome.
    ///
    /// An error payload takes precedence over any result value.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(err) => Err(TetherError::Rpc(err)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_into_result() {
        let response = Response::success(1, json!({"ok": true}));
        assert_eq!(response.into_result().unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_error_into_result() {
        let response = Response::error(1, RpcError::new("nope").with_code(9));
        let err = response.into_result().unwrap_err();
        match err {
            TetherError::Rpc(rpc) => {
                assert_eq!(rpc.message, "nope");
                assert_eq!(rpc.code, Some(9));
            }
            other => panic!("expected Rpc error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_response_resolves_to_null() {
        let response = Response {
            id: 1,
            result: None,
            error: None,
        };
        assert_eq!(response.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_serde_omits_absent_fields() {
        let json = serde_json::to_string(&Response::success(7, json!(1))).unwrap();
        assert_eq!(json, r#"{"id":7,"result":1}"#);
    }
}
