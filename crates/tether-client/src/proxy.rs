//! Dispatch proxy.
//!
//! A proxy node accumulates a dot-separated method path while the caller
//! navigates a namespace, and turns an invocation into
//! `transport.call(path, args)`. Nodes are cheap values; a navigation chain
//! builds fresh nodes and discards them after the terminal call.
//!
//! The proxy performs no validation of the path against a schema: a
//! mistyped path only surfaces as a transport-level "method not found"
//! failure when the call is made, never at navigation time.

use serde_json::Value;

use tether_common::protocol::{Result, RpcArgs, TetherError};

use crate::client::RpcClient;

/// Navigating to one of these names yields no proxy node. They belong to
/// the promise protocol of dynamic-language callers; a node answering to
/// them could be mistaken for a pending result and awaited before any call
/// was made.
const PROMISE_PROTOCOL_NAMES: [&str; 3] = ["then", "catch", "finally"];

/// One node of the recursive dispatch proxy.
///
/// # Example
///
/// ```no_run
/// # use tether_client::RpcClient;
/// # use serde_json::json;
/// # async fn example(client: RpcClient) -> anyhow::Result<()> {
/// let users = client.proxy().get("users").unwrap();
/// let user = users.get("get").unwrap().call(vec![json!(42)]).await?;
///
/// // or in one step
/// let user = client
///     .proxy()
///     .navigate("users.get")
///     .unwrap()
///     .call(vec![json!(42)])
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcProxy {
    client: RpcClient,
    path: String,
}

impl RpcProxy {
    pub(crate) fn root(client: RpcClient) -> Self {
        Self {
            client,
            path: String::new(),
        }
    }

    /// The method path accumulated so far. Empty at the client root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Descends one namespace segment.
    ///
    /// Returns `None` for the promise-protocol names `then`, `catch` and
    /// `finally` instead of a deeper node.
    pub fn get(&self, segment: &str) -> Option<RpcProxy> {
        if PROMISE_PROTOCOL_NAMES.contains(&segment) {
            return None;
        }
        let path = if self.path.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", self.path, segment)
        };
        Some(RpcProxy {
            client: self.client.clone(),
            path,
        })
    }

    /// Descends a dot-separated path, one segment at a time.
    pub fn navigate(&self, path: &str) -> Option<RpcProxy> {
        let mut node = self.clone();
        for segment in path.split('.') {
            node = node.get(segment)?;
        }
        Some(node)
    }

    /// Invokes the accumulated path on the client's transport.
    pub async fn call(&self, args: RpcArgs) -> Result<Value> {
        if self.path.is_empty() {
            return Err(TetherError::Config(
                "the client root is not callable; navigate to a method first".to_string(),
            ));
        }
        self.client.call(&self.path, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tether_common::transport::BindingTransport;

    fn client() -> RpcClient {
        let transport = BindingTransport::new()
            .bind("users.get", |args| async move { Ok(json!({"id": args[0]})) });
        RpcClient::builder()
            .shared_transport(Arc::new(transport))
            .build()
            .unwrap()
    }

    #[test]
    fn test_path_accumulates_across_segments() {
        let proxy = client().proxy();
        assert_eq!(proxy.path(), "");

        let users = proxy.get("users").unwrap();
        assert_eq!(users.path(), "users");

        let get = users.get("get").unwrap();
        assert_eq!(get.path(), "users.get");

        // The intermediate node is unaffected by deeper navigation.
        assert_eq!(users.path(), "users");
    }

    #[test]
    fn test_navigate_splits_dotted_paths() {
        let proxy = client().proxy();
        let node = proxy.navigate("a.b.c").unwrap();
        assert_eq!(node.path(), "a.b.c");
    }

    #[test]
    fn test_promise_protocol_names_yield_no_node() {
        let proxy = client().proxy();
        assert!(proxy.get("then").is_none());
        assert!(proxy.get("catch").is_none());
        assert!(proxy.get("finally").is_none());

        // Guarded at any depth, including through navigate.
        let users = proxy.get("users").unwrap();
        assert!(users.get("then").is_none());
        assert!(proxy.navigate("users.then").is_none());
    }

    #[tokio::test]
    async fn test_root_is_not_callable() {
        let err = client().proxy().call(vec![]).await.unwrap_err();
        assert!(matches!(err, TetherError::Config(_)));
    }

    #[tokio::test]
    async fn test_call_dispatches_accumulated_path() {
        let result = client()
            .proxy()
            .navigate("users.get")
            .unwrap()
            .call(vec![json!(7)])
            .await
            .unwrap();
        assert_eq!(result, json!({"id": 7}));
    }

    #[tokio::test]
    async fn test_mistyped_path_fails_only_at_call_time() {
        let client = client();

        // Navigation succeeds no matter the path...
        let node = client.proxy().navigate("users.remove").unwrap();

        // ...and the mistake surfaces when the call is made.
        let err = node.call(vec![]).await.unwrap_err();
        assert_eq!(err, TetherError::MethodNotFound("users.remove".into()));
    }
}
