//! Middleware chain.
//!
//! Middleware observes traffic around any transport: every `on_request` hook
//! runs (awaited, in supplied order) before the underlying call, every
//! `on_response` hook after a success, every `on_error` hook after a
//! failure. Hooks observe only; the original result or error always reaches
//! the caller unchanged. Error transformation, where wanted, happens a layer
//! up in caller-supplied wrappers.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::protocol::{Result, RpcArgs, TetherError};
use crate::transport::{SharedTransport, Transport};

/// Observation hooks invoked around every call on a wrapped transport.
///
/// All hooks default to no-ops, so implementations only define the ones
/// they care about.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn on_request(&self, method: &str, args: &[Value]) {
        let _ = (method, args);
    }

    async fn on_response(&self, method: &str, result: &Value) {
        let _ = (method, result);
    }

    async fn on_error(&self, method: &str, error: &TetherError) {
        let _ = (method, error);
    }
}

/// Wraps a transport with an ordered middleware list.
///
/// An empty list returns the original transport instance untouched; no
/// wrapper is allocated.
pub fn layer(transport: SharedTransport, middleware: Vec<Arc<dyn Middleware>>) -> SharedTransport {
    if middleware.is_empty() {
        return transport;
    }
    Arc::new(MiddlewareTransport {
        inner: transport,
        middleware,
    })
}

struct MiddlewareTransport {
    inner: SharedTransport,
    middleware: Vec<Arc<dyn Middleware>>,
}

#[async_trait]
impl Transport for MiddlewareTransport {
    async fn call(&self, method: &str, args: RpcArgs) -> Result<Value> {
        for m in &self.middleware {
            m.on_request(method, &args).await;
        }

        match self.inner.call(method, args).await {
            Ok(result) => {
                for m in &self.middleware {
                    m.on_response(method, &result).await;
                }
                Ok(result)
            }
            Err(err) => {
                for m in &self.middleware {
                    m.on_error(method, &err).await;
                }
                Err(err)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RpcError;
    use serde_json::json;
    use std::sync::Mutex;

    struct EchoTransport;

    #[async_trait]
    impl Transport for EchoTransport {
        async fn call(&self, method: &str, args: RpcArgs) -> Result<Value> {
            if method == "fails" {
                return Err(TetherError::Rpc(RpcError::new("scripted failure")));
            }
            Ok(json!({"method": method, "args": args}))
        }
    }

    /// Records every hook invocation into a shared event log.
    struct Recorder {
        name: &'static str,
        events: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn on_request(&self, method: &str, _args: &[Value]) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}:request:{}", self.name, method));
        }

        async fn on_response(&self, method: &str, _result: &Value) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}:response:{}", self.name, method));
        }

        async fn on_error(&self, method: &str, error: &TetherError) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}:error:{}:{}", self.name, method, error));
        }
    }

    fn recorder(name: &'static str, events: &Arc<Mutex<Vec<String>>>) -> Arc<dyn Middleware> {
        Arc::new(Recorder {
            name,
            events: events.clone(),
        })
    }

    #[tokio::test]
    async fn test_empty_list_returns_original_instance() {
        let transport: SharedTransport = Arc::new(EchoTransport);
        let layered = layer(transport.clone(), vec![]);
        assert!(Arc::ptr_eq(&transport, &layered));
    }

    #[tokio::test]
    async fn test_hooks_run_in_supplied_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let transport = layer(
            Arc::new(EchoTransport),
            vec![recorder("first", &events), recorder("second", &events)],
        );

        transport.call("users.list", vec![]).await.unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "first:request:users.list",
                "second:request:users.list",
                "first:response:users.list",
                "second:response:users.list",
            ]
        );
    }

    #[tokio::test]
    async fn test_error_observed_and_rethrown_unchanged() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let transport = layer(Arc::new(EchoTransport), vec![recorder("mw", &events)]);

        let err = transport.call("fails", vec![]).await.unwrap_err();
        assert_eq!(err, TetherError::Rpc(RpcError::new("scripted failure")));

        assert_eq!(
            *events.lock().unwrap(),
            vec!["mw:request:fails", "mw:error:fails:scripted failure"]
        );
    }

    #[tokio::test]
    async fn test_result_passes_through_untouched() {
        let transport = layer(
            Arc::new(EchoTransport),
            vec![Arc::new(Recorder {
                name: "mw",
                events: Arc::new(Mutex::new(Vec::new())),
            })],
        );

        let result = transport.call("ping", vec![json!(1)]).await.unwrap();
        assert_eq!(result, json!({"method": "ping", "args": [1]}));
    }
}
