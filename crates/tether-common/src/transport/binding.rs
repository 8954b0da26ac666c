//! In-process binding transport.
//!
//! Dispatches calls directly against a bound object graph: a tree of
//! namespaces whose leaves are async handlers. No serialization and no
//! network hop; a method path that does not resolve to a handler fails with
//! a "method not found" error at call time.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::protocol::{Request, Response, Result, RpcArgs, TetherError, BATCH_METHOD};
use crate::transport::Transport;

type BoundHandler = Arc<dyn Fn(RpcArgs) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

enum BoundNode {
    Namespace(HashMap<String, BoundNode>),
    Method(BoundHandler),
}

/// Transport dispatching into an in-process object graph.
///
/// Handlers are bound under dot-separated paths; nested namespaces are
/// created as needed. Binding a path that already exists replaces the
/// previous handler or subtree.
///
/// The reserved `__batch` method is unrolled locally: its single argument is
/// decoded as a request list, each request is dispatched against the graph,
/// and the results are returned as an id-correlated response list.
///
/// # Example
///
/// ```
/// use tether_common::transport::{BindingTransport, Transport};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = BindingTransport::new()
///     .bind("math.add", |args| async move {
///         let a = args[0].as_i64().unwrap_or(0);
///         let b = args[1].as_i64().unwrap_or(0);
///         Ok(json!(a + b))
///     });
///
/// let sum = transport.call("math.add", vec![json!(2), json!(3)]).await?;
/// assert_eq!(sum, json!(5));
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct BindingTransport {
    root: HashMap<String, BoundNode>,
}

impl BindingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds an async handler under a dot-separated method path.
    pub fn bind<F, Fut>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(RpcArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: BoundHandler = Arc::new(move |args| Box::pin(handler(args)));

        let mut node = &mut self.root;
        let segments: Vec<&str> = path.split('.').collect();
        for segment in &segments[..segments.len() - 1] {
            let entry = node
                .entry(segment.to_string())
                .or_insert_with(|| BoundNode::Namespace(HashMap::new()));
            // A handler bound under a shorter prefix is displaced by the namespace.
            if let BoundNode::Method(_) = entry {
                *entry = BoundNode::Namespace(HashMap::new());
            }
            node = match entry {
                BoundNode::Namespace(children) => children,
                BoundNode::Method(_) => unreachable!(),
            };
        }
        node.insert(
            segments[segments.len() - 1].to_string(),
            BoundNode::Method(handler),
        );

        self
    }

    fn resolve(&self, method: &str) -> Result<BoundHandler> {
        let mut node = &self.root;
        let segments: Vec<&str> = method.split('.').collect();

        for segment in &segments[..segments.len() - 1] {
            match node.get(*segment) {
                Some(BoundNode::Namespace(children)) => node = children,
                _ => return Err(TetherError::MethodNotFound(method.to_string())),
            }
        }
        match node.get(segments[segments.len() - 1]) {
            Some(BoundNode::Method(handler)) => Ok(handler.clone()),
            _ => Err(TetherError::MethodNotFound(method.to_string())),
        }
    }

    async fn dispatch(&self, method: &str, args: RpcArgs) -> Result<Value> {
        let handler = self.resolve(method)?;
        handler(args).await
    }

    async fn dispatch_batch(&self, args: RpcArgs) -> Result<Value> {
        if args.len() != 1 {
            return Err(TetherError::Serialization(format!(
                "{} expects a single request-list argument, got {} arguments",
                BATCH_METHOD,
                args.len()
            )));
        }
        let requests: Vec<Request> = serde_json::from_value(args.into_iter().next().unwrap())
            .map_err(|e| {
                TetherError::Serialization(format!("decoding {} argument: {}", BATCH_METHOD, e))
            })?;

        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            let response = match self.dispatch(&request.method, request.args).await {
                Ok(result) => Response::success(request.id, result),
                Err(err) => Response::error(request.id, err.into_rpc_error()),
            };
            responses.push(response);
        }

        Ok(serde_json::to_value(responses)?)
    }
}

#[async_trait]
impl Transport for BindingTransport {
    async fn call(&self, method: &str, args: RpcArgs) -> Result<Value> {
        if method == BATCH_METHOD {
            return self.dispatch_batch(args).await;
        }
        self.dispatch(method, args).await
    }
}
