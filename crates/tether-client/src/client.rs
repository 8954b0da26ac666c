//! RPC client: transport resolution and wiring.
//!
//! The client owns a transport source that may be deferred behind an async
//! factory (a handshake, a discovery lookup). The factory is awaited at
//! most once, under a lock, and its outcome is memoized for the client's
//! lifetime: success and failure both stick.
//!
//! Wiring order: the base transport is wrapped by the batching engine (if
//! configured) and then by the middleware chain, so middleware observes
//! each logical call rather than the coalesced `__batch` traffic.

use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use tether_common::protocol::{Result, RpcArgs, TetherError};
use tether_common::transport::{
    layer, BatchConfig, BatchObserver, BatchTransport, Middleware, SharedTransport, Transport,
};

use crate::proxy::RpcProxy;

/// Deferred transport constructor, for backends whose construction is
/// itself asynchronous.
pub type TransportFactory = Box<dyn FnOnce() -> BoxFuture<'static, Result<SharedTransport>> + Send>;

enum TransportSource {
    Ready(SharedTransport),
    Deferred(Option<TransportFactory>),
    Failed(TetherError),
}

struct ClientInner {
    source: Mutex<TransportSource>,
    middleware: Vec<Arc<dyn Middleware>>,
    batching: Option<BatchConfig>,
    batch_observer: Option<BatchObserver>,
}

/// The outward-facing RPC client.
///
/// Cheap to clone; clones share the resolved transport and its wiring.
///
/// # Example
///
/// ```no_run
/// use tether_client::RpcClient;
/// use tether_common::transport::HttpTransport;
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let client = RpcClient::builder()
///     .transport(HttpTransport::new("http://127.0.0.1:8080/rpc")?)
///     .build()?;
///
/// let user = client.call("users.get", vec![json!(42)]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient").finish_non_exhaustive()
    }
}

impl RpcClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Invokes a dot-separated method path with positional arguments.
    pub async fn call(&self, method: &str, args: RpcArgs) -> Result<Value> {
        let transport = self.resolve().await?;
        transport.call(method, args).await
    }

    /// A proxy node at the namespace root.
    pub fn proxy(&self) -> RpcProxy {
        RpcProxy::root(self.clone())
    }

    /// Closes the resolved transport. A deferred transport that was never
    /// resolved has nothing to close.
    pub async fn close(&self) -> Result<()> {
        let source = self.inner.source.lock().await;
        match &*source {
            TransportSource::Ready(transport) => transport.close().await,
            _ => Ok(()),
        }
    }

    /// Resolves the transport, running the factory on first use.
    ///
    /// The lock is held across the factory await so concurrent first calls
    /// serialize behind one invocation.
    async fn resolve(&self) -> Result<SharedTransport> {
        let mut source = self.inner.source.lock().await;
        match &mut *source {
            TransportSource::Ready(transport) => Ok(transport.clone()),
            TransportSource::Failed(err) => Err(err.clone()),
            TransportSource::Deferred(factory) => {
                let factory = factory.take().expect("factory present until first resolution");
                tracing::debug!("resolving deferred transport");
                match factory().await {
                    Ok(base) => {
                        let wrapped = wire(
                            base,
                            self.inner.middleware.clone(),
                            self.inner.batching.clone(),
                            self.inner.batch_observer.clone(),
                        );
                        *source = TransportSource::Ready(wrapped.clone());
                        Ok(wrapped)
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "transport factory failed");
                        *source = TransportSource::Failed(err.clone());
                        Err(err)
                    }
                }
            }
        }
    }
}

/// Applies the configured wrapping to a base transport: batching first
/// (wire-adjacent), middleware outermost.
fn wire(
    base: SharedTransport,
    middleware: Vec<Arc<dyn Middleware>>,
    batching: Option<BatchConfig>,
    batch_observer: Option<BatchObserver>,
) -> SharedTransport {
    let base: SharedTransport = match batching {
        Some(config) => Arc::new(BatchTransport::with_observer(base, config, batch_observer)),
        None => base,
    };
    layer(base, middleware)
}

/// Builder for [`RpcClient`].
#[derive(Default)]
pub struct ClientBuilder {
    source: Option<TransportSource>,
    middleware: Vec<Arc<dyn Middleware>>,
    batching: Option<BatchConfig>,
    batch_observer: Option<BatchObserver>,
}

impl ClientBuilder {
    /// Uses an owned transport as the backend.
    pub fn transport(self, transport: impl Transport + 'static) -> Self {
        self.shared_transport(Arc::new(transport))
    }

    /// Uses an already-shared transport as the backend.
    pub fn shared_transport(mut self, transport: SharedTransport) -> Self {
        self.source = Some(TransportSource::Ready(transport));
        self
    }

    /// Defers transport construction to an async factory, run at most once
    /// on first use.
    pub fn transport_factory<F, Fut>(mut self, factory: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<SharedTransport>> + Send + 'static,
    {
        self.source = Some(TransportSource::Deferred(Some(Box::new(move || {
            Box::pin(factory())
        }))));
        self
    }

    /// Appends a middleware; hooks run in the order supplied.
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Enables the batching engine between the middleware and the backend.
    pub fn batching(mut self, config: BatchConfig) -> Self {
        self.batching = Some(config);
        self
    }

    /// Observer invoked with every batch the engine flushes.
    pub fn batch_observer(mut self, observer: BatchObserver) -> Self {
        self.batch_observer = Some(observer);
        self
    }

    pub fn build(self) -> Result<RpcClient> {
        let source = self
            .source
            .ok_or_else(|| TetherError::Config("no transport configured".to_string()))?;

        // A ready transport is wired immediately; a deferred one is wired
        // when the factory resolves.
        let source = match source {
            TransportSource::Ready(base) => TransportSource::Ready(wire(
                base,
                self.middleware.clone(),
                self.batching.clone(),
                self.batch_observer.clone(),
            )),
            deferred => deferred,
        };

        Ok(RpcClient {
            inner: Arc::new(ClientInner {
                source: Mutex::new(source),
                middleware: self.middleware,
                batching: self.batching,
                batch_observer: self.batch_observer,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tether_common::transport::BindingTransport;

    fn echo_binding() -> SharedTransport {
        Arc::new(
            BindingTransport::new().bind("ping", |args| async move { Ok(json!({"pong": args})) }),
        )
    }

    #[tokio::test]
    async fn test_direct_call() {
        let client = RpcClient::builder()
            .shared_transport(echo_binding())
            .build()
            .unwrap();
        let result = client.call("ping", vec![json!(1)]).await.unwrap();
        assert_eq!(result, json!({"pong": [1]}));
    }

    #[test]
    fn test_build_without_transport_is_an_error() {
        let err = RpcClient::builder().build().unwrap_err();
        assert!(matches!(err, TetherError::Config(_)));
    }

    #[tokio::test]
    async fn test_factory_runs_at_most_once_under_concurrency() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = invocations.clone();

        let client = RpcClient::builder()
            .transport_factory(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                // Simulated asynchronous handshake.
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                Ok(echo_binding())
            })
            .build()
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                client.call("ping", vec![]).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_factory_failure_sticks() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = invocations.clone();

        let client = RpcClient::builder()
            .transport_factory(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TetherError::Connection("handshake refused".into()))
            })
            .build()
            .unwrap();

        let first = client.call("ping", vec![]).await.unwrap_err();
        let second = client.call("ping", vec![]).await.unwrap_err();

        assert_eq!(first, TetherError::Connection("handshake refused".into()));
        assert_eq!(first, second);
        // The failed factory is not retried.
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_without_resolution_does_not_run_the_factory() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = invocations.clone();

        let client = RpcClient::builder()
            .transport_factory(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(echo_binding())
            })
            .build()
            .unwrap();

        client.close().await.unwrap();
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }
}
