//! Request batching engine.
//!
//! Wraps any transport and coalesces calls issued while a collection window
//! is open into a single `__batch` call on the underlying transport. Each
//! coalesced call keeps its own correlation id and resolves or rejects
//! independently of its batch siblings.
//!
//! Two collection policies:
//!
//! - **Window**: the first call after idle starts a timer for the configured
//!   window; every call issued while it is pending joins the batch; the
//!   batch flushes at expiry.
//! - **Debounce**: every call resets the timer, so the batch flushes only
//!   after a quiet period. Suited to absorbing bursts of unknown duration.
//!
//! Under either policy, reaching `max_batch_size` flushes immediately and
//! cancels the pending timer, bounding both worst-case latency and batch
//! size.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use async_trait::async_trait;

use crate::protocol::{Request, RequestId, Response, Result, RpcArgs, TetherError, BATCH_METHOD};
use crate::transport::{SharedTransport, Transport};

/// Collection policy for the batching engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchPolicy {
    /// Flush a fixed window after the first call of a batch
    Window,
    /// Flush after a quiet period; every call resets the timer
    Debounce,
}

/// Configuration for [`BatchTransport`].
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Collection window (window policy) or quiet period (debounce policy)
    pub window: Duration,
    /// Batch size that triggers an immediate flush
    pub max_batch_size: usize,
    /// Collection policy
    pub policy: BatchPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(10),
            max_batch_size: 64,
            policy: BatchPolicy::Window,
        }
    }
}

/// Observer invoked with every batch just before it is sent.
pub type BatchObserver = Arc<dyn Fn(&[Request]) + Send + Sync>;

type Waiter = oneshot::Sender<Result<Value>>;

/// A batch taken out of the queue, ready to flush.
struct TakenBatch {
    requests: Vec<Request>,
    waiters: Vec<Waiter>,
    timer: Option<JoinHandle<()>>,
}

struct Queue {
    requests: Vec<Request>,
    waiters: Vec<Waiter>,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever a batch is taken; lets a superseded timer detect that
    /// its batch is gone and do nothing.
    generation: u64,
}

impl Queue {
    fn take_batch(&mut self) -> TakenBatch {
        self.generation += 1;
        TakenBatch {
            requests: std::mem::take(&mut self.requests),
            waiters: std::mem::take(&mut self.waiters),
            timer: self.timer.take(),
        }
    }
}

struct BatchShared {
    inner: SharedTransport,
    config: BatchConfig,
    observer: Option<BatchObserver>,
    next_id: AtomicU64,
    queue: Mutex<Queue>,
}

/// Transport wrapper coalescing concurrent calls into `__batch` round trips.
///
/// Correlation ids are a per-engine monotonic counter, never shared between
/// engine instances and never reused, so a stale response from a prior batch
/// cannot be mismatched to a new request.
///
/// A call whose method is already `__batch` is forwarded to the underlying
/// transport untouched rather than being coalesced a second time.
pub struct BatchTransport {
    shared: Arc<BatchShared>,
}

impl BatchTransport {
    pub fn new(inner: SharedTransport, config: BatchConfig) -> Self {
        Self::with_observer(inner, config, None)
    }

    /// Creates an engine that reports every outgoing batch to `observer`.
    pub fn with_observer(
        inner: SharedTransport,
        config: BatchConfig,
        observer: Option<BatchObserver>,
    ) -> Self {
        Self {
            shared: Arc::new(BatchShared {
                inner,
                config,
                observer,
                next_id: AtomicU64::new(0),
                queue: Mutex::new(Queue {
                    requests: Vec::new(),
                    waiters: Vec::new(),
                    timer: None,
                    generation: 0,
                }),
            }),
        }
    }
}

/// Arms (or re-arms) the flush timer for the batch currently collecting.
///
/// Caller must hold the queue lock.
fn arm_timer(shared: &Arc<BatchShared>, queue: &mut Queue) {
    if let Some(previous) = queue.timer.take() {
        previous.abort();
    }

    let generation = queue.generation;
    let task_shared = shared.clone();
    queue.timer = Some(tokio::spawn(async move {
        tokio::time::sleep(task_shared.config.window).await;

        let batch = {
            let mut queue = task_shared.queue.lock().unwrap();
            if queue.generation != generation || queue.requests.is_empty() {
                return;
            }
            // The taken timer handle is this task; dropping it detaches.
            queue.take_batch()
        };
        flush(&task_shared, batch.requests, batch.waiters).await;
    }));
}

/// Sends one batch and routes responses back to the waiting callers by id.
async fn flush(shared: &Arc<BatchShared>, requests: Vec<Request>, waiters: Vec<Waiter>) {
    if requests.is_empty() {
        return;
    }

    if let Some(observer) = &shared.observer {
        observer(&requests);
    }
    tracing::debug!(size = requests.len(), "flushing batch");

    let payload = match serde_json::to_value(&requests) {
        Ok(payload) => payload,
        Err(err) => {
            reject_all(waiters, TetherError::Serialization(err.to_string()));
            return;
        }
    };

    let outcome = shared.inner.call(BATCH_METHOD, vec![payload]).await;

    let value = match outcome {
        Ok(value) => value,
        Err(err) => {
            // Transport-level failure: every request in the batch sees it.
            reject_all(waiters, err);
            return;
        }
    };

    let responses: Vec<Response> = match serde_json::from_value(value) {
        Ok(responses) => responses,
        Err(err) => {
            reject_all(
                waiters,
                TetherError::InvalidResponse(format!(
                    "batch result was not a response list: {}",
                    err
                )),
            );
            return;
        }
    };

    // Route strictly by correlation id; array position carries no meaning.
    let mut by_id: HashMap<RequestId, Response> =
        responses.into_iter().map(|r| (r.id, r)).collect();

    for (request, waiter) in requests.iter().zip(waiters) {
        let outcome = match by_id.remove(&request.id) {
            Some(response) => response.into_result(),
            None => Err(TetherError::MissingResponse(request.id)),
        };
        let _ = waiter.send(outcome);
    }
}

fn reject_all(waiters: Vec<Waiter>, err: TetherError) {
    for waiter in waiters {
        let _ = waiter.send(Err(err.clone()));
    }
}

#[async_trait]
impl Transport for BatchTransport {
    async fn call(&self, method: &str, args: RpcArgs) -> Result<Value> {
        if method == BATCH_METHOD {
            return self.shared.inner.call(method, args).await;
        }

        let shared = &self.shared;
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();

        let full_batch = {
            let mut queue = shared.queue.lock().unwrap();
            queue.requests.push(Request::new(id, method, args));
            queue.waiters.push(tx);

            if queue.requests.len() >= shared.config.max_batch_size {
                Some(queue.take_batch())
            } else {
                let first_in_batch = queue.requests.len() == 1;
                if first_in_batch || shared.config.policy == BatchPolicy::Debounce {
                    arm_timer(shared, &mut queue);
                }
                None
            }
        };

        if let Some(batch) = full_batch {
            if let Some(timer) = batch.timer {
                timer.abort();
            }
            flush(shared, batch.requests, batch.waiters).await;
        }

        rx.await
            .map_err(|_| TetherError::Transport("batch flush dropped its waiters".to_string()))?
    }

    /// Flushes any still-collecting batch, then closes the underlying
    /// transport, so no caller is left with a permanently pending call.
    async fn close(&self) -> Result<()> {
        let batch = {
            let mut queue = self.shared.queue.lock().unwrap();
            queue.take_batch()
        };
        if let Some(timer) = batch.timer {
            timer.abort();
        }
        flush(&self.shared, batch.requests, batch.waiters).await;

        self.shared.inner.close().await
    }
}
