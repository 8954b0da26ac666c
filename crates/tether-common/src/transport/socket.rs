//! Persistent, reconnecting socket transport.
//!
//! Maintains one length-prefixed-JSON TCP connection and multiplexes calls
//! over it by correlation id. The connection lifecycle is
//! `Disconnected → Connecting → Connected`; an unexpected loss while
//! connected moves to `Reconnecting` with exponential backoff, and
//! exhausting the reconnect budget lands in a terminal `Failed` state where
//! every pending and future call rejects immediately. An explicit `close`
//! lands in `Disconnected` instead, without raising an error for the
//! transition itself.
//!
//! Calls issued while the connection is being (re)established queue and are
//! written in submission order once connected. Requests already handed to
//! the wire when the connection drops reject with a transport-level error;
//! queued-unsent requests carry over into the next connection.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};

use async_trait::async_trait;

use crate::auth::AuthConfig;
use crate::protocol::{Request, RequestId, Result, RpcArgs, TetherError, AUTH_METHOD};
use crate::transport::codec::{self, JsonCodec};
use crate::transport::Transport;

/// Default timeout for one connection attempt (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for [`SocketTransport`].
#[derive(Clone, Debug)]
pub struct SocketConfig {
    /// Remote address, e.g. "127.0.0.1:8080"
    pub addr: String,
    /// Deadline for a single connection attempt
    pub connect_timeout: Duration,
    /// Initial delay before a reconnection attempt; doubles per consecutive
    /// failure
    pub reconnect_backoff: Duration,
    /// Upper bound on the backoff delay
    pub max_reconnect_delay: Duration,
    /// Consecutive connection failures tolerated before the transport fails
    /// terminally
    pub max_reconnect_attempts: u32,
    /// Credentials attached to the connection handshake
    pub auth: AuthConfig,
}

impl SocketConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_backoff: Duration::from_millis(100),
            max_reconnect_delay: Duration::from_secs(30),
            max_reconnect_attempts: 5,
            auth: AuthConfig::disabled(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect_backoff(mut self, initial: Duration, max_delay: Duration) -> Self {
        self.reconnect_backoff = initial;
        self.max_reconnect_delay = max_delay;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }
}

/// Connection lifecycle of a [`SocketTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; terminal after an explicit `close`
    Disconnected,
    /// First connection being established
    Connecting,
    /// Connection up; calls flow
    Connected,
    /// Connection lost; re-establishment in progress
    Reconnecting,
    /// Reconnect budget exhausted or fatal handshake failure; terminal
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

type Waiter = oneshot::Sender<Result<Value>>;

struct SocketShared {
    config: SocketConfig,
    state: Mutex<ConnectionState>,
    /// The error that made the transport terminal, reported to later callers
    terminal: Mutex<Option<TetherError>>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<RequestId, Waiter>>,
    outbound: mpsc::UnboundedSender<Request>,
    shutdown: watch::Sender<bool>,
}

/// Persistent socket transport with automatic reconnection.
///
/// # Example
///
/// ```no_run
/// use tether_common::transport::{SocketConfig, SocketTransport, Transport};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = SocketTransport::new(SocketConfig::new("127.0.0.1:8080"));
/// let user = transport.call("users.get", vec![json!(42)]).await?;
/// transport.close().await?;
/// # Ok(())
/// # }
/// ```
pub struct SocketTransport {
    shared: Arc<SocketShared>,
}

impl SocketTransport {
    /// Creates the transport and starts connecting in the background.
    ///
    /// Construction itself never fails; connection problems surface through
    /// the state machine and through call outcomes.
    pub fn new(config: SocketConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(SocketShared {
            config,
            state: Mutex::new(ConnectionState::Connecting),
            terminal: Mutex::new(None),
            // Id 0 is reserved for the handshake frame.
            next_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            outbound: outbound_tx,
            shutdown: shutdown_tx,
        });

        tokio::spawn(run(shared.clone(), outbound_rx, shutdown_rx));

        Self { shared }
    }

    /// Current state of the connection lifecycle.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock().unwrap()
    }

    fn terminal_error(&self) -> TetherError {
        self.shared
            .terminal
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| {
                TetherError::ReconnectExhausted(self.shared.config.max_reconnect_attempts)
            })
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        let _ = self.shared.shutdown.send(true);
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn call(&self, method: &str, args: RpcArgs) -> Result<Value> {
        match self.state() {
            ConnectionState::Failed => return Err(self.terminal_error()),
            ConnectionState::Disconnected => return Err(TetherError::Closed),
            _ => {}
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().unwrap().insert(id, tx);

        if self.shared.outbound.send(Request::new(id, method, args)).is_err() {
            self.shared.pending.lock().unwrap().remove(&id);
            return Err(match self.state() {
                ConnectionState::Failed => self.terminal_error(),
                _ => TetherError::Closed,
            });
        }

        // The manager may have gone terminal between the state check and the
        // enqueue; if our entry is still there, settle it ourselves.
        match self.state() {
            ConnectionState::Failed => {
                if self.shared.pending.lock().unwrap().remove(&id).is_some() {
                    return Err(self.terminal_error());
                }
            }
            ConnectionState::Disconnected => {
                if self.shared.pending.lock().unwrap().remove(&id).is_some() {
                    return Err(TetherError::Closed);
                }
            }
            _ => {}
        }

        rx.await.map_err(|_| TetherError::Closed)?
    }

    /// Stops the connection manager and rejects everything still pending.
    ///
    /// Idempotent; the transport ends in `Disconnected`, not `Failed`, and
    /// no reconnection is attempted afterwards.
    async fn close(&self) -> Result<()> {
        set_state(&self.shared, ConnectionState::Disconnected);
        let _ = self.shared.shutdown.send(true);
        reject_all(&self.shared, TetherError::Closed);
        Ok(())
    }
}

fn set_state(shared: &SocketShared, state: ConnectionState) {
    *shared.state.lock().unwrap() = state;
}

/// Settles one pending request. Frames answering no known id (the handshake
/// acknowledgement, or a response raced with a rejection) are dropped.
fn complete(shared: &SocketShared, id: RequestId, outcome: Result<Value>) {
    let waiter = shared.pending.lock().unwrap().remove(&id);
    match waiter {
        Some(tx) => {
            let _ = tx.send(outcome);
        }
        None => tracing::debug!(id, "dropping response for unknown request id"),
    }
}

fn reject_all(shared: &SocketShared, error: TetherError) {
    let waiters: Vec<Waiter> = {
        let mut pending = shared.pending.lock().unwrap();
        pending.drain().map(|(_, waiter)| waiter).collect()
    };
    for waiter in waiters {
        let _ = waiter.send(Err(error.clone()));
    }
}

/// Marks the transport terminally failed and rejects everything pending.
fn fail(shared: &SocketShared, error: TetherError) {
    *shared.terminal.lock().unwrap() = Some(error.clone());
    set_state(shared, ConnectionState::Failed);
    reject_all(shared, error);
}

/// Why a connection epoch ended.
enum Disconnect {
    /// Explicit close or transport dropped
    Shutdown,
    /// The wire failed; carries the error and the ids handed to this epoch
    Lost {
        error: TetherError,
        in_flight: Vec<RequestId>,
    },
}

/// Connection manager: dials, hands the connection to [`drive_connection`],
/// and applies the reconnect policy between epochs.
async fn run(
    shared: Arc<SocketShared>,
    mut outbound: mpsc::UnboundedReceiver<Request>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempts: u32 = 0;
    let mut delay = shared.config.reconnect_backoff;

    loop {
        if *shutdown.borrow() {
            break;
        }

        // Credentials are resolved once per connection attempt. A provider
        // that cannot produce them is fatal, not retried.
        let token = match shared.config.auth.resolve().await {
            Ok(token) => token,
            Err(err) => {
                tracing::warn!(error = %err, "credential resolution failed");
                fail(&shared, err);
                return;
            }
        };

        let dial = tokio::time::timeout(
            shared.config.connect_timeout,
            TcpStream::connect(shared.config.addr.as_str()),
        );
        let stream = tokio::select! {
            _ = shutdown.changed() => break,
            result = dial => match result {
                Ok(Ok(stream)) => Some(stream),
                Ok(Err(err)) => {
                    tracing::debug!(addr = %shared.config.addr, error = %err, "connection attempt failed");
                    None
                }
                Err(_) => {
                    tracing::debug!(addr = %shared.config.addr, "connection attempt timed out");
                    None
                }
            },
        };

        let Some(stream) = stream else {
            attempts += 1;
            if attempts >= shared.config.max_reconnect_attempts {
                tracing::warn!(
                    addr = %shared.config.addr,
                    attempts,
                    "reconnect attempts exhausted"
                );
                fail(&shared, TetherError::ReconnectExhausted(attempts));
                return;
            }
            set_state(&shared, ConnectionState::Reconnecting);
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(shared.config.max_reconnect_delay);
            continue;
        };

        attempts = 0;
        delay = shared.config.reconnect_backoff;
        set_state(&shared, ConnectionState::Connected);
        tracing::debug!(addr = %shared.config.addr, "connected");

        match drive_connection(&shared, stream, token, &mut outbound, &mut shutdown).await {
            Disconnect::Shutdown => break,
            Disconnect::Lost { error, in_flight } => {
                tracing::debug!(addr = %shared.config.addr, error = %error, "connection lost");
                // Everything handed to this epoch's wire sees the failure;
                // queued-unsent requests survive into the next epoch.
                for id in in_flight {
                    complete(&shared, id, Err(error.clone()));
                }
                set_state(&shared, ConnectionState::Reconnecting);
            }
        }
    }

    set_state(&shared, ConnectionState::Disconnected);
    reject_all(&shared, TetherError::Closed);
}

/// Pumps one established connection: writes queued requests in submission
/// order and routes response frames back by correlation id.
async fn drive_connection(
    shared: &SocketShared,
    stream: TcpStream,
    token: Option<Value>,
    outbound: &mut mpsc::UnboundedReceiver<Request>,
    shutdown: &mut watch::Receiver<bool>,
) -> Disconnect {
    let (mut reader, mut writer) = stream.into_split();
    let mut in_flight: Vec<RequestId> = Vec::new();

    // The handshake frame travels first on every new connection.
    if let Some(token) = token {
        let hello = Request::new(0, AUTH_METHOD, vec![token]);
        let frame = match JsonCodec::encode_request(&hello) {
            Ok(frame) => frame,
            Err(err) => return Disconnect::Lost { error: err, in_flight },
        };
        if let Err(err) = codec::write_frame(&mut writer, &frame).await {
            return Disconnect::Lost { error: err, in_flight };
        }
    }

    // Frames are read on a dedicated task so that cancelling the select arm
    // can never tear a frame in half.
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Result<Vec<u8>>>();
    let read_task = tokio::spawn(async move {
        loop {
            match codec::read_frame(&mut reader).await {
                Ok(frame) => {
                    if frame_tx.send(Ok(frame)).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    let _ = frame_tx.send(Err(err));
                    return;
                }
            }
        }
    });

    let disconnect = loop {
        tokio::select! {
            _ = shutdown.changed() => break Disconnect::Shutdown,

            maybe_request = outbound.recv() => {
                let Some(request) = maybe_request else {
                    break Disconnect::Shutdown;
                };
                let id = request.id;
                in_flight.push(id);
                let frame = match JsonCodec::encode_request(&request) {
                    Ok(frame) => frame,
                    Err(err) => {
                        // Only this request is unsendable; the wire is fine.
                        in_flight.pop();
                        complete(shared, id, Err(err));
                        continue;
                    }
                };
                if let Err(err) = codec::write_frame(&mut writer, &frame).await {
                    break Disconnect::Lost { error: err, in_flight };
                }
            }

            maybe_frame = frame_rx.recv() => {
                let frame = match maybe_frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(err)) => break Disconnect::Lost { error: err, in_flight },
                    None => break Disconnect::Lost {
                        error: TetherError::Connection("reader stopped".to_string()),
                        in_flight,
                    },
                };
                match JsonCodec::decode_response(&frame) {
                    Ok(response) => {
                        let id = response.id;
                        complete(shared, id, response.into_result());
                    }
                    Err(err) => break Disconnect::Lost {
                        error: TetherError::InvalidResponse(format!(
                            "undecodable response frame: {}",
                            err
                        )),
                        in_flight,
                    },
                }
            }
        }
    };

    read_task.abort();
    disconnect
}
