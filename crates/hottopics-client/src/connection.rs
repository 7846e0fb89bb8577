//! The connection manager: owns the one connection to the chat server.
//!
//! A [`ConnectionManager`] is a cheap, cloneable handle. All clones share
//! the same state, so the UI, the correlator, and background tasks can each
//! hold one.
//!
//! # State machine
//!
//! ```text
//!                 connect()                 handshake ok
//! [Disconnected] ──────────→ [Connecting] ──────────────→ [Connected]
//!       ▲                         │                            │
//!       │      failure / timeout  │       close / error /      │
//!       └─────────────────────────┴────── disconnect() ────────┘
//! ```
//!
//! # The connection task
//!
//! `connect()` only starts an attempt; the work happens in a spawned task
//! that owns the socket. Once connected, the task loops over two sources:
//! outbound frames queued by [`send`](ConnectionManager::send), and inbound
//! frames from the server, which it decodes and hands to the
//! [`InboundRouter`]. When either side closes, the task moves the state back
//! to `Disconnected` and exits.
//!
//! Each attempt carries an epoch number. `disconnect()` bumps the epoch, so
//! a task from an earlier attempt that finishes late can neither resurrect
//! the connection nor overwrite a newer state.

use std::fmt;
use std::sync::Arc;

use hottopics_protocol::{Codec, Direction, JsonCodec, Packet};
use hottopics_transport::{Connection, ConnectionId, Connector, WebSocketConnector};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::{ClientConfig, InboundRouter};

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    Disconnected,
    /// An attempt is in progress.
    Connecting,
    /// Open; packets may be sent and received.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Instructions from handles to the connection task.
enum Outbound {
    Frame(String),
    Close,
}

/// The part of the state that must change atomically with the epoch.
///
/// `outbound` is `Some` exactly while the state is `Connected`.
struct Link {
    epoch: u64,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
}

struct Shared<C, K> {
    config: ClientConfig,
    connector: C,
    codec: K,
    router: Arc<InboundRouter>,
    /// Written only while `link` is locked.
    state: watch::Sender<ConnectionState>,
    link: Mutex<Link>,
}

/// Handle to the client's connection. See the [module docs](self).
pub struct ConnectionManager<C = WebSocketConnector, K = JsonCodec> {
    shared: Arc<Shared<C, K>>,
}

impl<C, K> Clone for ConnectionManager<C, K> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector, K: Codec> ConnectionManager<C, K> {
    /// Creates a manager in the `Disconnected` state. Nothing is opened
    /// until [`connect`](Self::connect) is called.
    pub fn new(config: ClientConfig, connector: C, codec: K) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config: config.validated(),
                connector,
                codec,
                router: Arc::new(InboundRouter::new()),
                state,
                link: Mutex::new(Link {
                    epoch: 0,
                    outbound: None,
                }),
            }),
        }
    }

    /// Starts a connection attempt in the background and returns at once.
    ///
    /// Does nothing (beyond a warning) if already connected or connecting,
    /// or if called outside a Tokio runtime. Failure is not reported here;
    /// the state simply returns to `Disconnected`.
    pub fn connect(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("connect called outside a Tokio runtime, ignoring");
            return;
        };

        let epoch = {
            let mut link = self.shared.link.lock();
            let state = *self.shared.state.borrow();
            if state != ConnectionState::Disconnected {
                tracing::warn!(%state, "connect ignored, connection already active");
                return;
            }
            link.epoch += 1;
            self.shared.state.send_replace(ConnectionState::Connecting);
            link.epoch
        };

        tracing::info!(url = %self.shared.config.server_url, epoch, "connecting");
        runtime.spawn(run_connection(Arc::clone(&self.shared), epoch));
    }

    /// Closes the connection, or abandons an attempt in progress.
    ///
    /// The state is `Disconnected` as soon as this returns. Safe to call in
    /// any state.
    pub fn disconnect(&self) {
        let mut link = self.shared.link.lock();
        if let Some(outbound) = link.outbound.take() {
            // The task may already be gone; then there is nothing to close.
            let _ = outbound.send(Outbound::Close);
        }
        link.epoch += 1;
        let previous = self.shared.state.send_replace(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            tracing::info!(%previous, "disconnected by client");
        }
    }

    /// Queues a packet for the server.
    ///
    /// Fire-and-forget: if not connected, or if the packet is a
    /// server-to-client kind, it is dropped with a warning.
    pub fn send(&self, packet: impl Into<Packet>) {
        let packet = packet.into();
        let kind = packet.kind();

        if kind.direction() != Direction::Outbound {
            tracing::warn!(%kind, "refusing to send a server-to-client packet");
            return;
        }

        let Some(outbound) = self.shared.link.lock().outbound.clone() else {
            tracing::warn!(%kind, "not connected, packet dropped");
            return;
        };

        let text = match self.shared.codec.encode(&packet) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(%kind, error = %e, "encode failed, packet dropped");
                return;
            }
        };

        if outbound.send(Outbound::Frame(text)).is_err() {
            tracing::debug!(%kind, "connection task gone, packet dropped");
        } else {
            tracing::trace!(%kind, "packet queued");
        }
    }

    /// Connects if needed and waits for the attempt to settle.
    ///
    /// Returns whether the connection is open afterwards. The wait is
    /// bounded by the configured connect timeout.
    pub async fn connect_and_wait(&self) -> bool {
        if self.is_connected() {
            return true;
        }
        self.connect();
        self.wait_until_settled().await == ConnectionState::Connected
    }

    /// Waits until the state is not `Connecting` and returns it.
    pub async fn wait_until_settled(&self) -> ConnectionState {
        let mut states = self.shared.state.subscribe();
        match states
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
        {
            Ok(state) => *state,
            // Unreachable while `self` holds the sender, but harmless.
            Err(_) => self.state(),
        }
    }

    /// Waits for the next state change and returns the new state.
    pub async fn wait_for_state_change(&self) -> ConnectionState {
        let mut states = self.shared.state.subscribe();
        match states.changed().await {
            Ok(()) => *states.borrow_and_update(),
            Err(_) => self.state(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    /// A receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// The router inbound packets are delivered to.
    pub fn router(&self) -> &Arc<InboundRouter> {
        &self.shared.router
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }
}

impl<C, K> fmt::Debug for ConnectionManager<C, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.shared.config.server_url)
            .field("state", &*self.shared.state.borrow())
            .finish()
    }
}

impl<C, K: Codec> Shared<C, K> {
    /// Publishes an open connection, unless the attempt was abandoned.
    fn open(&self, epoch: u64, outbound: mpsc::UnboundedSender<Outbound>) -> bool {
        let mut link = self.link.lock();
        if link.epoch != epoch {
            return false;
        }
        link.outbound = Some(outbound);
        self.state.send_replace(ConnectionState::Connected);
        true
    }

    /// Returns to `Disconnected`, unless a newer attempt owns the state.
    fn settle(&self, epoch: u64) {
        let mut link = self.link.lock();
        if link.epoch != epoch {
            return;
        }
        link.outbound = None;
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// Decodes one inbound frame and routes it. Frames that fail to decode
    /// never reach a consumer.
    fn accept(&self, conn_id: ConnectionId, data: &[u8]) {
        match self.codec.decode(data) {
            Ok(packet) => self.router.deliver(packet),
            Err(e) => tracing::warn!(
                %conn_id,
                error = %e,
                len = data.len(),
                frame = %frame_preview(data),
                "dropping inbound frame"
            ),
        }
    }
}

/// How much of a rejected frame is logged.
const FRAME_PREVIEW_BYTES: usize = 128;

/// The start of `data` as lossy UTF-8, marked with `...` when cut short.
fn frame_preview(data: &[u8]) -> String {
    let end = data.len().min(FRAME_PREVIEW_BYTES);
    let mut preview = String::from_utf8_lossy(&data[..end]).into_owned();
    if end < data.len() {
        preview.push_str("...");
    }
    preview
}

/// Body of the connection task for one attempt.
async fn run_connection<C: Connector, K: Codec>(shared: Arc<Shared<C, K>>, epoch: u64) {
    let url = shared.config.server_url.as_str();
    let timeout = shared.config.connect_timeout;

    let conn = match tokio::time::timeout(timeout, shared.connector.connect(url)).await {
        Ok(Ok(conn)) => conn,
        Ok(Err(e)) => {
            tracing::warn!(%url, error = %e, "connection attempt failed");
            shared.settle(epoch);
            return;
        }
        Err(_) => {
            tracing::warn!(%url, ?timeout, "connection attempt timed out");
            shared.settle(epoch);
            return;
        }
    };

    let conn_id = conn.id();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    if !shared.open(epoch, outbound_tx) {
        tracing::debug!(%conn_id, "attempt abandoned before it completed, closing");
        if let Err(e) = conn.close().await {
            tracing::debug!(%conn_id, error = %e, "close failed");
        }
        return;
    }
    tracing::info!(%conn_id, %url, "connected");

    let reason = loop {
        tokio::select! {
            outbound = outbound_rx.recv() => match outbound {
                Some(Outbound::Frame(text)) => {
                    if let Err(e) = conn.send(&text).await {
                        break format!("send failed: {e}");
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = conn.close().await {
                        tracing::debug!(%conn_id, error = %e, "close failed");
                    }
                    break "closed by client".to_string();
                }
            },
            inbound = conn.recv() => match inbound {
                Ok(Some(data)) => shared.accept(conn_id, &data),
                Ok(None) => break "closed by server".to_string(),
                Err(e) => break format!("receive failed: {e}"),
            },
        }
    };

    tracing::info!(%conn_id, %reason, "connection closed");
    shared.settle(epoch);
}
