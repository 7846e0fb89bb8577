//! In-memory transport for driving the client without sockets.
//!
//! [`MemoryConnector`] hands out [`MemoryConnection`]s whose other ends
//! ([`ServerEnd`]) show up on a [`ServerSide`]. A test plays the server by
//! reading what the client sent and pushing frames back.

#![allow(dead_code)]

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hottopics_client::ChatClient;
use hottopics_protocol::{Codec, JsonCodec, Packet};
use hottopics_transport::{Connection, ConnectionId, Connector, TransportError};
use parking_lot::Mutex;
use tokio::sync::mpsc;

pub const URL: &str = "ws://memory.test/hottopics/chat";

/// How the connector answers the next connect attempt.
#[derive(Debug, Clone, Copy)]
pub enum Mode {
    Accept,
    Refuse,
    /// Never completes.
    Hang,
    /// Accepts after the given delay.
    Delay(Duration),
}

/// What the client wrote to its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
}

#[derive(Clone)]
pub struct MemoryConnector {
    inner: Arc<Inner>,
}

struct Inner {
    mode: Mutex<Mode>,
    accepted: mpsc::UnboundedSender<ServerEnd>,
    attempts: AtomicU64,
}

/// Receives the server end of every accepted connection.
pub struct ServerSide {
    accepted: mpsc::UnboundedReceiver<ServerEnd>,
}

impl MemoryConnector {
    pub fn new() -> (Self, ServerSide) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Self {
            inner: Arc::new(Inner {
                mode: Mutex::new(Mode::Accept),
                accepted,
                attempts: AtomicU64::new(0),
            }),
        };
        (connector, ServerSide { accepted: rx })
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.inner.mode.lock() = mode;
    }

    /// Number of connect attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;
    type Error = TransportError;

    async fn connect(&self, _url: &str) -> Result<MemoryConnection, TransportError> {
        let attempt = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let mode = *self.inner.mode.lock();
        match mode {
            Mode::Accept => {}
            Mode::Refuse => {
                return Err(TransportError::ConnectFailed(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "refused",
                )));
            }
            Mode::Hang => std::future::pending::<()>().await,
            Mode::Delay(delay) => tokio::time::sleep(delay).await,
        }

        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();
        self.inner
            .accepted
            .send(ServerEnd {
                to_client: Some(to_client),
                from_client,
            })
            .map_err(|_| TransportError::ConnectionClosed("no server side".into()))?;

        Ok(MemoryConnection {
            id: ConnectionId::new(attempt),
            to_server,
            from_server: tokio::sync::Mutex::new(from_server),
        })
    }
}

pub struct MemoryConnection {
    id: ConnectionId,
    to_server: mpsc::UnboundedSender<Frame>,
    from_server: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl Connection for MemoryConnection {
    type Error = TransportError;

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.to_server
            .send(Frame::Text(text.to_owned()))
            .map_err(|_| TransportError::ConnectionClosed("server end dropped".into()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.from_server.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        let _ = self.to_server.send(Frame::Close);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

impl ServerSide {
    /// Waits for the next accepted connection.
    pub async fn accept(&mut self) -> ServerEnd {
        tokio::time::timeout(Duration::from_secs(10), self.accepted.recv())
            .await
            .expect("no connection accepted in time")
            .expect("connector dropped")
    }

    /// An accepted connection, if one is already waiting.
    pub fn try_accept(&mut self) -> Option<ServerEnd> {
        self.accepted.try_recv().ok()
    }
}

/// The server's view of one connection.
pub struct ServerEnd {
    to_client: Option<mpsc::UnboundedSender<Vec<u8>>>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

impl ServerEnd {
    /// Sends a raw text frame to the client.
    pub fn push_raw(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(text.as_bytes().to_vec());
        }
    }

    /// Sends a packet to the client in the server's JSON format.
    pub fn push(&self, packet: impl Into<Packet>) {
        let text = JsonCodec.encode(&packet.into()).expect("encode");
        self.push_raw(&text);
    }

    /// Next frame from the client, or `None` if nothing arrives within
    /// ten seconds or the client side is gone.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        tokio::time::timeout(Duration::from_secs(10), self.from_client.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next frame from the client, decoded as a packet.
    pub async fn next_packet(&mut self) -> Packet {
        match self.next_frame().await {
            Some(Frame::Text(text)) => JsonCodec.decode(text.as_bytes()).expect("client sent a bad packet"),
            other => panic!("expected a packet, got {other:?}"),
        }
    }

    /// A frame the client has already sent, without waiting.
    pub fn try_frame(&mut self) -> Option<Frame> {
        self.from_client.try_recv().ok()
    }

    /// Closes the connection from the server's side.
    pub fn hang_up(&mut self) {
        self.to_client = None;
    }
}

/// A client on the memory transport with five-second timeouts.
pub fn client(connector: MemoryConnector) -> ChatClient<MemoryConnector> {
    ChatClient::builder()
        .url(URL)
        .connect_timeout(Duration::from_secs(5))
        .request_timeout(Duration::from_secs(5))
        .connector(connector)
        .build()
        .expect("valid config")
}

/// A connected client together with the server end of its connection.
pub async fn connected() -> (ChatClient<MemoryConnector>, ServerEnd, ServerSide) {
    let (connector, mut side) = MemoryConnector::new();
    let client = client(connector);
    assert!(client.connect_and_wait().await, "client should connect");
    let server = side.accept().await;
    (client, server, side)
}
