//! `ChatClient` and its builder: the single entry point most code needs.

use std::time::Duration;

use hottopics_protocol::{JsonCodec, Packet, PacketBody, PacketKind, Request};
use hottopics_transport::{Connector, WebSocketConnector};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::{
    ClientConfig, ClientError, ConnectionManager, ConnectionState, Correlator,
    ExchangeError, InboundRouter, ObserverId,
};

/// A Hot Topics chat client.
///
/// Bundles the [`ConnectionManager`], its [`InboundRouter`], and a
/// [`Correlator`]. Cheap to clone; clones share one connection.
///
/// ```rust,no_run
/// use hottopics_client::prelude::*;
///
/// # async fn run() -> Result<(), ClientError> {
/// let client = ChatClient::builder()
///     .url("ws://127.0.0.1:8025/hottopics/chat")
///     .build()?;
///
/// if client.connect_and_wait().await {
///     let rooms = client.exchange(ChatroomsRequest {}).await?;
///     println!("{} rooms", rooms.chatrooms.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct ChatClient<C = WebSocketConnector> {
    connection: ConnectionManager<C, JsonCodec>,
    correlator: Correlator<C, JsonCodec>,
}

impl<C> Clone for ChatClient<C> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            correlator: self.correlator.clone(),
        }
    }
}

impl ChatClient {
    /// Starts building a client that talks over WebSocket.
    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::new()
    }
}

impl<C: Connector> ChatClient<C> {
    // -- connection -------------------------------------------------------

    /// See [`ConnectionManager::connect`].
    pub fn connect(&self) {
        self.connection.connect();
    }

    /// See [`ConnectionManager::connect_and_wait`].
    pub async fn connect_and_wait(&self) -> bool {
        self.connection.connect_and_wait().await
    }

    /// See [`ConnectionManager::disconnect`].
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// See [`ConnectionManager::send`].
    pub fn send(&self, packet: impl Into<Packet>) {
        self.connection.send(packet);
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn is_connecting(&self) -> bool {
        self.connection.is_connecting()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// See [`ConnectionManager::wait_for_state_change`].
    pub async fn wait_for_state_change(&self) -> ConnectionState {
        self.connection.wait_for_state_change().await
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe_state()
    }

    // -- inbound ----------------------------------------------------------

    /// See [`InboundRouter::poll_and_remove`].
    pub fn poll_and_remove(&self, kind: PacketKind) -> Option<Packet> {
        self.router().poll_and_remove(kind)
    }

    /// See [`InboundRouter::take`].
    pub fn take<T: PacketBody>(&self) -> Option<T> {
        self.router().take::<T>()
    }

    /// See [`InboundRouter::add_observer`].
    pub fn add_observer<F>(&self, kind: PacketKind, callback: F) -> ObserverId
    where
        F: Fn(&Packet) + Send + Sync + 'static,
    {
        self.router().add_observer(kind, callback)
    }

    /// See [`InboundRouter::observe`].
    pub fn observe<T, F>(&self, callback: F) -> ObserverId
    where
        T: PacketBody,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.router().observe::<T, F>(callback)
    }

    /// See [`InboundRouter::remove_observer`].
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.router().remove_observer(id)
    }

    // -- request/response -------------------------------------------------

    /// See [`Correlator::request`].
    pub async fn request(
        &self,
        packet: impl Into<Packet>,
        expected: PacketKind,
        timeout: Duration,
    ) -> Result<Packet, ExchangeError> {
        self.correlator.request(packet, expected, timeout).await
    }

    /// See [`Correlator::request_with_cancel`].
    pub async fn request_with_cancel(
        &self,
        packet: impl Into<Packet>,
        expected: PacketKind,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Packet, ExchangeError> {
        self.correlator
            .request_with_cancel(packet, expected, timeout, cancel)
            .await
    }

    /// See [`Correlator::exchange`].
    pub async fn exchange<R: Request>(&self, request: R) -> Result<R::Response, ExchangeError> {
        self.correlator.exchange(request).await
    }

    /// See [`Correlator::exchange_with`].
    pub async fn exchange_with<R: Request>(
        &self,
        request: R,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<R::Response, ExchangeError> {
        self.correlator.exchange_with(request, timeout, cancel).await
    }

    // -- parts ------------------------------------------------------------

    pub fn router(&self) -> &InboundRouter {
        self.connection.router()
    }

    pub fn connection(&self) -> &ConnectionManager<C, JsonCodec> {
        &self.connection
    }

    pub fn correlator(&self) -> &Correlator<C, JsonCodec> {
        &self.correlator
    }

    pub fn config(&self) -> &ClientConfig {
        self.connection.config()
    }
}

/// Configures and creates a [`ChatClient`].
///
/// Uses [`WebSocketConnector`] unless another connector is supplied.
pub struct ChatClientBuilder<C = WebSocketConnector> {
    config: ClientConfig,
    connector: C,
}

impl ChatClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            connector: WebSocketConnector::new(),
        }
    }
}

impl Default for ChatClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> ChatClientBuilder<C> {
    /// Sets the server URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    /// Sets how long a connection attempt may take.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the default wait for [`ChatClient::exchange`].
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Swaps the transport, e.g. for an in-memory one in tests.
    pub fn connector<D: Connector>(self, connector: D) -> ChatClientBuilder<D> {
        ChatClientBuilder {
            config: self.config,
            connector,
        }
    }

    /// Builds the client. Nothing is connected yet.
    ///
    /// # Errors
    /// [`ClientError::InvalidConfig`] if the URL is not a `ws://` or
    /// `wss://` URL.
    pub fn build(self) -> Result<ChatClient<C>, ClientError> {
        self.config.check_url()?;
        let connection = ConnectionManager::new(self.config, self.connector, JsonCodec);
        let correlator = Correlator::new(connection.clone());
        Ok(ChatClient {
            connection,
            correlator,
        })
    }
}
