//! Request/response correlation on top of the connection manager.
//!
//! The Hot Topics protocol has no request ids: a response is recognized
//! only by its kind. The correlator sends a request and then waits for the
//! next buffered packet of the expected kind, up to a deadline.
//!
//! Because matching is by kind alone, two requests expecting the same
//! response kind should not be in flight at once; whichever waiter looks
//! first gets the first response.

use std::time::Duration;

use hottopics_protocol::{Codec, JsonCodec, Packet, PacketBody, PacketKind, Request};
use hottopics_transport::{Connector, WebSocketConnector};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{ConnectionManager, ExchangeError};

/// Sends requests and waits for their responses.
pub struct Correlator<C = WebSocketConnector, K = JsonCodec> {
    connection: ConnectionManager<C, K>,
}

impl<C, K> Clone for Correlator<C, K> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
        }
    }
}

impl<C: Connector, K: Codec> Correlator<C, K> {
    pub fn new(connection: ConnectionManager<C, K>) -> Self {
        Self { connection }
    }

    /// Sends `packet`, then waits up to `timeout` for a packet of
    /// `expected` to arrive and removes it from the buffer.
    ///
    /// A response that arrived before the wait started (even before the
    /// request was sent) is taken immediately. If the connection is down
    /// the request is dropped by [`ConnectionManager::send`] and this times
    /// out.
    ///
    /// # Errors
    /// [`ExchangeError::TimedOut`] if nothing of the expected kind arrives
    /// in time.
    pub async fn request(
        &self,
        packet: impl Into<Packet>,
        expected: PacketKind,
        timeout: Duration,
    ) -> Result<Packet, ExchangeError> {
        self.request_with_cancel(packet, expected, timeout, &CancellationToken::new())
            .await
    }

    /// [`request`](Self::request) that also stops when `cancel` fires.
    ///
    /// # Errors
    /// [`ExchangeError::Cancelled`] if the token fires first, otherwise as
    /// for [`request`](Self::request).
    pub async fn request_with_cancel(
        &self,
        packet: impl Into<Packet>,
        expected: PacketKind,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Packet, ExchangeError> {
        let packet = packet.into();
        let sent = packet.kind();
        let router = self.connection.router();

        let observers = router.observer_count(expected);
        if observers > 0 {
            tracing::warn!(
                kind = %expected,
                observers,
                "awaited response kind also has observers; they will see it too"
            );
        }

        self.connection.send(packet);
        let started = Instant::now();

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!(%sent, kind = %expected, "request cancelled");
                Err(ExchangeError::Cancelled { kind: expected })
            }
            response = router.wait_and_remove(expected) => {
                tracing::debug!(
                    %sent,
                    kind = %expected,
                    elapsed = ?started.elapsed(),
                    "response received"
                );
                Ok(response)
            }
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(%sent, kind = %expected, ?timeout, "no response before deadline");
                Err(ExchangeError::TimedOut { kind: expected, timeout })
            }
        }
    }

    /// Typed request using the configured request timeout.
    ///
    /// ```rust,no_run
    /// # async fn demo(correlator: hottopics_client::Correlator) {
    /// use hottopics_client::hottopics_protocol::UsernameRequest;
    ///
    /// let granted = correlator
    ///     .exchange(UsernameRequest::new("alice"))
    ///     .await
    ///     .map(|response| response.response)
    ///     .unwrap_or(false);
    /// # }
    /// ```
    ///
    /// # Errors
    /// As for [`request`](Self::request).
    pub async fn exchange<R: Request>(&self, request: R) -> Result<R::Response, ExchangeError> {
        let timeout = self.connection.config().request_timeout;
        self.exchange_with(request, timeout, &CancellationToken::new())
            .await
    }

    /// Typed request with an explicit timeout and cancellation token.
    ///
    /// # Errors
    /// As for [`request_with_cancel`](Self::request_with_cancel).
    pub async fn exchange_with<R: Request>(
        &self,
        request: R,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<R::Response, ExchangeError> {
        let expected = <R::Response as PacketBody>::KIND;
        let packet = self
            .request_with_cancel(request, expected, timeout, cancel)
            .await?;
        R::Response::try_from(packet).map_err(|other| ExchangeError::UnexpectedKind {
            expected,
            actual: other.kind(),
        })
    }

    pub fn connection(&self) -> &ConnectionManager<C, K> {
        &self.connection
    }
}
