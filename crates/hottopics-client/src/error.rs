//! Error types for the client crate.

use std::time::Duration;

use hottopics_protocol::PacketKind;

/// Why a request/response exchange produced no response.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// No packet of the expected kind arrived before the deadline.
    #[error("no {kind} received within {timeout:?}")]
    TimedOut { kind: PacketKind, timeout: Duration },

    /// The caller cancelled the wait.
    #[error("wait for {kind} was cancelled")]
    Cancelled { kind: PacketKind },

    /// The buffered packet could not be extracted as the expected body.
    #[error("expected {expected}, got {actual}")]
    UnexpectedKind {
        expected: PacketKind,
        actual: PacketKind,
    },
}

/// Top-level error for code built on the client.
///
/// The `#[from]` attribute lets `?` lift an [`ExchangeError`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A request got no usable response.
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    /// The client was configured with values it cannot run with.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
