//! Error types for the protocol layer.
//!
//! Every reason an inbound message can be dropped has its own variant, so
//! the connection task can log exactly why a frame never reached a
//! consumer.

use crate::PacketKind;

/// Errors that can occur while encoding or decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a packet into wire text).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The frame is not a parseable envelope at all.
    #[cfg(feature = "json")]
    #[error("malformed envelope: {0}")]
    Malformed(serde_json::Error),

    /// The envelope parsed but carries no `id` field.
    #[error("envelope has no packet id")]
    MissingKind,

    /// The `id` field names no kind in the registry.
    #[error("unknown packet id {0}")]
    UnknownKind(String),

    /// The kind is known but the fields don't fit its payload shape.
    #[cfg(feature = "json")]
    #[error("malformed {kind} payload: {source}")]
    Decode {
        kind: PacketKind,
        source: serde_json::Error,
    },

    /// The packet is well-formed but fails its validity predicate.
    #[error("invalid {kind} packet: {reason}")]
    InvalidPacket { kind: PacketKind, reason: String },
}
