//! Codec trait and implementations for turning packets into wire frames
//! and back.
//!
//! Decoding is two-step: the frame is parsed generically first so the
//! packet's `id` can be looked up in the kind registry, and only then is the
//! payload deserialized into the concrete body. A frame only comes out of
//! [`Codec::decode`] as a [`Packet`] if it is well-formed, of a known kind,
//! and passes the packet's validity predicate.

use crate::{Packet, ProtocolError};

/// Converts packets to wire text and inbound frames back to packets.
///
/// `Send + Sync + 'static` because the codec is shared by the connection
/// task and every caller of `send`.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a packet into one wire frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode(&self, packet: &Packet) -> Result<String, ProtocolError>;

    /// Identifies, deserializes, and validates one inbound frame.
    ///
    /// # Errors
    /// One variant per drop reason: malformed envelope, missing or unknown
    /// `id`, payload that doesn't fit the kind, or a failed validity check.
    fn decode(&self, data: &[u8]) -> Result<Packet, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] for the JSON envelope the Hot Topics server speaks.
///
/// ```rust
/// use hottopics_protocol::{Codec, JsonCodec, Packet, UsernameRequest};
///
/// let codec = JsonCodec;
/// let packet = Packet::from(UsernameRequest::new("alice"));
///
/// let text = codec.encode(&packet).unwrap();
/// assert_eq!(text, r#"{"id":2,"username":"alice"}"#);
///
/// let decoded = codec.decode(text.as_bytes()).unwrap();
/// assert_eq!(decoded, packet);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode(&self, packet: &Packet) -> Result<String, ProtocolError> {
        serde_json::to_string(packet).map_err(ProtocolError::Encode)
    }

    fn decode(&self, data: &[u8]) -> Result<Packet, ProtocolError> {
        use crate::PacketKind;

        let envelope: serde_json::Value =
            serde_json::from_slice(data).map_err(ProtocolError::Malformed)?;

        // `get` on a non-object (array, number, ...) is `None` too.
        let raw_id = envelope.get("id").ok_or(ProtocolError::MissingKind)?;
        let kind = raw_id
            .as_u64()
            .and_then(|tag| u8::try_from(tag).ok())
            .and_then(PacketKind::from_tag)
            .ok_or_else(|| ProtocolError::UnknownKind(raw_id.to_string()))?;

        let packet = Packet::deserialize_body(kind, envelope)
            .map_err(|source| ProtocolError::Decode { kind, source })?;
        packet.validate()?;
        Ok(packet)
    }
}
