//! Wire protocol for the Hot Topics chat client.
//!
//! This crate defines what travels over the client's single socket:
//!
//! - **Packets** ([`Packet`] and one body struct per kind) with their
//!   validity predicates.
//! - **Kind registry** ([`PacketKind`]) mapping every kind to the numeric
//!   tag that identifies it before deserialization.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) converting packets to and
//!   from wire frames.
//! - **Errors** ([`ProtocolError`]) naming why a frame was dropped.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and the client's
//! connection manager. It doesn't know about sockets or consumers.
//!
//! ```text
//! Transport (frames) → Protocol (Packet) → Router (buffer, observers)
//! ```

mod codec;
mod error;
mod kind;
mod packet;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use kind::{Direction, KIND_TABLE_VERSION, PacketKind};
pub use packet::{
    AcknowledgementRequest, AcknowledgementResponse, Chatroom,
    ChatroomUserCountUpdate, ChatroomsRequest, ChatroomsResponse,
    JoinChatroomRequest, JoinChatroomResponse, LeaveChatroomRequest,
    LeaveChatroomResponse, MAX_MESSAGE_LENGTH, MAX_USERNAME_LENGTH,
    MIN_USERNAME_LENGTH, Packet, PacketBody, ReceiveMessage, Request,
    SendMessage, UsernameError, UsernameRequest, UsernameResponse, Validate,
};
