//! Packet types for the Hot Topics wire format.
//!
//! Each packet kind has its own body struct; [`Packet`] is the sum type over
//! all of them. Consumers get a concrete body back by pattern matching
//! (or through [`PacketBody`]), never by casting.
//!
//! On the wire a packet is one flat JSON object: the numeric `id` from the
//! kind registry next to the body's own fields.
//!
//! ```text
//! { "id": 1, "author": "bob", "message": "hi" }
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Direction, PacketKind, ProtocolError};

/// Shortest username the server accepts.
pub const MIN_USERNAME_LENGTH: usize = 3;
/// Longest username the server accepts.
pub const MAX_USERNAME_LENGTH: usize = 16;
/// Longest chat message, in characters, after trimming.
pub const MAX_MESSAGE_LENGTH: usize = 1000;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// The per-packet validity predicate.
///
/// A packet that fails it is never delivered to a consumer, even if it
/// deserialized cleanly.
pub trait Validate {
    /// Returns `Err(reason)` if the packet is not usable.
    fn validate(&self) -> Result<(), String>;

    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Why a requested username was rejected before it was ever sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UsernameError {
    #[error("username is empty")]
    Empty,
    #[error("username may only contain letters and digits")]
    InvalidCharacters,
    #[error("username must be at least {} characters", MIN_USERNAME_LENGTH)]
    TooShort,
    #[error("username must be at most {} characters", MAX_USERNAME_LENGTH)]
    TooLong,
}

fn require_non_empty(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} is empty"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Bodies
// ---------------------------------------------------------------------------

/// A chatroom as listed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chatroom {
    pub name: String,
}

impl Chatroom {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Client → server: post a message to the current chatroom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    pub message: String,
}

impl SendMessage {
    /// Builds the packet from user input, trimming surrounding whitespace.
    pub fn new(message: impl AsRef<str>) -> Self {
        Self {
            message: message.as_ref().trim().to_string(),
        }
    }
}

impl Validate for SendMessage {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("message", &self.message)?;
        let len = self.message.trim().chars().count();
        if len > MAX_MESSAGE_LENGTH {
            return Err(format!(
                "message is {len} characters, limit is {MAX_MESSAGE_LENGTH}"
            ));
        }
        Ok(())
    }
}

/// Server → client: someone (possibly us) posted to the current chatroom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveMessage {
    pub author: String,
    pub message: String,
}

impl ReceiveMessage {
    pub fn new(author: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            message: message.into(),
        }
    }
}

impl Validate for ReceiveMessage {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("author", &self.author)?;
        require_non_empty("message", &self.message)
    }
}

/// Client → server: claim a username for this connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameRequest {
    pub username: String,
}

impl UsernameRequest {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    /// Checks a candidate username against the server's rules, so a login
    /// form can explain a rejection without a round trip.
    pub fn check(username: &str) -> Result<(), UsernameError> {
        if username.is_empty() {
            return Err(UsernameError::Empty);
        }
        if !username.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(UsernameError::InvalidCharacters);
        }
        // ASCII only past this point, so bytes == characters.
        if username.len() < MIN_USERNAME_LENGTH {
            return Err(UsernameError::TooShort);
        }
        if username.len() > MAX_USERNAME_LENGTH {
            return Err(UsernameError::TooLong);
        }
        Ok(())
    }
}

impl Validate for UsernameRequest {
    fn validate(&self) -> Result<(), String> {
        Self::check(&self.username).map_err(|e| e.to_string())
    }
}

/// Server → client: whether the requested username was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameResponse {
    pub response: bool,
}

/// Client → server: list the available chatrooms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatroomsRequest {}

/// Server → client: the available chatrooms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatroomsResponse {
    pub chatrooms: Vec<Chatroom>,
}

impl Validate for ChatroomsResponse {
    fn validate(&self) -> Result<(), String> {
        self.chatrooms
            .iter()
            .try_for_each(|room| require_non_empty("chatroom name", &room.name))
    }
}

/// Client → server: enter the named chatroom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinChatroomRequest {
    pub name: String,
}

impl JoinChatroomRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Validate for JoinChatroomRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("chatroom name", &self.name)
    }
}

/// Server → client: whether the join succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinChatroomResponse {
    pub response: bool,
}

/// Client → server: leave the current chatroom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveChatroomRequest {}

/// Server → client: whether the leave succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveChatroomResponse {
    pub response: bool,
}

/// Server → client: the current chatroom's population changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatroomUserCountUpdate {
    pub size: u32,
}

/// Client → server: keep-alive probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgementRequest {}

/// Server → client: keep-alive answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgementResponse {}

macro_rules! always_valid {
    ($($body:ty),* $(,)?) => {
        $(
            impl Validate for $body {
                fn validate(&self) -> Result<(), String> {
                    Ok(())
                }
            }
        )*
    };
}

always_valid!(
    UsernameResponse,
    ChatroomsRequest,
    JoinChatroomResponse,
    LeaveChatroomRequest,
    LeaveChatroomResponse,
    ChatroomUserCountUpdate,
    AcknowledgementRequest,
    AcknowledgementResponse,
);

// ---------------------------------------------------------------------------
// Packet — the sum type
// ---------------------------------------------------------------------------

/// A body type that is one variant of [`Packet`].
///
/// `TryFrom<Packet>` hands the packet back untouched when it is of another
/// kind, so a caller can keep trying.
pub trait PacketBody:
    Validate + Into<Packet> + TryFrom<Packet, Error = Packet>
{
    const KIND: PacketKind;

    /// Borrows the body out of `packet` if it is of this kind.
    fn peek(packet: &Packet) -> Option<&Self>;
}

/// A request body and the body the server answers it with.
pub trait Request: PacketBody {
    type Response: PacketBody;
}

impl Request for UsernameRequest {
    type Response = UsernameResponse;
}

impl Request for ChatroomsRequest {
    type Response = ChatroomsResponse;
}

impl Request for JoinChatroomRequest {
    type Response = JoinChatroomResponse;
}

impl Request for LeaveChatroomRequest {
    type Response = LeaveChatroomResponse;
}

impl Request for AcknowledgementRequest {
    type Response = AcknowledgementResponse;
}

/// Writes `id` ahead of the body's own fields.
#[derive(Serialize)]
struct Tagged<'a, T> {
    id: u8,
    #[serde(flatten)]
    body: &'a T,
}

// Variant names double as PacketKind names and body type names.
macro_rules! packet_set {
    ($($variant:ident),* $(,)?) => {
        /// Any packet the client can send or receive.
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub enum Packet {
            $($variant($variant),)*
        }

        impl Packet {
            /// The kind of this packet.
            pub fn kind(&self) -> PacketKind {
                match self {
                    $(Self::$variant(_) => PacketKind::$variant,)*
                }
            }

            /// Runs the body's validity predicate.
            pub fn validate(&self) -> Result<(), ProtocolError> {
                let result = match self {
                    $(Self::$variant(body) => body.validate(),)*
                };
                result.map_err(|reason| ProtocolError::InvalidPacket {
                    kind: self.kind(),
                    reason,
                })
            }

            /// Deserializes the body of an already-identified `kind`.
            ///
            /// Extra fields (including `id`) are ignored.
            pub fn deserialize_body<'de, D>(
                kind: PacketKind,
                deserializer: D,
            ) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                match kind {
                    $(PacketKind::$variant => {
                        $variant::deserialize(deserializer).map(Self::$variant)
                    })*
                }
            }
        }

        impl Serialize for Packet {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                match self {
                    $(Self::$variant(body) => Tagged {
                        id: PacketKind::$variant.tag(),
                        body,
                    }
                    .serialize(serializer),)*
                }
            }
        }

        $(
            impl From<$variant> for Packet {
                fn from(body: $variant) -> Self {
                    Self::$variant(body)
                }
            }

            impl TryFrom<Packet> for $variant {
                type Error = Packet;

                fn try_from(packet: Packet) -> Result<Self, Packet> {
                    match packet {
                        Packet::$variant(body) => Ok(body),
                        other => Err(other),
                    }
                }
            }

            impl PacketBody for $variant {
                const KIND: PacketKind = PacketKind::$variant;

                fn peek(packet: &Packet) -> Option<&Self> {
                    match packet {
                        Packet::$variant(body) => Some(body),
                        _ => None,
                    }
                }
            }
        )*
    };
}

packet_set!(
    SendMessage,
    ReceiveMessage,
    UsernameRequest,
    UsernameResponse,
    ChatroomsRequest,
    ChatroomsResponse,
    JoinChatroomRequest,
    JoinChatroomResponse,
    LeaveChatroomRequest,
    LeaveChatroomResponse,
    ChatroomUserCountUpdate,
    AcknowledgementRequest,
    AcknowledgementResponse,
);

impl Packet {
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Which way this packet travels.
    pub fn direction(&self) -> Direction {
        self.kind().direction()
    }
}

// =========================================================================
// Tests
// =========================================================================
