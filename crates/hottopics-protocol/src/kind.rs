//! The kind registry: every packet kind the client understands and the
//! numeric tag that identifies it on the wire.
//!
//! Tags are fixed literals, not positions in a list. They match the values
//! the Hot Topics server assigns, and a retired tag is never handed to a
//! new kind. Adding a kind means picking the next unused number and bumping
//! [`KIND_TABLE_VERSION`].

use std::fmt;

/// Version of the tag table below. Bump when a kind is added or retired.
pub const KIND_TABLE_VERSION: u32 = 1;

/// Which way a packet kind travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client → server (requests and outgoing chat messages).
    Outbound,
    /// Server → client (responses and broadcasts).
    Inbound,
}

/// Identifies one packet variant.
///
/// The discriminants ARE the wire tags; `#[repr(u8)]` pins them so
/// reordering the declarations below cannot change what goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PacketKind {
    SendMessage = 0,
    ReceiveMessage = 1,
    UsernameRequest = 2,
    UsernameResponse = 3,
    ChatroomsRequest = 4,
    ChatroomsResponse = 5,
    JoinChatroomRequest = 6,
    JoinChatroomResponse = 7,
    LeaveChatroomRequest = 8,
    LeaveChatroomResponse = 9,
    ChatroomUserCountUpdate = 10,
    AcknowledgementRequest = 11,
    AcknowledgementResponse = 12,
}

impl PacketKind {
    /// Every known kind, in tag order.
    pub const ALL: [PacketKind; 13] = [
        Self::SendMessage,
        Self::ReceiveMessage,
        Self::UsernameRequest,
        Self::UsernameResponse,
        Self::ChatroomsRequest,
        Self::ChatroomsResponse,
        Self::JoinChatroomRequest,
        Self::JoinChatroomResponse,
        Self::LeaveChatroomRequest,
        Self::LeaveChatroomResponse,
        Self::ChatroomUserCountUpdate,
        Self::AcknowledgementRequest,
        Self::AcknowledgementResponse,
    ];

    /// The wire tag for this kind.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Looks up the kind for a wire tag. `None` means the packet is of an
    /// unknown kind and must be dropped.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        let kind = match tag {
            0 => Self::SendMessage,
            1 => Self::ReceiveMessage,
            2 => Self::UsernameRequest,
            3 => Self::UsernameResponse,
            4 => Self::ChatroomsRequest,
            5 => Self::ChatroomsResponse,
            6 => Self::JoinChatroomRequest,
            7 => Self::JoinChatroomResponse,
            8 => Self::LeaveChatroomRequest,
            9 => Self::LeaveChatroomResponse,
            10 => Self::ChatroomUserCountUpdate,
            11 => Self::AcknowledgementRequest,
            12 => Self::AcknowledgementResponse,
            _ => return None,
        };
        Some(kind)
    }

    /// Human-readable name, used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Self::SendMessage => "SendMessage",
            Self::ReceiveMessage => "ReceiveMessage",
            Self::UsernameRequest => "UsernameRequest",
            Self::UsernameResponse => "UsernameResponse",
            Self::ChatroomsRequest => "ChatroomsRequest",
            Self::ChatroomsResponse => "ChatroomsResponse",
            Self::JoinChatroomRequest => "JoinChatroomRequest",
            Self::JoinChatroomResponse => "JoinChatroomResponse",
            Self::LeaveChatroomRequest => "LeaveChatroomRequest",
            Self::LeaveChatroomResponse => "LeaveChatroomResponse",
            Self::ChatroomUserCountUpdate => "ChatroomUserCountUpdate",
            Self::AcknowledgementRequest => "AcknowledgementRequest",
            Self::AcknowledgementResponse => "AcknowledgementResponse",
        }
    }

    /// Which way packets of this kind travel.
    pub const fn direction(self) -> Direction {
        match self {
            Self::SendMessage
            | Self::UsernameRequest
            | Self::ChatroomsRequest
            | Self::JoinChatroomRequest
            | Self::LeaveChatroomRequest
            | Self::AcknowledgementRequest => Direction::Outbound,
            Self::ReceiveMessage
            | Self::UsernameResponse
            | Self::ChatroomsResponse
            | Self::JoinChatroomResponse
            | Self::LeaveChatroomResponse
            | Self::ChatroomUserCountUpdate
            | Self::AcknowledgementResponse => Direction::Inbound,
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
