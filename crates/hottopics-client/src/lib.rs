//! # hottopics-client
//!
//! The packet communication layer of the Hot Topics chat client.
//!
//! - [`ConnectionManager`] owns the single connection to the server and
//!   tracks whether it is disconnected, connecting, or connected.
//! - [`InboundRouter`] receives every decoded packet, buffers it for
//!   polling, and pushes it to observers of its kind.
//! - [`Correlator`] turns "send a request, wait for the response kind" into
//!   one awaitable call with a timeout.
//! - [`ChatClient`] bundles the three behind one handle.
//!
//! ```text
//!   UI / app code
//!        │ send / exchange / observe
//!        ▼
//!   ChatClient ──→ Correlator ──→ ConnectionManager ──→ Connection (WebSocket)
//!                                        │
//!                     decoded packets    ▼
//!                                  InboundRouter ──→ buffer + observers
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hottopics_client::prelude::*;
//!
//! # async fn run() -> Result<(), ClientError> {
//! let client = ChatClient::builder().build()?;
//! client.connect_and_wait().await;
//!
//! client.observe::<ReceiveMessage, _>(|msg| {
//!     println!("{}: {}", msg.author, msg.message);
//! });
//!
//! let joined = client.exchange(JoinChatroomRequest::new("rust")).await?;
//! if joined.response {
//!     client.send(SendMessage::new("hello"));
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod connection;
mod correlator;
mod error;
mod router;

pub use client::{ChatClient, ChatClientBuilder};
pub use config::{ClientConfig, DEFAULT_SERVER_URL};
pub use connection::{ConnectionManager, ConnectionState};
pub use correlator::Correlator;
pub use error::{ClientError, ExchangeError};
pub use router::{InboundRouter, ObserverFn, ObserverId};

pub use hottopics_protocol;
pub use hottopics_transport;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::{
        ChatClient, ChatClientBuilder, ClientConfig, ClientError,
        ConnectionState, ExchangeError, ObserverId,
    };
    pub use hottopics_protocol::{
        AcknowledgementRequest, AcknowledgementResponse, Chatroom,
        ChatroomUserCountUpdate, ChatroomsRequest, ChatroomsResponse,
        JoinChatroomRequest, JoinChatroomResponse, LeaveChatroomRequest,
        LeaveChatroomResponse, Packet, PacketBody, PacketKind,
        ReceiveMessage, Request, SendMessage, UsernameRequest,
        UsernameResponse, Validate,
    };
    pub use tokio_util::sync::CancellationToken;
}
