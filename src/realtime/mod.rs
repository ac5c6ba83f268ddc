//! Realtime push channel: STOMP over WebSocket, one topic per user.

pub mod client;
pub mod frame;
pub mod message;
pub mod transport;

pub use client::{ConnectionState, ConnectionStatus, PushClient, PushFault};
pub use message::PushMessage;
pub use transport::{SocketChannels, SocketEvent, Transport, WsTransport};
