//! Socket abstraction under the push client.
//!
//! A [`Transport`] opens one text-message socket and hands back a pair of
//! channels. The client never touches the socket type directly, so tests can
//! drive the state machine with an in-memory transport.

use std::future::Future;
use std::pin::Pin;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info_span, warn, Instrument};

use crate::{AppError, Result};

/// Capacity of the per-connection channels.
const SOCKET_CHANNEL_CAPACITY: usize = 64;

/// Something that happened on an open socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text message.
    Text(String),
    /// The socket closed. `code` is the close code when the peer sent one.
    Closed {
        /// WebSocket close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
    /// The socket failed.
    Error(String),
}

/// Channels of one open socket.
///
/// Dropping `outbound` closes the socket. `inbound` ends after a
/// [`SocketEvent::Closed`] or [`SocketEvent::Error`].
#[derive(Debug)]
pub struct SocketChannels {
    /// Text messages to send.
    pub outbound: mpsc::Sender<String>,
    /// Events received.
    pub inbound: mpsc::Receiver<SocketEvent>,
}

/// Opens sockets for the push client.
pub trait Transport: Send + Sync {
    /// Open a socket to `url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` when the socket cannot be opened.
    fn open(&self, url: String) -> Pin<Box<dyn Future<Output = Result<SocketChannels>> + Send + '_>>;
}

/// WebSocket transport backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

impl Transport for WsTransport {
    fn open(&self, url: String) -> Pin<Box<dyn Future<Output = Result<SocketChannels>> + Send + '_>> {
        Box::pin(async move {
            let (stream, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|err| AppError::Transport(format!("failed to open socket: {err}")))?;

            let (out_tx, out_rx) = mpsc::channel(SOCKET_CHANNEL_CAPACITY);
            let (in_tx, in_rx) = mpsc::channel(SOCKET_CHANNEL_CAPACITY);

            tokio::spawn(pump(stream, out_rx, in_tx).instrument(info_span!("ws_pump")));

            Ok(SocketChannels {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}

/// Shuttle messages between the socket and the channels until either side
/// closes.
async fn pump(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut out_rx: mpsc::Receiver<String>,
    in_tx: mpsc::Sender<SocketEvent>,
) {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            outbound = out_rx.recv() => {
                let Some(text) = outbound else {
                    debug!("outbound channel closed, closing socket");
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                };
                if let Err(err) = sink.send(WsMessage::Text(text.into())).await {
                    warn!(%err, "socket send failed");
                    let _ = in_tx.send(SocketEvent::Error(err.to_string())).await;
                    break;
                }
            }

            inbound = source.next() => {
                let event = match inbound {
                    Some(Ok(WsMessage::Text(text))) => SocketEvent::Text(text.to_string()),
                    Some(Ok(WsMessage::Binary(bytes))) => {
                        SocketEvent::Text(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                            .unwrap_or_default();
                        let _ = in_tx.send(SocketEvent::Closed { code, reason }).await;
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        let _ = in_tx.send(SocketEvent::Error(err.to_string())).await;
                        break;
                    }
                    None => {
                        let _ = in_tx
                            .send(SocketEvent::Closed {
                                code: None,
                                reason: "stream ended".into(),
                            })
                            .await;
                        break;
                    }
                };
                if in_tx.send(event).await.is_err() {
                    debug!("inbound receiver dropped, closing socket");
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            }
        }
    }
}
