//! Reconnecting push client.
//!
//! Lifecycle: `disconnected → connecting → connected → (disconnected | error)`.
//! After a session ends for any reason other than [`PushClient::disconnect`],
//! the supervisor waits [`PushConfig::reconnect_delay`] and tries again.
//!
//! Faults never escape as errors. They are recorded on the
//! [`ConnectionStatus`] watch channel and logged, so consumers keep their
//! last-known-good state during an outage.

use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::BytesMut;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use super::frame::{Command, Frame, StompCodec, StompItem, HEARTBEAT};
use super::message::PushMessage;
use super::transport::{SocketEvent, Transport};
use crate::auth::Authenticator;
use crate::config::PushConfig;
use crate::notifications::NotificationStore;

/// Capacity of the decoded-message broadcast channel.
const MESSAGE_CHANNEL_CAPACITY: usize = 64;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session, either idle or waiting to reconnect after a close.
    #[default]
    Disconnected,
    /// Fetching the credential, opening the socket, or waiting for `CONNECTED`.
    Connecting,
    /// Session established and subscribed.
    Connected,
    /// The last session failed; waiting to reconnect.
    Error,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        })
    }
}

/// Why a session failed or degraded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFault {
    /// The socket could not be opened.
    TransportOpen(String),
    /// The socket closed.
    TransportClosed {
        /// WebSocket close code, when the peer sent one.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
    /// The socket failed or went silent.
    TransportError(String),
    /// The server sent an `ERROR` frame or an unparseable frame.
    Protocol(String),
    /// The bearer credential could not be fetched; the session proceeds
    /// without one.
    Credential(String),
}

impl Display for PushFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportOpen(msg) => write!(f, "transport open failed: {msg}"),
            Self::TransportClosed { code, reason } => match code {
                Some(code) => write!(f, "transport closed ({code}): {reason}"),
                None => write!(f, "transport closed: {reason}"),
            },
            Self::TransportError(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Credential(msg) => write!(f, "credential unavailable: {msg}"),
        }
    }
}

/// Observable connection status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Most recent fault, kept across reconnects until the next one.
    pub last_fault: Option<PushFault>,
    /// Connection attempts since the last established session.
    pub attempts: u32,
}

/// Heartbeat periods agreed with the server: how often we send, and how
/// often we expect to hear something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Heartbeats {
    /// Outgoing heartbeat period, `None` when disabled.
    pub send_every: Option<Duration>,
    /// Incoming heartbeat period, `None` when disabled.
    pub expect_every: Option<Duration>,
}

/// Combine our heartbeat period with the `heart-beat` header of `CONNECTED`.
#[must_use]
pub fn negotiate_heartbeats(ours: Duration, server_header: Option<&str>) -> Heartbeats {
    let Some((sx, sy)) = server_header.and_then(|raw| raw.split_once(',')) else {
        return Heartbeats::default();
    };
    let parse = |raw: &str| raw.trim().parse::<u64>().map(Duration::from_millis).ok();
    let (Some(server_sends), Some(server_wants)) = (parse(sx), parse(sy)) else {
        return Heartbeats::default();
    };
    let agree = |a: Duration, b: Duration| (!a.is_zero() && !b.is_zero()).then(|| a.max(b));
    Heartbeats {
        send_every: agree(ours, server_wants),
        expect_every: agree(ours, server_sends),
    }
}

/// How a session ended.
enum SessionEnd {
    Cancelled,
    Fault(PushFault),
}

struct Session {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Shared {
    config: PushConfig,
    user_id: i64,
    transport: Arc<dyn Transport>,
    auth: Arc<dyn Authenticator>,
    notifications: Arc<NotificationStore>,
    status_tx: watch::Sender<ConnectionStatus>,
    messages_tx: broadcast::Sender<PushMessage>,
}

/// Push client for the per-user notification topic.
pub struct PushClient {
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

impl PushClient {
    /// Create an idle client. Nothing happens until [`Self::connect`].
    #[must_use]
    pub fn new(
        config: PushConfig,
        user_id: i64,
        transport: Arc<dyn Transport>,
        auth: Arc<dyn Authenticator>,
        notifications: Arc<NotificationStore>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::default());
        let (messages_tx, _) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                user_id,
                transport,
                auth,
                notifications,
                status_tx,
                messages_tx,
            }),
            session: Mutex::new(None),
        }
    }

    /// Connection status updates.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Every decoded message from the user topic, after it has been applied
    /// to the notification store.
    #[must_use]
    pub fn messages(&self) -> broadcast::Receiver<PushMessage> {
        self.shared.messages_tx.subscribe()
    }

    /// Store that inbound messages are applied to.
    #[must_use]
    pub fn notifications(&self) -> &Arc<NotificationStore> {
        &self.shared.notifications
    }

    /// Topic this client subscribes to.
    #[must_use]
    pub fn topic(&self) -> String {
        self.shared.config.user_topic(self.shared.user_id)
    }

    /// Whether a supervisor task is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lock_session()
            .as_ref()
            .is_some_and(|session| !session.handle.is_finished())
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the connect/reconnect supervisor. A second call while the
    /// supervisor runs is ignored. Must be called inside a tokio runtime.
    pub fn connect(&self) {
        let mut session = self.lock_session();
        if session.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            debug!("push client already active, ignoring connect");
            return;
        }

        let cancel = CancellationToken::new();
        let span = info_span!("push_client", user_id = self.shared.user_id);
        let handle = tokio::spawn(
            Arc::clone(&self.shared)
                .supervise(cancel.clone())
                .instrument(span),
        );
        *session = Some(Session { cancel, handle });
    }

    /// Stop the supervisor, closing any open session and abandoning any
    /// pending reconnect. Safe to call when idle.
    pub async fn disconnect(&self) {
        let session = self.lock_session().take();
        let Some(session) = session else {
            debug!("push client not active, disconnect is a no-op");
            return;
        };
        session.cancel.cancel();
        if let Err(err) = session.handle.await {
            warn!(%err, "push supervisor ended abnormally");
        }
        self.shared.transition(ConnectionState::Disconnected);
    }
}

impl Drop for PushClient {
    fn drop(&mut self) {
        if let Some(session) = self.lock_session().take() {
            session.cancel.cancel();
        }
    }
}

impl Shared {
    fn transition(&self, to: ConnectionState) {
        self.status_tx.send_if_modified(|status| {
            if status.state == to {
                return false;
            }
            info!(from = %status.state, to = %to, "push connection state changed");
            status.state = to;
            true
        });
    }

    fn record_fault(&self, fault: PushFault) {
        self.status_tx.send_modify(|status| status.last_fault = Some(fault));
    }

    async fn supervise(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let fault = match self.run_session(&cancel).await {
                SessionEnd::Cancelled => break,
                SessionEnd::Fault(fault) => fault,
            };

            let next = if matches!(fault, PushFault::TransportClosed { .. }) {
                ConnectionState::Disconnected
            } else {
                ConnectionState::Error
            };
            warn!(%fault, "push session ended");
            self.record_fault(fault);
            self.transition(next);

            let delay = self.config.reconnect_delay();
            info!(delay_ms = delay.as_millis(), "push client reconnecting");
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }
        self.transition(ConnectionState::Disconnected);
        debug!("push supervisor stopped");
    }

    async fn run_session(&self, cancel: &CancellationToken) -> SessionEnd {
        self.status_tx.send_modify(|status| status.attempts += 1);
        self.transition(ConnectionState::Connecting);

        let token = tokio::select! {
            biased;
            () = cancel.cancelled() => return SessionEnd::Cancelled,
            token = self.auth.access_token() => token,
        };
        let token = match token {
            Ok(token) => token,
            Err(err) => {
                warn!(%err, "credential unavailable, connecting without one");
                self.record_fault(PushFault::Credential(err.to_string()));
                String::new()
            }
        };

        let url = match self.socket_url(&token) {
            Ok(url) => url,
            Err(fault) => return SessionEnd::Fault(fault),
        };
        debug!(endpoint = %self.config.endpoint, "opening push socket");

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return SessionEnd::Cancelled,
            opened = self.transport.open(url) => opened,
        };
        let mut channels = match opened {
            Ok(channels) => channels,
            Err(err) => return SessionEnd::Fault(PushFault::TransportOpen(err.to_string())),
        };

        let heartbeat_ms = self.config.heartbeat_ms;
        let mut connect = Frame::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("heart-beat", format!("{heartbeat_ms},{heartbeat_ms}"));
        if !token.is_empty() {
            connect = connect.header("Authorization", format!("Bearer {token}"));
        }
        if let Err(fault) = send_frame(&channels.outbound, &connect).await {
            return SessionEnd::Fault(fault);
        }

        let mut codec = StompCodec;
        let mut buffer = BytesMut::new();
        let mut last_inbound = Instant::now();
        let handshake_deadline = last_inbound + self.config.connect_timeout();
        let mut connected = false;
        let mut expect_every: Option<Duration> = None;
        let mut send_tick: Option<Interval> = None;

        loop {
            // CONNECTED must arrive before the handshake deadline regardless
            // of heartbeat settings.
            let deadline = if connected {
                expect_every.map(|every| last_inbound + every * 2)
            } else {
                Some(handshake_deadline)
            };

            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    let _ = send_frame(&channels.outbound, &Frame::new(Command::Disconnect)).await;
                    return SessionEnd::Cancelled;
                }

                event = channels.inbound.recv() => {
                    let text = match event {
                        Some(SocketEvent::Text(text)) => text,
                        Some(SocketEvent::Closed { code, reason }) => {
                            return SessionEnd::Fault(PushFault::TransportClosed { code, reason });
                        }
                        Some(SocketEvent::Error(err)) => {
                            return SessionEnd::Fault(PushFault::TransportError(err));
                        }
                        None => {
                            return SessionEnd::Fault(PushFault::TransportClosed {
                                code: None,
                                reason: "socket closed".into(),
                            });
                        }
                    };
                    last_inbound = Instant::now();
                    buffer.extend_from_slice(text.as_bytes());

                    loop {
                        let item = match codec.decode(&mut buffer) {
                            Ok(Some(item)) => item,
                            Ok(None) => break,
                            Err(err) => {
                                warn!(%err, raw = %text, "undecodable frame");
                                return SessionEnd::Fault(PushFault::Protocol(err.to_string()));
                            }
                        };
                        let frame = match item {
                            StompItem::Heartbeat => {
                                trace!(direction = "inbound", "heartbeat");
                                continue;
                            }
                            StompItem::Frame(frame) => frame,
                        };
                        log_frame("inbound", &frame);

                        match frame.command {
                            Command::Connected => {
                                let agreed = negotiate_heartbeats(
                                    self.config.heartbeat(),
                                    frame.get("heart-beat"),
                                );
                                debug!(
                                    send_ms = agreed.send_every.map(|d| d.as_millis()),
                                    expect_ms = agreed.expect_every.map(|d| d.as_millis()),
                                    "heartbeats negotiated"
                                );
                                connected = true;
                                expect_every = agreed.expect_every;
                                send_tick = agreed.send_every.map(|every| {
                                    let mut tick = tokio::time::interval_at(Instant::now() + every, every);
                                    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
                                    tick
                                });

                                let subscribe = Frame::new(Command::Subscribe)
                                    .header("id", format!("sub-{}", uuid::Uuid::new_v4()))
                                    .header("destination", self.config.user_topic(self.user_id))
                                    .header("ack", "auto");
                                if let Err(fault) = send_frame(&channels.outbound, &subscribe).await {
                                    return SessionEnd::Fault(fault);
                                }
                                self.status_tx.send_modify(|status| status.attempts = 0);
                                self.transition(ConnectionState::Connected);
                            }
                            Command::Message => self.dispatch(&frame),
                            Command::Error => {
                                let reason = frame
                                    .get("message")
                                    .map_or_else(|| frame.body.trim().to_owned(), str::to_owned);
                                warn!(
                                    reason = %reason,
                                    headers = ?frame.headers,
                                    body = %frame.body,
                                    "server sent ERROR frame"
                                );
                                return SessionEnd::Fault(PushFault::Protocol(reason));
                            }
                            other => debug!(command = %other, "ignoring frame"),
                        }
                    }
                }

                () = sleep_until(deadline) => {
                    if !connected {
                        return SessionEnd::Fault(PushFault::TransportError(format!(
                            "no CONNECTED frame within {} ms",
                            self.config.connect_timeout_ms
                        )));
                    }
                    let silence = expect_every.map(|every| (every * 2).as_millis());
                    return SessionEnd::Fault(PushFault::TransportError(format!(
                        "no data from server for {} ms",
                        silence.unwrap_or_default()
                    )));
                }

                () = tick(&mut send_tick) => {
                    trace!(direction = "outbound", "heartbeat");
                    if channels.outbound.send(HEARTBEAT.to_owned()).await.is_err() {
                        return SessionEnd::Fault(PushFault::TransportError(
                            "socket closed while sending heartbeat".into(),
                        ));
                    }
                }
            }
        }
    }

    /// Apply one `MESSAGE` body to the store and rebroadcast it. Bodies that
    /// do not parse are logged and skipped.
    fn dispatch(&self, frame: &Frame) {
        match PushMessage::parse(&frame.body) {
            Ok(message) => {
                self.notifications.apply_push(&message);
                let _ = self.messages_tx.send(message);
            }
            Err(err) => {
                warn!(%err, body = %frame.body, "skipping unparseable push message");
            }
        }
    }

    fn socket_url(&self, token: &str) -> Result<String, PushFault> {
        let mut url = reqwest::Url::parse(&self.config.endpoint)
            .map_err(|err| PushFault::TransportOpen(format!("invalid endpoint: {err}")))?;
        if self.config.token_in_query && !token.is_empty() {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url.into())
    }
}

fn log_frame(direction: &'static str, frame: &Frame) {
    debug!(
        direction,
        command = %frame.command,
        destination = frame.get("destination"),
        body_len = frame.body.len(),
        "frame"
    );
    trace!(direction, headers = ?frame.headers, body = %frame.body, "raw frame");
}

async fn send_frame(outbound: &mpsc::Sender<String>, frame: &Frame) -> Result<(), PushFault> {
    let wire = frame
        .to_wire()
        .map_err(|err| PushFault::Protocol(err.to_string()))?;
    log_frame("outbound", frame);
    outbound
        .send(wire)
        .await
        .map_err(|_| PushFault::TransportError(format!("socket closed while sending {}", frame.command)))
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
