//! STOMP 1.2 frames and a `tokio_util` codec for them.
//!
//! A frame is `COMMAND\n(header:value\n)*\nbody\0`. A bare end-of-line
//! between frames is a heartbeat. Header values are escaped (`\\`, `\n`,
//! `\r`, `\c`) on every frame except `CONNECT` and `CONNECTED`.
//!
//! [`StompCodec`] works on a byte buffer, so frames split across or packed
//! into several WebSocket messages decode the same way.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{AppError, Result};

/// Largest frame accepted before the decoder gives up: 1 MiB.
pub const MAX_FRAME_BYTES: usize = 1_048_576;

/// Wire form of an outbound heartbeat.
pub const HEARTBEAT: &str = "\n";

/// Frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client opens a session.
    Connect,
    /// Server accepts a session.
    Connected,
    /// Client subscribes to a destination.
    Subscribe,
    /// Client cancels a subscription.
    Unsubscribe,
    /// Client publishes to a destination.
    Send,
    /// Server delivers a message for a subscription.
    Message,
    /// Server acknowledges a frame that asked for a receipt.
    Receipt,
    /// Server reports a session error and closes.
    Error,
    /// Client closes the session.
    Disconnect,
}

impl Command {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
        }
    }

    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CONNECT" | "STOMP" => Ok(Self::Connect),
            "CONNECTED" => Ok(Self::Connected),
            "SUBSCRIBE" => Ok(Self::Subscribe),
            "UNSUBSCRIBE" => Ok(Self::Unsubscribe),
            "SEND" => Ok(Self::Send),
            "MESSAGE" => Ok(Self::Message),
            "RECEIPT" => Ok(Self::Receipt),
            "ERROR" => Ok(Self::Error),
            "DISCONNECT" => Ok(Self::Disconnect),
            other => Err(AppError::Protocol(format!("unknown command `{other}`"))),
        }
    }
}

/// One STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: Command,
    /// Headers in wire order. Repeated names keep every occurrence.
    pub headers: Vec<(String, String)>,
    /// Frame body.
    pub body: String,
}

impl Frame {
    /// Frame with no headers and an empty body.
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header; later repeats are ignored.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Serialize to the text carried by one WebSocket message.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` when a header contains characters the
    /// frame cannot carry.
    pub fn to_wire(&self) -> Result<String> {
        let mut buf = BytesMut::new();
        StompCodec.encode(self.clone(), &mut buf)?;
        String::from_utf8(buf.to_vec())
            .map_err(|err| AppError::Protocol(format!("frame is not utf-8: {err}")))
    }
}

/// Item produced by [`StompCodec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompItem {
    /// A bare end-of-line.
    Heartbeat,
    /// A complete frame.
    Frame(Frame),
}

/// STOMP 1.2 codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct StompCodec;

impl Decoder for StompCodec {
    type Item = StompItem;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match src.first() {
            None => return Ok(None),
            Some(b'\n') => {
                src.advance(1);
                return Ok(Some(StompItem::Heartbeat));
            }
            Some(b'\r') => {
                return match src.get(1) {
                    None => Ok(None),
                    Some(b'\n') => {
                        src.advance(2);
                        Ok(Some(StompItem::Heartbeat))
                    }
                    Some(_) => Err(AppError::Protocol("stray carriage return".into())),
                };
            }
            Some(_) => {}
        }

        let Some((head_end, body_start)) = find_head_end(src) else {
            return incomplete(src);
        };

        let head = std::str::from_utf8(&src[..head_end])
            .map_err(|err| AppError::Protocol(format!("frame head is not utf-8: {err}")))?;
        let mut lines = head.split('\n').map(|line| line.strip_suffix('\r').unwrap_or(line));
        let command: Command = lines.next().unwrap_or_default().parse()?;

        let mut headers = Vec::new();
        for line in lines.filter(|line| !line.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| AppError::Protocol(format!("malformed header `{line}`")))?;
            if command.escapes_headers() {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_owned(), value.to_owned()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .map(|(_, value)| {
                value
                    .parse::<usize>()
                    .map_err(|_| AppError::Protocol(format!("invalid content-length `{value}`")))
            })
            .transpose()?;

        let body_end = match content_length {
            Some(len) => {
                if len > MAX_FRAME_BYTES {
                    return Err(AppError::Protocol(format!(
                        "content-length {len} exceeds {MAX_FRAME_BYTES} bytes"
                    )));
                }
                let end = body_start
                    .checked_add(len)
                    .ok_or_else(|| AppError::Protocol("content-length overflows the frame".into()))?;
                if src.len() <= end {
                    return incomplete(src);
                }
                if src[end] != 0 {
                    return Err(AppError::Protocol(
                        "frame body not terminated after content-length".into(),
                    ));
                }
                end
            }
            None => match src[body_start..].iter().position(|b| *b == 0) {
                Some(offset) => body_start + offset,
                None => return incomplete(src),
            },
        };

        let body = String::from_utf8(src[body_start..body_end].to_vec())
            .map_err(|err| AppError::Protocol(format!("frame body is not utf-8: {err}")))?;
        src.advance(body_end + 1);

        Ok(Some(StompItem::Frame(Frame {
            command,
            headers,
            body,
        })))
    }
}

impl Encoder<Frame> for StompCodec {
    type Error = AppError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        dst.put_slice(frame.command.as_str().as_bytes());
        dst.put_u8(b'\n');
        for (name, value) in &frame.headers {
            if frame.command.escapes_headers() {
                dst.put_slice(escape(name).as_bytes());
                dst.put_u8(b':');
                dst.put_slice(escape(value).as_bytes());
            } else {
                if name.contains([':', '\n', '\r']) || value.contains(['\n', '\r']) {
                    return Err(AppError::Protocol(format!(
                        "header `{name}` cannot be sent on {}",
                        frame.command
                    )));
                }
                dst.put_slice(name.as_bytes());
                dst.put_u8(b':');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(b'\n');
        }
        if !frame.body.is_empty() {
            dst.put_slice(format!("content-length:{}\n", frame.body.len()).as_bytes());
        }
        dst.put_u8(b'\n');
        dst.put_slice(frame.body.as_bytes());
        dst.put_u8(0);
        Ok(())
    }
}

/// Locate the blank line ending the head. Returns the end of the last
/// header line and the start of the body.
fn find_head_end(src: &[u8]) -> Option<(usize, usize)> {
    let mut from = 0;
    while let Some(offset) = src[from..].iter().position(|b| *b == b'\n') {
        let nl = from + offset;
        match src.get(nl + 1..) {
            Some([b'\n', ..]) => return Some((nl, nl + 2)),
            Some([b'\r', b'\n', ..]) => return Some((nl, nl + 3)),
            _ => from = nl + 1,
        }
    }
    None
}

fn incomplete(src: &BytesMut) -> Result<Option<StompItem>> {
    if src.len() > MAX_FRAME_BYTES {
        return Err(AppError::Protocol(format!(
            "frame too large: exceeded {MAX_FRAME_BYTES} bytes"
        )));
    }
    Ok(None)
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(raw: &str) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(AppError::Protocol(format!(
                    "invalid header escape `\\{}`",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}
