//! Wire framing for the push channel.
//!
//! Two framings are supported: Socket.IO over Engine.IO v4 (the backend's
//! default) and a raw variant whose text frames are `{header, body}` JSON.

use serde::Deserialize;
use url::Url;

use crate::{PushError, PushEvent, PushProtocol};

/// Socket.IO event name carrying step popups.
pub const POPUP_EVENT: &str = "popup_message";
/// Header attached to popup events mapped from Socket.IO.
pub const POPUP_HEADER: &str = "Step";

/// Decoded Engine.IO / Socket.IO text frame.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketIoFrame {
    /// Engine.IO open packet (`0{...}`).
    Open,
    /// Engine.IO ping (`2`); must be answered with a pong.
    Ping,
    /// Engine.IO close (`1`) or Socket.IO namespace disconnect (`41`).
    Close,
    /// Socket.IO namespace connect acknowledgement (`40...`).
    Connected,
    /// Socket.IO event (`42[...]`).
    Event {
        /// Event name.
        name: String,
        /// First event argument, `Null` when absent.
        payload: serde_json::Value,
    },
    /// Anything else (pong, upgrade, noop, acks).
    Other,
}

/// Engine.IO pong reply.
pub const ENGINE_PONG: &str = "3";
/// Socket.IO default-namespace connect request.
pub const NAMESPACE_CONNECT: &str = "40";

/// Decodes one Engine.IO text frame.
///
/// # Errors
/// Returns [`PushError::Frame`] when an event packet carries malformed JSON.
pub fn decode_socketio_frame(text: &str) -> Result<SocketIoFrame, PushError> {
    let mut chars = text.chars();
    let frame = match chars.next() {
        Some('0') => SocketIoFrame::Open,
        Some('1') => SocketIoFrame::Close,
        Some('2') => SocketIoFrame::Ping,
        Some('4') => decode_socketio_packet(chars.as_str())?,
        _ => SocketIoFrame::Other,
    };
    Ok(frame)
}

fn decode_socketio_packet(packet: &str) -> Result<SocketIoFrame, PushError> {
    let mut chars = packet.chars();
    match chars.next() {
        Some('0') => Ok(SocketIoFrame::Connected),
        Some('1') => Ok(SocketIoFrame::Close),
        Some('2') => {
            let mut rest = chars.as_str();
            if rest.starts_with('/') {
                rest = rest.split_once(',').map(|(_, tail)| tail).unwrap_or("");
            }
            let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

            let values: Vec<serde_json::Value> = serde_json::from_str(rest)
                .map_err(|error| PushError::Frame(format!("invalid event payload: {error}")))?;
            let mut values = values.into_iter();
            let name = match values.next() {
                Some(serde_json::Value::String(name)) => name,
                _ => return Err(PushError::Frame("event name is missing".to_string())),
            };
            Ok(SocketIoFrame::Event {
                name,
                payload: values.next().unwrap_or(serde_json::Value::Null),
            })
        }
        _ => Ok(SocketIoFrame::Other),
    }
}

/// Maps a Socket.IO event to display content.
///
/// Only [`POPUP_EVENT`] produces content; its `message` becomes the body.
pub fn map_socketio_event(name: &str, payload: &serde_json::Value) -> Option<PushEvent> {
    if name != POPUP_EVENT {
        return None;
    }
    let body = payload
        .get("message")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    Some(PushEvent {
        header: POPUP_HEADER.to_string(),
        body: body.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct RawContent {
    #[serde(default)]
    header: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

/// Decodes a raw-protocol text frame carrying `{header, body}` JSON.
///
/// # Errors
/// Returns [`PushError::Frame`] when the frame is not a JSON object.
pub fn decode_raw_frame(text: &str) -> Result<PushEvent, PushError> {
    let content: RawContent = serde_json::from_str(text)
        .map_err(|error| PushError::Frame(format!("invalid raw frame: {error}")))?;
    Ok(PushEvent {
        header: content.header.unwrap_or_default(),
        body: content.body.unwrap_or_default(),
    })
}

/// Builds the socket URL for `protocol` from a configured push URL.
///
/// Socket.IO URLs are normalized to `ws(s)://host[:port]/socket.io/` with the
/// Engine.IO v4 websocket query; `http(s)` schemes map to `ws(s)`. Raw URLs
/// only get their scheme normalized.
///
/// # Errors
/// Returns [`PushError::InvalidUrl`] for unparsable URLs or other schemes.
pub fn socket_url(base: &str, protocol: PushProtocol) -> Result<Url, PushError> {
    let mut url =
        Url::parse(base).map_err(|error| PushError::InvalidUrl(format!("{base}: {error}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(PushError::InvalidUrl(format!(
                "unsupported scheme '{other}'"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| PushError::InvalidUrl(format!("cannot switch {base} to {scheme}")))?;

    if protocol == PushProtocol::SocketIo {
        url.set_path("/socket.io/");
        url.set_query(Some("EIO=4&transport=websocket"));
        url.set_fragment(None);
    }
    Ok(url)
}
