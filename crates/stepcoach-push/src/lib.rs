#![warn(missing_docs)]
//! # stepcoach-push
//!
//! ## Purpose
//! Always-on push channel that delivers step content (`{header, body}`) from
//! the backend independently of the request/response poll cycle.
//!
//! ## Responsibilities
//! - Own one websocket connection with an explicit lifecycle:
//!   [`PushChannel::connect`], [`PushChannel::subscribe`],
//!   [`Subscription::unsubscribe`], [`PushChannel::disconnect`].
//! - Speak Socket.IO (Engine.IO v4) or a raw JSON framing.
//! - Route decoded content to at most one listener.
//!
//! ## Data flow
//! Socket text frame -> [`frame`] decoding -> [`PushEvent`] -> current
//! listener (if any).
//!
//! ## Ownership and lifetimes
//! The channel is an ordinary value injected into consumers; there is no
//! process-global socket. The reader thread shares only the listener slot and
//! a shutdown flag with the channel.
//!
//! ## Error model
//! Connection failures return [`PushError`]. Malformed frames are logged and
//! dropped; a panicking listener is logged and does not stop the reader.

pub mod frame;

use std::net::TcpStream;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::frame::{
    ENGINE_PONG, NAMESPACE_CONNECT, SocketIoFrame, decode_raw_frame, decode_socketio_frame,
    map_socketio_event, socket_url,
};

const READ_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Display content pushed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushEvent {
    /// Short heading.
    pub header: String,
    /// Body text.
    pub body: String,
}

/// Framing spoken on the push socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushProtocol {
    /// Socket.IO over Engine.IO v4; `popup_message` events.
    #[default]
    SocketIo,
    /// Text frames carrying `{header, body}` JSON.
    Raw,
}

impl FromStr for PushProtocol {
    type Err = PushError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "socketio" | "socket.io" => Ok(Self::SocketIo),
            "raw" => Ok(Self::Raw),
            other => Err(PushError::InvalidProtocol(other.to_string())),
        }
    }
}

type Listener = Arc<dyn Fn(&PushEvent) + Send + Sync>;

struct Subscriber {
    id: u64,
    listener: Listener,
}

/// Single-listener slot shared between the channel and its reader thread.
///
/// Deliveries run under `delivery`, so replacing or removing the listener
/// waits for an in-flight call to return. A listener that re-subscribes from
/// inside its own callback skips that wait.
#[derive(Clone, Default)]
struct ListenerSlot {
    current: Arc<Mutex<Option<Subscriber>>>,
    delivery: Arc<Mutex<()>>,
    delivering_on: Arc<Mutex<Option<ThreadId>>>,
}

impl ListenerSlot {
    fn is_delivering_here(&self) -> bool {
        self.delivering_on
            .lock()
            .map(|thread| *thread == Some(std::thread::current().id()))
            .unwrap_or(false)
    }

    fn exclusive<R>(&self, change: impl FnOnce(&mut Option<Subscriber>) -> R) -> Option<R> {
        let _gate = if self.is_delivering_here() {
            None
        } else {
            Some(self.delivery.lock().unwrap_or_else(PoisonError::into_inner))
        };
        self.current.lock().ok().map(|mut slot| change(&mut slot))
    }

    fn replace(&self, subscriber: Subscriber) {
        self.exclusive(|slot| *slot = Some(subscriber));
    }

    fn remove_if(&self, id: u64) -> bool {
        self.exclusive(|slot| {
            if slot.as_ref().is_some_and(|current| current.id == id) {
                *slot = None;
                true
            } else {
                false
            }
        })
        .unwrap_or(false)
    }

    fn clear(&self) {
        self.exclusive(|slot| *slot = None);
    }

    fn deliver(&self, event: &PushEvent) -> bool {
        let _gate = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        // Call outside `current` so listeners may re-subscribe.
        let listener = match self.current.lock() {
            Ok(slot) => slot.as_ref().map(|subscriber| subscriber.listener.clone()),
            Err(_) => None,
        };
        let Some(listener) = listener else {
            return false;
        };

        if let Ok(mut thread) = self.delivering_on.lock() {
            *thread = Some(std::thread::current().id());
        }
        if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
            warn!(stage = "push", action = "listener_panic", "push listener panicked");
        }
        if let Ok(mut thread) = self.delivering_on.lock() {
            *thread = None;
        }
        true
    }
}

/// Handle returned by [`PushChannel::subscribe`].
///
/// Dropping the handle leaves the listener installed; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    slot: ListenerSlot,
}

impl Subscription {
    /// Removes the listener unless a later subscription already replaced it.
    ///
    /// Returns `true` when this call removed the listener.
    pub fn unsubscribe(self) -> bool {
        self.slot.remove_if(self.id)
    }
}

struct Connection {
    shutdown: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

/// Push channel with an explicit connect/subscribe/disconnect lifecycle.
pub struct PushChannel {
    protocol: PushProtocol,
    slot: ListenerSlot,
    next_id: AtomicU64,
    connection: Mutex<Option<Connection>>,
}

impl PushChannel {
    /// Creates a disconnected channel speaking `protocol`.
    pub fn new(protocol: PushProtocol) -> Self {
        Self {
            protocol,
            slot: ListenerSlot::default(),
            next_id: AtomicU64::new(1),
            connection: Mutex::new(None),
        }
    }

    /// Returns the configured framing.
    pub fn protocol(&self) -> PushProtocol {
        self.protocol
    }

    /// Installs `listener`, replacing any previous one.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slot.replace(Subscriber {
            id,
            listener: Arc::new(listener),
        });
        debug!(stage = "push", action = "subscribe", subscription = id, "listener installed");
        Subscription {
            id,
            slot: self.slot.clone(),
        }
    }

    /// Delivers `event` to the current listener.
    ///
    /// Returns `false` when nobody is subscribed.
    pub fn dispatch(&self, event: &PushEvent) -> bool {
        self.slot.deliver(event)
    }

    /// Returns `true` while a reader thread is running.
    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .map(|connection| {
                connection
                    .as_ref()
                    .is_some_and(|connection| !connection.reader.is_finished())
            })
            .unwrap_or(false)
    }

    /// Opens the socket and starts the reader thread.
    ///
    /// Calling `connect` on a live channel is a no-op.
    ///
    /// # Errors
    /// Returns [`PushError::InvalidUrl`] for bad URLs and
    /// [`PushError::Connect`] when the websocket handshake fails.
    pub fn connect(&self, url: &str) -> Result<(), PushError> {
        let mut connection = self
            .connection
            .lock()
            .map_err(|_| PushError::Connect("connection lock poisoned".to_string()))?;
        if connection
            .as_ref()
            .is_some_and(|existing| !existing.reader.is_finished())
        {
            return Ok(());
        }

        let target = socket_url(url, self.protocol)?;
        let (socket, _response) = tungstenite::connect(target.as_str())
            .map_err(|error| PushError::Connect(format!("{target}: {error}")))?;
        set_read_timeout(&socket, READ_POLL_INTERVAL);
        info!(stage = "push", action = "connected", url = %target, "push socket connected");

        let shutdown = Arc::new(AtomicBool::new(false));
        let reader = {
            let shutdown = shutdown.clone();
            let slot = self.slot.clone();
            let protocol = self.protocol;
            std::thread::Builder::new()
                .name("stepcoach-push-reader".to_string())
                .spawn(move || read_loop(socket, protocol, slot, shutdown))
                .map_err(|error| PushError::Connect(format!("reader spawn failed: {error}")))?
        };

        *connection = Some(Connection { shutdown, reader });
        Ok(())
    }

    /// Closes the socket, joins the reader, and drops the listener.
    pub fn disconnect(&self) {
        let connection = self
            .connection
            .lock()
            .ok()
            .and_then(|mut connection| connection.take());
        if let Some(connection) = connection {
            connection.shutdown.store(true, Ordering::SeqCst);
            if connection.reader.join().is_err() {
                warn!(stage = "push", action = "disconnect", "reader thread panicked");
            }
            info!(stage = "push", action = "disconnected", "push socket closed");
        }
        self.slot.clear();
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

fn set_read_timeout(socket: &Socket, timeout: Duration) {
    let result = match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(Some(timeout)),
        _ => Ok(()),
    };
    if let Err(error) = result {
        warn!(stage = "push", action = "read_timeout", error = %error, "cannot set read timeout");
    }
}

fn read_loop(mut socket: Socket, protocol: PushProtocol, slot: ListenerSlot, shutdown: Arc<AtomicBool>) {
    while !shutdown.load(Ordering::SeqCst) {
        let message = match socket.read() {
            Ok(message) => message,
            Err(tungstenite::Error::Io(error))
                if matches!(
                    error.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                continue;
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                info!(stage = "push", action = "closed", "push socket closed by peer");
                return;
            }
            Err(error) => {
                warn!(stage = "push", action = "read_error", error = %error, "push socket failed");
                return;
            }
        };

        let Message::Text(text) = message else {
            continue;
        };
        if let Some(reply) = handle_text(text.as_str(), protocol, &slot)
            && let Err(error) = socket.send(Message::Text(reply.into()))
        {
            warn!(stage = "push", action = "send_error", error = %error, "push reply failed");
            return;
        }
    }

    let _ = socket.close(None);
    let _ = socket.flush();
}

/// Handles one text frame and returns the reply to send, if any.
fn handle_text(text: &str, protocol: PushProtocol, slot: &ListenerSlot) -> Option<String> {
    match protocol {
        PushProtocol::Raw => {
            match decode_raw_frame(text) {
                Ok(event) => {
                    slot.deliver(&event);
                }
                Err(error) => {
                    warn!(stage = "push", action = "frame_dropped", error = %error, "bad frame");
                }
            }
            None
        }
        PushProtocol::SocketIo => match decode_socketio_frame(text) {
            Ok(SocketIoFrame::Open) => Some(NAMESPACE_CONNECT.to_string()),
            Ok(SocketIoFrame::Ping) => Some(ENGINE_PONG.to_string()),
            Ok(SocketIoFrame::Event { name, payload }) => {
                match map_socketio_event(&name, &payload) {
                    Some(event) => {
                        slot.deliver(&event);
                    }
                    None => debug!(stage = "push", action = "event_ignored", event = %name),
                }
                None
            }
            Ok(SocketIoFrame::Connected) => {
                debug!(stage = "push", action = "namespace_connected");
                None
            }
            Ok(SocketIoFrame::Close | SocketIoFrame::Other) => None,
            Err(error) => {
                warn!(stage = "push", action = "frame_dropped", error = %error, "bad frame");
                None
            }
        },
    }
}

/// Push channel error type.
#[derive(Debug, Error)]
pub enum PushError {
    /// URL could not be parsed or normalized.
    #[error("invalid push url: {0}")]
    InvalidUrl(String),
    /// Unknown protocol name.
    #[error("unknown push protocol: {0}")]
    InvalidProtocol(String),
    /// Websocket handshake or reader setup failed.
    #[error("push connect failed: {0}")]
    Connect(String),
    /// A frame could not be decoded.
    #[error("malformed push frame: {0}")]
    Frame(String),
}
