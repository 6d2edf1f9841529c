//! WebSocket connection and read loop.
//!
//! A [`Connection`] wraps one upgraded WebSocket. The transport is split
//! into its two halves:
//!
//! - the read half is owned by the single read loop started with
//!   [`Connection::listen_and_respond`];
//! - the write half sits behind an async mutex so sends from many handler
//!   tasks, and close, never interleave on the wire.
//!
//! # Read Loop
//!
//! Each text or binary message is handed to the [`MessageHandler`] on a new
//! tokio task. The loop never waits for a handler before reading the next
//! message, so handlers run concurrently with each other and with reads.
//!
//! # Lifecycle
//!
//! `Upgrading -> Open -> Closed`. The read loop ending is the signal that the
//! connection is dead; it does not close the transport itself so callers can
//! deregister the connection first and then call [`Connection::close`].
//! Close sends a close frame, drops both halves of the socket and stops a
//! running read loop without waiting for the peer to answer.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::upgrader::UpgradeOptions;

use super::dispatch::Dispatcher;

// ============================================================================
// Types
// ============================================================================

/// Write half of the transport.
type MessageSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Read half of the transport.
type MessageStream = Pin<Box<dyn Stream<Item = std::result::Result<Message, WsError>> + Send>>;

/// Message handler callback type.
///
/// Called once per inbound message with the connection and the raw payload.
/// The returned future runs on its own task.
pub type MessageHandler = Arc<dyn Fn(Arc<Connection>, Bytes) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async closure as a [`MessageHandler`].
///
/// # Example
///
/// ```ignore
/// let handler = message_handler(|connection, payload| async move {
///     let _ = connection.send_response(&payload.len()).await;
/// });
/// ```
pub fn message_handler<F, Fut>(handler: F) -> MessageHandler
where
    F: Fn(Arc<Connection>, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |connection, payload| Box::pin(handler(connection, payload)))
}

// ============================================================================
// Connection
// ============================================================================

/// One client's WebSocket connection.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync` and is shared as `Arc<Connection>`.
/// At most one write or close is in flight at any time; at most one read
/// loop ever runs.
pub struct Connection {
    /// Write half, guarded for the duration of each write and close.
    /// `None` once closed.
    writer: AsyncMutex<Option<MessageSink>>,
    /// Read half, taken by the read loop.
    reader: Mutex<Option<MessageStream>>,
    /// Callback for inbound messages.
    handler: MessageHandler,
    /// Spawns handler invocations.
    dispatcher: Dispatcher,
    /// Deadline for each write and close.
    write_timeout: Duration,
    /// Set once close has been attempted.
    closed: AtomicBool,
    /// Flipped to `true` by close to stop the read loop.
    shutdown: watch::Sender<bool>,
    /// Sub-protocol echoed during the upgrade.
    subprotocol: Option<String>,
    /// Remote address, when known.
    peer: Option<SocketAddr>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("subprotocol", &self.subprotocol)
            .field("write_timeout", &self.write_timeout)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection - Construction
// ============================================================================

impl Connection {
    /// Creates a connection from an upgraded stream.
    pub(crate) fn new<S>(
        ws_stream: WebSocketStream<S>,
        handler: MessageHandler,
        options: &UpgradeOptions,
        subprotocol: Option<String>,
        peer: Option<SocketAddr>,
    ) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, stream) = ws_stream.split();
        let sink: MessageSink = Box::pin(sink);
        let stream: MessageStream = Box::pin(stream);

        Arc::new(Self {
            writer: AsyncMutex::new(Some(sink)),
            reader: Mutex::new(Some(stream)),
            handler,
            dispatcher: Dispatcher::new(options.dispatch),
            write_timeout: options.write_timeout,
            closed: AtomicBool::new(false),
            shutdown: watch::Sender::new(false),
            subprotocol,
            peer,
        })
    }

    /// Wraps a stream that was already upgraded elsewhere.
    ///
    /// Only the write deadline and dispatch policy from `options` apply; the
    /// transport limits were fixed when `ws_stream` was created.
    pub fn from_websocket<S>(
        ws_stream: WebSocketStream<S>,
        handler: MessageHandler,
        options: &UpgradeOptions,
    ) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::new(ws_stream, handler, options, None, None)
    }
}

// ============================================================================
// Connection - Public API
// ============================================================================

impl Connection {
    /// Returns the sub-protocol echoed during the upgrade, if any.
    #[inline]
    #[must_use]
    pub fn subprotocol(&self) -> Option<&str> {
        self.subprotocol.as_deref()
    }

    /// Returns the remote address, if known.
    #[inline]
    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Returns the write deadline.
    #[inline]
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the number of running handlers when dispatch is bounded.
    #[inline]
    #[must_use]
    pub fn handlers_in_flight(&self) -> Option<usize> {
        self.dispatcher.in_flight()
    }

    /// Reads messages until the transport fails, dispatching each to the handler.
    ///
    /// Blocks the calling task for the life of the connection and returns the
    /// error that ended it. The transport is left open; call
    /// [`close`](Self::close) afterwards.
    ///
    /// Returned errors:
    ///
    /// - [`Error::PeerClosed`] if the peer sent a close frame
    /// - [`Error::ConnectionClosed`] if the stream ended or [`close`](Self::close) was called
    /// - [`Error::Read`] on protocol violations, oversized messages and I/O errors
    /// - [`Error::AlreadyListening`] if the loop was started before
    pub async fn listen_and_respond(self: &Arc<Self>) -> Error {
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            return Error::ConnectionClosed;
        }

        let reader = self.reader.lock().take();
        let Some(mut reader) = reader else {
            if self.is_closed() {
                return Error::ConnectionClosed;
            }
            return Error::AlreadyListening;
        };

        debug!(peer = ?self.peer, "Read loop started");

        loop {
            let next = tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    debug!(peer = ?self.peer, "Read loop stopped by local close");
                    return Error::ConnectionClosed;
                }

                next = reader.next() => next,
            };

            let message = match next {
                Some(Ok(message)) => message,

                Some(Err(e)) => {
                    debug!(peer = ?self.peer, error = %e, "Read failed");
                    return Error::Read(e);
                }

                None => {
                    debug!(peer = ?self.peer, "WebSocket stream ended");
                    return Error::ConnectionClosed;
                }
            };

            match message {
                Message::Text(_) | Message::Binary(_) => {
                    let payload = message.into_data();
                    trace!(len = payload.len(), "Message received");

                    let task = (self.handler)(Arc::clone(self), payload);
                    self.dispatcher.dispatch(task).await;
                }

                Message::Close(frame) => {
                    if self.is_closed() {
                        debug!(peer = ?self.peer, "Close acknowledged by peer");
                        return Error::ConnectionClosed;
                    }

                    let (code, reason) = frame.map_or_else(
                        || (u16::from(CloseCode::Status), String::new()),
                        |frame| (u16::from(frame.code), frame.reason.to_string()),
                    );
                    debug!(peer = ?self.peer, code, %reason, "WebSocket closed by remote");
                    return Error::peer_closed(code, reason);
                }

                // Control frames are answered by tungstenite
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    /// Serializes `response` as JSON and sends it as a text message.
    ///
    /// Safe to call from any number of tasks; sends are serialized through
    /// the write lock in no guaranteed order. Nothing is retried and the
    /// connection is not closed on failure.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if serialization fails
    /// - [`Error::Write`] if the transport write fails or the connection is closed
    /// - [`Error::Timeout`] if the write exceeds the write deadline
    pub async fn send_response<T>(&self, response: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let mut writer = self.writer.lock().await;
        let json = serde_json::to_string(response)?;
        self.write_locked(&mut writer, Message::text(json)).await
    }

    /// Sends a pre-encoded text message.
    ///
    /// # Errors
    ///
    /// Same as [`send_response`](Self::send_response) minus serialization.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        let mut writer = self.writer.lock().await;
        self.write_locked(&mut writer, Message::text(text.into())).await
    }

    /// Sends an opaque binary message.
    ///
    /// # Errors
    ///
    /// Same as [`send_response`](Self::send_response) minus serialization.
    pub async fn send_bytes(&self, payload: impl Into<Bytes>) -> Result<()> {
        let mut writer = self.writer.lock().await;
        self.write_locked(&mut writer, Message::binary(payload)).await
    }

    /// Closes the transport.
    ///
    /// Waits for any in-flight write, then sends a close frame bounded by the
    /// write deadline. Whether or not that succeeds, both halves of the
    /// socket are then dropped and a running read loop returns
    /// [`Error::ConnectionClosed`]. The peer's close reply is not awaited.
    ///
    /// Later writes fail with [`Error::Write`]. Calling close again is
    /// best-effort and reports [`Error::Close`].
    ///
    /// # Errors
    ///
    /// - [`Error::Close`] if sending the close frame fails or the connection was already closed
    /// - [`Error::Timeout`] if sending the close frame exceeds the write deadline
    pub async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        self.closed.store(true, Ordering::Release);

        let Some(mut sink) = writer.take() else {
            return Err(Error::Close(WsError::AlreadyClosed));
        };

        let result = match timeout(self.write_timeout, sink.close()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                debug!(peer = ?self.peer, error = %e, "Close frame failed");
                Err(Error::Close(e))
            }
            Err(_) => Err(Error::timeout("close", self.write_timeout_ms())),
        };

        // The socket is released once both halves are gone.
        drop(sink);
        drop(self.reader.lock().take());
        self.shutdown.send_replace(true);

        debug!(peer = ?self.peer, "Connection closed");
        result
    }
}

// ============================================================================
// Connection - Internal
// ============================================================================

impl Connection {
    /// Writes one message while the caller holds the write lock.
    ///
    /// A write cut off by the deadline may leave a partial frame behind, so
    /// the connection should be closed after a timeout.
    async fn write_locked(
        &self,
        writer: &mut Option<MessageSink>,
        message: Message,
    ) -> Result<()> {
        let Some(writer) = writer.as_mut() else {
            return Err(Error::Write(WsError::AlreadyClosed));
        };
        let len = message.len();

        match timeout(self.write_timeout, writer.send(message)).await {
            Ok(Ok(())) => {
                trace!(len, "Message sent");
                Ok(())
            }
            Ok(Err(e)) => {
                debug!(peer = ?self.peer, error = %e, "Write failed");
                Err(Error::Write(e))
            }
            Err(_) => Err(Error::timeout("send", self.write_timeout_ms())),
        }
    }

    fn write_timeout_ms(&self) -> u64 {
        u64::try_from(self.write_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

// ============================================================================
// Tests
// ============================================================================
