//! Connection factory.
//!
//! The [`Upgrader`] turns an inbound HTTP upgrade request into a
//! [`Connection`]. It owns the per-connection limits and the origin policy,
//! so hosts create one and share it instead of relying on process-wide state.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use ws_dispatch::{Upgrader, message_handler};
//!
//! # async fn example() -> ws_dispatch::Result<()> {
//! let upgrader = Upgrader::new();
//! let handler = message_handler(|connection, payload| async move {
//!     let _ = connection.send_response(&payload.len()).await;
//! });
//!
//! let listener = TcpListener::bind("127.0.0.1:8080").await?;
//! let (stream, _) = listener.accept().await?;
//! let connection = upgrader.upgrade_tcp(stream, Arc::clone(&handler)).await?;
//! let err = connection.listen_and_respond().await;
//! let _ = connection.close().await;
//! # drop(err);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::http::header::{ORIGIN, SEC_WEBSOCKET_PROTOCOL};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::transport::{Connection, MessageHandler};

use super::builder::UpgraderBuilder;
use super::options::UpgradeOptions;

// ============================================================================
// Types
// ============================================================================

/// Origin policy callback.
///
/// Receives the upgrade request and returns whether to accept it.
pub type OriginCheck = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

// ============================================================================
// Upgrader
// ============================================================================

/// Upgrades inbound requests to dispatcher connections.
///
/// Cheap to clone; clones share the origin policy.
#[derive(Clone)]
pub struct Upgrader {
    /// Connection limits.
    options: UpgradeOptions,
    /// Origin policy, `None` accepts all origins.
    check_origin: Option<OriginCheck>,
}

impl fmt::Debug for Upgrader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upgrader")
            .field("options", &self.options)
            .field("check_origin", &self.check_origin.is_some())
            .finish()
    }
}

impl Default for Upgrader {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Upgrader - Public API
// ============================================================================

impl Upgrader {
    /// Creates an upgrader with default limits that accepts every origin.
    ///
    /// Accepting all origins lets any web page open a connection. Use
    /// [`UpgraderBuilder::check_origin`] when serving untrusted browsers.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_parts(UpgradeOptions::new(), None)
    }

    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> UpgraderBuilder {
        UpgraderBuilder::new()
    }

    /// Returns the configured limits.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &UpgradeOptions {
        &self.options
    }

    /// Upgrades a raw stream carrying an HTTP upgrade request.
    ///
    /// Reads the request, applies the origin policy, echoes any requested
    /// `Sec-WebSocket-Protocol` value and completes the handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::Upgrade`] if the handshake fails or the origin is rejected
    pub async fn upgrade<S>(&self, stream: S, handler: MessageHandler) -> Result<Arc<Connection>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        self.upgrade_inner(stream, None, handler).await
    }

    /// Upgrades an accepted TCP stream, recording the peer address.
    ///
    /// # Errors
    ///
    /// - [`Error::Upgrade`] if the handshake fails or the origin is rejected
    pub async fn upgrade_tcp(
        &self,
        stream: TcpStream,
        handler: MessageHandler,
    ) -> Result<Arc<Connection>> {
        let peer = stream.peer_addr().ok();
        self.upgrade_inner(stream, peer, handler).await
    }
}

// ============================================================================
// Upgrader - Internal
// ============================================================================

impl Upgrader {
    /// Creates an upgrader from validated parts.
    pub(crate) fn with_parts(options: UpgradeOptions, check_origin: Option<OriginCheck>) -> Self {
        Self {
            options,
            check_origin,
        }
    }

    /// Applies the origin policy to a request.
    pub(crate) fn origin_allowed(&self, request: &Request) -> bool {
        self.check_origin
            .as_ref()
            .is_none_or(|check| check(request))
    }

    /// Runs the server handshake and wraps the resulting stream.
    async fn upgrade_inner<S>(
        &self,
        stream: S,
        peer: Option<SocketAddr>,
        handler: MessageHandler,
    ) -> Result<Arc<Connection>>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut subprotocol: Option<String> = None;

        let negotiate = |request: &Request, mut response: Response| {
            if !self.origin_allowed(request) {
                let origin = request
                    .headers()
                    .get(ORIGIN)
                    .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
                warn!(?peer, ?origin, "Rejected upgrade from disallowed origin");
                return Err(forbidden());
            }

            if let Some(protocol) = request.headers().get(SEC_WEBSOCKET_PROTOCOL)
                && !protocol.is_empty()
            {
                response
                    .headers_mut()
                    .insert(SEC_WEBSOCKET_PROTOCOL, protocol.clone());
                subprotocol = Some(String::from_utf8_lossy(protocol.as_bytes()).into_owned());
            }

            Ok(response)
        };

        let ws_stream = accept_hdr_async_with_config(
            stream,
            negotiate,
            Some(self.options.to_websocket_config()),
        )
        .await
        .map_err(|e| Error::upgrade(format!("WebSocket upgrade failed: {e}")))?;

        info!(?peer, ?subprotocol, "WebSocket connection established");

        let connection = Connection::new(ws_stream, handler, &self.options, subprotocol, peer);
        debug!(
            max_message_size = self.options.max_message_size,
            "Connection ready"
        );

        Ok(connection)
    }
}

/// Handshake response for a rejected origin.
fn forbidden() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("Origin not allowed".to_string()));
    *response.status_mut() = StatusCode::FORBIDDEN;
    response
}

// ============================================================================
// Tests
// ============================================================================
