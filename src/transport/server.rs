//! TCP listener that hands accepted sockets to an [`Upgrader`].
//!
//! A minimal host for dispatcher connections. Applications with their own
//! HTTP stack can skip it and call [`Upgrader::upgrade`] directly.
//!
//! # Connection Flow
//!
//! 1. Bind to an address (`port` 0 picks a free port)
//! 2. `accept` waits for a TCP connection and runs the upgrade handshake
//! 3. The caller drives [`Connection::listen_and_respond`] and closes the
//!    connection when it returns

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::debug;

use crate::error::Result;
use crate::upgrader::Upgrader;

use super::connection::{Connection, MessageHandler};

// ============================================================================
// Server
// ============================================================================

/// A bound WebSocket listener.
///
/// # Example
///
/// ```ignore
/// use std::net::{IpAddr, Ipv4Addr};
/// use ws_dispatch::transport::Server;
///
/// let server = Server::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
/// println!("listening on {}", server.ws_url());
///
/// loop {
///     let connection = server.accept(Arc::clone(&handler)).await?;
///     tokio::spawn(async move {
///         let err = connection.listen_and_respond().await;
///         tracing::debug!(error = %err, "connection finished");
///         let _ = connection.close().await;
///     });
/// }
/// ```
#[derive(Debug)]
pub struct Server {
    /// TCP listener for incoming connections.
    listener: TcpListener,
    /// Port the server is bound to.
    port: u16,
    /// Factory applied to every accepted socket.
    upgrader: Upgrader,
}

impl Server {
    /// Binds a listener with a default [`Upgrader`].
    ///
    /// Use port 0 to let the OS assign a random available port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        Self::bind_with(ip, port, Upgrader::new()).await
    }

    /// Binds a listener that upgrades with `upgrader`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if binding fails.
    pub async fn bind_with(ip: IpAddr, port: u16, upgrader: Upgrader) -> Result<Self> {
        let addr = SocketAddr::new(ip, port);
        let listener = TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        debug!(port = actual_port, "WebSocket server bound");

        Ok(Self {
            listener,
            port: actual_port,
            upgrader,
        })
    }

    /// Returns the port the server is bound to.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the local socket address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the socket is gone.
    #[inline]
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the WebSocket URL for this server.
    ///
    /// Format: `ws://{ip}:{port}`
    #[must_use]
    pub fn ws_url(&self) -> String {
        match self.listener.local_addr() {
            Ok(addr) => format!("ws://{addr}"),
            Err(_) => format!("ws://127.0.0.1:{}", self.port),
        }
    }

    /// Returns the upgrader applied to accepted sockets.
    #[inline]
    #[must_use]
    pub fn upgrader(&self) -> &Upgrader {
        &self.upgrader
    }

    /// Accepts one client and upgrades it.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`](crate::Error::Io) if accepting the socket fails
    /// - [`Error::Upgrade`](crate::Error::Upgrade) if the handshake fails
    pub async fn accept(&self, handler: MessageHandler) -> Result<Arc<Connection>> {
        let (stream, addr) = self.listener.accept().await?;

        debug!(?addr, "TCP connection accepted");

        self.upgrader.upgrade_tcp(stream, handler).await
    }
}

// ============================================================================
// Tests
// ============================================================================
