//! Error types for the WebSocket dispatcher.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use ws_dispatch::{Connection, Result};
//!
//! async fn reply(connection: &Connection) -> Result<()> {
//!     connection.send_response(&serde_json::json!({ "type": "pong" })).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Upgrade | [`Error::Upgrade`] |
//! | Read | [`Error::Read`], [`Error::PeerClosed`], [`Error::ConnectionClosed`], [`Error::AlreadyListening`] |
//! | Write | [`Error::Write`], [`Error::Json`], [`Error::Timeout`] |
//! | Close | [`Error::Close`] |
//! | External | [`Error::Io`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::error::ProtocolError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Every connection-level failure is returned to the immediate caller of the
/// failing operation. Nothing here is retried internally.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when upgrader options are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Upgrade Errors
    // ========================================================================
    /// The HTTP to WebSocket upgrade failed.
    ///
    /// No connection was created. Covers malformed handshakes, rejected
    /// origins and I/O failures during negotiation.
    #[error("Upgrade failed: {message}")]
    Upgrade {
        /// Underlying negotiation failure.
        message: String,
    },

    // ========================================================================
    // Read Errors
    // ========================================================================
    /// Reading from the transport failed.
    ///
    /// Includes protocol violations and oversized messages.
    #[error("Read failed: {0}")]
    Read(#[source] WsError),

    /// The peer sent a close frame.
    #[error("Connection closed by peer: code={code}, reason={reason}")]
    PeerClosed {
        /// Close code sent by the peer (1005 when none was given).
        code: u16,
        /// Close reason sent by the peer.
        reason: String,
    },

    /// The transport ended or was closed locally.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The read loop was already started for this connection.
    #[error("Connection is already being listened on")]
    AlreadyListening,

    // ========================================================================
    // Write Errors
    // ========================================================================
    /// Writing to the transport failed.
    ///
    /// Also returned for writes attempted after the connection was closed.
    #[error("Write failed: {0}")]
    Write(#[source] WsError),

    /// Operation timeout.
    ///
    /// Returned when a write or close exceeds the write deadline.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Close Errors
    // ========================================================================
    /// Closing the transport failed.
    #[error("Close failed: {0}")]
    Close(#[source] WsError),

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an upgrade error.
    #[inline]
    pub fn upgrade(message: impl Into<String>) -> Self {
        Self::Upgrade {
            message: message.into(),
        }
    }

    /// Creates a peer closed error.
    #[inline]
    pub fn peer_closed(code: u16, reason: impl Into<String>) -> Self {
        Self::PeerClosed {
            code,
            reason: reason.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this error terminated a read loop.
    #[inline]
    #[must_use]
    pub fn is_read_error(&self) -> bool {
        matches!(
            self,
            Self::Read(_) | Self::PeerClosed { .. } | Self::ConnectionClosed | Self::AlreadyListening
        )
    }

    /// Returns `true` if this error came from a send.
    #[inline]
    #[must_use]
    pub fn is_write_error(&self) -> bool {
        matches!(self, Self::Write(_) | Self::Json(_) | Self::Timeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Upgrade { .. }
                | Self::Read(_)
                | Self::PeerClosed { .. }
                | Self::ConnectionClosed
                | Self::Write(_)
                | Self::Close(_)
                | Self::Io(_)
        )
    }

    /// Returns `true` if an inbound message exceeded the size limit.
    #[inline]
    #[must_use]
    pub fn is_message_too_large(&self) -> bool {
        matches!(self, Self::Read(WsError::Capacity(_)))
    }

    /// Returns `true` if the error means the transport is gone.
    ///
    /// Covers peer close, local close and writes attempted after close.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self {
            Self::PeerClosed { .. } | Self::ConnectionClosed => true,
            Self::Read(e) | Self::Write(e) | Self::Close(e) => matches!(
                e,
                WsError::ConnectionClosed
                    | WsError::AlreadyClosed
                    | WsError::Protocol(
                        ProtocolError::SendAfterClosing | ProtocolError::ResetWithoutClosingHandshake
                    )
            ),
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
