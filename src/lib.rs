//! WS Dispatch - per-client WebSocket message dispatcher.
//!
//! This library wraps one upgraded WebSocket per client and provides:
//!
//! - a read loop that hands every inbound message to a handler on its own task
//! - JSON sends that are safe to issue from any number of tasks at once
//! - close that never races an in-flight write
//! - bounded resources: capped message size and a write deadline
//!
//! # Quick Start
//!
//! ```no_run
//! use std::net::{IpAddr, Ipv4Addr};
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use ws_dispatch::{Result, Server, message_handler};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let server = Server::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080).await?;
//!
//!     let handler = message_handler(|connection, _payload| async move {
//!         let _ = connection.send_response(&json!({ "type": "pong" })).await;
//!     });
//!
//!     loop {
//!         let connection = server.accept(Arc::clone(&handler)).await?;
//!         tokio::spawn(async move {
//!             let err = connection.listen_and_respond().await;
//!             tracing::debug!(error = %err, "Connection finished");
//!             let _ = connection.close().await;
//!         });
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`transport`] | [`Connection`], dispatch policy, TCP [`Server`] |
//! | [`upgrader`] | [`Upgrader`] factory and [`UpgradeOptions`] |
//!
//! # Resource Limits
//!
//! - Inbound messages over [`MAX_MESSAGE_SIZE`] bytes end the read loop
//! - Each write and close is bounded by [`WRITE_WAIT`]
//! - Handler tasks are unbounded unless [`DispatchMode::Bounded`] is set

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// WebSocket transport layer.
///
/// Connection, handler dispatch and the TCP host.
pub mod transport;

/// Connection factory and configuration.
///
/// Use [`Upgrader::builder()`] to create a configured upgrader.
pub mod upgrader;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Transport types
pub use transport::{Connection, DispatchMode, MessageHandler, Server, message_handler};

// Upgrader types
pub use upgrader::{
    DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, MAX_MESSAGE_SIZE, OriginCheck, UpgradeOptions,
    Upgrader, UpgraderBuilder, WRITE_WAIT,
};
