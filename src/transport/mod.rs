//! WebSocket transport layer.
//!
//! This module holds the per-client connection, the handler dispatch policy
//! and a small TCP host.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Peer           │         WebSocket            │  Connection     │
//! │  (browser,      │─────── text / binary ───────►│  read loop ──┐  │
//! │   service)      │                              │              ▼  │
//! │                 │◄────── JSON responses ───────│  write lock ◄─ handler tasks
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Upgrader::upgrade` - Complete the HTTP upgrade handshake
//! 2. `Connection::listen_and_respond` - Dispatch messages until the transport fails
//! 3. `Connection::send_response` - Called from handler tasks, serialized by the write lock
//! 4. `Connection::close` - Tear down the transport once the loop has returned
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Connection, read loop, synchronized writes |
//! | `dispatch` | Handler spawn policy |
//! | `server` | TCP listener feeding an upgrader |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and read loop.
pub mod connection;

/// Handler dispatch policy.
pub mod dispatch;

/// TCP listener for dispatcher connections.
pub mod server;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, MessageHandler, message_handler};
pub use dispatch::DispatchMode;
pub use server::Server;
