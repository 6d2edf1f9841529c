//! Connection factory and its configuration.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Upgrader`] | Upgrades requests to [`Connection`](crate::Connection)s |
//! | [`UpgraderBuilder`] | Fluent configuration builder |
//! | [`UpgradeOptions`] | Buffer sizes, message cap, write deadline, dispatch policy |
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ws_dispatch::Upgrader;
//!
//! # fn example() -> ws_dispatch::Result<()> {
//! let upgrader = Upgrader::builder()
//!     .write_timeout(Duration::from_secs(5))
//!     .max_in_flight(128)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for upgrader configuration.
pub mod builder;

/// Core upgrader implementation.
pub mod core;

/// Connection limits.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::UpgraderBuilder;
pub use self::core::{OriginCheck, Upgrader};
pub use options::{
    DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE, MAX_MESSAGE_SIZE, UpgradeOptions, WRITE_WAIT,
};
