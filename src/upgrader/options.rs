//! Upgrade and connection limits.
//!
//! Provides a type-safe interface for the per-connection resource bounds
//! applied when a request is upgraded: buffer sizes, the inbound message
//! cap, the write deadline and the handler dispatch policy.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use ws_dispatch::{DispatchMode, UpgradeOptions};
//!
//! let options = UpgradeOptions::new()
//!     .with_max_message_size(16 * 1024)
//!     .with_write_timeout(Duration::from_secs(5))
//!     .with_dispatch(DispatchMode::Bounded(64));
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::transport::DispatchMode;

// ============================================================================
// Constants
// ============================================================================

/// Maximum inbound message size in bytes (256 * 256).
pub const MAX_MESSAGE_SIZE: usize = 256 * 256;

/// Deadline for a single write or close.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Default transport read and write buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = MAX_MESSAGE_SIZE;

/// Largest accepted transport buffer size (16 MiB).
///
/// The read buffer is allocated up front for every connection.
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

// ============================================================================
// UpgradeOptions
// ============================================================================

/// Per-connection resource bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeOptions {
    /// Transport read buffer size in bytes.
    pub read_buffer_size: usize,

    /// Transport write buffer size in bytes.
    pub write_buffer_size: usize,

    /// Largest inbound message (and frame) accepted, in bytes.
    pub max_message_size: usize,

    /// Deadline applied to each write and to close.
    pub write_timeout: Duration,

    /// Handler scheduling policy.
    pub dispatch: DispatchMode,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl UpgradeOptions {
    /// Creates options with the default limits.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            write_buffer_size: DEFAULT_BUFFER_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
            write_timeout: WRITE_WAIT,
            dispatch: DispatchMode::Unbounded,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl UpgradeOptions {
    /// Sets the transport read buffer size.
    #[inline]
    #[must_use]
    pub const fn with_read_buffer_size(mut self, bytes: usize) -> Self {
        self.read_buffer_size = bytes;
        self
    }

    /// Sets the transport write buffer size.
    #[inline]
    #[must_use]
    pub const fn with_write_buffer_size(mut self, bytes: usize) -> Self {
        self.write_buffer_size = bytes;
        self
    }

    /// Sets the inbound message size limit.
    #[inline]
    #[must_use]
    pub const fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }

    /// Sets the write deadline.
    #[inline]
    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the handler dispatch policy.
    #[inline]
    #[must_use]
    pub const fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl UpgradeOptions {
    /// Converts the options to a tungstenite transport configuration.
    ///
    /// The message cap is applied to single frames as well, so an oversized
    /// frame is rejected before its payload is buffered.
    #[must_use]
    pub fn to_websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.read_buffer_size = self.read_buffer_size;
        config.write_buffer_size = self.write_buffer_size;
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);
        config
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.read_buffer_size == 0 || self.write_buffer_size == 0 {
            return Err("Buffer sizes must be greater than zero".to_string());
        }

        if self.read_buffer_size > MAX_BUFFER_SIZE || self.write_buffer_size > MAX_BUFFER_SIZE {
            return Err(format!("Buffer sizes must not exceed {MAX_BUFFER_SIZE} bytes"));
        }

        // tungstenite requires the write buffer to stay below its hard cap.
        if self.write_buffer_size >= WebSocketConfig::default().max_write_buffer_size {
            return Err("Write buffer size must be below the transport write limit".to_string());
        }

        if self.max_message_size == 0 {
            return Err("Maximum message size must be greater than zero".to_string());
        }

        if self.write_timeout.is_zero() {
            return Err("Write timeout must be greater than zero".to_string());
        }

        if self.dispatch == DispatchMode::Bounded(0) {
            return Err("Bounded dispatch needs at least one slot".to_string());
        }

        Ok(())
    }

    /// Returns the write timeout in milliseconds.
    #[inline]
    #[must_use]
    pub fn write_timeout_ms(&self) -> u64 {
        u64::try_from(self.write_timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_constants() {
        assert_eq!(MAX_MESSAGE_SIZE, 65_536);
        assert_eq!(WRITE_WAIT.as_secs(), 10);
        assert_eq!(DEFAULT_BUFFER_SIZE, MAX_MESSAGE_SIZE);
        assert!(MAX_BUFFER_SIZE < WebSocketConfig::default().max_write_buffer_size);
    }

    #[test]
    fn test_new_matches_default() {
        assert_eq!(UpgradeOptions::new(), UpgradeOptions::default());
        assert_eq!(UpgradeOptions::new().dispatch, DispatchMode::Unbounded);
    }

    #[test]
    fn test_builder_methods() {
        let options = UpgradeOptions::new()
            .with_read_buffer_size(1024)
            .with_write_buffer_size(2048)
            .with_max_message_size(4096)
            .with_write_timeout(Duration::from_millis(250))
            .with_dispatch(DispatchMode::Bounded(8));

        assert_eq!(options.read_buffer_size, 1024);
        assert_eq!(options.write_buffer_size, 2048);
        assert_eq!(options.max_message_size, 4096);
        assert_eq!(options.write_timeout_ms(), 250);
        assert_eq!(options.dispatch, DispatchMode::Bounded(8));
    }

    #[test]
    fn test_websocket_config() {
        let config = UpgradeOptions::new().to_websocket_config();
        assert_eq!(config.max_message_size, Some(MAX_MESSAGE_SIZE));
        assert_eq!(config.max_frame_size, Some(MAX_MESSAGE_SIZE));
        assert_eq!(config.read_buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(config.write_buffer_size, DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(UpgradeOptions::new().validate().is_ok());
        assert!(
            UpgradeOptions::new()
                .with_max_message_size(0)
                .validate()
                .is_err()
        );
        assert!(
            UpgradeOptions::new()
                .with_read_buffer_size(0)
                .validate()
                .is_err()
        );
        assert!(
            UpgradeOptions::new()
                .with_write_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            UpgradeOptions::new()
                .with_dispatch(DispatchMode::Bounded(0))
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_validate_rejects_oversized_buffers() {
        assert!(
            UpgradeOptions::new()
                .with_write_buffer_size(usize::MAX)
                .validate()
                .is_err()
        );
        assert!(
            UpgradeOptions::new()
                .with_read_buffer_size(usize::MAX / 2)
                .validate()
                .is_err()
        );
        assert!(
            UpgradeOptions::new()
                .with_read_buffer_size(MAX_BUFFER_SIZE + 1)
                .validate()
                .is_err()
        );
        assert!(
            UpgradeOptions::new()
                .with_read_buffer_size(MAX_BUFFER_SIZE)
                .with_write_buffer_size(MAX_BUFFER_SIZE)
                .validate()
                .is_ok()
        );
    }

    proptest! {
        #[test]
        fn prop_positive_limits_validate(
            read in 1usize..1 << 20,
            write in 1usize..1 << 20,
            max in 1usize..1 << 24,
            timeout_ms in 1u64..60_000,
            slots in 1usize..1024,
        ) {
            let options = UpgradeOptions::new()
                .with_read_buffer_size(read)
                .with_write_buffer_size(write)
                .with_max_message_size(max)
                .with_write_timeout(Duration::from_millis(timeout_ms))
                .with_dispatch(DispatchMode::Bounded(slots));

            prop_assert!(options.validate().is_ok());
            prop_assert_eq!(options.to_websocket_config().max_message_size, Some(max));
        }
    }
}
