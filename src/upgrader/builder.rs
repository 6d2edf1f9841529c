//! Builder pattern for upgrader configuration.
//!
//! Provides a fluent API for configuring and creating [`Upgrader`] instances.
//!
//! # Example
//!
//! ```no_run
//! use ws_dispatch::Upgrader;
//!
//! # fn example() -> ws_dispatch::Result<()> {
//! let upgrader = Upgrader::builder()
//!     .max_message_size(32 * 1024)
//!     .allowed_origins(["https://maps.example.com"])
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_tungstenite::tungstenite::handshake::server::Request;
use tokio_tungstenite::tungstenite::http::header::ORIGIN;

use crate::error::{Error, Result};
use crate::transport::DispatchMode;

use super::core::{OriginCheck, Upgrader};
use super::options::UpgradeOptions;

// ============================================================================
// UpgraderBuilder
// ============================================================================

/// Builder for configuring an [`Upgrader`] instance.
///
/// Use [`Upgrader::builder()`] to create a new builder. Without an explicit
/// origin policy every origin is accepted.
#[derive(Clone, Default)]
pub struct UpgraderBuilder {
    /// Connection limits.
    options: UpgradeOptions,
    /// Origin policy, `None` accepts all origins.
    check_origin: Option<OriginCheck>,
}

impl fmt::Debug for UpgraderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgraderBuilder")
            .field("options", &self.options)
            .field("check_origin", &self.check_origin.is_some())
            .finish()
    }
}

// ============================================================================
// UpgraderBuilder Implementation
// ============================================================================

impl UpgraderBuilder {
    /// Creates a new builder with default limits and a permissive origin policy.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces all limits at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: UpgradeOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the transport read buffer size in bytes.
    #[inline]
    #[must_use]
    pub fn read_buffer_size(mut self, bytes: usize) -> Self {
        self.options.read_buffer_size = bytes;
        self
    }

    /// Sets the transport write buffer size in bytes.
    #[inline]
    #[must_use]
    pub fn write_buffer_size(mut self, bytes: usize) -> Self {
        self.options.write_buffer_size = bytes;
        self
    }

    /// Sets the largest inbound message accepted, in bytes.
    #[inline]
    #[must_use]
    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.options.max_message_size = bytes;
        self
    }

    /// Sets the deadline for each write and close.
    #[inline]
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.options.write_timeout = timeout;
        self
    }

    /// Sets the handler dispatch policy.
    #[inline]
    #[must_use]
    pub fn dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.options.dispatch = dispatch;
        self
    }

    /// Caps concurrently running handlers per connection.
    #[inline]
    #[must_use]
    pub fn max_in_flight(self, limit: usize) -> Self {
        self.dispatch(DispatchMode::Bounded(limit))
    }

    /// Sets the origin policy.
    ///
    /// The predicate sees the full upgrade request. Returning `false`
    /// answers the handshake with `403 Forbidden`.
    #[must_use]
    pub fn check_origin<F>(mut self, check: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.check_origin = Some(Arc::new(check));
        self
    }

    /// Accepts only requests whose `Origin` header matches one of `origins`.
    ///
    /// Requests without an `Origin` header (non-browser clients) are accepted.
    #[must_use]
    pub fn allowed_origins<I, S>(self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: Vec<String> = origins.into_iter().map(Into::into).collect();

        self.check_origin(move |request| match request.headers().get(ORIGIN) {
            Some(origin) => allowed
                .iter()
                .any(|candidate| origin.as_bytes() == candidate.as_bytes()),
            None => true,
        })
    }

    /// Builds the upgrader with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if any limit is zero or a buffer exceeds
    ///   [`MAX_BUFFER_SIZE`](super::MAX_BUFFER_SIZE)
    pub fn build(self) -> Result<Upgrader> {
        self.options.validate().map_err(Error::config)?;

        Ok(Upgrader::with_parts(self.options, self.check_origin))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_tungstenite::tungstenite::http::HeaderValue;

    use crate::upgrader::options::{MAX_MESSAGE_SIZE, WRITE_WAIT};

    fn request_with_origin(origin: Option<&'static str>) -> Request {
        let mut request = Request::new(());
        if let Some(origin) = origin {
            request
                .headers_mut()
                .insert(ORIGIN, HeaderValue::from_static(origin));
        }
        request
    }

    #[test]
    fn test_new_uses_defaults() {
        let builder = UpgraderBuilder::new();
        assert_eq!(builder.options, UpgradeOptions::new());
        assert!(builder.check_origin.is_none());
    }

    #[test]
    fn test_setters_update_options() {
        let builder = UpgraderBuilder::new()
            .read_buffer_size(1024)
            .write_buffer_size(2048)
            .max_message_size(512)
            .write_timeout(Duration::from_secs(2))
            .max_in_flight(4);

        assert_eq!(builder.options.read_buffer_size, 1024);
        assert_eq!(builder.options.write_buffer_size, 2048);
        assert_eq!(builder.options.max_message_size, 512);
        assert_eq!(builder.options.write_timeout, Duration::from_secs(2));
        assert_eq!(builder.options.dispatch, DispatchMode::Bounded(4));
    }

    #[test]
    fn test_build_defaults() {
        let upgrader = UpgraderBuilder::new().build().expect("defaults are valid");
        assert_eq!(upgrader.options().max_message_size, MAX_MESSAGE_SIZE);
        assert_eq!(upgrader.options().write_timeout, WRITE_WAIT);
    }

    #[test]
    fn test_build_rejects_zero_limit() {
        let result = UpgraderBuilder::new().max_message_size(0).build();
        assert!(matches!(result, Err(Error::Config { .. })));

        let result = UpgraderBuilder::new().max_in_flight(0).build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_build_rejects_oversized_buffers() {
        let result = UpgraderBuilder::new().write_buffer_size(usize::MAX).build();
        assert!(matches!(result, Err(Error::Config { .. })));

        let result = UpgraderBuilder::new().read_buffer_size(usize::MAX / 2).build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_allowed_origins() {
        let upgrader = UpgraderBuilder::new()
            .allowed_origins(["https://good.example"])
            .build()
            .expect("valid config");

        assert!(upgrader.origin_allowed(&request_with_origin(Some("https://good.example"))));
        assert!(!upgrader.origin_allowed(&request_with_origin(Some("https://evil.example"))));
        assert!(upgrader.origin_allowed(&request_with_origin(None)));
    }

    #[test]
    fn test_default_policy_accepts_all_origins() {
        let upgrader = UpgraderBuilder::new().build().expect("valid config");
        assert!(upgrader.origin_allowed(&request_with_origin(Some("https://anything.example"))));
    }
}
