//! Error types for the dispatch core.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use duplex_dispatch::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let reply = client.custom_command(["PING"]).await?;
//!     println!("{reply:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Admission | [`Error::AdmissionRejected`], [`Error::NotReady`] |
//! | Connection | [`Error::HandshakeFailed`], [`Error::Closing`], [`Error::ConnectionTimeout`], [`Error::Io`] |
//! | Codec | [`Error::Decode`], [`Error::Encode`] |
//! | Request | [`Error::Request`], [`Error::ResponseTimeout`] |
//!
//! Connection-wide errors are broadcast to every pending request when the
//! connection dies, so [`Error`] is `Clone`.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::dispatch::ConnectionState;
use crate::identifiers::RequestId;
use crate::protocol::RequestErrorKind;

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
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Admission Errors
    // ========================================================================
    /// Registration refused because the inflight ceiling is reached.
    ///
    /// Only returned under [`AdmissionPolicy::Reject`](crate::AdmissionPolicy::Reject).
    #[error("Admission rejected: {inflight}/{ceiling} requests in flight")]
    AdmissionRejected {
        /// Requests outstanding when the attempt was made.
        inflight: usize,
        /// Configured ceiling.
        ceiling: usize,
    },

    /// Ordinary registration attempted before the handshake completed.
    #[error("Connection not ready: {state}")]
    NotReady {
        /// State observed at registration time.
        state: ConnectionState,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// The setup request failed or returned an unexpected result.
    ///
    /// Terminal for the connection.
    #[error("Handshake failed: {message}")]
    HandshakeFailed {
        /// Description of the handshake failure.
        message: String,
    },

    /// The connection is closing or closed.
    ///
    /// Every request drained by a close receives this error, and so does
    /// every operation attempted afterwards.
    #[error("Connection closed: {message}")]
    Closing {
        /// Why the connection closed.
        message: String,
    },

    /// Connection timeout waiting for the handshake.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Codec Errors
    // ========================================================================
    /// An inbound frame could not be decoded.
    ///
    /// Treated as a transport fault.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    /// An outbound payload could not be serialized.
    #[error("Encode error: {message}")]
    Encode {
        /// Description of the encode failure.
        message: String,
    },

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// The backend reported an error for this specific request.
    #[error("Request failed ({kind}): {message}")]
    Request {
        /// Error category reported by the backend.
        kind: RequestErrorKind,
        /// Error message from the backend.
        message: String,
    },

    /// The caller stopped waiting for a response.
    ///
    /// The request itself stays registered; a late response still settles it.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    ResponseTimeout {
        /// The request ID that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(Arc<IoError>),
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Self {
        Self::Io(Arc::new(err))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Converts a duration to whole milliseconds for error fields, saturating.
#[inline]
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
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

    /// Creates an admission rejected error.
    #[inline]
    pub fn admission_rejected(inflight: usize, ceiling: usize) -> Self {
        Self::AdmissionRejected { inflight, ceiling }
    }

    /// Creates a not ready error.
    #[inline]
    pub fn not_ready(state: ConnectionState) -> Self {
        Self::NotReady { state }
    }

    /// Creates a handshake failed error.
    #[inline]
    pub fn handshake_failed(message: impl Into<String>) -> Self {
        Self::HandshakeFailed {
            message: message.into(),
        }
    }

    /// Creates a closing error.
    #[inline]
    pub fn closing(message: impl Into<String>) -> Self {
        Self::Closing {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a decode error.
    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates an encode error.
    #[inline]
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Creates a backend request error.
    #[inline]
    pub fn request(kind: RequestErrorKind, message: impl Into<String>) -> Self {
        Self::Request {
            kind,
            message: message.into(),
        }
    }

    /// Creates a response timeout error.
    #[inline]
    pub fn response_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::ResponseTimeout {
            request_id,
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    ///
    /// Includes backend-reported timeouts.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::ResponseTimeout { .. }
                | Self::Request {
                    kind: RequestErrorKind::Timeout,
                    ..
                }
        )
    }

    /// Returns `true` if this error means the whole connection is gone.
    ///
    /// Connection errors are broadcast to every pending request and poison
    /// all later submissions. Anything else concerns a single request.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::HandshakeFailed { .. }
                | Self::Closing { .. }
                | Self::ConnectionTimeout { .. }
                | Self::Decode { .. }
                | Self::Io(_)
        )
    }

    /// Returns `true` if this is a closing error.
    #[inline]
    #[must_use]
    pub fn is_closing(&self) -> bool {
        matches!(self, Self::Closing { .. })
    }

    /// Returns `true` if this error may succeed on retry.
    ///
    /// Retrying is always left to the caller.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AdmissionRejected { .. }
                | Self::ResponseTimeout { .. }
                | Self::Request {
                    kind: RequestErrorKind::Timeout | RequestErrorKind::Disconnect,
                    ..
                }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
