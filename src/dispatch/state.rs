//! Connection lifecycle state.
//!
//! ```text
//! Connecting ──handshake ok──► Ready ──close / transport error──► Closing
//!     │                                                             │
//!     └──────────handshake failed──────────► Closed ◄──drained / timeout
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Handshake outstanding; only the handshake request may be registered.
    #[default]
    Connecting,
    /// Ordinary registration permitted.
    Ready,
    /// No new registrations; pending requests may still resolve.
    Closing,
    /// Terminal; every registration fails.
    Closed,
}

impl ConnectionState {
    /// Returns `true` if ordinary requests may be registered.
    #[inline]
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns `true` for `Closing` and `Closed`.
    #[inline]
    #[must_use]
    pub const fn is_shutting_down(&self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }

    /// Returns `true` if the state is terminal.
    #[inline]
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "Connecting",
            Self::Ready => "Ready",
            Self::Closing => "Closing",
            Self::Closed => "Closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_connecting() {
        assert_eq!(ConnectionState::default(), ConnectionState::Connecting);
    }

    #[test]
    fn test_predicates() {
        assert!(ConnectionState::Ready.is_ready());
        assert!(!ConnectionState::Connecting.is_ready());

        assert!(ConnectionState::Closing.is_shutting_down());
        assert!(ConnectionState::Closed.is_shutting_down());
        assert!(!ConnectionState::Ready.is_shutting_down());

        assert!(ConnectionState::Closed.is_closed());
        assert!(!ConnectionState::Closing.is_closed());
    }
}
