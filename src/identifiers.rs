//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing request identifiers with other integers
//! at compile time.
//!
//! # Request IDs
//!
//! | Value | Meaning |
//! |-------|---------|
//! | `0` | Reserved for the connection handshake |
//! | `1..` | Ordinary requests, recycled after completion |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// RequestId
// ============================================================================

/// Identifier correlating one outstanding request with its response.
///
/// Unique among currently outstanding requests. Identifiers are recycled
/// once a request completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u32);

impl RequestId {
    /// Identifier reserved for the connection handshake.
    pub const HANDSHAKE: Self = Self(0);

    /// Creates a request ID from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns `true` if this is the handshake identifier.
    #[inline]
    #[must_use]
    pub const fn is_handshake(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for RequestId {
    #[inline]
    fn from(value: u32) -> Self {
        Self(value)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_is_zero() {
        assert_eq!(RequestId::HANDSHAKE.as_u32(), 0);
        assert!(RequestId::HANDSHAKE.is_handshake());
        assert!(!RequestId::new(1).is_handshake());
    }

    #[test]
    fn test_display() {
        assert_eq!(RequestId::new(42).to_string(), "42");
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&RequestId::new(7)).expect("serialize");
        assert_eq!(json, "7");

        let id: RequestId = serde_json::from_str("9").expect("deserialize");
        assert_eq!(id, RequestId::new(9));
    }
}
