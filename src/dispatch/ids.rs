//! Request identifier allocation.
//!
//! Identifiers come from a monotonically increasing counter plus a free
//! list of released values. Released identifiers are reissued first, so
//! the counter only grows while the number of outstanding requests grows.
//! The inflight ceiling keeps that number below the addressable space.

// ============================================================================
// Imports
// ============================================================================

use crate::identifiers::RequestId;

// ============================================================================
// IdentifierPool
// ============================================================================

/// Issues and reclaims unique request identifiers.
///
/// Never returns [`RequestId::HANDSHAKE`]. Not synchronized on its own;
/// the dispatcher keeps it behind the same lock as the pending table.
#[derive(Debug)]
pub struct IdentifierPool {
    /// Next never-issued value.
    next: u32,
    /// Released identifiers, reused LIFO.
    free: Vec<u32>,
    /// Number of identifiers currently checked out.
    outstanding: usize,
}

impl Default for IdentifierPool {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierPool {
    /// Creates an empty pool.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: 1,
            free: Vec::new(),
            outstanding: 0,
        }
    }

    /// Checks out an identifier.
    pub fn acquire(&mut self) -> RequestId {
        self.outstanding += 1;

        if let Some(value) = self.free.pop() {
            return RequestId::new(value);
        }

        let value = self.next;
        // Skip 0 on wraparound; unreachable while the ceiling holds.
        self.next = self.next.checked_add(1).unwrap_or(1);
        RequestId::new(value)
    }

    /// Returns an identifier to the pool.
    pub fn release(&mut self, id: RequestId) {
        if id.is_handshake() {
            return;
        }
        self.outstanding = self.outstanding.saturating_sub(1);
        self.free.push(id.as_u32());
    }

    /// Returns the number of identifiers currently checked out.
    #[inline]
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Returns the highest identifier ever issued.
    #[inline]
    #[must_use]
    pub fn high_water(&self) -> u32 {
        self.next - 1
    }
}

// ============================================================================
// Tests
// ============================================================================
