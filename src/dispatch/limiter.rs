//! Inflight request admission control.
//!
//! Counts outstanding ordinary requests against a configured ceiling. Each
//! admitted request holds an [`InflightPermit`]; dropping the permit frees
//! the slot, so the count can never drift from the pending table.
//!
//! # Policies
//!
//! | Policy | At ceiling |
//! |--------|-----------|
//! | [`AdmissionPolicy::Block`] | Caller waits until a slot frees |
//! | [`AdmissionPolicy::Reject`] | Caller gets [`Error::AdmissionRejected`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Largest accepted ceiling.
///
/// Bounded by the tokio semaphore permit limit and kept well below the
/// `u32` identifier space.
pub const MAX_INFLIGHT_LIMIT: usize = 1 << 24;

// ============================================================================
// AdmissionPolicy
// ============================================================================

/// What happens to a registration attempt once the ceiling is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionPolicy {
    /// Suspend the caller until a slot frees.
    Block,
    /// Fail immediately with [`Error::AdmissionRejected`].
    Reject,
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block => f.write_str("block"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

// ============================================================================
// InflightPermit
// ============================================================================

/// One admitted request's slot. Released on drop.
#[derive(Debug)]
pub struct InflightPermit {
    _permit: OwnedSemaphorePermit,
}

// ============================================================================
// InflightLimiter
// ============================================================================

/// Admission control for ordinary requests.
#[derive(Debug)]
pub struct InflightLimiter {
    /// One permit per free slot.
    semaphore: Arc<Semaphore>,
    /// Configured ceiling.
    ceiling: usize,
    /// Behaviour at the ceiling.
    policy: AdmissionPolicy,
}

impl InflightLimiter {
    /// Creates a limiter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `ceiling` is zero or above
    /// [`MAX_INFLIGHT_LIMIT`].
    pub fn new(ceiling: usize, policy: AdmissionPolicy) -> Result<Self> {
        if ceiling == 0 || ceiling > MAX_INFLIGHT_LIMIT {
            return Err(Error::config(format!(
                "inflight limit must be in 1..={MAX_INFLIGHT_LIMIT}, got {ceiling}"
            )));
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(ceiling)),
            ceiling,
            policy,
        })
    }

    /// Returns the configured ceiling.
    #[inline]
    #[must_use]
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Returns the configured policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Returns the number of admitted requests.
    #[inline]
    #[must_use]
    pub fn inflight(&self) -> usize {
        self.ceiling - self.semaphore.available_permits()
    }

    /// Admits one request according to the policy.
    ///
    /// # Errors
    ///
    /// - [`Error::AdmissionRejected`] at the ceiling under `Reject`
    /// - [`Error::Closing`] once the limiter is closed
    pub async fn admit(&self) -> Result<InflightPermit> {
        match self.policy {
            AdmissionPolicy::Reject => self.try_admit(),
            AdmissionPolicy::Block => {
                let permit = Arc::clone(&self.semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::closing("inflight limiter closed"))?;
                Ok(InflightPermit { _permit: permit })
            }
        }
    }

    /// Admits one request without waiting, regardless of policy.
    ///
    /// # Errors
    ///
    /// - [`Error::AdmissionRejected`] at the ceiling
    /// - [`Error::Closing`] once the limiter is closed
    pub fn try_admit(&self) -> Result<InflightPermit> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(InflightPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => {
                trace!(ceiling = self.ceiling, "Inflight ceiling reached");
                Err(Error::admission_rejected(self.inflight(), self.ceiling))
            }
            Err(TryAcquireError::Closed) => Err(Error::closing("inflight limiter closed")),
        }
    }

    /// Closes the limiter, waking every blocked caller with an error.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Returns `true` once [`close`](Self::close) was called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================
