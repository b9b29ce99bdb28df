//! Client tuning options.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use duplex_dispatch::{AdmissionPolicy, ClientOptions};
//!
//! let options = ClientOptions::new()
//!     .with_admission_policy(AdmissionPolicy::Block)
//!     .with_inflight_limit(256)
//!     .with_response_timeout(Duration::from_secs(5));
//!
//! assert!(options.validate().is_ok());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::dispatch::{AdmissionPolicy, MAX_INFLIGHT_LIMIT};
use crate::transport::DEFAULT_CLOSE_TIMEOUT;

// ============================================================================
// Constants
// ============================================================================

/// Default inflight ceiling.
pub const DEFAULT_INFLIGHT_LIMIT: usize = 1000;

/// Default time allowed for socket connect plus handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time `Client::execute` waits for a response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ClientOptions
// ============================================================================

/// Client configuration.
///
/// The admission policy has no default and must be chosen explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    /// Maximum number of concurrently pending requests.
    pub inflight_limit: usize,

    /// What happens to a registration at the ceiling.
    pub admission_policy: Option<AdmissionPolicy>,

    /// Socket connect plus handshake deadline.
    pub connect_timeout: Duration,

    /// Per-request wait used by `execute`.
    pub response_timeout: Duration,

    /// How long `close` lets pending requests drain.
    pub close_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options with default limits and no admission policy.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inflight_limit: DEFAULT_INFLIGHT_LIMIT,
            admission_policy: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the inflight ceiling.
    #[inline]
    #[must_use]
    pub const fn with_inflight_limit(mut self, limit: usize) -> Self {
        self.inflight_limit = limit;
        self
    }

    /// Sets the admission policy.
    #[inline]
    #[must_use]
    pub const fn with_admission_policy(mut self, policy: AdmissionPolicy) -> Self {
        self.admission_policy = Some(policy);
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the response timeout.
    #[inline]
    #[must_use]
    pub const fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Sets the close drain timeout. Zero fails pending requests immediately.
    #[inline]
    #[must_use]
    pub const fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientOptions {
    /// Validates the options configuration.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<AdmissionPolicy, String> {
        let policy = self.admission_policy.ok_or_else(|| {
            "Admission policy is required. Use .with_admission_policy() to choose \
             AdmissionPolicy::Block or AdmissionPolicy::Reject."
                .to_string()
        })?;

        if self.inflight_limit == 0 || self.inflight_limit > MAX_INFLIGHT_LIMIT {
            return Err(format!(
                "Inflight limit must be between 1 and {MAX_INFLIGHT_LIMIT}, got {}",
                self.inflight_limit
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be greater than zero".to_string());
        }

        if self.response_timeout.is_zero() {
            return Err("Response timeout must be greater than zero".to_string());
        }

        Ok(policy)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_default() {
        let options = ClientOptions::new();
        assert_eq!(options.inflight_limit, 1000);
        assert!(options.admission_policy.is_none());
        assert_eq!(options.connect_timeout, Duration::from_secs(30));
        assert_eq!(options.close_timeout, DEFAULT_CLOSE_TIMEOUT);
        assert_eq!(options, ClientOptions::default());
    }

    #[test]
    fn test_validate_requires_policy() {
        let err = ClientOptions::new().validate().expect_err("policy missing");
        assert!(err.contains("Admission policy"));
    }

    #[test]
    fn test_validate_returns_policy() {
        let options = ClientOptions::new().with_admission_policy(AdmissionPolicy::Reject);
        assert_eq!(options.validate(), Ok(AdmissionPolicy::Reject));
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let base = ClientOptions::new().with_admission_policy(AdmissionPolicy::Block);
        assert!(base.with_inflight_limit(0).validate().is_err());
        assert!(base.with_inflight_limit(MAX_INFLIGHT_LIMIT + 1).validate().is_err());
        assert!(base.with_inflight_limit(MAX_INFLIGHT_LIMIT).validate().is_ok());
        assert!(base.with_inflight_limit(1).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        let base = ClientOptions::new().with_admission_policy(AdmissionPolicy::Block);
        assert!(base.with_connect_timeout(Duration::ZERO).validate().is_err());
        assert!(base.with_response_timeout(Duration::ZERO).validate().is_err());
        assert!(base.with_close_timeout(Duration::ZERO).validate().is_ok());
    }
}
