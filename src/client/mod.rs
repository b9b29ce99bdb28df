//! Client entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Submits requests and hands out result handles |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`ClientOptions`] | Limits and timeouts |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

/// Client limits and timeouts.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::Client;
pub use options::{
    ClientOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_INFLIGHT_LIMIT, DEFAULT_RESPONSE_TIMEOUT,
};
