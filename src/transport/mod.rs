//! Duplex transport layer.
//!
//! This module owns the single connection to the companion process.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Client (Rust)  │                              │  Companion      │
//! │                 │   length-delimited frames    │  process        │
//! │  ConnectionLink │◄────────────────────────────►│                 │
//! │  → Dispatcher   │      Unix domain socket      │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ConnectionLink::connect_unix` - Open the socket, state `Connecting`
//! 2. `ConnectionLink::connect` - Send the setup under ID 0
//! 3. Companion answers `ok` - state `Ready`
//! 4. `ConnectionLink::send` - Frames for registered requests
//! 5. `ConnectionLink::close` - Drain, fail leftovers, state `Closed`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `link` | Framed connection and event loop |

// ============================================================================
// Submodules
// ============================================================================

/// Framed duplex connection and event loop.
pub mod link;

// ============================================================================
// Re-exports
// ============================================================================

pub use link::{ConnectionLink, DEFAULT_CLOSE_TIMEOUT};
