//! Request correlation core.
//!
//! Matches every response arriving on the shared connection with the
//! caller that issued the request.
//!
//! # Data Flow
//!
//! ```text
//! register() ──► IdentifierPool ──► id ──┐
//!      │                                 ├──► PendingTable[id] = Completer
//!      └──────► InflightLimiter ─ permit ┘
//!
//! resolve(id, v) ──► PendingTable.remove(id) ──► Completer ──► ResultHandle
//! fail_all(e)    ──► PendingTable.drain()    ──► every handle fails with e
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `dispatcher` | [`CallbackDispatcher`], the only public entry point |
//! | `handle` | [`ResultHandle`] single-assignment result |
//! | `ids` | [`IdentifierPool`] id allocation |
//! | `limiter` | [`InflightLimiter`] and [`AdmissionPolicy`] |
//! | `pending` | Pending table (internal) |
//! | `state` | [`ConnectionState`] |

// ============================================================================
// Submodules
// ============================================================================

/// Callback dispatcher.
pub mod dispatcher;

/// Single-assignment result handles.
pub mod handle;

/// Request identifier allocation.
pub mod ids;

/// Inflight admission control.
pub mod limiter;

/// Pending request table.
mod pending;

/// Connection lifecycle state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use dispatcher::CallbackDispatcher;
pub use handle::ResultHandle;
pub use ids::IdentifierPool;
pub use limiter::{AdmissionPolicy, InflightLimiter, InflightPermit, MAX_INFLIGHT_LIMIT};
pub use state::ConnectionState;
