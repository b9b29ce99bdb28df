//! Wire protocol types.
//!
//! This module defines the messages exchanged with the companion process
//! and the codec boundary that turns them into frames.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Payload::Connect` | Local → Companion | Handshake, always ID 0 |
//! | `Payload::Command` | Local → Companion | Single command |
//! | `Payload::Transaction` | Local → Companion | Batch, one aggregate response |
//! | `Response` | Companion → Local | Outcome for one ID |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | [`Codec`] trait and [`JsonCodec`] |
//! | `request` | Outbound payloads |
//! | `response` | Inbound responses and [`Reply`] |

// ============================================================================
// Submodules
// ============================================================================

/// Frame payload codec.
pub mod codec;

/// Outbound payload types.
pub mod request;

/// Inbound response types.
pub mod response;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{Codec, JsonCodec};
pub use request::{Command, ConnectionRequest, NodeAddress, Payload, RequestType, Transaction};
pub use response::{Reply, RequestErrorKind, Response, ResponseBody};
