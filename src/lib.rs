//! Duplex Dispatch - request correlation over one duplex connection.
//!
//! This library lets many concurrent callers share a single connection to
//! a local companion process. Every request is tagged with a numeric ID;
//! responses come back in any order and are matched to their caller by
//! that ID.
//!
//! # Architecture
//!
//! ```text
//! Client ──► CallbackDispatcher ──► ConnectionLink ──► companion process
//!   ▲              │                      │
//!   └── ResultHandle ◄── resolve(id) ◄────┘
//! ```
//!
//! Key design principles:
//!
//! - A request is registered before its frame is written, so a response can
//!   never arrive for an unknown caller
//! - Every handle settles exactly once: with a reply, a per-request error,
//!   or the connection's closing error
//! - The number of pending requests is bounded; callers either wait or are
//!   rejected at the ceiling
//! - Closing is idempotent and fails everything still pending
//!
//! # Quick Start
//!
//! ```no_run
//! use duplex_dispatch::{AdmissionPolicy, Client, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .endpoint("/tmp/companion.sock")
//!         .admission_policy(AdmissionPolicy::Block)
//!         .address("localhost", 6379)
//!         .connect()
//!         .await?;
//!
//!     let reply = client.custom_command(["PING"]).await?;
//!     assert!(reply.is_ok());
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | [`Client`], [`ClientBuilder`], [`ClientOptions`] |
//! | [`dispatch`] | Correlation core: IDs, pending table, admission |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | [`RequestId`] |
//! | [`protocol`] | Payload and response types, codec |
//! | [`transport`] | Framed connection and event loop |

// ============================================================================
// Modules
// ============================================================================

/// Client entry point.
///
/// Use [`Client::builder()`] to connect.
pub mod client;

/// Request correlation core.
pub mod dispatch;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe request identifiers.
pub mod identifiers;

/// Wire protocol message types.
pub mod protocol;

/// Duplex transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::{Client, ClientBuilder, ClientOptions};

// Dispatch types
pub use dispatch::{AdmissionPolicy, CallbackDispatcher, ConnectionState, ResultHandle};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::RequestId;

// Protocol types
pub use protocol::{
    Codec, Command, ConnectionRequest, JsonCodec, NodeAddress, Payload, Reply, RequestErrorKind,
    RequestType, Transaction,
};

// Transport types
pub use transport::ConnectionLink;
