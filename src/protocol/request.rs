//! Outbound payload types.
//!
//! The dispatch core treats payloads as opaque; these types only exist so
//! the codec has something concrete to serialize. Command catalogues are
//! built on top of [`Command`] by higher layers.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

// ============================================================================
// Payload
// ============================================================================

/// Anything that travels to the companion process under a request ID.
///
/// # Format
///
/// ```json
/// { "kind": "command", "requestType": "get", "args": ["key"] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Payload {
    /// Connection setup, always sent under the handshake ID.
    Connect(ConnectionRequest),
    /// A single command.
    Command(Command),
    /// A batch executed atomically, answered with one aggregate response.
    Transaction(Transaction),
}

impl From<ConnectionRequest> for Payload {
    fn from(request: ConnectionRequest) -> Self {
        Self::Connect(request)
    }
}

impl From<Command> for Payload {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}

impl From<Transaction> for Payload {
    fn from(transaction: Transaction) -> Self {
        Self::Transaction(transaction)
    }
}

// ============================================================================
// Command
// ============================================================================

/// Backend command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestType {
    /// Arbitrary command; the name is the first argument.
    CustomCommand,
    /// `PING`, checks liveness.
    Ping,
    /// `INFO`, reads server statistics.
    Info,
    /// `GET key`.
    Get,
    /// `SET key value`.
    Set,
}

/// One command with its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Command kind.
    pub request_type: RequestType,
    /// Command arguments.
    pub args: Vec<String>,
}

impl Command {
    /// Creates a command.
    #[inline]
    #[must_use]
    pub fn new(request_type: RequestType, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            request_type,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a custom command from raw arguments.
    #[inline]
    #[must_use]
    pub fn custom(args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(RequestType::CustomCommand, args)
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// A batch of commands submitted under a single request ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Commands in execution order.
    pub commands: Vec<Command>,
}

impl Transaction {
    /// Creates an empty transaction.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    #[inline]
    #[must_use]
    pub fn with(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Returns the number of commands.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if the transaction has no commands.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

// ============================================================================
// ConnectionRequest
// ============================================================================

/// Backend node address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    /// Host name or IP.
    pub host: String,
    /// Port.
    pub port: u16,
}

impl NodeAddress {
    /// Creates an address.
    #[inline]
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Setup payload sent with the handshake.
///
/// # Format
///
/// ```json
/// {
///   "kind": "connect",
///   "addresses": [{ "host": "localhost", "port": 6379 }],
///   "useTls": false,
///   "clusterModeEnabled": false,
///   "databaseId": 0
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    /// Backend nodes to connect to.
    pub addresses: Vec<NodeAddress>,
    /// Use TLS towards the backend.
    pub use_tls: bool,
    /// Backend runs in cluster mode.
    pub cluster_mode_enabled: bool,
    /// Logical database index.
    pub database_id: u32,
    /// Name reported to the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
}

impl ConnectionRequest {
    /// Creates a request for a single node.
    #[inline]
    #[must_use]
    pub fn new(address: NodeAddress) -> Self {
        Self {
            addresses: vec![address],
            ..Self::default()
        }
    }

    /// Adds a node address.
    #[inline]
    #[must_use]
    pub fn with_address(mut self, address: NodeAddress) -> Self {
        self.addresses.push(address);
        self
    }

    /// Enables TLS.
    #[inline]
    #[must_use]
    pub fn with_tls(mut self) -> Self {
        self.use_tls = true;
        self
    }

    /// Enables cluster mode.
    #[inline]
    #[must_use]
    pub fn with_cluster_mode(mut self) -> Self {
        self.cluster_mode_enabled = true;
        self
    }

    /// Sets the logical database index.
    #[inline]
    #[must_use]
    pub fn with_database(mut self, database_id: u32) -> Self {
        self.database_id = database_id;
        self
    }

    /// Sets the client name.
    #[inline]
    #[must_use]
    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
