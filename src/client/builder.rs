//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and connecting [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use duplex_dispatch::{AdmissionPolicy, Client};
//!
//! # async fn example() -> duplex_dispatch::Result<()> {
//! let client = Client::builder()
//!     .endpoint("/run/companion.sock")
//!     .admission_policy(AdmissionPolicy::Reject)
//!     .inflight_limit(500)
//!     .connect_timeout(Duration::from_secs(5))
//!     .address("cache.internal", 6379)
//!     .database(1)
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::dispatch::AdmissionPolicy;
use crate::error::{Error, Result, millis};
use crate::protocol::{Codec, ConnectionRequest, JsonCodec, NodeAddress};

use super::core::Client;
use super::options::ClientOptions;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct ClientBuilder {
    /// Path to the companion's Unix socket.
    endpoint: Option<PathBuf>,
    /// Limits and timeouts.
    options: ClientOptions,
    /// Setup payload sent with the handshake.
    setup: ConnectionRequest,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with default options and no endpoint.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the Unix socket path of the companion process.
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.endpoint = Some(path.into());
        self
    }

    /// Replaces all options at once.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the admission policy. Required.
    #[inline]
    #[must_use]
    pub fn admission_policy(mut self, policy: AdmissionPolicy) -> Self {
        self.options = self.options.with_admission_policy(policy);
        self
    }

    /// Sets the inflight ceiling.
    #[inline]
    #[must_use]
    pub fn inflight_limit(mut self, limit: usize) -> Self {
        self.options = self.options.with_inflight_limit(limit);
        self
    }

    /// Sets the connect plus handshake timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_connect_timeout(timeout);
        self
    }

    /// Sets the response timeout used by `execute`.
    #[inline]
    #[must_use]
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_response_timeout(timeout);
        self
    }

    /// Sets how long `close` waits for pending requests.
    #[inline]
    #[must_use]
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_close_timeout(timeout);
        self
    }

    /// Replaces the setup payload.
    #[inline]
    #[must_use]
    pub fn setup(mut self, setup: ConnectionRequest) -> Self {
        self.setup = setup;
        self
    }

    /// Adds a backend node address to the setup payload.
    #[inline]
    #[must_use]
    pub fn address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.setup = self.setup.with_address(NodeAddress::new(host, port));
        self
    }

    /// Selects the logical database.
    #[inline]
    #[must_use]
    pub fn database(mut self, database_id: u32) -> Self {
        self.setup = self.setup.with_database(database_id);
        self
    }

    /// Sets the client name reported to the backend.
    #[inline]
    #[must_use]
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.setup = self.setup.with_client_name(name);
        self
    }

    /// Enables cluster mode.
    #[inline]
    #[must_use]
    pub fn cluster_mode(mut self) -> Self {
        self.setup = self.setup.with_cluster_mode();
        self
    }

    /// Enables TLS towards the backend.
    #[inline]
    #[must_use]
    pub fn tls(mut self) -> Self {
        self.setup = self.setup.with_tls();
        self
    }

    /// Connects to the endpoint and completes the handshake.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the endpoint, policy or limits are invalid
    /// - [`Error::Io`] if the socket cannot be reached
    /// - [`Error::HandshakeFailed`] if the companion refuses the setup
    /// - [`Error::ConnectionTimeout`] if the connect timeout elapses
    #[cfg(unix)]
    pub async fn connect(self) -> Result<Client> {
        self.connect_with(JsonCodec).await
    }

    /// Same as [`connect`](Self::connect) with a custom codec.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    #[cfg(unix)]
    pub async fn connect_with<C: Codec>(self, codec: C) -> Result<Client<C>> {
        let policy = self.validate_options()?;
        let endpoint = self.validate_endpoint()?;

        let deadline = Instant::now() + self.options.connect_timeout;
        let timeout_ms = millis(self.options.connect_timeout);

        debug!(endpoint = %endpoint.display(), "Connecting to companion");

        let stream = timeout_at(deadline, tokio::net::UnixStream::connect(&endpoint))
            .await
            .map_err(|_| Error::connection_timeout(timeout_ms))??;

        Client::establish(stream, codec, self.setup, &self.options, policy, deadline).await
    }

    /// Completes the handshake over an already connected stream.
    ///
    /// The endpoint is ignored.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect), minus socket errors.
    pub async fn connect_stream<S, C>(self, stream: S, codec: C) -> Result<Client<C>>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        C: Codec,
    {
        let policy = self.validate_options()?;
        let deadline = Instant::now() + self.options.connect_timeout;

        Client::establish(stream, codec, self.setup, &self.options, policy, deadline).await
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Validates limits, timeouts and the admission policy.
    fn validate_options(&self) -> Result<AdmissionPolicy> {
        self.options.validate().map_err(Error::config)
    }

    /// Validates the endpoint configuration.
    fn validate_endpoint(&self) -> Result<PathBuf> {
        let endpoint = self.endpoint.clone().ok_or_else(|| {
            Error::config(
                "Endpoint is required. Use .endpoint() to set it.\n\
                 Example: Client::builder().endpoint(\"/tmp/companion.sock\")",
            )
        })?;

        if endpoint.as_os_str().is_empty() {
            return Err(Error::config("Endpoint path must not be empty"));
        }

        Ok(endpoint)
    }
}

// ============================================================================
// Tests
// ============================================================================
