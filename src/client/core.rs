//! Request coordinator.
//!
//! [`Client`] is the face of the crate: it ties one dispatcher to one
//! connection link and turns payloads into result handles.
//!
//! # Example
//!
//! ```no_run
//! use duplex_dispatch::{AdmissionPolicy, Client};
//!
//! # async fn example() -> duplex_dispatch::Result<()> {
//! let client = Client::builder()
//!     .endpoint("/tmp/companion.sock")
//!     .admission_policy(AdmissionPolicy::Block)
//!     .address("localhost", 6379)
//!     .connect()
//!     .await?;
//!
//! let reply = client.custom_command(["GET", "key"]).await?;
//! println!("{reply:?}");
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, trace};

use crate::dispatch::{AdmissionPolicy, CallbackDispatcher, ConnectionState, ResultHandle};
use crate::error::{Error, Result, millis};
use crate::identifiers::RequestId;
use crate::protocol::{Codec, Command, ConnectionRequest, JsonCodec, Payload, Reply, Transaction};
use crate::transport::ConnectionLink;

use super::builder::ClientBuilder;
use super::options::ClientOptions;

// ============================================================================
// Client
// ============================================================================

/// Client for one companion process connection.
///
/// Every request gets a fresh ID and a [`ResultHandle`]; responses are
/// matched by ID regardless of arrival order. Cheap to clone, all clones
/// share the connection.
///
/// A closed client stays closed. Build a new one to reconnect.
pub struct Client<C: Codec = JsonCodec> {
    link: ConnectionLink<C>,
    response_timeout: Duration,
}

impl<C: Codec> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            link: self.link.clone(),
            response_timeout: self.response_timeout,
        }
    }
}

// ============================================================================
// Client - Display
// ============================================================================

impl<C: Codec> fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .field("ceiling", &self.link.dispatcher().ceiling())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Construction
// ============================================================================

impl Client {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }
}

impl<C: Codec> Client<C> {
    /// Runs the handshake over `stream` and returns a `Ready` client.
    ///
    /// The whole exchange must finish before `deadline`.
    pub(crate) async fn establish<S>(
        stream: S,
        codec: C,
        setup: ConnectionRequest,
        options: &ClientOptions,
        policy: AdmissionPolicy,
        deadline: Instant,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let dispatcher = CallbackDispatcher::new(options.inflight_limit, policy)?;
        let link = ConnectionLink::spawn(stream, dispatcher, codec, options.close_timeout);

        let handshake = link.connect(setup)?;

        match timeout_at(deadline, handshake.wait()).await {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                let timeout_ms = millis(options.connect_timeout);
                link.on_transport_error(Error::connection_timeout(timeout_ms));
                return Err(Error::connection_timeout(timeout_ms));
            }
        }

        info!(
            ceiling = options.inflight_limit,
            policy = %policy,
            "Client connected"
        );

        Ok(Self {
            link,
            response_timeout: options.response_timeout,
        })
    }
}

// ============================================================================
// Client - Requests
// ============================================================================

impl<C: Codec> Client<C> {
    /// Submits a payload and returns its result handle.
    ///
    /// Under [`AdmissionPolicy::Block`] this suspends while the inflight
    /// ceiling is reached. The request is registered before its frame is
    /// written, so the response can never outrun the registration.
    ///
    /// # Errors
    ///
    /// - [`Error::AdmissionRejected`] at the ceiling under [`AdmissionPolicy::Reject`]
    /// - [`Error::Closing`] once the connection is closing or closed
    /// - [`Error::Encode`] if the payload cannot be serialized
    pub async fn submit(&self, payload: impl Into<Payload>) -> Result<ResultHandle<Reply>> {
        let (id, handle) = self.link.dispatcher().register().await?;
        self.transmit(id, &payload.into())?;
        Ok(handle)
    }

    /// Submits a payload without ever suspending.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit), and rejects at the ceiling
    /// regardless of policy.
    pub fn try_submit(&self, payload: impl Into<Payload>) -> Result<ResultHandle<Reply>> {
        let (id, handle) = self.link.dispatcher().try_register()?;
        self.transmit(id, &payload.into())?;
        Ok(handle)
    }

    /// Submits a payload and waits for its reply.
    ///
    /// # Errors
    ///
    /// Everything [`submit`](Self::submit) returns, the request's own error,
    /// or [`Error::ResponseTimeout`] after the configured response timeout.
    pub async fn execute(&self, payload: impl Into<Payload>) -> Result<Reply> {
        let handle = self.submit(payload).await?;
        handle.wait_timeout(self.response_timeout).await
    }

    /// Executes an arbitrary command given as raw arguments.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute).
    pub async fn custom_command(
        &self,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Reply> {
        self.execute(Command::custom(args)).await
    }

    /// Executes a transaction; the companion answers with one aggregate reply.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute). A transaction aborted by the
    /// backend fails with a [`RequestErrorKind::ExecAbort`] request error.
    ///
    /// [`RequestErrorKind::ExecAbort`]: crate::protocol::RequestErrorKind::ExecAbort
    pub async fn exec(&self, transaction: Transaction) -> Result<Reply> {
        self.execute(transaction).await
    }

    /// Serializes and writes a registered request.
    ///
    /// On failure the registration is completed with the same error so
    /// nothing leaks in the pending table.
    fn transmit(&self, id: RequestId, payload: &Payload) -> Result<()> {
        let dispatcher = self.link.dispatcher();

        let frame = match self.link.codec().serialize(id, payload) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(request_id = %id, error = %err, "Payload rejected by codec");
                dispatcher.resolve_error(id, err.clone());
                return Err(err);
            }
        };

        if let Err(err) = self.link.send(frame) {
            dispatcher.resolve_error(id, err.clone());
            return Err(err);
        }

        trace!(request_id = %id, "Request submitted");
        Ok(())
    }
}

// ============================================================================
// Client - Lifecycle
// ============================================================================

impl<C: Codec> Client<C> {
    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    /// Returns `true` while requests are accepted.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Returns the number of requests awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.link.dispatcher().pending_count()
    }

    /// Returns the error the connection closed with, if closed.
    #[inline]
    #[must_use]
    pub fn closed_error(&self) -> Option<Error> {
        self.link.dispatcher().closed_error()
    }

    /// Subscribes to state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.link.dispatcher().subscribe()
    }

    /// Closes the connection.
    ///
    /// Pending requests get the configured close timeout to complete, then
    /// fail with [`Error::Closing`]. Safe to call from several tasks.
    pub async fn close(&self) {
        self.link.close().await;
    }

    /// Waits until the connection is closed by any party.
    pub async fn closed(&self) {
        self.link.closed().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
