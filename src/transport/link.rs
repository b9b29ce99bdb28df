//! Duplex connection link and event loop.
//!
//! This module owns the physical connection to the companion process and
//! drives the connection state machine.
//!
//! # Event Loop
//!
//! The link spawns a tokio task that handles:
//!
//! - Inbound frames, decoded and routed to the dispatcher by ID
//! - Outbound frames from every caller, written one at a time
//! - Transport failure, which drains the dispatcher
//!
//! Frames are length-delimited, so inbound handling only ever sees
//! complete frames.

// ============================================================================
// Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::dispatch::{CallbackDispatcher, ConnectionState, ResultHandle};
use crate::error::{Error, Result, millis};
use crate::identifiers::RequestId;
use crate::protocol::{Codec, ConnectionRequest, JsonCodec, Payload, Reply, Response, ResponseBody};

// ============================================================================
// Constants
// ============================================================================

/// Default time `close` waits for pending requests to drain.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Shared
// ============================================================================

/// State shared between link handles and the event loop.
///
/// Holds no frame sender: the outbound channel closes once the last
/// [`ConnectionLink`] is dropped, which ends the event loop.
struct Shared<C> {
    dispatcher: CallbackDispatcher<Reply>,
    codec: C,
    close_timeout: Duration,
    shutdown: CancellationToken,
}

impl<C: Codec> Shared<C> {
    /// Decodes one inbound frame and settles the matching request.
    fn on_frame(&self, frame: &[u8]) {
        let Response { id, body } = match self.codec.deserialize(frame) {
            Ok(response) => response,
            Err(err) => {
                error!(error = %err, len = frame.len(), "Malformed frame");
                self.on_transport_error(err);
                return;
            }
        };

        trace!(request_id = %id, "Frame received");

        if id.is_handshake() {
            self.on_handshake_response(body);
            return;
        }

        match body.into_result() {
            Ok(reply) => {
                self.dispatcher.resolve(id, reply);
            }
            Err(err) if err.is_closing() => {
                self.dispatcher.resolve_error(id, err.clone());
                self.on_transport_error(err);
            }
            Err(err) => {
                self.dispatcher.resolve_error(id, err);
            }
        }
    }

    /// Completes or fails the handshake.
    fn on_handshake_response(&self, body: ResponseBody) {
        if self.dispatcher.state() != ConnectionState::Connecting {
            warn!(state = %self.dispatcher.state(), "Handshake response outside of Connecting state");
            let err = self
                .dispatcher
                .rejection()
                .unwrap_or_else(|| Error::handshake_failed("duplicate handshake response"));
            self.dispatcher.resolve_error(RequestId::HANDSHAKE, err);
            return;
        }

        let message = match body {
            ResponseBody::Ok => {
                self.dispatcher.mark_ready();
                self.dispatcher.resolve(RequestId::HANDSHAKE, Reply::Ok);
                info!("Handshake completed");
                return;
            }
            ResponseBody::Nil => "empty handshake response".to_string(),
            ResponseBody::Value { value } => format!("unexpected handshake response: {value}"),
            ResponseBody::RequestError { kind, message } => format!("{kind}: {message}"),
            ResponseBody::ClosingError { message } => format!("connection closed: {message}"),
        };

        self.fail(Error::handshake_failed(message));
    }

    /// Escalates a transport fault to every pending request.
    fn on_transport_error(&self, err: Error) {
        let err = match self.dispatcher.state() {
            ConnectionState::Closed => return,
            ConnectionState::Connecting => Error::handshake_failed(err.to_string()),
            _ if err.is_closing() => err,
            _ => Error::closing(format!("connection lost: {err}")),
        };

        error!(error = %err, "Transport failure");
        self.fail(err);
    }

    /// Drives the state to `Closed` with `err` and stops the event loop.
    ///
    /// A link that never became `Ready` goes straight to `Closed`.
    fn fail(&self, err: Error) {
        if self.dispatcher.state() != ConnectionState::Connecting {
            self.dispatcher.begin_closing();
        }
        if self.dispatcher.fail_all(err) {
            self.shutdown.cancel();
        }
    }
}

// ============================================================================
// ConnectionLink
// ============================================================================

/// Duplex connection to the companion process.
///
/// Handles framing, routing of inbound frames and the lifecycle state.
/// Cheap to clone; all clones share one connection.
///
/// # Thread Safety
///
/// `ConnectionLink` is `Send + Sync`. Outbound frames from any number of
/// callers are serialized by the event loop and never interleave.
///
/// Dropping the last clone without [`close`](Self::close) stops the event
/// loop, closes the socket and fails every pending request.
pub struct ConnectionLink<C: Codec = JsonCodec> {
    shared: Arc<Shared<C>>,
    frame_tx: mpsc::UnboundedSender<Bytes>,
}

impl<C: Codec> Clone for ConnectionLink<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            frame_tx: self.frame_tx.clone(),
        }
    }
}

impl<C: Codec> ConnectionLink<C> {
    /// Creates a link over an established byte stream.
    ///
    /// Spawns the event loop task internally; must be called within a
    /// tokio runtime.
    pub fn spawn<S>(
        stream: S,
        dispatcher: CallbackDispatcher<Reply>,
        codec: C,
        close_timeout: Duration,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let framed = Framed::new(stream, LengthDelimitedCodec::new());
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            dispatcher,
            codec,
            close_timeout,
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(Self::run_event_loop(framed, frame_rx, Arc::clone(&shared)));

        Self { shared, frame_tx }
    }

    /// Connects to a Unix domain socket and creates a link over it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the socket cannot be reached.
    #[cfg(unix)]
    pub async fn connect_unix(
        path: impl AsRef<Path>,
        dispatcher: CallbackDispatcher<Reply>,
        codec: C,
        close_timeout: Duration,
    ) -> Result<Self> {
        let path = path.as_ref();
        let stream = tokio::net::UnixStream::connect(path).await?;

        debug!(path = %path.display(), "Socket connected");

        Ok(Self::spawn(stream, dispatcher, codec, close_timeout))
    }

    /// Returns the dispatcher this link feeds.
    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &CallbackDispatcher<Reply> {
        &self.shared.dispatcher
    }

    /// Returns the codec.
    #[inline]
    #[must_use]
    pub fn codec(&self) -> &C {
        &self.shared.codec
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.dispatcher.state()
    }

    /// Registers and transmits the handshake request.
    ///
    /// The returned handle completes with [`Reply::Ok`] once the companion
    /// accepts the setup, at which point the state is `Ready`. Any other
    /// answer fails it with [`Error::HandshakeFailed`] and closes the link.
    ///
    /// # Errors
    ///
    /// Returns an error if the link is not `Connecting` or a handshake was
    /// already sent.
    pub fn connect(&self, setup: ConnectionRequest) -> Result<ResultHandle<Reply>> {
        let handle = self.shared.dispatcher.register_handshake()?;

        let frame = match self
            .shared
            .codec
            .serialize(RequestId::HANDSHAKE, &Payload::Connect(setup))
        {
            Ok(frame) => frame,
            Err(err) => {
                self.shared
                    .fail(Error::handshake_failed(format!("cannot encode setup: {err}")));
                return Ok(handle);
            }
        };

        if self.frame_tx.send(frame).is_err() {
            self.shared
                .on_transport_error(Error::closing("connection event loop terminated"));
        }

        debug!("Handshake sent");
        Ok(handle)
    }

    /// Queues one frame for writing.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] while `Connecting`
    /// - [`Error::Closing`] (or the recorded close error) once shutting down
    pub fn send(&self, frame: Bytes) -> Result<()> {
        if let Some(err) = self.shared.dispatcher.rejection() {
            return Err(err);
        }

        self.frame_tx.send(frame).map_err(|_| {
            self.shared
                .dispatcher
                .rejection()
                .unwrap_or_else(|| Error::closing("connection event loop terminated"))
        })
    }

    /// Handles one complete inbound frame.
    ///
    /// Called by the event loop; public so alternative transports can feed
    /// frames directly.
    pub fn on_frame(&self, frame: &[u8]) {
        self.shared.on_frame(frame);
    }

    /// Handles a transport failure: every pending request fails.
    pub fn on_transport_error(&self, err: Error) {
        self.shared.on_transport_error(err);
    }

    /// Closes the connection.
    ///
    /// Stops new registrations, waits up to the close timeout for pending
    /// requests to drain, then fails whatever is left with
    /// [`Error::Closing`]. Idempotent: concurrent and repeated calls wait
    /// for the one close sequence that runs.
    pub async fn close(&self) {
        let dispatcher = &self.shared.dispatcher;

        if !dispatcher.begin_closing() {
            dispatcher.closed().await;
            return;
        }

        debug!(pending = dispatcher.pending_count(), "Closing connection");

        let close_timeout = self.shared.close_timeout;
        if !close_timeout.is_zero() && timeout(close_timeout, dispatcher.drained()).await.is_err() {
            debug!(
                pending = dispatcher.pending_count(),
                timeout_ms = millis(close_timeout),
                "Close deadline reached"
            );
        }

        dispatcher.fail_all(Error::closing("connection closed by client"));
        self.shared.shutdown.cancel();

        info!("Connection closed");
    }

    /// Waits until the connection is `Closed`.
    pub async fn closed(&self) {
        self.shared.dispatcher.closed().await;
    }

    /// Event loop that handles socket I/O.
    async fn run_event_loop<S>(
        framed: Framed<S, LengthDelimitedCodec>,
        mut frame_rx: mpsc::UnboundedReceiver<Bytes>,
        shared: Arc<Shared<C>>,
    ) where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (mut sink, mut stream) = framed.split();

        loop {
            tokio::select! {
                // Inbound frames from the companion
                frame = stream.next() => {
                    match frame {
                        Some(Ok(frame)) => shared.on_frame(&frame),

                        Some(Err(e)) => {
                            error!(error = %e, "Socket read error");
                            shared.on_transport_error(Error::from(e));
                            break;
                        }

                        None => {
                            debug!("Socket closed by peer");
                            shared.on_transport_error(Error::closing("connection closed by peer"));
                            break;
                        }
                    }
                }

                // Outbound frames from callers
                frame = frame_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            let len = frame.len();
                            if let Err(e) = sink.send(frame).await {
                                shared.on_transport_error(Error::from(e));
                                break;
                            }
                            trace!(len, "Frame written");
                        }

                        None => {
                            debug!("All link handles dropped");
                            let _ = sink.close().await;
                            break;
                        }
                    }
                }

                // Close or fatal fault
                _ = shared.shutdown.cancelled() => {
                    debug!("Shutdown requested");
                    let _ = sink.close().await;
                    break;
                }
            }
        }

        // No-op if already closed.
        shared.on_transport_error(Error::closing("connection event loop terminated"));

        debug!("Event loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================
