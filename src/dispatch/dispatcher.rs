//! Callback dispatcher.
//!
//! The single authority for registering pending requests and settling them
//! by identifier. Identifier allocation, the pending table and the
//! connection state live behind one lock, so a registration is visible to
//! `resolve`, `resolve_error` and `fail_all` before its identifier can be
//! written to the wire.
//!
//! # Operations
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | [`register`](CallbackDispatcher::register) | New id + handle, subject to admission |
//! | [`resolve`](CallbackDispatcher::resolve) | Completes one handle, frees its id and slot |
//! | [`resolve_error`](CallbackDispatcher::resolve_error) | Fails one handle, frees its id and slot |
//! | [`fail_all`](CallbackDispatcher::fail_all) | Fails every handle, enters `Closed` for good |
//!
//! Settling an unknown id is a no-op: duplicate and late responses are
//! expected after timeouts and drains.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::Reply;

use super::handle::{ResultHandle, result_channel};
use super::ids::IdentifierPool;
use super::limiter::{AdmissionPolicy, InflightLimiter, InflightPermit};
use super::pending::{PendingEntry, PendingTable};
use super::state::ConnectionState;

// ============================================================================
// Inner
// ============================================================================

/// State guarded by the dispatcher lock.
struct Inner<T> {
    state: ConnectionState,
    ids: IdentifierPool,
    pending: PendingTable<T>,
    /// Whether the handshake id was ever registered.
    handshake_registered: bool,
    /// Error recorded by `fail_all`, returned to every later caller.
    closed_with: Option<Error>,
}

impl<T> Inner<T> {
    /// Returns the error a new ordinary registration gets, if any.
    fn rejection(&self) -> Option<Error> {
        match self.state {
            ConnectionState::Ready => None,
            ConnectionState::Connecting => Some(Error::not_ready(self.state)),
            ConnectionState::Closing => Some(Error::closing("connection is closing")),
            ConnectionState::Closed => Some(
                self.closed_with
                    .clone()
                    .unwrap_or_else(|| Error::closing("connection closed")),
            ),
        }
    }
}

// ============================================================================
// CallbackDispatcher
// ============================================================================

/// Correlates outstanding requests with their results.
///
/// `T` is the success value handed to callers.
///
/// # Thread Safety
///
/// All operations take `&self` and are safe to call concurrently. The
/// internal lock is never held across an await point.
pub struct CallbackDispatcher<T = Reply> {
    inner: Mutex<Inner<T>>,
    limiter: InflightLimiter,
    /// Broadcasts state transitions.
    state_tx: watch::Sender<ConnectionState>,
    /// Signalled whenever the pending table becomes empty.
    idle: Notify,
}

impl<T> CallbackDispatcher<T> {
    /// Creates a dispatcher in the `Connecting` state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `inflight_limit` is out of range.
    pub fn new(inflight_limit: usize, policy: AdmissionPolicy) -> Result<Self> {
        let limiter = InflightLimiter::new(inflight_limit, policy)?;
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);

        Ok(Self {
            inner: Mutex::new(Inner {
                state: ConnectionState::Connecting,
                ids: IdentifierPool::new(),
                pending: PendingTable::default(),
                handshake_registered: false,
                closed_with: None,
            }),
            limiter,
            state_tx,
            idle: Notify::new(),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Returns a receiver that observes state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Returns the number of pending entries, handshake included.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Returns `true` if `id` is awaiting a response.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, id: RequestId) -> bool {
        self.inner.lock().pending.contains(id)
    }

    /// Returns the number of admitted ordinary requests.
    #[inline]
    #[must_use]
    pub fn inflight(&self) -> usize {
        self.limiter.inflight()
    }

    /// Returns the configured inflight ceiling.
    #[inline]
    #[must_use]
    pub fn ceiling(&self) -> usize {
        self.limiter.ceiling()
    }

    /// Returns the configured admission policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> AdmissionPolicy {
        self.limiter.policy()
    }

    /// Returns the error recorded by [`fail_all`](Self::fail_all), if any.
    #[must_use]
    pub fn closed_error(&self) -> Option<Error> {
        self.inner.lock().closed_with.clone()
    }

    /// Returns the error an ordinary operation gets in the current state.
    ///
    /// `None` while `Ready`.
    #[must_use]
    pub fn rejection(&self) -> Option<Error> {
        self.inner.lock().rejection()
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers the handshake request under [`RequestId::HANDSHAKE`].
    ///
    /// Allowed once, while `Connecting`.
    ///
    /// # Errors
    ///
    /// - [`Error::HandshakeFailed`] if a handshake was already registered
    /// - the current rejection error if the state is not `Connecting`
    pub fn register_handshake(&self) -> Result<ResultHandle<T>> {
        let mut inner = self.inner.lock();

        if inner.state != ConnectionState::Connecting {
            return Err(inner
                .rejection()
                .unwrap_or_else(|| Error::handshake_failed("connection already established")));
        }
        if inner.handshake_registered {
            return Err(Error::handshake_failed("handshake already in progress"));
        }

        let (handle, completer) = result_channel(RequestId::HANDSHAKE);
        inner.pending.insert(PendingEntry {
            completer,
            permit: None,
        });
        inner.handshake_registered = true;

        trace!("Handshake registered");
        Ok(handle)
    }

    /// Registers an ordinary request.
    ///
    /// Suspends at the inflight ceiling under [`AdmissionPolicy::Block`].
    ///
    /// # Errors
    ///
    /// - [`Error::AdmissionRejected`] at the ceiling under [`AdmissionPolicy::Reject`]
    /// - [`Error::NotReady`] while `Connecting`
    /// - [`Error::Closing`] while `Closing`
    /// - the error passed to [`fail_all`](Self::fail_all) once `Closed`
    pub async fn register(&self) -> Result<(RequestId, ResultHandle<T>)> {
        if let Some(err) = self.rejection() {
            return Err(err);
        }

        let permit = match self.limiter.admit().await {
            Ok(permit) => permit,
            Err(err) => return Err(self.rejection().unwrap_or(err)),
        };

        self.insert(permit)
    }

    /// Registers an ordinary request without ever suspending.
    ///
    /// Rejects at the ceiling regardless of the configured policy.
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn try_register(&self) -> Result<(RequestId, ResultHandle<T>)> {
        if let Some(err) = self.rejection() {
            return Err(err);
        }

        let permit = match self.limiter.try_admit() {
            Ok(permit) => permit,
            Err(err) => return Err(self.rejection().unwrap_or(err)),
        };

        self.insert(permit)
    }

    /// Allocates an id and inserts the entry under the lock.
    fn insert(&self, permit: InflightPermit) -> Result<(RequestId, ResultHandle<T>)> {
        let mut inner = self.inner.lock();

        // State may have moved while waiting for admission.
        if let Some(err) = inner.rejection() {
            return Err(err);
        }

        let id = inner.ids.acquire();
        let (handle, completer) = result_channel(id);
        inner.pending.insert(PendingEntry {
            completer,
            permit: Some(permit),
        });

        trace!(request_id = %id, pending = inner.pending.len(), "Request registered");
        Ok((id, handle))
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Completes the handle registered under `id` with `value`.
    ///
    /// Returns `false` and does nothing if `id` is not pending.
    pub fn resolve(&self, id: RequestId, value: T) -> bool {
        match self.take(id) {
            Some(entry) => {
                entry.complete(value);
                true
            }
            None => false,
        }
    }

    /// Fails the handle registered under `id` with `err`.
    ///
    /// Returns `false` and does nothing if `id` is not pending.
    pub fn resolve_error(&self, id: RequestId, err: Error) -> bool {
        match self.take(id) {
            Some(entry) => {
                entry.fail(err);
                true
            }
            None => false,
        }
    }

    /// Removes the entry for `id` and releases its identifier.
    fn take(&self, id: RequestId) -> Option<PendingEntry<T>> {
        let (entry, now_idle) = {
            let mut inner = self.inner.lock();
            let entry = inner.pending.remove(id);
            if entry.is_some() {
                inner.ids.release(id);
            }
            (entry, inner.pending.is_empty())
        };

        if entry.is_none() {
            warn!(request_id = %id, "Response for unknown request");
        } else if now_idle {
            self.idle.notify_waiters();
        }

        entry
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Moves `Connecting` to `Ready`.
    ///
    /// Returns `false` if the state was not `Connecting`.
    pub fn mark_ready(&self) -> bool {
        self.transition(ConnectionState::Connecting, ConnectionState::Ready)
    }

    /// Moves `Connecting` or `Ready` to `Closing` and stops admissions.
    ///
    /// Returns `true` only for the caller that performed the transition.
    pub fn begin_closing(&self) -> bool {
        let moved = {
            let mut inner = self.inner.lock();
            match inner.state {
                ConnectionState::Connecting | ConnectionState::Ready => {
                    let from = inner.state;
                    inner.state = ConnectionState::Closing;
                    self.state_tx.send_replace(ConnectionState::Closing);
                    debug!(from = %from, to = %ConnectionState::Closing, "Connection state changed");
                    true
                }
                ConnectionState::Closing | ConnectionState::Closed => false,
            }
        };

        if moved {
            self.limiter.close();
        }
        moved
    }

    /// Fails every pending handle with `err` and enters `Closed`.
    ///
    /// Every later registration fails with `err`. Executes at most once;
    /// returns `false` if the dispatcher was already closed.
    pub fn fail_all(&self, err: Error) -> bool {
        let drained = {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Closed {
                return false;
            }

            let from = inner.state;
            inner.state = ConnectionState::Closed;
            inner.closed_with = Some(err.clone());

            let drained = inner.pending.drain();
            for entry in &drained {
                inner.ids.release(entry.completer.id());
            }

            self.state_tx.send_replace(ConnectionState::Closed);
            debug!(from = %from, to = %ConnectionState::Closed, "Connection state changed");
            drained
        };

        self.limiter.close();

        let count = drained.len();
        for entry in drained {
            entry.fail(err.clone());
        }
        self.idle.notify_waiters();

        if count > 0 {
            debug!(count, error = %err, "Failed pending requests");
        }
        true
    }

    /// Waits until no entries are pending.
    pub async fn drained(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.lock().pending.is_empty() {
                return;
            }

            notified.await;
        }
    }

    /// Waits until the dispatcher is `Closed`.
    pub async fn closed(&self) {
        let mut state_rx = self.state_tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = state_rx.wait_for(ConnectionState::is_closed).await;
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != from {
            return false;
        }
        inner.state = to;
        self.state_tx.send_replace(to);
        debug!(from = %from, to = %to, "Connection state changed");
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use rustc_hash::FxHashSet;
    use tokio::time::timeout;

    fn ready(limit: usize, policy: AdmissionPolicy) -> CallbackDispatcher<String> {
        let dispatcher = CallbackDispatcher::new(limit, policy).expect("dispatcher");
        assert!(dispatcher.mark_ready());
        dispatcher
    }

    #[test]
    fn test_starts_connecting() {
        let dispatcher: CallbackDispatcher<String> =
            CallbackDispatcher::new(4, AdmissionPolicy::Reject).expect("dispatcher");
        assert_eq!(dispatcher.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_register_rejected_while_connecting() {
        let dispatcher: CallbackDispatcher<String> =
            CallbackDispatcher::new(4, AdmissionPolicy::Reject).expect("dispatcher");

        let err = dispatcher.register().await.expect_err("not ready");
        assert!(matches!(err, Error::NotReady { state: ConnectionState::Connecting }));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn test_handshake_uses_reserved_id() {
        let dispatcher: CallbackDispatcher<String> =
            CallbackDispatcher::new(4, AdmissionPolicy::Reject).expect("dispatcher");

        let handle = dispatcher.register_handshake().expect("handshake");
        assert_eq!(handle.id(), RequestId::HANDSHAKE);
        assert!(dispatcher.is_pending(RequestId::HANDSHAKE));

        assert!(matches!(
            dispatcher.register_handshake(),
            Err(Error::HandshakeFailed { .. })
        ));

        assert!(dispatcher.resolve(RequestId::HANDSHAKE, "OK".into()));
        assert_eq!(handle.poll().expect("settled").expect("ok"), "OK");
    }

    #[test]
    fn test_handshake_rejected_once_ready() {
        let dispatcher = ready(4, AdmissionPolicy::Reject);
        assert!(dispatcher.register_handshake().is_err());
    }

    #[tokio::test]
    async fn test_register_then_resolve_same_thread() {
        let dispatcher = ready(4, AdmissionPolicy::Reject);

        let (id, handle) = dispatcher.register().await.expect("register");
        assert!(!id.is_handshake());

        // Inbound frame arrives before anything is transmitted.
        assert!(dispatcher.resolve(id, "value".into()));
        assert_eq!(handle.wait().await.expect("ok"), "value");
    }

    #[tokio::test]
    async fn test_second_resolution_is_noop() {
        let dispatcher = ready(4, AdmissionPolicy::Reject);
        let (id, handle) = dispatcher.register().await.expect("register");

        assert!(dispatcher.resolve(id, "first".into()));
        assert!(!dispatcher.resolve(id, "second".into()));
        assert!(!dispatcher.resolve_error(id, Error::closing("late")));

        assert_eq!(handle.poll().expect("settled").expect("ok"), "first");
    }

    #[tokio::test]
    async fn test_resolve_error_fails_only_that_handle() {
        let dispatcher = ready(4, AdmissionPolicy::Reject);
        let (a, handle_a) = dispatcher.register().await.expect("a");
        let (_b, handle_b) = dispatcher.register().await.expect("b");

        let err = Error::request(crate::protocol::RequestErrorKind::ExecAbort, "aborted");
        assert!(dispatcher.resolve_error(a, err));

        let got = handle_a.poll().expect("settled").expect_err("failed");
        assert!(matches!(got, Error::Request { .. }));
        assert!(!got.is_connection_error());
        assert!(handle_b.poll().is_none());
        assert_eq!(dispatcher.pending_count(), 1);
        assert_eq!(dispatcher.inflight(), 1);
    }

    #[tokio::test]
    async fn test_unknown_id_is_noop() {
        let dispatcher = ready(4, AdmissionPolicy::Reject);
        assert!(!dispatcher.resolve(RequestId::new(77), "stray".into()));
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_registrations_unique() {
        let dispatcher = Arc::new(ready(256, AdmissionPolicy::Block));

        let mut tasks = Vec::new();
        for _ in 0..200 {
            let dispatcher = Arc::clone(&dispatcher);
            tasks.push(tokio::spawn(async move { dispatcher.register().await }));
        }

        let mut ids = FxHashSet::default();
        let mut handles = Vec::new();
        for task in tasks {
            let (id, handle) = task.await.expect("join").expect("register");
            assert!(ids.insert(id), "duplicate id {id}");
            handles.push(handle);
        }
        assert_eq!(dispatcher.pending_count(), 200);
    }

    #[tokio::test]
    async fn test_fail_all_drains_everything() {
        let dispatcher = ready(8, AdmissionPolicy::Reject);

        let mut handles = Vec::new();
        for _ in 0..3 {
            handles.push(dispatcher.register().await.expect("register").1);
        }

        assert!(dispatcher.fail_all(Error::closing("transport lost")));

        for handle in &handles {
            let err = handle.poll().expect("settled").expect_err("failed");
            assert_eq!(err.to_string(), "Connection closed: transport lost");
        }
        assert_eq!(dispatcher.pending_count(), 0);
        assert_eq!(dispatcher.inflight(), 0);
        assert_eq!(dispatcher.state(), ConnectionState::Closed);

        let err = dispatcher.register().await.expect_err("closed");
        assert_eq!(err.to_string(), "Connection closed: transport lost");
        assert_eq!(dispatcher.pending_count(), 0);
    }

    #[test]
    fn test_fail_all_runs_once() {
        let dispatcher = ready(2, AdmissionPolicy::Reject);
        assert!(dispatcher.fail_all(Error::closing("first")));
        assert!(!dispatcher.fail_all(Error::closing("second")));

        let err = dispatcher.closed_error().expect("recorded");
        assert_eq!(err.to_string(), "Connection closed: first");
    }

    #[tokio::test]
    async fn test_ceiling_reject_scenario() {
        let dispatcher = ready(2, AdmissionPolicy::Reject);

        let (a, handle_a) = dispatcher.register().await.expect("a");
        let (b, _handle_b) = dispatcher.register().await.expect("b");

        let err = dispatcher.register().await.expect_err("c rejected");
        assert!(matches!(err, Error::AdmissionRejected { ceiling: 2, .. }));

        assert!(dispatcher.resolve(a, "OK".into()));
        assert_eq!(handle_a.poll().expect("settled").expect("ok"), "OK");
        assert_eq!(dispatcher.pending_count(), 1);
        assert!(dispatcher.is_pending(b));

        let (d, _handle_d) = dispatcher.register().await.expect("d");
        assert_ne!(d, b);
        assert_eq!(d, a, "released id is reissued first");
    }

    #[tokio::test]
    async fn test_ceiling_reject_concurrent_exactly_one_rejected() {
        let dispatcher = Arc::new(ready(4, AdmissionPolicy::Reject));

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let dispatcher = Arc::clone(&dispatcher);
            tasks.push(tokio::spawn(async move { dispatcher.register().await }));
        }

        let mut rejected = 0;
        let mut held = Vec::new();
        for task in tasks {
            match task.await.expect("join") {
                Ok(entry) => held.push(entry),
                Err(Error::AdmissionRejected { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(rejected, 1);
        assert_eq!(held.len(), 4);
    }

    #[tokio::test]
    async fn test_ceiling_block_waits_for_resolution() {
        let dispatcher = Arc::new(ready(2, AdmissionPolicy::Block));

        let (a, _handle_a) = dispatcher.register().await.expect("a");
        let (_b, _handle_b) = dispatcher.register().await.expect("b");

        let waiter = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.register().await.map(|(id, _)| id) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        dispatcher.resolve(a, "done".into());

        let id = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("third registration completes")
            .expect("join")
            .expect("register");
        assert_eq!(id, a);
    }

    #[tokio::test]
    async fn test_blocked_register_fails_on_fail_all() {
        let dispatcher = Arc::new(ready(1, AdmissionPolicy::Block));
        let (_a, handle_a) = dispatcher.register().await.expect("a");

        let waiter = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.register().await.map(|(id, _)| id) })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatcher.fail_all(Error::closing("shutdown"));

        let err = waiter.await.expect("join").expect_err("closed");
        assert_eq!(err.to_string(), "Connection closed: shutdown");
        assert!(handle_a.poll().expect("settled").is_err());
    }

    #[tokio::test]
    async fn test_try_register_ignores_block_policy() {
        let dispatcher = ready(1, AdmissionPolicy::Block);
        let _held = dispatcher.try_register().expect("first");
        assert!(matches!(
            dispatcher.try_register(),
            Err(Error::AdmissionRejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_closing_allows_resolution_but_not_registration() {
        let dispatcher = ready(4, AdmissionPolicy::Reject);
        let (id, handle) = dispatcher.register().await.expect("register");

        assert!(dispatcher.begin_closing());
        assert!(!dispatcher.begin_closing());
        assert_eq!(dispatcher.state(), ConnectionState::Closing);

        let err = dispatcher.register().await.expect_err("closing");
        assert!(err.is_closing());

        assert!(dispatcher.resolve(id, "late but fine".into()));
        assert_eq!(handle.poll().expect("settled").expect("ok"), "late but fine");

        timeout(Duration::from_millis(100), dispatcher.drained())
            .await
            .expect("drained");
    }

    #[tokio::test]
    async fn test_closed_notifies_waiters() {
        let dispatcher = Arc::new(ready(1, AdmissionPolicy::Reject));

        let waiter = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.closed().await })
        };

        dispatcher.fail_all(Error::closing("bye"));
        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("closed observed")
            .expect("join");
    }

    #[tokio::test]
    async fn test_subscribe_observes_transitions() {
        let dispatcher: CallbackDispatcher<String> =
            CallbackDispatcher::new(1, AdmissionPolicy::Reject).expect("dispatcher");
        let mut state_rx = dispatcher.subscribe();

        dispatcher.mark_ready();
        state_rx.changed().await.expect("changed");
        assert_eq!(*state_rx.borrow_and_update(), ConnectionState::Ready);
    }
}
