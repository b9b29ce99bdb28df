//! Single-assignment result handles.
//!
//! A [`ResultHandle`] is handed to the caller at registration time. The
//! matching [`Completer`] stays with the dispatcher and is consumed by the
//! one call that settles the handle, so a second completion cannot be
//! expressed. A completer dropped without settling fails its handle, so
//! every handle is eventually settled exactly once.
//!
//! Waiting supports three modes:
//!
//! - [`ResultHandle::poll`] - non-blocking check
//! - [`ResultHandle::wait`] / [`ResultHandle::wait_timeout`] - async
//! - [`ResultHandle::blocking_wait`] - blocks the current thread
//!
//! A timed-out wait only ends the caller's wait; the request stays
//! registered and a late response is discarded by the dispatcher.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tokio::time::timeout;

use crate::error::{Error, Result, millis};
use crate::identifiers::RequestId;

// ============================================================================
// Slot
// ============================================================================

/// Result cell state.
enum Slot<T> {
    Pending,
    Completed(T),
    Failed(Error),
}

/// Shared between a handle and its completer.
struct Cell<T> {
    slot: Mutex<Slot<T>>,
    /// Wakes blocking waiters.
    settled: Condvar,
    /// Wakes async waiters.
    notify: Notify,
}

impl<T> Cell<T> {
    /// Settles the cell. Returns `false` if it was already settled.
    fn settle(&self, result: Result<T>) -> bool {
        {
            let mut slot = self.slot.lock();
            if !matches!(*slot, Slot::Pending) {
                return false;
            }
            *slot = match result {
                Ok(value) => Slot::Completed(value),
                Err(err) => Slot::Failed(err),
            };
        }
        self.settled.notify_all();
        self.notify.notify_waiters();
        true
    }
}

/// Creates a connected handle/completer pair.
pub(crate) fn result_channel<T>(id: RequestId) -> (ResultHandle<T>, Completer<T>) {
    let cell = Arc::new(Cell {
        slot: Mutex::new(Slot::Pending),
        settled: Condvar::new(),
        notify: Notify::new(),
    });

    (
        ResultHandle {
            id,
            cell: Arc::clone(&cell),
        },
        Completer { id, cell },
    )
}

// ============================================================================
// Completer
// ============================================================================

/// Write side of a result handle. Consumed on completion.
pub(crate) struct Completer<T> {
    id: RequestId,
    cell: Arc<Cell<T>>,
}

impl<T> Completer<T> {
    /// Returns the request ID this completer settles.
    #[inline]
    pub(crate) fn id(&self) -> RequestId {
        self.id
    }

    /// Settles the handle with a value.
    pub(crate) fn complete(self, value: T) {
        self.cell.settle(Ok(value));
    }

    /// Settles the handle with an error.
    pub(crate) fn fail(self, err: Error) {
        self.cell.settle(Err(err));
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        self.cell
            .settle(Err(Error::closing("request abandoned before completion")));
    }
}

impl<T> fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer").field("id", &self.id).finish()
    }
}

// ============================================================================
// ResultHandle
// ============================================================================

/// Future-like handle to one request's eventual result.
///
/// Transitions exactly once from pending to completed or failed; every
/// later read observes the same terminal value. Cloning gives another
/// reader of the same cell.
pub struct ResultHandle<T> {
    id: RequestId,
    cell: Arc<Cell<T>>,
}

impl<T> Clone for ResultHandle<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for ResultHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("id", &self.id)
            .field("done", &self.is_done())
            .finish()
    }
}

impl<T> ResultHandle<T> {
    /// Returns the request ID this handle was registered under.
    #[inline]
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Returns `true` once the handle is settled.
    #[inline]
    #[must_use]
    pub fn is_done(&self) -> bool {
        !matches!(*self.cell.slot.lock(), Slot::Pending)
    }
}

impl<T: Clone> ResultHandle<T> {
    /// Returns the result if settled, without waiting.
    #[must_use]
    pub fn poll(&self) -> Option<Result<T>> {
        match &*self.cell.slot.lock() {
            Slot::Pending => None,
            Slot::Completed(value) => Some(Ok(value.clone())),
            Slot::Failed(err) => Some(Err(err.clone())),
        }
    }

    /// Waits until the handle is settled.
    ///
    /// # Errors
    ///
    /// Returns the error the request failed with.
    pub async fn wait(&self) -> Result<T> {
        loop {
            let notified = self.cell.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a settle in between is not missed.
            notified.as_mut().enable();

            if let Some(result) = self.poll() {
                return result;
            }

            notified.await;
        }
    }

    /// Waits until the handle is settled or `wait_for` elapses.
    ///
    /// Expiry does not unregister the request.
    ///
    /// # Errors
    ///
    /// - [`Error::ResponseTimeout`] if `wait_for` elapses first
    /// - the error the request failed with
    pub async fn wait_timeout(&self, wait_for: Duration) -> Result<T> {
        match timeout(wait_for, self.wait()).await {
            Ok(result) => result,
            Err(_) => Err(Error::response_timeout(
                self.id,
                millis(wait_for),
            )),
        }
    }

    /// Blocks the current thread until settled or `wait_for` elapses.
    ///
    /// Must not be called from within an async runtime worker.
    ///
    /// # Errors
    ///
    /// - [`Error::ResponseTimeout`] if `wait_for` elapses first
    /// - the error the request failed with
    pub fn blocking_wait(&self, wait_for: Duration) -> Result<T> {
        let mut slot = self.cell.slot.lock();

        if matches!(*slot, Slot::Pending) {
            let _ = self
                .cell
                .settled
                .wait_while_for(&mut slot, |s| matches!(s, Slot::Pending), wait_for);
        }

        match &*slot {
            Slot::Pending => Err(Error::response_timeout(
                self.id,
                millis(wait_for),
            )),
            Slot::Completed(value) => Ok(value.clone()),
            Slot::Failed(err) => Err(err.clone()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
