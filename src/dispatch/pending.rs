//! Table of outstanding requests.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;

use crate::error::Error;
use crate::identifiers::RequestId;

use super::handle::Completer;
use super::limiter::InflightPermit;

// ============================================================================
// PendingEntry
// ============================================================================

/// One outstanding request.
///
/// Owns the completer and, for ordinary requests, the inflight slot. The
/// slot is released when the entry is dropped.
#[derive(Debug)]
pub(crate) struct PendingEntry<T> {
    pub(crate) completer: Completer<T>,
    pub(crate) permit: Option<InflightPermit>,
}

impl<T> PendingEntry<T> {
    /// Settles the handle with a value, consuming the entry.
    pub(crate) fn complete(self, value: T) {
        let Self { completer, permit } = self;
        drop(permit);
        completer.complete(value);
    }

    /// Settles the handle with an error, consuming the entry.
    pub(crate) fn fail(self, err: Error) {
        let Self { completer, permit } = self;
        drop(permit);
        completer.fail(err);
    }
}

// ============================================================================
// PendingTable
// ============================================================================

/// Map of in-flight request IDs to their entries.
///
/// Not synchronized; the dispatcher owns it behind its lock and callers
/// never reach it directly.
#[derive(Debug)]
pub(crate) struct PendingTable<T> {
    entries: FxHashMap<RequestId, PendingEntry<T>>,
}

impl<T> Default for PendingTable<T> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<T> PendingTable<T> {
    /// Inserts an entry. The id must not already be present.
    pub(crate) fn insert(&mut self, entry: PendingEntry<T>) {
        let id = entry.completer.id();
        let previous = self.entries.insert(id, entry);
        debug_assert!(previous.is_none(), "request id {id} registered twice");
    }

    /// Removes and returns the entry for `id`.
    pub(crate) fn remove(&mut self, id: RequestId) -> Option<PendingEntry<T>> {
        self.entries.remove(&id)
    }

    /// Returns `true` if `id` is outstanding.
    pub(crate) fn contains(&self, id: RequestId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Removes every entry.
    pub(crate) fn drain(&mut self) -> Vec<PendingEntry<T>> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::dispatch::handle::{ResultHandle, result_channel};

    fn entry(id: u32) -> (ResultHandle<u32>, PendingEntry<u32>) {
        let (handle, completer) = result_channel(RequestId::new(id));
        (
            handle,
            PendingEntry {
                completer,
                permit: None,
            },
        )
    }

    #[test]
    fn test_insert_and_remove() {
        let mut table = PendingTable::default();
        let (handle, e) = entry(1);
        table.insert(e);

        assert!(table.contains(RequestId::new(1)));
        assert_eq!(table.len(), 1);

        table.remove(RequestId::new(1)).expect("present").complete(10);
        assert!(table.is_empty());
        assert_eq!(handle.poll().expect("settled").expect("ok"), 10);
    }

    #[test]
    fn test_remove_missing_is_none() {
        let mut table: PendingTable<u32> = PendingTable::default();
        assert!(table.remove(RequestId::new(5)).is_none());
    }

    #[test]
    fn test_drain_empties_table() {
        let mut table = PendingTable::default();
        let (h1, e1) = entry(1);
        let (h2, e2) = entry(2);
        table.insert(e1);
        table.insert(e2);

        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert!(table.is_empty());

        for e in drained {
            e.fail(Error::closing("drained"));
        }
        assert!(h1.poll().expect("settled").is_err());
        assert!(h2.poll().expect("settled").is_err());
    }
}
