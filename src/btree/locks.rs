//! # Per-Node Write Locks
//!
//! Writers serialize structural changes to a node through this table while
//! readers run lock-free; the right-link protocol makes every intermediate
//! state a writer publishes safe to traverse.
//!
//! Entries are created on demand and reclaimed when the last interested
//! thread lets go, so the table stays proportional to the set of nodes
//! under active mutation rather than the size of the tree. Each entry
//! pairs a mutex with a reference count covering the owner and any blocked
//! waiters; cleanup double-checks the count under the table mutex before
//! removing an entry.
//!
//! Lock and unlock deliberately do not pair through a guard object: the
//! insert path acquires a node in one stack frame and releases it several
//! frames later (or in a cleanup loop on error), so the table exposes
//! `lock_node`/`unlock_node` and enforces pairing at runtime instead.
//! Unlocking a node that is not locked is a protocol violation and
//! panics.

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::storage::PageId;

/// Per-node lock entry with reference counting for cleanup.
struct NodeLockEntry {
    lock: Mutex<()>,
    ref_count: AtomicU64,
}

impl NodeLockEntry {
    fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            ref_count: AtomicU64::new(1),
        }
    }

    fn acquire(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&self) -> bool {
        self.ref_count.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

pub struct NodeLockTable {
    entries: Mutex<HashMap<PageId, Arc<NodeLockEntry>>>,
    acquired: AtomicU64,
    contended: AtomicU64,
}

impl NodeLockTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            acquired: AtomicU64::new(0),
            contended: AtomicU64::new(0),
        }
    }

    fn get_or_create(&self, id: PageId) -> Arc<NodeLockEntry> {
        let mut map = self.entries.lock();
        if let Some(entry) = map.get(&id) {
            entry.acquire();
            return Arc::clone(entry);
        }
        let entry = Arc::new(NodeLockEntry::new());
        map.insert(id, Arc::clone(&entry));
        entry
    }

    fn try_cleanup(&self, id: PageId, entry: &NodeLockEntry) {
        if entry.release() {
            let mut map = self.entries.lock();
            // Double-check ref_count is still 0 under lock
            if entry.ref_count.load(Ordering::Acquire) == 0 {
                map.remove(&id);
            }
        }
    }

    /// Blocks until this thread holds the write lock for node `id`.
    pub fn lock_node(&self, id: PageId) {
        let entry = self.get_or_create(id);

        let guard = match entry.lock.try_lock() {
            Some(guard) => guard,
            None => {
                self.contended.fetch_add(1, Ordering::Relaxed);
                trace!(node = id, "waiting for node lock");
                entry.lock.lock()
            }
        };
        self.acquired.fetch_add(1, Ordering::Relaxed);
        // The lock outlives this frame; the matching force_unlock lives in
        // unlock_node
        mem::forget(guard);
    }

    /// Releases the write lock for node `id`.
    ///
    /// Panics if the node is not locked: an unlock without a matching lock
    /// means the caller's lock discipline is broken, and continuing would
    /// corrupt the tree.
    pub fn unlock_node(&self, id: PageId) {
        let entry = {
            let map = self.entries.lock();
            map.get(&id)
                .cloned()
                .unwrap_or_else(|| panic!("unlock of node {} which is not locked", id))
        };

        // SAFETY: this thread owns the lock forgotten in lock_node.
        unsafe { entry.lock.force_unlock() };

        self.try_cleanup(id, &entry);
    }

    /// Total locks taken so far.
    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::Relaxed)
    }

    /// How many of those had to wait for another writer.
    pub fn contended(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn live_entries(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for NodeLockTable {
    fn default() -> Self {
        Self::new()
    }
}
