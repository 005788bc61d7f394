//! Striped read/write lock over page ids.
//!
//! Guards a single page's bytes during a concurrent read or write so that a
//! reader never observes a torn page. Stripes trade memory for contention:
//! two pages hashing to the same stripe serialize against each other, which
//! is harmless because the critical sections are one positioned I/O call.
//!
//! This lock is strictly an I/O-level protection. It is never used to
//! enforce tree-structure invariants; those belong to the per-node logical
//! lock in `crate::btree::locks`.

use parking_lot::RwLock;

use super::PageId;

const STRIPE_COUNT: usize = 1024;

pub struct StripedLock {
    stripes: Vec<RwLock<()>>,
}

impl StripedLock {
    pub fn new() -> Self {
        Self {
            stripes: (0..STRIPE_COUNT).map(|_| RwLock::new(())).collect(),
        }
    }

    fn stripe(&self, id: PageId) -> &RwLock<()> {
        &self.stripes[id as usize & (STRIPE_COUNT - 1)]
    }

    pub fn run_read<T>(&self, id: PageId, f: impl FnOnce() -> T) -> T {
        let _guard = self.stripe(id).read();
        f()
    }

    pub fn run_write<T>(&self, id: PageId, f: impl FnOnce() -> T) -> T {
        let _guard = self.stripe(id).write();
        f()
    }
}

impl Default for StripedLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn read_sections_run_concurrently() {
        let lock = Arc::new(StripedLock::new());
        let in_section = Arc::new(AtomicU64::new(0));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let in_section = Arc::clone(&in_section);
            handles.push(thread::spawn(move || {
                lock.run_read(1, || {
                    in_section.fetch_add(1, Ordering::SeqCst);
                    // wait until every reader is inside the section at once
                    while in_section.load(Ordering::SeqCst) < 4 {
                        thread::yield_now();
                    }
                });
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn write_sections_are_exclusive_per_stripe() {
        let lock = Arc::new(StripedLock::new());
        let counter = Arc::new(AtomicU64::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            let counter = Arc::clone(&counter);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    lock.run_write(42, || {
                        let seen = counter.load(Ordering::Relaxed);
                        counter.store(seen + 1, Ordering::Relaxed);
                    });
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        // non-atomic increment under the stripe lock must not lose updates
        assert_eq!(counter.load(Ordering::Relaxed), 8000);
    }

    #[test]
    fn distinct_stripes_do_not_block() {
        let lock = StripedLock::new();
        lock.run_write(1, || {
            lock.run_write(2, || {});
        });
    }
}
