//! # Concurrent B-Link Tree
//!
//! Lookup and insert over the nodes in [`super::node`], composed on the
//! page store and the per-node lock table. Readers never take a lock;
//! writers hold at most two per-node locks at any instant.
//!
//! ## Why Readers Get Away With No Locks
//!
//! A split publishes its intermediate states in an order that keeps every
//! key reachable at every moment: the right half is written first, then
//! the left half with its right-link pointing at it, and only afterwards
//! does the parent learn about the new child. A traversal that reads the
//! left half before the parent update simply finds keys past the left
//! half's biggest key by hopping the right-link. The biggest-key
//! watermark only ever moves forward, so "is the key past this node"
//! stays a safe question even on a stale read.
//!
//! ## Split Propagation
//!
//! The insert descent records the branch ids it descends through (skipping
//! nodes reached via right-links, which are siblings rather than
//! ancestors). When a leaf splits, the promoted separator climbs that
//! stack: lock the candidate parent, crab right to the branch that owns
//! the separator, insert it, release the child, repeat while splits keep
//! cascading.
//!
//! When the stack runs dry below the current tree height, a concurrent
//! writer grew the tree after this writer's descent began. The
//! leftmost-node registry — one entry per height, written inside the
//! root-growth critical section — supplies a starting node at the needed
//! height, and normal right-link crabbing finds the true parent from
//! there.
//!
//! ## Root Growth
//!
//! The root is recognized structurally: the only node at its height that
//! is both leftmost and rightmost. When it splits, a new branch over the
//! two halves is written and the shared (root id, height) pair is swapped
//! in one critical section, together with the registry entry for the new
//! height. Height never decreases.

use std::path::Path;
use std::thread;
use std::time::Duration;

use eyre::{bail, eyre, Result};
use hashbrown::HashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::storage::{Options, PageId, PageStore, NO_NODE};
use crate::value::Value;

use super::locks::NodeLockTable;
use super::node::{Branch, Leaf, Node, Upsert};

/// How many times a writer polls the leftmost-node registry for a height
/// it cannot see yet, and how long it pauses between polls. The entry is
/// written before the growing writer releases any lock, so a miss only
/// lasts as long as the publishing critical section.
const REGISTRY_RETRY_LIMIT: u32 = 10;
const REGISTRY_RETRY_PAUSE: Duration = Duration::from_millis(1);

/// The shared (root id, height) pair. Swapped whole under a lock so no
/// thread ever observes a root id paired with the wrong height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootInfo {
    pub id: PageId,
    pub height: u16,
}

pub struct BLinkTree {
    store: PageStore,
    locks: NodeLockTable,
    root: RwLock<RootInfo>,
    /// Height -> leftmost node id at that height. Grows by one entry per
    /// root-growth event, never shrinks.
    leftmost: RwLock<HashMap<u16, PageId>>,
}

/// Ids of per-node locks this thread currently holds, released in reverse
/// order if an insert errors out partway.
type HeldLocks = SmallVec<[PageId; 4]>;

impl BLinkTree {
    /// Opens the tree stored at `path`, creating an empty one if the file
    /// is new.
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        let store = PageStore::open(path, options)?;

        let mut leftmost = HashMap::new();
        let root = if store.root_id() == NO_NODE {
            let mut node = Node::Leaf(Leaf::empty_root());
            let id = store.write_node(&mut node)?;
            store.update_root_id(id)?;
            leftmost.insert(1, id);
            debug!(root = id, "initialized empty tree");
            RootInfo { id, height: 1 }
        } else {
            let id = store.root_id();
            let node = store.read_node(id)?;
            let height = node.height();

            // Rebuild the registry by walking the leftmost spine down from
            // the root.
            let mut spine_id = id;
            let mut spine = node;
            loop {
                leftmost.insert(spine.height(), spine_id);
                match spine {
                    Node::Leaf(_) => break,
                    Node::Branch(ref branch) => {
                        spine_id = branch.first_child();
                        spine = store.read_node(spine_id)?;
                    }
                }
            }

            debug!(root = id, height, "opened tree");
            RootInfo { id, height }
        };

        Ok(Self {
            store,
            locks: NodeLockTable::new(),
            root: RwLock::new(root),
            leftmost: RwLock::new(leftmost),
        })
    }

    pub fn root(&self) -> RootInfo {
        *self.root.read()
    }

    pub fn height(&self) -> u16 {
        self.root.read().height
    }

    /// Looks up `key`, lock-free. A concurrent split may cost the
    /// traversal an extra right hop or two but never hides a key.
    pub fn get(&self, key: &Value) -> Result<Option<Value>> {
        let mut id = self.root.read().id;
        loop {
            let node = self.store.read_node(id)?;
            match node {
                Node::Leaf(leaf) => {
                    let next = leaf.next_node(key);
                    if next == NO_NODE {
                        return Ok(leaf.value_for(key).cloned());
                    }
                    id = next;
                }
                Node::Branch(branch) => {
                    id = branch.next_node(key);
                }
            }
        }
    }

    /// Inserts `key -> value`, replacing any existing value for the key.
    pub fn insert(&self, key: Value, value: Value) -> Result<()> {
        let mut held = HeldLocks::new();
        let result = self.insert_inner(&key, value, &mut held);
        if result.is_err() {
            // back out of the lock protocol so other writers are not
            // wedged behind a failed insert
            for id in held.drain(..) {
                self.locks.unlock_node(id);
            }
        }
        result
    }

    fn lock_tracked(&self, held: &mut HeldLocks, id: PageId) {
        self.locks.lock_node(id);
        held.push(id);
    }

    fn unlock_tracked(&self, held: &mut HeldLocks, id: PageId) {
        self.locks.unlock_node(id);
        if let Some(pos) = held.iter().rposition(|&h| h == id) {
            held.remove(pos);
        }
    }

    fn insert_inner(&self, key: &Value, value: Value, held: &mut HeldLocks) -> Result<()> {
        let capacity = self.store.page_size();

        // Unlocked descent to a leaf, recording ancestors. A node reached
        // through a right-link is a sibling and stays off the stack.
        let mut stack: SmallVec<[PageId; 8]> = SmallVec::new();
        let mut id = self.root.read().id;
        let mut node = self.store.read_node(id)?;
        while let Node::Branch(_) = node {
            let next = node.next_node(key);
            if !node.is_right_link(next) {
                stack.push(id);
            }
            id = next;
            node = self.store.read_node(id)?;
        }

        // Lock-couple to the leaf that owns the key now. The descent was
        // unlocked, so the range may have moved right in the meantime.
        self.lock_tracked(held, id);
        let mut node = self.store.read_node(id)?;
        loop {
            let next = node.next_node(key);
            if next == NO_NODE {
                break;
            }
            trace!(from = id, to = next, "key range moved right during descent");
            self.lock_tracked(held, next);
            self.unlock_tracked(held, id);
            id = next;
            node = self.store.read_node(id)?;
        }

        let mut outcome = node.into_leaf()?.upsert(key, value, capacity);

        // Promotion loop: one iteration per level that splits.
        loop {
            match outcome {
                Upsert::Intact(mut node) => {
                    let id = self.store.write_node(&mut node)?;
                    self.unlock_tracked(held, id);
                    return Ok(());
                }
                Upsert::Split {
                    mut left,
                    mut right,
                    promoted,
                } => {
                    // Publish right half first, then the left half pointing
                    // at it. Between the two writes every key is reachable
                    // through the left half's old state.
                    let right_id = self.store.write_node(&mut right)?;

                    // The right half inherited the pre-split link, so the
                    // split node was the root iff it was leftmost and had
                    // no right sibling.
                    let was_root = left.is_leftmost() && right.link() == NO_NODE;

                    left.set_link(right_id);
                    let left_id = self.store.write_node(&mut left)?;

                    let right_max = right
                        .biggest_key()
                        .cloned()
                        .ok_or_else(|| eyre!("split produced an empty right half"))?;

                    if was_root {
                        self.grow_root(promoted, right_max, left_id, right_id, left.height())?;
                        self.unlock_tracked(held, left_id);
                        return Ok(());
                    }

                    let target_height = left.height() + 1;
                    let parent_id = match stack.pop() {
                        Some(id) => id,
                        None => self.leftmost_at_height(target_height)?,
                    };

                    // Crab right along the parent level until we hold the
                    // branch whose range covers the promoted key.
                    self.lock_tracked(held, parent_id);
                    let mut pid = parent_id;
                    let mut parent = self.store.read_node(pid)?;
                    loop {
                        let next = parent.next_node(&promoted);
                        if !parent.is_right_link(next) {
                            break;
                        }
                        self.lock_tracked(held, next);
                        self.unlock_tracked(held, pid);
                        pid = next;
                        parent = self.store.read_node(pid)?;
                    }

                    outcome =
                        parent
                            .into_branch()?
                            .upsert_child(&promoted, right_id, &right_max, capacity);
                    self.unlock_tracked(held, left_id);
                }
            }
        }
    }

    /// Installs a new root branch over a freshly split old root. The store
    /// write, registry entry, and shared root swap all happen inside one
    /// critical section so no thread can observe them out of step.
    fn grow_root(
        &self,
        promoted: Value,
        right_max: Value,
        left_id: PageId,
        right_id: PageId,
        split_height: u16,
    ) -> Result<()> {
        let new_height = split_height + 1;
        let mut node = Node::Branch(Branch::new_root(
            promoted, right_max, left_id, right_id, new_height,
        ));

        let mut root = self.root.write();
        let root_id = self.store.write_node(&mut node)?;
        self.store.update_root_id(root_id)?;
        self.leftmost.write().insert(new_height, root_id);
        *root = RootInfo {
            id: root_id,
            height: new_height,
        };
        drop(root);

        debug!(root = root_id, height = new_height, "tree grew a new level");
        Ok(())
    }

    /// Finds the leftmost node at `height` for a writer whose ancestor
    /// stack predates a concurrent height growth. The registry entry is
    /// published before the growing writer releases any lock, so a short
    /// bounded poll is enough; exhausting it means the growth protocol was
    /// violated and the tree can no longer be trusted.
    fn leftmost_at_height(&self, height: u16) -> Result<PageId> {
        for attempt in 0..REGISTRY_RETRY_LIMIT {
            if let Some(&id) = self.leftmost.read().get(&height) {
                return Ok(id);
            }
            warn!(height, attempt, "no node registered at height yet, retrying");
            thread::sleep(REGISTRY_RETRY_PAUSE);
        }
        bail!(
            "no node registered at height {} after {} attempts; tree structure is inconsistent",
            height,
            REGISTRY_RETRY_LIMIT
        )
    }

    /// Lock-table counters, for tests and benchmarks.
    pub fn lock_stats(&self) -> (u64, u64) {
        (self.locks.acquired(), self.locks.contended())
    }
}
