//! # Node Data Model
//!
//! Leaf and branch nodes share routing behavior and differ only in payload:
//! a leaf pairs each key with a stored value, a branch pairs each key with
//! a child pointer. Both carry a right-link to their sibling at the same
//! height, which is what makes concurrent splits recoverable (a traversal
//! that lands left of where a key moved simply hops right).
//!
//! ## Shared Shape
//!
//! ```text
//! Leaf:   keys [k0 .. kN-1]   values [v0 .. vN-1, link]
//! Branch: keys [k0 .. kN-1]   pointers [c0 .. cN-1, link]
//! ```
//!
//! Keys are strictly increasing. `keys[i]` is the *inclusive* upper bound
//! of the subtree under `pointers[i]`: routing a key equal to `keys[i]`
//! descends at slot `i`. The last key is a forward-only "biggest key"
//! watermark — it is extended when a child's range grows past it, never
//! shrunk — so `should_go_right` can compare against it safely while
//! siblings split underneath.
//!
//! ## Upsert and Split
//!
//! `Leaf::upsert` and `Branch::upsert_child` mutate a node and report
//! either `Upsert::Intact` (fits in one page) or `Upsert::Split` with the
//! left half (keeping the original id), the right half (no id yet), and
//! the promoted separator. The split boundary balances *serialized bytes*,
//! not element counts, because keys and values vary in length: starting
//! from the leftmost cell, the boundary shifts right while doing so
//! narrows the gap between the halves' encoded sizes.
//!
//! The promoted key is the largest key kept in the left half. With
//! inclusive-upper-bound routing this is the only correct choice: keys
//! equal to the separator must keep descending into the left half.

use crate::storage::{PageId, NO_NODE};
use crate::value::Value;

use super::codec;

/// Outcome of a node mutation.
#[derive(Debug)]
pub enum Upsert {
    /// The node absorbed the update and still fits in one page.
    Intact(Node),
    /// The node overflowed. `left` keeps the original page id; `right` has
    /// none until persisted; `promoted` must be inserted into the parent.
    Split {
        left: Node,
        right: Node,
        promoted: Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    pub(crate) id: Option<PageId>,
    pub(crate) leftmost: bool,
    pub(crate) height: u16,
    pub(crate) keys: Vec<Value>,
    /// One value per key plus a trailing slot holding the right-link as an
    /// 8-byte page id.
    pub(crate) values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub(crate) id: Option<PageId>,
    pub(crate) leftmost: bool,
    pub(crate) height: u16,
    pub(crate) keys: Vec<Value>,
    /// One child per key plus a trailing slot holding the right-link,
    /// `NO_NODE` when this is the rightmost branch at its height.
    pub(crate) pointers: Vec<PageId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Leaf(Leaf),
    Branch(Branch),
}

impl Leaf {
    pub fn new(
        id: Option<PageId>,
        leftmost: bool,
        height: u16,
        keys: Vec<Value>,
        values: Vec<Value>,
    ) -> Self {
        debug_assert_eq!(values.len(), keys.len() + 1);
        debug_assert!(keys.windows(2).all(|w| w[0] < w[1]));
        Self {
            id,
            leftmost,
            height,
            keys,
            values,
        }
    }

    /// The single empty leaf a fresh tree starts from.
    pub fn empty_root() -> Self {
        Self {
            id: None,
            leftmost: true,
            height: 1,
            keys: Vec::new(),
            values: vec![Value::from_page_id(NO_NODE)],
        }
    }

    pub fn link(&self) -> PageId {
        let slot = self.values.last().expect("leaf value array is never empty");
        slot.as_page_id().expect("leaf link slot holds an 8-byte page id")
    }

    pub fn set_link(&mut self, id: PageId) {
        let slot = self.values.last_mut().expect("leaf value array is never empty");
        *slot = Value::from_page_id(id);
    }

    pub fn value_for(&self, key: &Value) -> Option<&Value> {
        match self.keys.binary_search(key) {
            Ok(idx) => Some(&self.values[idx]),
            Err(_) => None,
        }
    }

    pub fn should_go_right(&self, key: &Value) -> bool {
        match self.keys.last() {
            Some(last) => last < key && self.link() != NO_NODE,
            None => false,
        }
    }

    pub fn next_node(&self, key: &Value) -> PageId {
        if self.should_go_right(key) {
            self.link()
        } else {
            NO_NODE
        }
    }

    /// Inserts or replaces `key`, splitting if the result no longer fits in
    /// `capacity` bytes.
    pub fn upsert(mut self, key: &Value, value: Value, capacity: usize) -> Upsert {
        match self.keys.binary_search(key) {
            Ok(idx) => self.values[idx] = value,
            Err(idx) => {
                self.keys.insert(idx, key.clone());
                self.values.insert(idx, value);
            }
        }
        // A lone oversize cell cannot be split; let the encoder report it
        if codec::leaf_size(&self) <= capacity || self.keys.len() < 2 {
            return Upsert::Intact(Node::Leaf(self));
        }
        self.split()
    }

    fn split(mut self) -> Upsert {
        let cell = |i: usize| codec::leaf_cell_size(&self.keys[i], &self.values[i]);
        let mid = split_point(self.keys.len(), cell);

        let promoted = self.keys[mid].clone();
        let right_keys = self.keys.split_off(mid + 1);
        let right_values = self.values.split_off(mid + 1);
        // the right half inherits the original link; the left half's link is
        // installed by the caller once the right half has an id
        self.values.push(Value::from_page_id(NO_NODE));

        let right = Leaf::new(None, false, self.height, right_keys, right_values);
        Upsert::Split {
            left: Node::Leaf(self),
            right: Node::Leaf(right),
            promoted,
        }
    }
}

impl Branch {
    pub fn new(
        id: Option<PageId>,
        leftmost: bool,
        height: u16,
        keys: Vec<Value>,
        pointers: Vec<PageId>,
    ) -> Self {
        debug_assert_eq!(pointers.len(), keys.len() + 1);
        debug_assert!(keys.windows(2).all(|w| w[0] < w[1]));
        Self {
            id,
            leftmost,
            height,
            keys,
            pointers,
        }
    }

    /// The branch installed when the tree grows a new top level: two keys
    /// (the promoted separator and the right child's biggest key), two
    /// children, no right-link.
    pub fn new_root(
        promoted: Value,
        right_max: Value,
        left_child: PageId,
        right_child: PageId,
        height: u16,
    ) -> Self {
        Self::new(
            None,
            true,
            height,
            vec![promoted, right_max],
            vec![left_child, right_child, NO_NODE],
        )
    }

    pub fn link(&self) -> PageId {
        *self.pointers.last().expect("branch pointer array is never empty")
    }

    pub fn set_link(&mut self, id: PageId) {
        let slot = self
            .pointers
            .last_mut()
            .expect("branch pointer array is never empty");
        *slot = id;
    }

    pub fn first_child(&self) -> PageId {
        self.pointers[0]
    }

    pub fn biggest_key(&self) -> Option<&Value> {
        self.keys.last()
    }

    pub fn should_go_right(&self, key: &Value) -> bool {
        match self.keys.last() {
            Some(last) => last < key && self.link() != NO_NODE,
            None => false,
        }
    }

    /// Routes `key` to a child pointer, or to the right-link when the key
    /// lies past this node's biggest key and a right sibling exists.
    pub fn next_node(&self, key: &Value) -> PageId {
        let idx = match self.keys.binary_search(key) {
            Ok(idx) => idx,
            Err(idx) => idx,
        };
        let pointer = self.pointers[idx];
        if pointer == NO_NODE && idx > 0 {
            // the trailing link slot is not a data pointer; fall back to the
            // last real child
            self.pointers[idx - 1]
        } else {
            pointer
        }
    }

    /// Inserts the promotion `(key -> child)` produced by a split one level
    /// below, extending the biggest-key watermark to `new_max` (the right
    /// child's biggest key) first.
    pub fn upsert_child(
        mut self,
        key: &Value,
        child: PageId,
        new_max: &Value,
        capacity: usize,
    ) -> Upsert {
        if let Some(last) = self.keys.last_mut() {
            if &*last < new_max {
                *last = new_max.clone();
            }
        }

        match self.keys.binary_search(key) {
            Ok(idx) => self.pointers[idx] = child,
            Err(idx) => {
                self.keys.insert(idx, key.clone());
                // the new child covers the range *above* the promoted key,
                // so its pointer lands one slot to the right
                self.pointers.insert(idx + 1, child);
            }
        }

        if codec::branch_size(&self) <= capacity {
            return Upsert::Intact(Node::Branch(self));
        }
        self.split()
    }

    fn split(mut self) -> Upsert {
        let cell = |i: usize| codec::branch_cell_size(&self.keys[i]);
        let mid = split_point(self.keys.len(), cell);

        let promoted = self.keys[mid].clone();
        let right_keys = self.keys.split_off(mid + 1);
        let right_pointers = self.pointers.split_off(mid + 1);
        self.pointers.push(NO_NODE);

        let right = Branch::new(None, false, self.height, right_keys, right_pointers);
        Upsert::Split {
            left: Node::Branch(self),
            right: Node::Branch(right),
            promoted,
        }
    }
}

/// Picks the split boundary: the index of the last key kept in the left
/// half. Starting at cell 0, the boundary shifts right while moving the
/// next cell to the left side reduces the gap between the halves' encoded
/// sizes. Because sizes are positive, the loop can never consume the final
/// cell, so the right half is never empty.
fn split_point(count: usize, cell: impl Fn(usize) -> usize) -> usize {
    debug_assert!(count >= 2, "cannot split a node with {count} cells");
    let total: usize = (0..count).map(&cell).sum();

    let mut mid = 0;
    let mut left_size = cell(0);
    let mut right_size = total - left_size;
    while mid < count - 1 {
        let next = cell(mid + 1);
        let current_gap = left_size.abs_diff(right_size);
        let shifted_gap = (left_size + next).abs_diff(right_size - next);
        if shifted_gap >= current_gap {
            break;
        }
        mid += 1;
        left_size += next;
        right_size -= next;
    }
    mid
}

impl Node {
    pub fn id(&self) -> Option<PageId> {
        match self {
            Node::Leaf(leaf) => leaf.id,
            Node::Branch(branch) => branch.id,
        }
    }

    pub fn set_id(&mut self, id: PageId) {
        match self {
            Node::Leaf(leaf) => leaf.id = Some(id),
            Node::Branch(branch) => branch.id = Some(id),
        }
    }

    pub fn height(&self) -> u16 {
        match self {
            Node::Leaf(leaf) => leaf.height,
            Node::Branch(branch) => branch.height,
        }
    }

    pub fn is_leftmost(&self) -> bool {
        match self {
            Node::Leaf(leaf) => leaf.leftmost,
            Node::Branch(branch) => branch.leftmost,
        }
    }

    pub fn link(&self) -> PageId {
        match self {
            Node::Leaf(leaf) => leaf.link(),
            Node::Branch(branch) => branch.link(),
        }
    }

    pub fn set_link(&mut self, id: PageId) {
        match self {
            Node::Leaf(leaf) => leaf.set_link(id),
            Node::Branch(branch) => branch.set_link(id),
        }
    }

    pub fn biggest_key(&self) -> Option<&Value> {
        match self {
            Node::Leaf(leaf) => leaf.keys.last(),
            Node::Branch(branch) => branch.biggest_key(),
        }
    }

    /// Where a traversal looking for `key` goes from this node: a child
    /// pointer or right-link to follow, or `NO_NODE` when the search ends
    /// here (leaves only).
    pub fn next_node(&self, key: &Value) -> PageId {
        match self {
            Node::Leaf(leaf) => leaf.next_node(key),
            Node::Branch(branch) => branch.next_node(key),
        }
    }

    /// True when `id` names this node's right sibling. Nodes reached by a
    /// right-link are siblings, not ancestors, and must never be pushed on
    /// the split-propagation stack.
    pub fn is_right_link(&self, id: PageId) -> bool {
        id != NO_NODE && self.link() == id
    }

    pub fn into_leaf(self) -> eyre::Result<Leaf> {
        match self {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Branch(branch) => eyre::bail!(
                "expected a leaf at page {:?}, found a branch at height {}",
                branch.id,
                branch.height
            ),
        }
    }

    pub fn into_branch(self) -> eyre::Result<Branch> {
        match self {
            Node::Branch(branch) => Ok(branch),
            Node::Leaf(leaf) => eyre::bail!(
                "expected a branch at page {:?}, found a leaf",
                leaf.id
            ),
        }
    }
}
