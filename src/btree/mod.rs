//! # B-Link Tree
//!
//! The index structure: a B-tree whose nodes each carry a link to their
//! right sibling, which lets readers traverse without locks and writers
//! hold at most two node locks while splitting.
//!
//! Module layout:
//!
//! - [`node`] — leaf/branch data model, routing, upsert and split logic
//! - [`codec`] — node <-> fixed-size page image serialization
//! - [`locks`] — on-demand per-node write locks
//! - [`tree`] — the tree itself: lookup, insert, split propagation, root
//!   growth

pub(crate) mod codec;
mod locks;
pub mod node;
mod tree;

pub use node::{Node, Upsert};
pub use tree::{BLinkTree, RootInfo};
