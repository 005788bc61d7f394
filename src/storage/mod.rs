//! # Storage Module
//!
//! The storage layer persists tree nodes as fixed-size pages in a single
//! growable file and knows nothing about tree invariants.
//!
//! ## File Layout
//!
//! ```text
//! +--------------------+
//! | Page 0: superblock |  magic, version, page size, root id
//! +--------------------+
//! | Page 1: node       |  one serialized node per page
//! +--------------------+
//! | Page 2: node       |
//! | ...                |
//! +--------------------+
//! ```
//!
//! Page ids double as file offsets (`id * page_size`), so ids start at 1 and
//! are never reused; the store only ever appends pages.
//!
//! ## Concurrency Contract
//!
//! All `PageStore` methods take `&self` and are safe to call from any number
//! of threads. A striped read/write lock keyed by a hash of the page id
//! protects a single page's bytes against torn reads and writes. That is the
//! full extent of the storage layer's synchronization: tree-level invariants
//! (who may mutate which node when) are enforced one layer up by the
//! per-node logical locks in [`crate::btree`].
//!
//! ## Module Organization
//!
//! - `superblock`: page-0 header with magic, version, and the root pointer
//! - `striped`: striped read/write lock over page ids
//! - `pager`: the `PageStore` itself (open/create, read/write node, root id)

mod pager;
mod striped;
mod superblock;

pub use pager::{Options, PageStore};
pub use striped::StripedLock;
pub use superblock::{Superblock, CURRENT_VERSION, STORE_MAGIC};

/// Page number within the store file. Negative values never name a real
/// page; [`NO_NODE`] is the "no link / no root" sentinel.
pub type PageId = i64;

/// Sentinel for "no node": a missing right-link or an uninitialized root.
pub const NO_NODE: PageId = -1;

pub const DEFAULT_PAGE_SIZE: usize = 8192;

/// Smallest page a store will accept. Must leave room for the superblock on
/// page 0 and at least one small cell plus the link slot on node pages.
pub const MIN_PAGE_SIZE: usize = 64;

pub const SUPERBLOCK_SIZE: usize = 40;
