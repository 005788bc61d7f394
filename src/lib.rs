//! # linkdb - Embedded B-Link Tree Key-Value Store
//!
//! linkdb is an embedded, disk-backed ordered key-value store built on a
//! concurrent B-link tree (Lehman-Yao style). This implementation
//! prioritizes:
//!
//! - **Lock-free reads**: lookups never take a lock, even mid-split
//! - **Bounded writer locking**: a writer holds at most two per-node locks
//! - **Single-file storage**: fixed-size pages, reopenable from disk alone
//!
//! ## Quick Start
//!
//! ```ignore
//! use linkdb::{BLinkTree, Options, Value};
//!
//! let tree = BLinkTree::open("./index.db", Options::default())?;
//!
//! tree.insert(Value::from("language"), Value::from("rust"))?;
//!
//! match tree.get(&Value::from("language"))? {
//!     Some(value) => println!("{:?}", value),
//!     None => println!("not found"),
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │      Public API (BLinkTree)          │
//! ├─────────────────────────────────────┤
//! │  Lookup / Insert / Split Propagation │
//! ├──────────────────┬──────────────────┤
//! │  Node Model +    │  Per-Node Write  │
//! │  Page Codec      │  Locks           │
//! ├──────────────────┴──────────────────┤
//! │  Page Store (positioned file I/O)    │
//! └─────────────────────────────────────┘
//! ```
//!
//! Every node lives in exactly one fixed-size page of a single file. Each
//! node carries a link to its right sibling at the same height; splits
//! publish the right half before touching anything a reader might already
//! hold, which is what makes lock-free lookups sound.
//!
//! ## Module Overview
//!
//! - [`btree`]: the B-link tree — node model, codec, locking, traversal
//! - [`storage`]: page-addressed file storage and the superblock
//! - [`value`]: the immutable byte-string used for keys and values
//!
//! ## Limitations
//!
//! No deletion, no range scans, no transactions, and no multi-process
//! access. Crash recovery is "last written page wins."

pub mod btree;
pub mod storage;
pub mod value;

pub use btree::{BLinkTree, RootInfo};
pub use storage::{Options, PageId, PageStore, DEFAULT_PAGE_SIZE, NO_NODE};
pub use value::Value;
