//! # Page Store
//!
//! `PageStore` owns the single store file and exposes the node-level
//! contract the tree is built on:
//!
//! - `read_node(id)` — decode the node persisted at page `id`
//! - `write_node(node)` — persist a node, assigning a fresh page id if the
//!   node has never been written
//! - `root_id()` / `update_root_id(id)` — the persisted root pointer
//!
//! ## Id Allocation
//!
//! Page ids come from an atomic counter seeded with
//! `max(1, file_len / page_size)` on open, so reopening a store resumes
//! allocation after the last written page. Ids are never reused: there is
//! no deletion and therefore no freelist.
//!
//! ## I/O Model
//!
//! All reads and writes are positioned (`pread`/`pwrite` style) through a
//! shared file handle, so any number of threads can issue I/O through
//! `&self`. The striped lock keyed by page id keeps a concurrent read and
//! write of the *same* page from tearing; distinct pages proceed fully in
//! parallel.
//!
//! ## Failure Semantics
//!
//! Any I/O error is surfaced to the caller and treated as fatal by the
//! tree: a short read or failed write means the store can no longer be
//! trusted, and nothing here retries.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use eyre::{ensure, Result, WrapErr};
use tracing::debug;
use zerocopy::IntoBytes;

use crate::btree::codec;
use crate::btree::Node;

use super::striped::StripedLock;
use super::superblock::Superblock;
use super::{PageId, MIN_PAGE_SIZE, NO_NODE, SUPERBLOCK_SIZE};

/// Store creation options. `page_size` only applies when the file is
/// created; reopening an existing store adopts the size persisted in its
/// superblock.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    pub page_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            page_size: super::DEFAULT_PAGE_SIZE,
        }
    }
}

pub struct PageStore {
    file: File,
    page_size: usize,
    striped: StripedLock,
    next_page_id: AtomicI64,
    root_id: AtomicI64,
}

impl PageStore {
    /// Opens or creates the store file at `path`.
    pub fn open(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        let path = path.as_ref();
        ensure!(
            options.page_size >= MIN_PAGE_SIZE,
            "page size {} is below the minimum of {}",
            options.page_size,
            MIN_PAGE_SIZE
        );

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open store file {}", path.display()))?;

        let file_len = file
            .metadata()
            .wrap_err("failed to stat store file")?
            .len();

        let (page_size, root_id) = if file_len == 0 {
            let sb = Superblock::new(options.page_size as u32);
            let mut page0 = vec![0u8; options.page_size];
            page0[..SUPERBLOCK_SIZE].copy_from_slice(sb.as_bytes());
            file.write_all_at(&page0, 0)
                .wrap_err("failed to write superblock")?;
            debug!(path = %path.display(), page_size = options.page_size, "created store");
            (options.page_size, NO_NODE)
        } else {
            let mut buf = [0u8; SUPERBLOCK_SIZE];
            file.read_exact_at(&mut buf, 0)
                .wrap_err("failed to read superblock")?;
            let sb = Superblock::from_bytes(&buf)?;
            let page_size = sb.page_size() as usize;
            ensure!(
                page_size >= MIN_PAGE_SIZE,
                "superblock declares page size {}, below the minimum of {}",
                page_size,
                MIN_PAGE_SIZE
            );
            debug!(
                path = %path.display(),
                page_size,
                root = sb.root_id(),
                "opened existing store"
            );
            (page_size, sb.root_id())
        };

        let file_len = file
            .metadata()
            .wrap_err("failed to stat store file")?
            .len();
        let next_page_id = (file_len / page_size as u64).max(1) as i64;

        Ok(Self {
            file,
            page_size,
            striped: StripedLock::new(),
            next_page_id: AtomicI64::new(next_page_id),
            root_id: AtomicI64::new(root_id),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn root_id(&self) -> PageId {
        self.root_id.load(Ordering::Acquire)
    }

    /// Persists `id` as the tree root and publishes it to other threads.
    pub fn update_root_id(&self, id: PageId) -> Result<()> {
        self.striped.run_write(0, || {
            let mut sb = Superblock::new(self.page_size as u32);
            sb.set_root_id(id);
            self.file
                .write_all_at(sb.as_bytes(), 0)
                .wrap_err("failed to persist root id")
        })?;
        self.root_id.store(id, Ordering::Release);
        Ok(())
    }

    /// Reads and decodes the node stored at page `id`.
    pub fn read_node(&self, id: PageId) -> Result<Node> {
        ensure!(id >= 1, "page id {} is not a valid node page", id);

        let mut buf = vec![0u8; self.page_size];
        self.striped.run_read(id, || {
            self.file
                .read_exact_at(&mut buf, id as u64 * self.page_size as u64)
                .wrap_err_with(|| format!("failed to read page {}", id))
        })?;

        codec::decode(&buf, id)
    }

    /// Encodes and persists `node`, assigning a fresh page id first if the
    /// node has never been written. Returns the node's id.
    pub fn write_node(&self, node: &mut Node) -> Result<PageId> {
        let image = codec::encode(node, self.page_size)?;

        let id = match node.id() {
            Some(id) => id,
            None => {
                let id = self.next_page_id.fetch_add(1, Ordering::Relaxed);
                node.set_id(id);
                id
            }
        };

        self.striped.run_write(id, || {
            self.file
                .write_all_at(&image, id as u64 * self.page_size as u64)
                .wrap_err_with(|| format!("failed to write page {}", id))
        })?;

        Ok(id)
    }
}
