//! Page-0 superblock.
//!
//! The first page of a store file carries a fixed 40-byte header:
//!
//! ```text
//! Offset  Size  Field      Description
//! ------  ----  ---------  -----------------------------------------
//! 0       16    magic      "linkdb v1" padded with NULs
//! 16      4     version    format version, currently 1
//! 20      4     page_size  fixed at creation, validated on reopen
//! 24      8     root_id    page id of the tree root, -1 before init
//! 32      8     reserved
//! ```
//!
//! The rest of page 0 is unused. The root id is the only mutable field; it
//! is rewritten whenever the tree grows a new top level so the tree can be
//! reopened from the file alone.

use eyre::{ensure, Result};
use zerocopy::little_endian::{I64, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::{PageId, NO_NODE, SUPERBLOCK_SIZE};

pub const STORE_MAGIC: &[u8; 16] = b"linkdb v1\x00\x00\x00\x00\x00\x00\x00";
pub const CURRENT_VERSION: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Superblock {
    magic: [u8; 16],
    version: U32,
    page_size: U32,
    root_id: I64,
    reserved: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<Superblock>() == SUPERBLOCK_SIZE);

impl Superblock {
    pub fn new(page_size: u32) -> Self {
        Self {
            magic: *STORE_MAGIC,
            version: U32::new(CURRENT_VERSION),
            page_size: U32::new(page_size),
            root_id: I64::new(NO_NODE),
            reserved: [0u8; 8],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= SUPERBLOCK_SIZE,
            "buffer too small for Superblock: {} < {}",
            bytes.len(),
            SUPERBLOCK_SIZE
        );

        let sb = Self::ref_from_bytes(&bytes[..SUPERBLOCK_SIZE])
            .map_err(|e| eyre::eyre!("failed to parse superblock: {:?}", e))?;

        ensure!(
            &sb.magic == STORE_MAGIC,
            "invalid magic bytes: not a linkdb store file"
        );

        ensure!(
            sb.version.get() == CURRENT_VERSION,
            "unsupported store version: {} (expected {})",
            sb.version.get(),
            CURRENT_VERSION
        );

        Ok(sb)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.get()
    }

    pub fn root_id(&self) -> PageId {
        self.root_id.get()
    }

    pub fn set_root_id(&mut self, id: PageId) {
        self.root_id = I64::new(id);
    }
}
