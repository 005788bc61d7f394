//! Immutable byte-string used for every key and value in the tree.
//!
//! Ordering is pure lexicographic over unsigned bytes, with a shorter
//! sequence sorting before any extension of itself. One order, applied
//! everywhere: key comparison, separator promotion, and the encoded link
//! slot all go through `Value`, so they must all agree.
//!
//! Values are cheap to clone: the bytes live behind an `Arc`, and a split
//! moving half a node's keys moves reference counts, not byte buffers.

use std::fmt;
use std::sync::Arc;

use eyre::{ensure, Result};

use crate::storage::PageId;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Value(Arc<[u8]>);

impl Value {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encodes a page id as an 8-byte value, the form a leaf's trailing
    /// link slot travels in.
    pub fn from_page_id(id: PageId) -> Self {
        Self(Arc::from(id.to_le_bytes().as_slice()))
    }

    /// Reads this value back as a page id.
    pub fn as_page_id(&self) -> Result<PageId> {
        ensure!(
            self.0.len() == 8,
            "value holds {} bytes, a page id needs exactly 8",
            self.0.len()
        );
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.0);
        Ok(PageId::from_le_bytes(raw))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value(b\"")?;
        for byte in self.0.iter() {
            write!(f, "{}", byte.escape_ascii())?;
        }
        write!(f, "\")")
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self(Arc::from(s.as_bytes()))
    }
}
