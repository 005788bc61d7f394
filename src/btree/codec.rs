//! Node <-> page image codec.
//!
//! Every node serializes into exactly one page:
//!
//! ```text
//! Offset  Size       Field
//! ------  ---------  --------------------------------------------------
//! 0       1          flags: bit0 = leaf, bit1 = leftmost
//! 1       2          count: number of keys
//! 3       2          height: 1 for leaves
//! 5       variable   count keys, each u32 length prefix + bytes
//! ...     variable   leaf:   count+1 values, each u32 length + bytes
//!                    branch: count+1 child pointers, 8 bytes each
//! ```
//!
//! The final value/pointer entry in both variants is the right-link: an
//! 8-byte page id for leaves (carried inside the value array), a plain
//! pointer slot for branches, -1 when the node is rightmost at its height.
//!
//! This module also owns the serialized-size accounting. The split
//! balancer in [`super::node`] works in the same per-cell byte costs the
//! encoder produces, so "would this node overflow a page" and "where do
//! the halves weigh the same" are answered from one set of numbers.

use eyre::{bail, ensure, Result};
use zerocopy::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::storage::PageId;
use crate::value::Value;

use super::node::{Branch, Leaf, Node};

pub const NODE_HEADER_SIZE: usize = 5;
pub const LEN_PREFIX_SIZE: usize = 4;
pub const POINTER_SIZE: usize = 8;

const FLAG_LEAF: u8 = 0b0000_0001;
const FLAG_LEFTMOST: u8 = 0b0000_0010;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct NodeHeader {
    flags: u8,
    count: U16,
    height: U16,
}

const _: () = assert!(std::mem::size_of::<NodeHeader>() == NODE_HEADER_SIZE);

/// Serialized cost of one leaf cell: length-prefixed key + length-prefixed
/// value.
pub fn leaf_cell_size(key: &Value, value: &Value) -> usize {
    2 * LEN_PREFIX_SIZE + key.len() + value.len()
}

/// Serialized cost of one branch cell: length-prefixed key + fixed-width
/// child pointer.
pub fn branch_cell_size(key: &Value) -> usize {
    LEN_PREFIX_SIZE + key.len() + POINTER_SIZE
}

pub fn leaf_size(leaf: &Leaf) -> usize {
    let cells: usize = leaf
        .keys
        .iter()
        .zip(&leaf.values)
        .map(|(k, v)| leaf_cell_size(k, v))
        .sum();
    let link = leaf.values.last().map_or(0, |v| LEN_PREFIX_SIZE + v.len());
    NODE_HEADER_SIZE + cells + link
}

pub fn branch_size(branch: &Branch) -> usize {
    let cells: usize = branch.keys.iter().map(branch_cell_size).sum();
    NODE_HEADER_SIZE + cells + POINTER_SIZE
}

pub fn encoded_size(node: &Node) -> usize {
    match node {
        Node::Leaf(leaf) => leaf_size(leaf),
        Node::Branch(branch) => branch_size(branch),
    }
}

/// Serializes `node` into a `page_size` image.
pub fn encode(node: &Node, page_size: usize) -> Result<Vec<u8>> {
    let size = encoded_size(node);
    ensure!(
        size <= page_size,
        "node needs {} bytes but pages hold {}; split logic failed to fire",
        size,
        page_size
    );

    let (flags, count) = match node {
        Node::Leaf(leaf) => {
            ensure!(
                leaf.values.len() == leaf.keys.len() + 1,
                "leaf has {} keys but {} value slots",
                leaf.keys.len(),
                leaf.values.len()
            );
            (FLAG_LEAF, leaf.keys.len())
        }
        Node::Branch(branch) => {
            ensure!(
                branch.pointers.len() == branch.keys.len() + 1,
                "branch has {} keys but {} pointer slots",
                branch.keys.len(),
                branch.pointers.len()
            );
            ensure!(!branch.keys.is_empty(), "branch node has no keys");
            (0, branch.keys.len())
        }
    };
    ensure!(count <= u16::MAX as usize, "node holds too many keys: {}", count);

    let header = NodeHeader {
        flags: flags | if node.is_leftmost() { FLAG_LEFTMOST } else { 0 },
        count: U16::new(count as u16),
        height: U16::new(node.height()),
    };

    let mut buf = vec![0u8; page_size];
    buf[..NODE_HEADER_SIZE].copy_from_slice(header.as_bytes());
    let mut pos = NODE_HEADER_SIZE;

    match node {
        Node::Leaf(leaf) => {
            for key in &leaf.keys {
                put_value(&mut buf, &mut pos, key);
            }
            for value in &leaf.values {
                put_value(&mut buf, &mut pos, value);
            }
        }
        Node::Branch(branch) => {
            for key in &branch.keys {
                put_value(&mut buf, &mut pos, key);
            }
            for pointer in &branch.pointers {
                buf[pos..pos + POINTER_SIZE].copy_from_slice(&pointer.to_le_bytes());
                pos += POINTER_SIZE;
            }
        }
    }

    Ok(buf)
}

/// Decodes the node persisted at page `id` from its page image.
pub fn decode(page: &[u8], id: PageId) -> Result<Node> {
    ensure!(
        page.len() >= NODE_HEADER_SIZE,
        "page {} is too short for a node header",
        id
    );

    let header = NodeHeader::ref_from_bytes(&page[..NODE_HEADER_SIZE])
        .map_err(|e| eyre::eyre!("failed to parse node header on page {}: {:?}", id, e))?;

    let count = header.count.get() as usize;
    let height = header.height.get();
    let leftmost = header.flags & FLAG_LEFTMOST != 0;
    let mut pos = NODE_HEADER_SIZE;

    let mut keys = Vec::with_capacity(count);
    for _ in 0..count {
        keys.push(read_value(page, &mut pos, id)?);
    }

    if header.flags & FLAG_LEAF != 0 {
        let mut values = Vec::with_capacity(count + 1);
        for _ in 0..=count {
            values.push(read_value(page, &mut pos, id)?);
        }
        match values.last() {
            Some(link) if link.len() == POINTER_SIZE => {}
            _ => bail!("leaf on page {} has a malformed link slot", id),
        }
        Ok(Node::Leaf(Leaf::new(Some(id), leftmost, height, keys, values)))
    } else {
        ensure!(count > 0, "branch on page {} has no keys", id);
        let mut pointers = Vec::with_capacity(count + 1);
        for _ in 0..=count {
            ensure!(
                pos + POINTER_SIZE <= page.len(),
                "page {} truncated while reading pointers",
                id
            );
            let mut raw = [0u8; POINTER_SIZE];
            raw.copy_from_slice(&page[pos..pos + POINTER_SIZE]);
            pointers.push(PageId::from_le_bytes(raw));
            pos += POINTER_SIZE;
        }
        Ok(Node::Branch(Branch::new(
            Some(id),
            leftmost,
            height,
            keys,
            pointers,
        )))
    }
}

fn put_value(buf: &mut [u8], pos: &mut usize, value: &Value) {
    buf[*pos..*pos + LEN_PREFIX_SIZE].copy_from_slice(&(value.len() as u32).to_le_bytes());
    *pos += LEN_PREFIX_SIZE;
    buf[*pos..*pos + value.len()].copy_from_slice(value.as_bytes());
    *pos += value.len();
}

fn read_value(page: &[u8], pos: &mut usize, id: PageId) -> Result<Value> {
    ensure!(
        *pos + LEN_PREFIX_SIZE <= page.len(),
        "page {} truncated while reading a length prefix",
        id
    );
    let mut raw = [0u8; LEN_PREFIX_SIZE];
    raw.copy_from_slice(&page[*pos..*pos + LEN_PREFIX_SIZE]);
    let len = u32::from_le_bytes(raw) as usize;
    *pos += LEN_PREFIX_SIZE;

    ensure!(
        *pos + len <= page.len(),
        "page {} truncated while reading a {}-byte value",
        id,
        len
    );
    let value = Value::from(&page[*pos..*pos + len]);
    *pos += len;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NO_NODE;

    fn sample_leaf() -> Leaf {
        Leaf::new(
            Some(3),
            false,
            1,
            vec![Value::from("apple"), Value::from("pear")],
            vec![
                Value::from("red"),
                Value::from("green"),
                Value::from_page_id(9),
            ],
        )
    }

    fn sample_branch() -> Branch {
        Branch::new(
            Some(5),
            true,
            2,
            vec![Value::from("m"), Value::from("z")],
            vec![3, 4, NO_NODE],
        )
    }

    #[test]
    fn leaf_round_trip() {
        let node = Node::Leaf(sample_leaf());
        let image = encode(&node, 256).unwrap();
        assert_eq!(image.len(), 256);
        assert_eq!(decode(&image, 3).unwrap(), node);
    }

    #[test]
    fn branch_round_trip() {
        let node = Node::Branch(sample_branch());
        let image = encode(&node, 256).unwrap();
        assert_eq!(decode(&image, 5).unwrap(), node);
    }

    #[test]
    fn empty_leaf_round_trip() {
        let node = Node::Leaf(Leaf::empty_root());
        let image = encode(&node, 64).unwrap();
        let decoded = decode(&image, 1).unwrap();

        match decoded {
            Node::Leaf(leaf) => {
                assert!(leaf.keys.is_empty());
                assert_eq!(leaf.link(), NO_NODE);
                assert!(leaf.leftmost);
            }
            Node::Branch(_) => panic!("decoded a branch"),
        }
    }

    #[test]
    fn encoded_size_matches_written_bytes() {
        let node = Node::Leaf(sample_leaf());
        let size = encoded_size(&node);
        // header + (4+5 + 4+3) + (4+4 + 4+5) + (4+8)
        assert_eq!(size, 5 + 16 + 17 + 12);

        let image = encode(&node, size).unwrap();
        assert_eq!(decode(&image, 3).unwrap(), node);
    }

    #[test]
    fn empty_leaf_size_is_header_plus_link() {
        let leaf = Leaf::empty_root();
        assert_eq!(leaf_size(&leaf), NODE_HEADER_SIZE + LEN_PREFIX_SIZE + 8);
    }

    #[test]
    fn oversized_node_is_rejected() {
        let node = Node::Leaf(sample_leaf());
        assert!(encode(&node, 32).is_err());
    }

    #[test]
    fn truncated_page_is_rejected() {
        let node = Node::Leaf(sample_leaf());
        let image = encode(&node, 256).unwrap();
        assert!(decode(&image[..20], 3).is_err());
    }

    #[test]
    fn flags_round_trip_leftmost() {
        for leftmost in [true, false] {
            let node = Node::Leaf(Leaf::new(
                Some(1),
                leftmost,
                1,
                vec![],
                vec![Value::from_page_id(NO_NODE)],
            ));
            let image = encode(&node, 64).unwrap();
            assert_eq!(decode(&image, 1).unwrap().is_leftmost(), leftmost);
        }
    }

    #[test]
    fn branch_with_no_keys_is_rejected() {
        let mut page = vec![0u8; 64];
        // flags = branch, count = 0, height = 2
        page[3] = 2;
        assert!(decode(&page, 7).is_err());
    }
}
