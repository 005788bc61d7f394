//! Property-based tests: the page codec against arbitrary node contents,
//! and the tree against a `BTreeMap` oracle.

use std::collections::BTreeMap;

use linkdb::btree::node::{Branch, Leaf};
use linkdb::btree::Node;
use linkdb::{BLinkTree, Options, PageStore, Value, NO_NODE};
use proptest::prelude::*;
use tempfile::tempdir;

/// Keys small enough that generated nodes always fit one 8 KiB page.
fn key_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..=24)
}

fn value_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=48)
}

/// Strictly increasing, duplicate-free keys, as node invariants require.
fn sorted_unique_keys(max: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::btree_set(key_bytes(), 0..=max)
        .prop_map(|set| set.into_iter().map(Value::from).collect())
}

fn arb_leaf() -> impl Strategy<Value = Leaf> {
    (sorted_unique_keys(40), any::<bool>(), 1..=1000i64).prop_flat_map(|(keys, leftmost, link)| {
        let count = keys.len();
        prop::collection::vec(value_bytes(), count..=count).prop_map(move |values| {
            let mut values: Vec<Value> = values.into_iter().map(Value::from).collect();
            values.push(Value::from_page_id(if link % 2 == 0 { NO_NODE } else { link }));
            Leaf::new(Some(1), leftmost, 1, keys.clone(), values)
        })
    })
}

fn arb_branch() -> impl Strategy<Value = Branch> {
    (sorted_unique_keys(40), any::<bool>(), 2..=10u16)
        .prop_filter("branches need at least one key", |(keys, _, _)| {
            !keys.is_empty()
        })
        .prop_flat_map(|(keys, leftmost, height)| {
            let count = keys.len();
            prop::collection::vec(1..=100_000i64, count..=count).prop_map(move |mut pointers| {
                pointers.push(NO_NODE);
                Branch::new(Some(2), leftmost, height, keys.clone(), pointers)
            })
        })
}

proptest! {
    #[test]
    fn leaf_survives_a_disk_round_trip(leaf in arb_leaf()) {
        let dir = tempdir().unwrap();
        let store = PageStore::open(
            dir.path().join("codec.db"),
            Options { page_size: 8192 },
        ).unwrap();

        let mut node = Node::Leaf(leaf);
        let id = store.write_node(&mut node).unwrap();
        prop_assert_eq!(store.read_node(id).unwrap(), node);
    }

    #[test]
    fn branch_survives_a_disk_round_trip(branch in arb_branch()) {
        let dir = tempdir().unwrap();
        let store = PageStore::open(
            dir.path().join("codec.db"),
            Options { page_size: 8192 },
        ).unwrap();

        let mut node = Node::Branch(branch);
        let id = store.write_node(&mut node).unwrap();
        prop_assert_eq!(store.read_node(id).unwrap(), node);
    }

    /// Differential test against BTreeMap: arbitrary upsert sequences on
    /// tiny pages, so splits and root growth fire constantly.
    #[test]
    fn tree_matches_btreemap_oracle(
        ops in prop::collection::vec((key_bytes(), value_bytes()), 1..200),
    ) {
        let dir = tempdir().unwrap();
        let tree = BLinkTree::open(
            dir.path().join("oracle.db"),
            Options { page_size: 256 },
        ).unwrap();
        let mut oracle: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        for (key, value) in &ops {
            tree.insert(Value::from(key.clone()), Value::from(value.clone())).unwrap();
            oracle.insert(key.clone(), value.clone());
        }

        for (key, value) in &oracle {
            prop_assert_eq!(
                tree.get(&Value::from(key.clone())).unwrap(),
                Some(Value::from(value.clone()))
            );
        }

        // a key the oracle never saw must be absent
        let mut absent = b"never inserted: ".to_vec();
        absent.extend_from_slice(&[0xfe; 30]);
        if !oracle.contains_key(&absent) {
            prop_assert_eq!(tree.get(&Value::from(absent)).unwrap(), None);
        }
    }
}
