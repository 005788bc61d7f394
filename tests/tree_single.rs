//! Single-threaded end-to-end tests: insert/lookup correctness, split
//! behavior on small pages, and reopening a tree from disk.

use linkdb::{BLinkTree, Options, Value};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::tempdir;

fn open_tree(page_size: usize) -> (tempfile::TempDir, BLinkTree) {
    let dir = tempdir().unwrap();
    let tree = BLinkTree::open(dir.path().join("tree.db"), Options { page_size }).unwrap();
    (dir, tree)
}

fn v(s: &str) -> Value {
    Value::from(s)
}

#[test]
fn empty_tree_returns_not_found() {
    let (_dir, tree) = open_tree(4096);
    assert_eq!(tree.get(&v("missing")).unwrap(), None);
    assert_eq!(tree.height(), 1);
}

#[test]
fn get_returns_the_latest_value_for_a_key() {
    let (_dir, tree) = open_tree(4096);
    for round in 0..5 {
        tree.insert(v("counter"), Value::from(format!("{}", round).into_bytes()))
            .unwrap();
    }
    assert_eq!(tree.get(&v("counter")).unwrap(), Some(v("4")));
}

#[test]
fn lookup_misses_do_not_match_prefixes_or_extensions() {
    let (_dir, tree) = open_tree(4096);
    tree.insert(v("alpha"), v("1")).unwrap();
    assert_eq!(tree.get(&v("alph")).unwrap(), None);
    assert_eq!(tree.get(&v("alphabet")).unwrap(), None);
    assert_eq!(tree.get(&v("alpha")).unwrap(), Some(v("1")));
}

#[test]
fn three_keys_force_a_split_on_64_byte_pages() {
    // a 64-byte page holds two (1-byte key, 10-byte value) cells, not three
    let (_dir, tree) = open_tree(64);
    tree.insert(v("m"), v("mmmmmmmmmm")).unwrap();
    tree.insert(v("a"), v("aaaaaaaaaa")).unwrap();
    tree.insert(v("z"), v("zzzzzzzzzz")).unwrap();

    assert_eq!(tree.height(), 2, "one split should grow the tree to height 2");
    assert_eq!(tree.get(&v("a")).unwrap(), Some(v("aaaaaaaaaa")));
    assert_eq!(tree.get(&v("m")).unwrap(), Some(v("mmmmmmmmmm")));
    assert_eq!(tree.get(&v("z")).unwrap(), Some(v("zzzzzzzzzz")));
}

#[test]
fn shuffled_inserts_all_stay_readable() {
    let (_dir, tree) = open_tree(256);
    let mut rng = rand::rngs::StdRng::seed_from_u64(0xb11c);

    let mut keys: Vec<u32> = (0..2000).collect();
    keys.shuffle(&mut rng);

    for &k in &keys {
        tree.insert(
            Value::from(format!("key-{:06}", k).into_bytes()),
            Value::from(format!("value-{:06}", k).into_bytes()),
        )
        .unwrap();
    }

    for k in 0..2000u32 {
        let key = Value::from(format!("key-{:06}", k).into_bytes());
        let expected = Value::from(format!("value-{:06}", k).into_bytes());
        assert_eq!(tree.get(&key).unwrap(), Some(expected), "key {} lost", k);
    }
    assert_eq!(tree.get(&v("key-999999")).unwrap(), None);
}

#[test]
fn height_never_decreases_and_grows_by_one() {
    let (_dir, tree) = open_tree(64);
    let mut last = tree.height();
    let mut growths = 0;

    for i in 0..300 {
        tree.insert(
            Value::from(format!("{:05}", i).into_bytes()),
            Value::from(format!("v{:05}", i).into_bytes()),
        )
        .unwrap();
        let height = tree.height();
        assert!(
            height == last || height == last + 1,
            "height jumped from {} to {}",
            last,
            height
        );
        if height == last + 1 {
            growths += 1;
        }
        last = height;
    }

    assert!(growths >= 2, "expected multiple root growths on tiny pages");
    assert_eq!(last, 1 + growths);
}

#[test]
fn overwrites_never_change_tree_height() {
    let (_dir, tree) = open_tree(128);
    for i in 0..200 {
        tree.insert(
            Value::from(format!("{:04}", i).into_bytes()),
            v("original"),
        )
        .unwrap();
    }
    let height = tree.height();

    for i in 0..200 {
        tree.insert(
            Value::from(format!("{:04}", i).into_bytes()),
            v("replaced"),
        )
        .unwrap();
    }
    assert_eq!(tree.height(), height);
    assert_eq!(
        tree.get(&Value::from("0123")).unwrap(),
        Some(v("replaced"))
    );
}

#[test]
fn tree_survives_close_and_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tree.db");

    let height_before = {
        let tree = BLinkTree::open(&path, Options { page_size: 128 }).unwrap();
        for i in 0..500 {
            tree.insert(
                Value::from(format!("key-{:04}", i).into_bytes()),
                Value::from(format!("val-{:04}", i).into_bytes()),
            )
            .unwrap();
        }
        tree.height()
    };

    let tree = BLinkTree::open(&path, Options::default()).unwrap();
    assert_eq!(tree.height(), height_before);
    for i in 0..500 {
        let key = Value::from(format!("key-{:04}", i).into_bytes());
        let val = Value::from(format!("val-{:04}", i).into_bytes());
        assert_eq!(tree.get(&key).unwrap(), Some(val), "key {} lost on reopen", i);
    }

    // the reopened tree keeps accepting writes
    tree.insert(v("post-reopen"), v("works")).unwrap();
    assert_eq!(tree.get(&v("post-reopen")).unwrap(), Some(v("works")));
}

#[test]
fn binary_keys_with_high_bytes_sort_and_resolve() {
    let (_dir, tree) = open_tree(256);
    let keys: Vec<Vec<u8>> = (0..=255u8).map(|b| vec![b, 0xff - b, b]).collect();

    for key in &keys {
        tree.insert(Value::from(key.clone()), Value::from(&key[..1]))
            .unwrap();
    }
    for key in &keys {
        assert_eq!(
            tree.get(&Value::from(key.clone())).unwrap(),
            Some(Value::from(&key[..1]))
        );
    }
}
