//! End-to-end store scenarios: persistence across reopen, header
//! validation, random churn against a model, and multi-leaf range scans.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

use burrow::{pad_key, pad_value, strip_padding, BPlusTree};

#[test]
fn persistence_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.bpt");

    {
        let mut tree = BPlusTree::open(&path).unwrap();
        tree.put(b"a", b"1").unwrap();
        tree.put(b"b", b"2").unwrap();
    }

    let tree = BPlusTree::open(&path).unwrap();
    assert_eq!(tree.get(b"a").unwrap(), Some(b"1".to_vec()));
    assert_eq!(tree.get(b"b").unwrap(), Some(b"2".to_vec()));
    assert_eq!(tree.len(), 2);
    tree.check_invariants().unwrap();
}

#[test]
fn large_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.bpt");

    {
        let mut tree = BPlusTree::open(&path).unwrap();
        for i in 0..2000 {
            let key = format!("key{i:06}");
            let value = format!("value{i:06}");
            tree.put(key.as_bytes(), value.as_bytes()).unwrap();
        }
        tree.sync().unwrap();
    }

    let tree = BPlusTree::open(&path).unwrap();
    assert_eq!(tree.len(), 2000);
    assert!(tree.height() >= 2);
    tree.check_invariants().unwrap();
    for i in (0..2000).step_by(97) {
        let key = format!("key{i:06}");
        let value = format!("value{i:06}");
        assert_eq!(tree.get(key.as_bytes()).unwrap(), Some(value.into_bytes()));
    }
}

#[test]
fn reopen_rejects_foreign_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.bpt");

    // A header-sized file with junk magic and a nonzero height field.
    let mut bytes = vec![0u8; 128];
    bytes[..16].copy_from_slice(b"not a kv store!!");
    bytes[48..56].copy_from_slice(&1u64.to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let err = BPlusTree::open(&path).unwrap_err();
    assert!(err.to_string().contains("store.bpt"), "{err:#}");
}

#[test]
fn reopen_rejects_mismatched_geometry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.bpt");

    {
        let mut tree = BPlusTree::open(&path).unwrap();
        tree.put(b"k", b"v").unwrap();
        tree.sync().unwrap();
    }

    // Corrupt the stored order (bytes 20..24 of the header).
    let mut bytes = std::fs::read(&path).unwrap();
    let order = u32::from_le_bytes(bytes[20..24].try_into().unwrap());
    bytes[20..24].copy_from_slice(&(order + 1).to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let err = BPlusTree::open(&path).unwrap_err();
    assert!(format!("{err:#}").contains("geometry"), "{err:#}");
}

#[test]
fn put_get_delete_laws() {
    let dir = tempdir().unwrap();
    let mut tree = BPlusTree::open(dir.path().join("store.bpt")).unwrap();

    // get(k) = v immediately after put(k, v)
    tree.put(b"k", b"v").unwrap();
    assert_eq!(tree.get(b"k").unwrap(), Some(b"v".to_vec()));

    // put(k, v1); put(k, v2) == put(k, v2)
    tree.put(b"k", b"v2").unwrap();
    assert_eq!(tree.get(b"k").unwrap(), Some(b"v2".to_vec()));
    assert_eq!(tree.len(), 1);

    // get(k) = nothing after delete(k)
    assert!(tree.delete(b"k").unwrap());
    assert_eq!(tree.get(b"k").unwrap(), None);

    // deleting an absent key is a no-op
    assert!(!tree.delete(b"k").unwrap());
    assert_eq!(tree.len(), 0);
}

#[test]
fn random_insertion_order_scans_ascending() {
    let dir = tempdir().unwrap();
    let mut tree = BPlusTree::open(dir.path().join("store.bpt")).unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    let mut ids: Vec<u32> = (0..1500).collect();
    ids.shuffle(&mut rng);

    for &i in &ids {
        let key = format!("key{i:06}");
        tree.put(key.as_bytes(), b"x").unwrap();
    }

    let all = tree.range(b"", &[0xFF; 32]).unwrap();
    assert_eq!(all.len(), 1500);
    for pair in all.windows(2) {
        assert!(pair[0].0 < pair[1].0, "scan out of order");
    }
}

#[test]
fn range_scan_across_leaves_returns_exact_window() {
    let dir = tempdir().unwrap();
    let mut tree = BPlusTree::open(dir.path().join("store.bpt")).unwrap();

    for i in 0..400 {
        let key = format!("k{i:04}");
        let value = format!("v{i:04}");
        tree.put(key.as_bytes(), value.as_bytes()).unwrap();
    }
    assert!(tree.height() >= 2);

    let window = tree.range(b"k0040", b"k0049").unwrap();
    assert_eq!(window.len(), 10);
    for (i, (key, value)) in window.iter().enumerate() {
        assert_eq!(key, format!("k{:04}", 40 + i).as_bytes());
        assert_eq!(value, format!("v{:04}", 40 + i).as_bytes());
    }

    let wide = tree.range(b"k0100", b"k0299").unwrap();
    assert_eq!(wide.len(), 200);
}

/// Random draws from a keyed space (duplicates overwrite), then delete
/// everything in random order, checking the tree against a model map and
/// probing the structural invariants as it churns. The draw count is picked
/// to push the tree to three levels so index-node rebalancing runs too.
#[test]
fn random_churn_against_model() {
    let dir = tempdir().unwrap();
    let mut tree = BPlusTree::open(dir.path().join("store.bpt")).unwrap();

    let mut rng = StdRng::seed_from_u64(0xB7EE);
    let mut model: BTreeMap<[u8; 32], Vec<u8>> = BTreeMap::new();

    for op in 0..20_000u32 {
        let id: u32 = rng.gen_range(0..20_000);
        let key = format!("key{id:05}");
        let value = format!("value{op:05}");
        tree.put(key.as_bytes(), value.as_bytes()).unwrap();
        model.insert(pad_key(key.as_bytes()), value.into_bytes());

        if op % 1000 == 0 {
            tree.check_invariants().unwrap();
            assert_eq!(tree.len(), model.len() as u64);
        }
    }
    assert!(tree.height() >= 3);

    // Spot-check contents against the model before draining.
    for (key, value) in model.iter().step_by(131) {
        let stored = tree.get(strip_padding(key)).unwrap();
        assert_eq!(stored.as_deref(), Some(value.as_slice()));
    }

    let mut keys: Vec<[u8; 32]> = model.keys().copied().collect();
    keys.shuffle(&mut rng);
    for (op, key) in keys.iter().enumerate() {
        assert!(tree.delete(strip_padding(key)).unwrap());
        model.remove(key);

        if op % 1000 == 0 {
            tree.check_invariants().unwrap();
            assert_eq!(tree.len(), model.len() as u64);
        }
    }

    assert_eq!(tree.len(), 0);
    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);
    tree.check_invariants().unwrap();
}

/// A three-level tree drained front-to-back: leaf merges cascade into index
/// merges and the root collapses twice on the way down to a single empty
/// leaf.
#[test]
fn deep_tree_drains_to_a_single_leaf() {
    let dir = tempdir().unwrap();
    let mut tree = BPlusTree::open(dir.path().join("store.bpt")).unwrap();

    for i in 0..20_000u32 {
        let key = format!("key{i:05}");
        tree.put(key.as_bytes(), b"payload").unwrap();
    }
    assert!(tree.height() >= 3);
    tree.check_invariants().unwrap();

    for i in 0..20_000u32 {
        let key = format!("key{i:05}");
        assert!(tree.delete(key.as_bytes()).unwrap(), "lost {key}");
        if i % 997 == 0 {
            tree.check_invariants().unwrap();
        }
    }

    assert!(tree.is_empty());
    assert_eq!(tree.height(), 1);
    tree.check_invariants().unwrap();
}

#[test]
fn values_at_full_width_round_trip() {
    let dir = tempdir().unwrap();
    let mut tree = BPlusTree::open(dir.path().join("store.bpt")).unwrap();

    let full = vec![0xABu8; 256];
    let over = vec![0xCDu8; 300];

    tree.put(b"full", &full).unwrap();
    tree.put(b"over", &over).unwrap();

    assert_eq!(tree.get(b"full").unwrap(), Some(full));
    // Oversized values are truncated to the fixed width.
    assert_eq!(tree.get(b"over").unwrap(), Some(pad_value(&over).to_vec()));
}
