//! Differential fuzzing of the store against `std::collections::BTreeMap`.
//!
//! Every operation sequence is applied to both a fresh store and a model
//! map with the same truncation/padding semantics; any divergence in
//! results, size, or structural invariants is a bug.

#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use burrow::{pad_key, pad_value, strip_padding, BPlusTree};

#[derive(Debug, Arbitrary)]
enum Operation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Get { key: Vec<u8> },
    Delete { key: Vec<u8> },
    Range { lo: Vec<u8>, hi: Vec<u8> },
}

fuzz_target!(|operations: Vec<Operation>| {
    let dir = tempfile::tempdir().unwrap();
    let mut tree = BPlusTree::open(dir.path().join("fuzz.bpt")).unwrap();
    let mut model: BTreeMap<[u8; 32], Vec<u8>> = BTreeMap::new();

    for operation in operations {
        match operation {
            Operation::Put { key, value } => {
                tree.put(&key, &value).unwrap();
                model.insert(
                    pad_key(&key),
                    strip_padding(&pad_value(&value)).to_vec(),
                );
            }
            Operation::Get { key } => {
                let expected = model.get(&pad_key(&key)).cloned();
                assert_eq!(tree.get(&key).unwrap(), expected);
            }
            Operation::Delete { key } => {
                let expected = model.remove(&pad_key(&key)).is_some();
                assert_eq!(tree.delete(&key).unwrap(), expected);
            }
            Operation::Range { lo, hi } => {
                let lo = pad_key(&lo);
                let hi = pad_key(&hi);
                let got = tree.range(&lo, &hi).unwrap();
                let expected: Vec<(Vec<u8>, Vec<u8>)> = if lo <= hi {
                    model
                        .range(lo..=hi)
                        .map(|(k, v)| (strip_padding(k).to_vec(), v.clone()))
                        .collect()
                } else {
                    Vec::new()
                };
                assert_eq!(got, expected);
            }
        }
        assert_eq!(tree.len(), model.len() as u64);
    }

    tree.check_invariants().unwrap();
});
