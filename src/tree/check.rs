//! # Invariant Walker
//!
//! Full-tree structural verification, used by the test suites after
//! mutation batches. Checks, for every node: key ordering, fill bounds,
//! routing intervals, parent links, and per-level sibling chains; and for
//! the tree as a whole, that the header's size matches the record count
//! across all leaves. Linear in the size of the tree.

use eyre::{ensure, Result};

use crate::config::{MAX_KEYS, MIN_KEYS};
use crate::storage::BlockCache;

use super::node::{header_view, index_view, leaf_view, Key, BLOCK_SIZE, NULL_OFFSET};
use super::tree::BPlusTree;

pub(crate) fn verify(tree: &BPlusTree) -> Result<()> {
    let meta = tree.meta();
    let cache = tree.cache();
    let height = meta.height();
    ensure!(height >= 1, "tree height is 0");

    let mut record_total = 0u64;
    verify_subtree(
        cache,
        meta.root_offset(),
        height,
        1,
        None,
        None,
        NULL_OFFSET,
        &mut record_total,
    )?;
    ensure!(
        record_total == meta.size(),
        "header size {} but {} records found in leaves",
        meta.size(),
        record_total
    );

    for level in 1..=height {
        verify_sibling_chain(cache, leftmost_at(cache, meta.root_offset(), level)?)?;
    }
    Ok(())
}

/// Recursive descent carrying the half-open routing window implied by the
/// ancestors' separators: every key in this subtree must satisfy
/// `lo <= key < hi`.
#[allow(clippy::too_many_arguments)]
fn verify_subtree(
    cache: &BlockCache,
    offset: u64,
    height: u64,
    depth: u64,
    lo: Option<Key>,
    hi: Option<Key>,
    expected_parent: u64,
    record_total: &mut u64,
) -> Result<()> {
    let block = cache.load(offset, BLOCK_SIZE)?;
    let header = header_view(&block)?;
    ensure!(
        header.self_offset() == offset,
        "node at offset {} claims self offset {}",
        offset,
        header.self_offset()
    );
    ensure!(
        header.parent_offset() == expected_parent,
        "node at offset {} has parent {} but is a child of {}",
        offset,
        header.parent_offset(),
        expected_parent
    );

    let is_root = expected_parent == NULL_OFFSET;
    let count = header.count();

    let within = |key: &Key| -> bool {
        lo.as_ref().is_none_or(|l| l <= key) && hi.as_ref().is_none_or(|h| key < h)
    };

    if depth == height {
        let leaf = leaf_view(&block)?;
        ensure!(
            count <= MAX_KEYS && (is_root || count >= MIN_KEYS),
            "leaf at offset {} has {} records",
            offset,
            count
        );
        for i in 0..count {
            let key = leaf.record(i).key();
            ensure!(
                i == 0 || leaf.record(i - 1).key() < key,
                "leaf at offset {} is not strictly ascending at slot {}",
                offset,
                i
            );
            ensure!(
                within(key),
                "leaf at offset {} holds a key outside its routing window",
                offset
            );
        }
        *record_total += count as u64;
        return Ok(());
    }

    let node = index_view(&block)?;
    ensure!(
        count <= MAX_KEYS && count >= if is_root { 1 } else { MIN_KEYS },
        "index node at offset {} has {} keys",
        offset,
        count
    );
    for i in 0..count {
        let key = node.key(i);
        ensure!(
            i == 0 || node.key(i - 1) < key,
            "index node at offset {} is not strictly ascending at slot {}",
            offset,
            i
        );
        ensure!(
            within(key),
            "index node at offset {} holds a separator outside its routing window",
            offset
        );
    }

    // Children inherit windows cut by the surrounding separators.
    let keys: Vec<Key> = (0..count).map(|i| *node.key(i)).collect();
    let children: Vec<u64> = (0..=count).map(|i| node.child(i)).collect();
    drop(block);

    for (i, &child) in children.iter().enumerate() {
        let child_lo = if i == 0 { lo } else { Some(keys[i - 1]) };
        let child_hi = if i == count { hi } else { Some(keys[i]) };
        verify_subtree(
            cache,
            child,
            height,
            depth + 1,
            child_lo,
            child_hi,
            offset,
            record_total,
        )?;
    }
    Ok(())
}

/// Offset of the leftmost node at `level` (1 = root).
fn leftmost_at(cache: &BlockCache, root_offset: u64, level: u64) -> Result<u64> {
    let mut offset = root_offset;
    for _ in 1..level {
        let block = cache.load(offset, BLOCK_SIZE)?;
        offset = index_view(&block)?.child(0);
    }
    Ok(offset)
}

/// The left/right links at one level must form a doubly-linked list
/// terminated by null offsets on both ends.
fn verify_sibling_chain(cache: &BlockCache, leftmost: u64) -> Result<()> {
    let mut previous = NULL_OFFSET;
    let mut offset = leftmost;
    while offset != NULL_OFFSET {
        let block = cache.load(offset, BLOCK_SIZE)?;
        let header = header_view(&block)?;
        ensure!(
            header.left_offset() == previous,
            "node at offset {} links left to {} but follows {}",
            offset,
            header.left_offset(),
            previous
        );
        previous = offset;
        offset = header.right_offset();
    }
    Ok(())
}
