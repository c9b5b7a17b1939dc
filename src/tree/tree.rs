//! # B+Tree Engine
//!
//! The tree engine implements the user-visible store on top of the block
//! cache: point insert, lookup, delete and ordered range scan over a single
//! backing file.
//!
//! ## Structure
//!
//! All records live in leaves; index nodes hold separator keys and child
//! offsets. Every level — not only the leaves — is a doubly-linked sibling
//! chain, which is what lets rebalancing find a neighbor without going
//! through the parent. Nodes reference each other purely by file offset;
//! every access goes through the cache and holds a `BlockRef` pin for
//! exactly as long as the operation needs that block.
//!
//! ## Insertion
//!
//! Descend to the target leaf and insert in place. An overfull leaf splits
//! right-biased: the upper half moves to a fresh block and the new right
//! node's first key is promoted. Index overflow splits center-extracting:
//! the middle separator moves up and is removed locally. Splits cascade
//! until a level absorbs the separator or a new root is created.
//!
//! ## Deletion
//!
//! Remove in the leaf, then restore the fill invariant bottom-up: first try
//! to borrow a record from a same-parent sibling, then merge with one,
//! repeating the process on index levels as merges cascade. After any
//! borrow or merge the separator between two adjacent same-parent siblings
//! is reset to the first key of the right sibling — located by probing the
//! parent with `upper_bound(sibling.last_key)`, never by positional
//! adjacency (adjacent siblings need not share a parent). A root index
//! node left with zero keys promotes its sole child and the tree shrinks
//! by one level; a root leaf may simply run empty.
//!
//! ## What this engine does not do
//!
//! No transactions, no write-ahead log, no crash consistency: durability is
//! whatever the kernel's write-back of the shared mappings provides, plus
//! an explicit [`BPlusTree::sync`]. Freed blocks are never reclaimed; a
//! merged-away node just becomes unreachable.

use std::path::Path;
use std::sync::Arc;

use eyre::{bail, Result, WrapErr};
use memmap2::MmapMut;

use crate::config::{CACHE_CEILING_BYTES, MAX_KEYS, MIN_KEYS, ORDER};
use crate::storage::{view, view_mut, BlockCache, BlockRef, StoreFile};

use super::node::{
    header_view, header_view_mut, index_view, index_view_mut, leaf_view, leaf_view_mut, pad_key,
    pad_value, strip_padding, IndexNode, Key, Meta, Value, BLOCK_SIZE, META_SIZE, NULL_OFFSET,
};

/// Records/keys a splitting node keeps on the left side.
const SPLIT_MID: usize = (ORDER - 1) / 2;

/// A persistent ordered key-value store backed by a single file.
///
/// Dropping the tree closes the store: every cached block is unmapped, the
/// Meta mapping is released and the file descriptor is closed. There is no
/// implicit flush on drop beyond the kernel's own write-back; call
/// [`BPlusTree::sync`] first if durability at a known point matters.
#[derive(Debug)]
pub struct BPlusTree {
    file: Arc<StoreFile>,
    cache: BlockCache,
    meta_map: MmapMut,
}

impl BPlusTree {
    /// Opens the store at `path`, creating and initializing the file (mode
    /// 0600) if it does not exist. An existing file must carry a valid
    /// header with matching geometry.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = Arc::new(StoreFile::open(path)?);
        file.ensure_len(META_SIZE as u64)?;
        let mut meta_map = file
            .map_range(0, META_SIZE)
            .wrap_err("failed to map store header")?;
        let cache = BlockCache::new(Arc::clone(&file), CACHE_CEILING_BYTES);

        {
            let meta: &mut Meta = view_mut(&mut meta_map[..])?;
            if meta.height() == 0 && meta.is_blank() {
                *meta = Meta::new();
                let root_offset = META_SIZE as u64;
                meta.set_next_block_offset(root_offset);
                meta.set_root_offset(root_offset);
                meta.set_height(1);

                let mut engine = Engine {
                    cache: &cache,
                    meta,
                };
                let root = engine.alloc_block()?;
                debug_assert_eq!(root.offset(), root_offset);
            } else {
                meta.validate()
                    .wrap_err_with(|| format!("cannot open '{}'", file.path().display()))?;
            }
        }

        Ok(Self {
            file,
            cache,
            meta_map,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Inserts or updates. Overwriting an existing key does not change
    /// [`BPlusTree::len`]. Oversized keys and values are truncated to the
    /// fixed widths first.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = pad_key(key);
        let value = pad_value(value);
        self.engine()?.put(&key, &value)
    }

    /// Returns the stored value for `key`, with NUL padding stripped.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let key = pad_key(key);
        let leaf_offset = descend_to_leaf(&self.cache, self.meta(), &key)?;
        let block = self.cache.load(leaf_offset, BLOCK_SIZE)?;
        let leaf = leaf_view(&block)?;
        Ok(leaf
            .find(&key)
            .map(|index| strip_padding(leaf.record(index).value()).to_vec()))
    }

    /// Removes `key`; returns whether a record was removed.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let key = pad_key(key);
        self.engine()?.delete(&key)
    }

    /// Every `(key, value)` pair with `lo <= key <= hi`, ascending.
    pub fn range(&self, lo: &[u8], hi: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let lo = pad_key(lo);
        let hi = pad_key(hi);
        let mut out = Vec::new();

        let mut offset = descend_to_leaf(&self.cache, self.meta(), &lo)?;
        let mut first = true;
        while offset != NULL_OFFSET {
            let block = self.cache.load(offset, BLOCK_SIZE)?;
            let leaf = leaf_view(&block)?;
            let start = if first { leaf.lower_bound(&lo) } else { 0 };
            first = false;
            for index in start..leaf.count() {
                let record = leaf.record(index);
                if *record.key() > hi {
                    return Ok(out);
                }
                out.push((
                    strip_padding(record.key()).to_vec(),
                    strip_padding(record.value()).to_vec(),
                ));
            }
            offset = leaf.header().right_offset();
        }
        Ok(out)
    }

    /// Number of stored keys.
    pub fn len(&self) -> u64 {
        self.meta().size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 1 while the root is a leaf, otherwise the number of levels from the
    /// root to the leaves inclusive.
    pub fn height(&self) -> u64 {
        self.meta().height()
    }

    /// Flushes every resident block and the store header to disk. The only
    /// explicit durability point the engine offers; nothing calls it
    /// implicitly.
    pub fn sync(&self) -> Result<()> {
        self.cache.flush()?;
        self.meta_map
            .flush()
            .wrap_err("failed to flush store header")
    }

    /// Walks the whole tree and verifies its structural invariants.
    /// Diagnostic aid for tests; cost is linear in the tree.
    pub fn check_invariants(&self) -> Result<()> {
        super::check::verify(self)
    }

    pub(crate) fn cache(&self) -> &BlockCache {
        &self.cache
    }

    pub(crate) fn meta(&self) -> &Meta {
        // INVARIANT: meta_map spans META_SIZE bytes, established at open.
        view(&self.meta_map).expect("store header mapping too small")
    }

    fn engine(&mut self) -> Result<Engine<'_>> {
        let Self {
            cache, meta_map, ..
        } = self;
        Ok(Engine {
            cache,
            meta: view_mut(&mut meta_map[..])?,
        })
    }
}

/// Walks from the root to the leaf that owns `key`. Each level's guard is
/// released before the next level is loaded.
fn descend_to_leaf(cache: &BlockCache, meta: &Meta, key: &Key) -> Result<u64> {
    let mut offset = meta.root_offset();
    let mut level = meta.height();
    while level > 1 {
        let block = cache.load(offset, BLOCK_SIZE)?;
        let node = index_view(&block)?;
        offset = node.child(node.upper_bound(key));
        level -= 1;
    }
    Ok(offset)
}

/// Routes a freshly promoted separator into `parent`: the left child keeps
/// its slot, the new right child lands beside it.
fn insert_separator(parent: &mut IndexNode, separator: &Key, left: u64, right: u64) -> usize {
    let index = parent.upper_bound(separator);
    parent.insert_entry_at(index, separator, left);
    parent.set_child(index + 1, right);
    parent.count()
}

/// One mutating operation's view of the store: the cache plus exclusive
/// access to the Meta record. Guards loaded through `cache` outlive the
/// borrow of the engine itself, so meta updates can interleave with held
/// blocks.
struct Engine<'t> {
    cache: &'t BlockCache,
    meta: &'t mut Meta,
}

impl<'t> Engine<'t> {
    /// Loads a block through a copy of the cache reference, so the returned
    /// guard borrows the cache for `'t` rather than freezing the engine.
    fn load(&self, offset: u64) -> Result<BlockRef<'t>> {
        let cache = self.cache;
        cache.load(offset, BLOCK_SIZE)
    }

    /// Bump-allocates a zeroed block at the end of the file and stamps its
    /// self offset. Nothing is ever handed back; freed nodes just become
    /// unreachable.
    fn alloc_block(&mut self) -> Result<BlockRef<'t>> {
        let offset = self.meta.next_block_offset();
        let mut block = self.load(offset)?;
        block.bytes_mut().fill(0);
        header_view_mut(&mut block)?.set_self_offset(offset);
        self.meta.set_next_block_offset(offset + BLOCK_SIZE as u64);
        Ok(block)
    }

    fn put(&mut self, key: &Key, value: &Value) -> Result<()> {
        let leaf_offset = descend_to_leaf(self.cache, self.meta, key)?;
        let mut leaf_block = self.load(leaf_offset)?;
        if self.insert_into_leaf(&mut leaf_block, key, value)? <= MAX_KEYS {
            return Ok(());
        }

        // The leaf overflowed: split it and push the separator up.
        let mut right_block = self.split_leaf(&mut leaf_block)?;
        let separator = *leaf_view(&right_block)?.first_key();
        let mut parent_block = self.get_or_create_parent(&mut leaf_block)?;
        header_view_mut(&mut right_block)?.set_parent_offset(parent_block.offset());
        let count = insert_separator(
            index_view_mut(&mut parent_block)?,
            &separator,
            leaf_block.offset(),
            right_block.offset(),
        );
        drop(leaf_block);
        drop(right_block);
        if count <= MAX_KEYS {
            return Ok(());
        }

        // Index overflow cascades until some level absorbs the separator or
        // a new root is created.
        let mut child_block = parent_block;
        loop {
            let mut right_block = self.split_index(&mut child_block)?;
            let promoted = {
                let child = index_view(&child_block)?;
                // The promoted separator was parked in the dead slot.
                *child.key(child.count())
            };
            let mut parent_block = self.get_or_create_parent(&mut child_block)?;
            header_view_mut(&mut right_block)?.set_parent_offset(parent_block.offset());
            let count = insert_separator(
                index_view_mut(&mut parent_block)?,
                &promoted,
                child_block.offset(),
                right_block.offset(),
            );
            if count <= MAX_KEYS {
                return Ok(());
            }
            child_block = parent_block;
        }
    }

    /// Inserts into a leaf, overwriting in place on a key match. Returns
    /// the leaf's record count afterwards; a value above `MAX_KEYS` tells
    /// the caller to split.
    fn insert_into_leaf(
        &mut self,
        block: &mut BlockRef<'t>,
        key: &Key,
        value: &Value,
    ) -> Result<usize> {
        let leaf = leaf_view_mut(block)?;
        let index = leaf.upper_bound(key);
        if index > 0 && leaf.record(index - 1).key() == key {
            leaf.set_value_at(index - 1, value);
            return Ok(leaf.count());
        }
        leaf.insert_at(index, key, value);
        self.meta.increment_size();
        Ok(leaf.count())
    }

    /// Splits an overfull leaf right-biased: records `SPLIT_MID..` move to
    /// a fresh right sibling, which is spliced into the leaf chain.
    fn split_leaf(&mut self, block: &mut BlockRef<'t>) -> Result<BlockRef<'t>> {
        let mut right_block = self.alloc_block()?;
        let right_offset = right_block.offset();
        let left_offset = block.offset();
        let old_right;
        {
            let left = leaf_view_mut(block)?;
            let right = leaf_view_mut(&mut right_block)?;
            debug_assert_eq!(left.count(), ORDER);
            right.take_tail(left, SPLIT_MID);

            old_right = left.header().right_offset();
            right.header_mut().set_left_offset(left_offset);
            right.header_mut().set_right_offset(old_right);
            left.header_mut().set_right_offset(right_offset);
        }
        if old_right != NULL_OFFSET {
            let mut neighbor = self.load(old_right)?;
            header_view_mut(&mut neighbor)?.set_left_offset(right_offset);
        }
        Ok(right_block)
    }

    /// Splits an overfull index node center-extracting: keys left of
    /// `SPLIT_MID` stay, keys right of it move, and the middle key is
    /// promoted (left parked in the donor's dead slot). Children that moved
    /// are reparented to the new node.
    fn split_index(&mut self, block: &mut BlockRef<'t>) -> Result<BlockRef<'t>> {
        let mut right_block = self.alloc_block()?;
        let right_offset = right_block.offset();
        let left_offset = block.offset();
        let old_right;
        {
            let left = index_view_mut(block)?;
            let right = index_view_mut(&mut right_block)?;
            debug_assert_eq!(left.count(), ORDER);
            right.take_tail(left, SPLIT_MID);

            old_right = left.header().right_offset();
            right.header_mut().set_left_offset(left_offset);
            right.header_mut().set_right_offset(old_right);
            left.header_mut().set_right_offset(right_offset);
        }

        let moved_children = index_view(&right_block)?.count() + 1;
        for i in 0..moved_children {
            let child_offset = index_view(&right_block)?.child(i);
            let mut child = self.load(child_offset)?;
            header_view_mut(&mut child)?.set_parent_offset(right_offset);
        }

        if old_right != NULL_OFFSET {
            let mut neighbor = self.load(old_right)?;
            header_view_mut(&mut neighbor)?.set_left_offset(right_offset);
        }
        Ok(right_block)
    }

    /// Loads the node's parent, creating a new index root first if the node
    /// was the root.
    fn get_or_create_parent(&mut self, block: &mut BlockRef<'t>) -> Result<BlockRef<'t>> {
        let parent_offset = header_view(block)?.parent_offset();
        if parent_offset != NULL_OFFSET {
            return self.load(parent_offset);
        }

        let parent_block = self.alloc_block()?;
        let parent_offset = parent_block.offset();
        header_view_mut(block)?.set_parent_offset(parent_offset);
        self.meta.set_root_offset(parent_offset);
        self.meta.set_height(self.meta.height() + 1);
        Ok(parent_block)
    }

    fn delete(&mut self, key: &Key) -> Result<bool> {
        let leaf_offset = descend_to_leaf(self.cache, self.meta, key)?;
        let mut leaf_block = self.load(leaf_offset)?;
        {
            let leaf = leaf_view_mut(&mut leaf_block)?;
            let Some(index) = leaf.find(key) else {
                return Ok(false);
            };
            leaf.remove_at(index);
        }
        self.meta.decrement_size();

        if header_view(&leaf_block)?.is_root() {
            return Ok(true); // a root leaf may run empty
        }
        if leaf_view(&leaf_block)?.count() >= MIN_KEYS {
            return Ok(true);
        }
        if self.borrow_for_leaf(&mut leaf_block)? {
            return Ok(true);
        }
        self.merge_leaf(&mut leaf_block)?;

        let parent_offset = header_view(&leaf_block)?.parent_offset();
        drop(leaf_block);

        // A leaf merge removed an entry from its parent; rebalance index
        // levels bottom-up while they underflow.
        let mut node_block = self.load(parent_offset)?;
        loop {
            if header_view(&node_block)?.is_root()
                || index_view(&node_block)?.count() >= MIN_KEYS
                || self.borrow_for_index(&mut node_block)?
            {
                break;
            }
            self.merge_index(&mut node_block)?;
            let up = header_view(&node_block)?.parent_offset();
            drop(node_block);
            node_block = self.load(up)?;
        }

        if header_view(&node_block)?.is_root() && index_view(&node_block)?.count() == 0 {
            self.collapse_root(&node_block)?;
        }
        Ok(true)
    }

    /// An index root with no keys left routes everything through its single
    /// child: promote it and shrink the tree by one level.
    fn collapse_root(&mut self, root_block: &BlockRef<'t>) -> Result<()> {
        let child_offset = index_view(root_block)?.child(0);
        let mut child_block = self.load(child_offset)?;
        let child = header_view_mut(&mut child_block)?;
        debug_assert_eq!(child.left_offset(), NULL_OFFSET);
        debug_assert_eq!(child.right_offset(), NULL_OFFSET);
        child.set_parent_offset(NULL_OFFSET);
        self.meta.set_root_offset(child_offset);
        self.meta.set_height(self.meta.height() - 1);
        // The old root block is unreachable from here on.
        Ok(())
    }

    fn borrow_for_leaf(&mut self, block: &mut BlockRef<'t>) -> Result<bool> {
        if self.borrow_from_left_leaf(block)? {
            return Ok(true);
        }
        self.borrow_from_right_leaf(block)
    }

    fn borrow_from_left_leaf(&mut self, block: &mut BlockRef<'t>) -> Result<bool> {
        let left_offset = header_view(block)?.left_offset();
        if left_offset == NULL_OFFSET {
            return Ok(false);
        }
        let mut sibling_block = self.load(left_offset)?;
        let parent_offset = header_view(block)?.parent_offset();
        if header_view(&sibling_block)?.parent_offset() != parent_offset
            || leaf_view(&sibling_block)?.count() <= MIN_KEYS
        {
            return Ok(false);
        }

        // The donor's last record becomes this node's first.
        let probe;
        let new_first;
        {
            let sibling = leaf_view_mut(&mut sibling_block)?;
            let node = leaf_view_mut(block)?;
            let donated = *sibling.last_record();
            node.insert_at(0, donated.key(), donated.value());
            let remaining = sibling.count() - 1;
            sibling.header_mut().set_count(remaining);
            probe = *sibling.last_key();
            new_first = *node.first_key();
        }

        // The separator routing between the two siblings becomes the right
        // sibling's new first key.
        let mut parent_block = self.load(parent_offset)?;
        let parent = index_view_mut(&mut parent_block)?;
        let index = parent.upper_bound(&probe);
        parent.set_key(index, &new_first);
        Ok(true)
    }

    fn borrow_from_right_leaf(&mut self, block: &mut BlockRef<'t>) -> Result<bool> {
        let right_offset = header_view(block)?.right_offset();
        if right_offset == NULL_OFFSET {
            return Ok(false);
        }
        let mut sibling_block = self.load(right_offset)?;
        let parent_offset = header_view(block)?.parent_offset();
        if header_view(&sibling_block)?.parent_offset() != parent_offset
            || leaf_view(&sibling_block)?.count() <= MIN_KEYS
        {
            return Ok(false);
        }

        // The donor's first record becomes this node's last.
        let probe;
        let new_separator;
        {
            let sibling = leaf_view_mut(&mut sibling_block)?;
            let node = leaf_view_mut(block)?;
            let donated = *sibling.record(0);
            node.insert_at(node.count(), donated.key(), donated.value());
            sibling.remove_at(0);
            probe = *sibling.last_key();
            new_separator = *sibling.first_key();
        }

        let mut parent_block = self.load(parent_offset)?;
        let parent = index_view_mut(&mut parent_block)?;
        let index = parent.upper_bound(&probe);
        parent.set_key(index - 1, &new_separator);
        Ok(true)
    }

    fn merge_leaf(&mut self, block: &mut BlockRef<'t>) -> Result<()> {
        if self.merge_leaf_with_left(block)? {
            return Ok(());
        }
        if self.merge_leaf_with_right(block)? {
            return Ok(());
        }
        bail!(
            "leaf at offset {} has no same-parent sibling to merge with",
            block.offset()
        );
    }

    fn merge_leaf_with_left(&mut self, block: &mut BlockRef<'t>) -> Result<bool> {
        let left_offset = header_view(block)?.left_offset();
        if left_offset == NULL_OFFSET {
            return Ok(false);
        }
        let sibling_block = self.load(left_offset)?;
        let parent_offset = header_view(block)?.parent_offset();
        if header_view(&sibling_block)?.parent_offset() != parent_offset {
            return Ok(false);
        }

        // The separator between the siblings goes away, along with the
        // absorbed sibling's child slot.
        let probe = *leaf_view(&sibling_block)?.last_key();
        {
            let mut parent_block = self.load(parent_offset)?;
            let parent = index_view_mut(&mut parent_block)?;
            let index = parent.upper_bound(&probe);
            parent.remove_entry_at(index);
        }

        let new_left = header_view(&sibling_block)?.left_offset();
        {
            let node = leaf_view_mut(block)?;
            node.merge_from_left(leaf_view(&sibling_block)?);
            node.header_mut().set_left_offset(new_left);
        }
        if new_left != NULL_OFFSET {
            let mut neighbor = self.load(new_left)?;
            header_view_mut(&mut neighbor)?.set_right_offset(block.offset());
        }
        Ok(true)
    }

    fn merge_leaf_with_right(&mut self, block: &mut BlockRef<'t>) -> Result<bool> {
        let right_offset = header_view(block)?.right_offset();
        if right_offset == NULL_OFFSET {
            return Ok(false);
        }
        let sibling_block = self.load(right_offset)?;
        let parent_offset = header_view(block)?.parent_offset();
        if header_view(&sibling_block)?.parent_offset() != parent_offset {
            return Ok(false);
        }

        let probe = *leaf_view(&sibling_block)?.last_key();
        {
            let mut parent_block = self.load(parent_offset)?;
            let parent = index_view_mut(&mut parent_block)?;
            let index = parent.upper_bound(&probe);
            // The surviving node takes over the absorbed sibling's routing:
            // its separator slides one slot left, then the sibling's entry
            // goes away. When the pair sits at the right edge the copied
            // key is the dead slot, which the removal shifts out again.
            let following = *parent.key(index);
            parent.set_key(index - 1, &following);
            parent.remove_entry_at(index);
        }

        let new_right = header_view(&sibling_block)?.right_offset();
        {
            let node = leaf_view_mut(block)?;
            node.merge_from_right(leaf_view(&sibling_block)?);
            node.header_mut().set_right_offset(new_right);
        }
        if new_right != NULL_OFFSET {
            let mut neighbor = self.load(new_right)?;
            header_view_mut(&mut neighbor)?.set_left_offset(block.offset());
        }
        Ok(true)
    }

    fn borrow_for_index(&mut self, block: &mut BlockRef<'t>) -> Result<bool> {
        if self.borrow_from_left_index(block)? {
            return Ok(true);
        }
        self.borrow_from_right_index(block)
    }

    /// Rotate through the parent: the separator comes down in front of this
    /// node's keys, the donor's last key goes up, and the donor's last
    /// child moves across.
    fn borrow_from_left_index(&mut self, block: &mut BlockRef<'t>) -> Result<bool> {
        let left_offset = header_view(block)?.left_offset();
        if left_offset == NULL_OFFSET {
            return Ok(false);
        }
        let mut sibling_block = self.load(left_offset)?;
        let parent_offset = header_view(block)?.parent_offset();
        if header_view(&sibling_block)?.parent_offset() != parent_offset
            || index_view(&sibling_block)?.count() <= MIN_KEYS
        {
            return Ok(false);
        }

        let mut parent_block = self.load(parent_offset)?;
        let probe = *index_view(&sibling_block)?.last_key();
        let donated_child;
        {
            let parent = index_view_mut(&mut parent_block)?;
            let separator_index = parent.upper_bound(&probe);
            let separator = *parent.key(separator_index);

            let node = index_view_mut(block)?;
            node.insert_key_at(0, &separator);
            parent.set_key(separator_index, &probe);

            let sibling = index_view_mut(&mut sibling_block)?;
            donated_child = sibling.child(sibling.count());
            let remaining = sibling.count() - 1;
            sibling.header_mut().set_count(remaining);
            node.set_child(0, donated_child);
        }
        let mut child_block = self.load(donated_child)?;
        header_view_mut(&mut child_block)?.set_parent_offset(block.offset());
        Ok(true)
    }

    /// Mirror image of [`Engine::borrow_from_left_index`]: the separator is
    /// appended here, the donor's first key goes up, its first child moves
    /// across.
    fn borrow_from_right_index(&mut self, block: &mut BlockRef<'t>) -> Result<bool> {
        let right_offset = header_view(block)?.right_offset();
        if right_offset == NULL_OFFSET {
            return Ok(false);
        }
        let mut sibling_block = self.load(right_offset)?;
        let parent_offset = header_view(block)?.parent_offset();
        if header_view(&sibling_block)?.parent_offset() != parent_offset
            || index_view(&sibling_block)?.count() <= MIN_KEYS
        {
            return Ok(false);
        }

        let mut parent_block = self.load(parent_offset)?;
        let probe = *index_view(&sibling_block)?.last_key();
        let donated_child;
        {
            let parent = index_view_mut(&mut parent_block)?;
            let separator_index = parent.upper_bound(&probe);
            let separator = *parent.key(separator_index - 1);

            let node = index_view_mut(block)?;
            let count = node.count();
            node.set_key(count, &separator);
            node.header_mut().set_count(count + 1);

            let sibling = index_view_mut(&mut sibling_block)?;
            parent.set_key(separator_index - 1, sibling.first_key());
            donated_child = sibling.child(0);
            node.set_child(count + 1, donated_child);
            sibling.remove_entry_at(0);
        }
        let mut child_block = self.load(donated_child)?;
        header_view_mut(&mut child_block)?.set_parent_offset(block.offset());
        Ok(true)
    }

    fn merge_index(&mut self, block: &mut BlockRef<'t>) -> Result<()> {
        if self.merge_index_with_left(block)? {
            return Ok(());
        }
        if self.merge_index_with_right(block)? {
            return Ok(());
        }
        bail!(
            "index node at offset {} has no same-parent sibling to merge with",
            block.offset()
        );
    }

    fn merge_index_with_left(&mut self, block: &mut BlockRef<'t>) -> Result<bool> {
        let left_offset = header_view(block)?.left_offset();
        if left_offset == NULL_OFFSET {
            return Ok(false);
        }
        let sibling_block = self.load(left_offset)?;
        let parent_offset = header_view(block)?.parent_offset();
        if header_view(&sibling_block)?.parent_offset() != parent_offset {
            return Ok(false);
        }

        let sibling_count = index_view(&sibling_block)?.count();
        {
            let node = index_view_mut(block)?;
            node.merge_from_left(index_view(&sibling_block)?);
        }

        // Children that moved now point here.
        for i in 0..sibling_count + 1 {
            let child_offset = index_view(&sibling_block)?.child(i);
            let mut child = self.load(child_offset)?;
            header_view_mut(&mut child)?.set_parent_offset(block.offset());
        }

        // Unlink the absorbed sibling from the chain.
        let new_left = header_view(&sibling_block)?.left_offset();
        header_view_mut(block)?.set_left_offset(new_left);
        if new_left != NULL_OFFSET {
            let mut neighbor = self.load(new_left)?;
            header_view_mut(&mut neighbor)?.set_right_offset(block.offset());
        }

        // The separator comes down into the seam between the two runs of
        // keys, and the parent loses it.
        let probe = *index_view(&sibling_block)?.last_key();
        let mut parent_block = self.load(parent_offset)?;
        {
            let parent = index_view_mut(&mut parent_block)?;
            let index = parent.upper_bound(&probe);
            let separator = *parent.key(index);
            index_view_mut(block)?.set_key(sibling_count, &separator);
            parent.remove_entry_at(index);
        }
        Ok(true)
    }

    fn merge_index_with_right(&mut self, block: &mut BlockRef<'t>) -> Result<bool> {
        let right_offset = header_view(block)?.right_offset();
        if right_offset == NULL_OFFSET {
            return Ok(false);
        }
        let sibling_block = self.load(right_offset)?;
        let parent_offset = header_view(block)?.parent_offset();
        if header_view(&sibling_block)?.parent_offset() != parent_offset {
            return Ok(false);
        }

        let probe = *index_view(&sibling_block)?.last_key();
        let mut parent_block = self.load(parent_offset)?;
        let separator_index;
        {
            let parent = index_view_mut(&mut parent_block)?;
            separator_index = parent.upper_bound(&probe);
            let separator = *parent.key(separator_index - 1);

            // The pulled-down separator joins the two runs, then the
            // sibling's entries follow it.
            let node = index_view_mut(block)?;
            let count = node.count();
            node.set_key(count, &separator);
            node.header_mut().set_count(count + 1);
            node.merge_from_right(index_view(&sibling_block)?);
        }

        let sibling_count = index_view(&sibling_block)?.count();
        for i in 0..sibling_count + 1 {
            let child_offset = index_view(&sibling_block)?.child(i);
            let mut child = self.load(child_offset)?;
            header_view_mut(&mut child)?.set_parent_offset(block.offset());
        }

        let new_right = header_view(&sibling_block)?.right_offset();
        header_view_mut(block)?.set_right_offset(new_right);
        if new_right != NULL_OFFSET {
            let mut neighbor = self.load(new_right)?;
            header_view_mut(&mut neighbor)?.set_left_offset(block.offset());
        }

        {
            let parent = index_view_mut(&mut parent_block)?;
            let following = *parent.key(separator_index);
            parent.set_key(separator_index - 1, &following);
            parent.remove_entry_at(separator_index);
        }
        Ok(true)
    }
}
