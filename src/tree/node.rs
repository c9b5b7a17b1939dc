//! # On-Disk Node Layout
//!
//! Every structure that reaches disk is defined here as a `#[repr(C)]`
//! zerocopy struct: its memory image is its file image, and blocks are read
//! and written in place through the cache's mappings. All multi-byte fields
//! use little-endian wrapper types, which also makes every struct
//! `Unaligned` — a view can start at any byte offset of a mapping.
//!
//! ## File Layout
//!
//! ```text
//! offset 0    Meta (128 bytes): magic, version, geometry, root, bump
//!             pointer, height, size
//! offset 128  block 0
//! offset 128 + BLOCK_SIZE
//!             block 1
//! ...
//! ```
//!
//! Blocks are uniformly `BLOCK_SIZE` bytes (the larger of the two node
//! images; index nodes leave the tail unused). A block is a leaf or an
//! index node depending on its depth — the kind is never tagged on disk.
//! Both start with the shared `NodeHeader`, so code that only touches
//! parent or sibling links can view just the header prefix without knowing
//! the kind.
//!
//! ## Geometry
//!
//! The node shapes are functions of the compile-time constants in
//! [`crate::config`]. `Meta` stamps `ORDER`, `MAX_KEY_LEN` and
//! `MAX_VALUE_LEN` into the file so that a store written with one geometry
//! refuses to open under another instead of misreading it.
//!
//! ## Keys and values
//!
//! Keys and values are NUL-padded fixed-width byte strings. Longer inputs
//! are truncated by [`pad_key`]/[`pad_value`]; comparison is plain
//! lexicographic order over the whole padded array. Trailing padding is
//! stripped again on the way out ([`strip_padding`]) — fixed-width storage
//! cannot distinguish `b"abc"` from `b"abc\0"`.

use eyre::{ensure, Result};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{MAX_KEY_LEN, MAX_VALUE_LEN, ORDER};
use crate::storage::{view, view_mut, BlockRef};

pub const META_MAGIC: &[u8; 16] = b"burrow kv v1\x00\x00\x00\x00";
pub const FORMAT_VERSION: u32 = 1;

pub const META_SIZE: usize = 128;
pub const NODE_HEADER_SIZE: usize = 40;
pub const RECORD_SIZE: usize = MAX_KEY_LEN + MAX_VALUE_LEN;
pub const INDEX_ENTRY_SIZE: usize = 8 + MAX_KEY_LEN;

pub const LEAF_NODE_SIZE: usize = size_of::<LeafNode>();
pub const INDEX_NODE_SIZE: usize = size_of::<IndexNode>();

/// Uniform block size: every allocated block spans this many bytes, so a
/// block can be reloaded without knowing which node kind lives in it.
pub const BLOCK_SIZE: usize = if LEAF_NODE_SIZE > INDEX_NODE_SIZE {
    LEAF_NODE_SIZE
} else {
    INDEX_NODE_SIZE
};

/// Null link value for parent/sibling offsets; no node ever lives at
/// offset 0 (the Meta record does).
pub const NULL_OFFSET: u64 = 0;

pub type Key = [u8; MAX_KEY_LEN];
pub type Value = [u8; MAX_VALUE_LEN];

const _: () = assert!(size_of::<Meta>() == META_SIZE);
const _: () = assert!(size_of::<NodeHeader>() == NODE_HEADER_SIZE);
const _: () = assert!(size_of::<Record>() == RECORD_SIZE);
const _: () = assert!(size_of::<IndexEntry>() == INDEX_ENTRY_SIZE);
const _: () = assert!(LEAF_NODE_SIZE == NODE_HEADER_SIZE + ORDER * RECORD_SIZE);
const _: () = assert!(INDEX_NODE_SIZE == NODE_HEADER_SIZE + (ORDER + 1) * INDEX_ENTRY_SIZE);

const _: () = assert!(
    crate::config::CACHE_CEILING_BYTES >= 8 * BLOCK_SIZE,
    "the cache ceiling must hold the pinned working set of one tree operation"
);

/// Truncates and NUL-pads an input key to the fixed key width.
pub fn pad_key(input: &[u8]) -> Key {
    let mut key = [0u8; MAX_KEY_LEN];
    let len = input.len().min(MAX_KEY_LEN);
    key[..len].copy_from_slice(&input[..len]);
    key
}

/// Truncates and NUL-pads an input value to the fixed value width.
pub fn pad_value(input: &[u8]) -> Value {
    let mut value = [0u8; MAX_VALUE_LEN];
    let len = input.len().min(MAX_VALUE_LEN);
    value[..len].copy_from_slice(&input[..len]);
    value
}

/// Strips trailing NUL padding from a stored key or value.
pub fn strip_padding(buf: &[u8]) -> &[u8] {
    let end = buf.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &buf[..end]
}

/// File header at offset 0. `height == 0` marks a freshly created file;
/// every live tree has height >= 1.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Meta {
    magic: [u8; 16],
    version: U32,
    order: U32,
    key_len: U32,
    value_len: U32,
    root_offset: U64,
    next_block_offset: U64,
    height: U64,
    size: U64,
    reserved: [u8; 64],
}

impl Meta {
    pub fn new() -> Self {
        Self {
            magic: *META_MAGIC,
            version: U32::new(FORMAT_VERSION),
            order: U32::new(ORDER as u32),
            key_len: U32::new(MAX_KEY_LEN as u32),
            value_len: U32::new(MAX_VALUE_LEN as u32),
            root_offset: U64::new(0),
            next_block_offset: U64::new(0),
            height: U64::new(0),
            size: U64::new(0),
            reserved: [0u8; 64],
        }
    }

    /// A freshly created (or zero-filled) header, eligible for
    /// initialization.
    pub(crate) fn is_blank(&self) -> bool {
        self.magic == [0u8; 16]
    }

    /// Checks that an existing file carries our magic, format version and
    /// compiled geometry. A mismatch means the file was written by a
    /// different build and must not be interpreted.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            &self.magic == META_MAGIC,
            "not a burrow store (bad magic bytes)"
        );
        ensure!(
            self.version.get() == FORMAT_VERSION,
            "unsupported format version {} (expected {})",
            self.version.get(),
            FORMAT_VERSION
        );
        ensure!(
            self.order.get() == ORDER as u32
                && self.key_len.get() == MAX_KEY_LEN as u32
                && self.value_len.get() == MAX_VALUE_LEN as u32,
            "store geometry mismatch: file has order={}/key={}/value={}, \
             this build uses order={}/key={}/value={}",
            self.order.get(),
            self.key_len.get(),
            self.value_len.get(),
            ORDER,
            MAX_KEY_LEN,
            MAX_VALUE_LEN
        );
        ensure!(self.height.get() >= 1, "store has no root (height 0)");
        Ok(())
    }

    pub fn root_offset(&self) -> u64 {
        self.root_offset.get()
    }

    pub fn set_root_offset(&mut self, offset: u64) {
        self.root_offset = U64::new(offset);
    }

    pub fn next_block_offset(&self) -> u64 {
        self.next_block_offset.get()
    }

    pub fn set_next_block_offset(&mut self, offset: u64) {
        self.next_block_offset = U64::new(offset);
    }

    pub fn height(&self) -> u64 {
        self.height.get()
    }

    pub fn set_height(&mut self, height: u64) {
        self.height = U64::new(height);
    }

    pub fn size(&self) -> u64 {
        self.size.get()
    }

    pub fn increment_size(&mut self) {
        self.size = U64::new(self.size.get() + 1);
    }

    pub fn decrement_size(&mut self) {
        debug_assert!(self.size.get() > 0, "size underflow");
        self.size = U64::new(self.size.get() - 1);
    }
}

impl Default for Meta {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared prefix of leaf and index nodes: identity plus tree links.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodeHeader {
    self_offset: U64,
    parent_offset: U64,
    left_offset: U64,
    right_offset: U64,
    count: U64,
}

impl NodeHeader {
    pub fn self_offset(&self) -> u64 {
        self.self_offset.get()
    }

    pub fn set_self_offset(&mut self, offset: u64) {
        self.self_offset = U64::new(offset);
    }

    pub fn parent_offset(&self) -> u64 {
        self.parent_offset.get()
    }

    pub fn set_parent_offset(&mut self, offset: u64) {
        self.parent_offset = U64::new(offset);
    }

    pub fn left_offset(&self) -> u64 {
        self.left_offset.get()
    }

    pub fn set_left_offset(&mut self, offset: u64) {
        self.left_offset = U64::new(offset);
    }

    pub fn right_offset(&self) -> u64 {
        self.right_offset.get()
    }

    pub fn set_right_offset(&mut self, offset: u64) {
        self.right_offset = U64::new(offset);
    }

    pub fn count(&self) -> usize {
        self.count.get() as usize
    }

    pub fn set_count(&mut self, count: usize) {
        self.count = U64::new(count as u64);
    }

    pub fn is_root(&self) -> bool {
        self.parent_offset() == NULL_OFFSET
    }
}

/// One leaf payload slot: a NUL-padded key/value pair.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Record {
    key: Key,
    value: Value,
}

impl Record {
    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    fn set(&mut self, key: &Key, value: &Value) {
        self.key = *key;
        self.value = *value;
    }
}

/// One index payload slot: a child pointer and the separator key to its
/// right. For a node with `count == n`, entries `0..n` carry live keys and
/// entries `0..=n` carry live children; entry `n`'s key is dead storage
/// except transiently during a split, when the promoted separator is parked
/// there.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct IndexEntry {
    child_offset: U64,
    key: Key,
}

/// Leaf node: sorted records, linked to its siblings.
#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct LeafNode {
    header: NodeHeader,
    records: [Record; ORDER],
}

impl LeafNode {
    pub fn header(&self) -> &NodeHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut NodeHeader {
        &mut self.header
    }

    pub fn count(&self) -> usize {
        self.header.count()
    }

    pub fn record(&self, index: usize) -> &Record {
        debug_assert!(index < self.count());
        &self.records[index]
    }

    pub fn first_key(&self) -> &Key {
        debug_assert!(self.count() > 0);
        &self.records[0].key
    }

    pub fn last_key(&self) -> &Key {
        debug_assert!(self.count() > 0);
        &self.records[self.count() - 1].key
    }

    pub fn last_record(&self) -> &Record {
        debug_assert!(self.count() > 0);
        &self.records[self.count() - 1]
    }

    /// Smallest index whose key is strictly greater than `key`.
    pub fn upper_bound(&self, key: &Key) -> usize {
        self.records[..self.count()].partition_point(|r| r.key <= *key)
    }

    /// Smallest index whose key is greater than or equal to `key`.
    pub fn lower_bound(&self, key: &Key) -> usize {
        self.records[..self.count()].partition_point(|r| r.key < *key)
    }

    /// Position of `key` if present.
    pub fn find(&self, key: &Key) -> Option<usize> {
        let index = self.lower_bound(key);
        (index < self.count() && self.records[index].key == *key).then_some(index)
    }

    pub fn insert_at(&mut self, index: usize, key: &Key, value: &Value) {
        let count = self.count();
        debug_assert!(index <= count && count < ORDER);
        self.records.copy_within(index..count, index + 1);
        self.records[index].set(key, value);
        self.header.set_count(count + 1);
    }

    pub fn remove_at(&mut self, index: usize) {
        let count = self.count();
        debug_assert!(index < count);
        self.records.copy_within(index + 1..count, index);
        self.header.set_count(count - 1);
    }

    pub fn set_value_at(&mut self, index: usize, value: &Value) {
        debug_assert!(index < self.count());
        self.records[index].value = *value;
    }

    /// Splits an overfull donor: records `mid..` move here, the donor keeps
    /// `..mid`.
    pub fn take_tail(&mut self, donor: &mut LeafNode, mid: usize) {
        let total = donor.count();
        debug_assert!(self.count() == 0 && mid < total);
        let moved = total - mid;
        self.records[..moved].copy_from_slice(&donor.records[mid..total]);
        self.header.set_count(moved);
        donor.header.set_count(mid);
    }

    /// Prepends all of the left sibling's records.
    pub fn merge_from_left(&mut self, sibling: &LeafNode) {
        let own = self.count();
        let donated = sibling.count();
        debug_assert!(own + donated <= ORDER);
        self.records.copy_within(0..own, donated);
        self.records[..donated].copy_from_slice(&sibling.records[..donated]);
        self.header.set_count(own + donated);
    }

    /// Appends all of the right sibling's records.
    pub fn merge_from_right(&mut self, sibling: &LeafNode) {
        let own = self.count();
        let donated = sibling.count();
        debug_assert!(own + donated <= ORDER);
        self.records[own..own + donated].copy_from_slice(&sibling.records[..donated]);
        self.header.set_count(own + donated);
    }
}

/// Index node: separator keys routing between `count + 1` children.
#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct IndexNode {
    header: NodeHeader,
    entries: [IndexEntry; ORDER + 1],
}

impl IndexNode {
    pub fn header(&self) -> &NodeHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut NodeHeader {
        &mut self.header
    }

    pub fn count(&self) -> usize {
        self.header.count()
    }

    pub fn key(&self, index: usize) -> &Key {
        debug_assert!(index <= ORDER);
        &self.entries[index].key
    }

    pub fn set_key(&mut self, index: usize, key: &Key) {
        debug_assert!(index <= ORDER);
        self.entries[index].key = *key;
    }

    pub fn child(&self, index: usize) -> u64 {
        debug_assert!(index <= ORDER);
        self.entries[index].child_offset.get()
    }

    pub fn set_child(&mut self, index: usize, offset: u64) {
        debug_assert!(index <= ORDER);
        self.entries[index].child_offset = U64::new(offset);
    }

    pub fn first_key(&self) -> &Key {
        debug_assert!(self.count() > 0);
        &self.entries[0].key
    }

    pub fn last_key(&self) -> &Key {
        debug_assert!(self.count() > 0);
        &self.entries[self.count() - 1].key
    }

    /// Smallest index whose key is strictly greater than `key`; also the
    /// child index a descent for `key` follows.
    pub fn upper_bound(&self, key: &Key) -> usize {
        self.entries[..self.count()].partition_point(|e| e.key <= *key)
    }

    /// Inserts a key at `index`, shifting entries right. The child already
    /// stored at `index` stays put; the shifted copy's child lands at
    /// `index + 1`.
    pub fn insert_key_at(&mut self, index: usize, key: &Key) {
        let count = self.count();
        debug_assert!(index <= count && count < ORDER);
        self.entries.copy_within(index..count + 1, index + 1);
        self.entries[index].key = *key;
        self.header.set_count(count + 1);
    }

    /// Inserts a (key, child) pair at `index`, shifting entries right.
    pub fn insert_entry_at(&mut self, index: usize, key: &Key, child: u64) {
        let count = self.count();
        debug_assert!(index <= count && count < ORDER);
        self.entries.copy_within(index..count + 1, index + 1);
        self.entries[index].key = *key;
        self.entries[index].child_offset = U64::new(child);
        self.header.set_count(count + 1);
    }

    /// Removes the key and child at `index`, shifting entries left.
    pub fn remove_entry_at(&mut self, index: usize) {
        let count = self.count();
        debug_assert!(index <= count && count > 0);
        self.entries.copy_within(index + 1..count + 1, index);
        self.header.set_count(count - 1);
    }

    /// Splits an overfull donor: entries `mid + 1..` move here, the donor
    /// keeps keys `..mid`. The promoted separator stays parked in the
    /// donor's dead slot at `mid` for the caller to read.
    pub fn take_tail(&mut self, donor: &mut IndexNode, mid: usize) {
        let total = donor.count();
        debug_assert!(self.count() == 0 && mid + 1 < total);
        let moved_keys = total - mid - 1;
        self.entries[..moved_keys + 1].copy_from_slice(&donor.entries[mid + 1..total + 1]);
        self.header.set_count(moved_keys);
        donor.header.set_count(mid);
    }

    /// Prepends all of the left sibling's entries (keys and children,
    /// including its end child). The key slot between the two runs — index
    /// `sibling.count()` afterwards — is left for the caller to fill with
    /// the separator pulled down from the parent.
    pub fn merge_from_left(&mut self, sibling: &IndexNode) {
        let own = self.count();
        let donated = sibling.count();
        debug_assert!(own + donated + 1 <= ORDER);
        self.entries.copy_within(0..own + 1, donated + 1);
        self.entries[..donated + 1].copy_from_slice(&sibling.entries[..donated + 1]);
        self.header.set_count(own + donated + 1);
    }

    /// Appends all of the right sibling's entries. The caller has already
    /// appended the pulled-down separator key, so the runs join cleanly.
    pub fn merge_from_right(&mut self, sibling: &IndexNode) {
        let own = self.count();
        let donated = sibling.count();
        debug_assert!(own + donated <= ORDER);
        self.entries[own..own + donated + 1].copy_from_slice(&sibling.entries[..donated + 1]);
        self.header.set_count(own + donated);
    }
}

pub(crate) fn header_view<'g>(block: &'g BlockRef<'_>) -> Result<&'g NodeHeader> {
    view(block.bytes())
}

pub(crate) fn header_view_mut<'g>(block: &'g mut BlockRef<'_>) -> Result<&'g mut NodeHeader> {
    view_mut(block.bytes_mut())
}

pub(crate) fn leaf_view<'g>(block: &'g BlockRef<'_>) -> Result<&'g LeafNode> {
    view(block.bytes())
}

pub(crate) fn leaf_view_mut<'g>(block: &'g mut BlockRef<'_>) -> Result<&'g mut LeafNode> {
    view_mut(block.bytes_mut())
}

pub(crate) fn index_view<'g>(block: &'g BlockRef<'_>) -> Result<&'g IndexNode> {
    view(block.bytes())
}

pub(crate) fn index_view_mut<'g>(block: &'g mut BlockRef<'_>) -> Result<&'g mut IndexNode> {
    view_mut(block.bytes_mut())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::IntoBytes;

    fn key(text: &str) -> Key {
        pad_key(text.as_bytes())
    }

    fn value(text: &str) -> Value {
        pad_value(text.as_bytes())
    }

    fn empty_leaf() -> Box<LeafNode> {
        LeafNode::read_from_bytes(&vec![0u8; LEAF_NODE_SIZE])
            .map(Box::new)
            .unwrap()
    }

    fn empty_index() -> Box<IndexNode> {
        IndexNode::read_from_bytes(&vec![0u8; INDEX_NODE_SIZE])
            .map(Box::new)
            .unwrap()
    }

    #[test]
    fn meta_is_exactly_128_bytes() {
        assert_eq!(size_of::<Meta>(), META_SIZE);
    }

    #[test]
    fn block_size_covers_both_node_kinds() {
        assert!(BLOCK_SIZE >= LEAF_NODE_SIZE);
        assert!(BLOCK_SIZE >= INDEX_NODE_SIZE);
    }

    #[test]
    fn meta_roundtrip_validates() {
        let mut meta = Meta::new();
        meta.set_root_offset(128);
        meta.set_next_block_offset(128 + BLOCK_SIZE as u64);
        meta.set_height(1);

        let bytes = meta.as_bytes().to_vec();
        let parsed: &Meta = crate::storage::view(&bytes).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.root_offset(), 128);
        assert_eq!(parsed.height(), 1);
        assert_eq!(parsed.size(), 0);
    }

    #[test]
    fn meta_rejects_bad_magic() {
        let mut meta = Meta::new();
        meta.set_height(1);
        meta.magic = *b"definitely wrong";

        let err = meta.validate().unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn meta_rejects_geometry_mismatch() {
        let mut meta = Meta::new();
        meta.set_height(1);
        meta.order = U32::new(ORDER as u32 + 1);

        let err = meta.validate().unwrap_err();
        assert!(err.to_string().contains("geometry"));
    }

    #[test]
    fn pad_truncates_and_strip_inverts() {
        let long = vec![b'x'; MAX_KEY_LEN + 10];
        let padded = pad_key(&long);
        assert_eq!(&padded[..], &long[..MAX_KEY_LEN]);

        assert_eq!(strip_padding(&pad_value(b"hello")), b"hello");
        assert_eq!(strip_padding(&pad_key(b"")), b"");
    }

    #[test]
    fn leaf_insert_keeps_sorted_order() {
        let mut leaf = empty_leaf();

        for text in ["delta", "alpha", "charlie", "bravo"] {
            let k = key(text);
            let at = leaf.upper_bound(&k);
            leaf.insert_at(at, &k, &value(text));
        }

        assert_eq!(leaf.count(), 4);
        let got: Vec<&[u8]> = (0..4).map(|i| strip_padding(leaf.record(i).key())).collect();
        assert_eq!(
            got,
            vec![&b"alpha"[..], &b"bravo"[..], &b"charlie"[..], &b"delta"[..]]
        );
    }

    #[test]
    fn leaf_bounds_and_find() {
        let mut leaf = empty_leaf();
        for text in ["b", "d", "f"] {
            let k = key(text);
            leaf.insert_at(leaf.count(), &k, &value(text));
        }

        assert_eq!(leaf.lower_bound(&key("d")), 1);
        assert_eq!(leaf.upper_bound(&key("d")), 2);
        assert_eq!(leaf.lower_bound(&key("c")), 1);
        assert_eq!(leaf.upper_bound(&key("g")), 3);

        assert_eq!(leaf.find(&key("f")), Some(2));
        assert_eq!(leaf.find(&key("c")), None);
    }

    #[test]
    fn leaf_remove_shifts_left() {
        let mut leaf = empty_leaf();
        for text in ["a", "b", "c"] {
            leaf.insert_at(leaf.count(), &key(text), &value(text));
        }

        leaf.remove_at(1);

        assert_eq!(leaf.count(), 2);
        assert_eq!(leaf.record(0).key(), &key("a"));
        assert_eq!(leaf.record(1).key(), &key("c"));
    }

    #[test]
    fn leaf_split_is_right_biased() {
        let mut left = empty_leaf();
        for i in 0..ORDER {
            let k = key(&format!("k{i:04}"));
            left.insert_at(left.count(), &k, &value("v"));
        }

        let mut right = empty_leaf();
        let mid = (ORDER - 1) / 2;
        right.take_tail(&mut left, mid);

        assert_eq!(left.count(), mid);
        assert_eq!(right.count(), ORDER - mid);
        assert_eq!(right.first_key(), &key(&format!("k{mid:04}")));
    }

    #[test]
    fn leaf_merges_preserve_order() {
        let mut a = empty_leaf();
        let mut b = empty_leaf();
        for text in ["a", "b"] {
            a.insert_at(a.count(), &key(text), &value(text));
        }
        for text in ["c", "d"] {
            b.insert_at(b.count(), &key(text), &value(text));
        }

        b.merge_from_left(&a);
        assert_eq!(b.count(), 4);
        assert_eq!(b.first_key(), &key("a"));
        assert_eq!(b.last_key(), &key("d"));

        let mut c = empty_leaf();
        c.insert_at(0, &key("e"), &value("e"));
        let mut d = empty_leaf();
        d.insert_at(0, &key("f"), &value("f"));
        c.merge_from_right(&d);
        assert_eq!(c.count(), 2);
        assert_eq!(c.last_key(), &key("f"));
    }

    #[test]
    fn index_insert_entry_routes_children() {
        let mut node = empty_index();
        node.set_child(0, 1000);

        // Separator "m" between children 1000 and 2000.
        node.insert_entry_at(0, &key("m"), 1000);
        node.set_child(1, 2000);

        assert_eq!(node.count(), 1);
        assert_eq!(node.child(node.upper_bound(&key("a"))), 1000);
        assert_eq!(node.child(node.upper_bound(&key("m"))), 2000);
        assert_eq!(node.child(node.upper_bound(&key("z"))), 2000);
    }

    #[test]
    fn index_insert_key_keeps_left_child() {
        let mut node = empty_index();
        node.set_child(0, 1000);
        node.insert_entry_at(0, &key("m"), 1000);
        node.set_child(1, 2000);

        node.insert_key_at(0, &key("f"));

        assert_eq!(node.count(), 2);
        assert_eq!(node.key(0), &key("f"));
        assert_eq!(node.key(1), &key("m"));
        assert_eq!(node.child(0), 1000);
        assert_eq!(node.child(1), 1000);
        assert_eq!(node.child(2), 2000);
    }

    #[test]
    fn index_remove_entry_drops_key_and_child() {
        let mut node = empty_index();
        node.set_child(0, 1);
        node.insert_entry_at(0, &key("b"), 1);
        node.set_child(1, 2);
        node.insert_entry_at(1, &key("d"), 2);
        node.set_child(2, 3);

        node.remove_entry_at(0);

        assert_eq!(node.count(), 1);
        assert_eq!(node.key(0), &key("d"));
        assert_eq!(node.child(0), 2);
        assert_eq!(node.child(1), 3);
    }

    #[test]
    fn index_split_parks_promoted_key_in_donor() {
        let mut donor = empty_index();
        for i in 0..ORDER {
            let k = key(&format!("k{i:04}"));
            donor.insert_entry_at(i, &k, i as u64 * 10);
        }
        donor.set_child(ORDER, ORDER as u64 * 10);

        let mut right = empty_index();
        let mid = (ORDER - 1) / 2;
        right.take_tail(&mut donor, mid);

        assert_eq!(donor.count(), mid);
        assert_eq!(right.count(), ORDER - mid - 1);
        // Promoted key sits in the donor's dead slot.
        assert_eq!(donor.key(mid), &key(&format!("k{mid:04}")));
        assert_eq!(right.child(0), (mid as u64 + 1) * 10);
    }
}
