//! # Burrow Configuration Constants
//!
//! This module centralizes the compile-time parameters of the store. The
//! on-disk format is a function of these values: a file written with one
//! set of constants cannot be read with another, which is why the geometry
//! is stamped into the file header and re-checked on open.
//!
//! ## Dependency Graph
//!
//! ```text
//! ORDER (128)
//!   │
//!   ├─> MAX_KEYS  = ORDER - 1
//!   │     A node splits when an insertion would leave it with more than
//!   │     MAX_KEYS keys.
//!   │
//!   ├─> MIN_KEYS  = (ORDER + 1) / 2 - 1
//!   │     A non-root node rebalances (borrow, then merge) when a deletion
//!   │     leaves it with fewer than MIN_KEYS keys. Merging an underfull
//!   │     node (MIN_KEYS - 1) with a minimal sibling (MIN_KEYS) plus one
//!   │     pulled-down separator must fit back under MAX_KEYS; the
//!   │     assertion below pins that relationship.
//!   │
//!   └─> node layout sizes in tree::node (records per leaf, entries per
//!       index node), and therefore BLOCK_SIZE
//!
//! MAX_KEY_LEN / MAX_VALUE_LEN (32 / 256 bytes)
//!   │
//!   └─> Record and IndexEntry widths; keys and values are NUL-padded to
//!       these widths and compared as whole fixed-width byte strings
//!
//! CACHE_CEILING_BYTES (50 MiB)
//!   │
//!   └─> Block cache eviction threshold. Must hold at least the pinned
//!       working set of one tree operation (a handful of blocks); the
//!       assertion lives in tree::node where BLOCK_SIZE is known.
//! ```

/// Maximum number of children of an index node; one more than the maximum
/// number of keys per node.
pub const ORDER: usize = 128;

/// Fixed key width in bytes. Longer keys are truncated on the way in.
pub const MAX_KEY_LEN: usize = 32;

/// Fixed value width in bytes. Longer values are truncated on the way in.
pub const MAX_VALUE_LEN: usize = 256;

/// Upper bound on keys per node before a split is forced.
pub const MAX_KEYS: usize = ORDER - 1;

/// Lower bound on keys per non-root node after a deletion.
pub const MIN_KEYS: usize = (ORDER + 1) / 2 - 1;

/// Block cache eviction ceiling: resident mapped bytes (pinned plus idle)
/// are kept at or below this once eviction has a chance to run.
pub const CACHE_CEILING_BYTES: usize = 50 * 1024 * 1024;

const _: () = assert!(ORDER >= 3, "a B+Tree needs at least order 3");

const _: () = assert!(MIN_KEYS >= 1, "non-root nodes must keep at least one key");

const _: () = assert!(
    2 * MIN_KEYS <= MAX_KEYS,
    "an underfull node merged with a minimal sibling and one pulled-down separator must fit in one node"
);
