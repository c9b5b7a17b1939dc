//! # Burrow — Embedded Persistent Ordered Key-Value Store
//!
//! Burrow is a single-process, embeddable key-value store: a disk-resident
//! B+Tree over fixed-width byte-string keys, kept in one file that survives
//! process restarts. It offers point insertion, lookup, deletion and
//! ordered range scans.
//!
//! ## Quick Start
//!
//! ```no_run
//! use burrow::BPlusTree;
//!
//! # fn main() -> eyre::Result<()> {
//! let mut store = BPlusTree::open("./data.bpt")?;
//!
//! store.put(b"alpha", b"1")?;
//! store.put(b"bravo", b"2")?;
//!
//! assert_eq!(store.get(b"alpha")?, Some(b"1".to_vec()));
//! for (key, value) in store.range(b"a", b"z")? {
//!     println!("{:?} = {:?}", key, value);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Public API (BPlusTree)       │
//! ├─────────────────────────────────────┤
//! │  Tree engine: descent, split,       │
//! │  borrow/merge, root collapse        │
//! ├─────────────────────────────────────┤
//! │  Node layout: zerocopy views over   │
//! │  fixed-size blocks                  │
//! ├─────────────────────────────────────┤
//! │  Block cache: pinned mmap frames,   │
//! │  LRU eviction by resident bytes     │
//! ├─────────────────────────────────────┤
//! │  File substrate: grow + map_range   │
//! └─────────────────────────────────────┘
//! ```
//!
//! Nodes reference each other by file offset; every access pins the block
//! in the cache for exactly the duration of the operation that needs it.
//! Blocks are written in place through shared mappings — a node's memory
//! image is its disk image.
//!
//! ## Semantics and limits
//!
//! - Keys are at most [`config::MAX_KEY_LEN`] bytes, values at most
//!   [`config::MAX_VALUE_LEN`]; longer inputs are truncated. Both are
//!   NUL-padded on disk and compared as whole fixed-width byte strings.
//! - One writer, no transactions, no crash-consistency guarantees: a crash
//!   mid-mutation can corrupt the file. [`BPlusTree::sync`] flushes at a
//!   known point; nothing flushes implicitly.
//! - The file format is fixed by the compile-time geometry in [`config`]
//!   and checked on open; it is little-endian and portable across
//!   architectures.

pub mod config;
pub mod storage;
pub mod tree;

pub use tree::{pad_key, pad_value, strip_padding, BPlusTree};
