//! # B+Tree
//!
//! The tree engine and its on-disk node layout:
//!
//! - [`node`]: zerocopy record definitions (`Meta`, node headers, leaf and
//!   index payloads) plus the typed shift/merge primitives they support
//! - [`tree`]: the engine — descent, split, borrow, merge, root collapse —
//!   behind the public [`BPlusTree`] handle
//! - `check`: the invariant walker backing [`BPlusTree::check_invariants`]

mod check;
pub mod node;
mod tree;

pub use node::{pad_key, pad_value, strip_padding, BLOCK_SIZE, META_SIZE};
pub use tree::BPlusTree;
