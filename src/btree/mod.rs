//! # B+Tree
//!
//! The ordered index at the heart of byodb: a copy-on-write B+tree whose
//! nodes live in 4096-byte pages addressed through the storage layer.
//!
//! - [`node`]: the in-memory codec for the node page layout — no I/O, no
//!   store coupling.
//! - [`tree`]: `get`/`insert`/`delete`/`scan` over a [`crate::storage::PageStore`],
//!   rebuilding root-to-leaf paths copy-on-write and journaling displaced
//!   pages for reclamation after the root swap.
//!
//! Keys are opaque byte strings ordered by unsigned byte-lexicographic
//! comparison; callers that need semantic ordering (integers, composite
//! keys) encode it into the bytes — see the `records` module.

pub mod node;
pub mod tree;

pub use node::{Node, NodeBuf, NodeKind, SearchResult};
pub use tree::{lookup, scan_range, BTree};
