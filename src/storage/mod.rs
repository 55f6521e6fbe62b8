//! # Storage Layer
//!
//! The storage layer owns the database file and hands out pages to the
//! tree above it. It is built around three pieces:
//!
//! - [`mmap::MapWindows`]: read-only memory-mapped windows over the file,
//!   extended by doubling and never remapped, so page slices stay valid
//!   for the store's lifetime.
//! - [`meta::MetaPage`]: the 64-byte authoritative prefix of page 0 — the
//!   single durable pointer to the tree root, the flushed page count, and
//!   the free-list cursors.
//! - [`store::DiskStore`]: staging, allocation, free-list reclamation
//!   (`freelist`), and the two-phase durable commit.
//!
//! ## File format
//!
//! The file is a flat array of 4096-byte pages; a page id is its zero-based
//! index. Page 0 is the meta page. Leaf, internal, and free-list pages are
//! distinguished by who references them (meta cursors or a parent node),
//! not by a format tag. All multi-byte integers are little-endian.
//!
//! ## Concurrency model
//!
//! Single-threaded, single-writer, fully synchronous. `commit` blocks on
//! fsync; `page` may minor-fault on mapped memory. Callers needing shared
//! access wrap the store in a lock (the `database` layer does exactly
//! that).

mod freelist;
mod meta;
mod mmap;
mod store;

pub use meta::{MetaPage, DB_SIGNATURE};
pub use mmap::MapWindows;
pub use store::DiskStore;

use eyre::Result;

/// Page-granular storage as seen by the B+tree: read a page, stage a new
/// one, queue one for reclamation. Durability is the owner's business
/// (`DiskStore::commit`); an in-memory implementation backs the tree
/// tests.
pub trait PageStore {
    /// Returns exactly one page of bytes. Passing an id outside
    /// `[0, flushed + staged)` is a fatal programmer error, not a caller
    /// error.
    fn page(&self, id: u64) -> Result<&[u8]>;

    /// Stages a page and returns its id, which is stable until the next
    /// commit. `page` must be exactly one page long.
    fn allocate(&mut self, page: Vec<u8>) -> Result<u64>;

    /// Queues a page id for reclamation. The id is released to the free
    /// list by the commit that retires it, never before.
    fn free(&mut self, id: u64) -> Result<()>;
}
