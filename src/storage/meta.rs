//! # Meta Page
//!
//! Page 0 is the single durable pointer to the entire tree state. Its
//! authoritative 64-byte prefix carries the file signature, the root page
//! id, the flushed page count, and the four free-list cursors; the
//! remaining bytes of the page are reserved and written as zero.
//!
//! ## Layout
//!
//! ```text
//! Offset  Size  Field              Description
//! ------  ----  -----------------  -----------------------------------
//! 0       16    signature          "BuildYourOwnDB" + two zero bytes
//! 16      8     root               Page id of the tree root (>= 1)
//! 24      8     flushed            Pages durably present in the file
//! 32      8     freelist_head      Free-list head node page id
//! 40      8     freelist_head_seq  Slot index into the head node
//! 48      8     freelist_tail      Free-list tail node page id
//! 56      8     freelist_tail_seq  Slot index into the tail node
//! ```
//!
//! All integers are little-endian.
//!
//! ## Torn-write assumption
//!
//! The meta page is written exactly once per commit as a single
//! sector-aligned full-page write. Crash safety rests on the disk writing
//! the first sector (which holds the entire 64-byte prefix) atomically. A
//! deployment that cannot assume sector atomicity should alternate two
//! meta pages with a sequence number instead; this implementation uses the
//! single-page scheme.

use eyre::{ensure, Result};
use zerocopy::little_endian::U64;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{FREELIST_CAP, META_PREFIX_SIZE, PAGE_SIZE};
use crate::error::StoreError;

/// 14 signature bytes padded with two zeros to fill the 16-byte slot.
pub const DB_SIGNATURE: &[u8; 16] = b"BuildYourOwnDB\x00\x00";

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct MetaPage {
    signature: [u8; 16],
    root: U64,
    flushed: U64,
    freelist_head: U64,
    freelist_head_seq: U64,
    freelist_tail: U64,
    freelist_tail_seq: U64,
}

const _: () = assert!(std::mem::size_of::<MetaPage>() == META_PREFIX_SIZE);

impl MetaPage {
    /// Meta state of a freshly initialized file: root leaf at page 1, two
    /// pages flushed (meta + root), free list not yet materialized.
    pub fn fresh() -> Self {
        Self {
            signature: *DB_SIGNATURE,
            root: U64::new(1),
            flushed: U64::new(2),
            freelist_head: U64::new(0),
            freelist_head_seq: U64::new(0),
            freelist_tail: U64::new(0),
            freelist_tail_seq: U64::new(0),
        }
    }

    /// Parses the prefix out of page 0, checking the signature. Range
    /// checks against the file size are done separately in [`validate`].
    ///
    /// [`validate`]: MetaPage::validate
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure!(
            bytes.len() >= META_PREFIX_SIZE,
            StoreError::CorruptOnOpen(format!(
                "meta page truncated: {} < {} bytes",
                bytes.len(),
                META_PREFIX_SIZE
            ))
        );

        let meta = Self::read_from_bytes(&bytes[..META_PREFIX_SIZE])
            .map_err(|e| StoreError::CorruptOnOpen(format!("unreadable meta prefix: {:?}", e)))?;

        ensure!(
            &meta.signature == DB_SIGNATURE,
            StoreError::CorruptOnOpen("bad signature".into())
        );

        Ok(meta)
    }

    /// Checks the ordering invariants against the file size in pages:
    /// `0 < root < flushed <= npages`, and free-list cursors either all
    /// zero (not yet materialized) or pointing below `flushed` with slot
    /// indices inside a node.
    pub fn validate(&self, npages: u64) -> Result<()> {
        let flushed = self.flushed();
        let root = self.root();

        ensure!(
            flushed > 0 && flushed <= npages,
            StoreError::CorruptOnOpen(format!(
                "bad flushed count {} for file of {} pages",
                flushed, npages
            ))
        );
        ensure!(
            root > 0 && root < flushed,
            StoreError::CorruptOnOpen(format!(
                "bad root pointer {} (flushed {})",
                root, flushed
            ))
        );

        let head = self.freelist_head();
        let tail = self.freelist_tail();
        ensure!(
            (head == 0) == (tail == 0),
            StoreError::CorruptOnOpen("free-list cursors half-initialized".into())
        );
        if head != 0 {
            ensure!(
                head < flushed && tail < flushed,
                StoreError::CorruptOnOpen(format!(
                    "free-list pages {}/{} beyond flushed {}",
                    head, tail, flushed
                ))
            );
            ensure!(
                self.freelist_head_seq() < FREELIST_CAP as u64
                    && self.freelist_tail_seq() < FREELIST_CAP as u64,
                StoreError::CorruptOnOpen("free-list sequence out of range".into())
            );
        }

        Ok(())
    }

    /// Serializes the prefix into a full zero-padded page.
    pub fn to_page(&self) -> Vec<u8> {
        let mut page = vec![0u8; PAGE_SIZE];
        page[..META_PREFIX_SIZE].copy_from_slice(self.as_bytes());
        page
    }

    pub fn root(&self) -> u64 {
        self.root.get()
    }

    pub fn set_root(&mut self, id: u64) {
        self.root = U64::new(id);
    }

    pub fn flushed(&self) -> u64 {
        self.flushed.get()
    }

    pub fn set_flushed(&mut self, count: u64) {
        self.flushed = U64::new(count);
    }

    pub fn freelist_head(&self) -> u64 {
        self.freelist_head.get()
    }

    pub fn set_freelist_head(&mut self, id: u64) {
        self.freelist_head = U64::new(id);
    }

    pub fn freelist_head_seq(&self) -> u64 {
        self.freelist_head_seq.get()
    }

    pub fn set_freelist_head_seq(&mut self, seq: u64) {
        self.freelist_head_seq = U64::new(seq);
    }

    pub fn freelist_tail(&self) -> u64 {
        self.freelist_tail.get()
    }

    pub fn set_freelist_tail(&mut self, id: u64) {
        self.freelist_tail = U64::new(id);
    }

    pub fn freelist_tail_seq(&self) -> u64 {
        self.freelist_tail_seq.get()
    }

    pub fn set_freelist_tail_seq(&mut self, seq: u64) {
        self.freelist_tail_seq = U64::new(seq);
    }
}
