//! # Configuration Constants
//!
//! This module centralizes the on-disk layout constants for byodb. Values
//! that depend on each other are co-located and tied together with
//! compile-time assertions so a change to one cannot silently invalidate
//! another.
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> NODE_HEADER_SIZE (4 bytes: kind u16 + nkeys u16)
//!       │     A node with a single maximum-sized entry must fit in one
//!       │     page, which bounds MAX_KEY_SIZE + MAX_VAL_SIZE.
//!       │
//!       ├─> FREELIST_CAP (511 entries: (4096 - 8) / 8)
//!       │     Each free-list page holds a next pointer plus CAP page ids.
//!       │
//!       └─> META_PREFIX_SIZE (64 bytes of page 0 that are authoritative)
//!
//! INITIAL_MAP_LEN (1 MiB)
//!       Mapping windows double from this floor; existing windows are
//!       never remapped, so the floor bounds how many windows a store
//!       accumulates over its lifetime.
//! ```

/// Size of every page in the file; page ids are offsets in units of this.
pub const PAGE_SIZE: usize = 4096;

/// Node header: kind (u16 LE) followed by nkeys (u16 LE).
pub const NODE_HEADER_SIZE: usize = 4;

/// Maximum key length accepted by the tree.
pub const MAX_KEY_SIZE: usize = 1000;

/// Maximum value length accepted by the tree.
pub const MAX_VAL_SIZE: usize = 3000;

/// A node holding one maximum-sized entry must still fit in a single page:
/// header + one pointer + one offset + KV sizes + key + value.
const _: () = assert!(
    NODE_HEADER_SIZE + 8 + 2 + 4 + MAX_KEY_SIZE + MAX_VAL_SIZE <= PAGE_SIZE,
    "a single maximum-sized entry must fit in one page"
);

/// Free-list node header: the `next` page pointer.
pub const FREELIST_HEADER_SIZE: usize = 8;

/// Page-id slots per free-list node.
pub const FREELIST_CAP: usize = (PAGE_SIZE - FREELIST_HEADER_SIZE) / 8;

const _: () = assert!(FREELIST_CAP == 511);

/// Bytes of page 0 that carry the signature, root, flushed count, and
/// free-list cursors. The rest of page 0 is reserved and must be zero.
pub const META_PREFIX_SIZE: usize = 64;

/// Smallest mapping window; windows double in size from here.
pub const INITIAL_MAP_LEN: usize = 1 << 20;

const _: () = assert!(INITIAL_MAP_LEN % PAGE_SIZE == 0);
