//! # Error Kinds
//!
//! Fallible operations throughout byodb return `eyre::Result` with
//! contextual messages. The storage layer additionally tags its failures
//! with a [`StoreError`] so callers can distinguish the broad classes
//! without parsing strings: downcast the `eyre` report with
//! `err.downcast_ref::<StoreError>()`.
//!
//! A lookup that finds nothing is not an error anywhere in this crate; it
//! is an `Option::None` or a `false` return.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// An operating-system I/O failure: open, read, write, fsync, or mmap.
    /// When raised during commit the store is also poisoned.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The file on disk is not a byodb file or its meta page is
    /// inconsistent: bad signature, size not a multiple of the page size,
    /// or root/flushed outside their required ranges.
    #[error("corrupt database file: {0}")]
    CorruptOnOpen(String),

    /// A key or value longer than the storage limits allow.
    #[error("{what} of {got} bytes exceeds limit of {limit}")]
    InputTooLarge {
        what: &'static str,
        got: usize,
        limit: usize,
    },

    /// An internal structural invariant was violated. These indicate bugs,
    /// not user errors: a page id outside the live range, a node that
    /// cannot fit in a page after a bounded split, an unknown node kind.
    #[error("internal invariant violated: {0}")]
    Fatal(String),
}
