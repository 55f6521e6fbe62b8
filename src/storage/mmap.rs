//! # Mapping Windows
//!
//! Read-only memory-mapped views over the database file. The file is
//! covered by a sequence of windows, each aligned to the page size; a new
//! window is appended when the flushed region outgrows the mapped total,
//! doubling in length (never less than 1 MiB). Existing windows are never
//! remapped or dropped while the store is open, so a `&[u8]` page slice
//! handed out by [`MapWindows::page`] stays valid for the lifetime of the
//! store.
//!
//! ## Why windows instead of one remapped region
//!
//! A single `mmap` that is unmapped and remapped on growth invalidates
//! every outstanding page reference. Appending windows sidesteps that: old
//! pages keep their addresses, and growth is a single new `mmap` call. The
//! cost is a short walk over the window list on lookup, which stays small
//! because window sizes double.
//!
//! ## Mapping past end-of-file
//!
//! Windows are sized in 1 MiB-doubling chunks and may extend past the
//! current end of the file. This relies on POSIX mmap semantics: mapping
//! beyond EOF succeeds, and only pages below the flushed count are ever
//! read through a window, all of which have been written and fsynced
//! first.

use std::fs::File;

use eyre::{ensure, Result, WrapErr};
use memmap2::{Mmap, MmapOptions};

use crate::config::{INITIAL_MAP_LEN, PAGE_SIZE};
use crate::error::StoreError;

#[derive(Debug, Default)]
pub struct MapWindows {
    windows: Vec<Mmap>,
    total: usize,
}

impl MapWindows {
    pub fn new() -> Self {
        Self {
            windows: Vec::new(),
            total: 0,
        }
    }

    /// Total mapped bytes across all windows.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Grows the mapped region until it covers at least `needed` bytes.
    /// Each new window is at least as large as everything mapped so far
    /// and never smaller than [`INITIAL_MAP_LEN`].
    pub fn extend(&mut self, file: &File, needed: usize) -> Result<()> {
        while self.total < needed {
            let len = self.total.max(INITIAL_MAP_LEN);

            // SAFETY: mapping a read-only view of the file is unsafe because
            // the underlying file could be modified externally. This is safe
            // because:
            // 1. The store opens the file for exclusive use; commits write
            //    only to offsets not referenced by the durable meta page.
            // 2. The window is mapped read-only; nothing writes through it.
            // 3. The Mmap is owned by MapWindows and outlives every page
            //    slice handed out (windows are never dropped while open).
            let window = unsafe {
                MmapOptions::new()
                    .offset(self.total as u64)
                    .len(len)
                    .map(file)
                    .wrap_err_with(|| {
                        format!("failed to map {} bytes at offset {}", len, self.total)
                    })?
            };

            self.total += len;
            self.windows.push(window);
        }
        Ok(())
    }

    /// Resolves a page id to its bytes. The caller must only pass ids
    /// inside the mapped region; the store guarantees this by resolving
    /// only ids below the flushed count through windows.
    pub fn page(&self, id: u64) -> Result<&[u8]> {
        let offset = id as usize * PAGE_SIZE;
        ensure!(
            offset + PAGE_SIZE <= self.total,
            StoreError::Fatal(format!(
                "page {} beyond mapped region of {} bytes",
                id, self.total
            ))
        );

        let mut start = 0usize;
        for window in &self.windows {
            let end = start + window.len();
            if offset < end {
                let local = offset - start;
                return Ok(&window[local..local + PAGE_SIZE]);
            }
            start = end;
        }

        Err(StoreError::Fatal(format!("page {} not covered by any window", id)).into())
    }
}
