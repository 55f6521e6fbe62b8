//! # Disk Store
//!
//! `DiskStore` owns the database file and everything layered directly on
//! it: the read-only mapping windows, the in-memory meta page, the
//! append-only staging buffer for pages created since the last commit, and
//! the recycle buffer for committed pages being rewritten (free-list nodes
//! and pages reused from the free list).
//!
//! ## Page resolution
//!
//! ```text
//! page(id):
//!   id >= flushed          -> staging buffer at index id - flushed
//!   id in recycle buffer   -> staged rewrite of a committed page
//!   otherwise              -> mapping windows (zero-copy)
//! ```
//!
//! Ids at or past `flushed + staging.len()` are a fatal programmer error.
//!
//! ## Commit protocol
//!
//! A commit makes the staged state durable in two phases:
//!
//! 1. Release queued frees into the on-disk free-list ring, then write
//!    every staged and recycled page at its target offset and fsync. None
//!    of these pages are referenced by the durable meta page yet, so write
//!    order is irrelevant and a crash here is harmless.
//! 2. Extend the mapping windows over the grown file, advance `flushed`,
//!    clear the buffers, then write the meta page at offset 0 and fsync
//!    again. The meta write publishes the new root atomically.
//!
//! Any I/O error mid-commit poisons the store: later commits and
//! allocations fail fast, reads keep working, and the caller is expected
//! to reopen the file, which restores the last durable state.
//!
//! ## Allocation
//!
//! `allocate` consults the free list first and reuses one freed page per
//! allocation; reused pages are staged in the recycle buffer and written
//! at their existing offset during commit. Only when the ring is empty
//! does the store fall back to appending at the end of the file.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use log::{debug, trace};

use crate::btree::node::{NodeBuf, NodeKind};
use crate::config::PAGE_SIZE;
use crate::error::StoreError;

use super::meta::MetaPage;
use super::mmap::MapWindows;
use super::PageStore;

/// File handle with positional page writes and an operation counter used
/// by the crash-safety tests to inject a failure at an exact write or
/// fsync boundary.
#[derive(Debug)]
pub(crate) struct StoreFile {
    file: File,
    fail_in: Option<u64>,
}

impl StoreFile {
    fn new(file: File) -> Self {
        Self {
            file,
            fail_in: None,
        }
    }

    fn tick(&mut self) -> io::Result<()> {
        if let Some(remaining) = self.fail_in.as_mut() {
            if *remaining == 0 {
                return Err(io::Error::other("injected fault"));
            }
            *remaining -= 1;
        }
        Ok(())
    }

    fn write_page(&mut self, id: u64, bytes: &[u8]) -> io::Result<()> {
        self.tick()?;
        self.file.write_all_at(bytes, id * PAGE_SIZE as u64)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.tick()?;
        self.file.sync_data()
    }

    fn handle(&self) -> &File {
        &self.file
    }

    #[cfg(test)]
    pub(crate) fn fail_after_ops(&mut self, ops: u64) {
        self.fail_in = Some(ops);
    }
}

#[derive(Debug)]
pub struct DiskStore {
    path: PathBuf,
    pub(crate) file: StoreFile,
    windows: MapWindows,
    pub(crate) meta: MetaPage,
    staged: Vec<Vec<u8>>,
    recycled: BTreeMap<u64, Vec<u8>>,
    pending_free: Vec<u64>,
    poisoned: bool,
}

impl DiskStore {
    /// Opens or creates the database file at `path`. A fresh file is
    /// initialized with a meta page and an empty root leaf (root = 1,
    /// flushed = 2). An existing file must have a page-aligned size, the
    /// correct signature, and a consistent meta page.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(StoreError::Io)
            .wrap_err_with(|| format!("failed to open database file '{}'", path.display()))?;

        let file_size = file
            .metadata()
            .map_err(StoreError::Io)
            .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?
            .len();

        ensure!(
            file_size % PAGE_SIZE as u64 == 0,
            StoreError::CorruptOnOpen(format!(
                "file size {} is not a multiple of the page size",
                file_size
            ))
        );

        let mut file = StoreFile::new(file);

        let meta = if file_size == 0 {
            let meta = MetaPage::fresh();
            let root = NodeBuf::new(NodeKind::Leaf, 0).finish()?;
            file.write_page(0, &meta.to_page()).map_err(StoreError::Io)?;
            file.write_page(1, &root).map_err(StoreError::Io)?;
            file.sync().map_err(StoreError::Io)?;
            debug!("initialized fresh database at '{}'", path.display());
            meta
        } else {
            let mut page0 = vec![0u8; PAGE_SIZE];
            file.handle()
                .read_exact_at(&mut page0, 0)
                .map_err(StoreError::Io)
                .wrap_err_with(|| format!("failed to read meta page of '{}'", path.display()))?;

            let meta = MetaPage::from_bytes(&page0)
                .wrap_err_with(|| format!("invalid meta page in '{}'", path.display()))?;
            meta.validate(file_size / PAGE_SIZE as u64)
                .wrap_err_with(|| format!("invalid meta page in '{}'", path.display()))?;
            meta
        };

        let mut windows = MapWindows::new();
        windows.extend(file.handle(), meta.flushed() as usize * PAGE_SIZE)?;

        debug!(
            "opened '{}': root={} flushed={}",
            path.display(),
            meta.root(),
            meta.flushed()
        );

        Ok(Self {
            path,
            file,
            windows,
            meta,
            staged: Vec::new(),
            recycled: BTreeMap::new(),
            pending_free: Vec::new(),
            poisoned: false,
        })
    }

    /// Page id of the current durable-or-pending tree root.
    pub fn root(&self) -> u64 {
        self.meta.root()
    }

    /// Pages durably present in the file as of the last commit.
    pub fn flushed(&self) -> u64 {
        self.meta.flushed()
    }

    /// One past the highest resolvable page id.
    fn live_end(&self) -> u64 {
        self.meta.flushed() + self.staged.len() as u64
    }

    fn guard_usable(&self) -> Result<()> {
        ensure!(
            !self.poisoned,
            StoreError::Io(io::Error::other(
                "store degraded by an earlier commit failure; reopen the file"
            ))
        );
        Ok(())
    }

    /// Appends a page to the staging buffer, bypassing the free list. Used
    /// for free-list node pages themselves and as the fallback allocation
    /// path.
    pub(crate) fn allocate_end(&mut self, page: Vec<u8>) -> u64 {
        let id = self.live_end();
        self.staged.push(page);
        id
    }

    /// Mutable staged copy of a page. Pages below `flushed` are copied out
    /// of the mapping windows into the recycle buffer on first touch and
    /// written back at their offset during commit.
    pub(crate) fn page_mut_copy(&mut self, id: u64) -> Result<&mut Vec<u8>> {
        let flushed = self.meta.flushed();
        if id >= flushed {
            let index = (id - flushed) as usize;
            ensure!(
                index < self.staged.len(),
                StoreError::Fatal(format!("page {} out of bounds for staging", id))
            );
            Ok(&mut self.staged[index])
        } else {
            if !self.recycled.contains_key(&id) {
                let copy = self.windows.page(id)?.to_vec();
                self.recycled.insert(id, copy);
            }
            Ok(self.recycled.get_mut(&id).expect("just inserted"))
        }
    }

    /// Two-phase durable commit publishing `new_root`. See the module
    /// documentation for the protocol and its crash-safety argument.
    pub fn commit(&mut self, new_root: u64) -> Result<()> {
        self.guard_usable()?;
        ensure!(
            new_root > 0 && new_root < self.live_end(),
            StoreError::Fatal(format!(
                "new root {} outside live range [1, {})",
                new_root,
                self.live_end()
            ))
        );

        let result = self.commit_inner(new_root);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn commit_inner(&mut self, new_root: u64) -> Result<()> {
        let pending = std::mem::take(&mut self.pending_free);
        for id in &pending {
            self.push_tail(*id)?;
        }

        let base = self.meta.flushed();
        let appended = self.staged.len() as u64;

        for (index, page) in self.staged.iter().enumerate() {
            self.file
                .write_page(base + index as u64, page)
                .map_err(StoreError::Io)
                .wrap_err("failed to write staged page")?;
        }
        for (id, page) in &self.recycled {
            self.file
                .write_page(*id, page)
                .map_err(StoreError::Io)
                .wrap_err("failed to write recycled page")?;
        }
        self.file
            .sync()
            .map_err(StoreError::Io)
            .wrap_err("failed to sync data pages")?;

        let new_flushed = base + appended;
        self.windows
            .extend(self.file.handle(), new_flushed as usize * PAGE_SIZE)?;
        self.meta.set_flushed(new_flushed);
        self.meta.set_root(new_root);
        self.staged.clear();
        self.recycled.clear();

        self.file
            .write_page(0, &self.meta.to_page())
            .map_err(StoreError::Io)
            .wrap_err("failed to write meta page")?;
        self.file
            .sync()
            .map_err(StoreError::Io)
            .wrap_err("failed to sync meta page")?;

        debug!(
            "committed {} appended + {} freed pages, root={} flushed={}",
            appended,
            pending.len(),
            new_root,
            new_flushed
        );

        Ok(())
    }

    /// Unmaps all windows and closes the file. Uncommitted staged pages
    /// are discarded; durability is established only by `commit`.
    pub fn close(self) -> Result<()> {
        debug!("closing '{}'", self.path.display());
        Ok(())
    }
}

impl PageStore for DiskStore {
    fn page(&self, id: u64) -> Result<&[u8]> {
        let flushed = self.meta.flushed();
        if id >= flushed {
            let index = (id - flushed) as usize;
            ensure!(
                index < self.staged.len(),
                StoreError::Fatal(format!(
                    "page {} out of bounds (flushed={}, staged={})",
                    id,
                    flushed,
                    self.staged.len()
                ))
            );
            return Ok(&self.staged[index]);
        }
        if let Some(page) = self.recycled.get(&id) {
            return Ok(page);
        }
        self.windows.page(id)
    }

    fn allocate(&mut self, page: Vec<u8>) -> Result<u64> {
        self.guard_usable()?;
        ensure!(
            page.len() == PAGE_SIZE,
            StoreError::Fatal(format!("allocated page has {} bytes", page.len()))
        );

        if let Some(id) = self.pop_head()? {
            trace!("reusing freed page {}", id);
            self.recycled.insert(id, page);
            return Ok(id);
        }

        let id = self.allocate_end(page);
        trace!("appended page {}", id);
        Ok(id)
    }

    fn free(&mut self, id: u64) -> Result<()> {
        ensure!(
            id > 0 && id < self.live_end(),
            StoreError::Fatal(format!(
                "freeing page {} outside live range [1, {})",
                id,
                self.live_end()
            ))
        );
        trace!("queueing page {} for reclamation", id);
        self.pending_free.push(id);
        Ok(())
    }
}
