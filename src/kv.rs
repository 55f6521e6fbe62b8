//! # KV Facade
//!
//! [`Kv`] ties the B+tree to the disk store behind a small durable
//! key-value API: every mutation runs one copy-on-write tree operation
//! and commits it, so a successful `insert` or `delete` is on disk when
//! the call returns. Reads go straight through the mapped file.
//!
//! Batching several mutations into one commit is possible by driving
//! [`BTree`] and [`DiskStore`] directly; this facade trades that for the
//! simplest possible crash story — the store is never more than one
//! operation away from its durable state.

use std::path::Path;

use eyre::Result;
use log::trace;

use crate::btree::{lookup, scan_range, BTree};
use crate::storage::DiskStore;

#[derive(Debug)]
pub struct Kv {
    store: DiskStore,
}

impl Kv {
    /// Opens or creates a database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            store: DiskStore::open(path)?,
        })
    }

    /// Looks up a key, copying the value out of the mapped page.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(lookup(&self.store, self.store.root(), key)?.map(|v| v.to_vec()))
    }

    /// Inserts or updates a key and commits.
    pub fn insert(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        let root = self.store.root();
        let mut tree = BTree::new(&mut self.store, root);
        tree.insert(key, val)?;
        let new_root = tree.root();
        self.store.commit(new_root)?;
        trace!("inserted {} byte key, root now {}", key.len(), new_root);
        Ok(())
    }

    /// Deletes a key and commits; absent keys commit nothing.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let root = self.store.root();
        let mut tree = BTree::new(&mut self.store, root);
        if !tree.delete(key)? {
            return Ok(false);
        }
        let new_root = tree.root();
        self.store.commit(new_root)?;
        trace!("deleted key, root now {}", new_root);
        Ok(true)
    }

    /// All pairs with `start <= key < end` in ascending key order.
    pub fn scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        scan_range(&self.store, self.store.root(), start, end, &mut out)?;
        Ok(out)
    }

    /// Pages durably present in the file.
    pub fn flushed(&self) -> u64 {
        self.store.flushed()
    }

    /// Reclaimable page ids currently in the free list.
    pub fn free_count(&self) -> Result<u64> {
        self.store.free_count()
    }

    /// Unmaps and closes the underlying file.
    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}
