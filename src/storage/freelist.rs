//! # Free List
//!
//! Reclaimed page ids live in an on-disk FIFO ring embedded in the same
//! file: a singly linked chain of list-node pages, each holding a `next`
//! pointer and 511 page-id slots, addressed by head/tail cursors stored in
//! the meta page.
//!
//! ## Node layout
//!
//! ```text
//! | next : u64 LE | slots[511] : u64 LE |
//! ```
//!
//! ## Cursor discipline
//!
//! `push_tail` writes `tail_page[tail_seq]` and advances `tail_seq` modulo
//! the capacity; on wrap it appends a fresh node (always through the
//! staging path, never via `pop_head`), links the retiring node's `next`
//! to it, and moves the tail cursor. `pop_head` mirrors this on the head
//! side and retires a drained head node by pushing its own id onto the
//! tail, so exhausted list nodes are themselves recycled.
//!
//! ## Crash safety
//!
//! List-node pages are the one structure rewritten in place (via the
//! store's recycle buffer, flushed during commit phase 1). The bytes that
//! change are slots at or past the durable tail cursor and the `next` link
//! of a node being retired — none of which the pre-commit cursors can
//! reach — so a crash before the meta write leaves the old ring intact.
//!
//! The head and tail node pages are materialized lazily: a fresh store
//! carries all-zero cursors and allocates the first node on the first
//! `push_tail`.

use eyre::{ensure, Result};

use crate::config::{FREELIST_CAP, FREELIST_HEADER_SIZE, PAGE_SIZE};
use crate::error::StoreError;

use super::store::DiskStore;
use super::PageStore;

fn node_next(page: &[u8]) -> u64 {
    u64::from_le_bytes(page[..8].try_into().expect("page holds a u64"))
}

fn node_set_next(page: &mut [u8], id: u64) {
    page[..8].copy_from_slice(&id.to_le_bytes());
}

fn node_entry(page: &[u8], slot: usize) -> u64 {
    let at = FREELIST_HEADER_SIZE + slot * 8;
    u64::from_le_bytes(page[at..at + 8].try_into().expect("slot in bounds"))
}

fn node_set_entry(page: &mut [u8], slot: usize, id: u64) {
    let at = FREELIST_HEADER_SIZE + slot * 8;
    page[at..at + 8].copy_from_slice(&id.to_le_bytes());
}

impl DiskStore {
    /// Appends a freed page id at the tail of the ring.
    pub(crate) fn push_tail(&mut self, id: u64) -> Result<()> {
        if self.meta.freelist_tail() == 0 {
            let node = self.allocate_end(vec![0u8; PAGE_SIZE]);
            self.meta.set_freelist_head(node);
            self.meta.set_freelist_head_seq(0);
            self.meta.set_freelist_tail(node);
            self.meta.set_freelist_tail_seq(0);
        }

        let tail = self.meta.freelist_tail();
        let seq = self.meta.freelist_tail_seq() as usize;

        {
            let page = self.page_mut_copy(tail)?;
            node_set_entry(page, seq, id);
        }

        let next_seq = (seq + 1) % FREELIST_CAP;
        self.meta.set_freelist_tail_seq(next_seq as u64);

        if next_seq == 0 {
            let node = self.allocate_end(vec![0u8; PAGE_SIZE]);
            let page = self.page_mut_copy(tail)?;
            node_set_next(page, node);
            self.meta.set_freelist_tail(node);
        }

        Ok(())
    }

    /// Takes the oldest reclaimable page id off the head of the ring, or
    /// `None` when the ring is empty.
    pub(crate) fn pop_head(&mut self) -> Result<Option<u64>> {
        let head = self.meta.freelist_head();
        if head == 0 {
            return Ok(None);
        }
        if head == self.meta.freelist_tail()
            && self.meta.freelist_head_seq() == self.meta.freelist_tail_seq()
        {
            return Ok(None);
        }

        let seq = self.meta.freelist_head_seq() as usize;
        let (id, next) = {
            let page = self.page(head)?;
            (node_entry(page, seq), node_next(page))
        };

        ensure!(
            id > 0 && id < self.meta.flushed(),
            StoreError::Fatal(format!(
                "free list yielded page {} outside committed range [1, {})",
                id,
                self.meta.flushed()
            ))
        );

        let next_seq = (seq + 1) % FREELIST_CAP;
        self.meta.set_freelist_head_seq(next_seq as u64);

        if next_seq == 0 {
            ensure!(
                next != 0,
                StoreError::Fatal(format!("free-list node {} drained without a next link", head))
            );
            self.meta.set_freelist_head(next);
            // The drained node page is itself reusable now.
            self.push_tail(head)?;
        }

        Ok(Some(id))
    }

    /// Number of reclaimable page ids currently in the ring. Ids freed in
    /// the current cycle are counted only after the commit that releases
    /// them.
    pub fn free_count(&self) -> Result<u64> {
        let head = self.meta.freelist_head();
        if head == 0 {
            return Ok(0);
        }

        let tail = self.meta.freelist_tail();
        let mut count = 0u64;
        let mut node = head;
        let mut seq = self.meta.freelist_head_seq();

        while node != tail {
            count += FREELIST_CAP as u64 - seq;
            node = node_next(self.page(node)?);
            ensure!(
                node != 0,
                StoreError::Fatal("free-list chain broken before tail".into())
            );
            seq = 0;
        }

        Ok(count + self.meta.freelist_tail_seq() - seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::node::{NodeBuf, NodeKind};
    use tempfile::tempdir;

    fn open_store() -> (tempfile::TempDir, DiskStore) {
        let dir = tempdir().unwrap();
        let store = DiskStore::open(dir.path().join("db")).unwrap();
        (dir, store)
    }

    fn leaf_page() -> Vec<u8> {
        NodeBuf::new(NodeKind::Leaf, 0).finish().unwrap()
    }

    /// Grows the file so the ids used by the ring tests refer to committed
    /// pages, keeping the pop-side range check satisfied.
    fn grow_file(store: &mut DiskStore, pages: u64) {
        for _ in 0..pages {
            store.allocate_end(leaf_page());
        }
        let root = store.root();
        store.commit(root).unwrap();
    }

    #[test]
    fn empty_ring_pops_nothing() {
        let (_dir, mut store) = open_store();

        assert_eq!(store.pop_head().unwrap(), None);
        assert_eq!(store.free_count().unwrap(), 0);
    }

    #[test]
    fn push_then_pop_is_fifo() {
        let (_dir, mut store) = open_store();
        grow_file(&mut store, 8);

        for id in 2..7u64 {
            store.push_tail(id).unwrap();
        }

        assert_eq!(store.free_count().unwrap(), 5);
        for id in 2..7u64 {
            assert_eq!(store.pop_head().unwrap(), Some(id));
        }
        assert_eq!(store.pop_head().unwrap(), None);
    }

    #[test]
    fn first_push_materializes_the_ring() {
        let (_dir, mut store) = open_store();
        grow_file(&mut store, 2);

        assert_eq!(store.meta.freelist_head(), 0);
        store.push_tail(2).unwrap();

        assert_ne!(store.meta.freelist_head(), 0);
        assert_eq!(store.meta.freelist_head(), store.meta.freelist_tail());
        assert_eq!(store.meta.freelist_tail_seq(), 1);
    }

    #[test]
    fn tail_wrap_links_a_new_node() {
        let (_dir, mut store) = open_store();
        grow_file(&mut store, FREELIST_CAP as u64 + 8);

        for id in 0..FREELIST_CAP as u64 + 3 {
            store.push_tail(2 + id).unwrap();
        }

        assert_ne!(store.meta.freelist_head(), store.meta.freelist_tail());
        assert_eq!(store.meta.freelist_tail_seq(), 3);
        assert_eq!(store.free_count().unwrap(), FREELIST_CAP as u64 + 3);
    }

    #[test]
    fn pop_across_node_boundary_recycles_the_drained_node() {
        let (_dir, mut store) = open_store();
        grow_file(&mut store, FREELIST_CAP as u64 + 8);
        let total = FREELIST_CAP as u64 + 2;

        for id in 0..total {
            store.push_tail(2 + id).unwrap();
        }
        let first_node = store.meta.freelist_head();
        let root = store.root();
        store.commit(root).unwrap();

        for id in 0..total {
            assert_eq!(store.pop_head().unwrap(), Some(2 + id), "id {}", id);
        }

        // Crossing the boundary moved the head and re-queued the drained
        // node page.
        assert_ne!(store.meta.freelist_head(), first_node);
        assert_eq!(store.pop_head().unwrap(), Some(first_node));
        assert_eq!(store.pop_head().unwrap(), None);
    }

    #[test]
    fn ring_state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");

        {
            let mut store = DiskStore::open(&path).unwrap();
            grow_file(&mut store, 6);
            store.free(2).unwrap();
            store.free(3).unwrap();
            let root = store.root();
            store.commit(root).unwrap();
            store.close().unwrap();
        }

        let mut store = DiskStore::open(&path).unwrap();
        assert_eq!(store.free_count().unwrap(), 2);
        assert_eq!(store.pop_head().unwrap(), Some(2));
        assert_eq!(store.pop_head().unwrap(), Some(3));
    }
}
