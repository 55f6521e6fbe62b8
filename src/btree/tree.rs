//! # Copy-on-Write B+Tree
//!
//! Ordered key-value operations over a [`PageStore`]. Mutation is pure
//! copy-on-write: no node is ever modified after it has been handed to
//! the store. An insert or delete rebuilds every node on the root-to-leaf
//! path, allocates the rebuilt nodes as fresh pages, and finally swaps the
//! root — so a reader holding the old root keeps a consistent tree, and a
//! crash between allocation and the commit that publishes the new root
//! costs nothing but unreferenced pages.
//!
//! ## Separator discipline
//!
//! An internal node stores one key per child, and `keys[i]` equals the
//! smallest key in subtree `i`. Rebuilding a node therefore refreshes the
//! separator of a replaced child with the child's current first key, which
//! keeps the discipline intact when an insert lands left of the tree's
//! minimum or a delete removes a subtree's smallest key.
//!
//! ## Splitting
//!
//! A rebuilt node that exceeds one page is split by key count. Because a
//! single entry can be ~4 KiB, one half may still overflow; that half is
//! split once more, and the bound is asserted — a split yields at most
//! four children and never recurses deeper. The resulting children are
//! allocated and a new internal parent is returned in the overflowing
//! node's place, so a single insertion can deepen the tree locally by one
//! level.
//!
//! ## Freeing discipline
//!
//! Displaced pages are collected in a journal during the operation and
//! released to the store only after the new root id exists. Freeing
//! earlier would let a crash leave the durable meta page pointing into
//! reclaimed pages.
//!
//! ## Deletion
//!
//! Deletes rebuild the path like inserts and drop children that become
//! empty; an internal root that empties out collapses to a fresh leaf.
//! There is no underflow merging or rebalancing: the tree grows in depth
//! but never shrinks, which is an accepted trade for a much simpler
//! delete path.

use eyre::{ensure, Result};

use crate::config::{MAX_KEY_SIZE, MAX_VAL_SIZE, PAGE_SIZE};
use crate::error::StoreError;
use crate::storage::PageStore;

use super::node::{Node, NodeBuf, NodeKind, SearchResult};

#[derive(Debug)]
pub struct BTree<'s, S: PageStore> {
    store: &'s mut S,
    root: u64,
}

/// Point lookup descending from `root`. Returns a zero-copy view into the
/// leaf holding the key.
pub fn lookup<'a, S: PageStore>(store: &'a S, root: u64, key: &[u8]) -> Result<Option<&'a [u8]>> {
    let mut current = root;
    loop {
        let node = Node::new(store.page(current)?)?;
        match node.kind() {
            NodeKind::Leaf => {
                return match node.lookup(key)? {
                    SearchResult::Found(index) => Ok(Some(node.val(index)?)),
                    SearchResult::NotFound(_) => Ok(None),
                }
            }
            NodeKind::Internal => {
                current = node.ptr(node.lookup_le(key)?)?;
            }
        }
    }
}

/// Collects all pairs with `start <= key < end` under `page`, in key
/// order. Subtrees whose separator range cannot intersect are pruned.
pub fn scan_range<S: PageStore>(
    store: &S,
    page: u64,
    start: &[u8],
    end: &[u8],
    out: &mut Vec<(Vec<u8>, Vec<u8>)>,
) -> Result<()> {
    let node = Node::new(store.page(page)?)?;
    match node.kind() {
        NodeKind::Leaf => {
            for index in 0..node.nkeys() {
                let key = node.key(index)?;
                if key >= end {
                    break;
                }
                if key >= start {
                    out.push((key.to_vec(), node.val(index)?.to_vec()));
                }
            }
        }
        NodeKind::Internal => {
            for index in 0..node.nkeys() {
                if node.key(index)? >= end {
                    break;
                }
                if index + 1 < node.nkeys() && node.key(index + 1)? <= start {
                    continue;
                }
                scan_range(store, node.ptr(index)?, start, end, out)?;
            }
        }
    }
    Ok(())
}

impl<'s, S: PageStore> BTree<'s, S> {
    pub fn new(store: &'s mut S, root: u64) -> Self {
        Self { store, root }
    }

    /// Root page id after any mutations performed through this handle.
    /// The caller publishes it with the store's commit.
    pub fn root(&self) -> u64 {
        self.root
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<&[u8]>> {
        lookup(&*self.store, self.root, key)
    }

    /// Pairs with `start <= key < end` in ascending key order.
    pub fn scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        scan_range(&*self.store, self.root, start, end, &mut out)?;
        Ok(out)
    }

    /// Inserts or updates a key. The path is rebuilt copy-on-write; stale
    /// pages are released only after the new root id exists.
    pub fn insert(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        ensure!(
            key.len() <= MAX_KEY_SIZE,
            StoreError::InputTooLarge {
                what: "key",
                got: key.len(),
                limit: MAX_KEY_SIZE,
            }
        );
        ensure!(
            val.len() <= MAX_VAL_SIZE,
            StoreError::InputTooLarge {
                what: "value",
                got: val.len(),
                limit: MAX_VAL_SIZE,
            }
        );

        let mut journal = Vec::new();
        let built = self.insert_at(self.root, key, val, &mut journal)?;

        let old_root = self.root;
        let new_root = self.store.allocate(built.finish()?)?;
        journal.push(old_root);
        self.release(journal)?;
        self.root = new_root;

        Ok(())
    }

    /// Removes a key. Returns `false`, having staged nothing, when the
    /// key is absent.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        let mut journal = Vec::new();
        let Some(built) = self.delete_at(self.root, key, &mut journal)? else {
            return Ok(false);
        };

        // An internal root whose last child vanished collapses to an
        // empty leaf; an empty leaf root stays as the (empty) tree.
        let built = if built.nkeys() == 0 {
            NodeBuf::new(NodeKind::Leaf, 0)
        } else {
            built
        };

        let old_root = self.root;
        let new_root = self.store.allocate(built.finish()?)?;
        journal.push(old_root);
        self.release(journal)?;
        self.root = new_root;

        Ok(true)
    }

    fn release(&mut self, journal: Vec<u64>) -> Result<()> {
        for page in journal {
            self.store.free(page)?;
        }
        Ok(())
    }

    fn insert_at(
        &mut self,
        page: u64,
        key: &[u8],
        val: &[u8],
        journal: &mut Vec<u64>,
    ) -> Result<NodeBuf> {
        // Copied out so the node view survives allocations against the
        // store while descendants are rebuilt.
        let bytes = self.store.page(page)?.to_vec();
        let node = Node::new(&bytes)?;

        let built = match node.kind() {
            NodeKind::Leaf => match node.lookup(key)? {
                SearchResult::Found(index) => leaf_update(node, index, key, val)?,
                SearchResult::NotFound(index) => leaf_insert(node, index, key, val)?,
            },
            NodeKind::Internal => {
                let index = node.lookup_le(key)?;
                let child = node.ptr(index)?;
                let new_child = self.insert_at(child, key, val, journal)?;
                journal.push(child);
                self.replace_child(node, index, new_child)?
            }
        };

        self.split_if_needed(built)
    }

    fn delete_at(
        &mut self,
        page: u64,
        key: &[u8],
        journal: &mut Vec<u64>,
    ) -> Result<Option<NodeBuf>> {
        let bytes = self.store.page(page)?.to_vec();
        let node = Node::new(&bytes)?;

        match node.kind() {
            NodeKind::Leaf => match node.lookup(key)? {
                SearchResult::NotFound(_) => Ok(None),
                SearchResult::Found(index) => {
                    let mut built = NodeBuf::new(NodeKind::Leaf, node.nkeys() - 1);
                    built.append_range(node, 0, 0, index)?;
                    built.append_range(node, index, index + 1, node.nkeys() - index - 1)?;
                    Ok(Some(built))
                }
            },
            NodeKind::Internal => {
                let index = node.lookup_le(key)?;
                let child = node.ptr(index)?;
                let Some(new_child) = self.delete_at(child, key, journal)? else {
                    return Ok(None);
                };
                journal.push(child);

                let built = if new_child.nkeys() == 0 {
                    // The child emptied out; drop its slot. The empty
                    // child was never allocated, so nothing to free.
                    let mut built = NodeBuf::new(NodeKind::Internal, node.nkeys() - 1);
                    built.append_range(node, 0, 0, index)?;
                    built.append_range(node, index, index + 1, node.nkeys() - index - 1)?;
                    built
                } else {
                    self.replace_child(node, index, new_child)?
                };

                Ok(Some(self.split_if_needed(built)?))
            }
        }
    }

    /// Rebuilds an internal node with the child at `index` replaced by a
    /// freshly allocated one, refreshing the separator with the child's
    /// first key.
    fn replace_child(
        &mut self,
        parent: Node<'_>,
        index: usize,
        child: NodeBuf,
    ) -> Result<NodeBuf> {
        let first_key = child.key(0)?.to_vec();
        let child_id = self.store.allocate(child.finish()?)?;

        let mut built = NodeBuf::new(NodeKind::Internal, parent.nkeys());
        built.append_range(parent, 0, 0, index)?;
        built.append_kv(index, child_id, &first_key, &[])?;
        built.append_range(parent, index + 1, index + 1, parent.nkeys() - index - 1)?;
        Ok(built)
    }

    /// Returns `built` unchanged if it fits a page; otherwise splits it
    /// into two to four children, allocates them, and returns a new
    /// internal parent over them. Split recursion is bounded at depth two
    /// by the entry size limits; exceeding the bound is a fatal error, not
    /// deeper recursion.
    fn split_if_needed(&mut self, built: NodeBuf) -> Result<NodeBuf> {
        if built.used_bytes()? <= PAGE_SIZE {
            return Ok(built);
        }

        let (left, right) = built.split()?;
        let mut parts: Vec<NodeBuf> = Vec::with_capacity(4);
        for half in [left, right] {
            if half.used_bytes()? > PAGE_SIZE {
                let (first, second) = half.split()?;
                ensure!(
                    first.used_bytes()? <= PAGE_SIZE && second.used_bytes()? <= PAGE_SIZE,
                    StoreError::Fatal("node still oversized after a depth-2 split".into())
                );
                parts.push(first);
                parts.push(second);
            } else {
                parts.push(half);
            }
        }

        let mut parent = NodeBuf::new(NodeKind::Internal, parts.len());
        for (index, part) in parts.into_iter().enumerate() {
            let first_key = part.key(0)?.to_vec();
            let id = self.store.allocate(part.finish()?)?;
            parent.append_kv(index, id, &first_key, &[])?;
        }
        ensure!(
            parent.used_bytes()? <= PAGE_SIZE,
            StoreError::Fatal("split parent does not fit in one page".into())
        );
        Ok(parent)
    }
}

fn leaf_insert(node: Node<'_>, index: usize, key: &[u8], val: &[u8]) -> Result<NodeBuf> {
    let mut built = NodeBuf::new(NodeKind::Leaf, node.nkeys() + 1);
    built.append_range(node, 0, 0, index)?;
    built.append_kv(index, 0, key, val)?;
    built.append_range(node, index + 1, index, node.nkeys() - index)?;
    Ok(built)
}

fn leaf_update(node: Node<'_>, index: usize, key: &[u8], val: &[u8]) -> Result<NodeBuf> {
    let mut built = NodeBuf::new(NodeKind::Leaf, node.nkeys());
    built.append_range(node, 0, 0, index)?;
    built.append_kv(index, 0, key, val)?;
    built.append_range(node, index + 1, index + 1, node.nkeys() - index - 1)?;
    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory page store mirroring the disk store's contract: freed
    /// pages disappear, so any use-after-free trips an error.
    struct MemStore {
        pages: HashMap<u64, Vec<u8>>,
        next: u64,
    }

    impl MemStore {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                next: 1,
            }
        }

        fn live_pages(&self) -> usize {
            self.pages.len()
        }
    }

    impl PageStore for MemStore {
        fn page(&self, id: u64) -> Result<&[u8]> {
            self.pages
                .get(&id)
                .map(|p| p.as_slice())
                .ok_or_else(|| StoreError::Fatal(format!("page {} not live", id)).into())
        }

        fn allocate(&mut self, page: Vec<u8>) -> Result<u64> {
            ensure!(
                page.len() == PAGE_SIZE,
                StoreError::Fatal(format!("allocated page has {} bytes", page.len()))
            );
            let id = self.next;
            self.next += 1;
            self.pages.insert(id, page);
            Ok(id)
        }

        fn free(&mut self, id: u64) -> Result<()> {
            ensure!(
                self.pages.remove(&id).is_some(),
                StoreError::Fatal(format!("double free of page {}", id))
            );
            Ok(())
        }
    }

    fn empty_tree(store: &mut MemStore) -> u64 {
        store
            .allocate(NodeBuf::new(NodeKind::Leaf, 0).finish().unwrap())
            .unwrap()
    }

    /// Checks the structural invariants below `page`: keys strictly
    /// ascending, every node within a page, every internal separator equal
    /// to the minimum key of its subtree. Returns the subtree's minimum.
    fn check_subtree(store: &MemStore, page: u64) -> Option<Vec<u8>> {
        let node = Node::new(store.page(page).unwrap()).unwrap();
        assert!(node.used_bytes().unwrap() <= PAGE_SIZE);

        let mut previous: Option<Vec<u8>> = None;
        for i in 0..node.nkeys() {
            let key = node.key(i).unwrap().to_vec();
            if let Some(prev) = &previous {
                assert!(*prev < key, "keys out of order in page {}", page);
            }
            previous = Some(key);
        }

        match node.kind() {
            NodeKind::Leaf => (node.nkeys() > 0).then(|| node.key(0).unwrap().to_vec()),
            NodeKind::Internal => {
                assert!(node.nkeys() > 0, "empty internal node {}", page);
                for i in 0..node.nkeys() {
                    let child_min = check_subtree(store, node.ptr(i).unwrap())
                        .expect("internal child must be non-empty");
                    assert_eq!(
                        node.key(i).unwrap(),
                        child_min.as_slice(),
                        "separator {} of page {} is not the subtree minimum",
                        i,
                        page
                    );
                }
                Some(node.key(0).unwrap().to_vec())
            }
        }
    }

    #[test]
    fn insert_and_get_single_key() {
        let mut store = MemStore::new();
        let root = empty_tree(&mut store);
        let mut tree = BTree::new(&mut store, root);

        tree.insert(b"hello", b"world").unwrap();

        assert_eq!(tree.get(b"hello").unwrap(), Some(b"world".as_slice()));
        assert_eq!(tree.get(b"servus").unwrap(), None);
    }

    #[test]
    fn insert_updates_existing_key() {
        let mut store = MemStore::new();
        let root = empty_tree(&mut store);
        let mut tree = BTree::new(&mut store, root);

        tree.insert(b"hello", b"world").unwrap();
        tree.insert(b"hello", b"welt").unwrap();

        assert_eq!(tree.get(b"hello").unwrap(), Some(b"welt".as_slice()));
    }

    #[test]
    fn insert_rejects_oversized_key_and_value() {
        let mut store = MemStore::new();
        let root = empty_tree(&mut store);
        let mut tree = BTree::new(&mut store, root);

        let err = tree.insert(&[0u8; 1001], b"v").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::InputTooLarge { what: "key", .. })
        ));

        let err = tree.insert(b"k", &[0u8; 3001]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::InputTooLarge { what: "value", .. })
        ));
    }

    #[test]
    fn maximum_sized_entries_are_accepted() {
        let mut store = MemStore::new();
        let root = empty_tree(&mut store);
        let mut tree = BTree::new(&mut store, root);

        let key_a = b"ak".repeat(500);
        let val_a = b"av".repeat(1500);
        let key_b = b"bk".repeat(500);
        let val_b = b"bv".repeat(1500);

        tree.insert(&key_a, &val_a).unwrap();
        tree.insert(&key_b, &val_b).unwrap();

        assert_eq!(tree.get(&key_a).unwrap(), Some(val_a.as_slice()));
        assert_eq!(tree.get(&key_b).unwrap(), Some(val_b.as_slice()));
        let root = tree.root();
        check_subtree(&store, root);
    }

    #[test]
    fn three_way_split_in_a_single_insert() {
        let mut store = MemStore::new();
        let root = empty_tree(&mut store);
        let mut tree = BTree::new(&mut store, root);

        // Two entries fit in the root leaf; the third overflows it so hard
        // that one split half overflows again: 2-then-1 becomes three
        // leaves under a fresh internal root in one operation.
        tree.insert(b"a", &[0x61; 700]).unwrap();
        tree.insert(b"b", &[0x62; 2900]).unwrap();
        tree.insert(b"c", &[0x63; 2900]).unwrap();

        assert_eq!(tree.get(b"a").unwrap().map(|v| v.len()), Some(700));
        assert_eq!(tree.get(b"b").unwrap().map(|v| v.len()), Some(2900));
        assert_eq!(tree.get(b"c").unwrap().map(|v| v.len()), Some(2900));

        let root = tree.root();
        let root_node = Node::new(store.page(root).unwrap()).unwrap();
        assert_eq!(root_node.kind(), NodeKind::Internal);
        assert_eq!(root_node.nkeys(), 3);
        assert_eq!(store.live_pages(), 4, "root + three leaves");
        check_subtree(&store, root);
    }

    #[test]
    fn many_inserts_keep_invariants_and_order() {
        let mut store = MemStore::new();
        let root = empty_tree(&mut store);
        let mut tree = BTree::new(&mut store, root);

        // Coprime stride to shuffle insertion order.
        for i in 0..400u32 {
            let n = (i * 181) % 400;
            let key = format!("key{:05}", n);
            let val = vec![0x55; 512];
            tree.insert(key.as_bytes(), &val).unwrap();
        }

        for n in 0..400u32 {
            let key = format!("key{:05}", n);
            assert_eq!(
                tree.get(key.as_bytes()).unwrap().map(|v| v.len()),
                Some(512),
                "missing {}",
                key
            );
        }

        let pairs = tree.scan(b"key00000", b"kez").unwrap();
        assert_eq!(pairs.len(), 400);
        for window in pairs.windows(2) {
            assert!(window[0].0 < window[1].0, "scan out of order");
        }

        let root = tree.root();
        check_subtree(&store, root);
    }

    #[test]
    fn insert_below_current_minimum_refreshes_separators() {
        let mut store = MemStore::new();
        let root = empty_tree(&mut store);
        let mut tree = BTree::new(&mut store, root);

        // Force a multi-level tree, then insert a key smaller than
        // everything in it.
        for i in 0..50u32 {
            let key = format!("m{:04}", i);
            tree.insert(key.as_bytes(), &[0x33; 700]).unwrap();
        }
        tree.insert(b"aaaa", b"first").unwrap();

        assert_eq!(tree.get(b"aaaa").unwrap(), Some(b"first".as_slice()));
        let root = tree.root();
        let root_node = Node::new(store.page(root).unwrap()).unwrap();
        assert_eq!(root_node.key(0).unwrap(), b"aaaa");
        check_subtree(&store, root);
    }

    #[test]
    fn delete_existing_key() {
        let mut store = MemStore::new();
        let root = empty_tree(&mut store);
        let mut tree = BTree::new(&mut store, root);

        tree.insert(b"key1", b"value1").unwrap();
        tree.insert(b"key2", b"value2").unwrap();

        assert!(tree.delete(b"key1").unwrap());
        assert_eq!(tree.get(b"key1").unwrap(), None);
        assert_eq!(tree.get(b"key2").unwrap(), Some(b"value2".as_slice()));
    }

    #[test]
    fn delete_missing_key_stages_nothing() {
        let mut store = MemStore::new();
        let root = empty_tree(&mut store);
        let root = {
            let mut tree = BTree::new(&mut store, root);
            tree.insert(b"key1", b"value1").unwrap();
            tree.root()
        };

        let pages_before = store.live_pages();
        let next_before = store.next;

        {
            let mut tree = BTree::new(&mut store, root);
            assert!(!tree.delete(b"missing").unwrap());
        }
        assert_eq!(store.live_pages(), pages_before);
        assert_eq!(store.next, next_before);
    }

    #[test]
    fn delete_drains_multi_level_tree() {
        let mut store = MemStore::new();
        let root = empty_tree(&mut store);
        let mut tree = BTree::new(&mut store, root);

        for i in 0..60u32 {
            let key = format!("key{:04}", i);
            tree.insert(key.as_bytes(), &[0x44; 700]).unwrap();
        }
        for i in 0..60u32 {
            let key = format!("key{:04}", i);
            assert!(tree.delete(key.as_bytes()).unwrap(), "delete {}", key);
        }

        for i in 0..60u32 {
            let key = format!("key{:04}", i);
            assert_eq!(tree.get(key.as_bytes()).unwrap(), None);
        }
        // Everything collapsed back to a single empty root leaf.
        assert_eq!(store.live_pages(), 1);
    }

    #[test]
    fn delete_and_reinsert_roundtrip() {
        let mut store = MemStore::new();
        let root = empty_tree(&mut store);
        let mut tree = BTree::new(&mut store, root);

        for i in 0..80u32 {
            let key = format!("key{:04}", i);
            tree.insert(key.as_bytes(), &[0x22; 300]).unwrap();
        }
        for i in (0..80u32).step_by(2) {
            let key = format!("key{:04}", i);
            assert!(tree.delete(key.as_bytes()).unwrap());
        }
        for i in (0..80u32).step_by(2) {
            let key = format!("key{:04}", i);
            tree.insert(key.as_bytes(), b"back").unwrap();
        }

        for i in 0..80u32 {
            let key = format!("key{:04}", i);
            let expected: &[u8] = if i % 2 == 0 { b"back" } else { &[0x22; 300] };
            assert_eq!(tree.get(key.as_bytes()).unwrap(), Some(expected));
        }
        let root = tree.root();
        check_subtree(&store, root);
    }

    #[test]
    fn scan_respects_range_bounds() {
        let mut store = MemStore::new();
        let root = empty_tree(&mut store);
        let mut tree = BTree::new(&mut store, root);

        for key in [b"apple", b"berry", b"cherr", b"grape", b"melon"] {
            tree.insert(key, b"x").unwrap();
        }

        let pairs = tree.scan(b"berry", b"melon").unwrap();
        let keys: Vec<&[u8]> = pairs.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"berry".as_slice(), b"cherr", b"grape"]);
    }
}
