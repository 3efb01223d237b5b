// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The persistence boundary the engine writes through.
//!
//! The real backend keeps two B-tree-style files (`istream`, `spanf`) plus a
//! free-block table and reference-count map on disk. That physical allocator
//! is out of scope for this crate; [`BlockStore`] is the narrow interface the
//! engine needs from it, and [`MemBlockStore`] is a reference implementation
//! sufficient to exercise orgl lazy-paging and reap/evict code paths in
//! tests without a real filesystem allocator.

use rustc_hash::FxHashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
};

/// Identifies a single block within a [`BlockStore`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

/// Persistence boundary for paged-out enfilade subtrees and orgls.
///
/// Implementations must make writes visible to subsequent reads once
/// [`BlockStore::flush`] returns; nothing in this crate assumes read-after-write
/// consistency *before* a flush.
pub trait BlockStore: Send + Sync {
    /// Allocates a fresh, currently-unused block id.
    fn allocate(&self) -> BlockId;

    /// Reads back a previously written block.
    fn read_block(&self, id: BlockId) -> crate::Result<Vec<u8>>;

    /// Writes (or overwrites) a block's contents.
    fn write_block(&self, id: BlockId, bytes: Vec<u8>) -> crate::Result<()>;

    /// Releases a block, allowing its id to be reused.
    fn free_block(&self, id: BlockId);

    /// Flushes all dirty blocks, the way `writeenfilades` rewrites the alloc
    /// table after flushing every dirty crum.
    fn flush(&self) -> crate::Result<()>;
}

/// In-memory reference [`BlockStore`].
///
/// Backed by a `HashMap`; `flush` is a no-op since nothing here is actually
/// durable, but exercising the same call sites a real file-backed store would
/// hit keeps the paging code path honest.
#[derive(Default)]
pub struct MemBlockStore {
    next_id: AtomicU64,
    blocks: Mutex<FxHashMap<BlockId, Vec<u8>>>,
}

impl MemBlockStore {
    /// Creates an empty in-memory block store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live blocks currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.lock().expect("lock is poisoned").len()
    }

    /// Returns `true` if no blocks are currently held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockStore for MemBlockStore {
    fn allocate(&self) -> BlockId {
        BlockId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn read_block(&self, id: BlockId) -> crate::Result<Vec<u8>> {
        self.blocks
            .lock()
            .expect("lock is poisoned")
            .get(&id)
            .cloned()
            .ok_or(crate::Error::MissingBlock(id))
    }

    fn write_block(&self, id: BlockId, bytes: Vec<u8>) -> crate::Result<()> {
        self.blocks.lock().expect("lock is poisoned").insert(id, bytes);
        Ok(())
    }

    fn free_block(&self, id: BlockId) {
        self.blocks.lock().expect("lock is poisoned").remove(&id);
    }

    fn flush(&self) -> crate::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn allocate_and_roundtrip() {
        let store = MemBlockStore::new();
        let id = store.allocate();
        store.write_block(id, vec![1, 2, 3]).expect("write");
        assert_eq!(vec![1, 2, 3], store.read_block(id).expect("read"));
        assert_eq!(1, store.len());
    }

    #[test]
    fn missing_block_is_an_error() {
        let store = MemBlockStore::new();
        assert!(store.read_block(BlockId(42)).is_err());
    }

    #[test]
    fn free_removes_block() {
        let store = MemBlockStore::new();
        let id = store.allocate();
        store.write_block(id, vec![9]).expect("write");
        store.free_block(id);
        assert!(store.is_empty());
    }
}
