// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::block_store::BlockId;
use quick_cache::{sync::Cache as QuickCache, Weighter};

const TAG_NODE: u8 = 0;
const TAG_ORGL: u8 = 1;

#[derive(Eq, std::hash::Hash, PartialEq)]
struct CacheKey(u8, u64);

#[derive(Clone)]
struct PageWeighter;

impl Weighter<CacheKey, Vec<u8>> for PageWeighter {
    fn weight(&self, _key: &CacheKey, page: &Vec<u8>) -> u64 {
        page.len() as u64
    }
}

/// Cache of paged enfilade subtrees and orgls, keyed by their disk block.
///
/// Every reap candidate is an encoded block (an internal node's children, or
/// an evicted orgl's POOM root) that would otherwise require a
/// [`crate::block_store::BlockStore::read_block`] round trip to bring back.
/// Mirrors the teacher's block/blob cache split, but the two tags here are
/// "enfilade node page" and "orgl page" rather than "data block" and "blob".
pub struct PageCache {
    data: QuickCache<CacheKey, Vec<u8>, PageWeighter, rustc_hash::FxBuildHasher>,
    capacity: u64,
}

impl PageCache {
    /// Creates a cache with roughly `bytes` of capacity.
    #[must_use]
    pub fn with_capacity_bytes(bytes: u64) -> Self {
        use quick_cache::sync::DefaultLifecycle;

        #[allow(clippy::expect_used)]
        let opts = quick_cache::OptionsBuilder::new()
            .weight_capacity(bytes)
            .hot_allocation(0.9)
            .estimated_items_capacity(10_000)
            .build()
            .expect("cache options should be valid");

        #[allow(clippy::default_trait_access)]
        let quick_cache = QuickCache::with_options(
            opts,
            PageWeighter,
            Default::default(),
            DefaultLifecycle::default(),
        );

        Self {
            data: quick_cache,
            capacity: bytes,
        }
    }

    /// Cache capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes currently resident in the cache.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.weight()
    }

    /// Number of cached pages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if the cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Looks up a paged-out enfilade node's children block.
    #[must_use]
    pub fn get_node_page(&self, id: BlockId) -> Option<Vec<u8>> {
        self.data.get(&CacheKey(TAG_NODE, id.0))
    }

    /// Caches a node children block.
    pub fn insert_node_page(&self, id: BlockId, page: Vec<u8>) {
        self.data.insert(CacheKey(TAG_NODE, id.0), page);
    }

    /// Looks up a paged-out orgl.
    #[must_use]
    pub fn get_orgl_page(&self, id: BlockId) -> Option<Vec<u8>> {
        self.data.get(&CacheKey(TAG_ORGL, id.0))
    }

    /// Caches an orgl's encoded POOM root.
    pub fn insert_orgl_page(&self, id: BlockId, page: Vec<u8>) {
        self.data.insert(CacheKey(TAG_ORGL, id.0), page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn insert_and_get_node_page() {
        let cache = PageCache::with_capacity_bytes(1_024);
        cache.insert_node_page(BlockId(1), vec![1, 2, 3]);
        assert_eq!(Some(vec![1, 2, 3]), cache.get_node_page(BlockId(1)));
        assert_eq!(None, cache.get_orgl_page(BlockId(1)));
    }

    #[test]
    fn tags_do_not_collide() {
        let cache = PageCache::with_capacity_bytes(1_024);
        cache.insert_node_page(BlockId(5), vec![1]);
        cache.insert_orgl_page(BlockId(5), vec![2]);
        assert_eq!(Some(vec![1]), cache.get_node_page(BlockId(5)));
        assert_eq!(Some(vec![2]), cache.get_orgl_page(BlockId(5)));
    }
}
