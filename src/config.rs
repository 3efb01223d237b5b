// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{block_store::BlockStore, cache::PageCache, path::absolute_path};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

const DEFAULT_FILE_FOLDER: &str = ".enfilade.data";

/// Branching factor above which an enfilade internal node is split.
pub const DEFAULT_BRANCHING_FACTOR: usize = 32;

/// Son-count below which a node is a recombine candidate.
pub const DEFAULT_LOW_WATER_MARK: usize = 8;

/// Engine configuration builder.
///
/// Mirrors the shape of a tree configuration builder: a `Default` plus
/// fluent `mut self -> Self` setters, with a terminal [`Config::open`].
#[derive(Clone)]
pub struct Config {
    /// Folder path for the (out-of-scope) physical block file.
    #[doc(hidden)]
    pub path: PathBuf,

    /// Branching factor above which an internal node splits.
    pub branching_factor: usize,

    /// Son-count below which a node recombines with a sibling.
    pub low_water_mark: usize,

    /// Capacity, in digit positions, reserved for every tumbler's mantissa.
    pub tumbler_places: usize,

    /// Orgl/crum page cache.
    #[doc(hidden)]
    pub cache: Arc<PageCache>,

    /// Block store backing persisted enfilade pages and orgls.
    #[doc(hidden)]
    pub block_store: Arc<dyn BlockStore>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("branching_factor", &self.branching_factor)
            .field("low_water_mark", &self.low_water_mark)
            .field("tumbler_places", &self.tumbler_places)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: absolute_path(Path::new(DEFAULT_FILE_FOLDER)),
            branching_factor: DEFAULT_BRANCHING_FACTOR,
            low_water_mark: DEFAULT_LOW_WATER_MARK,
            tumbler_places: crate::tumbler::NPLACES,
            cache: Arc::new(PageCache::with_capacity_bytes(/* 16 MiB */ 16 * 1_024 * 1_024)),
            block_store: Arc::new(crate::block_store::MemBlockStore::new()),
        }
    }
}

impl Config {
    /// Initializes a new config rooted at `path`.
    #[must_use]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: absolute_path(path.as_ref()),
            ..Default::default()
        }
    }

    /// Sets the branching factor above which an internal node is split.
    ///
    /// # Panics
    ///
    /// Panics if `n` is smaller than 2.
    #[must_use]
    pub fn branching_factor(mut self, n: usize) -> Self {
        assert!(n >= 2, "branching factor must be at least 2");
        self.branching_factor = n;
        self
    }

    /// Sets the son-count below which a node is a recombine candidate.
    ///
    /// # Panics
    ///
    /// Panics if `n` is 0 or exceeds the current branching factor.
    #[must_use]
    pub fn low_water_mark(mut self, n: usize) -> Self {
        assert!(n > 0, "low water mark must be positive");
        assert!(n <= self.branching_factor, "low water mark cannot exceed branching factor");
        self.low_water_mark = n;
        self
    }

    /// Sets the orgl/crum page cache.
    ///
    /// You can create a global [`PageCache`] and share it between multiple
    /// engines to cap overall cache memory usage.
    #[must_use]
    pub fn use_cache(mut self, cache: Arc<PageCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the block store backing persisted pages.
    ///
    /// Defaults to an in-memory [`crate::block_store::MemBlockStore`].
    #[must_use]
    pub fn block_store(mut self, block_store: Arc<dyn BlockStore>) -> Self {
        self.block_store = block_store;
        self
    }

    /// Opens an engine using this config.
    pub fn open(self) -> crate::Engine {
        crate::Engine::open(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn default_config_is_sane() {
        let config = Config::default();
        assert_eq!(DEFAULT_BRANCHING_FACTOR, config.branching_factor);
        assert_eq!(DEFAULT_LOW_WATER_MARK, config.low_water_mark);
        assert!(config.low_water_mark <= config.branching_factor);
    }

    #[test]
    #[should_panic(expected = "low water mark cannot exceed branching factor")]
    fn low_water_mark_cannot_exceed_branching_factor() {
        let _ = Config::default().branching_factor(4).low_water_mark(8);
    }
}
