// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Orgl: the per-document version space.
//!
//! Grounded on `backend/granf2.c`'s `fetchorglgr`/`createorglgr`/
//! `inserttextgr`: a GRAN leaf of kind `GRANORGL` carries (or can page in) a
//! POOM subtree mapping the document's own v-space onto runs of the shared
//! GRAN permascroll.

use crate::block_store::{BlockId, BlockStore};
use crate::cache::PageCache;
use crate::coding::{Decode, Encode};
use crate::enfilade::node::{EnfiladeType, LeafInfo};
use crate::enfilade::tree::EnfiladeTree;
use crate::error::{gerror, Error};
use crate::item::Span;
use crate::tumbler::Tumbler;
use crate::version::FormatVersion;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// A single document's version space: a POOM tree mapping v-addresses to
/// runs of the permascroll.
#[derive(Clone)]
pub struct Orgl {
    poom: EnfiladeTree,
    disk_ptr: Option<BlockId>,
}

impl Orgl {
    /// `createorglgr`: allocates a fresh, empty orgl.
    #[must_use]
    pub fn create(branching_factor: usize, low_water_mark: usize) -> Self {
        Self {
            poom: EnfiladeTree::new(EnfiladeType::Poom, branching_factor, low_water_mark),
            disk_ptr: None,
        }
    }

    /// A v-address such as `1.6` carries a leading subspace marker (`0` for
    /// link ends, `1` for text) followed by a 1-based position. The POOM
    /// tree underneath, like the GRAN permascroll, addresses its axis with a
    /// plain 0-based offset from the left — this is the translation between
    /// the two, applied on every way in or out of the tree.
    fn to_axis_offset(vaddr: &Tumbler) -> Tumbler {
        Tumbler::from_parts(&[vaddr.digit(1).saturating_sub(1).max(0) as u64])
    }

    fn from_axis_offset(marker: i64, offset: &Tumbler) -> Tumbler {
        Tumbler::from_digits(false, vec![marker, offset.digit(0) + 1])
    }

    /// `true` once this orgl has been written to a block at least once.
    #[must_use]
    pub fn disk_ptr(&self) -> Option<BlockId> {
        self.disk_ptr
    }

    /// Total width of this document's v-space.
    #[must_use]
    pub fn document_width(&self) -> Tumbler {
        self.poom.total_width(0)
    }

    /// `inserttextgr`: records that the v-range `[vaddr, vaddr+width)` now
    /// refers to the permascroll run starting at `ispan_start`.
    pub fn insert_reference(&mut self, vaddr: &Tumbler, width: Tumbler, ispan_start: Tumbler, homedoc: Tumbler) {
        let offset = Self::to_axis_offset(vaddr);
        self.poom.insert_at(&offset, 0, width, LeafInfo::TwoD { homedoc, ispan_start });
    }

    /// Returns the v-spans together with the permascroll run each maps to,
    /// for every leaf overlapping `[lower, upper)`. `lower` and `upper` must
    /// share the same subspace marker (both `0.x` or both `1.x`).
    #[must_use]
    pub fn retrieve_in_vspan(&self, lower: &Tumbler, upper: &Tumbler) -> Vec<(Span, Tumbler)> {
        let marker = lower.digit(0);
        let lo = Self::to_axis_offset(lower);
        let hi = Self::to_axis_offset(upper);

        self.poom
            .retrieve_in_span(&lo, &hi, 0)
            .into_iter()
            .filter_map(|ctx| match ctx.info {
                LeafInfo::TwoD { ispan_start, .. } => {
                    let stream = Self::from_axis_offset(marker, &ctx.total_offset);
                    Some((Span::new(stream, ctx.context_wid), ispan_start))
                }
                _ => None,
            })
            .collect()
    }

    /// Every v-span currently recorded in this orgl's text subspace,
    /// together with the permascroll run each one maps to, in order.
    #[must_use]
    pub fn all_vspans_with_origins(&self) -> Vec<(Span, Tumbler)> {
        let total = self.document_width();
        if total.is_zero() {
            return Vec::new();
        }
        let lower = Tumbler::from_digits(false, vec![1, 1]);
        let upper = Tumbler::from_digits(false, vec![1, total.digit(0) + 1]);
        self.retrieve_in_vspan(&lower, &upper)
    }

    /// Every v-span currently recorded in this orgl's text subspace, in
    /// order.
    #[must_use]
    pub fn all_vspans(&self) -> Vec<Span> {
        self.all_vspans_with_origins().into_iter().map(|(span, _)| span).collect()
    }

    /// `deletevspangr`: removes `[vspan.stream, vspan.end())` from this
    /// document's v-space, compacting whatever follows down to fill the gap
    /// (the v-space has no holes). Returns `false` if `vspan` runs past the
    /// document's current width.
    pub fn delete_vspan(&mut self, vspan: &Span) -> bool {
        let lo = Self::to_axis_offset(&vspan.stream);
        let hi = Self::to_axis_offset(&vspan.end());

        if hi > self.poom.total_width(0) {
            return false;
        }

        let mut cursor = Tumbler::zero();
        let mut new_leaves = Vec::new();

        for (width, info) in self.poom.flatten(0) {
            let leaf_start = cursor.clone();
            let leaf_end = leaf_start.add(&width);
            cursor = leaf_end.clone();

            let LeafInfo::TwoD { homedoc, ispan_start } = info else {
                new_leaves.push((width, info));
                continue;
            };

            if leaf_end <= lo || leaf_start >= hi {
                new_leaves.push((width, LeafInfo::TwoD { homedoc, ispan_start }));
                continue;
            }
            if leaf_start < lo {
                let keep_width = lo.sub(&leaf_start);
                new_leaves.push((keep_width, LeafInfo::TwoD { homedoc: homedoc.clone(), ispan_start: ispan_start.clone() }));
            }
            if leaf_end > hi {
                let skip = hi.sub(&leaf_start);
                let remainder_width = width.sub(&skip);
                let new_ispan_start = ispan_start.add(&skip);
                new_leaves.push((remainder_width, LeafInfo::TwoD { homedoc, ispan_start: new_ispan_start }));
            }
        }

        self.poom.rebuild(0, new_leaves);
        true
    }

    /// `rearrangegr`: reorders the runs named by `cutseq` — `(source vspan,
    /// destination start)` pairs — into a fresh v-space built from just
    /// those runs, ordered by destination.
    pub fn rearrange(&mut self, cutseq: &[(Span, Tumbler)]) -> bool {
        let mut pieces = Vec::new();

        for (src, dst_start) in cutseq {
            let lo = Self::to_axis_offset(&src.stream);
            let hi = Self::to_axis_offset(&src.end());
            if hi > self.poom.total_width(0) {
                return false;
            }

            for ctx in self.poom.retrieve_in_span(&lo, &hi, 0) {
                let LeafInfo::TwoD { homedoc, ispan_start } = ctx.info else { continue };
                let leaf_start = ctx.total_offset.clone();
                let leaf_end = leaf_start.add(&ctx.context_wid);
                let overlap_start = leaf_start.clone().max(lo.clone());
                let overlap_end = leaf_end.min(hi.clone());
                if overlap_start >= overlap_end {
                    continue;
                }
                let skip = overlap_start.sub(&leaf_start);
                let width = overlap_end.sub(&overlap_start);
                pieces.push((dst_start.clone(), width, ispan_start.add(&skip), homedoc));
            }
        }

        pieces.sort_by(|a, b| a.0.cmp(&b.0));
        let new_leaves = pieces
            .into_iter()
            .map(|(_, width, ispan_start, homedoc)| (width, LeafInfo::TwoD { homedoc, ispan_start }))
            .collect();

        self.poom.rebuild(0, new_leaves);
        true
    }

    /// Rebuilds the v-space after an edit-buffer round trip through
    /// [`Orgl::flatten`].
    pub fn rebuild(&mut self, leaves: Vec<(Tumbler, LeafInfo)>) {
        self.poom.rebuild(0, leaves);
    }

    /// Flattens the current v-space into an edit buffer.
    #[must_use]
    pub fn flatten(&self) -> Vec<(Tumbler, LeafInfo)> {
        self.poom.flatten(0)
    }

    /// Marks this orgl as backed by `ptr`, as if `writeenfilades` had just
    /// flushed it.
    pub fn set_disk_ptr(&mut self, ptr: BlockId) {
        self.disk_ptr = Some(ptr);
    }

    /// Encodes this orgl's v-space as a block: a [`FormatVersion`] stamp, a
    /// leaf count, then each text-subspace leaf's `(width, homedoc,
    /// ispan_start)` in v-space order. Every leaf in a paged orgl is
    /// [`LeafInfo::TwoD`] by construction (see [`Orgl::insert_reference`]);
    /// anything else means the in-core tree is corrupt.
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        let leaves = self.flatten();
        let mut out = Vec::new();
        out.write_u8(u8::from(FormatVersion::V1))?;
        #[allow(clippy::cast_possible_truncation)]
        out.write_u32::<BigEndian>(leaves.len() as u32)?;

        for (width, info) in &leaves {
            let LeafInfo::TwoD { homedoc, ispan_start } = info else {
                gerror("orgl leaf is not TwoD while encoding for disk");
            };
            width.encode_into(&mut out)?;
            homedoc.encode_into(&mut out)?;
            ispan_start.encode_into(&mut out)?;
        }

        Ok(out)
    }

    /// Decodes a block written by [`Orgl::to_bytes`] back into a fresh orgl.
    pub fn from_bytes(bytes: &[u8], branching_factor: usize, low_water_mark: usize) -> crate::Result<Self> {
        let mut reader = bytes;
        let version_byte = reader.read_u8()?;
        let version = FormatVersion::try_from(version_byte).unwrap_or(FormatVersion::V1);
        if version != FormatVersion::V1 {
            return Err(Error::InvalidVersion(version));
        }

        let count = reader.read_u32::<BigEndian>()?;
        let mut leaves = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let width = Tumbler::decode_from(&mut reader)?;
            let homedoc = Tumbler::decode_from(&mut reader)?;
            let ispan_start = Tumbler::decode_from(&mut reader)?;
            leaves.push((width, LeafInfo::TwoD { homedoc, ispan_start }));
        }

        let mut orgl = Self::create(branching_factor, low_water_mark);
        orgl.rebuild(leaves);
        Ok(orgl)
    }

    /// `reaporgl`: encodes this orgl, writes it through `block_store`, and
    /// warms `cache` with the same bytes, as if it had just been paged out.
    pub fn evict(&mut self, cache: &PageCache, block_store: &dyn BlockStore) -> crate::Result<BlockId> {
        let bytes = self.to_bytes()?;
        let ptr = self.disk_ptr.unwrap_or_else(|| block_store.allocate());
        block_store.write_block(ptr, bytes.clone())?;
        cache.insert_orgl_page(ptr, bytes);
        self.disk_ptr = Some(ptr);
        Ok(ptr)
    }
}

/// Lazily loads an orgl page-cached or stored under `disk_ptr`, or creates a
/// fresh one if this is the document's first reference (`fetchorgl`/
/// `createorglgr` combined).
pub fn fetch_or_create(
    cache: &PageCache,
    block_store: &dyn BlockStore,
    disk_ptr: Option<BlockId>,
    branching_factor: usize,
    low_water_mark: usize,
) -> crate::Result<Orgl> {
    let Some(ptr) = disk_ptr else {
        return Ok(Orgl::create(branching_factor, low_water_mark));
    };

    let bytes = if let Some(cached) = cache.get_orgl_page(ptr) {
        log::trace!("rejuvenating cached orgl page at {ptr:?}");
        cached
    } else {
        let fetched = block_store.read_block(ptr)?;
        cache.insert_orgl_page(ptr, fetched.clone());
        fetched
    };

    let mut orgl = Orgl::from_bytes(&bytes, branching_factor, low_water_mark)?;
    orgl.set_disk_ptr(ptr);
    Ok(orgl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn tb(d: &[i64]) -> Tumbler {
        Tumbler::from_digits(false, d.to_vec())
    }

    #[test]
    fn insert_and_retrieve_reference() {
        let mut orgl = Orgl::create(8, 1);
        orgl.insert_reference(&tb(&[1, 1]), tb(&[5]), tb(&[0]), tb(&[1, 1]));

        let refs = orgl.retrieve_in_vspan(&tb(&[1, 1]), &tb(&[1, 6]));
        assert_eq!(1, refs.len());
        assert_eq!(tb(&[0]), refs[0].1);
    }

    #[test]
    fn empty_orgl_has_zero_width() {
        let orgl = Orgl::create(8, 1);
        assert!(orgl.document_width().is_zero());
        assert!(orgl.all_vspans().is_empty());
    }

    #[test]
    fn delete_vspan_compacts_the_v_space() {
        let mut orgl = Orgl::create(8, 1);
        orgl.insert_reference(&tb(&[1, 1]), tb(&[6]), tb(&[0]), tb(&[1, 1]));

        // "abcdef" minus "cd" (positions 3..5) should compact to width 4.
        assert!(orgl.delete_vspan(&Span::new(tb(&[1, 3]), tb(&[2]))));
        assert_eq!(tb(&[4]), orgl.document_width());
    }

    #[test]
    fn delete_vspan_past_the_end_is_refused() {
        let mut orgl = Orgl::create(8, 1);
        orgl.insert_reference(&tb(&[1, 1]), tb(&[3]), tb(&[0]), tb(&[1, 1]));
        assert!(!orgl.delete_vspan(&Span::new(tb(&[1, 1]), tb(&[9]))));
    }

    #[test]
    fn rearrange_reorders_runs_by_destination() {
        let mut orgl = Orgl::create(8, 1);
        orgl.insert_reference(&tb(&[1, 1]), tb(&[3]), tb(&[0]), tb(&[1, 1]));
        orgl.insert_reference(&tb(&[1, 4]), tb(&[3]), tb(&[100]), tb(&[1, 1]));

        let cutseq = vec![
            (Span::new(tb(&[1, 4]), tb(&[3])), tb(&[1, 1])),
            (Span::new(tb(&[1, 1]), tb(&[3])), tb(&[1, 4])),
        ];
        assert!(orgl.rearrange(&cutseq));

        let refs = orgl.retrieve_in_vspan(&tb(&[1, 1]), &tb(&[1, 7]));
        assert_eq!(2, refs.len());
        assert_eq!(tb(&[100]), refs[0].1);
        assert_eq!(tb(&[0]), refs[1].1);
    }

    #[test]
    fn to_bytes_from_bytes_roundtrips() {
        let mut orgl = Orgl::create(8, 1);
        orgl.insert_reference(&tb(&[1, 1]), tb(&[5]), tb(&[0]), tb(&[1, 1]));
        orgl.insert_reference(&tb(&[1, 6]), tb(&[3]), tb(&[50]), tb(&[1, 2]));

        let bytes = orgl.to_bytes().expect("encode");
        let restored = Orgl::from_bytes(&bytes, 8, 1).expect("decode");

        assert_eq!(orgl.document_width(), restored.document_width());
        assert_eq!(orgl.all_vspans_with_origins(), restored.all_vspans_with_origins());
    }

    #[test]
    fn fetch_or_create_with_no_disk_ptr_creates_empty() {
        let cache = crate::cache::PageCache::with_capacity_bytes(1_024);
        let store = crate::block_store::MemBlockStore::new();
        let orgl = fetch_or_create(&cache, &store, None, 8, 1).expect("fetch");
        assert!(orgl.document_width().is_zero());
        assert_eq!(None, orgl.disk_ptr());
    }

    #[test]
    fn fetch_or_create_round_trips_through_the_block_store() {
        let cache = crate::cache::PageCache::with_capacity_bytes(1_024);
        let store = crate::block_store::MemBlockStore::new();

        let mut orgl = Orgl::create(8, 1);
        orgl.insert_reference(&tb(&[1, 1]), tb(&[5]), tb(&[0]), tb(&[1, 1]));
        let ptr = orgl.evict(&cache, &store).expect("evict");

        let fetched = fetch_or_create(&cache, &store, Some(ptr), 8, 1).expect("fetch");
        assert_eq!(orgl.document_width(), fetched.document_width());
        assert_eq!(Some(ptr), fetched.disk_ptr());
    }
}
