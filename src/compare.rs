// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Version comparison: `SHOWRELATIONOF2VERSIONS`.
//!
//! Grounded on `backend/correspond.c`'s `showrelationof2versions` /
//! `makespanpairsforispan` composition, itself grounded on the newer of the
//! two `do1.c` copies in the pack (the one that filters to the text
//! subspace before comparing; see `DESIGN.md` Open Question 4).

use crate::item::{Span, Specset, SpanPairSet};
use crate::orgl::Orgl;
use crate::span_algebra::{intersect_spansets, make_span_pairs_for_ispan};
use crate::tumbler::Tumbler;
use std::collections::VecDeque;

/// Drops any vspan outside the text subspace (`stream >= 1.0`) from every
/// vspec in `specset`, and drops any vspec left with no vspans.
#[must_use]
pub fn filter_to_text_subspace(specset: &Specset) -> Specset {
    specset
        .iter()
        .filter_map(|vspec| {
            let kept: Vec<Span> = vspec
                .vspans
                .iter()
                .filter(|s| s.stream.is_text_subspace())
                .cloned()
                .collect();

            if kept.is_empty() {
                None
            } else {
                Some(crate::item::Vspec::new(vspec.docisa.clone(), kept))
            }
        })
        .collect()
}

/// `specset2ispanset`: converts a specset into the permascroll ranges its
/// vspans actually refer to, using each document's orgl as the v-to-i
/// translation table.
#[must_use]
pub fn specset_to_ispanset<F>(mut get_orgl: F, specset: &Specset) -> Vec<Span>
where
    F: FnMut(&Tumbler) -> Orgl,
{
    let mut out = Vec::new();

    for vspec in specset {
        let orgl = get_orgl(&vspec.docisa);
        for vspan in &vspec.vspans {
            let pieces = orgl.retrieve_in_vspan(&vspan.stream, &vspan.end());
            for (v_sub, ispan_start) in pieces {
                let overlap_start = v_sub.stream.clone().max(vspan.stream.clone());
                let overlap_end = v_sub.end().min(vspan.end());
                if overlap_start >= overlap_end {
                    continue;
                }
                let offset = overlap_start.sub(&v_sub.stream);
                let width = overlap_end.sub(&overlap_start);
                out.push(Span::new(ispan_start.add(&offset), width));
            }
        }
    }

    out
}

/// `ispan2vspanset`: the inverse translation, used by
/// `crate::span_algebra::restrict_vspecset_over_common_ispans`. Finds which
/// v-runs of `docisa`'s orgl map into `ispan`.
#[must_use]
pub fn ispan_to_vspans(orgl: &Orgl, ispan: &Span) -> Vec<Span> {
    orgl.all_vspans_with_origins()
        .into_iter()
        .filter_map(|(v_sub, ispan_start)| {
            let i_sub = Span::new(ispan_start, v_sub.width.clone());
            let overlap_start = i_sub.stream.clone().max(ispan.stream.clone());
            let overlap_end = i_sub.end().min(ispan.end());
            if overlap_start >= overlap_end {
                return None;
            }
            let offset = overlap_start.sub(&i_sub.stream);
            let width = overlap_end.sub(&overlap_start);
            Some(Span::new(v_sub.stream.add(&offset), width))
        })
        .collect()
}

/// `showrelationof2versions`: compares two versions' text content and
/// returns the span pairs describing shared origin.
///
/// 1. Filters both specsets to the text subspace.
/// 2. Converts each to an ispanset.
/// 3. Intersects the two ispansets.
/// 4. Walks the common ispans, pairing up each version's vspans in lockstep.
#[must_use]
pub fn show_relation_of_2_versions<F>(mut get_orgl: F, v1: &Specset, v2: &Specset) -> SpanPairSet
where
    F: FnMut(&Tumbler) -> Orgl,
{
    let v1 = filter_to_text_subspace(v1);
    let v2 = filter_to_text_subspace(v2);

    let ispans1 = specset_to_ispanset(&mut get_orgl, &v1);
    let ispans2 = specset_to_ispanset(&mut get_orgl, &v2);

    let common = intersect_spansets(&ispans1, &ispans2);

    let mut pairs = Vec::new();

    for ispan in &common {
        let vspans1 = restrict_to_ispan(&mut get_orgl, &v1, ispan);
        let vspans2 = restrict_to_ispan(&mut get_orgl, &v2, ispan);

        let mut s1: VecDeque<Span> = vspans1.into_iter().collect();
        let mut s2: VecDeque<Span> = vspans2.into_iter().collect();

        pairs.extend(make_span_pairs_for_ispan(&ispan.width, &mut s1, &mut s2));
    }

    pairs
}

fn restrict_to_ispan<F>(get_orgl: &mut F, specset: &Specset, ispan: &Span) -> Vec<Span>
where
    F: FnMut(&Tumbler) -> Orgl,
{
    specset
        .iter()
        .flat_map(|vspec| {
            let orgl = get_orgl(&vspec.docisa);
            ispan_to_vspans(&orgl, ispan)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Vspec;
    use test_log::test;

    fn tb(d: &[i64]) -> Tumbler {
        Tumbler::from_digits(false, d.to_vec())
    }

    fn doc() -> Tumbler {
        tb(&[1, 1, 0, 1, 0, 1])
    }

    fn make_orgl_with(text_width: i64) -> Orgl {
        let mut orgl = Orgl::create(8, 1);
        orgl.insert_reference(&tb(&[1, 1]), tb(&[text_width]), tb(&[0]), doc());
        orgl
    }

    #[test]
    fn identical_versions_compare_as_one_span_pair() {
        let specset: Specset = vec![Vspec::new(doc(), vec![Span::new(tb(&[1, 1]), tb(&[11]))])];

        let pairs = show_relation_of_2_versions(|_| make_orgl_with(11), &specset, &specset);

        assert_eq!(1, pairs.len());
        assert_eq!(tb(&[11]), pairs[0].width);
        assert_eq!(tb(&[1, 1]), pairs[0].stream1);
        assert_eq!(tb(&[1, 1]), pairs[0].stream2);
    }

    #[test]
    fn disjoint_versions_compare_empty() {
        let v1: Specset = vec![Vspec::new(doc(), vec![Span::new(tb(&[1, 1]), tb(&[3]))])];
        let v2: Specset = vec![Vspec::new(doc(), vec![Span::new(tb(&[1, 1]), tb(&[3]))])];

        // Two independent orgls whose permascroll runs never overlap.
        let mut calls = 0;
        let pairs = show_relation_of_2_versions(
            |_| {
                calls += 1;
                let mut orgl = Orgl::create(8, 1);
                let base = if calls <= 1 { 0 } else { 1_000 };
                orgl.insert_reference(&tb(&[1, 1]), tb(&[3]), tb(&[base]), doc());
                orgl
            },
            &v1,
            &v2,
        );

        assert!(pairs.is_empty());
    }

    #[test]
    fn link_subspace_is_excluded_from_comparison() {
        let specset: Specset = vec![Vspec::new(doc(), vec![Span::new(tb(&[0, 1]), tb(&[5]))])];
        assert!(filter_to_text_subspace(&specset).is_empty());
    }
}
