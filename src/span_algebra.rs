// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Span algebra: intersection, subtraction, and the lockstep span-pairing
//! used by version comparison.
//!
//! Grounded on `backend/correspond.c` in full.

use crate::item::{Span, SpanPair, Specset, Vspec};
use crate::tumbler::Tumbler;
use std::collections::VecDeque;

/// Intersects two spans as half-open intervals.
///
/// Resolves the Open Question left by `correspond.c::spanintersection`'s
/// commented-out 1984 `GREATER`/`LESS` branches: the overlap of
/// `[a, a+wa)` and `[b, b+wb)` is `[max(a,b), min(a+wa, b+wb))`, computed
/// directly. See `DESIGN.md` for the resolution record.
#[must_use]
pub fn intersect_span(a: &Span, b: &Span) -> Option<Span> {
    let start = a.stream.clone().max(b.stream.clone());
    let end = a.end().min(b.end());

    if start >= end {
        return None;
    }

    Some(Span::new(start.clone(), end.sub(&start)))
}

/// `comparespans` / `intersectspansets`: intersects every pair of spans from
/// two sets, discarding empty results, returned sorted by start address.
#[must_use]
pub fn intersect_spansets(a: &[Span], b: &[Span]) -> Vec<Span> {
    let mut out: Vec<Span> = a
        .iter()
        .flat_map(|sa| b.iter().filter_map(move |sb| intersect_span(sa, sb)))
        .collect();
    out.sort_by(|l, r| l.stream.cmp(&r.stream));
    out
}

/// `spansubtract`: given two spans anchored at the same origin, returns the
/// remainder past the narrower one — `None` when the widths are equal.
#[must_use]
pub fn subtract_span(a: &Span, b: &Span) -> Option<Span> {
    match a.width.cmp_tumbler(&b.width) {
        std::cmp::Ordering::Equal => None,
        std::cmp::Ordering::Greater => Some(Span::new(a.stream.add(&b.width), a.width.sub(&b.width))),
        std::cmp::Ordering::Less => Some(Span::new(b.stream.add(&a.width), b.width.sub(&a.width))),
    }
}

/// `makespanpairsforispan`: walks `s1` and `s2` in lockstep, pairing up
/// prefixes of equal width until `iwidth` has been fully accounted for.
///
/// Both deques are consumed; a deque whose front span is wider than the
/// opposing one is split in place (the consumed prefix trimmed off, the
/// remainder left at the front for the next step).
#[must_use]
pub fn make_span_pairs_for_ispan(
    iwidth: &Tumbler,
    s1: &mut VecDeque<Span>,
    s2: &mut VecDeque<Span>,
) -> Vec<SpanPair> {
    let mut pairs = Vec::new();
    let mut sum = Tumbler::zero();

    while sum.cmp_tumbler(iwidth) == std::cmp::Ordering::Less {
        let (Some(a), Some(b)) = (s1.front().cloned(), s2.front().cloned()) else {
            break;
        };

        match a.width.cmp_tumbler(&b.width) {
            std::cmp::Ordering::Equal => {
                pairs.push(SpanPair::new(a.stream.clone(), b.stream.clone(), a.width.clone()));
                sum = sum.add(&a.width);
                s1.pop_front();
                s2.pop_front();
            }
            std::cmp::Ordering::Less => {
                pairs.push(SpanPair::new(a.stream.clone(), b.stream.clone(), a.width.clone()));
                sum = sum.add(&a.width);
                s1.pop_front();
                s2.front_mut().expect("checked above").stream = b.stream.add(&a.width);
                s2.front_mut().expect("checked above").width = b.width.sub(&a.width);
            }
            std::cmp::Ordering::Greater => {
                pairs.push(SpanPair::new(a.stream.clone(), b.stream.clone(), b.width.clone()));
                sum = sum.add(&b.width);
                s2.pop_front();
                s1.front_mut().expect("checked above").stream = a.stream.add(&b.width);
                s1.front_mut().expect("checked above").width = a.width.sub(&b.width);
            }
        }
    }

    pairs
}

/// `removespansnotinoriginal`: keeps only the vspecs in `new` whose document
/// has an overlapping vspanset in `orig`, restricted to that overlap.
#[must_use]
pub fn remove_spans_not_in_original(orig: &Specset, new: &Specset) -> Specset {
    new.iter()
        .filter_map(|nv| {
            let ov = orig.iter().find(|ov| ov.docisa == nv.docisa)?;
            let restricted = intersect_spansets(&nv.vspans, &ov.vspans);
            if restricted.is_empty() {
                None
            } else {
                Some(Vspec::new(nv.docisa.clone(), restricted))
            }
        })
        .collect()
}

/// `restrictvspecsetovercommonispans`: for each ispan and each vspec, asks
/// `ispan_to_vspans` (backed by the document's orgl) to translate the ispan
/// into the vspans of that document which refer to it, and emits a vspec
/// carrying just those vspans.
///
/// Runs in `O(|ispanset| * |specset|)`, preserving the input specset order.
pub fn restrict_vspecset_over_common_ispans<F>(
    ispanset: &[Span],
    specset: &Specset,
    mut ispan_to_vspans: F,
) -> Specset
where
    F: FnMut(&Tumbler, &Span) -> Vec<Span>,
{
    specset
        .iter()
        .filter_map(|vspec| {
            let vspans: Vec<Span> = ispanset
                .iter()
                .flat_map(|ispan| ispan_to_vspans(&vspec.docisa, ispan))
                .collect();

            if vspans.is_empty() {
                None
            } else {
                Some(Vspec::new(vspec.docisa.clone(), vspans))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn tb(d: &[i64]) -> Tumbler {
        Tumbler::from_digits(false, d.to_vec())
    }

    fn sp(stream: &[i64], width: &[i64]) -> Span {
        Span::new(tb(stream), tb(width))
    }

    #[test]
    fn intersect_disjoint_is_none() {
        assert_eq!(None, intersect_span(&sp(&[1, 1], &[2]), &sp(&[1, 10], &[2])));
    }

    #[test]
    fn intersect_overlap() {
        let a = sp(&[1, 1], &[5]); // [1.1, 1.6)
        let b = sp(&[1, 3], &[5]); // [1.3, 1.8)
        assert_eq!(Some(sp(&[1, 3], &[3])), intersect_span(&a, &b)); // [1.3, 1.6)
    }

    #[test]
    fn intersect_is_commutative() {
        let a = sp(&[1, 1], &[5]);
        let b = sp(&[1, 3], &[5]);
        assert_eq!(intersect_span(&a, &b), intersect_span(&b, &a));
    }

    #[test]
    fn intersect_self_is_self() {
        let a = sp(&[1, 1], &[5]);
        assert_eq!(Some(a.clone()), intersect_span(&a, &a));
    }

    #[test]
    fn subtract_equal_widths_is_none() {
        assert_eq!(None, subtract_span(&sp(&[1, 1], &[3]), &sp(&[2, 1], &[3])));
    }

    #[test]
    fn subtract_wider_a_yields_tail() {
        let a = sp(&[1, 1], &[5]);
        let b = sp(&[2, 1], &[2]);
        assert_eq!(Some(sp(&[1, 3], &[3])), subtract_span(&a, &b));
    }

    #[test]
    fn lockstep_pairs_equal_spans() {
        let mut s1 = VecDeque::from(vec![sp(&[1, 1], &[5])]);
        let mut s2 = VecDeque::from(vec![sp(&[2, 1], &[5])]);
        let pairs = make_span_pairs_for_ispan(&tb(&[5]), &mut s1, &mut s2);
        assert_eq!(1, pairs.len());
        assert_eq!(tb(&[5]), pairs[0].width);
    }

    #[test]
    fn lockstep_splits_narrower_side() {
        // v1 has one span of width 2, v2 has one span of width 1 then one of width 1.
        let mut s1 = VecDeque::from(vec![sp(&[1, 1], &[2])]);
        let mut s2 = VecDeque::from(vec![sp(&[2, 1], &[1]), sp(&[2, 3], &[1])]);
        let pairs = make_span_pairs_for_ispan(&tb(&[2]), &mut s1, &mut s2);
        assert_eq!(2, pairs.len());
        assert_eq!(tb(&[1]), pairs[0].width);
        assert_eq!(tb(&[1]), pairs[1].width);
    }
}
