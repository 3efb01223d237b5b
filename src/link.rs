// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Link management: creating links, following their end-sets, and querying
//! by end-set content.
//!
//! No single file in the retrieved pack implements link management end to
//! end; this module follows the *shape* of `backend/do1.c`'s operation
//! composition (parse arguments, look up the owning structures, compose a
//! handful of span-algebra primitives, write the result) applied to the
//! operations SPEC_FULL.md §4.7 names. The global SPAN cross-document index
//! `find_links_from_to_three` queries is realized here as a flat
//! [`LinkRegistry`] rather than a third enfilade tree instance — see
//! `DESIGN.md`.

use crate::item::{Link, LinkEnd, Span, Specset, Sporgl, Sporglset, Vspec};
use crate::span_algebra::intersect_spansets;
use crate::tumbler::Tumbler;

/// Converts a specset into the packed sporgl form stored inside a link's
/// orgl (`address` = the vspec's document isa, `origin`/`width` = the
/// vspan).
#[must_use]
pub fn specset_to_sporglset(specset: &Specset) -> Sporglset {
    specset
        .iter()
        .flat_map(|vspec| {
            vspec
                .vspans
                .iter()
                .map(move |vspan| Sporgl::new(vspec.docisa.clone(), vspan.stream.clone(), vspan.width.clone()))
        })
        .collect()
}

/// The inverse of [`specset_to_sporglset`]: groups packed references back
/// into a specset, one vspec per distinct document address.
#[must_use]
pub fn sporglset_to_specset(sporgls: &Sporglset) -> Specset {
    let mut out: Specset = Vec::new();

    for s in sporgls {
        if let Some(vspec) = out.iter_mut().find(|v: &&mut Vspec| v.docisa == s.address) {
            vspec.vspans.push(Span::new(s.origin.clone(), s.width.clone()));
        } else {
            out.push(Vspec::new(s.address.clone(), vec![Span::new(s.origin.clone(), s.width.clone())]));
        }
    }

    out
}

/// `make_link`: allocates a link under `isa`, converting each end's specset
/// into its packed form.
#[must_use]
pub fn make_link(isa: Tumbler, from: &Specset, to: &Specset, three: &Specset) -> Link {
    Link {
        isa,
        from: specset_to_sporglset(from),
        to: specset_to_sporglset(to),
        three: specset_to_sporglset(three),
    }
}

/// `follow_link`: reads the chosen end-set back out as a specset.
#[must_use]
pub fn follow_link(link: &Link, which: LinkEnd) -> Specset {
    sporglset_to_specset(link.end_set(which))
}

fn end_set_matches(end_set_spec: &Specset, query: &Specset) -> bool {
    query.iter().any(|qv| {
        end_set_spec
            .iter()
            .any(|ev| ev.docisa == qv.docisa && !intersect_spansets(&ev.vspans, &qv.vspans).is_empty())
    })
}

/// A flat index of known links, backing `find_links_from_to_three` and its
/// `num`/`next_n` variants.
#[derive(Default)]
pub struct LinkRegistry {
    links: Vec<Link>,
}

impl LinkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a newly created link.
    pub fn register(&mut self, link: Link) {
        self.links.push(link);
    }

    /// `find_links_from_to_three`: returns every registered link whose
    /// end-sets intersect each of the given (optional) query specsets. A
    /// `None` query acts as a wildcard on that end.
    #[must_use]
    pub fn find_from_to_three(&self, from: Option<&Specset>, to: Option<&Specset>, three: Option<&Specset>) -> Vec<&Link> {
        self.links
            .iter()
            .filter(|link| {
                let from_ok = from.is_none_or(|q| end_set_matches(&follow_link(link, LinkEnd::From), q));
                let to_ok = to.is_none_or(|q| end_set_matches(&follow_link(link, LinkEnd::To), q));
                let three_ok = three.is_none_or(|q| end_set_matches(&follow_link(link, LinkEnd::Three), q));
                from_ok && to_ok && three_ok
            })
            .collect()
    }

    /// `findnumoflinksfromtothree`: count variant.
    #[must_use]
    pub fn count_from_to_three(&self, from: Option<&Specset>, to: Option<&Specset>, three: Option<&Specset>) -> usize {
        self.find_from_to_three(from, to, three).len()
    }

    /// `findnextnlinksfromtothree`: paginated continuation of
    /// [`LinkRegistry::find_from_to_three`]. Registration order gives the
    /// stable cursor the original's "orglrange" swept over; `after` names
    /// the last link isa already seen (`None` starts from the beginning),
    /// and at most `n` further matches are returned.
    #[must_use]
    pub fn find_next_n_from_to_three(
        &self,
        from: Option<&Specset>,
        to: Option<&Specset>,
        three: Option<&Specset>,
        after: Option<&Tumbler>,
        n: usize,
    ) -> Vec<&Link> {
        let matches = self.find_from_to_three(from, to, three);
        let start = after.map_or(0, |cursor| {
            matches.iter().position(|link| &link.isa == cursor).map_or(0, |idx| idx + 1)
        });
        matches.into_iter().skip(start).take(n).collect()
    }

    /// `finddocscontaining`: links whose `from` end-set touches `specset`.
    #[must_use]
    pub fn find_docs_containing(&self, specset: &Specset) -> Vec<&Link> {
        self.find_from_to_three(Some(specset), None, None)
    }

    /// Looks up a single link by its own isa.
    #[must_use]
    pub fn find_by_isa(&self, isa: &Tumbler) -> Option<&Link> {
        self.links.iter().find(|link| &link.isa == isa)
    }

    /// Number of registered links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// `true` if no links are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn tb(d: &[i64]) -> Tumbler {
        Tumbler::from_digits(false, d.to_vec())
    }

    fn doc() -> Tumbler {
        tb(&[1, 1, 0, 1, 0, 1])
    }

    fn specset(start: i64, width: i64) -> Specset {
        vec![Vspec::new(doc(), vec![Span::new(tb(&[1, start]), tb(&[width]))])]
    }

    #[test]
    fn follow_link_roundtrips_through_make_link() {
        let from = specset(1, 1);
        let to = specset(3, 1);
        let three = Vec::new();

        let link = make_link(tb(&[1, 1, 0, 2]), &from, &to, &three);

        assert_eq!(from, follow_link(&link, LinkEnd::From));
        assert_eq!(to, follow_link(&link, LinkEnd::To));
        assert!(follow_link(&link, LinkEnd::Three).is_empty());
    }

    #[test]
    fn find_links_from_to_three_matches_on_overlap() {
        let mut registry = LinkRegistry::new();
        let link = make_link(tb(&[1, 1, 0, 2]), &specset(1, 1), &specset(3, 1), &Vec::new());
        registry.register(link);

        let hits = registry.find_from_to_three(Some(&specset(1, 1)), None, None);
        assert_eq!(1, hits.len());

        let miss = registry.find_from_to_three(Some(&specset(50, 1)), None, None);
        assert!(miss.is_empty());
    }

    #[test]
    fn find_next_n_resumes_after_the_given_cursor() {
        let mut registry = LinkRegistry::new();
        let link1 = make_link(tb(&[1, 1, 0, 2]), &specset(1, 1), &specset(1, 1), &Vec::new());
        let link2 = make_link(tb(&[1, 1, 0, 3]), &specset(1, 1), &specset(1, 1), &Vec::new());
        let link3 = make_link(tb(&[1, 1, 0, 4]), &specset(1, 1), &specset(1, 1), &Vec::new());
        let isa1 = link1.isa.clone();
        let isa2 = link2.isa.clone();
        let isa3 = link3.isa.clone();
        registry.register(link1);
        registry.register(link2);
        registry.register(link3);

        let first_page = registry.find_next_n_from_to_three(Some(&specset(1, 1)), None, None, None, 2);
        assert_eq!(vec![&isa1, &isa2], first_page.iter().map(|l| &l.isa).collect::<Vec<_>>());

        let second_page = registry.find_next_n_from_to_three(Some(&specset(1, 1)), None, None, Some(&isa2), 2);
        assert_eq!(vec![&isa3], second_page.iter().map(|l| &l.isa).collect::<Vec<_>>());
    }
}
