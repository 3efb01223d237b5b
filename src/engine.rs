// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The engine: wires the GRAN permascroll, every open document's orgl, the
//! bert open table, and the link registry into the operations SPEC_FULL.md
//! §6.1 names.
//!
//! Grounded on the teacher's `src/tree.rs` (`Tree(Arc<TreeInner>)` plus its
//! terminal `Tree::open`), generalized from one tree to the whole pair of
//! enfilades plus the tables around them. Per SPEC_FULL §5, `Engine` is
//! `!Sync` by convention: single-writer discipline is the dispatcher's job,
//! not this type's, so its counters and tables are plain fields rather than
//! atomics or mutexes.

use crate::arena::{TaskArena, TaskIdAllocator};
use crate::bert::{BertTable, OpenAccess, OpenMode, OpenOutcome};
use crate::block_store::BlockId;
use crate::config::Config;
use crate::enfilade::node::{EnfiladeType, LeafInfo};
use crate::enfilade::tree::EnfiladeTree;
use crate::item::{Link, LinkEnd, Span, SpanPairSet, Specset};
use crate::link::LinkRegistry;
use crate::orgl::Orgl;
use crate::slice::Slice;
use crate::tumbler::Tumbler;
use rustc_hash::FxHashMap;

/// A snapshot of engine state, the payload for `DUMPSTATE`.
#[derive(Debug)]
pub struct DumpState {
    /// Total width of the GRAN permascroll.
    pub gran_width: Tumbler,
    /// Number of live nodes in the GRAN arena.
    pub gran_node_count: usize,
    /// Every known document, paired with its current v-space width.
    pub documents: Vec<(Tumbler, Tumbler)>,
    /// Number of registered links.
    pub link_count: usize,
}

/// The top-level storage/version engine.
///
/// Owns the single shared GRAN permascroll, one orgl per known document
/// version, the bert open table, and the link registry. `SPAN` (the
/// cross-document link index) is realized here as [`LinkRegistry`] rather
/// than a third enfilade tree instance — see `DESIGN.md`.
pub struct Engine {
    config: Config,
    gran: EnfiladeTree,
    documents: FxHashMap<Tumbler, Orgl>,
    doc_disk_ptr: FxHashMap<Tumbler, BlockId>,
    bert: BertTable,
    links: LinkRegistry,
    account_seq: u64,
    doc_seq: FxHashMap<Tumbler, u64>,
    version_seq: FxHashMap<Tumbler, u64>,
    link_seq: FxHashMap<Tumbler, u64>,
    session_accounts: FxHashMap<u64, Tumbler>,
    task_ids: TaskIdAllocator,
}

impl Engine {
    /// Opens an engine using `config`. Mirrors `Config::open`/the teacher's
    /// `Tree::open`: there is no on-disk recovery path in scope (SPEC_FULL
    /// §6.3), so this always starts from an empty permascroll.
    #[must_use]
    pub fn open(config: Config) -> Self {
        log::info!("opening engine at {:?}", config.path);
        let gran = EnfiladeTree::new(EnfiladeType::Gran, config.branching_factor, config.low_water_mark);
        Self {
            config,
            gran,
            documents: FxHashMap::default(),
            doc_disk_ptr: FxHashMap::default(),
            bert: BertTable::new(),
            links: LinkRegistry::new(),
            account_seq: 0,
            doc_seq: FxHashMap::default(),
            version_seq: FxHashMap::default(),
            link_seq: FxHashMap::default(),
            session_accounts: FxHashMap::default(),
            task_ids: TaskIdAllocator::new(),
        }
    }

    /// This engine's configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens a task arena for `connection`, as every request handler does on
    /// entry.
    #[must_use]
    pub fn open_task(&self, connection: u64) -> TaskArena {
        TaskArena::open(&self.task_ids, connection)
    }

    // -- Accounts, documents, versions ----------------------------------

    /// `XACCOUNT` (creation half): allocates a fresh account under the
    /// implicit root digit. The first account is `1.1`.
    pub fn create_account(&mut self) -> Tumbler {
        self.account_seq += 1;
        let account = Tumbler::from_parts(&[1, self.account_seq]);
        self.create_node_or_account(&account)
    }

    /// `CREATENODE_OR_ACCOUNT`: ensures a document/account node exists at
    /// `isa`, registering an empty orgl if one isn't already there. Returns
    /// `isa` unchanged either way (see `DESIGN.md` Open Question 6).
    pub fn create_node_or_account(&mut self, isa: &Tumbler) -> Tumbler {
        if !self.ensure_loaded(isa) {
            self.documents
                .insert(isa.clone(), Orgl::create(self.config.branching_factor, self.config.low_water_mark));
        }
        isa.clone()
    }

    /// `CREATENEWDOCUMENT`: allocates a document node under `account` and
    /// immediately opens its first version. For `account = 1.1`'s first
    /// document, the returned isa is `1.1.0.1.0.1`.
    pub fn create_new_document(&mut self, account: &Tumbler) -> Tumbler {
        let seq = self.doc_seq.entry(account.clone()).or_insert(0);
        *seq += 1;
        let doc_node = account.concat(&Tumbler::from_parts(&[0, *seq]));
        let version = doc_node.concat(&Tumbler::from_parts(&[0, 1]));

        self.version_seq.insert(doc_node, 1);
        self.documents
            .insert(version.clone(), Orgl::create(self.config.branching_factor, self.config.low_water_mark));
        log::debug!("created document {version}");
        version
    }

    fn make_new_version(
        documents: &mut FxHashMap<Tumbler, Orgl>,
        version_seq: &mut FxHashMap<Tumbler, u64>,
        branching_factor: usize,
        low_water_mark: usize,
        doc: &Tumbler,
    ) -> Tumbler {
        let doc_node = if doc.len() >= 2 { doc.truncate(doc.len() - 2) } else { doc.clone() };
        let seq = version_seq.entry(doc_node.clone()).or_insert(1);
        *seq += 1;
        let new_version = doc_node.concat(&Tumbler::from_parts(&[0, *seq]));

        let source = documents
            .get(doc)
            .cloned()
            .unwrap_or_else(|| Orgl::create(branching_factor, low_water_mark));
        documents.insert(new_version.clone(), source);
        log::debug!("created new version {new_version} from {doc}");
        new_version
    }

    /// `CREATENEWVERSION`: creates a new version of `doc`, cloning its orgl
    /// (so the new version's v-space starts out identical to the source's),
    /// and registers it in the bert table directly — `docreatenewversion`
    /// bypasses `checkforopen` since a freshly minted version can never
    /// conflict with an existing owner (see `DESIGN.md` Open Question 2).
    pub fn create_new_version(&mut self, connection: u64, doc: &Tumbler) -> Tumbler {
        self.ensure_loaded(doc);
        let new_version = Self::make_new_version(
            &mut self.documents,
            &mut self.version_seq,
            self.config.branching_factor,
            self.config.low_water_mark,
            doc,
        );
        self.bert.force_open(&new_version, connection, OpenAccess::Write, true);
        new_version
    }

    // -- Open table -------------------------------------------------------

    /// `doopen`: opens `doc` for `connection` under `mode`, possibly
    /// creating and opening a new version in its place.
    pub fn open_document(&mut self, connection: u64, doc: &Tumbler, access: OpenAccess, mode: OpenMode) -> (OpenOutcome, Tumbler) {
        self.ensure_loaded(doc);
        let account = self.session_accounts.get(&connection).cloned();
        let Self {
            bert,
            documents,
            version_seq,
            config,
            ..
        } = self;

        bert.open(doc, connection, access, mode, account.as_ref(), || {
            Self::make_new_version(documents, version_seq, config.branching_factor, config.low_water_mark, doc)
        })
    }

    /// `doclose`: closes `doc` for `connection`. If the version was created
    /// but never modified during this open, it's reclaimed (dropped from
    /// `documents`) rather than kept around as dead weight.
    pub fn close_document(&mut self, connection: u64, doc: &Tumbler) -> bool {
        let reclaim = self.bert.close(doc, connection);
        if reclaim {
            self.documents.remove(doc);
            log::debug!("reclaimed unmodified version {doc}");
        }
        reclaim
    }

    /// `XACCOUNT` (session half): remembers which account `connection` is
    /// acting as.
    pub fn set_session_account(&mut self, connection: u64, account: Tumbler) {
        self.session_accounts.insert(connection, account);
    }

    /// The account `connection` is currently acting as, if any.
    #[must_use]
    pub fn session_account(&self, connection: u64) -> Option<&Tumbler> {
        self.session_accounts.get(&connection)
    }

    // -- Paging -----------------------------------------------------------

    /// `fetchorgl`: ensures `doc`'s orgl is resident in `self.documents`,
    /// paging it in from `self.config.block_store`/`cache` if it was
    /// previously evicted. Returns `false` if `doc` is neither currently
    /// resident nor known to the block store.
    fn ensure_loaded(&mut self, doc: &Tumbler) -> bool {
        if self.documents.contains_key(doc) {
            return true;
        }

        let Some(&ptr) = self.doc_disk_ptr.get(doc) else {
            return false;
        };

        match crate::orgl::fetch_or_create(
            &self.config.cache,
            self.config.block_store.as_ref(),
            Some(ptr),
            self.config.branching_factor,
            self.config.low_water_mark,
        ) {
            Ok(orgl) => {
                self.documents.insert(doc.clone(), orgl);
                true
            }
            Err(err) => {
                log::error!("failed to page in {doc}: {err}");
                false
            }
        }
    }

    fn ensure_specset_loaded(&mut self, specset: &Specset) -> bool {
        specset.iter().all(|vspec| self.ensure_loaded(&vspec.docisa))
    }

    /// `reaporgl`: evicts `doc`'s orgl to the block store, freeing its
    /// in-core slot. Refuses (returns `false`) if `doc` is currently open by
    /// any connection, or isn't a known document.
    pub fn evict_document(&mut self, doc: &Tumbler) -> bool {
        if self.bert.is_open(doc) {
            return false;
        }

        let Some(orgl) = self.documents.get_mut(doc) else {
            return false;
        };

        match orgl.evict(&self.config.cache, self.config.block_store.as_ref()) {
            Ok(ptr) => {
                self.doc_disk_ptr.insert(doc.clone(), ptr);
                self.documents.remove(doc);
                log::debug!("evicted {doc} to block {ptr:?}");
                true
            }
            Err(err) => {
                log::error!("failed to evict {doc}: {err}");
                false
            }
        }
    }

    // -- Content mutation --------------------------------------------------

    /// `INSERT`: appends `text` to the shared permascroll and records that
    /// `doc`'s v-space at `vsa` now refers to it. Returns `false` if `doc`
    /// isn't a known document.
    pub fn insert(&mut self, connection: u64, doc: &Tumbler, vsa: &Tumbler, text: &[u8]) -> bool {
        if !self.ensure_loaded(doc) {
            return false;
        }

        let width = Tumbler::from_parts(&[text.len() as u64]);
        let ispan_start = self.gran.append_leaf(width.clone(), LeafInfo::GranText(Slice::new(text)));

        let orgl = self.documents.get_mut(doc).expect("checked above");
        orgl.insert_reference(vsa, width, ispan_start, doc.clone());
        self.bert.mark_modified(doc, connection);
        log::trace!("inserted {} bytes into {doc} at {vsa}", text.len());
        true
    }

    /// `COPY`: transcludes `specset` — regions of (possibly other)
    /// documents — into `doc` starting at `vsa`, one reference per
    /// overlapping permascroll run. Returns `false` if `doc` or any document
    /// named in `specset` is unknown.
    pub fn copy(&mut self, connection: u64, doc: &Tumbler, vsa: &Tumbler, specset: &Specset) -> bool {
        if !self.ensure_loaded(doc) {
            return false;
        }
        if !self.ensure_specset_loaded(specset) {
            return false;
        }

        let mut pieces = Vec::new();
        for vspec in specset {
            let source = self.documents.get(&vspec.docisa).expect("checked above");
            for vspan in &vspec.vspans {
                for (sub, ispan_start) in source.retrieve_in_vspan(&vspan.stream, &vspan.end()) {
                    let overlap_start = sub.stream.clone().max(vspan.stream.clone());
                    let overlap_end = sub.end().min(vspan.end());
                    if overlap_start >= overlap_end {
                        continue;
                    }
                    let offset = overlap_start.sub(&sub.stream);
                    let width = overlap_end.sub(&overlap_start);
                    pieces.push((width, ispan_start.add(&offset)));
                }
            }
        }

        let homedoc = doc.clone();
        let target = self.documents.get_mut(doc).expect("checked above");
        let mut cursor = vsa.clone();
        for (width, ispan_start) in pieces {
            target.insert_reference(&cursor, width.clone(), ispan_start, homedoc.clone());
            cursor = cursor.add(&width);
        }

        self.bert.mark_modified(doc, connection);
        true
    }

    /// `DELETEVSPAN`: removes `vspan` from `doc`'s v-space, compacting what
    /// follows. Returns `false` if `doc` is unknown or `vspan` runs past the
    /// document's current width.
    pub fn delete_vspan(&mut self, connection: u64, doc: &Tumbler, vspan: &Span) -> bool {
        if !self.ensure_loaded(doc) {
            return false;
        }
        let orgl = self.documents.get_mut(doc).expect("just ensured loaded");
        if !orgl.delete_vspan(vspan) {
            return false;
        }
        self.bert.mark_modified(doc, connection);
        true
    }

    /// `REARRANGE`: reorders the runs named by `cutseq` — `(source vspan,
    /// destination start)` pairs — within `doc`'s v-space.
    pub fn rearrange(&mut self, connection: u64, doc: &Tumbler, cutseq: &[(Span, Tumbler)]) -> bool {
        if !self.ensure_loaded(doc) {
            return false;
        }
        let orgl = self.documents.get_mut(doc).expect("just ensured loaded");
        if !orgl.rearrange(cutseq) {
            return false;
        }
        self.bert.mark_modified(doc, connection);
        true
    }

    // -- Retrieval ----------------------------------------------------------

    /// `RETRIEVEV`: reads back the permascroll bytes a specset refers to, in
    /// specset order. Returns `None` if any named document is unknown.
    #[must_use]
    pub fn retrieve_v(&mut self, specset: &Specset) -> Option<Vec<u8>> {
        if !self.ensure_specset_loaded(specset) {
            return None;
        }

        let ispans = crate::compare::specset_to_ispanset(
            |isa| {
                self.documents
                    .get(isa)
                    .cloned()
                    .unwrap_or_else(|| Orgl::create(self.config.branching_factor, self.config.low_water_mark))
            },
            specset,
        );

        let mut out = Vec::new();
        for ispan in ispans {
            for ctx in self.gran.retrieve_in_span(&ispan.stream, &ispan.end(), 0) {
                let LeafInfo::GranText(bytes) = ctx.info else {
                    continue;
                };
                let leaf_start = ctx.total_offset.clone();
                let leaf_end = leaf_start.add(&ctx.context_wid);
                let lo = ispan.stream.clone().max(leaf_start.clone());
                let hi = ispan.end().min(leaf_end);
                if lo >= hi {
                    continue;
                }
                let start_off = digit0_as_usize(&lo.sub(&leaf_start));
                let end_off = digit0_as_usize(&hi.sub(&leaf_start)).min(bytes.len());
                out.extend_from_slice(&bytes.as_ref()[start_off.min(end_off)..end_off]);
            }
        }

        Some(out)
    }

    /// `RETRIEVEDOCVSPAN`: the whole-document vspan, `[1.1, 1.1 + width)`.
    #[must_use]
    pub fn retrieve_doc_vspan(&mut self, doc: &Tumbler) -> Option<Span> {
        if !self.ensure_loaded(doc) {
            return None;
        }
        let orgl = self.documents.get(doc)?;
        let start = Tumbler::from_digits(false, vec![1, 1]);
        Some(Span::new(start, orgl.document_width()))
    }

    /// `RETRIEVEDOCVSPANSET`: every v-span currently recorded for `doc`.
    #[must_use]
    pub fn retrieve_doc_vspanset(&mut self, doc: &Tumbler) -> Option<Vec<Span>> {
        if !self.ensure_loaded(doc) {
            return None;
        }
        let orgl = self.documents.get(doc)?;
        Some(orgl.all_vspans())
    }

    /// `RETRIEVEENDSETS`: the `(from, to, three)` specsets of the link at
    /// `link_isa`, or `None` if no such link is registered.
    #[must_use]
    pub fn retrieve_end_sets(&self, link_isa: &Tumbler) -> Option<(Specset, Specset, Specset)> {
        let link = self.links.find_by_isa(link_isa)?;
        Some((
            crate::link::follow_link(link, LinkEnd::From),
            crate::link::follow_link(link, LinkEnd::To),
            crate::link::follow_link(link, LinkEnd::Three),
        ))
    }

    // -- Links --------------------------------------------------------------

    /// `CREATELINK`: allocates a link under `doc`, registers it, and returns
    /// its isa.
    pub fn create_link(&mut self, doc: &Tumbler, from: &Specset, to: &Specset, three: &Specset) -> Tumbler {
        let seq = self.link_seq.entry(doc.clone()).or_insert(0);
        *seq += 1;
        let link_isa = doc.concat(&Tumbler::from_parts(&[0, *seq]));

        self.documents
            .entry(link_isa.clone())
            .or_insert_with(|| Orgl::create(self.config.branching_factor, self.config.low_water_mark));

        let link = crate::link::make_link(link_isa.clone(), from, to, three);
        self.links.register(link);
        log::debug!("created link {link_isa}");
        link_isa
    }

    /// `FOLLOWLINK`: reads one end-set of the link at `link_isa`.
    #[must_use]
    pub fn follow_link(&self, link_isa: &Tumbler, which: LinkEnd) -> Option<Specset> {
        let link = self.links.find_by_isa(link_isa)?;
        Some(crate::link::follow_link(link, which))
    }

    /// `FINDLINKSFROMTOTHREE`: every registered link isa matching the query.
    #[must_use]
    pub fn find_links_from_to_three(&self, from: Option<&Specset>, to: Option<&Specset>, three: Option<&Specset>) -> Vec<Tumbler> {
        self.links
            .find_from_to_three(from, to, three)
            .into_iter()
            .map(|link: &Link| link.isa.clone())
            .collect()
    }

    /// `FINDNUMOFLINKSFROMTOTHREE`: count variant.
    #[must_use]
    pub fn find_num_of_links_from_to_three(&self, from: Option<&Specset>, to: Option<&Specset>, three: Option<&Specset>) -> usize {
        self.links.count_from_to_three(from, to, three)
    }

    /// `FINDNEXTNLINKSFROMTOTHREE`: paginated continuation of
    /// [`Engine::find_links_from_to_three`], resuming after `after` (the
    /// last link isa already returned to the caller) and returning up to
    /// `n` further matches.
    #[must_use]
    pub fn find_next_n_links_from_to_three(
        &self,
        from: Option<&Specset>,
        to: Option<&Specset>,
        three: Option<&Specset>,
        after: Option<&Tumbler>,
        n: usize,
    ) -> Vec<Tumbler> {
        self.links
            .find_next_n_from_to_three(from, to, three, after, n)
            .into_iter()
            .map(|link: &Link| link.isa.clone())
            .collect()
    }

    /// `FINDDOCSCONTAINING`: links whose `from` end-set touches `specset`.
    #[must_use]
    pub fn find_docs_containing(&self, specset: &Specset) -> Vec<Tumbler> {
        self.links.find_docs_containing(specset).into_iter().map(|l| l.isa.clone()).collect()
    }

    // -- Version comparison ---------------------------------------------

    /// `SHOWRELATIONOF2VERSIONS`: compares two versions' text content.
    #[must_use]
    pub fn show_relation_of_2_versions(&mut self, v1: &Specset, v2: &Specset) -> SpanPairSet {
        self.ensure_specset_loaded(v1);
        self.ensure_specset_loaded(v2);
        crate::compare::show_relation_of_2_versions(
            |isa| {
                self.documents
                    .get(isa)
                    .cloned()
                    .unwrap_or_else(|| Orgl::create(self.config.branching_factor, self.config.low_water_mark))
            },
            v1,
            v2,
        )
    }

    // -- Introspection -----------------------------------------------------

    /// `DUMPSTATE`: a snapshot of the engine's current tables.
    #[must_use]
    pub fn dump_state(&self) -> DumpState {
        DumpState {
            gran_width: self.gran.total_width(0),
            gran_node_count: self.gran.arena_len(),
            documents: self
                .documents
                .iter()
                .map(|(isa, orgl)| (isa.clone(), orgl.document_width()))
                .collect(),
            link_count: self.links.len(),
        }
    }
}

fn digit0_as_usize(t: &Tumbler) -> usize {
    usize::try_from(t.digit(0)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Vspec;
    use test_log::test;

    fn engine() -> Engine {
        Config::default().open()
    }

    #[test]
    fn account_and_document_addressing_matches_the_scheme() {
        let mut engine = engine();
        let account = engine.create_account();
        assert_eq!(Tumbler::from_parts(&[1, 1]), account);

        let doc = engine.create_new_document(&account);
        assert_eq!(Tumbler::from_parts(&[1, 1, 0, 1, 0, 1]), doc);
    }

    #[test]
    fn insert_then_retrieve_v_roundtrips() {
        let mut engine = engine();
        let account = engine.create_account();
        let doc = engine.create_new_document(&account);

        assert!(engine.insert(1, &doc, &Tumbler::from_digits(false, vec![1, 1]), b"hello"));

        let specset: Specset = vec![Vspec::new(doc.clone(), vec![Span::new(Tumbler::from_digits(false, vec![1, 1]), Tumbler::from_parts(&[5]))])];
        assert_eq!(Some(b"hello".to_vec()), engine.retrieve_v(&specset));
    }

    #[test]
    fn delete_vspan_compacts_v_space() {
        let mut engine = engine();
        let account = engine.create_account();
        let doc = engine.create_new_document(&account);
        engine.insert(1, &doc, &Tumbler::from_digits(false, vec![1, 1]), b"abcdef");

        let vspan = Span::new(Tumbler::from_digits(false, vec![1, 3]), Tumbler::from_parts(&[2]));
        assert!(engine.delete_vspan(1, &doc, &vspan));

        let whole = engine.retrieve_doc_vspan(&doc).expect("document exists");
        assert_eq!(Tumbler::from_parts(&[4]), whole.width);
    }

    #[test]
    fn create_new_version_starts_with_an_identical_orgl() {
        let mut engine = engine();
        let account = engine.create_account();
        let doc = engine.create_new_document(&account);
        engine.insert(1, &doc, &Tumbler::from_digits(false, vec![1, 1]), b"hello world");

        let new_doc = engine.create_new_version(2, &doc);
        assert_ne!(doc, new_doc);

        let specset_a: Specset = vec![Vspec::new(doc.clone(), vec![Span::new(Tumbler::from_digits(false, vec![1, 1]), Tumbler::from_parts(&[11]))])];
        let specset_b: Specset = vec![Vspec::new(new_doc.clone(), vec![Span::new(Tumbler::from_digits(false, vec![1, 1]), Tumbler::from_parts(&[11]))])];

        let pairs = engine.show_relation_of_2_versions(&specset_a, &specset_b);
        assert_eq!(1, pairs.len());
        assert_eq!(Tumbler::from_parts(&[11]), pairs[0].width);
    }

    #[test]
    fn create_link_and_follow_it_back() {
        let mut engine = engine();
        let account = engine.create_account();
        let doc = engine.create_new_document(&account);
        engine.insert(1, &doc, &Tumbler::from_digits(false, vec![1, 1]), b"hello");

        let from: Specset = vec![Vspec::new(doc.clone(), vec![Span::new(Tumbler::from_digits(false, vec![1, 1]), Tumbler::from_parts(&[5]))])];
        let to: Specset = Vec::new();
        let three: Specset = Vec::new();

        let link_isa = engine.create_link(&doc, &from, &to, &three);
        assert_eq!(from, engine.follow_link(&link_isa, LinkEnd::From).expect("link exists"));
        assert_eq!(vec![link_isa.clone()], engine.find_docs_containing(&from));
    }

    #[test]
    fn open_document_in_only_mode_refuses_a_second_writer() {
        let mut engine = engine();
        let account = engine.create_account();
        let doc = engine.create_new_document(&account);

        engine.open_document(1, &doc, OpenAccess::Write, OpenMode::Only);
        let (outcome, isa) = engine.open_document(2, &doc, OpenAccess::Write, OpenMode::Only);
        assert_eq!(OpenOutcome::Refused, outcome);
        assert_eq!(doc, isa);
    }

    #[test]
    fn open_document_in_copyif_mode_creates_a_new_version() {
        let mut engine = engine();
        let account = engine.create_account();
        let doc = engine.create_new_document(&account);
        engine.insert(1, &doc, &Tumbler::from_digits(false, vec![1, 1]), b"hi");

        engine.open_document(1, &doc, OpenAccess::Write, OpenMode::CopyIf);
        let (outcome, new_doc) = engine.open_document(2, &doc, OpenAccess::Write, OpenMode::CopyIf);
        assert_eq!(OpenOutcome::OpenedNewVersion, outcome);
        assert_ne!(doc, new_doc);

        assert_eq!(Some(b"hi".to_vec()), engine.retrieve_v(&vec![Vspec::new(new_doc, vec![Span::new(Tumbler::from_digits(false, vec![1, 1]), Tumbler::from_parts(&[2]))])]));
    }

    #[test]
    fn write_only_open_is_refused_for_an_unowned_document_once_the_session_account_is_known() {
        let mut engine = engine();
        let account = engine.create_account();
        let doc = engine.create_new_document(&account);

        let other_account = engine.create_account();
        engine.set_session_account(2, other_account);

        let (outcome, isa) = engine.open_document(2, &doc, OpenAccess::Write, OpenMode::Only);
        assert_eq!(OpenOutcome::Refused, outcome);
        assert_eq!(doc, isa);
    }

    #[test]
    fn write_only_open_succeeds_once_the_session_account_matches() {
        let mut engine = engine();
        let account = engine.create_account();
        let doc = engine.create_new_document(&account);

        engine.set_session_account(1, account);

        let (outcome, isa) = engine.open_document(1, &doc, OpenAccess::Write, OpenMode::Only);
        assert_eq!(OpenOutcome::OpenedExisting, outcome);
        assert_eq!(doc, isa);
    }

    #[test]
    fn dump_state_reports_known_documents() {
        let mut engine = engine();
        let account = engine.create_account();
        let doc = engine.create_new_document(&account);
        engine.insert(1, &doc, &Tumbler::from_digits(false, vec![1, 1]), b"x");

        let dump = engine.dump_state();
        assert_eq!(Tumbler::from_parts(&[1]), dump.gran_width);
        assert!(dump.documents.iter().any(|(isa, width)| *isa == doc && *width == Tumbler::from_parts(&[1])));
    }

    #[test]
    fn evicted_document_round_trips_through_the_block_store() {
        let mut engine = engine();
        let account = engine.create_account();
        let doc = engine.create_new_document(&account);
        engine.insert(1, &doc, &Tumbler::from_digits(false, vec![1, 1]), b"hello");

        assert!(engine.evict_document(&doc));
        assert!(!engine.documents.contains_key(&doc));

        let specset: Specset = vec![Vspec::new(doc.clone(), vec![Span::new(Tumbler::from_digits(false, vec![1, 1]), Tumbler::from_parts(&[5]))])];
        assert_eq!(Some(b"hello".to_vec()), engine.retrieve_v(&specset));
        assert!(engine.documents.contains_key(&doc));
    }

    #[test]
    fn an_open_document_cannot_be_evicted() {
        let mut engine = engine();
        let account = engine.create_account();
        let doc = engine.create_new_document(&account);

        engine.open_document(1, &doc, OpenAccess::Read, OpenMode::Only);
        assert!(!engine.evict_document(&doc));
    }
}
