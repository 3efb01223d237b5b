// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The open table ("bert"): per-connection ownership state for documents.
//!
//! Grounded on `green/be_source/bert.c` in full: `checkforopen`,
//! `doopen`/`doclose`, and `hashoftumbler` (realized here with
//! [`crate::hash::hash64`] plus an `FxHashMap` instead of a fixed-size
//! hash-chained C array — the bucket count was a memory-layout concern that
//! doesn't apply to a `HashMap`), including `checkforopen`'s
//! `isthisusersdocument` ownership gate (here `Tumbler::account_eq` against
//! the requesting connection's session account).

use crate::tumbler::Tumbler;
use rustc_hash::FxHashMap;

/// Whether a document was opened for reading or writing.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OpenAccess {
    /// Read access.
    Read,
    /// Write access.
    Write,
}

/// `doopen`'s three modes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OpenMode {
    /// Open the document if it can be opened cleanly; otherwise copy a new
    /// version and open that instead.
    CopyIf,
    /// Open only if no conflicting owner exists; refuse rather than copy.
    Only,
    /// Always copy a new version and open that.
    Copy,
}

/// The outcome of a `doopen` call.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpenOutcome {
    /// Opened `doc` itself.
    OpenedExisting,
    /// `doc` could not be opened as requested.
    Refused,
    /// A new version was created and opened in `doc`'s place.
    OpenedNewVersion,
}

#[derive(Clone, Debug)]
struct Entry {
    connection: u64,
    access: OpenAccess,
    created: bool,
    modified: bool,
    count: u32,
    opened_at: std::time::Duration,
}

/// Per-connection, per-document open/lock/ownership table.
#[derive(Default)]
pub struct BertTable {
    // Keyed by `hashoftumbler(docisa)`; entries for the same key are kept in
    // a small Vec rather than a linked chain of `conscell`s.
    table: FxHashMap<u64, Vec<(Tumbler, Entry)>>,
}

impl BertTable {
    /// Creates an empty open table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `hashoftumbler`: buckets a document isa for the open table.
    #[must_use]
    pub fn hash_of_tumbler(docisa: &Tumbler) -> u64 {
        crate::hash::hash64(docisa.to_string().as_bytes())
    }

    fn bucket(&self, docisa: &Tumbler) -> &[(Tumbler, Entry)] {
        self.table
            .get(&Self::hash_of_tumbler(docisa))
            .map_or(&[][..], Vec::as_slice)
    }

    fn any_owner(&self, docisa: &Tumbler) -> Option<&Entry> {
        self.bucket(docisa).iter().find(|(isa, _)| isa == docisa).map(|(_, e)| e)
    }

    /// `checkforopen`: classifies whether `connection` may `access` `docisa`
    /// given the current table state and who `account` (the requester's
    /// session account, if known) is.
    ///
    /// When nobody currently has `docisa` open, `checkforopen` still
    /// distinguishes two cases the original gates on `isthisusersdocument`:
    /// whether `account` owns `docisa` (shares its account prefix,
    /// [`Tumbler::account_eq`]) or not. A `None` account (no session account
    /// on record for this connection) is treated as owned, matching the
    /// original's behavior before any `XACCOUNT` has run.
    fn check_for_open(&self, docisa: &Tumbler, connection: u64, account: Option<&Tumbler>) -> CheckResult {
        let Some(owner) = self.any_owner(docisa) else {
            return if account.is_none_or(|acct| docisa.account_eq(acct)) {
                CheckResult::NotOpenOwned
            } else {
                CheckResult::NotOpenUnowned
            };
        };

        if owner.connection == connection {
            return CheckResult::OwnedBySelf;
        }

        match owner.access {
            OpenAccess::Read => CheckResult::OpenForReadByOther,
            OpenAccess::Write => CheckResult::OpenForWriteByOther,
        }
    }

    /// `doopen`: the full `COPYIF`/`ONLY`/`COPY` truth table from
    /// `bert.c`. `create_new_version` is called back into when a copy is
    /// needed; it must return the fresh isa. `account` is the requesting
    /// connection's session account, threaded through to `checkforopen`'s
    /// `isthisusersdocument` ownership gate: a `write` open of a document
    /// nobody currently owns is refused (`ONLY`) or copy-new'd (`COPYIF`)
    /// unless `account` owns it.
    pub fn open<F>(
        &mut self,
        docisa: &Tumbler,
        connection: u64,
        access: OpenAccess,
        mode: OpenMode,
        account: Option<&Tumbler>,
        create_new_version: F,
    ) -> (OpenOutcome, Tumbler)
    where
        F: FnOnce() -> Tumbler,
    {
        if matches!(mode, OpenMode::Copy) {
            let new_doc = create_new_version();
            self.force_open(&new_doc, connection, access, true);
            return (OpenOutcome::OpenedNewVersion, new_doc);
        }

        let check = self.check_for_open(docisa, connection, account);

        let would_conflict = matches!(
            (check, access),
            (CheckResult::OpenForWriteByOther, _)
                | (CheckResult::OpenForReadByOther, OpenAccess::Write)
                | (CheckResult::NotOpenUnowned, OpenAccess::Write)
        );

        if !would_conflict {
            self.add_entry(docisa.clone(), connection, access, false);
            return (OpenOutcome::OpenedExisting, docisa.clone());
        }

        match mode {
            OpenMode::Only => (OpenOutcome::Refused, docisa.clone()),
            OpenMode::CopyIf => {
                let new_doc = create_new_version();
                self.force_open(&new_doc, connection, access, true);
                (OpenOutcome::OpenedNewVersion, new_doc)
            }
            OpenMode::Copy => unreachable!("handled above"),
        }
    }

    /// Adds an entry directly, bypassing `checkforopen` — the escape hatch
    /// `docreatenewversion` uses, since a freshly created version can never
    /// conflict with an existing owner.
    pub fn force_open(&mut self, docisa: &Tumbler, connection: u64, access: OpenAccess, created: bool) {
        self.add_entry(docisa.clone(), connection, access, created);
    }

    fn add_entry(&mut self, docisa: Tumbler, connection: u64, access: OpenAccess, created: bool) {
        let key = Self::hash_of_tumbler(&docisa);
        let bucket = self.table.entry(key).or_default();

        if let Some((_, e)) = bucket.iter_mut().find(|(isa, e)| *isa == docisa && e.connection == connection) {
            e.count += 1;
            return;
        }

        bucket.push((
            docisa,
            Entry {
                connection,
                access,
                created,
                modified: false,
                count: 1,
                opened_at: crate::time::unix_timestamp(),
            },
        ));
    }

    /// How long `docisa` has been continuously open for `connection`, or
    /// `None` if it isn't currently open by them. Grounded on the crum
    /// `age` field `granf2.c` tracks for page-replacement heuristics,
    /// repurposed here as a diagnostic for stuck opens.
    #[must_use]
    pub fn age_of(&self, docisa: &Tumbler, connection: u64) -> Option<std::time::Duration> {
        let key = Self::hash_of_tumbler(docisa);
        let (_, entry) = self
            .table
            .get(&key)?
            .iter()
            .find(|(isa, e)| isa == docisa && e.connection == connection)?;
        Some(crate::time::unix_timestamp().saturating_sub(entry.opened_at))
    }

    /// Marks a document as modified by `connection` while open, so a later
    /// close knows whether to reclaim it.
    pub fn mark_modified(&mut self, docisa: &Tumbler, connection: u64) {
        let key = Self::hash_of_tumbler(docisa);
        if let Some(bucket) = self.table.get_mut(&key) {
            if let Some((_, e)) = bucket.iter_mut().find(|(isa, e)| isa == docisa && e.connection == connection) {
                e.modified = true;
            }
        }
    }

    /// `doclose`: decrements the entry's open count; at zero, reclaims the
    /// document if it was created but never modified (`created && !modified`).
    #[must_use]
    pub fn close(&mut self, docisa: &Tumbler, connection: u64) -> bool {
        let key = Self::hash_of_tumbler(docisa);
        let Some(bucket) = self.table.get_mut(&key) else {
            return false;
        };

        let Some(idx) = bucket.iter().position(|(isa, e)| isa == docisa && e.connection == connection) else {
            return false;
        };

        bucket[idx].1.count -= 1;
        if bucket[idx].1.count > 0 {
            return false;
        }

        let (_, entry) = bucket.remove(idx);
        entry.created && !entry.modified
    }

    /// `true` if `docisa` currently has any open entries at all.
    #[must_use]
    pub fn is_open(&self, docisa: &Tumbler) -> bool {
        self.any_owner(docisa).is_some()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum CheckResult {
    /// Not currently open by anyone, and the requester owns it.
    NotOpenOwned,
    /// Not currently open by anyone, but the requester does not own it.
    NotOpenUnowned,
    OwnedBySelf,
    OpenForReadByOther,
    OpenForWriteByOther,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn tb(d: &[i64]) -> Tumbler {
        Tumbler::from_digits(false, d.to_vec())
    }

    #[test]
    fn fresh_document_opens_without_conflict() {
        let mut bert = BertTable::new();
        let doc = tb(&[1, 1, 0, 1]);
        let (outcome, isa) = bert.open(&doc, 1, OpenAccess::Read, OpenMode::CopyIf, None, || tb(&[9, 9]));
        assert_eq!(OpenOutcome::OpenedExisting, outcome);
        assert_eq!(doc, isa);
    }

    #[test]
    fn second_writer_in_only_mode_is_refused() {
        let mut bert = BertTable::new();
        let doc = tb(&[1, 1, 0, 1]);
        bert.open(&doc, 1, OpenAccess::Write, OpenMode::Only, None, || unreachable!());

        let (outcome, _) = bert.open(&doc, 2, OpenAccess::Read, OpenMode::Only, None, || unreachable!());
        assert_eq!(OpenOutcome::Refused, outcome);
    }

    #[test]
    fn second_writer_in_copyif_mode_gets_new_version() {
        let mut bert = BertTable::new();
        let doc = tb(&[1, 1, 0, 1]);
        bert.open(&doc, 1, OpenAccess::Write, OpenMode::CopyIf, None, || unreachable!());

        let (outcome, isa) = bert.open(&doc, 2, OpenAccess::Write, OpenMode::CopyIf, None, || tb(&[1, 1, 0, 2]));
        assert_eq!(OpenOutcome::OpenedNewVersion, outcome);
        assert_eq!(tb(&[1, 1, 0, 2]), isa);
    }

    #[test]
    fn copy_mode_always_creates_new_version() {
        let mut bert = BertTable::new();
        let doc = tb(&[1, 1, 0, 1]);
        let (outcome, isa) = bert.open(&doc, 1, OpenAccess::Read, OpenMode::Copy, None, || tb(&[1, 1, 0, 2]));
        assert_eq!(OpenOutcome::OpenedNewVersion, outcome);
        assert_eq!(tb(&[1, 1, 0, 2]), isa);
    }

    #[test]
    fn unowned_document_write_only_is_refused() {
        let mut bert = BertTable::new();
        let doc = tb(&[1, 1, 0, 1]);
        let other_account = tb(&[2, 2]);
        let (outcome, isa) = bert.open(&doc, 1, OpenAccess::Write, OpenMode::Only, Some(&other_account), || unreachable!());
        assert_eq!(OpenOutcome::Refused, outcome);
        assert_eq!(doc, isa);
    }

    #[test]
    fn unowned_document_write_copyif_copies_a_new_version() {
        let mut bert = BertTable::new();
        let doc = tb(&[1, 1, 0, 1]);
        let other_account = tb(&[2, 2]);
        let (outcome, isa) = bert.open(&doc, 1, OpenAccess::Write, OpenMode::CopyIf, Some(&other_account), || tb(&[9, 9]));
        assert_eq!(OpenOutcome::OpenedNewVersion, outcome);
        assert_eq!(tb(&[9, 9]), isa);
    }

    #[test]
    fn owned_document_write_only_is_allowed() {
        let mut bert = BertTable::new();
        let doc = tb(&[1, 1, 0, 1]);
        let (outcome, isa) = bert.open(&doc, 1, OpenAccess::Write, OpenMode::Only, Some(&doc), || unreachable!());
        assert_eq!(OpenOutcome::OpenedExisting, outcome);
        assert_eq!(doc, isa);
    }

    #[test]
    fn read_access_never_requires_ownership() {
        let mut bert = BertTable::new();
        let doc = tb(&[1, 1, 0, 1]);
        let other_account = tb(&[2, 2]);
        let (outcome, _) = bert.open(&doc, 1, OpenAccess::Read, OpenMode::Only, Some(&other_account), || unreachable!());
        assert_eq!(OpenOutcome::OpenedExisting, outcome);
    }

    #[test]
    fn close_reclaims_unmodified_created_version() {
        let mut bert = BertTable::new();
        let doc = tb(&[1, 1, 0, 2]);
        bert.force_open(&doc, 1, OpenAccess::Write, true);
        assert!(bert.close(&doc, 1));
        assert!(!bert.is_open(&doc));
    }

    #[test]
    fn close_keeps_modified_created_version() {
        let mut bert = BertTable::new();
        let doc = tb(&[1, 1, 0, 2]);
        bert.force_open(&doc, 1, OpenAccess::Write, true);
        bert.mark_modified(&doc, 1);
        assert!(!bert.close(&doc, 1));
    }

    #[test]
    fn age_of_is_none_for_an_unopened_document() {
        let bert = BertTable::new();
        assert!(bert.age_of(&tb(&[1, 1, 0, 2]), 1).is_none());
    }

    #[test]
    fn age_of_grows_while_a_document_stays_open() {
        crate::time::set_unix_timestamp_for_test(Some(std::time::Duration::from_secs(100)));
        let mut bert = BertTable::new();
        let doc = tb(&[1, 1, 0, 2]);
        bert.force_open(&doc, 1, OpenAccess::Write, true);

        crate::time::set_unix_timestamp_for_test(Some(std::time::Duration::from_secs(130)));
        assert_eq!(Some(std::time::Duration::from_secs(30)), bert.age_of(&doc, 1));

        crate::time::set_unix_timestamp_for_test(None);
    }
}
