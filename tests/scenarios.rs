// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use enfilade_tree::item::{Span, Vspec};
use enfilade_tree::tumbler::Tumbler;
use enfilade_tree::{Config, OpenAccess, OpenMode, OpenOutcome};
use test_log::test;

fn tb(d: &[i64]) -> Tumbler {
    Tumbler::from_digits(false, d.to_vec())
}

fn vaddr(position: i64) -> Tumbler {
    tb(&[1, position])
}

fn spec1(doc: Tumbler, position: i64, width: i64) -> Vec<Vspec> {
    vec![Vspec::new(doc, vec![Span::new(vaddr(position), tb(&[width]))])]
}

#[test]
fn scenario_1_account_document_insert_retrieve() {
    let mut engine = Config::default().open();

    let account = engine.create_account();
    assert_eq!(tb(&[1, 1]), account);

    let doc = engine.create_new_document(&account);
    assert_eq!(tb(&[1, 1, 0, 1, 0, 1]), doc);

    assert!(engine.insert(1, &doc, &vaddr(1), b"hello"));

    let whole_doc = spec1(doc.clone(), 1, 5);
    assert_eq!(Some(b"hello".to_vec()), engine.retrieve_v(&whole_doc));
}

#[test]
fn scenario_2_delete_vspan_compacts() {
    let mut engine = Config::default().open();
    let account = engine.create_account();
    let doc = engine.create_new_document(&account);

    assert!(engine.insert(1, &doc, &vaddr(1), b"abcdef"));
    assert!(engine.delete_vspan(1, &doc, &Span::new(vaddr(3), tb(&[2]))));

    assert_eq!(Some(b"abef".to_vec()), engine.retrieve_v(&spec1(doc, 1, 4)));
}

#[test]
fn scenario_3_compare_unmodified_new_version() {
    let mut engine = Config::default().open();
    let account = engine.create_account();
    let doc = engine.create_new_document(&account);
    engine.insert(1, &doc, &vaddr(1), b"hello world");

    let new_doc = engine.create_new_version(2, &doc);

    let pairs = engine.show_relation_of_2_versions(&spec1(doc, 1, 11), &spec1(new_doc, 1, 11));
    assert_eq!(1, pairs.len());
    assert_eq!(vaddr(1), pairs[0].stream1);
    assert_eq!(vaddr(1), pairs[0].stream2);
    assert_eq!(tb(&[11]), pairs[0].width);
}

#[test]
fn scenario_4_insert_in_the_middle_of_a_copy_splits_the_span_pairs() {
    let mut engine = Config::default().open();
    let account = engine.create_account();

    let doc_d = engine.create_new_document(&account);
    engine.insert(1, &doc_d, &vaddr(1), b"AB");

    let doc_d2 = engine.create_new_document(&account);
    engine.copy(1, &doc_d2, &vaddr(1), &spec1(doc_d.clone(), 1, 2));
    // Insert "X" between A and B: shifts B from 1.2 to 1.3 in D'.
    engine.insert(1, &doc_d2, &vaddr(2), b"X");

    let pairs = engine.show_relation_of_2_versions(&spec1(doc_d.clone(), 1, 2), &spec1(doc_d2.clone(), 1, 3));

    assert_eq!(2, pairs.len());
    assert_eq!(vaddr(1), pairs[0].stream1);
    assert_eq!(vaddr(1), pairs[0].stream2);
    assert_eq!(tb(&[1]), pairs[0].width);
    assert_eq!(vaddr(2), pairs[1].stream1);
    assert_eq!(vaddr(3), pairs[1].stream2);
    assert_eq!(tb(&[1]), pairs[1].width);
}

#[test]
fn scenario_5_create_link_and_query_by_from_end() {
    let mut engine = Config::default().open();
    let account = engine.create_account();
    let doc = engine.create_new_document(&account);
    engine.insert(1, &doc, &vaddr(1), b"hello world");

    let from = spec1(doc.clone(), 1, 1);
    let to = spec1(doc.clone(), 3, 1);
    let three = Vec::new();

    let link = engine.create_link(&doc, &from, &to, &three);

    assert_eq!(from, engine.follow_link(&link, enfilade_tree::item::LinkEnd::From).unwrap());
    assert_eq!(to, engine.follow_link(&link, enfilade_tree::item::LinkEnd::To).unwrap());

    let hits = engine.find_links_from_to_three(Some(&from), None, None);
    assert_eq!(vec![link], hits);
}

#[test]
fn scenario_6_second_writer_in_only_mode_is_refused() {
    let mut engine = Config::default().open();
    let account = engine.create_account();
    let doc = engine.create_new_document(&account);

    let (outcome1, _) = engine.open_document(1, &doc, OpenAccess::Write, OpenMode::Only);
    assert_eq!(OpenOutcome::OpenedExisting, outcome1);

    let (outcome2, _) = engine.open_document(2, &doc, OpenAccess::Read, OpenMode::Only);
    assert_eq!(OpenOutcome::Refused, outcome2);
}

#[test]
fn boundary_empty_document_has_an_empty_vspanset() {
    let mut engine = Config::default().open();
    let account = engine.create_account();
    let doc = engine.create_new_document(&account);

    assert_eq!(Some(Vec::new()), engine.retrieve_doc_vspanset(&doc));
}

#[test]
fn boundary_comparing_disjoint_versions_yields_no_span_pairs() {
    let mut engine = Config::default().open();
    let account = engine.create_account();

    let doc_a = engine.create_new_document(&account);
    engine.insert(1, &doc_a, &vaddr(1), b"alpha");

    let doc_b = engine.create_new_document(&account);
    engine.insert(1, &doc_b, &vaddr(1), b"beta!");

    let pairs = engine.show_relation_of_2_versions(&spec1(doc_a, 1, 5), &spec1(doc_b, 1, 5));
    assert!(pairs.is_empty());
}
