// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A storage and version-control engine for a hypertext server, descended
//! from the original Xanadu/Udanax backend.
//!
//! ##### About
//!
//! Text is never edited in place: every byte ever inserted stays in a
//! single, append-only, global text space (the *permascroll*, [`enfilade`]'s
//! GRAN realization). A document's current content is a *version space*
//! (its [`orgl`]) that maps its own address range onto runs of the
//! permascroll, so copying, rearranging, or deleting parts of a document
//! only ever rewrites that mapping — the underlying bytes are untouched and
//! every past version remains reachable through whichever version spaces
//! still reference it.
//!
//! Addresses (isas, v-addresses, permascroll offsets) are all
//! [`Tumbler`](tumbler::Tumbler)s: variable-precision signed digit vectors,
//! the one addressing scheme used throughout. [`compare`] builds on top of
//! [`span_algebra`] to compare two versions' shared text; [`link`] builds a
//! separate cross-document index of links over the same address space.
//! [`Engine`] wires the permascroll, per-document version spaces, the open
//! table ([`bert`]), and the link registry together; [`dispatcher`] exposes
//! them over the [`wire`] grammar.
//!
//! # Example usage
//!
//! ```
//! use enfilade_tree::{Config, Engine};
//! use enfilade_tree::tumbler::Tumbler;
//! use enfilade_tree::item::{Span, Vspec};
//!
//! let mut engine: Engine = Config::default().open();
//!
//! let account = engine.create_account();
//! let doc = engine.create_new_document(&account);
//!
//! let vsa = Tumbler::from_digits(false, vec![1, 1]);
//! engine.insert(/* connection */ 1, &doc, &vsa, b"hello, xanadu");
//!
//! let specset = vec![Vspec::new(doc, vec![Span::new(vsa, Tumbler::from_parts(&[13]))])];
//! assert_eq!(Some(b"hello, xanadu".to_vec()), engine.retrieve_v(&specset));
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

pub mod arena;
mod bert;
mod binary_search;
mod block_store;
mod cache;
pub mod coding;
mod compare;
mod config;
mod dispatcher;

pub mod enfilade;

mod engine;
mod error;
mod hash;

pub mod item;

mod link;
pub mod orgl;
mod path;
mod slice;
pub mod span_algebra;

#[doc(hidden)]
pub mod stop_signal;

mod time;

pub mod tumbler;

mod version;

pub mod wire;

pub use {
    bert::{OpenAccess, OpenMode, OpenOutcome},
    block_store::{BlockId, BlockStore, MemBlockStore},
    cache::PageCache,
    config::{Config, DEFAULT_BRANCHING_FACTOR, DEFAULT_LOW_WATER_MARK},
    dispatcher::Dispatcher,
    engine::{DumpState, Engine},
    error::{gerror, Error, Result},
    link::LinkRegistry,
    slice::Slice,
    stop_signal::StopSignal,
    version::FormatVersion,
};
