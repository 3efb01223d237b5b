// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The enfilade: a generic labelled tree shared by all three tree types
//! named in the data model (GRAN, SPAN, POOM).
//!
//! Grounded on the struct layout implied throughout `backend/tumble.c` and
//! `backend/correspond.c`, and on `backend/granf2.c` for paging. Nodes are
//! arena-allocated with stable [`NodeId`]s rather than raw pointers
//! (Design Notes §9: "model as arena allocation and stable node IDs for
//! every pointer edge").

pub mod context;
pub mod node;
pub mod tree;

pub use context::RetrievalContext;
pub use node::{EnfiladeType, LeafInfo, Node, NodeId};
pub use tree::EnfiladeTree;
