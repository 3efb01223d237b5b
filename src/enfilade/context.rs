// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Retrieval context: the trail of ancestor state carried while walking
//! down an enfilade tree.

use crate::enfilade::node::{LeafInfo, NodeId};
use crate::tumbler::Tumbler;

/// Where a retrieval landed relative to the node it found.
///
/// `retrieve` reports exact boundary hits distinctly from "inside a leaf",
/// since inserts need to tell the two apart (SPEC_FULL §4.2).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BorderPosition {
    /// The address landed strictly inside the leaf's span.
    Inside,
    /// The address landed exactly on the leaf's left border.
    OnLeftBorder,
    /// The address landed exactly on the leaf's right border.
    OnRightBorder,
}

/// The result of walking an enfilade to a particular address: the bottom
/// crum reached, its width, its leaf payload, and the accumulated offset
/// from the tree's base to that crum.
#[derive(Clone, Debug)]
pub struct RetrievalContext {
    /// The bottom crum reached.
    pub node: NodeId,
    /// The reached leaf's width on the queried axis.
    pub context_wid: Tumbler,
    /// The reached leaf's payload.
    pub info: LeafInfo,
    /// Accumulated offset from the tree's base to this leaf's start.
    pub total_offset: Tumbler,
    /// Where the query address landed relative to this leaf's span.
    pub border: BorderPosition,
}
