// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Node and leaf types stored in an enfilade tree's arena.

use crate::block_store::BlockId;
use crate::slice::Slice;
use crate::tumbler::Tumbler;

/// Which of the three tree types a node belongs to.
///
/// GRAN is 1-D (the istream / document content address space); SPAN and
/// POOM are 2-D (a global span-by-document index, and a per-document
/// version space, respectively).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EnfiladeType {
    /// 1-D istream tree.
    Gran,
    /// 2-D global span index.
    Span,
    /// 2-D per-document orgl.
    Poom,
}

impl EnfiladeType {
    /// Number of axes this tree type's `cwid`/`cdsp` vectors carry.
    #[must_use]
    pub fn axis_count(self) -> usize {
        match self {
            Self::Gran => 1,
            Self::Span | Self::Poom => 2,
        }
    }
}

/// Stable identifier for a node within an [`crate::enfilade::EnfiladeTree`]'s
/// arena. Plays the role of a `cuc`/`cbc` pointer without being one.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

/// A bottom crum's payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeafInfo {
    /// A GRAN leaf holding raw text content.
    GranText(Slice),

    /// A GRAN leaf whose content is a document's orgl (version space).
    ///
    /// `orgl_root` is `None` exactly when the orgl has been paged out to
    /// `disk_ptr` and not yet brought back in — the data model's invariant
    /// "no orgl without a source" requires at least one of the two be set.
    GranOrgl {
        /// In-core POOM root for this orgl, if currently loaded.
        orgl_root: Option<NodeId>,
        /// Disk location the orgl can be paged back in from.
        disk_ptr: Option<BlockId>,
    },

    /// A POOM leaf: a run of a document's v-space that corresponds to a run
    /// of the same length in the shared GRAN permascroll.
    ///
    /// The node's own `cwid` carries the shared width; `ispan_start` is the
    /// absolute permascroll address the v-run's start maps to (it cannot be
    /// derived from cumulative tree position alone, since transclusion lets
    /// many different v-runs — in many different documents — reference the
    /// very same permascroll bytes).
    TwoD {
        /// The document this leaf's v-run belongs to.
        homedoc: Tumbler,
        /// Absolute permascroll (GRAN) address this v-run maps to.
        ispan_start: Tumbler,
    },
}

impl LeafInfo {
    /// `true` if this is a GRANORGL leaf with nothing currently loaded.
    #[must_use]
    pub fn is_orgl_evicted(&self) -> bool {
        matches!(
            self,
            Self::GranOrgl {
                orgl_root: None,
                disk_ptr: Some(_)
            }
        )
    }
}

/// A single crum: either an internal (`cuc`) or bottom (`cbc`) node.
#[derive(Clone, Debug)]
pub struct Node {
    pub(crate) height: u32,
    pub(crate) parent: Option<NodeId>,
    /// Cumulative width per axis, equal to the sum of children's widths for
    /// an internal node (tree invariant: `cwid = sum(child.cwid)`).
    pub(crate) cwid: Vec<Tumbler>,
    pub(crate) kind: NodeKind,
    /// LRU-ish freshness counter; bumped on access, consulted by reaping.
    pub(crate) age: u64,
    pub(crate) modified: bool,
    /// Set only while a tree mutation holds this node open, protecting it
    /// from being reaped mid-operation.
    pub(crate) reserved: bool,
    /// Disk location this node's children can be paged back in from, set
    /// once the node has been reaped.
    pub(crate) children_disk_ptr: Option<BlockId>,
}

#[derive(Clone, Debug)]
pub(crate) enum NodeKind {
    Internal { children: Vec<NodeId> },
    Leaf(LeafInfo),
}

impl Node {
    pub(crate) fn new_leaf(height: u32, cwid: Vec<Tumbler>, info: LeafInfo) -> Self {
        Self {
            height,
            parent: None,
            cwid,
            kind: NodeKind::Leaf(info),
            age: 0,
            modified: true,
            reserved: false,
            children_disk_ptr: None,
        }
    }

    pub(crate) fn new_internal(height: u32, cwid: Vec<Tumbler>, children: Vec<NodeId>) -> Self {
        Self {
            height,
            parent: None,
            cwid,
            kind: NodeKind::Internal { children },
            age: 0,
            modified: true,
            reserved: false,
            children_disk_ptr: None,
        }
    }

    /// `true` for a bottom crum (`cbc`), `false` for an internal crum
    /// (`cuc`).
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    /// Reads the leaf payload, if this is a leaf.
    #[must_use]
    pub fn leaf_info(&self) -> Option<&LeafInfo> {
        match &self.kind {
            NodeKind::Leaf(info) => Some(info),
            NodeKind::Internal { .. } => None,
        }
    }

    /// Mutably reads the leaf payload, if this is a leaf.
    pub fn leaf_info_mut(&mut self) -> Option<&mut LeafInfo> {
        match &mut self.kind {
            NodeKind::Leaf(info) => Some(info),
            NodeKind::Internal { .. } => None,
        }
    }

    /// Reads this node's children, if it is internal.
    #[must_use]
    pub fn children(&self) -> Option<&[NodeId]> {
        match &self.kind {
            NodeKind::Internal { children } => Some(children),
            NodeKind::Leaf(_) => None,
        }
    }

    /// This node's cumulative width on `axis`.
    #[must_use]
    pub fn width(&self, axis: usize) -> Tumbler {
        self.cwid.get(axis).cloned().unwrap_or_else(Tumbler::zero)
    }

    /// The node's height; `0` for a leaf.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
}
