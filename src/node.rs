//! The guard tree: a flat, index-addressed decision tree.
//!
//! Nodes are stored by value in one contiguous array and reference each
//! other by index, never by pointer. That keeps the whole tree a single
//! allocation: trivially relocatable, shareable across threads without
//! synchronization once built, and freeable as one block at a safepoint.
//!
//! Node index 0 is simultaneously the entry point and the universal
//! "no match" sentinel. The builder guarantees no constructed edge ever
//! targets index 0, so an evaluator that lands on 0 after taking an edge
//! knows the walk is over without a result.

use rustc_hash::FxHashSet;

use crate::handle::{CallsiteId, CandidateIdx, TypeId};

/// Index of a node within a [`GuardTree`]'s array.
pub type NodeIdx = u32;

/// Edge value meaning "no further options; report no match".
pub const NO_MATCH: NodeIdx = 0;

/// One node of the guard tree.
///
/// The evaluators carry a single "current test value" across the walk;
/// [`GuardNode::LoadArg`] and [`GuardNode::DerefContainer`] set it, the
/// check nodes read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardNode {
    /// Matches if the invocation's callsite descriptor is `cs` (by
    /// identity; descriptors are interned).
    Callsite {
        cs: CallsiteId,
        yes: NodeIdx,
        no: NodeIdx,
    },
    /// Not a test: loads the argument register `register` into the current
    /// test value and continues. Always eventually followed by a check.
    LoadArg { register: u16, yes: NodeIdx },
    /// Matches if the current test value is a concrete instance of `ty`.
    TypeCheckConcrete {
        ty: TypeId,
        yes: NodeIdx,
        no: NodeIdx,
    },
    /// Matches if the current test value is the type object of `ty` itself.
    TypeCheckTypeObject {
        ty: TypeId,
        yes: NodeIdx,
        no: NodeIdx,
    },
    /// Reads the value out of the current test value's container; on
    /// success the contained value becomes the current test value. Takes
    /// `no` if the value is not a container.
    DerefContainer { yes: NodeIdx, no: NodeIdx },
    /// Matches if the current test value is a rebindable (read-write)
    /// container.
    CheckWritable { yes: NodeIdx, no: NodeIdx },
    /// Terminal: selects the candidate at `candidate`.
    Result { candidate: CandidateIdx },
}

/// An immutable argument guard tree for one call site.
///
/// Built in a single pass over a pre-sized arena (see `build`); never
/// mutated afterwards, so any number of threads may evaluate it
/// concurrently. Regeneration produces a whole new tree which replaces
/// this one atomically (see `publish`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardTree {
    /// The node arena. Length is the used node count; capacity is the
    /// pessimistic pre-pass bound (head sharing usually leaves slack).
    nodes: Vec<GuardNode>,
}

impl GuardTree {
    /// A tree with no candidates; every evaluation reports no match.
    pub fn empty() -> Self {
        GuardTree { nodes: Vec::new() }
    }

    pub(crate) fn from_arena(nodes: Vec<GuardNode>) -> Self {
        GuardTree { nodes }
    }

    /// Whether the tree has no nodes at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes actually written.
    #[inline]
    pub fn used_nodes(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// Node slots allocated by the capacity pre-pass.
    #[inline]
    pub fn num_nodes(&self) -> u32 {
        self.nodes.capacity() as u32
    }

    /// Fetch a node by index.
    #[inline(always)]
    pub fn node(&self, idx: NodeIdx) -> GuardNode {
        self.nodes[idx as usize]
    }

    /// Visit every type handle referenced by the tree's check nodes, with
    /// repeats. This is the GC mark hook: the tree reports the references
    /// it holds but does not manage their lifetime.
    pub fn trace_types(&self, mut visit: impl FnMut(TypeId)) {
        for node in &self.nodes {
            match *node {
                GuardNode::TypeCheckConcrete { ty, .. }
                | GuardNode::TypeCheckTypeObject { ty, .. } => visit(ty),
                _ => {}
            }
        }
    }

    /// Distinct type handles referenced by the tree, in first-seen order.
    /// Heap-introspection convenience over [`GuardTree::trace_types`].
    pub fn referenced_types(&self) -> Vec<TypeId> {
        let mut seen = FxHashSet::default();
        let mut out = Vec::new();
        self.trace_types(|ty| {
            if seen.insert(ty) {
                out.push(ty);
            }
        });
        out
    }

    /// Structural check of the node-zero invariant and acyclicity: walking
    /// from the root must never re-enter node 0 through an edge, every edge
    /// must stay in bounds, and no cycle may exist. Builder bugs only; not
    /// a runtime-recoverable condition.
    pub fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Ok(());
        }
        // Edge targets in bounds and never 0 (0 is the sentinel).
        let used = self.nodes.len() as NodeIdx;
        for (i, node) in self.nodes.iter().enumerate() {
            for edge in edges_of(node) {
                if edge >= used {
                    return Err(format!("node {i}: edge {edge} out of bounds ({used} used)"));
                }
            }
        }
        // Depth-first walk with an explicit stack; sentinel edges stop.
        let mut state = vec![WalkState::Unvisited; self.nodes.len()];
        let mut stack: Vec<(NodeIdx, usize)> = vec![(0, 0)];
        state[0] = WalkState::OnStack;
        while let Some(&(idx, edge_pos)) = stack.last() {
            let node = self.nodes[idx as usize];
            let next = edges_of(&node)
                .filter(|&e| e != NO_MATCH)
                .nth(edge_pos);
            match next {
                Some(next) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    match state[next as usize] {
                        WalkState::OnStack => {
                            return Err(format!("cycle through node {next}"));
                        }
                        WalkState::Unvisited => {
                            state[next as usize] = WalkState::OnStack;
                            stack.push((next, 0));
                        }
                        WalkState::Done => {}
                    }
                }
                None => {
                    state[idx as usize] = WalkState::Done;
                    stack.pop();
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Unvisited,
    OnStack,
    Done,
}

/// The outgoing edges of a node, in yes/no order.
fn edges_of(node: &GuardNode) -> impl Iterator<Item = NodeIdx> {
    let (yes, no) = match *node {
        GuardNode::Callsite { yes, no, .. }
        | GuardNode::TypeCheckConcrete { yes, no, .. }
        | GuardNode::TypeCheckTypeObject { yes, no, .. }
        | GuardNode::DerefContainer { yes, no }
        | GuardNode::CheckWritable { yes, no } => (Some(yes), Some(no)),
        GuardNode::LoadArg { yes, .. } => (Some(yes), None),
        GuardNode::Result { .. } => (None, None),
    };
    yes.into_iter().chain(no)
}
