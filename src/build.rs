//! Guard tree construction.
//!
//! Building happens in two phases:
//!
//! 1. **Capacity pre-pass**: a pessimistic upper bound on the node count is
//!    computed from the candidate set, and the node arena is allocated
//!    exactly once. Actual usage is typically smaller, because sibling
//!    candidates sharing a prefix of checks share nodes and wildcard-only
//!    positions emit nothing.
//! 2. **Emission**: one callsite node per distinct callsite, chained via
//!    `no` edges, each leading into a per-callsite subtree built
//!    depth-first over the argument positions.
//!
//! Within a position, concrete-type groups form a chain of checks; a
//! group's secondary checks (writability, container contents) fail into
//! the *next* link of the chain, so groups sharing an outer type but
//! differing in container requirements all stay reachable. The chain ends
//! at the wildcard subtree when one exists, else at the certain fallback,
//! else at the no-match sentinel. The chain is emitted back-to-front so
//! every failure edge is known when its node is written; no fixups.
//!
//! A container deref replaces the current test value, so a contents check
//! that fails cannot fall straight into the next group's type check: that
//! check must see the argument, not its contents. Such groups fail into a
//! re-load of the same register instead. Edges into the chain's tail (a
//! wildcard subtree, a result node, or the sentinel) need no re-load,
//! since those begin with their own load or read nothing.

use tracing::debug;

use crate::callsite::{ArgFlags, CallsiteDescriptor};
use crate::error::GuardError;
use crate::handle::CandidateIdx;
use crate::node::{GuardNode, GuardTree, NodeIdx, NO_MATCH};
use crate::partition::{
    self, group_by_callsite, CallsiteGroup, PositionGroup, PositionPartition,
};
use crate::shape::Candidate;

/// Build a fresh guard tree for `candidates`.
///
/// Called whenever the candidate set for a call site changes; the returned
/// tree is complete and immutable, ready to atomically replace the old one
/// (see [`crate::publish::GuardSlot`]). An empty candidate set yields an
/// empty tree on which every evaluation reports no match.
///
/// # Errors
///
/// Rejects candidate sets that violate the planner contract; see
/// [`GuardError`]. A tree is never built from a malformed set.
pub fn regenerate(candidates: &[Candidate]) -> Result<GuardTree, GuardError> {
    let groups = group_by_callsite(candidates)?;
    if groups.is_empty() {
        return Ok(GuardTree::empty());
    }
    let capacity = capacity_bound(candidates, &groups);
    let mut builder = TreeBuilder {
        nodes: Vec::with_capacity(capacity),
        capacity,
        candidates,
    };

    let mut prev_callsite: Option<NodeIdx> = None;
    for group in &groups {
        let cs_node = builder.push(GuardNode::Callsite {
            cs: group.cs.id(),
            yes: NO_MATCH,
            no: NO_MATCH,
        });
        if let Some(prev) = prev_callsite {
            builder.patch_no(prev, cs_node);
        }
        prev_callsite = Some(cs_node);

        let subtree = builder.build_callsite_subtree(group);
        builder.patch_yes(cs_node, subtree);
    }

    let tree = GuardTree::from_arena(builder.nodes);
    debug_assert!(tree.validate().is_ok(), "built a malformed guard tree");
    debug!(
        candidates = candidates.len(),
        callsites = groups.len(),
        used_nodes = tree.used_nodes(),
        capacity,
        "regenerated argument guard tree"
    );
    Ok(tree)
}

/// Upper bound on nodes the tree can need: per callsite one callsite node
/// plus an optional certain result; per typed candidate one result node
/// plus, for each guarded object position, a load/check pair, an optional
/// writability check, and an optional decont/check pair.
fn capacity_bound(candidates: &[Candidate], groups: &[CallsiteGroup<'_>]) -> usize {
    let mut needed = 0usize;
    for group in groups {
        needed += 1; // callsite node
        if group.certain.is_some() {
            needed += 1; // certain result
        }
        for &idx in &group.typed {
            needed += 1; // result node
            for (i, flags) in group.cs.arg_flags().iter().enumerate() {
                if !flags.contains(ArgFlags::OBJ) {
                    continue;
                }
                let shape = partition::shape_at(candidates, idx, i);
                if shape.ty.is_some() {
                    needed += 2; // load + check
                    if shape.rw_container {
                        needed += 1;
                    }
                    if shape.contained_type.is_some() {
                        needed += 2; // deref + check
                    }
                }
            }
        }
    }
    needed
}

struct TreeBuilder<'a> {
    nodes: Vec<GuardNode>,
    capacity: usize,
    candidates: &'a [Candidate],
}

impl TreeBuilder<'_> {
    fn push(&mut self, node: GuardNode) -> NodeIdx {
        debug_assert!(
            self.nodes.len() < self.capacity,
            "capacity pre-pass underestimated the guard tree"
        );
        let idx = self.nodes.len() as NodeIdx;
        self.nodes.push(node);
        idx
    }

    fn patch_yes(&mut self, idx: NodeIdx, target: NodeIdx) {
        match &mut self.nodes[idx as usize] {
            GuardNode::Callsite { yes, .. } => *yes = target,
            _ => unreachable!("patch_yes on a non-callsite node"),
        }
    }

    fn patch_no(&mut self, idx: NodeIdx, target: NodeIdx) {
        match &mut self.nodes[idx as usize] {
            GuardNode::Callsite { no, .. } => *no = target,
            _ => unreachable!("patch_no on a non-callsite node"),
        }
    }

    /// Emit the subtree for one callsite group, returning its root.
    fn build_callsite_subtree(&mut self, group: &CallsiteGroup<'_>) -> NodeIdx {
        let fallback = match group.certain {
            Some(candidate) => self.push(GuardNode::Result { candidate }),
            None => NO_MATCH,
        };
        if group.typed.is_empty() {
            if fallback == NO_MATCH {
                // The partitioner only creates a group when it sees a
                // candidate, so one of the two must exist.
                unreachable!("callsite group with neither certain nor typed candidates");
            }
            return fallback;
        }
        self.build_positions(group.cs, &group.typed, 0, fallback)
    }

    /// Emit checks for `members` starting at argument position
    /// `flag_index`, returning the subtree root. `fallback` is where
    /// evaluation goes once every typed option has failed: the callsite's
    /// certain result, or the no-match sentinel.
    fn build_positions(
        &mut self,
        cs: &CallsiteDescriptor,
        members: &[CandidateIdx],
        flag_index: usize,
        fallback: NodeIdx,
    ) -> NodeIdx {
        let mut pos = flag_index;
        let part: PositionPartition = loop {
            if pos == cs.flag_count() {
                // Fully disambiguated: overlap rejection guarantees a
                // single survivor.
                debug_assert_eq!(members.len(), 1);
                return self.push(GuardNode::Result {
                    candidate: members[0],
                });
            }
            if cs.arg_flags()[pos].contains(ArgFlags::OBJ) {
                let part = partition::partition_position(self.candidates, members, pos);
                if !part.is_pass_through() {
                    break part;
                }
                // Every candidate is indifferent here; no node needed.
            }
            pos += 1;
        };

        // Where this position's chain goes when nothing matched.
        let miss = if part.wildcard.is_empty() {
            fallback
        } else {
            self.build_positions(cs, &part.wildcard, pos + 1, fallback)
        };

        // Emit the concrete groups back-to-front so each one fails into
        // the next; evaluation order is first-seen order.
        let register = cs.register_index(pos);
        let mut chain = miss;
        for group in part.groups.iter().rev() {
            // Failing after a deref must not land on another group's type
            // check with the contained value still loaded.
            let fail_mutated = if group.key.check_contents && chain != miss {
                self.push(GuardNode::LoadArg {
                    register,
                    yes: chain,
                })
            } else {
                chain
            };
            chain = self.build_group(cs, group, pos, chain, fail_mutated, fallback);
        }

        self.push(GuardNode::LoadArg {
            register,
            yes: chain,
        })
    }

    /// Emit one concrete group's checks: the type check, then writability
    /// and contents checks as the group requires, then the rest of the
    /// positions. `fail` is the next link in this position's chain;
    /// `fail_mutated` is where checks that run after the deref fail to.
    fn build_group(
        &mut self,
        cs: &CallsiteDescriptor,
        group: &PositionGroup,
        pos: usize,
        fail: NodeIdx,
        fail_mutated: NodeIdx,
        fallback: NodeIdx,
    ) -> NodeIdx {
        let mut on_match = if group.key.check_contents {
            let contents = partition::partition_contents(self.candidates, &group.members, pos);
            let mut contents_chain = fail_mutated;
            for cg in contents.iter().rev() {
                let next = self.build_positions(cs, &cg.members, pos + 1, fallback);
                contents_chain = self.push(if cg.concrete {
                    GuardNode::TypeCheckConcrete {
                        ty: cg.ty,
                        yes: next,
                        no: contents_chain,
                    }
                } else {
                    GuardNode::TypeCheckTypeObject {
                        ty: cg.ty,
                        yes: next,
                        no: contents_chain,
                    }
                });
            }
            self.push(GuardNode::DerefContainer {
                yes: contents_chain,
                no: fail,
            })
        } else {
            self.build_positions(cs, &group.members, pos + 1, fallback)
        };

        if group.key.rw {
            on_match = self.push(GuardNode::CheckWritable {
                yes: on_match,
                no: fail,
            });
        }

        self.push(if group.key.concrete {
            GuardNode::TypeCheckConcrete {
                ty: group.key.ty,
                yes: on_match,
                no: fail,
            }
        } else {
            GuardNode::TypeCheckTypeObject {
                ty: group.key.ty,
                yes: on_match,
                no: fail,
            }
        })
    }
}
