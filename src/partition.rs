//! Candidate partitioning.
//!
//! Two layers, both consumed by the tree builder:
//!
//! 1. **Callsite grouping**: one pass over the candidate list producing,
//!    per distinct callsite, the optional certain fallback plus the typed
//!    candidate indexes. Candidate lists are a handful of entries, so a
//!    linear scan over small accumulators beats a hash map here.
//! 2. **Position sub-partition**: given a live candidate subset and one
//!    argument position, group by the guards that position imposes. The
//!    wildcard group (candidates indifferent to the position) is kept
//!    separate because it must be tried only after every concrete group
//!    has failed.

use smallvec::SmallVec;

use crate::callsite::{ArgFlags, CallsiteDescriptor};
use crate::error::GuardError;
use crate::handle::{CandidateIdx, TypeId};
use crate::shape::{Candidate, TypeShape};

/// All live candidates for one callsite.
#[derive(Debug)]
pub(crate) struct CallsiteGroup<'a> {
    pub cs: &'a CallsiteDescriptor,
    /// The certain fallback, if any (at most one per callsite).
    pub certain: Option<CandidateIdx>,
    /// Typed candidates, in enumeration order.
    pub typed: SmallVec<[CandidateIdx; 8]>,
}

/// Group candidates by callsite identity, skipping discarded ones.
///
/// Rejects duplicate certain candidates, arity mismatches, and typed
/// candidates whose (normalized) tuples fully overlap.
pub(crate) fn group_by_callsite(
    candidates: &[Candidate],
) -> Result<SmallVec<[CallsiteGroup<'_>; 4]>, GuardError> {
    let mut groups: SmallVec<[CallsiteGroup<'_>; 4]> = SmallVec::new();
    for (idx, cand) in candidates.iter().enumerate() {
        if cand.discarded {
            continue;
        }
        let idx = idx as CandidateIdx;
        let cs = cand.callsite.as_ref();
        if let Some(tuple) = &cand.type_tuple {
            if tuple.len() != cs.flag_count() {
                return Err(GuardError::ArityMismatch {
                    callsite: cs.id(),
                    candidate: idx,
                    expected: cs.flag_count(),
                    got: tuple.len(),
                });
            }
        }
        let group = match groups.iter().position(|g| g.cs.id() == cs.id()) {
            Some(pos) => &mut groups[pos],
            None => {
                groups.push(CallsiteGroup {
                    cs,
                    certain: None,
                    typed: SmallVec::new(),
                });
                let last = groups.len() - 1;
                &mut groups[last]
            }
        };
        match &cand.type_tuple {
            None => {
                if group.certain.is_some() {
                    return Err(GuardError::DuplicateCertainCandidate(cs.id()));
                }
                group.certain = Some(idx);
            }
            Some(tuple) => {
                if let Some(&prev) = group
                    .typed
                    .iter()
                    .find(|&&p| tuples_overlap(cs, candidates, p, tuple))
                {
                    return Err(GuardError::DuplicateTypeTuple {
                        callsite: cs.id(),
                        first: prev,
                        second: idx,
                    });
                }
                group.typed.push(idx);
            }
        }
    }
    Ok(groups)
}

/// Whether candidate `prev`'s tuple imposes exactly the same guards as
/// `tuple`. Compared in normalized form so that stray fields under a
/// wildcard do not hide a true duplicate, and only at positions the tree
/// can actually guard: a shape at a native (non-object) position imposes
/// nothing, so tuples differing only there are still duplicates.
fn tuples_overlap(
    cs: &CallsiteDescriptor,
    candidates: &[Candidate],
    prev: CandidateIdx,
    tuple: &[TypeShape],
) -> bool {
    let prev_tuple = match &candidates[prev as usize].type_tuple {
        Some(t) => t,
        None => return false,
    };
    prev_tuple.len() == tuple.len()
        && prev_tuple
            .iter()
            .zip(tuple)
            .zip(cs.arg_flags())
            .all(|((a, b), flags)| {
                !flags.contains(ArgFlags::OBJ) || a.normalized() == b.normalized()
            })
}

/// The guards one concrete group imposes at a position. For a container
/// position, the *contained* type is checked separately after the deref;
/// this key carries only whether such a sub-check exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PositionKey {
    pub ty: TypeId,
    pub concrete: bool,
    pub rw: bool,
    pub check_contents: bool,
}

/// A concrete group at one position.
pub(crate) struct PositionGroup {
    pub key: PositionKey,
    pub members: SmallVec<[CandidateIdx; 4]>,
}

/// The sub-partition of a candidate subset at one argument position.
pub(crate) struct PositionPartition {
    /// Groups that test a type, in first-seen order.
    pub groups: SmallVec<[PositionGroup; 4]>,
    /// Candidates indifferent to this position; tried only after every
    /// concrete group has failed, never before.
    pub wildcard: SmallVec<[CandidateIdx; 4]>,
}

impl PositionPartition {
    /// True when no candidate guards this position.
    pub fn is_pass_through(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Partition `members` by the guards they impose at `flag_index`.
pub(crate) fn partition_position(
    candidates: &[Candidate],
    members: &[CandidateIdx],
    flag_index: usize,
) -> PositionPartition {
    let mut part = PositionPartition {
        groups: SmallVec::new(),
        wildcard: SmallVec::new(),
    };
    for &m in members {
        let shape = shape_at(candidates, m, flag_index);
        let ty = match shape.ty {
            Some(ty) => ty,
            None => {
                part.wildcard.push(m);
                continue;
            }
        };
        let key = PositionKey {
            ty,
            concrete: shape.concrete,
            rw: shape.rw_container,
            check_contents: shape.contained_type.is_some(),
        };
        match part.groups.iter().position(|g| g.key == key) {
            Some(pos) => part.groups[pos].members.push(m),
            None => {
                let mut group = PositionGroup {
                    key,
                    members: SmallVec::new(),
                };
                group.members.push(m);
                part.groups.push(group);
            }
        }
    }
    part
}

/// A contained-type group behind a container deref.
pub(crate) struct ContentsGroup {
    pub ty: TypeId,
    pub concrete: bool,
    pub members: SmallVec<[CandidateIdx; 4]>,
}

/// Partition a concrete group's members by the contained type they guard.
/// Only called for groups whose key has `check_contents`, so every member
/// has a contained type.
pub(crate) fn partition_contents(
    candidates: &[Candidate],
    members: &[CandidateIdx],
    flag_index: usize,
) -> SmallVec<[ContentsGroup; 4]> {
    let mut groups: SmallVec<[ContentsGroup; 4]> = SmallVec::new();
    for &m in members {
        let shape = shape_at(candidates, m, flag_index);
        let ty = shape
            .contained_type
            .expect("contents partition of a group without contained types");
        let concrete = shape.contained_concrete;
        match groups
            .iter()
            .position(|g| g.ty == ty && g.concrete == concrete)
        {
            Some(pos) => groups[pos].members.push(m),
            None => {
                let mut group = ContentsGroup {
                    ty,
                    concrete,
                    members: SmallVec::new(),
                };
                group.members.push(m);
                groups.push(group);
            }
        }
    }
    groups
}

/// The shape a typed candidate guards at `flag_index`. Only called for
/// typed candidates.
pub(crate) fn shape_at(
    candidates: &[Candidate],
    member: CandidateIdx,
    flag_index: usize,
) -> TypeShape {
    candidates[member as usize]
        .type_tuple
        .as_ref()
        .expect("position partition of a certain candidate")[flag_index]
}
