//! Planner contract violations surfaced at regeneration time.
//!
//! "No match" during evaluation is never an error (it is the common case on
//! the dispatch path and is reported as `None`); these variants cover only
//! malformed candidate sets, which would otherwise build a tree that
//! silently mis-routes dispatch.

use thiserror::Error;

use crate::handle::{CallsiteId, CandidateIdx};

/// A candidate set that violates the planner contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    /// Two certain specializations for the same callsite; at most one may
    /// act as the fallback.
    #[error("duplicate certain specialization for callsite {0:?}")]
    DuplicateCertainCandidate(CallsiteId),

    /// Two typed candidates for one callsite guard identical type tuples;
    /// only one could ever be selected, so the set is rejected instead of
    /// silently preferring enumeration order.
    #[error("candidates {first} and {second} for callsite {callsite:?} guard identical type tuples")]
    DuplicateTypeTuple {
        callsite: CallsiteId,
        first: CandidateIdx,
        second: CandidateIdx,
    },

    /// A type tuple whose length disagrees with its callsite's argument
    /// count.
    #[error(
        "candidate {candidate}: type tuple has {got} entries but callsite {callsite:?} has {expected} arguments"
    )]
    ArityMismatch {
        callsite: CallsiteId,
        candidate: CandidateIdx,
        expected: usize,
        got: usize,
    },
}
