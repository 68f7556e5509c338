//! Argument guard trees: call-site specialization selection.
//!
//! A call site that has accumulated several compiled specializations needs
//! to decide, on every invocation, which one (if any) applies. This is the
//! inline-cache problem generalized to N-ary, type-tuple-keyed dispatch:
//! candidates guard whole argument type tuples, may leave positions
//! unguarded (wildcards), and may look through containers at the values
//! inside.
//!
//! The selector is a decision tree stored as one flat node array:
//!
//! ```text
//!   candidates ──► partition ──► build ──► GuardTree ──► publish
//!                                             │
//!                     ┌───────────────────────┼──────────────────────┐
//!                     ▼                       ▼                      ▼
//!                run(args)            run_types(tuple)     run_callinfo(facts)
//!              (live dispatch)       (planner dedup)      (optimizer resolve)
//! ```
//!
//! The three evaluators walk the same tree with identical semantics,
//! differing only in where the tested value comes from: live argument
//! registers, an abstract type tuple, or compile-time fact flags. Trees
//! are immutable once built; regeneration builds a new tree and swaps it
//! in atomically, with the old one reclaimed at the next safepoint.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod build;
pub mod callsite;
pub mod error;
pub mod eval;
pub mod facts;
pub mod handle;
pub mod node;
mod partition;
pub mod publish;
pub mod shape;

pub use build::regenerate;
pub use callsite::{ArgFlags, CallsiteDescriptor};
pub use error::GuardError;
pub use eval::{CallArguments, GuardValue};
pub use facts::{ArgFacts, FactFlags, MAX_ARGS_FOR_OPT};
pub use handle::{CallsiteId, CandidateIdx, TypeId};
pub use node::{GuardNode, GuardTree, NodeIdx, NO_MATCH};
pub use publish::{GuardSlot, SafepointQueue};
pub use shape::{Candidate, TypeShape};
