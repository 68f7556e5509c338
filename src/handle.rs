//! Interned identity handles.
//!
//! Types and callsite descriptors are interned by the embedding VM, so two
//! handles refer to the same entity exactly when their IDs are equal. That
//! makes every comparison in the guard evaluators a single integer compare,
//! the same O(1) identity check the runtime performs on raw pointers.

/// Identity handle for a type known to the VM's type table.
///
/// Stable for the lifetime of the type; comparison is identity, never
/// structural. The guard tree holds these in type-check nodes and reports
/// them to the GC via [`crate::GuardTree::trace_types`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    /// Wrap a raw interned type index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        TypeId(raw)
    }

    /// The raw interned index.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Identity handle for an interned callsite descriptor.
///
/// Callsite descriptors are deduplicated by the bytecode loader, so equal
/// IDs mean the same argument shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct CallsiteId(u32);

impl CallsiteId {
    /// Wrap a raw interned callsite index.
    #[inline]
    pub const fn new(raw: u32) -> Self {
        CallsiteId(raw)
    }

    /// The raw interned index.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Index of a specialization candidate within the planner's candidate list.
pub type CandidateIdx = u32;
