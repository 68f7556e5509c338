//! Observed type shapes and specialization candidates.
//!
//! A [`TypeShape`] is the per-argument-position record the statistics
//! collector hands to the planner: the observed type, whether it was a
//! concrete instance or the type object itself, and — when the value was a
//! container — what was found inside it. A [`Candidate`] pairs a callsite
//! with an optional tuple of shapes; a candidate without a tuple is a
//! *certain* specialization that matches any invocation of its callsite.

use std::sync::Arc;

use crate::callsite::CallsiteDescriptor;
use crate::handle::TypeId;

/// Type information observed for one argument position.
///
/// `ty == None` means the candidate does not guard this position at all (a
/// derived/wildcard specialization); the remaining fields are then ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeShape {
    /// The observed type, if this position is guarded.
    pub ty: Option<TypeId>,
    /// Whether the observed value was a concrete instance (as opposed to
    /// the type object itself).
    pub concrete: bool,
    /// For container values: the type observed inside the container, when
    /// the specialization also guards the contents.
    pub contained_type: Option<TypeId>,
    /// Whether the contained value was concrete.
    pub contained_concrete: bool,
    /// Whether the container must be rebindable (read-write).
    pub rw_container: bool,
}

impl TypeShape {
    /// A position the candidate is indifferent to.
    #[inline]
    pub const fn any() -> Self {
        TypeShape {
            ty: None,
            concrete: false,
            contained_type: None,
            contained_concrete: false,
            rw_container: false,
        }
    }

    /// Guard on a concrete instance of `ty`.
    #[inline]
    pub const fn concrete(ty: TypeId) -> Self {
        TypeShape {
            ty: Some(ty),
            concrete: true,
            contained_type: None,
            contained_concrete: false,
            rw_container: false,
        }
    }

    /// Guard on the type object of `ty` (a non-concrete value).
    #[inline]
    pub const fn type_object(ty: TypeId) -> Self {
        TypeShape {
            ty: Some(ty),
            concrete: false,
            contained_type: None,
            contained_concrete: false,
            rw_container: false,
        }
    }

    /// Additionally guard the value found inside the container.
    #[inline]
    pub const fn with_contents(mut self, ty: TypeId, concrete: bool) -> Self {
        self.contained_type = Some(ty);
        self.contained_concrete = concrete;
        self
    }

    /// Additionally require the container to be rebindable.
    #[inline]
    pub const fn writable(mut self) -> Self {
        self.rw_container = true;
        self
    }

    /// Canonical form for overlap comparison: fields that are ignored by
    /// the tree builder are cleared, so two shapes compare equal exactly
    /// when they impose the same guards.
    pub(crate) fn normalized(self) -> Self {
        if self.ty.is_none() {
            return TypeShape::any();
        }
        let mut s = self;
        if s.contained_type.is_none() {
            s.contained_concrete = false;
        }
        s
    }
}

/// A compiled specialization awaiting selection.
///
/// Produced and owned by the planner; the guard tree builder borrows the
/// candidate list for the duration of one regeneration pass and records
/// only candidate *indexes* in result nodes.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The callsite shape this specialization was compiled for.
    pub callsite: Arc<CallsiteDescriptor>,
    /// The argument type tuple guarded, or `None` for a certain
    /// specialization. When present, its length must equal the callsite's
    /// flag count.
    pub type_tuple: Option<Vec<TypeShape>>,
    /// Set when the specialization has been invalidated; discarded
    /// candidates are skipped at regeneration.
    pub discarded: bool,
}

impl Candidate {
    /// A certain specialization: matches any invocation of `callsite`.
    pub fn certain(callsite: Arc<CallsiteDescriptor>) -> Self {
        Candidate {
            callsite,
            type_tuple: None,
            discarded: false,
        }
    }

    /// A typed specialization guarded by `type_tuple`.
    pub fn typed(callsite: Arc<CallsiteDescriptor>, type_tuple: Vec<TypeShape>) -> Self {
        Candidate {
            callsite,
            type_tuple: Some(type_tuple),
            discarded: false,
        }
    }
}
