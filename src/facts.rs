//! Compile-time argument facts.
//!
//! While optimizing a call, the optimizer knows things about each argument
//! register as discrete flags rather than as live values: "type is known",
//! "definitely concrete", "known to be a read-write container", and so on.
//! The facts evaluator walks the same guard tree as the live-call path but
//! tests these flags instead of inspecting objects, letting the optimizer
//! resolve a call to a specific candidate statically (enabling direct calls
//! and inlining).

use bitflags::bitflags;

use crate::handle::TypeId;

/// Maximum argument registers a call may use for the optimizer to attempt
/// static resolution. Out-of-range register indexes make the facts
/// evaluator report "no match" rather than fault: fact availability is
/// inherently partial.
pub const MAX_ARGS_FOR_OPT: usize = 4;

bitflags! {
    /// Things the optimizer may know about an argument register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FactFlags: u16 {
        /// The type is known (`ArgFacts::ty` is meaningful).
        const KNOWN_TYPE = 1 << 0;
        /// Known to be a concrete instance.
        const CONCRETE = 1 << 1;
        /// Known to be a type object.
        const TYPEOBJ = 1 << 2;
        /// The contained value's type is known (`ArgFacts::contained_type`).
        const KNOWN_DECONT_TYPE = 1 << 3;
        /// The contained value is known concrete.
        const DECONT_CONCRETE = 1 << 4;
        /// The contained value is known to be a type object.
        const DECONT_TYPEOBJ = 1 << 5;
        /// Known to be a read-write container.
        const RW_CONT = 1 << 6;
    }
}

/// Statically-inferred facts about one argument register.
///
/// `ArgFacts::default()` means "nothing known", which fails every guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArgFacts {
    /// What is known.
    pub flags: FactFlags,
    /// Known type, valid when `KNOWN_TYPE` is set.
    pub ty: Option<TypeId>,
    /// Known contained type, valid when `KNOWN_DECONT_TYPE` is set.
    pub contained_type: Option<TypeId>,
}

impl ArgFacts {
    /// Facts for a register known to hold a concrete instance of `ty`.
    pub fn known_concrete(ty: TypeId) -> Self {
        ArgFacts {
            flags: FactFlags::KNOWN_TYPE | FactFlags::CONCRETE,
            ty: Some(ty),
            contained_type: None,
        }
    }

    /// Facts for a register known to hold the type object of `ty`.
    pub fn known_type_object(ty: TypeId) -> Self {
        ArgFacts {
            flags: FactFlags::KNOWN_TYPE | FactFlags::TYPEOBJ,
            ty: Some(ty),
            contained_type: None,
        }
    }

    /// Additionally: the contained value's type is known.
    pub fn with_contents(mut self, ty: TypeId, concrete: bool) -> Self {
        self.flags |= FactFlags::KNOWN_DECONT_TYPE;
        self.flags |= if concrete {
            FactFlags::DECONT_CONCRETE
        } else {
            FactFlags::DECONT_TYPEOBJ
        };
        self.contained_type = Some(ty);
        self
    }

    /// Additionally: known to be a read-write container.
    pub fn rw_container(mut self) -> Self {
        self.flags |= FactFlags::RW_CONT;
        self
    }
}
