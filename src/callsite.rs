//! Callsite descriptors.
//!
//! A callsite descriptor records the argument shape of one invocation site:
//! how many arguments, which are object-typed, which are named. Descriptors
//! are interned upstream; the guard tree only stores their [`CallsiteId`]
//! and compares by identity.
//!
//! # Register layout
//!
//! The interpreter's argument buffer stores one register per positional
//! argument and a (name, value) register pair per named argument, in flag
//! order:
//!
//! ```text
//! flags:     [pos obj] [pos int] [named obj]
//! registers: [obj]     [int]     [name][obj]
//!              r0        r1        r2    r3
//! ```
//!
//! Guard nodes address arguments by *register* index (that is what the hot
//! live-call path has in hand); the type-tuple evaluator maps register
//! indexes back to flag positions via [`CallsiteDescriptor::flag_index_for_register`].

use bitflags::bitflags;

use crate::handle::CallsiteId;

bitflags! {
    /// Per-argument flags of a callsite descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ArgFlags: u8 {
        /// Argument is an object reference (guardable).
        const OBJ = 1 << 0;
        /// Argument is a native integer.
        const INT = 1 << 1;
        /// Argument is a native float.
        const NUM = 1 << 2;
        /// Argument is a native string.
        const STR = 1 << 3;
        /// Argument is named; its name occupies the preceding register.
        const NAMED = 1 << 4;
    }
}

/// An interned description of one invocation shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallsiteDescriptor {
    /// Interned identity.
    id: CallsiteId,
    /// One flag set per argument, in declaration order.
    arg_flags: Vec<ArgFlags>,
}

impl CallsiteDescriptor {
    /// Create a descriptor. The caller (the VM's callsite interner) is
    /// responsible for deduplication.
    pub fn new(id: CallsiteId, arg_flags: Vec<ArgFlags>) -> Self {
        CallsiteDescriptor { id, arg_flags }
    }

    /// The interned identity of this descriptor.
    #[inline]
    pub fn id(&self) -> CallsiteId {
        self.id
    }

    /// Per-argument flags.
    #[inline]
    pub fn arg_flags(&self) -> &[ArgFlags] {
        &self.arg_flags
    }

    /// Number of arguments (and thus the length of any type tuple compiled
    /// against this callsite).
    #[inline]
    pub fn flag_count(&self) -> usize {
        self.arg_flags.len()
    }

    /// Total registers the argument buffer uses for this callsite.
    pub fn num_registers(&self) -> u16 {
        self.arg_flags
            .iter()
            .map(|f| if f.contains(ArgFlags::NAMED) { 2u16 } else { 1 })
            .sum()
    }

    /// Register index holding the *value* of the argument at `flag_index`.
    ///
    /// Named arguments skip over their name register.
    pub fn register_index(&self, flag_index: usize) -> u16 {
        let mut reg = 0u16;
        for flags in &self.arg_flags[..flag_index] {
            reg += if flags.contains(ArgFlags::NAMED) { 2 } else { 1 };
        }
        if self.arg_flags[flag_index].contains(ArgFlags::NAMED) {
            reg += 1;
        }
        reg
    }

    /// Flag position whose value lives in register `register`, or `None` if
    /// the register holds a name or is out of range.
    pub fn flag_index_for_register(&self, register: u16) -> Option<usize> {
        let mut reg = 0u16;
        for (i, flags) in self.arg_flags.iter().enumerate() {
            if flags.contains(ArgFlags::NAMED) {
                if register == reg {
                    return None; // name slot
                }
                if register == reg + 1 {
                    return Some(i);
                }
                reg += 2;
            } else {
                if register == reg {
                    return Some(i);
                }
                reg += 1;
            }
        }
        None
    }
}
