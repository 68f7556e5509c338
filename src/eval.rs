//! Guard tree evaluation.
//!
//! Three traversals share one tree and one loop shape: start at node 0,
//! dispatch on the node's tag, stop on a result node or on re-reaching the
//! node-zero sentinel. They differ only in where the "current test value"
//! comes from:
//!
//! | Evaluator      | Test source                                    |
//! |----------------|------------------------------------------------|
//! | [`GuardTree::run`]          | live argument registers           |
//! | [`GuardTree::run_types`]    | a type tuple, no objects inspected|
//! | [`GuardTree::run_callinfo`] | compile-time fact flags           |
//!
//! All three are read-only and lock-free; "no match" is `None` and means
//! "fall back to unspecialized execution", never an error.

use crate::callsite::CallsiteDescriptor;
use crate::facts::{ArgFacts, FactFlags, MAX_ARGS_FOR_OPT};
use crate::handle::{CandidateIdx, TypeId};
use crate::node::{GuardNode, GuardTree, NO_MATCH};
use crate::shape::TypeShape;

/// The object-model seam the live-call evaluator tests against.
///
/// Implemented by the VM's value representation. `decont` reads the value
/// out of a container; for the container kinds this guard system targets
/// the runtime guarantees the fetch never runs user code, an invariant
/// this crate relies on but cannot enforce.
pub trait GuardValue: Copy {
    /// The value's runtime type handle.
    fn type_id(&self) -> TypeId;
    /// Whether the value is a concrete instance (not a type object).
    fn is_concrete(&self) -> bool;
    /// The contained value, or `None` when this is not a container.
    fn decont(&self) -> Option<Self>;
    /// Whether the value is a rebindable (read-write) container.
    fn is_rw_container(&self) -> bool;
}

/// A live invocation's argument registers, as laid out by the interpreter
/// for `callsite` (see [`CallsiteDescriptor`] for the register layout).
#[derive(Debug, Clone, Copy)]
pub struct CallArguments<'a, V> {
    /// The invocation's interned callsite descriptor.
    pub callsite: &'a CallsiteDescriptor,
    /// One register per positional argument, a pair per named argument.
    pub registers: &'a [V],
}

impl GuardTree {
    /// Select a specialization for a live invocation. Hot path: one tree
    /// walk, identity compares only, no allocation.
    pub fn run<V: GuardValue>(&self, args: &CallArguments<'_, V>) -> Option<CandidateIdx> {
        if self.is_empty() {
            return None;
        }
        let callsite = args.callsite.id();
        let mut test: Option<V> = None;
        let mut current = 0;
        loop {
            match self.node(current) {
                GuardNode::Callsite { cs, yes, no } => {
                    current = if cs == callsite { yes } else { no };
                }
                GuardNode::LoadArg { register, yes } => {
                    test = Some(*args.registers.get(register as usize)?);
                    current = yes;
                }
                GuardNode::TypeCheckConcrete { ty, yes, no } => {
                    let v = test?;
                    current = if v.type_id() == ty && v.is_concrete() {
                        yes
                    } else {
                        no
                    };
                }
                GuardNode::TypeCheckTypeObject { ty, yes, no } => {
                    let v = test?;
                    current = if v.type_id() == ty && !v.is_concrete() {
                        yes
                    } else {
                        no
                    };
                }
                GuardNode::DerefContainer { yes, no } => match test?.decont() {
                    Some(inner) => {
                        test = Some(inner);
                        current = yes;
                    }
                    None => current = no,
                },
                GuardNode::CheckWritable { yes, no } => {
                    current = if test?.is_rw_container() { yes } else { no };
                }
                GuardNode::Result { candidate } => return Some(candidate),
            }
            if current == NO_MATCH {
                return None;
            }
        }
    }

    /// Check whether a specialization exists for exactly this type tuple.
    /// Used by the planner before compiling a new candidate; inspects no
    /// runtime objects.
    pub fn run_types(
        &self,
        cs: &CallsiteDescriptor,
        types: &[TypeShape],
    ) -> Option<CandidateIdx> {
        if self.is_empty() {
            return None;
        }
        let callsite = cs.id();
        let mut test: Option<&TypeShape> = None;
        // Whether a deref moved the walk onto the contained-type fields.
        let mut deconted = false;
        let mut current = 0;
        loop {
            match self.node(current) {
                GuardNode::Callsite { cs: node_cs, yes, no } => {
                    current = if node_cs == callsite { yes } else { no };
                }
                GuardNode::LoadArg { register, yes } => {
                    let flag_index = cs.flag_index_for_register(register)?;
                    test = Some(types.get(flag_index)?);
                    deconted = false;
                    current = yes;
                }
                GuardNode::TypeCheckConcrete { ty, yes, no } => {
                    let shape = test?;
                    let matched = if deconted {
                        shape.contained_type == Some(ty) && shape.contained_concrete
                    } else {
                        shape.ty == Some(ty) && shape.concrete
                    };
                    current = if matched { yes } else { no };
                }
                GuardNode::TypeCheckTypeObject { ty, yes, no } => {
                    let shape = test?;
                    let matched = if deconted {
                        shape.contained_type == Some(ty) && !shape.contained_concrete
                    } else {
                        shape.ty == Some(ty) && !shape.concrete
                    };
                    current = if matched { yes } else { no };
                }
                GuardNode::DerefContainer { yes, no } => {
                    if test?.contained_type.is_some() {
                        deconted = true;
                        current = yes;
                    } else {
                        current = no;
                    }
                }
                GuardNode::CheckWritable { yes, no } => {
                    current = if test?.rw_container { yes } else { no };
                }
                GuardNode::Result { candidate } => return Some(candidate),
            }
            if current == NO_MATCH {
                return None;
            }
        }
    }

    /// Try to resolve a call statically from compile-time facts. Used by
    /// the optimizer to turn guarded dispatch into a direct call or an
    /// inline. Registers beyond [`MAX_ARGS_FOR_OPT`], or beyond what
    /// `facts` covers, report no match rather than faulting: fact
    /// availability is inherently partial.
    pub fn run_callinfo(
        &self,
        cs: &CallsiteDescriptor,
        facts: &[ArgFacts],
    ) -> Option<CandidateIdx> {
        if self.is_empty() {
            return None;
        }
        let callsite = cs.id();
        let mut test: Option<&ArgFacts> = None;
        let mut deconted = false;
        let mut current = 0;
        loop {
            match self.node(current) {
                GuardNode::Callsite { cs: node_cs, yes, no } => {
                    current = if node_cs == callsite { yes } else { no };
                }
                GuardNode::LoadArg { register, yes } => {
                    let register = register as usize;
                    if register >= MAX_ARGS_FOR_OPT {
                        return None;
                    }
                    test = Some(facts.get(register)?);
                    deconted = false;
                    current = yes;
                }
                GuardNode::TypeCheckConcrete { ty, yes, no } => {
                    let f = test?;
                    current = if known_type(f, ty, deconted, true) { yes } else { no };
                }
                GuardNode::TypeCheckTypeObject { ty, yes, no } => {
                    let f = test?;
                    current = if known_type(f, ty, deconted, false) { yes } else { no };
                }
                GuardNode::DerefContainer { yes, no } => {
                    if test?.flags.contains(FactFlags::KNOWN_DECONT_TYPE) {
                        deconted = true;
                        current = yes;
                    } else {
                        current = no;
                    }
                }
                GuardNode::CheckWritable { yes, no } => {
                    current = if test?.flags.contains(FactFlags::RW_CONT) {
                        yes
                    } else {
                        no
                    };
                }
                GuardNode::Result { candidate } => return Some(candidate),
            }
            if current == NO_MATCH {
                return None;
            }
        }
    }
}

/// Whether the facts prove the (possibly deconted) value is `ty`, with the
/// required concreteness.
fn known_type(f: &ArgFacts, ty: TypeId, deconted: bool, concrete: bool) -> bool {
    if deconted {
        let wanted = if concrete {
            FactFlags::KNOWN_DECONT_TYPE | FactFlags::DECONT_CONCRETE
        } else {
            FactFlags::KNOWN_DECONT_TYPE | FactFlags::DECONT_TYPEOBJ
        };
        f.flags.contains(wanted) && f.contained_type == Some(ty)
    } else {
        let wanted = if concrete {
            FactFlags::KNOWN_TYPE | FactFlags::CONCRETE
        } else {
            FactFlags::KNOWN_TYPE | FactFlags::TYPEOBJ
        };
        f.flags.contains(wanted) && f.ty == Some(ty)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::build::regenerate;
    use crate::callsite::ArgFlags;
    use crate::handle::CallsiteId;
    use crate::shape::Candidate;

    const INT: TypeId = TypeId::new(1);
    const STR: TypeId = TypeId::new(2);
    const NUM: TypeId = TypeId::new(3);
    const SCALAR: TypeId = TypeId::new(10);

    /// Minimal object model for exercising the live-call path.
    #[derive(Debug, Clone, Copy)]
    struct TestValue {
        ty: TypeId,
        concrete: bool,
        contained: Option<(TypeId, bool)>,
        rw: bool,
    }

    impl TestValue {
        fn concrete(ty: TypeId) -> Self {
            TestValue {
                ty,
                concrete: true,
                contained: None,
                rw: false,
            }
        }

        fn type_object(ty: TypeId) -> Self {
            TestValue {
                ty,
                concrete: false,
                contained: None,
                rw: false,
            }
        }

        fn container(ty: TypeId, contains: TypeId, rw: bool) -> Self {
            TestValue {
                ty,
                concrete: true,
                contained: Some((contains, true)),
                rw,
            }
        }
    }

    impl GuardValue for TestValue {
        fn type_id(&self) -> TypeId {
            self.ty
        }
        fn is_concrete(&self) -> bool {
            self.concrete
        }
        fn decont(&self) -> Option<Self> {
            self.contained.map(|(ty, concrete)| TestValue {
                ty,
                concrete,
                contained: None,
                rw: false,
            })
        }
        fn is_rw_container(&self) -> bool {
            self.rw
        }
    }

    fn obj_callsite(id: u32, arity: usize) -> Arc<CallsiteDescriptor> {
        Arc::new(CallsiteDescriptor::new(
            CallsiteId::new(id),
            vec![ArgFlags::OBJ; arity],
        ))
    }

    /// The two-argument example scenario: A guards (Int, *), B guards
    /// (Str, *), F is the certain fallback.
    fn example_tree() -> (GuardTree, Arc<CallsiteDescriptor>) {
        let cs = obj_callsite(1, 2);
        let candidates = vec![
            Candidate::typed(cs.clone(), vec![TypeShape::concrete(INT), TypeShape::any()]),
            Candidate::typed(cs.clone(), vec![TypeShape::concrete(STR), TypeShape::any()]),
            Candidate::certain(cs.clone()),
        ];
        (regenerate(&candidates).unwrap(), cs)
    }

    #[test]
    fn test_example_scenario_run_types() {
        let (tree, cs) = example_tree();
        let anything = TypeShape::concrete(NUM);
        assert_eq!(
            tree.run_types(&cs, &[TypeShape::concrete(INT), anything]),
            Some(0)
        );
        assert_eq!(
            tree.run_types(&cs, &[TypeShape::concrete(STR), anything]),
            Some(1)
        );
        // Unknown first type falls back to the certain candidate.
        assert_eq!(
            tree.run_types(&cs, &[TypeShape::concrete(NUM), anything]),
            Some(2)
        );
        // Wrong callsite: no match at all.
        let other = obj_callsite(99, 2);
        assert_eq!(
            tree.run_types(&other, &[TypeShape::concrete(INT), anything]),
            None
        );
    }

    #[test]
    fn test_example_scenario_live_run() {
        let (tree, cs) = example_tree();
        let run = |v: TestValue| {
            tree.run(&CallArguments {
                callsite: &cs,
                registers: &[v, TestValue::concrete(NUM)],
            })
        };
        assert_eq!(run(TestValue::concrete(INT)), Some(0));
        assert_eq!(run(TestValue::concrete(STR)), Some(1));
        assert_eq!(run(TestValue::concrete(NUM)), Some(2));
        // A type object of Int is not a concrete Int.
        assert_eq!(run(TestValue::type_object(INT)), Some(2));
    }

    #[test]
    fn test_example_scenario_callinfo() {
        let (tree, cs) = example_tree();
        let anything = ArgFacts::known_concrete(NUM);
        assert_eq!(
            tree.run_callinfo(&cs, &[ArgFacts::known_concrete(INT), anything]),
            Some(0)
        );
        assert_eq!(
            tree.run_callinfo(&cs, &[ArgFacts::known_concrete(STR), anything]),
            Some(1)
        );
        assert_eq!(
            tree.run_callinfo(&cs, &[ArgFacts::known_concrete(NUM), anything]),
            Some(2)
        );
        // Nothing known about the first argument: the typed branches fail
        // and the certain fallback wins.
        assert_eq!(
            tree.run_callinfo(&cs, &[ArgFacts::default(), anything]),
            Some(2)
        );
    }

    #[test]
    fn test_no_match_without_certain_fallback() {
        let cs = obj_callsite(1, 1);
        let candidates = vec![
            Candidate::typed(cs.clone(), vec![TypeShape::concrete(INT)]),
            Candidate::typed(cs.clone(), vec![TypeShape::concrete(STR)]),
        ];
        let tree = regenerate(&candidates).unwrap();
        assert_eq!(tree.run_types(&cs, &[TypeShape::concrete(NUM)]), None);
        assert_eq!(
            tree.run(&CallArguments {
                callsite: &cs,
                registers: &[TestValue::concrete(NUM)],
            }),
            None
        );
        assert_eq!(tree.run_callinfo(&cs, &[ArgFacts::known_concrete(NUM)]), None);
    }

    #[test]
    fn test_wildcard_never_beats_concrete() {
        let cs = obj_callsite(1, 1);
        let candidates = vec![
            Candidate::typed(cs.clone(), vec![TypeShape::any()]),
            Candidate::typed(cs.clone(), vec![TypeShape::concrete(INT)]),
        ];
        let tree = regenerate(&candidates).unwrap();
        // The concrete candidate wins although both accept an Int, and
        // although the wildcard was enumerated first.
        assert_eq!(tree.run_types(&cs, &[TypeShape::concrete(INT)]), Some(1));
        // Anything else lands on the wildcard.
        assert_eq!(tree.run_types(&cs, &[TypeShape::concrete(STR)]), Some(0));
    }

    #[test]
    fn test_type_object_and_concrete_are_distinct() {
        let cs = obj_callsite(1, 1);
        let candidates = vec![
            Candidate::typed(cs.clone(), vec![TypeShape::concrete(INT)]),
            Candidate::typed(cs.clone(), vec![TypeShape::type_object(INT)]),
        ];
        let tree = regenerate(&candidates).unwrap();
        assert_eq!(tree.run_types(&cs, &[TypeShape::concrete(INT)]), Some(0));
        assert_eq!(tree.run_types(&cs, &[TypeShape::type_object(INT)]), Some(1));
    }

    #[test]
    fn test_container_checks_live_path() {
        let cs = obj_callsite(1, 1);
        let candidates = vec![
            Candidate::typed(
                cs.clone(),
                vec![TypeShape::concrete(SCALAR)
                    .writable()
                    .with_contents(INT, true)],
            ),
            Candidate::typed(
                cs.clone(),
                vec![TypeShape::concrete(SCALAR).with_contents(STR, true)],
            ),
            Candidate::certain(cs.clone()),
        ];
        let tree = regenerate(&candidates).unwrap();
        let run = |v: TestValue| {
            tree.run(&CallArguments {
                callsite: &cs,
                registers: &[v],
            })
        };
        // RW scalar holding an Int: first candidate.
        assert_eq!(run(TestValue::container(SCALAR, INT, true)), Some(0));
        // Read-only scalar holding a Str: the writability check fails for
        // the first group, the chain falls through to the second.
        assert_eq!(run(TestValue::container(SCALAR, STR, false)), Some(1));
        // Read-only scalar holding an Int matches neither tuple.
        assert_eq!(run(TestValue::container(SCALAR, INT, false)), Some(2));
        // Not a container at all.
        assert_eq!(run(TestValue::concrete(SCALAR)), Some(2));
    }

    #[test]
    fn test_container_checks_types_and_facts() {
        let cs = obj_callsite(1, 1);
        let candidates = vec![
            Candidate::typed(
                cs.clone(),
                vec![TypeShape::concrete(SCALAR)
                    .writable()
                    .with_contents(INT, true)],
            ),
            Candidate::certain(cs.clone()),
        ];
        let tree = regenerate(&candidates).unwrap();

        let hit = TypeShape::concrete(SCALAR).writable().with_contents(INT, true);
        assert_eq!(tree.run_types(&cs, &[hit]), Some(0));
        let read_only = TypeShape::concrete(SCALAR).with_contents(INT, true);
        assert_eq!(tree.run_types(&cs, &[read_only]), Some(1));

        let facts_hit = ArgFacts::known_concrete(SCALAR)
            .rw_container()
            .with_contents(INT, true);
        assert_eq!(tree.run_callinfo(&cs, &[facts_hit]), Some(0));
        let facts_no_decont = ArgFacts::known_concrete(SCALAR).rw_container();
        assert_eq!(tree.run_callinfo(&cs, &[facts_no_decont]), Some(1));
    }

    #[test]
    fn test_contents_mismatch_reloads_before_next_group() {
        const PROXY: TypeId = TypeId::new(11);
        let cs = obj_callsite(1, 1);
        let candidates = vec![
            Candidate::typed(
                cs.clone(),
                vec![TypeShape::concrete(SCALAR).with_contents(INT, true)],
            ),
            Candidate::typed(
                cs.clone(),
                vec![TypeShape::concrete(PROXY).with_contents(INT, true)],
            ),
            Candidate::certain(cs.clone()),
        ];
        let tree = regenerate(&candidates).unwrap();

        // A Scalar holding a Proxy-typed value: the first group's contents
        // check fails, and the second group's type check must see the
        // Scalar argument again, not the Proxy it contained.
        let tricky = TestValue::container(SCALAR, PROXY, false);
        assert_eq!(
            tree.run(&CallArguments {
                callsite: &cs,
                registers: &[tricky],
            }),
            Some(2)
        );
        let tricky_shape = TypeShape::concrete(SCALAR).with_contents(PROXY, true);
        assert_eq!(tree.run_types(&cs, &[tricky_shape]), Some(2));

        // The straightforward cases still resolve to their groups.
        assert_eq!(
            tree.run(&CallArguments {
                callsite: &cs,
                registers: &[TestValue::container(SCALAR, INT, false)],
            }),
            Some(0)
        );
        assert_eq!(
            tree.run(&CallArguments {
                callsite: &cs,
                registers: &[TestValue::container(PROXY, INT, false)],
            }),
            Some(1)
        );
    }

    #[test]
    fn test_callinfo_register_out_of_range_is_no_match() {
        // Five object args puts the last register beyond the optimizer's
        // fact window.
        let cs = obj_callsite(1, 5);
        let mut tuple = vec![TypeShape::any(); 5];
        tuple[4] = TypeShape::concrete(INT);
        let candidates = vec![Candidate::typed(cs.clone(), tuple)];
        let tree = regenerate(&candidates).unwrap();

        let facts = [ArgFacts::known_concrete(INT); 5];
        assert_eq!(tree.run_callinfo(&cs, &facts), None);

        // The same tuple resolves fine where facts are not range-limited.
        let mut types = vec![TypeShape::concrete(NUM); 5];
        types[4] = TypeShape::concrete(INT);
        assert_eq!(tree.run_types(&cs, &types), Some(0));
    }

    #[test]
    fn test_named_argument_type_tuple_remap() {
        let cs = Arc::new(CallsiteDescriptor::new(
            CallsiteId::new(1),
            vec![ArgFlags::OBJ, ArgFlags::OBJ | ArgFlags::NAMED],
        ));
        let candidates = vec![Candidate::typed(
            cs.clone(),
            vec![TypeShape::concrete(INT), TypeShape::concrete(STR)],
        )];
        let tree = regenerate(&candidates).unwrap();
        // The tuple passed to run_types is in flag order, even though the
        // guard addresses the named value's register.
        assert_eq!(
            tree.run_types(&cs, &[TypeShape::concrete(INT), TypeShape::concrete(STR)]),
            Some(0)
        );
        assert_eq!(
            tree.run_types(&cs, &[TypeShape::concrete(INT), TypeShape::concrete(INT)]),
            None
        );
    }

    #[test]
    fn test_empty_tree_never_matches() {
        let tree = GuardTree::empty();
        let cs = obj_callsite(1, 1);
        assert_eq!(tree.run_types(&cs, &[TypeShape::concrete(INT)]), None);
        assert_eq!(tree.run_callinfo(&cs, &[ArgFacts::known_concrete(INT)]), None);
        assert_eq!(
            tree.run(&CallArguments::<TestValue> {
                callsite: &cs,
                registers: &[],
            }),
            None
        );
    }

    #[test]
    fn test_determinism_across_regeneration() {
        let (tree_a, cs) = example_tree();
        let (tree_b, _) = example_tree();
        for shape in [
            TypeShape::concrete(INT),
            TypeShape::concrete(STR),
            TypeShape::concrete(NUM),
            TypeShape::type_object(INT),
        ] {
            let tuple = [shape, TypeShape::concrete(NUM)];
            assert_eq!(tree_a.run_types(&cs, &tuple), tree_b.run_types(&cs, &tuple));
            assert_eq!(tree_a.run_types(&cs, &tuple), tree_a.run_types(&cs, &tuple));
        }
    }
}
