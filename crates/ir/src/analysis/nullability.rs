use rustc_hash::FxHashSet;

use super::FlowGraphAnalysis;
use crate::{
    graph::FlowGraph,
    inst::PrototypeKind,
    tag::ValueTag,
    types::{Constant, PointerKind, Type},
};

/// The set of values known never to be null.
#[derive(Debug, Clone, Default)]
pub struct ValueNullability {
    non_null: FxHashSet<ValueTag>,
}

impl ValueNullability {
    pub fn is_non_null(&self, value: &ValueTag) -> bool {
        self.non_null.contains(value)
    }
}

/// Collects values that are non-null by construction: reference pointers,
/// fresh allocations, field addresses, string constants, and copies of any
/// of these.
pub struct NullabilityAnalysis;

impl NullabilityAnalysis {
    fn is_non_null_type(ty: &Type) -> bool {
        matches!(ty.as_pointer(), Some(ptr) if ptr.kind == PointerKind::Reference)
    }
}

impl FlowGraphAnalysis for NullabilityAnalysis {
    type Output = ValueNullability;

    fn analyze(&self, graph: &FlowGraph) -> ValueNullability {
        let mut non_null = FxHashSet::default();

        for block in graph.basic_blocks() {
            for param in block.parameters() {
                if Self::is_non_null_type(&param.ty) {
                    non_null.insert(param.tag.clone());
                }
            }
        }

        // Copies may precede their source in graph order; iterate to a fixpoint.
        let mut changed = true;
        while changed {
            changed = false;
            for inst in graph.named_instructions() {
                if non_null.contains(inst.tag()) {
                    continue;
                }

                let is_non_null = match inst.instruction().prototype().kind() {
                    PrototypeKind::Alloca(_)
                    | PrototypeKind::Box(_)
                    | PrototypeKind::NewObject(_)
                    | PrototypeKind::GetFieldPointer(_)
                    | PrototypeKind::GetStaticFieldPointer(_)
                    | PrototypeKind::Unbox(_) => true,
                    PrototypeKind::Constant(proto) => matches!(proto.value, Constant::String(_)),
                    PrototypeKind::Copy(_) | PrototypeKind::ReinterpretCast(_) => {
                        non_null.contains(inst.instruction().argument(0))
                    }
                    _ => Self::is_non_null_type(&inst.result_type()),
                };

                if is_non_null {
                    non_null.insert(inst.tag().clone());
                    changed = true;
                }
            }
        }

        ValueNullability { non_null }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{graph::BlockParameter, inst::Instruction};

    #[test]
    fn allocations_and_copies() {
        let graph = FlowGraph::new();
        let entry = graph.entry_point_tag().clone();
        let boxed = BlockParameter::new(Type::I32.make_pointer(PointerKind::Box), "boxed");
        let graph = graph.append_parameter(&entry, boxed.clone());
        let (graph, slot) = graph.append_instruction(
            &entry,
            Instruction::alloca(Type::I32),
            "slot",
        );
        let slot_ty = graph.get_value_type(&slot);
        let (graph, copy) = graph.append_instruction(
            &entry,
            Instruction::copy(slot_ty, slot.clone()),
            "copy",
        );

        let nullability = graph.get_analysis_result::<ValueNullability>();
        assert!(nullability.is_non_null(&slot));
        assert!(nullability.is_non_null(&copy));
        assert!(!nullability.is_non_null(&boxed.tag));
    }
}
