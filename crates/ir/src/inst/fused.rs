//! Fused prototypes: instruction kinds defined entirely by a lowering into
//! canonical instructions.
//!
//! A fused prototype never states its result type or conformance rules
//! directly. Both are read off its expansion, so the fused form and its
//! lowering cannot disagree.
use std::fmt;

use super::{Instruction, InstructionPrototype, Prototype};
use crate::{
    body::MethodBody,
    builder::{FlowGraphBuilder, NamedInstructionBuilder},
    graph::BlockParameter,
    tag::ValueTag,
    types::{Field, MemberMapping, Type},
};

pub trait FusedPrototype: Prototype {
    /// Rewrites `site`, an instance of this prototype, into canonical
    /// instructions. The site's tag must end up naming the instruction that
    /// produces the overall result.
    ///
    /// An expansion may only touch `site` and insert instructions directly
    /// before it; it must not inspect any other part of the graph.
    fn expand(&self, site: &NamedInstructionBuilder<'_>);
}

/// Expands a throwaway instance and reports the type of its last instruction.
fn expanded_result_type<P: FusedPrototype>(proto: &P) -> Type {
    let builder = FlowGraphBuilder::new();
    let entry = builder.entry_point();

    // Argument types never influence an expansion.
    let args: Vec<ValueTag> = (0..proto.parameter_count())
        .map(|_| entry.append_parameter(BlockParameter::new(Type::Void, "arg")))
        .collect();
    let site = entry.append_instruction(proto.instantiate(args), "fused");
    proto.expand(&site);

    let last = entry
        .instruction_tags()
        .pop()
        .unwrap_or_else(|| panic!("expansion of `{}` produced no instructions", proto.intern()));
    let ty = builder.get_instruction(&last).result_type();
    tracing::trace!(proto = %proto.intern(), %ty, "computed fused result type");
    ty
}

/// Expands `instruction` inside a scratch copy of `body` and collects the
/// conformance output of every instruction the expansion produced.
fn expanded_conformance<P: FusedPrototype>(
    proto: &P,
    instruction: &Instruction,
    body: &MethodBody,
) -> Vec<String> {
    let builder = FlowGraphBuilder::from_graph(body.implementation());
    let scratch = builder.add_basic_block("fused.scratch");
    let site = scratch.append_instruction(instruction.clone(), "fused");
    proto.expand(&site);

    let scratch_body = body.with_implementation(builder.to_immutable());
    scratch
        .named_instructions()
        .iter()
        .flat_map(|inst| inst.instruction().check_conformance(&scratch_body))
        .collect()
}

/// Loads an instance field: `get_field_pointer` followed by `load`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadFieldPrototype {
    pub field: Field,
}

impl LoadFieldPrototype {
    pub fn base_pointer<'a>(&self, instruction: &'a Instruction) -> &'a ValueTag {
        instruction.argument(0)
    }
}

impl Prototype for LoadFieldPrototype {
    fn parameter_count(&self) -> usize {
        1
    }

    fn result_type(&self) -> Type {
        expanded_result_type(self)
    }

    fn check_conformance(&self, instruction: &Instruction, body: &MethodBody) -> Vec<String> {
        expanded_conformance(self, instruction, body)
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
            field: mapping.map_field(&self.field),
        }
        .intern()
    }

    fn as_text(&self) -> &'static str {
        "load_field"
    }
}

impl FusedPrototype for LoadFieldPrototype {
    fn expand(&self, site: &NamedInstructionBuilder<'_>) {
        let base = self.base_pointer(&site.instruction()).clone();
        let field_ptr = site.insert_before(
            Instruction::get_field_pointer(self.field.clone(), base),
            "field_ptr",
        );
        site.set_instruction(Instruction::load(
            self.field.field_type.clone(),
            field_ptr.tag().clone(),
        ));
    }
}

impl fmt::Display for LoadFieldPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_text(), self.field)
    }
}

/// Stores to an instance field: `get_field_pointer` followed by `store`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreFieldPrototype {
    pub field: Field,
}

impl StoreFieldPrototype {
    pub fn base_pointer<'a>(&self, instruction: &'a Instruction) -> &'a ValueTag {
        instruction.argument(0)
    }

    pub fn value<'a>(&self, instruction: &'a Instruction) -> &'a ValueTag {
        instruction.argument(1)
    }
}

impl Prototype for StoreFieldPrototype {
    fn parameter_count(&self) -> usize {
        2
    }

    fn result_type(&self) -> Type {
        expanded_result_type(self)
    }

    fn check_conformance(&self, instruction: &Instruction, body: &MethodBody) -> Vec<String> {
        expanded_conformance(self, instruction, body)
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
            field: mapping.map_field(&self.field),
        }
        .intern()
    }

    fn as_text(&self) -> &'static str {
        "store_field"
    }
}

impl FusedPrototype for StoreFieldPrototype {
    fn expand(&self, site: &NamedInstructionBuilder<'_>) {
        let instruction = site.instruction();
        let base = self.base_pointer(&instruction).clone();
        let value = self.value(&instruction).clone();

        let field_ptr = site.insert_before(
            Instruction::get_field_pointer(self.field.clone(), base),
            "field_ptr",
        );
        site.set_instruction(Instruction::store(
            self.field.field_type.clone(),
            field_ptr.tag().clone(),
            value,
        ));
    }
}

impl fmt::Display for StoreFieldPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_text(), self.field)
    }
}

impl Instruction {
    pub fn load_field(field: Field, base: ValueTag) -> Self {
        LoadFieldPrototype { field }.instantiate([base])
    }

    pub fn store_field(field: Field, base: ValueTag, value: ValueTag) -> Self {
        StoreFieldPrototype { field }.instantiate([base, value])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        inst::{GetFieldPointerPrototype, PrototypeKind, StorePrototype},
        types::PointerKind,
    };

    fn count_field() -> Field {
        Field::new(Type::named("Counter"), "count", Type::I32)
    }

    #[test]
    fn load_field_result_type() {
        let proto = LoadFieldPrototype { field: count_field() }.intern();
        assert_eq!(proto.result_type(), Type::I32);
    }

    #[test]
    fn store_field_expands_in_place() {
        let builder = FlowGraphBuilder::new();
        let entry = builder.entry_point();
        let counter = Type::named("Counter").make_pointer(PointerKind::Box);
        let base = entry.append_parameter(BlockParameter::new(counter, "this"));
        let value = entry.append_parameter(BlockParameter::new(Type::I32, "value"));

        let site = entry.append_instruction(
            Instruction::store_field(count_field(), base.clone(), value.clone()),
            "site",
        );
        assert!(site.expand());

        let insts = entry.named_instructions();
        assert_eq!(insts.len(), 2);
        assert!(matches!(
            insts[0].instruction().prototype().kind(),
            PrototypeKind::GetFieldPointer(GetFieldPointerPrototype { field })
                if *field == count_field()
        ));
        assert_eq!(insts[0].instruction().arguments(), &[base]);
        assert!(matches!(
            insts[1].instruction().prototype().kind(),
            PrototypeKind::Store(StorePrototype { ty }) if *ty == Type::I32
        ));
        assert_eq!(
            insts[1].instruction().arguments(),
            &[insts[0].tag().clone(), value]
        );
        assert_eq!(insts[1].tag(), site.tag());
    }
}
