use super::{BasicBlockBuilder, FlowGraphBuilder};
use crate::{
    inst::{Instruction, InstructionPrototype},
    tag::{BasicBlockTag, ValueTag},
    types::Type,
};

/// A handle to one named instruction of a [`FlowGraphBuilder`].
#[derive(Clone)]
pub struct NamedInstructionBuilder<'a> {
    builder: &'a FlowGraphBuilder,
    tag: ValueTag,
}

impl<'a> NamedInstructionBuilder<'a> {
    pub(super) fn new(builder: &'a FlowGraphBuilder, tag: ValueTag) -> Self {
        Self { builder, tag }
    }

    pub fn tag(&self) -> &ValueTag {
        &self.tag
    }

    pub fn builder(&self) -> &'a FlowGraphBuilder {
        self.builder
    }

    pub fn block(&self) -> BasicBlockBuilder<'a> {
        self.builder.get_value_parent(&self.tag)
    }

    pub fn instruction(&self) -> Instruction {
        self.builder
            .read(|graph| graph.get_instruction(&self.tag).instruction().clone())
    }

    pub fn result_type(&self) -> Type {
        self.builder.get_value_type(&self.tag)
    }

    /// The position of this instruction within its block.
    pub fn index(&self) -> usize {
        self.builder.read(|graph| {
            let block = graph.get_value_parent(&self.tag);
            graph
                .get_basic_block(block)
                .instruction_tags()
                .position(|tag| tag == &self.tag)
                .unwrap_or_else(|| panic!("instruction `{:?}` is not in its block", self.tag))
        })
    }

    pub fn set_instruction(&self, instruction: Instruction) {
        self.builder
            .update(|graph| graph.replace_instruction(&self.tag, instruction));
    }

    pub fn replace_instruction(
        &self,
        prototype: &InstructionPrototype,
        arguments: impl IntoIterator<Item = ValueTag>,
    ) {
        self.set_instruction(prototype.instantiate(arguments));
    }

    pub fn insert_before(
        &self,
        instruction: Instruction,
        name: &str,
    ) -> NamedInstructionBuilder<'a> {
        self.block()
            .insert_instruction(self.index(), instruction, name)
    }

    pub fn insert_after(
        &self,
        instruction: Instruction,
        name: &str,
    ) -> NamedInstructionBuilder<'a> {
        self.block()
            .insert_instruction(self.index() + 1, instruction, name)
    }

    pub fn remove(&self) {
        self.builder
            .update(|graph| graph.remove_instruction(&self.tag));
    }

    /// Lowers this instruction in place if its prototype is fused.
    pub fn expand(&self) -> bool {
        let instruction = self.instruction();
        let expanded = instruction.prototype().kind().expand(self);
        if expanded {
            tracing::trace!(
                tag = ?self.tag,
                proto = %instruction.prototype(),
                "expanded fused instruction"
            );
        }
        expanded
    }
}

/// A handle to the instruction embedded in a block's flow.
#[derive(Clone)]
pub struct FlowInstructionBuilder<'a> {
    builder: &'a FlowGraphBuilder,
    block: BasicBlockTag,
}

impl<'a> FlowInstructionBuilder<'a> {
    pub(super) fn new(builder: &'a FlowGraphBuilder, block: BasicBlockTag) -> Self {
        Self { builder, block }
    }

    pub fn block(&self) -> BasicBlockBuilder<'a> {
        self.builder.get_basic_block(&self.block)
    }

    pub fn instruction(&self) -> Instruction {
        let flow = self.block().flow();
        match flow.instructions() {
            [instruction] => instruction.clone(),
            _ => panic!(
                "`{}` flow of block `{:?}` has no instruction",
                flow.kind_name(),
                self.block
            ),
        }
    }

    pub fn set_instruction(&self, instruction: Instruction) {
        let block = self.block();
        let flow = block.flow().with_instructions(vec![instruction]);
        block.set_flow(flow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::BlockParameter,
        inst::{CopyPrototype, Prototype},
        types::Constant,
    };

    #[test]
    fn insert_around() {
        let builder = FlowGraphBuilder::new();
        let entry = builder.entry_point();
        let mid = entry.append_instruction(
            Instruction::constant(Constant::Int(2), Type::I32),
            "mid",
        );
        let before = mid.insert_before(
            Instruction::constant(Constant::Int(1), Type::I32),
            "before",
        );
        let after = mid.insert_after(Instruction::constant(Constant::Int(3), Type::I32), "after");

        assert_eq!(
            entry.instruction_tags(),
            vec![before.tag().clone(), mid.tag().clone(), after.tag().clone()]
        );
        assert_eq!(mid.index(), 1);

        mid.remove();
        assert_eq!(entry.instruction_tags(), vec![before.tag().clone(), after.tag().clone()]);
    }

    #[test]
    fn replace_keeps_tag() {
        let builder = FlowGraphBuilder::new();
        let entry = builder.entry_point();
        let x = entry.append_parameter(BlockParameter::new(Type::I64, "x"));
        let inst = entry.append_instruction(
            Instruction::constant(Constant::Int(0), Type::I32),
            "v",
        );

        inst.replace_instruction(&CopyPrototype { ty: Type::I64 }.intern(), [x]);
        assert_eq!(inst.result_type(), Type::I64);
        assert!(!inst.expand());
    }

    #[test]
    #[should_panic(expected = "is not in this graph")]
    fn removed_tags_panic() {
        let builder = FlowGraphBuilder::new();
        let inst = builder
            .entry_point()
            .append_instruction(Instruction::constant(Constant::Bool(true), Type::Bool), "b");
        inst.remove();
        inst.set_instruction(Instruction::constant(Constant::Bool(false), Type::Bool));
    }
}
