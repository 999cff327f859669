use super::{FlowGraphBuilder, FlowInstructionBuilder, NamedInstructionBuilder};
use crate::{
    flow::BlockFlow,
    graph::BlockParameter,
    inst::Instruction,
    tag::{BasicBlockTag, ValueTag},
};

/// A handle to one block of a [`FlowGraphBuilder`].
#[derive(Clone)]
pub struct BasicBlockBuilder<'a> {
    builder: &'a FlowGraphBuilder,
    tag: BasicBlockTag,
}

impl<'a> BasicBlockBuilder<'a> {
    pub(super) fn new(builder: &'a FlowGraphBuilder, tag: BasicBlockTag) -> Self {
        Self { builder, tag }
    }

    pub fn tag(&self) -> &BasicBlockTag {
        &self.tag
    }

    pub fn builder(&self) -> &'a FlowGraphBuilder {
        self.builder
    }

    pub fn parameters(&self) -> Vec<BlockParameter> {
        self.builder
            .read(|graph| graph.get_basic_block(&self.tag).parameters().cloned().collect())
    }

    pub fn parameter_tags(&self) -> Vec<ValueTag> {
        self.parameters().into_iter().map(|param| param.tag).collect()
    }

    pub fn append_parameter(&self, parameter: BlockParameter) -> ValueTag {
        let tag = parameter.tag.clone();
        self.builder
            .update(|graph| graph.append_parameter(&self.tag, parameter));
        tag
    }

    pub fn set_parameters(&self, parameters: impl IntoIterator<Item = BlockParameter>) {
        self.builder
            .update(|graph| graph.with_parameters(&self.tag, parameters));
    }

    pub fn remove_parameters(&self) {
        self.set_parameters([]);
    }

    pub fn instruction_tags(&self) -> Vec<ValueTag> {
        self.builder.read(|graph| {
            graph
                .get_basic_block(&self.tag)
                .instruction_tags()
                .cloned()
                .collect()
        })
    }

    pub fn named_instructions(&self) -> Vec<NamedInstructionBuilder<'a>> {
        self.instruction_tags()
            .into_iter()
            .map(|tag| NamedInstructionBuilder::new(self.builder, tag))
            .collect()
    }

    pub fn append_instruction(
        &self,
        instruction: Instruction,
        name: &str,
    ) -> NamedInstructionBuilder<'a> {
        let tag = self
            .builder
            .update_with(|graph| graph.append_instruction(&self.tag, instruction, name));
        NamedInstructionBuilder::new(self.builder, tag)
    }

    pub fn insert_instruction(
        &self,
        index: usize,
        instruction: Instruction,
        name: &str,
    ) -> NamedInstructionBuilder<'a> {
        let tag = ValueTag::new(name);
        self.builder.update(|graph| {
            graph.insert_instruction(&self.tag, index, tag.clone(), instruction)
        });
        NamedInstructionBuilder::new(self.builder, tag)
    }

    pub fn flow(&self) -> BlockFlow {
        self.builder
            .read(|graph| graph.get_basic_block(&self.tag).flow().clone())
    }

    pub fn set_flow(&self, flow: BlockFlow) {
        self.builder
            .update(|graph| graph.update_block_flow(&self.tag, flow));
    }

    /// The anonymous instruction embedded in this block's flow, if any.
    pub fn flow_instruction(&self) -> Option<FlowInstructionBuilder<'a>> {
        (!self.flow().instructions().is_empty())
            .then(|| FlowInstructionBuilder::new(self.builder, self.tag.clone()))
    }

    pub fn remove(&self) {
        self.builder.remove_basic_block(&self.tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Constant, Type};

    #[test]
    fn insert_and_remove_parameters() {
        let builder = FlowGraphBuilder::new();
        let entry = builder.entry_point();
        let a = entry.append_instruction(Instruction::constant(Constant::Int(1), Type::I32), "a");
        let b = entry.insert_instruction(
            0,
            Instruction::constant(Constant::Int(2), Type::I32),
            "b",
        );
        assert_eq!(entry.instruction_tags(), vec![b.tag().clone(), a.tag().clone()]);

        let x = entry.append_parameter(BlockParameter::new(Type::Bool, "x"));
        assert_eq!(entry.parameter_tags(), vec![x.clone()]);
        entry.remove_parameters();
        assert!(entry.parameters().is_empty());
        assert!(!builder.contains_value(&x));
    }

    #[test]
    fn flow_instruction_only_for_try() {
        let builder = FlowGraphBuilder::new();
        let entry = builder.entry_point();
        assert!(entry.flow_instruction().is_none());

        let target = builder.add_basic_block("ok");
        let inst = Instruction::constant(Constant::Int(7), Type::I64);
        entry.set_flow(BlockFlow::try_flow(
            inst.clone(),
            crate::flow::Branch::new(target.tag().clone(), []),
            crate::flow::Branch::new(target.tag().clone(), []),
        ));
        let flow_inst = entry.flow_instruction().unwrap();
        assert_eq!(flow_inst.instruction(), inst);
    }
}
