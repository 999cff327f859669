//! The immutable, persistent control-flow graph.
//!
//! Every edit is a pure function from one [`FlowGraph`] to the next; the
//! receiver is never modified. Blocks and value definitions live in
//! persistent maps, so an edit only copies the path to what changed and two
//! graphs that share history also share most of their storage.
use std::fmt;

use im::{OrdMap, Vector};
use rustc_hash::FxHashMap;

use crate::{
    analysis::{AnalysisCaches, FlowGraphUpdate},
    flow::BlockFlow,
    inst::Instruction,
    ir_writer::GraphWriter,
    tag::{BasicBlockTag, ValueTag},
    types::{MemberMapping, Type},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockParameter {
    pub tag: ValueTag,
    pub ty: Type,
}

impl BlockParameter {
    pub fn new(ty: Type, name: &str) -> Self {
        Self {
            tag: ValueTag::new(name),
            ty,
        }
    }

    pub fn with_tag(ty: Type, tag: ValueTag) -> Self {
        Self { tag, ty }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct BasicBlockData {
    parameters: Vector<BlockParameter>,
    instructions: Vector<ValueTag>,
    flow: BlockFlow,
}

#[derive(Debug, Clone)]
enum ValueDef {
    Parameter {
        block: BasicBlockTag,
        ty: Type,
    },
    Instruction {
        block: BasicBlockTag,
        instruction: Instruction,
    },
}

impl ValueDef {
    fn block(&self) -> &BasicBlockTag {
        match self {
            Self::Parameter { block, .. } | Self::Instruction { block, .. } => block,
        }
    }
}

#[derive(Clone)]
pub struct FlowGraph {
    entry: BasicBlockTag,
    blocks: OrdMap<BasicBlockTag, BasicBlockData>,
    /// Every value defined in the graph and the block that owns it.
    values: OrdMap<ValueTag, ValueDef>,
    pub(crate) analyses: AnalysisCaches,
}

impl FlowGraph {
    /// A graph with a single empty entry block and the default analyses.
    pub fn new() -> Self {
        let entry = BasicBlockTag::new("entry");
        Self {
            blocks: OrdMap::unit(entry.clone(), BasicBlockData::default()),
            entry,
            values: OrdMap::new(),
            analyses: AnalysisCaches::default(),
        }
        .with_default_analyses()
    }

    fn updated(mut self, update: FlowGraphUpdate) -> Self {
        self.analyses = self.analyses.derive(&update);
        self
    }

    fn block_mut(&mut self, tag: &BasicBlockTag) -> &mut BasicBlockData {
        self.blocks
            .get_mut(tag)
            .unwrap_or_else(|| panic!("block `{tag:?}` is not in this graph"))
    }

    fn block_data(&self, tag: &BasicBlockTag) -> &BasicBlockData {
        self.blocks
            .get(tag)
            .unwrap_or_else(|| panic!("block `{tag:?}` is not in this graph"))
    }

    fn value_def(&self, tag: &ValueTag) -> &ValueDef {
        self.values
            .get(tag)
            .unwrap_or_else(|| panic!("value `{tag:?}` is not in this graph"))
    }

    fn define(&mut self, tag: ValueTag, def: ValueDef) {
        assert!(
            !self.values.contains_key(&tag),
            "value `{tag:?}` is already defined in this graph"
        );
        self.values.insert(tag, def);
    }

    /*
     * Queries.
     */

    pub fn entry_point_tag(&self) -> &BasicBlockTag {
        &self.entry
    }

    pub fn entry_point(&self) -> BasicBlock<'_> {
        self.get_basic_block(&self.entry)
    }

    /// Block tags in creation order.
    pub fn basic_block_tags(&self) -> impl Iterator<Item = &BasicBlockTag> {
        self.blocks.keys()
    }

    pub fn basic_blocks(&self) -> impl Iterator<Item = BasicBlock<'_>> {
        self.blocks.iter().map(move |(tag, data)| BasicBlock {
            graph: self,
            tag,
            data,
        })
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn contains_basic_block(&self, tag: &BasicBlockTag) -> bool {
        self.blocks.contains_key(tag)
    }

    /// # Panics
    /// Panics if `tag` is not a block of this graph.
    pub fn get_basic_block(&self, tag: &BasicBlockTag) -> BasicBlock<'_> {
        self.try_get_basic_block(tag)
            .unwrap_or_else(|| panic!("block `{tag:?}` is not in this graph"))
    }

    pub fn try_get_basic_block(&self, tag: &BasicBlockTag) -> Option<BasicBlock<'_>> {
        let (tag, data) = self.blocks.get_key_value(tag)?;
        Some(BasicBlock {
            graph: self,
            tag,
            data,
        })
    }

    pub fn value_tags(&self) -> impl Iterator<Item = &ValueTag> {
        self.values.keys()
    }

    pub fn contains_value(&self, tag: &ValueTag) -> bool {
        self.values.contains_key(tag)
    }

    pub fn contains_instruction(&self, tag: &ValueTag) -> bool {
        matches!(self.values.get(tag), Some(ValueDef::Instruction { .. }))
    }

    pub fn contains_block_parameter(&self, tag: &ValueTag) -> bool {
        matches!(self.values.get(tag), Some(ValueDef::Parameter { .. }))
    }

    /// # Panics
    /// Panics if `tag` is not a named instruction of this graph.
    pub fn get_instruction(&self, tag: &ValueTag) -> NamedInstruction<'_> {
        self.try_get_instruction(tag)
            .unwrap_or_else(|| panic!("instruction `{tag:?}` is not in this graph"))
    }

    pub fn try_get_instruction(&self, tag: &ValueTag) -> Option<NamedInstruction<'_>> {
        match self.values.get_key_value(tag)? {
            (tag, ValueDef::Instruction { block, instruction }) => Some(NamedInstruction {
                tag,
                block,
                instruction,
            }),
            _ => None,
        }
    }

    /// Named instructions of every block, in block order.
    pub fn named_instructions(&self) -> impl Iterator<Item = NamedInstruction<'_>> {
        self.basic_blocks()
            .flat_map(|block| block.named_instructions())
    }

    /// # Panics
    /// Panics if `tag` is not defined in this graph.
    pub fn get_value_type(&self, tag: &ValueTag) -> Type {
        match self.value_def(tag) {
            ValueDef::Parameter { ty, .. } => ty.clone(),
            ValueDef::Instruction { instruction, .. } => instruction.result_type(),
        }
    }

    /// The block that defines `tag`.
    ///
    /// # Panics
    /// Panics if `tag` is not defined in this graph.
    pub fn get_value_parent(&self, tag: &ValueTag) -> &BasicBlockTag {
        self.value_def(tag).block()
    }

    /*
     * Edits. Each returns a new graph.
     */

    pub fn with_entry_point(&self, tag: &BasicBlockTag) -> Self {
        assert!(
            self.contains_basic_block(tag),
            "block `{tag:?}` is not in this graph"
        );
        let mut graph = self.clone();
        graph.entry = tag.clone();
        graph.updated(FlowGraphUpdate::SetEntryPoint(tag.clone()))
    }

    /// Adds an empty block with `Unreachable` flow under a caller-made tag.
    pub fn with_basic_block(&self, tag: BasicBlockTag) -> Self {
        assert!(
            !self.contains_basic_block(&tag),
            "block `{tag:?}` is already in this graph"
        );
        let mut graph = self.clone();
        graph.blocks.insert(tag.clone(), BasicBlockData::default());
        graph.updated(FlowGraphUpdate::AddBasicBlock(tag))
    }

    pub fn add_basic_block(&self, name: &str) -> (Self, BasicBlockTag) {
        let tag = BasicBlockTag::new(name);
        (self.with_basic_block(tag.clone()), tag)
    }

    /// Removes a block together with its parameters and instructions.
    ///
    /// # Panics
    /// Panics if `tag` is the entry point.
    pub fn remove_basic_block(&self, tag: &BasicBlockTag) -> Self {
        assert!(tag != &self.entry, "the entry point cannot be removed");
        let mut graph = self.clone();
        let data = graph
            .blocks
            .remove(tag)
            .unwrap_or_else(|| panic!("block `{tag:?}` is not in this graph"));

        for param in data.parameters.iter() {
            graph.values.remove(&param.tag);
        }
        for inst in data.instructions.iter() {
            graph.values.remove(inst);
        }
        graph.updated(FlowGraphUpdate::RemoveBasicBlock(tag.clone()))
    }

    /// Replaces all parameters of `block`.
    pub fn with_parameters(
        &self,
        block: &BasicBlockTag,
        parameters: impl IntoIterator<Item = BlockParameter>,
    ) -> Self {
        let mut graph = self.clone();
        let old = std::mem::take(&mut graph.block_mut(block).parameters);
        for param in old.iter() {
            graph.values.remove(&param.tag);
        }

        let parameters: Vector<_> = parameters.into_iter().collect();
        for param in parameters.iter() {
            graph.define(
                param.tag.clone(),
                ValueDef::Parameter {
                    block: block.clone(),
                    ty: param.ty.clone(),
                },
            );
        }
        graph.block_mut(block).parameters = parameters;
        graph.updated(FlowGraphUpdate::BasicBlockParameters(block.clone()))
    }

    pub fn append_parameter(&self, block: &BasicBlockTag, parameter: BlockParameter) -> Self {
        let mut graph = self.clone();
        graph.define(
            parameter.tag.clone(),
            ValueDef::Parameter {
                block: block.clone(),
                ty: parameter.ty.clone(),
            },
        );
        graph.block_mut(block).parameters.push_back(parameter);
        graph.updated(FlowGraphUpdate::BasicBlockParameters(block.clone()))
    }

    /// Inserts `instruction` under `tag` at position `index` of `block`.
    pub fn insert_instruction(
        &self,
        block: &BasicBlockTag,
        index: usize,
        tag: ValueTag,
        instruction: Instruction,
    ) -> Self {
        let mut graph = self.clone();
        graph.define(
            tag.clone(),
            ValueDef::Instruction {
                block: block.clone(),
                instruction,
            },
        );
        graph.block_mut(block).instructions.insert(index, tag.clone());
        graph.updated(FlowGraphUpdate::AddInstruction(tag))
    }

    pub fn append_instruction(
        &self,
        block: &BasicBlockTag,
        instruction: Instruction,
        name: &str,
    ) -> (Self, ValueTag) {
        let tag = ValueTag::new(name);
        let index = self.block_data(block).instructions.len();
        (
            self.insert_instruction(block, index, tag.clone(), instruction),
            tag,
        )
    }

    /// Swaps the instruction named `tag` for another, keeping its position.
    pub fn replace_instruction(&self, tag: &ValueTag, instruction: Instruction) -> Self {
        let mut graph = self.clone();
        match graph.values.get_mut(tag) {
            Some(ValueDef::Instruction {
                instruction: slot, ..
            }) => *slot = instruction,
            _ => panic!("instruction `{tag:?}` is not in this graph"),
        }
        graph.updated(FlowGraphUpdate::ReplaceInstruction(tag.clone()))
    }

    pub fn remove_instruction(&self, tag: &ValueTag) -> Self {
        let mut graph = self.clone();
        let block = match graph.values.remove(tag) {
            Some(ValueDef::Instruction { block, .. }) => block,
            _ => panic!("instruction `{tag:?}` is not in this graph"),
        };

        let insts = &mut graph.block_mut(&block).instructions;
        if let Some(index) = insts.index_of(tag) {
            insts.remove(index);
        }
        graph.updated(FlowGraphUpdate::RemoveInstruction(tag.clone()))
    }

    /// Removes a set of instructions and block parameters at once.
    pub fn remove_definitions<'a>(&self, tags: impl IntoIterator<Item = &'a ValueTag>) -> Self {
        tags.into_iter().fold(self.clone(), |graph, tag| match graph.value_def(tag) {
            ValueDef::Instruction { .. } => graph.remove_instruction(tag),
            ValueDef::Parameter { block, .. } => {
                let block = block.clone();
                let params: Vec<_> = graph
                    .get_basic_block(&block)
                    .parameters()
                    .filter(|param| &param.tag != tag)
                    .cloned()
                    .collect();
                graph.with_parameters(&block, params)
            }
        })
    }

    pub fn update_block_flow(&self, block: &BasicBlockTag, flow: BlockFlow) -> Self {
        let mut graph = self.clone();
        graph.block_mut(block).flow = flow;
        graph.updated(FlowGraphUpdate::BasicBlockFlow(block.clone()))
    }

    /// Rewrites every use of a key of `replacements` into the matching value.
    /// Definitions are left alone.
    pub fn replace_uses(&self, replacements: &FxHashMap<ValueTag, ValueTag>) -> Self {
        let subst = |tag: &ValueTag| replacements.get(tag).unwrap_or(tag).clone();
        let replaced = |tag: &ValueTag| replacements.contains_key(tag);

        let mut graph = self.clone();
        for (tag, def) in self.values.iter() {
            if let ValueDef::Instruction { instruction, .. } = def {
                if instruction.arguments().iter().any(replaced) {
                    graph = graph.replace_instruction(tag, instruction.map_arguments(subst));
                }
            }
        }
        for (tag, data) in self.blocks.iter() {
            if data.flow.used_values().into_iter().any(replaced) {
                graph = graph.update_block_flow(tag, data.flow.map_values(subst));
            }
        }
        graph
    }

    /// Passes every member reference in the graph through `mapping`.
    pub fn map_members(&self, mapping: &dyn MemberMapping) -> Self {
        let mut graph = self.clone();
        for (tag, data) in self.blocks.iter() {
            let block = graph.block_mut(tag);
            block.flow = data.flow.map_members(mapping);
            block.parameters = data
                .parameters
                .iter()
                .map(|param| {
                    BlockParameter::with_tag(mapping.map_type(&param.ty), param.tag.clone())
                })
                .collect();
        }

        graph.values = self
            .values
            .iter()
            .map(|(tag, def)| {
                let def = match def {
                    ValueDef::Parameter { block, ty } => ValueDef::Parameter {
                        block: block.clone(),
                        ty: mapping.map_type(ty),
                    },
                    ValueDef::Instruction { block, instruction } => ValueDef::Instruction {
                        block: block.clone(),
                        instruction: instruction.map_members(mapping),
                    },
                };
                (tag.clone(), def)
            })
            .collect();
        graph.updated(FlowGraphUpdate::MapMembers)
    }

    /// Compares blocks, parameters, instructions and flows by tag and value.
    /// Analyses are not compared.
    pub fn structurally_equal(&self, other: &FlowGraph) -> bool {
        if self.entry != other.entry || self.blocks.len() != other.blocks.len() {
            return false;
        }

        self.blocks.iter().all(|(tag, data)| {
            let Some(theirs) = other.blocks.get(tag) else {
                return false;
            };
            data.parameters == theirs.parameters
                && data.instructions == theirs.instructions
                && data.flow == theirs.flow
                && data.instructions.iter().all(|inst| {
                    self.get_instruction(inst).instruction()
                        == other.get_instruction(inst).instruction()
                })
        })
    }
}

impl Default for FlowGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for FlowGraph {
    fn eq(&self, other: &Self) -> bool {
        self.structurally_equal(other)
    }
}

impl fmt::Debug for FlowGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&GraphWriter::new(self).dump_string())
    }
}

/// A read-only view of one block of a [`FlowGraph`].
#[derive(Clone, Copy)]
pub struct BasicBlock<'g> {
    graph: &'g FlowGraph,
    tag: &'g BasicBlockTag,
    data: &'g BasicBlockData,
}

impl<'g> BasicBlock<'g> {
    pub fn tag(&self) -> &'g BasicBlockTag {
        self.tag
    }

    pub fn graph(&self) -> &'g FlowGraph {
        self.graph
    }

    pub fn parameters(&self) -> impl Iterator<Item = &'g BlockParameter> {
        self.data.parameters.iter()
    }

    pub fn parameter_count(&self) -> usize {
        self.data.parameters.len()
    }

    pub fn instruction_tags(&self) -> impl Iterator<Item = &'g ValueTag> {
        self.data.instructions.iter()
    }

    pub fn instruction_count(&self) -> usize {
        self.data.instructions.len()
    }

    pub fn named_instructions(&self) -> impl Iterator<Item = NamedInstruction<'g>> {
        let graph = self.graph;
        self.data
            .instructions
            .iter()
            .map(move |tag| graph.get_instruction(tag))
    }

    pub fn flow(&self) -> &'g BlockFlow {
        &self.data.flow
    }

    pub fn successors(&self) -> impl Iterator<Item = &'g BasicBlockTag> {
        self.data
            .flow
            .branches()
            .into_iter()
            .map(|branch| &branch.target)
    }
}

/// A read-only view of an instruction that has a value tag.
#[derive(Clone, Copy)]
pub struct NamedInstruction<'g> {
    tag: &'g ValueTag,
    block: &'g BasicBlockTag,
    instruction: &'g Instruction,
}

impl<'g> NamedInstruction<'g> {
    pub fn tag(&self) -> &'g ValueTag {
        self.tag
    }

    pub fn block_tag(&self) -> &'g BasicBlockTag {
        self.block
    }

    pub fn instruction(&self) -> &'g Instruction {
        self.instruction
    }

    pub fn arguments(&self) -> &'g [ValueTag] {
        self.instruction.arguments()
    }

    pub fn result_type(&self) -> Type {
        self.instruction.result_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Constant;

    #[test]
    fn edits_do_not_touch_receiver() {
        let empty = FlowGraph::new();
        let entry = empty.entry_point_tag().clone();
        let (one, forty_two) = empty.append_instruction(
            &entry,
            Instruction::constant(Constant::Int(42), Type::I32),
            "c",
        );

        assert!(!empty.contains_value(&forty_two));
        assert!(one.contains_instruction(&forty_two));
        assert_eq!(one.get_value_type(&forty_two), Type::I32);
        assert_eq!(one.get_value_parent(&forty_two), &entry);
        assert_eq!(empty.entry_point().instruction_count(), 0);
        assert_eq!(one.entry_point().instruction_count(), 1);
    }

    #[test]
    fn insertion_order() {
        let graph = FlowGraph::new();
        let entry = graph.entry_point_tag().clone();
        let (graph, a) = graph.append_instruction(
            &entry,
            Instruction::constant(Constant::Int(1), Type::I32),
            "a",
        );
        let b = ValueTag::new("b");
        let graph = graph.insert_instruction(
            &entry,
            0,
            b.clone(),
            Instruction::constant(Constant::Int(2), Type::I32),
        );

        let order: Vec<_> = graph.entry_point().instruction_tags().cloned().collect();
        assert_eq!(order, vec![b.clone(), a.clone()]);

        let graph = graph.remove_instruction(&b);
        assert!(!graph.contains_value(&b));
        assert_eq!(graph.entry_point().instruction_tags().collect::<Vec<_>>(), vec![&a]);
    }

    #[test]
    fn remove_block_drops_its_values() {
        let (graph, block) = FlowGraph::new().add_basic_block("dead");
        let param = BlockParameter::new(Type::Bool, "p");
        let graph = graph.append_parameter(&block, param.clone());
        let (graph, inst) = graph.append_instruction(
            &block,
            Instruction::copy(Type::Bool, param.tag.clone()),
            "q",
        );

        let graph = graph.remove_basic_block(&block);
        assert!(!graph.contains_basic_block(&block));
        assert!(!graph.contains_value(&param.tag));
        assert!(!graph.contains_value(&inst));
    }

    #[test]
    #[should_panic(expected = "the entry point cannot be removed")]
    fn entry_cannot_be_removed() {
        let graph = FlowGraph::new();
        let entry = graph.entry_point_tag().clone();
        graph.remove_basic_block(&entry);
    }

    #[test]
    #[should_panic(expected = "is already defined")]
    fn values_are_defined_once() {
        let graph = FlowGraph::new();
        let entry = graph.entry_point_tag().clone();
        let param = BlockParameter::new(Type::I32, "x");
        graph
            .append_parameter(&entry, param.clone())
            .append_parameter(&entry, param);
    }

    #[test]
    fn replace_uses_rewrites_instructions_and_flows() {
        let graph = FlowGraph::new();
        let entry = graph.entry_point_tag().clone();
        let (graph, old) = graph.append_instruction(
            &entry,
            Instruction::constant(Constant::Int(1), Type::I32),
            "old",
        );
        let (graph, new) = graph.append_instruction(
            &entry,
            Instruction::constant(Constant::Int(2), Type::I32),
            "new",
        );
        let (graph, user) = graph.append_instruction(
            &entry,
            Instruction::copy(Type::I32, old.clone()),
            "user",
        );
        let graph = graph.update_block_flow(&entry, BlockFlow::Return(old.clone()));

        let replacements = FxHashMap::from_iter([(old.clone(), new.clone())]);
        let graph = graph.replace_uses(&replacements);

        assert_eq!(graph.get_instruction(&user).arguments(), &[new.clone()]);
        assert_eq!(graph.entry_point().flow(), &BlockFlow::Return(new));
        assert!(graph.contains_instruction(&old));
    }
}
