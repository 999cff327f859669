//! A mutable facade over the immutable [`FlowGraph`].
//!
//! A [`FlowGraphBuilder`] owns a single replaceable graph snapshot. Every edit
//! swaps the snapshot for a derived one, so handed-out snapshots stay valid.
//! Sub-builders hold only a tag and re-read the current snapshot on every
//! access; a stale handle always sees the same answer as a fresh one.
mod block_builder;
mod include;
mod inst_builder;

use std::{cell::RefCell, sync::Arc};

pub use block_builder::BasicBlockBuilder;
pub use inst_builder::{FlowInstructionBuilder, NamedInstructionBuilder};
use rustc_hash::FxHashMap;

use crate::{
    analysis::FlowGraphAnalysis,
    graph::FlowGraph,
    tag::{BasicBlockTag, ValueTag},
    types::{MemberMapping, Type},
};

pub struct FlowGraphBuilder {
    graph: RefCell<FlowGraph>,
}

impl FlowGraphBuilder {
    pub fn new() -> Self {
        Self::from_graph(&FlowGraph::new())
    }

    pub fn from_graph(graph: &FlowGraph) -> Self {
        Self {
            graph: RefCell::new(graph.clone()),
        }
    }

    /// A snapshot of the graph as it is now.
    pub fn to_immutable(&self) -> FlowGraph {
        self.graph.borrow().clone()
    }

    /// Discards the current graph in favor of `graph`.
    pub fn replace_with(&self, graph: FlowGraph) {
        *self.graph.borrow_mut() = graph;
    }

    /// Adopts everything `fork` did. Pair with [`Clone`] to make a batch of
    /// edits that is either committed at once or dropped.
    pub fn commit(&self, fork: FlowGraphBuilder) {
        self.replace_with(fork.graph.into_inner());
    }

    /// Runs `transform` on a fork and commits it only if `transform` returns
    /// `true`. Returns whether the edits were kept.
    pub fn try_transform(&self, transform: impl FnOnce(&FlowGraphBuilder) -> bool) -> bool {
        let fork = self.clone();
        let keep = transform(&fork);
        if keep {
            self.commit(fork);
        }
        keep
    }

    pub(crate) fn update(&self, edit: impl FnOnce(&FlowGraph) -> FlowGraph) {
        let graph = self.to_immutable();
        self.replace_with(edit(&graph));
    }

    pub(crate) fn update_with<R>(&self, edit: impl FnOnce(&FlowGraph) -> (FlowGraph, R)) -> R {
        let graph = self.to_immutable();
        let (graph, result) = edit(&graph);
        self.replace_with(graph);
        result
    }

    pub(crate) fn read<R>(&self, query: impl FnOnce(&FlowGraph) -> R) -> R {
        query(&self.graph.borrow())
    }

    pub fn entry_point_tag(&self) -> BasicBlockTag {
        self.read(|graph| graph.entry_point_tag().clone())
    }

    pub fn entry_point(&self) -> BasicBlockBuilder<'_> {
        BasicBlockBuilder::new(self, self.entry_point_tag())
    }

    pub fn set_entry_point(&self, tag: &BasicBlockTag) {
        self.update(|graph| graph.with_entry_point(tag));
    }

    pub fn add_basic_block(&self, name: &str) -> BasicBlockBuilder<'_> {
        let tag = self.update_with(|graph| graph.add_basic_block(name));
        BasicBlockBuilder::new(self, tag)
    }

    /// # Panics
    /// Panics if `tag` is not a block of the current graph.
    pub fn get_basic_block(&self, tag: &BasicBlockTag) -> BasicBlockBuilder<'_> {
        assert!(
            self.contains_basic_block(tag),
            "block `{tag:?}` is not in this graph"
        );
        BasicBlockBuilder::new(self, tag.clone())
    }

    pub fn basic_blocks(&self) -> Vec<BasicBlockBuilder<'_>> {
        let tags: Vec<_> = self.read(|graph| graph.basic_block_tags().cloned().collect());
        tags.into_iter()
            .map(|tag| BasicBlockBuilder::new(self, tag))
            .collect()
    }

    pub fn contains_basic_block(&self, tag: &BasicBlockTag) -> bool {
        self.read(|graph| graph.contains_basic_block(tag))
    }

    pub fn remove_basic_block(&self, tag: &BasicBlockTag) {
        self.update(|graph| graph.remove_basic_block(tag));
    }

    /// # Panics
    /// Panics if `tag` is not a named instruction of the current graph.
    pub fn get_instruction(&self, tag: &ValueTag) -> NamedInstructionBuilder<'_> {
        assert!(
            self.contains_instruction(tag),
            "instruction `{tag:?}` is not in this graph"
        );
        NamedInstructionBuilder::new(self, tag.clone())
    }

    pub fn named_instructions(&self) -> Vec<NamedInstructionBuilder<'_>> {
        let tags: Vec<_> =
            self.read(|graph| graph.named_instructions().map(|inst| inst.tag().clone()).collect());
        tags.into_iter()
            .map(|tag| NamedInstructionBuilder::new(self, tag))
            .collect()
    }

    pub fn contains_value(&self, tag: &ValueTag) -> bool {
        self.read(|graph| graph.contains_value(tag))
    }

    pub fn contains_instruction(&self, tag: &ValueTag) -> bool {
        self.read(|graph| graph.contains_instruction(tag))
    }

    pub fn get_value_type(&self, tag: &ValueTag) -> Type {
        self.read(|graph| graph.get_value_type(tag))
    }

    pub fn get_value_parent(&self, tag: &ValueTag) -> BasicBlockBuilder<'_> {
        let block = self.read(|graph| graph.get_value_parent(tag).clone());
        BasicBlockBuilder::new(self, block)
    }

    pub fn replace_uses(&self, replacements: &FxHashMap<ValueTag, ValueTag>) {
        self.update(|graph| graph.replace_uses(replacements));
    }

    pub fn map_members(&self, mapping: &dyn MemberMapping) {
        self.update(|graph| graph.map_members(mapping));
    }

    pub fn with_analysis<A: FlowGraphAnalysis>(&self, analysis: A) {
        self.update(|graph| graph.with_analysis(analysis));
    }

    pub fn get_analysis_result<T: Send + Sync + 'static>(&self) -> Arc<T> {
        self.read(|graph| graph.get_analysis_result::<T>())
    }

    /// Expands fused instructions until none are left. Returns how many
    /// expansions took place.
    pub fn expand_fused_instructions(&self) -> usize {
        let mut count = 0;
        loop {
            let fused: Vec<_> = self
                .named_instructions()
                .into_iter()
                .filter(|inst| inst.instruction().prototype().is_fused())
                .collect();
            if fused.is_empty() {
                return count;
            }
            for inst in fused {
                inst.expand();
                count += 1;
            }
        }
    }
}

impl Default for FlowGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Forks the builder: the clone starts from the same snapshot and evolves
/// independently.
impl Clone for FlowGraphBuilder {
    fn clone(&self) -> Self {
        Self::from_graph(&self.graph.borrow())
    }
}

pub mod test_util {
    use super::*;
    use crate::ir_writer::GraphWriter;

    pub fn dump_graph(graph: &FlowGraph) -> String {
        GraphWriter::new(graph).dump_string()
    }

    pub fn dump_builder(builder: &FlowGraphBuilder) -> String {
        dump_graph(&builder.to_immutable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        flow::BlockFlow,
        graph::BlockParameter,
        inst::Instruction,
        types::{Constant, Type},
    };

    #[test]
    fn stale_handles_reread() {
        let builder = FlowGraphBuilder::new();
        let entry = builder.entry_point();
        let stale = builder.entry_point();

        entry.append_instruction(Instruction::constant(Constant::Int(1), Type::I32), "one");
        assert_eq!(stale.instruction_tags().len(), 1);
    }

    #[test]
    fn snapshots_are_frozen() {
        let builder = FlowGraphBuilder::new();
        let before = builder.to_immutable();
        builder
            .entry_point()
            .append_parameter(BlockParameter::new(Type::I32, "x"));

        assert_eq!(before.entry_point().parameter_count(), 0);
        assert_eq!(builder.to_immutable().entry_point().parameter_count(), 1);
    }

    #[test]
    fn fork_commit_and_discard() {
        let builder = FlowGraphBuilder::new();
        let entry = builder.entry_point_tag();

        let discarded = builder.clone();
        discarded.add_basic_block("dropped");
        drop(discarded);
        assert_eq!(builder.basic_blocks().len(), 1);

        let fork = builder.clone();
        let exit = fork.add_basic_block("exit");
        fork.get_basic_block(&entry)
            .set_flow(BlockFlow::jump(exit.tag().clone(), []));
        let exit = exit.tag().clone();
        assert_eq!(builder.basic_blocks().len(), 1);

        builder.commit(fork);
        assert!(builder.contains_basic_block(&exit));
        assert_eq!(
            builder.entry_point().flow(),
            BlockFlow::jump(exit, [])
        );
    }

    #[test]
    fn try_transform_keeps_only_accepted_edits() {
        let builder = FlowGraphBuilder::new();

        assert!(!builder.try_transform(|fork| {
            fork.add_basic_block("rejected");
            false
        }));
        assert_eq!(builder.basic_blocks().len(), 1);

        assert!(builder.try_transform(|fork| {
            fork.add_basic_block("accepted");
            true
        }));
        assert_eq!(builder.basic_blocks().len(), 2);
    }

    #[test]
    fn round_trip_through_builder() {
        let builder = FlowGraphBuilder::new();
        let entry = builder.entry_point();
        let x = entry.append_parameter(BlockParameter::new(Type::I32, "x"));
        let copy = entry.append_instruction(Instruction::copy(Type::I32, x), "copy");
        entry.set_flow(BlockFlow::Return(copy.tag().clone()));

        let graph = builder.to_immutable();
        let again = FlowGraphBuilder::from_graph(&graph).to_immutable();
        assert!(graph.structurally_equal(&again));
    }
}
