//! Splicing one graph into another.
use rustc_hash::FxHashMap;

use super::{BasicBlockBuilder, FlowGraphBuilder, NamedInstructionBuilder};
use crate::{
    analysis::InstructionExceptionSpecs,
    flow::{BlockFlow, Branch, BranchArgument},
    graph::{BlockParameter, FlowGraph},
    inst::Instruction,
    tag::{BasicBlockTag, ValueTag},
};

/// Fresh host tags for every block and value of an included graph.
struct Renaming {
    blocks: FxHashMap<BasicBlockTag, BasicBlockTag>,
    values: FxHashMap<ValueTag, ValueTag>,
}

impl Renaming {
    fn new(graph: &FlowGraph) -> Self {
        let blocks = graph
            .basic_block_tags()
            .map(|tag| (tag.clone(), BasicBlockTag::new(tag.name())))
            .collect();
        let values = graph
            .value_tags()
            .map(|tag| (tag.clone(), ValueTag::new(tag.name())))
            .collect();
        Self { blocks, values }
    }

    fn block(&self, tag: &BasicBlockTag) -> BasicBlockTag {
        self.blocks.get(tag).unwrap_or(tag).clone()
    }

    fn value(&self, tag: &ValueTag) -> ValueTag {
        self.values.get(tag).unwrap_or(tag).clone()
    }

    fn flow(&self, flow: &BlockFlow) -> BlockFlow {
        flow.map_values(|tag| self.value(tag))
            .map_targets(|tag| self.block(tag))
    }
}

impl FlowGraphBuilder {
    /// Copies `graph` into this builder under fresh tags and returns the tag
    /// of its (renamed) entry block.
    ///
    /// Every `return` flow of the included graph is replaced by whatever
    /// `rewrite_return` produces for the renamed return value and the block
    /// it ends. If `exception_branch` is given, each named instruction that
    /// may throw is moved into a `try` flow whose exception edge is that
    /// branch.
    pub fn include(
        &self,
        graph: &FlowGraph,
        mut rewrite_return: impl FnMut(ValueTag, &BasicBlockBuilder<'_>) -> BlockFlow,
        exception_branch: Option<&Branch>,
    ) -> BasicBlockTag {
        let _span = tracing::debug_span!(
            "include",
            blocks = graph.block_count(),
            wrap_exceptions = exception_branch.is_some()
        )
        .entered();

        let renaming = Renaming::new(graph);
        let specs =
            exception_branch.map(|_| graph.get_analysis_result::<InstructionExceptionSpecs>());

        for block in graph.basic_blocks() {
            let tag = renaming.block(block.tag());
            self.update(|host| host.with_basic_block(tag.clone()));
            let params = block
                .parameters()
                .map(|param| {
                    BlockParameter::with_tag(param.ty.clone(), renaming.value(&param.tag))
                });
            self.get_basic_block(&tag).set_parameters(params);
        }

        for block in graph.basic_blocks() {
            let mut current = self.get_basic_block(&renaming.block(block.tag()));

            for inst in block.named_instructions() {
                let tag = renaming.value(inst.tag());
                let instruction = inst.instruction().map_arguments(|arg| renaming.value(arg));

                match (&specs, exception_branch) {
                    (Some(specs), Some(exception_branch))
                        if specs.can_throw(inst.instruction()) =>
                    {
                        current = self.wrap_in_try(&current, tag, instruction, exception_branch);
                    }
                    _ => {
                        let index = current.instruction_tags().len();
                        self.update(|host| {
                            host.insert_instruction(current.tag(), index, tag, instruction)
                        });
                    }
                }
            }

            let flow = match block.flow() {
                BlockFlow::Return(value) => rewrite_return(renaming.value(value), &current),
                other => renaming.flow(other),
            };
            current.set_flow(flow);
        }

        renaming.block(graph.entry_point_tag())
    }

    /// Ends `block` with a `try` flow around `instruction` and returns the
    /// continuation block, which receives the result as its only parameter.
    fn wrap_in_try<'a>(
        &'a self,
        block: &BasicBlockBuilder<'a>,
        result: ValueTag,
        instruction: Instruction,
        exception_branch: &Branch,
    ) -> BasicBlockBuilder<'a> {
        let continuation = self.add_basic_block(block.tag().name());
        continuation.append_parameter(BlockParameter::with_tag(instruction.result_type(), result));

        block.set_flow(BlockFlow::try_flow(
            instruction,
            Branch::new(continuation.tag().clone(), [BranchArgument::TryResult]),
            exception_branch.clone(),
        ));
        continuation
    }
}

impl NamedInstructionBuilder<'_> {
    /// Replaces this instruction with the body of `implementation`, whose
    /// entry block parameters are bound to `arguments`.
    ///
    /// If the implementation is a single block ending in `return`, its
    /// instructions are inlined right before this one. Otherwise this block
    /// is split: this instruction and everything after it move to a new
    /// continuation block that the included graph returns to.
    pub fn replace_with_graph(&self, implementation: &FlowGraph, arguments: Vec<ValueTag>) {
        let entry = implementation.entry_point();
        assert_eq!(
            entry.parameter_count(),
            arguments.len(),
            "implementation entry takes {} argument(s), but {} were supplied",
            entry.parameter_count(),
            arguments.len()
        );

        let result_type = self.result_type();
        match entry.flow() {
            BlockFlow::Return(value) => {
                tracing::debug!(site = ?self.tag(), "inlining single-block implementation");

                let mut renames: FxHashMap<_, _> = entry
                    .parameters()
                    .map(|param| param.tag.clone())
                    .zip(arguments)
                    .collect();
                for inst in entry.named_instructions() {
                    let instruction = inst
                        .instruction()
                        .map_arguments(|arg| renames.get(arg).unwrap_or(arg).clone());
                    let inserted = self.insert_before(instruction, inst.tag().name());
                    renames.insert(inst.tag().clone(), inserted.tag().clone());
                }

                let returned = renames.get(value).unwrap_or(value).clone();
                self.set_instruction(Instruction::copy(result_type, returned));
            }
            _ => {
                tracing::debug!(
                    site = ?self.tag(),
                    blocks = implementation.block_count(),
                    "splitting block to include implementation"
                );

                let builder = self.builder();
                let block = self.block();
                let continuation = builder.add_basic_block(block.tag().name());
                let result =
                    continuation.append_parameter(
                        BlockParameter::new(result_type.clone(), "result"),
                    );

                let moved = block.instruction_tags().split_off(self.index());
                let flow = block.flow();
                builder.update(|graph| {
                    moved.iter().fold(graph.clone(), |graph, tag| {
                        let instruction = graph.get_instruction(tag).instruction().clone();
                        let index = graph.get_basic_block(continuation.tag()).instruction_count();
                        graph
                            .remove_instruction(tag)
                            .insert_instruction(continuation.tag(), index, tag.clone(), instruction)
                    })
                });
                continuation.set_flow(flow);

                let continuation_tag = continuation.tag().clone();
                let included = builder.include(
                    implementation,
                    |value, _| BlockFlow::jump(continuation_tag.clone(), [value]),
                    None,
                );
                block.set_flow(BlockFlow::jump(included, arguments));
                self.set_instruction(Instruction::copy(result_type, result));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    #[test]
    fn include_renames_everything() {
        let callee = FlowGraphBuilder::new();
        let entry = callee.entry_point();
        let x = entry.append_parameter(BlockParameter::new(Type::I32, "x"));
        let copy = entry.append_instruction(Instruction::copy(Type::I32, x.clone()), "copy");
        let exit = callee.add_basic_block("exit");
        let y = exit.append_parameter(BlockParameter::new(Type::I32, "y"));
        entry.set_flow(BlockFlow::jump(exit.tag().clone(), [copy.tag().clone()]));
        exit.set_flow(BlockFlow::Return(y.clone()));
        let callee = callee.to_immutable();

        let host = FlowGraphBuilder::new();
        let sink = host.add_basic_block("sink");
        let sink_param = sink.append_parameter(BlockParameter::new(Type::I32, "r"));
        let sink_tag = sink.tag().clone();
        let included = host.include(
            &callee,
            |value, _| BlockFlow::jump(sink_tag.clone(), [value]),
            None,
        );

        let graph = host.to_immutable();
        assert_ne!(&included, callee.entry_point_tag());
        assert_eq!(graph.block_count(), 4);
        for tag in callee.value_tags() {
            assert!(!graph.contains_value(tag));
        }

        let included = graph.get_basic_block(&included);
        let param = included.parameters().next().unwrap();
        assert_eq!(param.tag.name(), "x");
        assert_ne!(param.tag, x);

        let BlockFlow::Jump(branch) = included.flow() else {
            panic!("expected a jump");
        };
        let renamed_exit = graph.get_basic_block(&branch.target);
        assert_eq!(renamed_exit.tag().name(), "exit");
        assert_eq!(
            renamed_exit.flow(),
            &BlockFlow::jump(
                sink.tag().clone(),
                [renamed_exit.parameters().next().unwrap().tag.clone()],
            )
        );
        assert!(graph.contains_value(&sink_param));
    }

    #[test]
    fn include_wraps_throwing_instructions() {
        let callee = FlowGraphBuilder::new();
        let entry = callee.entry_point();
        let a = entry.append_parameter(BlockParameter::new(Type::I32, "a"));
        let b = entry.append_parameter(BlockParameter::new(Type::I32, "b"));
        let sum = entry.append_instruction(
            Instruction::arithmetic("add", Type::I32, Type::I32, a.clone(), b.clone()),
            "sum",
        );
        let quot = entry.append_instruction(
            Instruction::arithmetic("div", Type::I32, Type::I32, sum.tag().clone(), b),
            "quot",
        );
        entry.set_flow(BlockFlow::Return(quot.tag().clone()));
        let callee = callee.to_immutable();

        let host = FlowGraphBuilder::new();
        let handler = host.add_basic_block("handler");
        let exception_branch = Branch::new(handler.tag().clone(), []);
        let included = host.include(
            &callee,
            |value, _| BlockFlow::Return(value),
            Some(&exception_branch),
        );

        let graph = host.to_immutable();
        let included = graph.get_basic_block(&included);
        // `arith.add` stays put, `arith.div` moves into a try flow.
        assert_eq!(included.instruction_count(), 1);
        let BlockFlow::Try(flow) = included.flow() else {
            panic!("expected a try flow");
        };
        assert_eq!(flow.exception_branch, exception_branch);
        assert_eq!(flow.success_branch.arguments, vec![BranchArgument::TryResult]);

        let continuation = graph.get_basic_block(&flow.success_branch.target);
        let result = continuation.parameters().next().unwrap();
        assert_eq!(result.ty, Type::I32);
        assert_eq!(continuation.flow(), &BlockFlow::Return(result.tag.clone()));
        assert_eq!(result.tag.name(), "quot");
    }
}
