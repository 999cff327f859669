use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::{FlowGraphAnalysis, FlowGraphUpdate};
use crate::{graph::FlowGraph, tag::BasicBlockTag};

/// Maps every block to the blocks that branch to it.
#[derive(Debug, Clone, Default)]
pub struct BasicBlockPredecessors {
    preds: FxHashMap<BasicBlockTag, SmallVec<[BasicBlockTag; 4]>>,
}

impl BasicBlockPredecessors {
    /// Predecessors of `block`, in graph order and without duplicates.
    pub fn predecessors_of(&self, block: &BasicBlockTag) -> &[BasicBlockTag] {
        self.preds.get(block).map_or(&[], |preds| preds.as_slice())
    }

    pub fn is_predecessor_of(&self, pred: &BasicBlockTag, block: &BasicBlockTag) -> bool {
        self.predecessors_of(block).contains(pred)
    }
}

pub struct PredecessorAnalysis;

impl FlowGraphAnalysis for PredecessorAnalysis {
    type Output = BasicBlockPredecessors;

    fn analyze(&self, graph: &FlowGraph) -> BasicBlockPredecessors {
        let mut preds: FxHashMap<_, SmallVec<[BasicBlockTag; 4]>> = FxHashMap::default();
        for block in graph.basic_blocks() {
            for branch in block.flow().branches() {
                let entry = preds.entry(branch.target.clone()).or_default();
                if !entry.contains(block.tag()) {
                    entry.push(block.tag().clone());
                }
            }
        }
        BasicBlockPredecessors { preds }
    }

    fn analyze_with_updates(
        &self,
        graph: &FlowGraph,
        previous: &BasicBlockPredecessors,
        updates: &[FlowGraphUpdate],
    ) -> BasicBlockPredecessors {
        // Named instructions never affect control flow.
        if updates.iter().all(FlowGraphUpdate::is_instruction_level) {
            previous.clone()
        } else {
            self.analyze(graph)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::BlockFlow;

    #[test]
    fn diamond() {
        let graph = FlowGraph::new();
        let entry = graph.entry_point_tag().clone();
        let (graph, left) = graph.add_basic_block("left");
        let (graph, right) = graph.add_basic_block("right");
        let (graph, exit) = graph.add_basic_block("exit");

        let graph = graph
            .update_block_flow(&left, BlockFlow::jump(exit.clone(), []))
            .update_block_flow(&right, BlockFlow::jump(exit.clone(), []))
            .update_block_flow(&entry, BlockFlow::jump(left.clone(), []));

        let preds = graph.get_analysis_result::<BasicBlockPredecessors>();
        assert_eq!(preds.predecessors_of(&exit), &[left.clone(), right.clone()]);
        assert_eq!(preds.predecessors_of(&left), &[entry.clone()]);
        assert!(preds.predecessors_of(&right).is_empty());

        let graph = graph.update_block_flow(&entry, BlockFlow::jump(right.clone(), []));
        let preds = graph.get_analysis_result::<BasicBlockPredecessors>();
        assert!(preds.is_predecessor_of(&entry, &right));
        assert!(!preds.is_predecessor_of(&entry, &left));
    }
}
