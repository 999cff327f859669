//! Pluggable, memoized flow graph analyses.
//!
//! Analyses are registered on a [`FlowGraph`] and keyed by the type of result
//! they produce. A result is computed at most once per graph value. Every edit
//! produces a new graph whose caches remember the edit, so an analysis can
//! bring a previously computed result up to date instead of starting over.
pub mod exception_specs;
pub mod nullability;
pub mod predecessors;

use std::{
    any::{type_name, Any, TypeId},
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

pub use exception_specs::{
    ExceptionSpecification, InstructionExceptionSpecs, PrototypeExceptionSpecs,
    ReifiedInstructionExceptionAnalysis,
};
pub use nullability::{NullabilityAnalysis, ValueNullability};
pub use predecessors::{BasicBlockPredecessors, PredecessorAnalysis};

use crate::{
    graph::FlowGraph,
    tag::{BasicBlockTag, ValueTag},
};

pub trait FlowGraphAnalysis: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    fn analyze(&self, graph: &FlowGraph) -> Self::Output;

    /// Brings `previous`, the result for an ancestor of `graph`, up to date.
    /// `updates` lists every edit since then, oldest first.
    fn analyze_with_updates(
        &self,
        graph: &FlowGraph,
        previous: &Self::Output,
        updates: &[FlowGraphUpdate],
    ) -> Self::Output {
        let _ = (previous, updates);
        self.analyze(graph)
    }
}

/// An edit that turned one graph value into the next.
#[derive(Debug, Clone)]
pub enum FlowGraphUpdate {
    AddInstruction(ValueTag),
    ReplaceInstruction(ValueTag),
    RemoveInstruction(ValueTag),
    AddBasicBlock(BasicBlockTag),
    RemoveBasicBlock(BasicBlockTag),
    SetEntryPoint(BasicBlockTag),
    BasicBlockParameters(BasicBlockTag),
    BasicBlockFlow(BasicBlockTag),
    /// A member mapping was applied to the whole graph.
    MapMembers,
}

impl FlowGraphUpdate {
    /// Whether the edit only touched named instructions, leaving block
    /// structure and flows alone.
    pub fn is_instruction_level(&self) -> bool {
        matches!(
            self,
            Self::AddInstruction(_) | Self::ReplaceInstruction(_) | Self::RemoveInstruction(_)
        )
    }
}

/// An analysis whose result does not depend on the graph at all.
pub struct ConstantAnalysis<T>(pub T);

impl<T> FlowGraphAnalysis for ConstantAnalysis<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    fn analyze(&self, _: &FlowGraph) -> T {
        self.0.clone()
    }

    fn analyze_with_updates(&self, _: &FlowGraph, previous: &T, _: &[FlowGraphUpdate]) -> T {
        previous.clone()
    }
}

trait ErasedCache: Send + Sync {
    fn derive(self: Arc<Self>, update: &FlowGraphUpdate) -> Arc<dyn ErasedCache>;

    fn result(&self, graph: &FlowGraph) -> Arc<dyn Any + Send + Sync>;
}

struct CacheCell<A: FlowGraphAnalysis> {
    analysis: Arc<A>,
    result: OnceLock<Arc<A::Output>>,
    /// The cache of the graph this one was derived from, and the edit that
    /// separates them. Cleared once a result exists.
    parent: Mutex<Option<(Arc<CacheCell<A>>, FlowGraphUpdate)>>,
}

impl<A: FlowGraphAnalysis> CacheCell<A> {
    fn new(analysis: Arc<A>) -> Self {
        Self {
            analysis,
            result: OnceLock::new(),
            parent: Mutex::new(None),
        }
    }

    fn get(&self, graph: &FlowGraph) -> Arc<A::Output> {
        self.result.get_or_init(|| self.compute(graph)).clone()
    }

    fn compute(&self, graph: &FlowGraph) -> Arc<A::Output> {
        let mut updates = Vec::new();
        let mut previous = None;
        let mut link = self
            .parent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        while let Some((ancestor, update)) = link {
            updates.push(update);
            if let Some(result) = ancestor.result.get() {
                previous = Some(result.clone());
                break;
            }
            link = ancestor
                .parent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
        }

        let result = match previous {
            Some(previous) => {
                updates.reverse();
                tracing::debug!(
                    analysis = type_name::<A>(),
                    updates = updates.len(),
                    "updating analysis result"
                );
                self.analysis.analyze_with_updates(graph, &previous, &updates)
            }
            None => {
                tracing::debug!(analysis = type_name::<A>(), "computing analysis result");
                self.analysis.analyze(graph)
            }
        };
        Arc::new(result)
    }
}

impl<A: FlowGraphAnalysis> Drop for CacheCell<A> {
    // Unlinks the ancestor chain iteratively; a long run of unqueried edits
    // would otherwise be freed recursively.
    fn drop(&mut self) {
        let mut link = self
            .parent
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        while let Some((ancestor, _)) = link {
            link = match Arc::into_inner(ancestor) {
                Some(mut cell) => cell
                    .parent
                    .get_mut()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take(),
                None => None,
            };
        }
    }
}

impl<A: FlowGraphAnalysis> ErasedCache for CacheCell<A> {
    fn derive(self: Arc<Self>, update: &FlowGraphUpdate) -> Arc<dyn ErasedCache> {
        let analysis = self.analysis.clone();
        Arc::new(CacheCell {
            analysis,
            result: OnceLock::new(),
            parent: Mutex::new(Some((self, update.clone()))),
        })
    }

    fn result(&self, graph: &FlowGraph) -> Arc<dyn Any + Send + Sync> {
        self.get(graph)
    }
}

/// The analyses registered on one graph value.
#[derive(Clone, Default)]
pub(crate) struct AnalysisCaches {
    caches: im::HashMap<TypeId, Arc<dyn ErasedCache>>,
}

impl AnalysisCaches {
    pub(crate) fn with_analysis<A: FlowGraphAnalysis>(&self, analysis: A) -> Self {
        let cell: Arc<dyn ErasedCache> = Arc::new(CacheCell::new(Arc::new(analysis)));
        Self {
            caches: self.caches.update(TypeId::of::<A::Output>(), cell),
        }
    }

    pub(crate) fn contains<T: 'static>(&self) -> bool {
        self.caches.contains_key(&TypeId::of::<T>())
    }

    pub(crate) fn derive(&self, update: &FlowGraphUpdate) -> Self {
        Self {
            caches: self
                .caches
                .iter()
                .map(|(id, cache)| (*id, cache.clone().derive(update)))
                .collect(),
        }
    }

    pub(crate) fn get<T: Send + Sync + 'static>(&self, graph: &FlowGraph) -> Option<Arc<T>> {
        let cache = self.caches.get(&TypeId::of::<T>())?;
        match cache.result(graph).downcast::<T>() {
            Ok(result) => Some(result),
            Err(_) => unreachable!("analysis cache keyed by the wrong result type"),
        }
    }
}

impl FlowGraph {
    /// Registers `analysis`, replacing any analysis producing the same result
    /// type.
    pub fn with_analysis<A: FlowGraphAnalysis>(&self, analysis: A) -> FlowGraph {
        let mut graph = self.clone();
        graph.analyses = self.analyses.with_analysis(analysis);
        graph
    }

    pub fn has_analysis_for<T: 'static>(&self) -> bool {
        self.analyses.contains::<T>()
    }

    pub fn try_get_analysis_result<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.analyses.get::<T>(self)
    }

    /// # Panics
    /// Panics if no analysis producing `T` is registered.
    pub fn get_analysis_result<T: Send + Sync + 'static>(&self) -> Arc<T> {
        self.try_get_analysis_result()
            .unwrap_or_else(|| panic!("no analysis producing `{}` is registered", type_name::<T>()))
    }

    pub(crate) fn with_default_analyses(self) -> FlowGraph {
        self.with_analysis(PredecessorAnalysis)
            .with_analysis(NullabilityAnalysis)
            .with_analysis(ConstantAnalysis(PrototypeExceptionSpecs::default()))
            .with_analysis(ReifiedInstructionExceptionAnalysis)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{graph::BlockParameter, inst::Instruction, types::Type};

    struct CountingAnalysis {
        full: Arc<AtomicUsize>,
        incremental: Arc<AtomicUsize>,
    }

    impl FlowGraphAnalysis for CountingAnalysis {
        type Output = usize;

        fn analyze(&self, graph: &FlowGraph) -> usize {
            self.full.fetch_add(1, Ordering::SeqCst);
            graph.named_instructions().count()
        }

        fn analyze_with_updates(
            &self,
            graph: &FlowGraph,
            _: &usize,
            updates: &[FlowGraphUpdate],
        ) -> usize {
            assert!(!updates.is_empty());
            self.incremental.fetch_add(1, Ordering::SeqCst);
            graph.named_instructions().count()
        }
    }

    #[test]
    fn results_are_memoized_and_updated() {
        let full = Arc::new(AtomicUsize::new(0));
        let incremental = Arc::new(AtomicUsize::new(0));
        let graph = FlowGraph::new().with_analysis(CountingAnalysis {
            full: full.clone(),
            incremental: incremental.clone(),
        });

        assert_eq!(*graph.get_analysis_result::<usize>(), 0);
        assert_eq!(*graph.get_analysis_result::<usize>(), 0);
        assert_eq!(full.load(Ordering::SeqCst), 1);

        let entry = graph.entry_point_tag().clone();
        let (graph2, _) = graph.add_basic_block("next");
        let param = BlockParameter::new(Type::I32, "x");
        let graph2 = graph2.append_parameter(&entry, param.clone());
        let (graph2, _) = graph2.append_instruction(
            &entry,
            Instruction::copy(Type::I32, param.tag),
            "y",
        );

        // The old graph keeps its result; the new one sees the edit.
        assert_eq!(*graph.get_analysis_result::<usize>(), 0);
        assert_eq!(*graph2.get_analysis_result::<usize>(), 1);
        assert_eq!(full.load(Ordering::SeqCst), 1);
        assert_eq!(incremental.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_analysis() {
        let graph = FlowGraph::new();
        assert!(graph.try_get_analysis_result::<String>().is_none());
        assert!(graph.has_analysis_for::<BasicBlockPredecessors>());
    }
}
