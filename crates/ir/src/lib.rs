pub mod analysis;
pub mod body;
pub mod builder;
pub mod flow;
pub mod graph;
pub mod inst;
pub mod ir_writer;
pub mod tag;
pub mod types;
pub mod validate;

pub use analysis::{FlowGraphAnalysis, FlowGraphUpdate};
pub use body::{MethodBody, Parameter};
pub use builder::{
    BasicBlockBuilder, FlowGraphBuilder, FlowInstructionBuilder, NamedInstructionBuilder,
};
pub use flow::{BlockFlow, Branch, BranchArgument, SwitchCase, SwitchFlow, TryFlow};
pub use graph::{BasicBlock, BlockParameter, FlowGraph, NamedInstruction};
pub use inst::{FusedPrototype, Instruction, InstructionPrototype, Prototype, PrototypeKind};
pub use tag::{BasicBlockTag, ValueTag};
pub use types::{Constant, Field, MemberMapping, Method, PointerKind, Type, TypeMapping};
pub use validate::{ValidationConfig, ValidationLevel};

pub mod prelude {
    pub use crate::inst::{FusedPrototype, Prototype};
}
