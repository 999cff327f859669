//! Block terminators.
//!
//! Every basic block ends in exactly one [`BlockFlow`]. Passes never patch a
//! flow in place: they build a new one, usually through
//! [`BlockFlow::with_instructions`] or [`BlockFlow::with_branches`], and hand
//! it back to the graph.
use std::fmt;

use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::{
    inst::Instruction,
    tag::{BasicBlockTag, ValueTag},
    types::{Constant, MemberMapping},
};

/// An argument passed along a [`Branch`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BranchArgument {
    Value(ValueTag),
    /// The result of a `try` flow's instruction. Only legal on its success branch.
    TryResult,
    /// The exception thrown by a `try` flow's instruction. Only legal on its
    /// exception branch.
    TryException,
}

impl BranchArgument {
    pub fn as_value(&self) -> Option<&ValueTag> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::TryResult => "try result",
            Self::TryException => "try exception",
        }
    }

    fn map_value(&self, f: &mut impl FnMut(&ValueTag) -> ValueTag) -> Self {
        match self {
            Self::Value(value) => Self::Value(f(value)),
            other => other.clone(),
        }
    }
}

impl From<ValueTag> for BranchArgument {
    fn from(value: ValueTag) -> Self {
        Self::Value(value)
    }
}

impl fmt::Display for BranchArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "{value}"),
            Self::TryResult => f.write_str("#result"),
            Self::TryException => f.write_str("#exception"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Branch {
    pub target: BasicBlockTag,
    pub arguments: Vec<BranchArgument>,
}

impl Branch {
    pub fn new(target: BasicBlockTag, arguments: impl IntoIterator<Item = BranchArgument>) -> Self {
        Self {
            target,
            arguments: arguments.into_iter().collect(),
        }
    }

    pub fn with_values(target: BasicBlockTag, values: impl IntoIterator<Item = ValueTag>) -> Self {
        Self::new(target, values.into_iter().map(BranchArgument::Value))
    }

    pub fn with_target(&self, target: BasicBlockTag) -> Self {
        Self {
            target,
            arguments: self.arguments.clone(),
        }
    }

    pub fn map_values(&self, f: &mut impl FnMut(&ValueTag) -> ValueTag) -> Self {
        Self {
            target: self.target.clone(),
            arguments: self.arguments.iter().map(|arg| arg.map_value(&mut *f)).collect(),
        }
    }
}

pub type ConstantSet = IndexSet<Constant, FxBuildHasher>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchCase {
    pub values: ConstantSet,
    pub branch: Branch,
}

impl SwitchCase {
    pub fn new(values: impl IntoIterator<Item = Constant>, branch: Branch) -> Self {
        Self {
            values: values.into_iter().collect(),
            branch,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchFlow {
    pub value: ValueTag,
    pub cases: Vec<SwitchCase>,
    pub default_branch: Branch,
}

impl SwitchFlow {
    /// Picks the branch taken for `constant`.
    ///
    /// Cases are scanned in order and the first one listing `constant` wins,
    /// so overlapping cases are legal and resolved by position.
    pub fn target_for(&self, constant: &Constant) -> &Branch {
        self.cases
            .iter()
            .find(|case| case.values.contains(constant))
            .map_or(&self.default_branch, |case| &case.branch)
    }

    /// A switch with a single one-value case, i.e. an `if`/`else`.
    pub fn is_if_else(&self) -> bool {
        self.cases.len() == 1 && self.cases[0].values.len() == 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryFlow {
    /// An anonymous instruction: its result and exception are only visible to
    /// successors through the `#result`/`#exception` markers.
    pub instruction: Instruction,
    pub success_branch: Branch,
    pub exception_branch: Branch,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BlockFlow {
    #[default]
    Unreachable,
    Jump(Branch),
    Return(ValueTag),
    Switch(SwitchFlow),
    Try(TryFlow),
}

impl BlockFlow {
    pub fn jump(target: BasicBlockTag, values: impl IntoIterator<Item = ValueTag>) -> Self {
        Self::Jump(Branch::with_values(target, values))
    }

    pub fn switch(value: ValueTag, cases: Vec<SwitchCase>, default_branch: Branch) -> Self {
        Self::Switch(SwitchFlow {
            value,
            cases,
            default_branch,
        })
    }

    pub fn try_flow(
        instruction: Instruction,
        success_branch: Branch,
        exception_branch: Branch,
    ) -> Self {
        Self::Try(TryFlow {
            instruction,
            success_branch,
            exception_branch,
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::Jump(_) => "jump",
            Self::Return(_) => "return",
            Self::Switch(_) => "switch",
            Self::Try(_) => "try",
        }
    }

    /// Anonymous instructions embedded in this flow.
    pub fn instructions(&self) -> &[Instruction] {
        match self {
            Self::Try(flow) => std::slice::from_ref(&flow.instruction),
            _ => &[],
        }
    }

    pub fn branches(&self) -> SmallVec<[&Branch; 2]> {
        match self {
            Self::Unreachable | Self::Return(_) => SmallVec::new(),
            Self::Jump(branch) => smallvec::smallvec![branch],
            Self::Switch(flow) => flow
                .cases
                .iter()
                .map(|case| &case.branch)
                .chain(std::iter::once(&flow.default_branch))
                .collect(),
            Self::Try(flow) => smallvec::smallvec![&flow.success_branch, &flow.exception_branch],
        }
    }

    /// The value a `return` or `switch` flow inspects directly.
    pub fn flow_value(&self) -> Option<&ValueTag> {
        match self {
            Self::Return(value) => Some(value),
            Self::Switch(flow) => Some(&flow.value),
            _ => None,
        }
    }

    /// Replaces the embedded instructions, keeping everything else.
    ///
    /// # Panics
    /// Panics if the number of instructions differs from [`Self::instructions`].
    pub fn with_instructions(&self, instructions: Vec<Instruction>) -> Self {
        assert_eq!(
            instructions.len(),
            self.instructions().len(),
            "`{}` flow expects {} instruction(s)",
            self.kind_name(),
            self.instructions().len()
        );

        match self {
            Self::Try(flow) => {
                let instruction = instructions.into_iter().next().unwrap_or_else(|| unreachable!());
                Self::Try(TryFlow {
                    instruction,
                    ..flow.clone()
                })
            }
            other => other.clone(),
        }
    }

    /// Replaces the branches, in [`Self::branches`] order.
    ///
    /// # Panics
    /// Panics if the number of branches differs from [`Self::branches`].
    pub fn with_branches(&self, branches: Vec<Branch>) -> Self {
        assert_eq!(
            branches.len(),
            self.branches().len(),
            "`{}` flow expects {} branch(es)",
            self.kind_name(),
            self.branches().len()
        );

        let mut branches = branches.into_iter();
        let mut next = || branches.next().unwrap_or_else(|| unreachable!());
        match self {
            Self::Unreachable | Self::Return(_) => self.clone(),
            Self::Jump(_) => Self::Jump(next()),
            Self::Switch(flow) => {
                let cases = flow
                    .cases
                    .iter()
                    .map(|case| SwitchCase {
                        values: case.values.clone(),
                        branch: next(),
                    })
                    .collect();
                Self::switch(flow.value.clone(), cases, next())
            }
            Self::Try(flow) => {
                let success_branch = next();
                Self::try_flow(flow.instruction.clone(), success_branch, next())
            }
        }
    }

    /// Rewrites every value this flow refers to: flow values, embedded
    /// instruction arguments and branch arguments.
    pub fn map_values(&self, mut f: impl FnMut(&ValueTag) -> ValueTag) -> Self {
        let flow = match self {
            Self::Return(value) => Self::Return(f(value)),
            Self::Switch(flow) => Self::Switch(SwitchFlow {
                value: f(&flow.value),
                ..flow.clone()
            }),
            other => other.clone(),
        };

        let instructions = flow
            .instructions()
            .iter()
            .map(|inst| inst.map_arguments(&mut f))
            .collect();
        let flow = flow.with_instructions(instructions);

        let branches = flow.branches().iter().map(|b| b.map_values(&mut f)).collect();
        flow.with_branches(branches)
    }

    pub fn map_targets(&self, mut f: impl FnMut(&BasicBlockTag) -> BasicBlockTag) -> Self {
        let branches = self
            .branches()
            .iter()
            .map(|branch| branch.with_target(f(&branch.target)))
            .collect();
        self.with_branches(branches)
    }

    pub fn map_members(&self, mapping: &dyn MemberMapping) -> Self {
        let instructions = self
            .instructions()
            .iter()
            .map(|inst| inst.map_members(mapping))
            .collect();
        self.with_instructions(instructions)
    }

    /// Every value this flow reads, in a stable order.
    pub fn used_values(&self) -> Vec<&ValueTag> {
        let mut values: Vec<_> = self.flow_value().into_iter().collect();
        for inst in self.instructions() {
            values.extend(inst.arguments());
        }
        for branch in self.branches() {
            values.extend(branch.arguments.iter().filter_map(BranchArgument::as_value));
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_first_match_wins() {
        let v = ValueTag::new("v");
        let (b, c, d) = (
            BasicBlockTag::new("b"),
            BasicBlockTag::new("c"),
            BasicBlockTag::new("d"),
        );
        let flow = SwitchFlow {
            value: v,
            cases: vec![
                SwitchCase::new(
                    [Constant::Int(0), Constant::Int(1)],
                    Branch::with_values(b.clone(), []),
                ),
                SwitchCase::new([Constant::Int(1)], Branch::with_values(c, [])),
            ],
            default_branch: Branch::with_values(d.clone(), []),
        };

        assert_eq!(flow.target_for(&Constant::Int(1)).target, b);
        assert_eq!(flow.target_for(&Constant::Int(7)).target, d);
        assert!(!flow.is_if_else());
    }

    #[test]
    fn with_branches_keeps_case_values() {
        let v = ValueTag::new("v");
        let (b, d, e) = (
            BasicBlockTag::new("b"),
            BasicBlockTag::new("d"),
            BasicBlockTag::new("e"),
        );
        let flow = BlockFlow::switch(
            v,
            vec![SwitchCase::new([Constant::Bool(false)], Branch::with_values(b, []))],
            Branch::with_values(d, []),
        );

        let retargeted = flow.map_targets(|_| e.clone());
        let BlockFlow::Switch(switch) = &retargeted else {
            panic!("expected a switch flow");
        };
        assert!(switch.is_if_else());
        assert!(switch.cases[0].values.contains(&Constant::Bool(false)));
        assert!(retargeted.branches().iter().all(|branch| branch.target == e));
    }

    #[test]
    #[should_panic]
    fn with_branches_rejects_wrong_count() {
        BlockFlow::Unreachable.with_branches(
            vec![Branch::with_values(BasicBlockTag::new("x"), [])],
        );
    }
}
