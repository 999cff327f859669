//! Method body validation.
//!
//! Validation never stops at the first problem; it reports every diagnostic
//! it can find as a plain message.
use crate::{
    body::MethodBody,
    flow::{BlockFlow, Branch, BranchArgument},
    graph::FlowGraph,
    inst::Instruction,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    /// Only branch and flow structure.
    Structure,
    Full,
}

#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub level: ValidationLevel,
    /// Unlimited unless capped with `with_max_diagnostics`.
    pub max_diagnostics: usize,
    pub check_conformance: bool,
    pub check_flows: bool,
    pub check_return_type: bool,
}

impl ValidationConfig {
    pub fn for_level(level: ValidationLevel) -> Self {
        match level {
            ValidationLevel::Structure => Self {
                level,
                max_diagnostics: usize::MAX,
                check_conformance: false,
                check_flows: true,
                check_return_type: false,
            },
            ValidationLevel::Full => Self {
                level,
                max_diagnostics: usize::MAX,
                check_conformance: true,
                check_flows: true,
                check_return_type: true,
            },
        }
    }

    pub fn with_conformance(mut self, check: bool) -> Self {
        self.check_conformance = check;
        self
    }

    pub fn with_flows(mut self, check: bool) -> Self {
        self.check_flows = check;
        self
    }

    pub fn with_max_diagnostics(mut self, max: usize) -> Self {
        self.max_diagnostics = max;
        self
    }

    pub fn should_check_return_type(&self) -> bool {
        self.check_return_type || matches!(self.level, ValidationLevel::Full)
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self::for_level(ValidationLevel::Full)
    }
}

/// Which branch of a flow is being checked, and so which markers it may carry.
#[derive(Clone, Copy)]
enum BranchRole {
    Plain,
    TrySuccess,
    TryException,
}

impl BranchRole {
    fn allows(self, arg: &BranchArgument) -> bool {
        matches!(
            (self, arg),
            (_, BranchArgument::Value(_))
                | (Self::TrySuccess, BranchArgument::TryResult)
                | (Self::TryException, BranchArgument::TryException)
        )
    }
}

struct Validator<'a> {
    body: &'a MethodBody,
    graph: &'a FlowGraph,
    config: &'a ValidationConfig,
    errors: Vec<String>,
}

impl<'a> Validator<'a> {
    fn new(body: &'a MethodBody, config: &'a ValidationConfig) -> Self {
        Self {
            body,
            graph: body.implementation(),
            config,
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<String> {
        let graph = self.graph;
        for block in graph.basic_blocks() {
            for inst in block.named_instructions() {
                self.check_instruction(inst.instruction());
            }
            for inst in block.flow().instructions() {
                self.check_instruction(inst);
            }
            if self.config.check_flows {
                self.check_flow(block.flow());
            }
        }

        self.errors.truncate(self.config.max_diagnostics);
        self.errors
    }

    fn check_instruction(&mut self, instruction: &Instruction) {
        let all_defined = instruction
            .arguments()
            .iter()
            .all(|arg| self.graph.contains_value(arg));

        if !all_defined {
            self.errors.push("Instruction argument not in graph.".to_string());
        } else if self.config.check_conformance {
            self.errors.extend(instruction.check_conformance(self.body));
        }
    }

    fn check_flow(&mut self, flow: &BlockFlow) {
        match flow {
            BlockFlow::Unreachable => {}
            BlockFlow::Jump(branch) => self.check_branch(flow, branch, BranchRole::Plain),
            BlockFlow::Return(value) => {
                if !self.graph.contains_value(value) {
                    self.errors.push("Flow value not in graph.".to_string());
                } else if self.config.should_check_return_type() {
                    let value_ty = self.graph.get_value_type(value);
                    let return_ty = &self.body.return_parameter.ty;
                    if &value_ty != return_ty {
                        self.errors.push(format!(
                            "Returned value type '{value_ty}' mismatches return type '{return_ty}'."
                        ));
                    }
                }
            }
            BlockFlow::Switch(switch) => {
                if !self.graph.contains_value(&switch.value) {
                    self.errors.push("Flow value not in graph.".to_string());
                }
                for branch in flow.branches() {
                    self.check_branch(flow, branch, BranchRole::Plain);
                }
            }
            BlockFlow::Try(try_flow) => {
                self.check_branch(flow, &try_flow.success_branch, BranchRole::TrySuccess);
                self.check_branch(flow, &try_flow.exception_branch, BranchRole::TryException);
            }
        }
    }

    fn check_branch(&mut self, flow: &BlockFlow, branch: &Branch, role: BranchRole) {
        let graph = self.graph;
        let Some(target) = graph.try_get_basic_block(&branch.target) else {
            self.errors.push("Branch to block outside of graph.".to_string());
            return;
        };

        let param_count = target.parameter_count();
        if branch.arguments.len() != param_count {
            self.errors.push(format!(
                "Branch argument count ('{}') mismatches target block parameter count ('{}').",
                branch.arguments.len(),
                param_count
            ));
            return;
        }

        for (arg, param) in branch.arguments.iter().zip(target.parameters()) {
            if !role.allows(arg) {
                self.errors.push(format!(
                    "Branch argument kind '{}' is not allowed in this branch of '{}' flow.",
                    arg.kind_name(),
                    flow.kind_name()
                ));
                continue;
            }

            let arg_ty = match arg {
                BranchArgument::Value(value) => {
                    if !graph.contains_value(value) {
                        self.errors.push("Branch argument not in graph.".to_string());
                        continue;
                    }
                    graph.get_value_type(value)
                }
                BranchArgument::TryResult => match flow.instructions() {
                    [inst] => inst.result_type(),
                    _ => continue,
                },
                // Exception values are untyped.
                BranchArgument::TryException => continue,
            };

            if arg_ty != param.ty {
                self.errors.push(format!(
                    "Branch argument type '{arg_ty}' mismatches target block parameter type '{}'.",
                    param.ty
                ));
            }
        }
    }
}

impl MethodBody {
    /// Checks the body with the default configuration and returns every
    /// problem found.
    pub fn validate(&self) -> Vec<String> {
        self.validate_with(&ValidationConfig::default())
    }

    pub fn validate_with(&self, config: &ValidationConfig) -> Vec<String> {
        let errors = Validator::new(self, config).run();
        tracing::debug!(diagnostics = errors.len(), "validated method body");
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        body::Parameter,
        builder::FlowGraphBuilder,
        graph::BlockParameter,
        tag::ValueTag,
        types::{Constant, Type},
    };

    fn body(builder: &FlowGraphBuilder, ret: Type) -> MethodBody {
        MethodBody::new(Parameter::anonymous(ret), None, vec![], builder.to_immutable())
    }

    #[test]
    fn return_type_mismatch() {
        let builder = FlowGraphBuilder::new();
        let entry = builder.entry_point();
        let flag = entry.append_instruction(
            Instruction::constant(Constant::Bool(true), Type::Bool),
            "flag",
        );
        entry.set_flow(BlockFlow::Return(flag.tag().clone()));

        assert_eq!(
            body(&builder, Type::I32).validate(),
            vec!["Returned value type 'bool' mismatches return type 'i32'.".to_string()]
        );
        let structural = ValidationConfig::for_level(ValidationLevel::Structure);
        assert!(body(&builder, Type::I32).validate_with(&structural).is_empty());
    }

    #[test]
    fn dangling_references() {
        let builder = FlowGraphBuilder::new();
        let entry = builder.entry_point();
        let ghost = ValueTag::new("ghost");
        entry.append_instruction(Instruction::copy(Type::I32, ghost.clone()), "copy");
        let removed = builder.add_basic_block("removed");
        let removed_tag = removed.tag().clone();
        removed.remove();
        entry.set_flow(BlockFlow::jump(removed_tag, []));

        assert_eq!(
            body(&builder, Type::Void).validate(),
            vec![
                "Instruction argument not in graph.".to_string(),
                "Branch to block outside of graph.".to_string(),
            ]
        );
    }

    #[test]
    fn markers_outside_try() {
        let builder = FlowGraphBuilder::new();
        let entry = builder.entry_point();
        let next = builder.add_basic_block("next");
        next.append_parameter(BlockParameter::new(Type::I32, "x"));
        entry.set_flow(BlockFlow::Jump(Branch::new(
            next.tag().clone(),
            [BranchArgument::TryResult],
        )));

        assert_eq!(
            body(&builder, Type::Void).validate(),
            vec!["Branch argument kind 'try result' is not allowed in this branch of 'jump' flow."
                .to_string()]
        );
    }

    #[test]
    fn try_result_is_typed() {
        let builder = FlowGraphBuilder::new();
        let entry = builder.entry_point();
        let ok = builder.add_basic_block("ok");
        let result = ok.append_parameter(BlockParameter::new(Type::I64, "result"));
        ok.set_flow(BlockFlow::Return(result));
        let handler = builder.add_basic_block("handler");
        handler.append_parameter(BlockParameter::new(Type::named("Exception"), "e"));

        entry.set_flow(BlockFlow::try_flow(
            Instruction::constant(Constant::Int(3), Type::I32),
            Branch::new(ok.tag().clone(), [BranchArgument::TryResult]),
            Branch::new(handler.tag().clone(), [BranchArgument::TryException]),
        ));

        assert_eq!(
            body(&builder, Type::I64).validate(),
            vec![
                "Branch argument type 'i32' mismatches target block parameter type 'i64'."
                    .to_string()
            ]
        );
    }

    #[test]
    fn every_diagnostic_is_reported() {
        let builder = FlowGraphBuilder::new();
        let entry = builder.entry_point();
        let ghost = ValueTag::new("ghost");
        for _ in 0..1000 {
            entry.append_instruction(Instruction::copy(Type::I32, ghost.clone()), "copy");
        }

        assert_eq!(body(&builder, Type::Void).validate().len(), 1000);
        let capped = ValidationConfig::default().with_max_diagnostics(3);
        assert_eq!(body(&builder, Type::Void).validate_with(&capped).len(), 3);
    }
}
