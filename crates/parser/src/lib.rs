//! Decoder for the textual form written by [`ir::ir_writer`].
//!
//! Decoding happens in two passes: the first declares a tag for every block
//! and value name, the second builds the graph, so names may be used before
//! the line that defines them.
use ast::{BlockName, ValueName};
use ir::{
    BasicBlockTag, BlockFlow, BlockParameter, Branch, BranchArgument, FlowGraph, Instruction,
    InstructionPrototype, MethodBody, Parameter, SwitchCase, ValueTag,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use syntax::Spanned;

pub mod ast;
mod error;
pub mod syntax;
pub use error::{Error, UndefinedKind};
pub use syntax::Span;

/// Parses the output of [`ir::ir_writer::BodyWriter`].
pub fn parse_method_body(input: &str) -> Result<MethodBody, Vec<Error>> {
    let body = ast::parse_body(input)?;
    let graph = build_graph(&body.blocks)?;

    let to_param = |decl: ast::ParamDecl| Parameter::new(decl.ty, decl.name);
    Ok(MethodBody::new(
        Parameter::anonymous(body.return_type),
        body.this_parameter.map(to_param),
        body.parameters.into_iter().map(to_param).collect(),
        graph,
    ))
}

/// Parses the output of [`ir::ir_writer::GraphWriter`].
pub fn parse_flow_graph(input: &str) -> Result<FlowGraph, Vec<Error>> {
    let graph = ast::parse_graph(input)?;
    build_graph(&graph.blocks)
}

fn build_graph(blocks: &[ast::Block]) -> Result<FlowGraph, Vec<Error>> {
    let graph = FlowGraph::new();
    let mut ctx = BuildCtx::default();
    ctx.declare(&graph, blocks);

    let graph = ctx.build(graph, blocks);
    if ctx.errors.is_empty() {
        Ok(graph)
    } else {
        Err(ctx.errors)
    }
}

#[derive(Default)]
struct BuildCtx {
    blocks: FxHashMap<BlockName, BasicBlockTag>,
    values: FxHashMap<ValueName, ValueTag>,
    errors: Vec<Error>,
}

impl BuildCtx {
    /// Gives every block and value name a tag. The first block reuses the
    /// entry block the empty graph starts with.
    fn declare(&mut self, graph: &FlowGraph, blocks: &[ast::Block]) {
        for (i, block) in blocks.iter().enumerate() {
            let name = &block.name;
            if self.blocks.contains_key(&name.inner) {
                self.errors
                    .push(Error::DuplicateBlockName(name.inner.0.clone(), name.span));
                continue;
            }
            let tag = if i == 0 {
                graph.entry_point_tag().clone()
            } else {
                BasicBlockTag::new(name.inner.0.as_str())
            };
            self.blocks.insert(name.inner.clone(), tag);
        }

        let names = blocks.iter().flat_map(|block| {
            let params = block.params.iter().map(|param| &param.name);
            params.chain(block.stmts.iter().map(|stmt| &stmt.dest))
        });
        for name in names {
            if self.values.contains_key(&name.inner) {
                self.errors
                    .push(Error::DuplicateValueName(name.inner.0.clone(), name.span));
            } else {
                let tag = ValueTag::new(name.inner.0.as_str());
                self.values.insert(name.inner.clone(), tag);
            }
        }
    }

    fn build(&mut self, mut graph: FlowGraph, blocks: &[ast::Block]) -> FlowGraph {
        let mut seen: Vec<BasicBlockTag> = Vec::with_capacity(blocks.len());
        for block in blocks {
            let Some(tag) = self.blocks.get(&block.name.inner).cloned() else {
                continue;
            };
            // Duplicate names were reported in the first pass.
            if seen.contains(&tag) {
                continue;
            }
            seen.push(tag.clone());
            if !graph.contains_basic_block(&tag) {
                graph = graph.with_basic_block(tag.clone());
            }

            let mut params: Vec<BlockParameter> = Vec::with_capacity(block.params.len());
            for param in &block.params {
                let value = self.values[&param.name.inner].clone();
                if !graph.contains_value(&value) && params.iter().all(|p| p.tag != value) {
                    params.push(BlockParameter::with_tag(param.ty.clone(), value));
                }
            }
            graph = graph.with_parameters(&tag, params);

            let mut index = 0;
            for stmt in &block.stmts {
                let dest = self.values[&stmt.dest.inner].clone();
                if graph.contains_value(&dest) {
                    continue;
                }
                if let Some(inst) = self.instruction(&stmt.inst) {
                    graph = graph.insert_instruction(&tag, index, dest, inst);
                    index += 1;
                }
            }

            if let Some(flow) = self.flow(&block.flow) {
                graph = graph.update_block_flow(&tag, flow);
            }
        }
        graph
    }

    fn instruction(&mut self, inst: &Spanned<ast::Inst>) -> Option<Instruction> {
        let prototype = InstructionPrototype::intern(inst.inner.prototype.clone());
        let args: Vec<_> = inst.inner.args.iter().map(|arg| self.value(arg)).collect();
        let args: SmallVec<[ValueTag; 2]> = args.into_iter().collect::<Option<_>>()?;

        if args.len() != prototype.parameter_count() {
            self.errors.push(Error::ArityMismatch {
                prototype: prototype.to_string(),
                expected: prototype.parameter_count(),
                actual: args.len(),
                span: inst.span,
            });
            return None;
        }
        Some(prototype.instantiate(args))
    }

    fn flow(&mut self, flow: &ast::Flow) -> Option<BlockFlow> {
        let flow = match flow {
            ast::Flow::Unreachable => BlockFlow::Unreachable,
            ast::Flow::Jump(branch) => BlockFlow::Jump(self.branch(branch)?),
            ast::Flow::Return(value) => BlockFlow::Return(self.value(value)?),
            ast::Flow::Switch {
                value,
                cases,
                default,
            } => {
                let value = self.value(value);
                let cases: Vec<_> = cases
                    .iter()
                    .map(|case| {
                        let branch = self.branch(&case.branch)?;
                        Some(SwitchCase::new(case.values.iter().cloned(), branch))
                    })
                    .collect();
                let default = self.branch(default);
                let cases = cases.into_iter().collect::<Option<_>>();
                BlockFlow::switch(value?, cases?, default?)
            }
            ast::Flow::Try {
                inst,
                success,
                exception,
            } => {
                let inst = self.instruction(inst);
                let success = self.branch(success);
                let exception = self.branch(exception);
                BlockFlow::try_flow(inst?, success?, exception?)
            }
        };
        Some(flow)
    }

    /// Resolves every part of `branch`, reporting each undefined name.
    fn branch(&mut self, branch: &ast::Branch) -> Option<Branch> {
        let target = match self.blocks.get(&branch.target.inner) {
            Some(tag) => Some(tag.clone()),
            None => {
                self.errors.push(Error::Undefined(
                    UndefinedKind::Block(branch.target.inner.0.clone()),
                    branch.target.span,
                ));
                None
            }
        };

        let mut args = Vec::with_capacity(branch.args.len());
        let mut complete = true;
        for arg in &branch.args {
            match arg {
                ast::BranchArg::Value(value) => match self.value(value) {
                    Some(value) => args.push(BranchArgument::Value(value)),
                    None => complete = false,
                },
                ast::BranchArg::TryResult(_) => args.push(BranchArgument::TryResult),
                ast::BranchArg::TryException(_) => args.push(BranchArgument::TryException),
            }
        }

        if !complete {
            return None;
        }
        Some(Branch::new(target?, args))
    }

    fn value(&mut self, name: &Spanned<ValueName>) -> Option<ValueTag> {
        match self.values.get(&name.inner) {
            Some(tag) => Some(tag.clone()),
            None => {
                self.errors.push(Error::Undefined(
                    UndefinedKind::Value(name.inner.0.clone()),
                    name.span,
                ));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ir::{ir_writer::GraphWriter, PrototypeKind, Type};

    use super::*;

    #[test]
    fn names_may_be_used_before_definition() {
        let graph = parse_flow_graph(
            "graph {
                block0:
                    jump block1(v1);

                block1(v0: i32):
                    v1 = const 1: i32;
                    return v0;
            }",
        )
        .unwrap();

        assert_eq!(graph.block_count(), 2);
        let entry = graph.entry_point();
        let BlockFlow::Jump(branch) = entry.flow() else {
            panic!("expected a jump, found {:?}", entry.flow());
        };
        let inst = graph.get_instruction(branch.arguments[0].as_value().unwrap());
        assert!(matches!(
            inst.instruction().prototype().kind(),
            PrototypeKind::Constant(_)
        ));
    }

    #[test]
    fn body_header() {
        let body = parse_method_body(
            "body(this %this: box<@Counter>, %_: i32) -> void {
                block0(v0: box<@Counter>, v1: i32):
                    unreachable;
            }",
        )
        .unwrap();

        let this = body.this_parameter.as_ref().unwrap();
        assert_eq!(this.name, "this");
        assert_eq!(body.parameters, vec![Parameter::anonymous(Type::I32)]);
        assert_eq!(body.return_parameter.ty, Type::Void);
    }

    #[test]
    fn strings_survive_escaping() {
        let input = "graph {
            block0:
                v0 = const \"tab\\there \\\"quoted\\\" \\u{1b}\": @String;
                return v0;
        }";
        let graph = parse_flow_graph(input).unwrap();
        let text = GraphWriter::new(&graph).dump_string();
        assert!(text.contains(r#"const "tab\there \"quoted\" \u{1b}": @String;"#), "{text}");
    }

    #[test]
    fn errors_are_accumulated() {
        let errors = parse_flow_graph(
            "graph {
                block0:
                    v0 = copy i32 (v7);
                    v1 = const 1: i32 (v0);
                    v1 = const 2: i32;
                    jump block9;
            }",
        )
        .unwrap_err();

        let messages: Vec<_> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(
            messages,
            vec![
                "value name `v1` is already defined",
                "undefined value: `v7`",
                "`const 1: i32` takes 0 argument(s), but 1 were given",
                "undefined block: `block9`",
            ]
        );
    }
}
