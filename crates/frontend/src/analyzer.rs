//! Translation of stack bytecode into a flow graph.
//!
//! The first pass finds every instruction that starts a block: the entry,
//! each branch target, and each instruction after a terminator. The second
//! pass walks reachable blocks from the entry, tracking the evaluation stack
//! symbolically. A block's parameters are the values live across its
//! boundary: the arguments and locals (when promoted) followed by the stack
//! slots it is entered with, and every transfer passes the current values.
use std::collections::BTreeSet;

use ir::{
    inst::{IntrinsicPrototype, MethodLookup},
    BasicBlockTag, BlockFlow, BlockParameter, Branch, Constant, FlowGraphBuilder, Instruction,
    Method, MethodBody, Parameter, Prototype, SwitchCase, Type, ValueTag,
};
use rustc_hash::FxHashMap;

use crate::{FrontendConfig, FrontendError, MethodDecl, Op};

type Result<T> = std::result::Result<T, FrontendError>;

/// Builds the body of `decl`.
///
/// # Panics
/// Panics if two paths reach the same instruction with different stack
/// types.
pub fn analyze(decl: &MethodDecl, config: &FrontendConfig) -> Result<MethodBody> {
    let _span = tracing::debug_span!("analyze", method = %decl.name).entered();
    let starts = find_block_starts(&decl.code)?;
    tracing::debug!(blocks = starts.len(), "found block starts");

    let mut analyzer = Analyzer {
        decl,
        config,
        starts,
        builder: FlowGraphBuilder::new(),
        blocks: FxHashMap::default(),
        entry_stacks: FxHashMap::default(),
        worklist: Vec::new(),
        arg_slots: Vec::new(),
        local_slots: Vec::new(),
    };
    analyzer.run()?;

    let this_parameter = decl
        .this_type
        .as_ref()
        .map(|ty| Parameter::new(ty.clone(), "this"));
    let parameters = decl
        .parameters
        .iter()
        .enumerate()
        .map(|(i, ty)| Parameter::new(ty.clone(), format!("arg{i}")))
        .collect();
    Ok(MethodBody::new(
        Parameter::anonymous(decl.return_type.clone()),
        this_parameter,
        parameters,
        analyzer.builder.to_immutable(),
    ))
}

fn find_block_starts(code: &[Op]) -> Result<BTreeSet<usize>> {
    if code.is_empty() {
        return Err(FrontendError::FallsOffEnd { offset: 0 });
    }

    let mut starts = BTreeSet::from([0]);
    for (offset, op) in code.iter().enumerate() {
        for &target in op.branch_targets() {
            if target >= code.len() {
                return Err(FrontendError::BranchTargetOutOfRange { offset, target });
            }
            starts.insert(target);
        }

        let next = offset + 1;
        if next == code.len() {
            if op.falls_through() {
                return Err(FrontendError::FallsOffEnd { offset });
            }
        } else if op.is_terminator() {
            starts.insert(next);
        }
    }
    Ok(starts)
}

#[derive(Debug, Clone)]
struct Slot {
    value: ValueTag,
    ty: Type,
}

/// The symbolic machine state at one point of a block.
#[derive(Debug, Clone, Default)]
struct Frame {
    args: Vec<Slot>,
    locals: Vec<Slot>,
    stack: Vec<Slot>,
}

impl Frame {
    fn pop(&mut self, offset: usize) -> Result<Slot> {
        self.stack
            .pop()
            .ok_or(FrontendError::StackUnderflow { offset })
    }

    fn push(&mut self, slot: Slot) {
        self.stack.push(slot);
    }

    fn stack_types(&self) -> Vec<Type> {
        self.stack.iter().map(|slot| slot.ty.clone()).collect()
    }

    /// The values passed along a branch, in block parameter order.
    fn values(&self) -> impl Iterator<Item = ValueTag> + '_ {
        self.args
            .iter()
            .chain(&self.locals)
            .chain(&self.stack)
            .map(|slot| slot.value.clone())
    }
}

struct Analyzer<'a> {
    decl: &'a MethodDecl,
    config: &'a FrontendConfig,
    starts: BTreeSet<usize>,
    builder: FlowGraphBuilder,
    blocks: FxHashMap<usize, BasicBlockTag>,
    /// The stack types each block was first reached with.
    entry_stacks: FxHashMap<usize, Vec<Type>>,
    worklist: Vec<usize>,
    /// `alloca` slots of arguments and locals when they are not promoted.
    arg_slots: Vec<ValueTag>,
    local_slots: Vec<ValueTag>,
}

impl<'a> Analyzer<'a> {
    fn run(&mut self) -> Result<()> {
        let frame = self.build_entry();
        let branch = self.reach(0, &frame);
        self.builder
            .entry_point()
            .set_flow(BlockFlow::Jump(branch));

        while let Some(offset) = self.worklist.pop() {
            self.analyze_block(offset)?;
        }
        Ok(())
    }

    /// Declares the arguments and initializes the locals.
    fn build_entry(&mut self) -> Frame {
        let decl = self.decl;
        let entry = self.builder.entry_point();
        let mut frame = Frame::default();

        for (i, ty) in decl.argument_types().enumerate() {
            let name = argument_name(decl, i);
            let value = entry.append_parameter(BlockParameter::new(ty.clone(), &name));
            if self.config.promote_locals {
                frame.args.push(Slot {
                    value,
                    ty: ty.clone(),
                });
            } else {
                let slot = entry.append_instruction(
                    Instruction::alloca(ty.clone()),
                    &format!("{name}_slot"),
                );
                let slot = slot.tag().clone();
                entry.append_instruction(
                    Instruction::store(ty.clone(), slot.clone(), value),
                    "init",
                );
                self.arg_slots.push(slot);
            }
        }

        for (i, ty) in decl.locals.iter().enumerate() {
            let name = format!("loc{i}");
            let init = entry.append_instruction(
                Instruction::constant(Constant::Default, ty.clone()),
                &name,
            );
            let value = init.tag().clone();
            if self.config.promote_locals {
                frame.locals.push(Slot {
                    value,
                    ty: ty.clone(),
                });
            } else {
                let slot = entry.append_instruction(
                    Instruction::alloca(ty.clone()),
                    &format!("{name}_slot"),
                );
                let slot = slot.tag().clone();
                entry.append_instruction(
                    Instruction::store(ty.clone(), slot.clone(), value),
                    "init",
                );
                self.local_slots.push(slot);
            }
        }
        frame
    }

    /// Returns the branch that transfers `frame` to the block at `target`,
    /// creating the block the first time it is reached.
    fn reach(&mut self, target: usize, frame: &Frame) -> Branch {
        let stack = frame.stack_types();
        match self.entry_stacks.get(&target) {
            Some(first) => {
                if *first != stack {
                    panic!(
                        "Different paths to instruction '{target}' have incompatible stack \
                         contents. Stack contents on first path: [{}]. Stack contents on \
                         second path: [{}].",
                        type_list(first),
                        type_list(&stack)
                    );
                }
                tracing::trace!(offset = target, "merged path into analyzed block");
            }
            None => {
                let tag = {
                    let block = self.builder.add_basic_block(&format!("IL_{target:04X}"));
                    let carried = frame.args.iter().chain(&frame.locals);
                    for (slot, name) in carried.zip(self.carried_names()) {
                        block.append_parameter(BlockParameter::new(slot.ty.clone(), &name));
                    }
                    for (i, ty) in stack.iter().enumerate() {
                        block.append_parameter(
                            BlockParameter::new(ty.clone(), &format!("stack{i}")),
                        );
                    }
                    block.tag().clone()
                };
                tracing::debug!(offset = target, depth = stack.len(), "discovered block");
                self.blocks.insert(target, tag);
                self.entry_stacks.insert(target, stack);
                self.worklist.push(target);
            }
        }
        Branch::with_values(self.blocks[&target].clone(), frame.values())
    }

    fn carried_names(&self) -> impl Iterator<Item = String> + '_ {
        let args = (0..self.decl.argument_count()).map(|i| argument_name(self.decl, i));
        let locals = (0..self.decl.locals.len()).map(|i| format!("loc{i}"));
        args.chain(locals)
    }

    fn analyze_block(&mut self, start: usize) -> Result<()> {
        let block = self.blocks[&start].clone();
        let mut params = self
            .builder
            .get_basic_block(&block)
            .parameters()
            .into_iter()
            .map(|param| Slot {
                value: param.tag,
                ty: param.ty,
            });

        let mut frame = Frame::default();
        if self.config.promote_locals {
            frame.args = params.by_ref().take(self.decl.argument_count()).collect();
            frame.locals = params.by_ref().take(self.decl.locals.len()).collect();
        }
        frame.stack = params.collect();

        let decl = self.decl;
        let mut offset = start;
        loop {
            let op = &decl.code[offset];
            tracing::trace!(offset, ?op, depth = frame.stack.len(), "analyzing instruction");
            if self.step(&block, offset, op, &mut frame)? {
                return Ok(());
            }

            // Block starts guarantee that a fall-through successor exists.
            offset += 1;
            if self.starts.contains(&offset) {
                let branch = self.reach(offset, &frame);
                self.builder.get_basic_block(&block).set_flow(BlockFlow::Jump(branch));
                return Ok(());
            }
        }
    }

    /// Translates one instruction, returning whether it ended the block.
    fn step(
        &mut self,
        block: &BasicBlockTag,
        offset: usize,
        op: &Op,
        frame: &mut Frame,
    ) -> Result<bool> {
        let decl = self.decl;
        match op {
            Op::Nop => {}
            Op::LdcI4(value) => {
                let slot = self.constant(block, Constant::Int((*value).into()), Type::I32);
                frame.push(slot);
            }
            Op::LdcI8(value) => {
                let slot = self.constant(block, Constant::Int((*value).into()), Type::I64);
                frame.push(slot);
            }
            Op::LdcR8(value) => {
                let slot = self.constant(block, Constant::float64(*value), Type::Float64);
                frame.push(slot);
            }
            Op::LdcBool(value) => {
                let slot = self.constant(block, Constant::Bool(*value), Type::Bool);
                frame.push(slot);
            }
            Op::LdNull => {
                let slot = self.constant(block, Constant::Null, self.config.null_type.clone());
                frame.push(slot);
            }
            Op::LdStr(value) => {
                let slot = self.constant(
                    block,
                    Constant::String(value.clone()),
                    self.config.string_type.clone(),
                );
                frame.push(slot);
            }

            Op::LdArg(index) => {
                let ty = decl
                    .argument_types()
                    .nth(*index)
                    .ok_or(FrontendError::ArgumentOutOfRange { offset, index: *index })?;
                let slot = if self.config.promote_locals {
                    frame.args[*index].clone()
                } else {
                    let pointer = self.arg_slots[*index].clone();
                    self.emit(block, Instruction::load(ty.clone(), pointer), "ldarg")
                };
                frame.push(slot);
            }
            Op::StArg(index) => {
                let ty = decl
                    .argument_types()
                    .nth(*index)
                    .ok_or(FrontendError::ArgumentOutOfRange { offset, index: *index })?;
                let value = frame.pop(offset)?;
                expect_type(offset, &value, ty)?;
                if self.config.promote_locals {
                    frame.args[*index] = value;
                } else {
                    let pointer = self.arg_slots[*index].clone();
                    self.emit(block, Instruction::store(ty.clone(), pointer, value.value), "starg");
                }
            }
            Op::LdLoc(index) => {
                let ty = decl
                    .locals
                    .get(*index)
                    .ok_or(FrontendError::LocalOutOfRange { offset, index: *index })?;
                let slot = if self.config.promote_locals {
                    frame.locals[*index].clone()
                } else {
                    let pointer = self.local_slots[*index].clone();
                    self.emit(block, Instruction::load(ty.clone(), pointer), "ldloc")
                };
                frame.push(slot);
            }
            Op::StLoc(index) => {
                let ty = decl
                    .locals
                    .get(*index)
                    .ok_or(FrontendError::LocalOutOfRange { offset, index: *index })?;
                let value = frame.pop(offset)?;
                expect_type(offset, &value, ty)?;
                if self.config.promote_locals {
                    frame.locals[*index] = value;
                } else {
                    let pointer = self.local_slots[*index].clone();
                    self.emit(block, Instruction::store(ty.clone(), pointer, value.value), "stloc");
                }
            }
            Op::Dup => {
                let top = frame.pop(offset)?;
                frame.push(top.clone());
                frame.push(top);
            }
            Op::Pop => {
                frame.pop(offset)?;
            }

            Op::Add
            | Op::Sub
            | Op::Mul
            | Op::Div
            | Op::Rem
            | Op::And
            | Op::Or
            | Op::Xor
            | Op::Ceq
            | Op::Clt
            | Op::Cgt => {
                let rhs = frame.pop(offset)?;
                let lhs = frame.pop(offset)?;
                expect_type(offset, &rhs, &lhs.ty)?;
                let result_ty = if op.is_comparison() {
                    Type::Bool
                } else {
                    lhs.ty.clone()
                };
                let name = op.arith_name().unwrap_or_default();
                let inst = Instruction::arithmetic(name, result_ty, lhs.ty, lhs.value, rhs.value);
                let slot = self.emit(block, inst, name);
                frame.push(slot);
            }

            Op::Br(target) => {
                let branch = self.reach(*target, frame);
                self.set_flow(block, BlockFlow::Jump(branch));
                return Ok(true);
            }
            Op::BrTrue(target) | Op::BrFalse(target) => {
                let condition = frame.pop(offset)?;
                expect_type(offset, &condition, &Type::Bool)?;
                let taken = self.reach(*target, frame);
                let fall_through = self.reach(offset + 1, frame);
                let (if_false, otherwise) = match op {
                    Op::BrTrue(_) => (fall_through, taken),
                    _ => (taken, fall_through),
                };
                let cases = vec![SwitchCase::new([Constant::Bool(false)], if_false)];
                self.set_flow(block, BlockFlow::switch(condition.value, cases, otherwise));
                return Ok(true);
            }
            Op::Switch(targets) => {
                let value = frame.pop(offset)?;
                expect_type(offset, &value, &Type::I32)?;
                let cases = targets
                    .iter()
                    .enumerate()
                    .map(|(i, target)| {
                        let branch = self.reach(*target, frame);
                        SwitchCase::new([Constant::Int(i as i128)], branch)
                    })
                    .collect();
                let default = self.reach(offset + 1, frame);
                self.set_flow(block, BlockFlow::switch(value.value, cases, default));
                return Ok(true);
            }
            Op::Ret => {
                let value = if decl.return_type.is_void() {
                    self.constant(block, Constant::Default, Type::Void)
                } else {
                    let value = frame.pop(offset)?;
                    expect_type(offset, &value, &decl.return_type)?;
                    value
                };
                self.set_flow(block, BlockFlow::Return(value.value));
                return Ok(true);
            }
            Op::Throw => {
                let exception = frame.pop(offset)?;
                let throw = IntrinsicPrototype::new("exception.throw", Type::Void, [exception.ty]);
                self.emit(block, throw.instantiate([exception.value]), "throw");
                self.set_flow(block, BlockFlow::Unreachable);
                return Ok(true);
            }

            Op::LdFld(field) => {
                let slot = if field.is_static {
                    let pointer = self.emit(
                        block,
                        Instruction::get_static_field_pointer(field.clone()),
                        "field_ptr",
                    );
                    self.emit(
                        block,
                        Instruction::load(field.field_type.clone(), pointer.value),
                        "ldfld",
                    )
                } else {
                    let base = frame.pop(offset)?;
                    self.emit(block, Instruction::load_field(field.clone(), base.value), "ldfld")
                };
                frame.push(slot);
            }
            Op::StFld(field) => {
                let value = frame.pop(offset)?;
                expect_type(offset, &value, &field.field_type)?;
                if field.is_static {
                    let pointer = self.emit(
                        block,
                        Instruction::get_static_field_pointer(field.clone()),
                        "field_ptr",
                    );
                    let store = Instruction::store(
                        field.field_type.clone(),
                        pointer.value,
                        value.value,
                    );
                    self.emit(block, store, "stfld");
                } else {
                    let base = frame.pop(offset)?;
                    self.emit(
                        block,
                        Instruction::store_field(field.clone(), base.value, value.value),
                        "stfld",
                    );
                }
            }
            Op::Call(method) => self.call(block, offset, method, MethodLookup::Direct, frame)?,
            Op::CallVirt(method) => self.call(block, offset, method, MethodLookup::Virtual, frame)?,
        }
        Ok(false)
    }

    fn call(
        &mut self,
        block: &BasicBlockTag,
        offset: usize,
        method: &Method,
        lookup: MethodLookup,
        frame: &mut Frame,
    ) -> Result<()> {
        let arity = method.arity();
        let Some(split) = frame.stack.len().checked_sub(arity) else {
            return Err(FrontendError::StackUnderflow { offset });
        };
        let args = frame.stack.split_off(split);

        let receivers = arity - method.parameter_types.len();
        for (arg, ty) in args[receivers..].iter().zip(&method.parameter_types) {
            expect_type(offset, arg, ty)?;
        }

        let call = Instruction::call(method.clone(), lookup, args.into_iter().map(|arg| arg.value));
        let result = self.emit(block, call, "call");
        if !method.return_type.is_void() {
            frame.push(result);
        }
        Ok(())
    }

    fn constant(&self, block: &BasicBlockTag, value: Constant, ty: Type) -> Slot {
        self.emit(block, Instruction::constant(value, ty), "ldc")
    }

    fn emit(&self, block: &BasicBlockTag, instruction: Instruction, name: &str) -> Slot {
        let ty = instruction.result_type();
        let inst = self
            .builder
            .get_basic_block(block)
            .append_instruction(instruction, name);
        Slot {
            value: inst.tag().clone(),
            ty,
        }
    }

    fn set_flow(&self, block: &BasicBlockTag, flow: BlockFlow) {
        self.builder.get_basic_block(block).set_flow(flow);
    }
}

fn argument_name(decl: &MethodDecl, index: usize) -> String {
    match (&decl.this_type, index) {
        (Some(_), 0) => "this".to_string(),
        (Some(_), i) => format!("arg{}", i - 1),
        (None, i) => format!("arg{i}"),
    }
}

fn expect_type(offset: usize, slot: &Slot, ty: &Type) -> Result<()> {
    if slot.ty == *ty {
        Ok(())
    } else {
        Err(FrontendError::TypeMismatch {
            offset,
            expected: ty.to_string(),
            found: slot.ty.to_string(),
        })
    }
}

fn type_list(types: &[Type]) -> String {
    types
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_starts() {
        let code = [
            Op::LdArg(0),
            Op::BrFalse(4),
            Op::LdcI4(1),
            Op::Ret,
            Op::LdcI4(0),
            Op::Ret,
        ];
        let starts: Vec<_> = find_block_starts(&code).unwrap().into_iter().collect();
        assert_eq!(starts, vec![0, 2, 4]);
    }

    #[test]
    fn instruction_after_return_starts_a_block() {
        let code = [Op::LdcI4(1), Op::Ret, Op::LdcI4(2), Op::Ret];
        let starts: Vec<_> = find_block_starts(&code).unwrap().into_iter().collect();
        assert_eq!(starts, vec![0, 2]);
    }

    #[test]
    fn empty_method_falls_off_the_end() {
        assert_eq!(
            find_block_starts(&[]),
            Err(FrontendError::FallsOffEnd { offset: 0 })
        );
    }

    #[test]
    fn receiver_is_argument_zero() {
        let decl = MethodDecl::new("get", Type::I32)
            .with_this(Type::named("Counter"))
            .with_parameters([Type::I32]);
        assert_eq!(argument_name(&decl, 0), "this");
        assert_eq!(argument_name(&decl, 1), "arg0");
    }
}
