use ir::{Field, Method, Type};
use smol_str::SmolStr;

/// One instruction of the stack bytecode. Branch targets are instruction
/// offsets into [`MethodDecl::code`].
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Nop,
    LdcI4(i32),
    LdcI8(i64),
    LdcR8(f64),
    LdcBool(bool),
    LdNull,
    LdStr(SmolStr),
    LdArg(usize),
    StArg(usize),
    LdLoc(usize),
    StLoc(usize),
    Dup,
    Pop,

    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Ceq,
    Clt,
    Cgt,

    Br(usize),
    BrTrue(usize),
    BrFalse(usize),
    /// Jumps to `targets[i]` for an `i32` operand `i`, and falls through
    /// when the operand is out of range.
    Switch(Vec<usize>),
    Ret,
    Throw,

    LdFld(Field),
    StFld(Field),
    Call(Method),
    CallVirt(Method),
}

impl Op {
    /// The `arith.<op>` intrinsic name of a binary operator.
    pub fn arith_name(&self) -> Option<&'static str> {
        let name = match self {
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Rem => "rem",
            Op::And => "and",
            Op::Or => "or",
            Op::Xor => "xor",
            Op::Ceq => "eq",
            Op::Clt => "lt",
            Op::Cgt => "gt",
            _ => return None,
        };
        Some(name)
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self, Op::Ceq | Op::Clt | Op::Cgt)
    }

    /// Every offset this instruction may transfer control to, except the
    /// fall-through successor.
    pub fn branch_targets(&self) -> &[usize] {
        match self {
            Op::Br(target) | Op::BrTrue(target) | Op::BrFalse(target) => {
                std::slice::from_ref(target)
            }
            Op::Switch(targets) => targets,
            _ => &[],
        }
    }

    /// Whether this instruction ends a block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Op::Br(_) | Op::BrTrue(_) | Op::BrFalse(_) | Op::Switch(_) | Op::Ret | Op::Throw
        )
    }

    /// Whether control may continue with the next instruction.
    pub fn falls_through(&self) -> bool {
        !matches!(self, Op::Br(_) | Op::Ret | Op::Throw)
    }
}

/// A method in stack bytecode form.
#[derive(Debug, Clone)]
pub struct MethodDecl {
    pub name: SmolStr,
    /// The receiver type of an instance method.
    pub this_type: Option<Type>,
    pub parameters: Vec<Type>,
    pub return_type: Type,
    pub locals: Vec<Type>,
    pub code: Vec<Op>,
}

impl MethodDecl {
    pub fn new(name: impl Into<SmolStr>, return_type: Type) -> Self {
        Self {
            name: name.into(),
            this_type: None,
            parameters: Vec::new(),
            return_type,
            locals: Vec::new(),
            code: Vec::new(),
        }
    }

    pub fn with_this(mut self, ty: Type) -> Self {
        self.this_type = Some(ty);
        self
    }

    pub fn with_parameters(mut self, parameters: impl IntoIterator<Item = Type>) -> Self {
        self.parameters = parameters.into_iter().collect();
        self
    }

    pub fn with_locals(mut self, locals: impl IntoIterator<Item = Type>) -> Self {
        self.locals = locals.into_iter().collect();
        self
    }

    pub fn with_code(mut self, code: impl IntoIterator<Item = Op>) -> Self {
        self.code = code.into_iter().collect();
        self
    }

    /// Argument types as `LdArg` indexes them: the receiver comes first.
    pub fn argument_types(&self) -> impl Iterator<Item = &Type> {
        self.this_type.iter().chain(&self.parameters)
    }

    pub fn argument_count(&self) -> usize {
        usize::from(self.this_type.is_some()) + self.parameters.len()
    }
}
