use std::fmt;

use smallvec::SmallVec;
use smol_str::SmolStr;

use super::{check_argument_types, Instruction, InstructionPrototype, Prototype};
use crate::{
    body::MethodBody,
    tag::ValueTag,
    types::{write_type_list, Constant, MemberMapping, PointerKind, Type},
};

/// Produces a constant of a given type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantPrototype {
    pub value: Constant,
    pub ty: Type,
}

impl Prototype for ConstantPrototype {
    fn parameter_count(&self) -> usize {
        0
    }

    fn result_type(&self) -> Type {
        self.ty.clone()
    }

    fn check_conformance(&self, _: &Instruction, _: &MethodBody) -> Vec<String> {
        Vec::new()
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
            value: self.value.clone(),
            ty: mapping.map_type(&self.ty),
        }
        .intern()
    }

    fn as_text(&self) -> &'static str {
        "const"
    }
}

impl fmt::Display for ConstantPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.as_text(), self.value, self.ty)
    }
}

/// Forwards its single argument unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CopyPrototype {
    pub ty: Type,
}

impl Prototype for CopyPrototype {
    fn parameter_count(&self) -> usize {
        1
    }

    fn result_type(&self) -> Type {
        self.ty.clone()
    }

    fn check_conformance(&self, instruction: &Instruction, body: &MethodBody) -> Vec<String> {
        let arg_ty = body.implementation().get_value_type(instruction.argument(0));
        if arg_ty == self.ty {
            Vec::new()
        } else {
            vec![format!(
                "Copied value of type '{arg_ty}' should have been of type '{}'.",
                self.ty
            )]
        }
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
            ty: mapping.map_type(&self.ty),
        }
        .intern()
    }

    fn as_text(&self) -> &'static str {
        "copy"
    }
}

impl fmt::Display for CopyPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_text(), self.ty)
    }
}

/// Allocates storage for one `element` on the stack frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AllocaPrototype {
    pub element: Type,
}

impl Prototype for AllocaPrototype {
    fn parameter_count(&self) -> usize {
        0
    }

    fn result_type(&self) -> Type {
        self.element.make_pointer(PointerKind::Transient)
    }

    fn check_conformance(&self, _: &Instruction, _: &MethodBody) -> Vec<String> {
        Vec::new()
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
            element: mapping.map_type(&self.element),
        }
        .intern()
    }

    fn as_text(&self) -> &'static str {
        "alloca"
    }
}

impl fmt::Display for AllocaPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_text(), self.element)
    }
}

/// A named operation with an explicit signature, e.g. `arith.add`.
///
/// Intrinsic names are `<namespace>.<operator>`; analyses key their rules on
/// the full name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IntrinsicPrototype {
    pub name: SmolStr,
    pub return_type: Type,
    pub parameter_types: SmallVec<[Type; 2]>,
}

impl IntrinsicPrototype {
    pub fn new(
        name: impl Into<SmolStr>,
        return_type: Type,
        parameter_types: impl IntoIterator<Item = Type>,
    ) -> Self {
        Self {
            name: name.into(),
            return_type,
            parameter_types: parameter_types.into_iter().collect(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.name.split_once('.').map(|(ns, _)| ns)
    }

    pub fn operator(&self) -> &str {
        self.name.split_once('.').map_or(self.name.as_str(), |(_, op)| op)
    }
}

impl Prototype for IntrinsicPrototype {
    fn parameter_count(&self) -> usize {
        self.parameter_types.len()
    }

    fn result_type(&self) -> Type {
        self.return_type.clone()
    }

    fn check_conformance(&self, instruction: &Instruction, body: &MethodBody) -> Vec<String> {
        check_argument_types(instruction.arguments(), &self.parameter_types, body)
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
            name: self.name.clone(),
            return_type: mapping.map_type(&self.return_type),
            parameter_types: self
                .parameter_types
                .iter()
                .map(|ty| mapping.map_type(ty))
                .collect(),
        }
        .intern()
    }

    fn as_text(&self) -> &'static str {
        "intrinsic"
    }
}

impl fmt::Display for IntrinsicPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?} (", self.as_text(), self.name.as_str())?;
        write_type_list(f, &self.parameter_types)?;
        write!(f, ") -> {}", self.return_type)
    }
}

impl Instruction {
    pub fn constant(value: Constant, ty: Type) -> Self {
        ConstantPrototype { value, ty }.instantiate([])
    }

    pub fn copy(ty: Type, value: ValueTag) -> Self {
        CopyPrototype { ty }.instantiate([value])
    }

    pub fn alloca(element: Type) -> Self {
        AllocaPrototype { element }.instantiate([])
    }

    /// A binary `arith.<op>` intrinsic whose operands share `operand_ty`.
    pub fn arithmetic(
        op: &str,
        result_ty: Type,
        operand_ty: Type,
        lhs: ValueTag,
        rhs: ValueTag,
    ) -> Self {
        IntrinsicPrototype::new(
            format!("arith.{op}"),
            result_ty,
            [operand_ty.clone(), operand_ty],
        )
        .instantiate([lhs, rhs])
    }
}
