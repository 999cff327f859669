use std::fmt;

use smallvec::SmallVec;

use super::{check_argument_types, Instruction, InstructionPrototype, Prototype};
use crate::{
    body::MethodBody,
    tag::ValueTag,
    types::{write_type_list, MemberMapping, Method, Type},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodLookup {
    /// Call exactly the named method.
    Direct,
    /// Resolve the callee through the receiver's dynamic type.
    Virtual,
}

impl fmt::Display for MethodLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Virtual => f.write_str("virtual"),
        }
    }
}

/// Calls a method. Instance methods take their receiver as the first argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallPrototype {
    pub callee: Method,
    pub lookup: MethodLookup,
}

impl CallPrototype {
    pub fn receiver_count(&self) -> usize {
        usize::from(!self.callee.is_static)
    }
}

impl Prototype for CallPrototype {
    fn parameter_count(&self) -> usize {
        self.callee.arity()
    }

    fn result_type(&self) -> Type {
        self.callee.return_type.clone()
    }

    fn check_conformance(&self, instruction: &Instruction, body: &MethodBody) -> Vec<String> {
        let mut errors = Vec::new();
        if self.callee.is_static && self.lookup == MethodLookup::Virtual {
            errors.push(format!(
                "Static method '{}' cannot be called virtually.",
                self.callee
            ));
        }

        let args = &instruction.arguments()[self.receiver_count()..];
        errors.extend(check_argument_types(args, &self.callee.parameter_types, body));
        errors
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
            callee: mapping.map_method(&self.callee),
            lookup: self.lookup,
        }
        .intern()
    }

    fn as_text(&self) -> &'static str {
        "call"
    }
}

impl fmt::Display for CallPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.as_text(), self.lookup, self.callee)
    }
}

/// Allocates an object and runs `constructor` on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NewObjectPrototype {
    pub constructor: Method,
}

impl Prototype for NewObjectPrototype {
    fn parameter_count(&self) -> usize {
        self.constructor.parameter_types.len()
    }

    fn result_type(&self) -> Type {
        self.constructor.parent.clone()
    }

    fn check_conformance(&self, instruction: &Instruction, body: &MethodBody) -> Vec<String> {
        let mut errors = Vec::new();
        if self.constructor.is_static {
            errors.push(format!(
                "Constructor '{}' must not be a static method.",
                self.constructor
            ));
        }
        errors.extend(check_argument_types(
            instruction.arguments(),
            &self.constructor.parameter_types,
            body,
        ));
        errors
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
            constructor: mapping.map_method(&self.constructor),
        }
        .intern()
    }

    fn as_text(&self) -> &'static str {
        "new_object"
    }
}

impl fmt::Display for NewObjectPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_text(), self.constructor)
    }
}

/// Calls a function value. The callee is the first argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndirectCallPrototype {
    pub return_type: Type,
    pub parameter_types: SmallVec<[Type; 4]>,
}

impl Prototype for IndirectCallPrototype {
    fn parameter_count(&self) -> usize {
        self.parameter_types.len() + 1
    }

    fn result_type(&self) -> Type {
        self.return_type.clone()
    }

    fn check_conformance(&self, instruction: &Instruction, body: &MethodBody) -> Vec<String> {
        let mut errors = Vec::new();
        let callee_ty = body.implementation().get_value_type(instruction.argument(0));
        if !matches!(callee_ty, Type::Named(_) | Type::Pointer(_)) {
            errors.push(format!(
                "Callee of an indirect call must be a delegate or pointer, not '{callee_ty}'."
            ));
        }
        errors.extend(check_argument_types(
            &instruction.arguments()[1..],
            &self.parameter_types,
            body,
        ));
        errors
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
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
        "indirect_call"
    }
}

impl fmt::Display for IndirectCallPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.as_text())?;
        write_type_list(f, &self.parameter_types)?;
        write!(f, ") -> {}", self.return_type)
    }
}

impl Instruction {
    pub fn call(
        callee: Method,
        lookup: MethodLookup,
        arguments: impl IntoIterator<Item = ValueTag>,
    ) -> Self {
        CallPrototype { callee, lookup }.instantiate(arguments)
    }

    pub fn new_object(constructor: Method, arguments: impl IntoIterator<Item = ValueTag>) -> Self {
        NewObjectPrototype { constructor }.instantiate(arguments)
    }
}
