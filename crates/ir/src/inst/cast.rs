use std::fmt;

use super::{Instruction, InstructionPrototype, Prototype};
use crate::{
    body::MethodBody,
    tag::ValueTag,
    types::{MemberMapping, PointerKind, Type},
};

macro_rules! pointer_cast {
    ($(#[$attr:meta])* $name:ident, $text:literal) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            pub target: Type,
        }

        impl Prototype for $name {
            fn parameter_count(&self) -> usize {
                1
            }

            fn result_type(&self) -> Type {
                self.target.clone()
            }

            fn check_conformance(
                &self,
                instruction: &Instruction,
                body: &MethodBody,
            ) -> Vec<String> {
                let arg_ty = body.implementation().get_value_type(instruction.argument(0));
                let mut errors = Vec::new();
                if !arg_ty.is_pointer() {
                    errors.push(format!("Argument to {} must be a pointer type.", $text));
                }
                if !self.target.is_pointer() {
                    errors.push(format!("Target type of {} must be a pointer type.", $text));
                }
                errors
            }

            fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
                Self {
                    target: mapping.map_type(&self.target),
                }
                .intern()
            }

            fn as_text(&self) -> &'static str {
                $text
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {}", self.as_text(), self.target)
            }
        }
    };
}

pointer_cast!(
    /// Reinterprets a pointer as another pointer type without any checks.
    ReinterpretCastPrototype,
    "reinterpret_cast"
);

pointer_cast!(
    /// Checked downcast of a pointer; produces null on failure.
    DynamicCastPrototype,
    "dynamic_cast"
);

/// Copies a value into a fresh heap box.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoxPrototype {
    pub element: Type,
}

impl Prototype for BoxPrototype {
    fn parameter_count(&self) -> usize {
        1
    }

    fn result_type(&self) -> Type {
        self.element.make_pointer(PointerKind::Box)
    }

    fn check_conformance(&self, instruction: &Instruction, body: &MethodBody) -> Vec<String> {
        let arg_ty = body.implementation().get_value_type(instruction.argument(0));
        if arg_ty == self.element {
            Vec::new()
        } else {
            vec![format!(
                "Boxed value of type '{arg_ty}' should have been of type '{}'.",
                self.element
            )]
        }
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
            element: mapping.map_type(&self.element),
        }
        .intern()
    }

    fn as_text(&self) -> &'static str {
        "box"
    }
}

impl fmt::Display for BoxPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_text(), self.element)
    }
}

/// Produces an interior pointer to the contents of a box.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnboxPrototype {
    pub element: Type,
}

impl Prototype for UnboxPrototype {
    fn parameter_count(&self) -> usize {
        1
    }

    fn result_type(&self) -> Type {
        self.element.make_pointer(PointerKind::Reference)
    }

    fn check_conformance(&self, instruction: &Instruction, body: &MethodBody) -> Vec<String> {
        let arg_ty = body.implementation().get_value_type(instruction.argument(0));
        if arg_ty.is_pointer() {
            Vec::new()
        } else {
            vec!["Argument to unbox must be a pointer type.".to_string()]
        }
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
            element: mapping.map_type(&self.element),
        }
        .intern()
    }

    fn as_text(&self) -> &'static str {
        "unbox"
    }
}

impl fmt::Display for UnboxPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_text(), self.element)
    }
}

impl Instruction {
    pub fn box_value(element: Type, value: ValueTag) -> Self {
        BoxPrototype { element }.instantiate([value])
    }

    pub fn unbox(element: Type, value: ValueTag) -> Self {
        UnboxPrototype { element }.instantiate([value])
    }

    pub fn reinterpret_cast(target: Type, value: ValueTag) -> Self {
        ReinterpretCastPrototype { target }.instantiate([value])
    }
}
