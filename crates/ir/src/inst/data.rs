use std::fmt;

use super::{Instruction, InstructionPrototype, Prototype};
use crate::{
    body::MethodBody,
    tag::ValueTag,
    types::{Field, MemberMapping, PointerKind, Type},
};

/// Reads a value of type `ty` through a pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadPrototype {
    pub ty: Type,
}

impl LoadPrototype {
    pub fn pointer<'a>(&self, instruction: &'a Instruction) -> &'a ValueTag {
        instruction.argument(0)
    }
}

impl Prototype for LoadPrototype {
    fn parameter_count(&self) -> usize {
        1
    }

    fn result_type(&self) -> Type {
        self.ty.clone()
    }

    fn check_conformance(&self, instruction: &Instruction, body: &MethodBody) -> Vec<String> {
        let ptr_ty = body.implementation().get_value_type(self.pointer(instruction));
        match ptr_ty.as_pointer() {
            None => vec!["Target of load operation must be a pointer type.".to_string()],
            Some(ptr) if ptr.element != self.ty => vec![format!(
                "Pointee type '{}' of load argument should have been '{}'.",
                ptr.element, self.ty
            )],
            Some(_) => Vec::new(),
        }
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
            ty: mapping.map_type(&self.ty),
        }
        .intern()
    }

    fn as_text(&self) -> &'static str {
        "load"
    }
}

impl fmt::Display for LoadPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_text(), self.ty)
    }
}

/// Writes a value of type `ty` through a pointer. Evaluates to the stored value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePrototype {
    pub ty: Type,
}

impl StorePrototype {
    pub fn pointer<'a>(&self, instruction: &'a Instruction) -> &'a ValueTag {
        instruction.argument(0)
    }

    pub fn value<'a>(&self, instruction: &'a Instruction) -> &'a ValueTag {
        instruction.argument(1)
    }
}

impl Prototype for StorePrototype {
    fn parameter_count(&self) -> usize {
        2
    }

    fn result_type(&self) -> Type {
        self.ty.clone()
    }

    fn check_conformance(&self, instruction: &Instruction, body: &MethodBody) -> Vec<String> {
        let graph = body.implementation();
        let mut errors = Vec::new();

        let ptr_ty = graph.get_value_type(self.pointer(instruction));
        match ptr_ty.as_pointer() {
            None => errors.push("Target of store operation must be a pointer type.".to_string()),
            Some(ptr) if ptr.element != self.ty => errors.push(format!(
                "Pointee type '{}' of store target pointer should have been '{}'.",
                ptr.element, self.ty
            )),
            Some(_) => {}
        }

        let value_ty = graph.get_value_type(self.value(instruction));
        if value_ty != self.ty {
            errors.push(format!(
                "Type of value stored in pointer was '{value_ty}' but should have been '{}'.",
                self.ty
            ));
        }

        errors
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
            ty: mapping.map_type(&self.ty),
        }
        .intern()
    }

    fn as_text(&self) -> &'static str {
        "store"
    }
}

impl fmt::Display for StorePrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_text(), self.ty)
    }
}

/// Computes the address of an instance field from a base pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GetFieldPointerPrototype {
    pub field: Field,
}

impl Prototype for GetFieldPointerPrototype {
    fn parameter_count(&self) -> usize {
        1
    }

    fn result_type(&self) -> Type {
        self.field.field_type.make_pointer(PointerKind::Reference)
    }

    fn check_conformance(&self, instruction: &Instruction, body: &MethodBody) -> Vec<String> {
        let base_ty = body.implementation().get_value_type(instruction.argument(0));
        if base_ty.is_pointer() || self.field.is_static {
            Vec::new()
        } else {
            vec!["Base of a get-field-pointer operation must be a pointer type.".to_string()]
        }
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
            field: mapping.map_field(&self.field),
        }
        .intern()
    }

    fn as_text(&self) -> &'static str {
        "get_field_pointer"
    }
}

impl fmt::Display for GetFieldPointerPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_text(), self.field)
    }
}

/// Computes the address of a static field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GetStaticFieldPointerPrototype {
    pub field: Field,
}

impl Prototype for GetStaticFieldPointerPrototype {
    fn parameter_count(&self) -> usize {
        0
    }

    fn result_type(&self) -> Type {
        self.field.field_type.make_pointer(PointerKind::Reference)
    }

    fn check_conformance(&self, _: &Instruction, _: &MethodBody) -> Vec<String> {
        Vec::new()
    }

    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype {
        Self {
            field: mapping.map_field(&self.field),
        }
        .intern()
    }

    fn as_text(&self) -> &'static str {
        "get_static_field_pointer"
    }
}

impl fmt::Display for GetStaticFieldPointerPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_text(), self.field)
    }
}

impl Instruction {
    pub fn load(ty: Type, pointer: ValueTag) -> Self {
        LoadPrototype { ty }.instantiate([pointer])
    }

    pub fn store(ty: Type, pointer: ValueTag, value: ValueTag) -> Self {
        StorePrototype { ty }.instantiate([pointer, value])
    }

    pub fn get_field_pointer(field: Field, base: ValueTag) -> Self {
        GetFieldPointerPrototype { field }.instantiate([base])
    }

    pub fn get_static_field_pointer(field: Field) -> Self {
        GetStaticFieldPointerPrototype { field }.instantiate([])
    }
}
