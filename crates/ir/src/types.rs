//! This module contains the type and member model instructions refer to.
use std::{fmt, sync::Arc};

use smallvec::SmallVec;
use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    Char,
    Int(IntType),
    Float32,
    Float64,
    /// A nominal reference type, e.g. a class.
    Named(SmolStr),
    Pointer(Arc<PointerType>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntType {
    pub bits: u8,
    pub signed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PointerType {
    pub element: Type,
    pub kind: PointerKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    /// An unmanaged pointer, e.g. the result of `alloca`.
    Transient,
    /// A pointer to a boxed value on the heap.
    Box,
    /// An interior pointer, e.g. the address of a field.
    Reference,
}

impl Type {
    pub const I8: Type = Type::int(8, true);
    pub const I16: Type = Type::int(16, true);
    pub const I32: Type = Type::int(32, true);
    pub const I64: Type = Type::int(64, true);
    pub const U8: Type = Type::int(8, false);
    pub const U16: Type = Type::int(16, false);
    pub const U32: Type = Type::int(32, false);
    pub const U64: Type = Type::int(64, false);

    pub const fn int(bits: u8, signed: bool) -> Self {
        Self::Int(IntType { bits, signed })
    }

    pub fn named(name: impl Into<SmolStr>) -> Self {
        Self::Named(name.into())
    }

    pub fn make_pointer(&self, kind: PointerKind) -> Self {
        Self::Pointer(Arc::new(PointerType {
            element: self.clone(),
            kind,
        }))
    }

    pub fn as_pointer(&self) -> Option<&PointerType> {
        match self {
            Self::Pointer(ptr) => Some(ptr),
            _ => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Self::Pointer(_))
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Bool | Self::Char)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }
}

fn is_plain_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Bool => f.write_str("bool"),
            Self::Char => f.write_str("char"),
            Self::Int(IntType { bits, signed }) => {
                write!(f, "{}{bits}", if *signed { 'i' } else { 'u' })
            }
            Self::Float32 => f.write_str("f32"),
            Self::Float64 => f.write_str("f64"),
            Self::Named(name) if is_plain_name(name) => write!(f, "@{name}"),
            // Quoted so names with punctuation read back as one type.
            Self::Named(name) => write!(f, "@{:?}", name.as_str()),
            Self::Pointer(ptr) => {
                let kind = match ptr.kind {
                    PointerKind::Transient => "ptr",
                    PointerKind::Box => "box",
                    PointerKind::Reference => "ref",
                };
                write!(f, "{kind}<{}>", ptr.element)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub parent: Type,
    pub name: SmolStr,
    pub field_type: Type,
    pub is_static: bool,
}

impl Field {
    pub fn new(parent: Type, name: impl Into<SmolStr>, field_type: Type) -> Self {
        Self {
            parent,
            name: name.into(),
            field_type,
            is_static: false,
        }
    }

    pub fn new_static(parent: Type, name: impl Into<SmolStr>, field_type: Type) -> Self {
        Self {
            is_static: true,
            ..Self::new(parent, name, field_type)
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static {
            f.write_str("static ")?;
        }
        write!(f, "{}.{}: {}", self.parent, self.name, self.field_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method {
    pub parent: Type,
    pub name: SmolStr,
    pub is_static: bool,
    pub return_type: Type,
    pub parameter_types: SmallVec<[Type; 4]>,
}

impl Method {
    pub fn new(
        parent: Type,
        name: impl Into<SmolStr>,
        is_static: bool,
        return_type: Type,
        parameter_types: impl IntoIterator<Item = Type>,
    ) -> Self {
        Self {
            parent,
            name: name.into(),
            is_static,
            return_type,
            parameter_types: parameter_types.into_iter().collect(),
        }
    }

    /// Number of arguments a direct call takes, including the receiver.
    pub fn arity(&self) -> usize {
        self.parameter_types.len() + usize::from(!self.is_static)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_static {
            f.write_str("static ")?;
        }
        write!(f, "{}::{}(", self.parent, self.name)?;
        write_type_list(f, &self.parameter_types)?;
        write!(f, ") -> {}", self.return_type)
    }
}

pub(crate) fn write_type_list(f: &mut fmt::Formatter<'_>, types: &[Type]) -> fmt::Result {
    let mut delim = "";
    for ty in types {
        write!(f, "{delim}{ty}")?;
        delim = ", ";
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Null,
    /// The default value of whatever type the constant is instantiated with.
    Default,
    Bool(bool),
    Int(i128),
    /// Stored as raw bits so constants stay hashable.
    Float32(u32),
    Float64(u64),
    String(SmolStr),
}

impl Constant {
    pub fn float32(value: f32) -> Self {
        Self::Float32(value.to_bits())
    }

    pub fn float64(value: f64) -> Self {
        Self::Float64(value.to_bits())
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Bool(value) => Some(i128::from(*value)),
            _ => None,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Default => f.write_str("default"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float32(bits) => write!(f, "{}f32", f32::from_bits(*bits)),
            Self::Float64(bits) => write!(f, "{}f64", f64::from_bits(*bits)),
            Self::String(value) => write!(f, "{:?}", value.as_str()),
        }
    }
}

/// Rewrites every type, method and field an IR entity refers to.
pub trait MemberMapping {
    fn map_type(&self, ty: &Type) -> Type;
    fn map_method(&self, method: &Method) -> Method;
    fn map_field(&self, field: &Field) -> Field;
}

/// A [`MemberMapping`] defined by a type function alone.
///
/// Pointer types are mapped element-first, and methods and fields are
/// rebuilt from their mapped component types.
pub struct TypeMapping<F>(pub F);

impl<F> MemberMapping for TypeMapping<F>
where
    F: Fn(&Type) -> Type,
{
    fn map_type(&self, ty: &Type) -> Type {
        match ty {
            Type::Pointer(ptr) => (self.0)(&self.map_type(&ptr.element).make_pointer(ptr.kind)),
            _ => (self.0)(ty),
        }
    }

    fn map_method(&self, method: &Method) -> Method {
        Method {
            parent: self.map_type(&method.parent),
            name: method.name.clone(),
            is_static: method.is_static,
            return_type: self.map_type(&method.return_type),
            parameter_types: method
                .parameter_types
                .iter()
                .map(|ty| self.map_type(ty))
                .collect(),
        }
    }

    fn map_field(&self, field: &Field) -> Field {
        Field {
            parent: self.map_type(&field.parent),
            name: field.name.clone(),
            field_type: self.map_type(&field.field_type),
            is_static: field.is_static,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let counter = Type::named("Counter");
        assert_eq!(Type::I32.to_string(), "i32");
        assert_eq!(Type::U8.to_string(), "u8");
        assert_eq!(
            counter.make_pointer(PointerKind::Box).to_string(),
            "box<@Counter>"
        );

        let field = Field::new(counter.clone(), "count", Type::I64);
        assert_eq!(field.to_string(), "@Counter.count: i64");

        let method = Method::new(counter, "add", true, Type::I32, [Type::I32, Type::I32]);
        assert_eq!(method.to_string(), "static @Counter::add(i32, i32) -> i32");
        assert_eq!(method.arity(), 2);
    }

    #[test]
    fn names_with_punctuation_are_quoted() {
        assert_eq!(Type::named("List_2").to_string(), "@List_2");
        assert_eq!(Type::named("System.List<T>").to_string(), r#"@"System.List<T>""#);
        assert_eq!(Type::named("").to_string(), "@\"\"");
    }

    #[test]
    fn type_mapping_reaches_pointee() {
        let mapping = TypeMapping(|ty: &Type| match ty {
            Type::Named(name) if name == "T" => Type::I32,
            _ => ty.clone(),
        });

        let ty = Type::named("T").make_pointer(PointerKind::Reference);
        assert_eq!(mapping.map_type(&ty), Type::I32.make_pointer(PointerKind::Reference));

        let field = Field::new(Type::named("Box"), "value", Type::named("T"));
        assert_eq!(mapping.map_field(&field).field_type, Type::I32);
    }
}
