//! Instructions and the prototypes describing their kinds.
//!
//! An [`Instruction`] is a prototype applied to an ordered argument list. The
//! prototype carries everything that does not depend on the arguments: the
//! result type, the arity, conformance checks and how member references are
//! rewritten. Prototypes are interned, so two structurally-equal prototypes are
//! always the same allocation and compare by pointer.
pub mod basic;
pub mod call;
pub mod cast;
pub mod data;
pub mod fused;

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock, Weak},
};

use dashmap::{mapref::entry::Entry, DashMap};
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

pub use basic::{AllocaPrototype, ConstantPrototype, CopyPrototype, IntrinsicPrototype};
pub use call::{CallPrototype, IndirectCallPrototype, MethodLookup, NewObjectPrototype};
pub use cast::{BoxPrototype, DynamicCastPrototype, ReinterpretCastPrototype, UnboxPrototype};
pub use data::{
    GetFieldPointerPrototype, GetStaticFieldPointerPrototype, LoadPrototype, StorePrototype,
};
pub use fused::{FusedPrototype, LoadFieldPrototype, StoreFieldPrototype};

use crate::{
    body::MethodBody,
    builder::NamedInstructionBuilder,
    tag::ValueTag,
    types::{MemberMapping, Type},
};

pub type InstArgs = SmallVec<[ValueTag; 2]>;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    prototype: InstructionPrototype,
    arguments: InstArgs,
}

impl Instruction {
    pub fn prototype(&self) -> &InstructionPrototype {
        &self.prototype
    }

    pub fn arguments(&self) -> &[ValueTag] {
        &self.arguments
    }

    pub fn argument(&self, idx: usize) -> &ValueTag {
        &self.arguments[idx]
    }

    pub fn result_type(&self) -> Type {
        self.prototype.result_type()
    }

    pub fn with_arguments(&self, arguments: impl IntoIterator<Item = ValueTag>) -> Self {
        self.prototype.instantiate(arguments)
    }

    pub fn map_arguments(&self, mut f: impl FnMut(&ValueTag) -> ValueTag) -> Self {
        Self {
            prototype: self.prototype.clone(),
            arguments: self.arguments.iter().map(&mut f).collect(),
        }
    }

    pub fn map_members(&self, mapping: &dyn MemberMapping) -> Self {
        Self {
            prototype: self.prototype.map(mapping),
            arguments: self.arguments.clone(),
        }
    }

    pub fn check_conformance(&self, body: &MethodBody) -> Vec<String> {
        self.prototype.check_conformance(self, body)
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prototype)?;
        if !self.arguments.is_empty() {
            f.write_str(" (")?;
            let mut delim = "";
            for arg in &self.arguments {
                write!(f, "{delim}{arg}")?;
                delim = ", ";
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Behavior every concrete prototype kind supplies.
pub trait Prototype: Clone + Into<PrototypeKind> {
    fn parameter_count(&self) -> usize;

    fn result_type(&self) -> Type;

    /// Checks an instance of this prototype against the body it lives in.
    /// Every argument of `instruction` is known to be defined in `body`.
    fn check_conformance(&self, instruction: &Instruction, body: &MethodBody) -> Vec<String>;

    /// Passes every embedded type, method and field through `mapping`.
    fn map(&self, mapping: &dyn MemberMapping) -> InstructionPrototype;

    fn as_text(&self) -> &'static str;

    fn intern(&self) -> InstructionPrototype {
        InstructionPrototype::intern(self.clone())
    }

    fn instantiate(&self, arguments: impl IntoIterator<Item = ValueTag>) -> Instruction {
        self.intern().instantiate(arguments)
    }
}

macro_rules! prototype_kinds {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum PrototypeKind {
            $($variant($ty)),*
        }

        $(
            impl From<$ty> for PrototypeKind {
                fn from(proto: $ty) -> Self {
                    Self::$variant(proto)
                }
            }
        )*

        macro_rules! dispatch {
            ($kind:expr, $proto:ident => $body:expr) => {
                match $kind {
                    $(PrototypeKind::$variant($proto) => $body),*
                }
            };
        }
    };
}

prototype_kinds! {
    Constant(ConstantPrototype),
    Copy(CopyPrototype),
    Alloca(AllocaPrototype),
    Load(LoadPrototype),
    Store(StorePrototype),
    GetFieldPointer(GetFieldPointerPrototype),
    GetStaticFieldPointer(GetStaticFieldPointerPrototype),
    Call(CallPrototype),
    NewObject(NewObjectPrototype),
    IndirectCall(IndirectCallPrototype),
    ReinterpretCast(ReinterpretCastPrototype),
    DynamicCast(DynamicCastPrototype),
    Box(BoxPrototype),
    Unbox(UnboxPrototype),
    Intrinsic(IntrinsicPrototype),
    LoadField(LoadFieldPrototype),
    StoreField(StoreFieldPrototype),
}

impl PrototypeKind {
    pub fn parameter_count(&self) -> usize {
        dispatch!(self, proto => proto.parameter_count())
    }

    pub fn as_text(&self) -> &'static str {
        dispatch!(self, proto => proto.as_text())
    }

    pub fn is_fused(&self) -> bool {
        matches!(self, Self::LoadField(_) | Self::StoreField(_))
    }

    /// Lowers `site` into canonical instructions if this is a fused kind.
    /// Returns `false`, leaving `site` untouched, otherwise.
    pub fn expand(&self, site: &NamedInstructionBuilder) -> bool {
        match self {
            Self::LoadField(proto) => proto.expand(site),
            Self::StoreField(proto) => proto.expand(site),
            _ => return false,
        }
        true
    }
}

impl fmt::Display for PrototypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        dispatch!(self, proto => fmt::Display::fmt(proto, f))
    }
}

pub struct PrototypeData {
    kind: PrototypeKind,
    result_type: OnceLock<Type>,
}

impl Drop for PrototypeData {
    fn drop(&mut self) {
        interner().remove_if(&self.kind, |_, weak| weak.strong_count() == 0);
    }
}

type PrototypeTable = DashMap<PrototypeKind, Weak<PrototypeData>, FxBuildHasher>;

fn interner() -> &'static PrototypeTable {
    static TABLE: OnceLock<PrototypeTable> = OnceLock::new();
    TABLE.get_or_init(PrototypeTable::default)
}

/// An interned, cheaply clonable handle to a prototype.
#[derive(Clone)]
pub struct InstructionPrototype(Arc<PrototypeData>);

impl InstructionPrototype {
    /// Canonicalizes `kind`: structurally-equal kinds yield the same handle.
    pub fn intern(kind: impl Into<PrototypeKind>) -> Self {
        let kind = kind.into();
        let data = match interner().entry(kind.clone()) {
            Entry::Occupied(mut entry) => match entry.get().upgrade() {
                Some(data) => data,
                None => {
                    let data = Self::alloc(kind);
                    entry.insert(Arc::downgrade(&data));
                    data
                }
            },
            Entry::Vacant(entry) => {
                let data = Self::alloc(kind);
                entry.insert(Arc::downgrade(&data));
                data
            }
        };

        Self(data)
    }

    fn alloc(kind: PrototypeKind) -> Arc<PrototypeData> {
        Arc::new(PrototypeData {
            kind,
            result_type: OnceLock::new(),
        })
    }

    pub fn kind(&self) -> &PrototypeKind {
        &self.0.kind
    }

    pub fn parameter_count(&self) -> usize {
        self.kind().parameter_count()
    }

    /// The result type, memoized per interned prototype. Fused prototypes
    /// answer this by expanding a throwaway instance.
    pub fn result_type(&self) -> Type {
        self.0
            .result_type
            .get_or_init(|| dispatch!(self.kind(), proto => proto.result_type()))
            .clone()
    }

    pub fn is_fused(&self) -> bool {
        self.kind().is_fused()
    }

    /// Applies this prototype to `arguments`.
    ///
    /// # Panics
    /// Panics if the number of arguments differs from the parameter count.
    pub fn instantiate(&self, arguments: impl IntoIterator<Item = ValueTag>) -> Instruction {
        let arguments: InstArgs = arguments.into_iter().collect();
        assert_eq!(
            arguments.len(),
            self.parameter_count(),
            "`{}` takes {} argument(s), but {} were supplied",
            self,
            self.parameter_count(),
            arguments.len()
        );

        Instruction {
            prototype: self.clone(),
            arguments,
        }
    }

    pub fn check_conformance(&self, instruction: &Instruction, body: &MethodBody) -> Vec<String> {
        dispatch!(self.kind(), proto => proto.check_conformance(instruction, body))
    }

    pub fn map(&self, mapping: &dyn MemberMapping) -> Self {
        dispatch!(self.kind(), proto => proto.map(mapping))
    }
}

impl PartialEq for InstructionPrototype {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for InstructionPrototype {}

impl Hash for InstructionPrototype {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state)
    }
}

impl fmt::Display for InstructionPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.kind(), f)
    }
}

impl fmt::Debug for InstructionPrototype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.kind(), f)
    }
}

/// Reports every argument whose type differs from the matching parameter type.
pub(crate) fn check_argument_types(
    arguments: &[ValueTag],
    parameter_types: &[Type],
    body: &MethodBody,
) -> Vec<String> {
    let graph = body.implementation();
    arguments
        .iter()
        .zip(parameter_types)
        .filter_map(|(arg, param_ty)| {
            let arg_ty = graph.get_value_type(arg);
            (&arg_ty != param_ty).then(|| {
                format!(
                    "Argument of type '{arg_ty}' was provided where an argument of type \
                     '{param_ty}' was expected."
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Constant, Field};

    #[test]
    fn interning_is_structural() {
        let a = InstructionPrototype::intern(LoadPrototype { ty: Type::I32 });
        let b = InstructionPrototype::intern(LoadPrototype { ty: Type::I32 });
        let c = InstructionPrototype::intern(LoadPrototype { ty: Type::I64 });
        assert_eq!(a, b);
        assert_ne!(a, c);

        let field = Field::new(Type::named("Point"), "x", Type::I32);
        let d = LoadFieldPrototype { field: field.clone() }.intern();
        let e = LoadFieldPrototype { field }.intern();
        assert_eq!(d, e);
    }

    #[test]
    fn instantiate_checks_arity() {
        let proto = CopyPrototype { ty: Type::I32 }.intern();
        let value = ValueTag::new("x");
        let inst = proto.instantiate([value.clone()]);
        assert_eq!(inst.arguments(), &[value]);
        assert_eq!(inst.result_type(), Type::I32);
    }

    #[test]
    #[should_panic(expected = "takes 1 argument(s), but 0 were supplied")]
    fn instantiate_rejects_wrong_arity() {
        CopyPrototype { ty: Type::I32 }.instantiate([]);
    }

    #[test]
    fn display() {
        let proto = ConstantPrototype {
            value: Constant::Int(42),
            ty: Type::I32,
        };
        assert_eq!(proto.intern().to_string(), "const 42: i32");
    }
}
