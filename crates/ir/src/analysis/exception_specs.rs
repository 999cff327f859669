//! Which instructions may throw.
//!
//! Specifications are assigned per prototype by a rule table, then reified
//! per instruction: a null-check specification collapses to "never throws"
//! when the checked argument is known to be non-null.
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::{nullability::ValueNullability, FlowGraphAnalysis};
use crate::{
    graph::FlowGraph,
    inst::{Instruction, InstructionPrototype, MethodLookup, PrototypeKind},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionSpecification {
    NoThrow,
    ThrowAny,
    /// Throws if argument `parameter` is null, and otherwise behaves as `inner`.
    NullCheck {
        parameter: usize,
        inner: Box<ExceptionSpecification>,
    },
}

impl ExceptionSpecification {
    pub fn null_check(parameter: usize, inner: ExceptionSpecification) -> Self {
        Self::NullCheck {
            parameter,
            inner: Box::new(inner),
        }
    }

    pub fn can_throw(&self) -> bool {
        !matches!(self, Self::NoThrow)
    }
}

type SpecRule = Arc<dyn Fn(&InstructionPrototype) -> ExceptionSpecification + Send + Sync>;

/// A rule table from prototype kinds and intrinsic names to specifications.
///
/// Intrinsic rules match the full intrinsic name first, then its namespace.
/// Anything without a rule may throw anything.
#[derive(Clone)]
pub struct PrototypeExceptionSpecs {
    default_spec: ExceptionSpecification,
    kind_rules: FxHashMap<&'static str, SpecRule>,
    intrinsic_rules: FxHashMap<SmolStr, SpecRule>,
}

impl PrototypeExceptionSpecs {
    /// An empty table where every prototype may throw.
    pub fn empty() -> Self {
        Self {
            default_spec: ExceptionSpecification::ThrowAny,
            kind_rules: FxHashMap::default(),
            intrinsic_rules: FxHashMap::default(),
        }
    }

    /// Registers a rule for all prototypes whose mnemonic is `kind`, e.g. `"load"`.
    pub fn register_kind(
        &mut self,
        kind: &'static str,
        rule: impl Fn(&InstructionPrototype) -> ExceptionSpecification + Send + Sync + 'static,
    ) {
        self.kind_rules.insert(kind, Arc::new(rule));
    }

    pub fn register_kind_spec(&mut self, kind: &'static str, spec: ExceptionSpecification) {
        self.register_kind(kind, move |_| spec.clone());
    }

    /// Registers a rule for an intrinsic name or a whole namespace, e.g.
    /// `"arith.div"` or `"arith"`.
    pub fn register_intrinsic(&mut self, name: impl Into<SmolStr>, spec: ExceptionSpecification) {
        self.intrinsic_rules
            .insert(name.into(), Arc::new(move |_| spec.clone()));
    }

    pub fn get_exception_specification(
        &self,
        prototype: &InstructionPrototype,
    ) -> ExceptionSpecification {
        let kind = prototype.kind();
        if let PrototypeKind::Intrinsic(intrinsic) = kind {
            let rule = self.intrinsic_rules.get(&intrinsic.name).or_else(|| {
                intrinsic
                    .namespace()
                    .and_then(|ns| self.intrinsic_rules.get(ns))
            });
            if let Some(rule) = rule {
                return rule(prototype);
            }
        }

        match self.kind_rules.get(kind.as_text()) {
            Some(rule) => rule(prototype),
            None => self.default_spec.clone(),
        }
    }
}

impl Default for PrototypeExceptionSpecs {
    fn default() -> Self {
        use ExceptionSpecification::*;

        let mut specs = Self::empty();
        for kind in [
            "alloca",
            "box",
            "const",
            "copy",
            "dynamic_cast",
            "get_static_field_pointer",
            "load",
            "reinterpret_cast",
            "store",
        ] {
            specs.register_kind_spec(kind, NoThrow);
        }

        for kind in ["get_field_pointer", "unbox", "load_field", "store_field"] {
            specs.register_kind_spec(kind, ExceptionSpecification::null_check(0, ThrowAny));
        }

        specs.register_kind("call", |proto| match proto.kind() {
            PrototypeKind::Call(call) if call.lookup == MethodLookup::Virtual => {
                ExceptionSpecification::null_check(0, ThrowAny)
            }
            _ => ThrowAny,
        });
        specs.register_kind_spec("new_object", ThrowAny);
        specs.register_kind_spec("indirect_call", ThrowAny);

        specs.register_intrinsic("arith", NoThrow);
        specs.register_intrinsic("arith.div", ThrowAny);
        specs.register_intrinsic("arith.rem", ThrowAny);
        specs.register_intrinsic("exception", ThrowAny);
        specs
    }
}

/// Reified specifications for every instruction of one graph.
#[derive(Debug, Clone, Default)]
pub struct InstructionExceptionSpecs {
    specs: FxHashMap<Instruction, ExceptionSpecification>,
}

impl InstructionExceptionSpecs {
    /// Instructions the analysis has not seen are assumed to throw.
    pub fn get_exception_specification(&self, instruction: &Instruction) -> ExceptionSpecification {
        self.specs
            .get(instruction)
            .cloned()
            .unwrap_or(ExceptionSpecification::ThrowAny)
    }

    pub fn can_throw(&self, instruction: &Instruction) -> bool {
        self.get_exception_specification(instruction).can_throw()
    }
}

pub struct ReifiedInstructionExceptionAnalysis;

impl ReifiedInstructionExceptionAnalysis {
    fn reify(
        spec: ExceptionSpecification,
        instruction: &Instruction,
        nullability: &ValueNullability,
    ) -> ExceptionSpecification {
        match spec {
            ExceptionSpecification::NullCheck { parameter, inner } => {
                if nullability.is_non_null(instruction.argument(parameter)) {
                    return ExceptionSpecification::NoThrow;
                }
                let inner = Self::reify(*inner, instruction, nullability);
                if inner.can_throw() {
                    ExceptionSpecification::null_check(parameter, inner)
                } else {
                    ExceptionSpecification::NoThrow
                }
            }
            other => other,
        }
    }
}

impl FlowGraphAnalysis for ReifiedInstructionExceptionAnalysis {
    type Output = InstructionExceptionSpecs;

    fn analyze(&self, graph: &FlowGraph) -> InstructionExceptionSpecs {
        let proto_specs = graph
            .try_get_analysis_result::<PrototypeExceptionSpecs>()
            .unwrap_or_else(|| Arc::new(PrototypeExceptionSpecs::default()));
        let nullability = graph.get_analysis_result::<ValueNullability>();

        let mut specs = FxHashMap::default();
        for block in graph.basic_blocks() {
            let named = block.named_instructions().map(|inst| inst.instruction());
            for instruction in named.chain(block.flow().instructions()) {
                if specs.contains_key(instruction) {
                    continue;
                }
                let spec = proto_specs.get_exception_specification(instruction.prototype());
                specs.insert(
                    instruction.clone(),
                    Self::reify(spec, instruction, &nullability),
                );
            }
        }

        InstructionExceptionSpecs { specs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        graph::BlockParameter,
        inst::IntrinsicPrototype,
        types::{Field, PointerKind, Type},
        Prototype,
    };

    #[test]
    fn prototype_rules() {
        let specs = PrototypeExceptionSpecs::default();
        let add = IntrinsicPrototype::new("arith.add", Type::I32, [Type::I32, Type::I32]).intern();
        let div = IntrinsicPrototype::new("arith.div", Type::I32, [Type::I32, Type::I32]).intern();
        let custom = IntrinsicPrototype::new("my.op", Type::Void, []).intern();

        assert_eq!(specs.get_exception_specification(&add), ExceptionSpecification::NoThrow);
        assert!(specs.get_exception_specification(&div).can_throw());
        assert!(specs.get_exception_specification(&custom).can_throw());
    }

    #[test]
    fn null_checks_are_reified() {
        let point = Type::named("Point");
        let field = Field::new(point.clone(), "x", Type::I32);

        let graph = FlowGraph::new();
        let entry = graph.entry_point_tag().clone();
        let by_ref = BlockParameter::new(point.make_pointer(PointerKind::Reference), "by_ref");
        let by_box = BlockParameter::new(point.make_pointer(PointerKind::Box), "by_box");
        let graph = graph
            .append_parameter(&entry, by_ref.clone())
            .append_parameter(&entry, by_box.clone());

        let safe = Instruction::load_field(field.clone(), by_ref.tag);
        let unsafe_ = Instruction::load_field(field, by_box.tag);
        let (graph, _) = graph.append_instruction(&entry, safe.clone(), "safe");
        let (graph, _) = graph.append_instruction(&entry, unsafe_.clone(), "unsafe");

        let specs = graph.get_analysis_result::<InstructionExceptionSpecs>();
        assert!(!specs.can_throw(&safe));
        assert!(specs.can_throw(&unsafe_));
    }
}
