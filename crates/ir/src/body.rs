use std::fmt;

use smol_str::SmolStr;

use crate::{
    graph::FlowGraph,
    ir_writer::BodyWriter,
    types::{MemberMapping, Type},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub ty: Type,
    pub name: SmolStr,
}

impl Parameter {
    pub fn new(ty: Type, name: impl Into<SmolStr>) -> Self {
        Self {
            ty,
            name: name.into(),
        }
    }

    /// An unnamed parameter, used for return values.
    pub fn anonymous(ty: Type) -> Self {
        Self::new(ty, "")
    }

    pub fn map(&self, mapping: &dyn MemberMapping) -> Self {
        Self::new(mapping.map_type(&self.ty), self.name.clone())
    }
}

/// A method's implementation together with its signature.
#[derive(Clone)]
pub struct MethodBody {
    pub return_parameter: Parameter,
    pub this_parameter: Option<Parameter>,
    pub parameters: Vec<Parameter>,
    implementation: FlowGraph,
}

impl MethodBody {
    pub fn new(
        return_parameter: Parameter,
        this_parameter: Option<Parameter>,
        parameters: Vec<Parameter>,
        implementation: FlowGraph,
    ) -> Self {
        Self {
            return_parameter,
            this_parameter,
            parameters,
            implementation,
        }
    }

    pub fn implementation(&self) -> &FlowGraph {
        &self.implementation
    }

    pub fn with_implementation(&self, implementation: FlowGraph) -> Self {
        Self {
            implementation,
            ..self.clone()
        }
    }

    /// `this` (if any) followed by the declared parameters.
    pub fn all_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.this_parameter.iter().chain(&self.parameters)
    }

    /// Passes the signature and every member reference of the implementation
    /// through `mapping`.
    pub fn map(&self, mapping: &dyn MemberMapping) -> Self {
        Self {
            return_parameter: self.return_parameter.map(mapping),
            this_parameter: self.this_parameter.as_ref().map(|param| param.map(mapping)),
            parameters: self.parameters.iter().map(|param| param.map(mapping)).collect(),
            implementation: self.implementation.map_members(mapping),
        }
    }
}

impl fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&BodyWriter::new(self).dump_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        flow::BlockFlow,
        graph::BlockParameter,
        inst::Instruction,
        types::{Field, PointerKind, TypeMapping},
    };

    #[test]
    fn map_rewrites_signature_and_graph() {
        let old = Type::named("Old");
        let field = Field::new(old.clone(), "value", Type::I32);

        let graph = FlowGraph::new();
        let entry = graph.entry_point_tag().clone();
        let this = BlockParameter::new(old.make_pointer(PointerKind::Box), "this");
        let graph = graph.append_parameter(&entry, this.clone());
        let (graph, value) = graph.append_instruction(
            &entry,
            Instruction::load_field(field, this.tag),
            "value",
        );
        let graph = graph.update_block_flow(&entry, BlockFlow::Return(value.clone()));

        let body = MethodBody::new(
            Parameter::anonymous(Type::I32),
            Some(Parameter::new(old.make_pointer(PointerKind::Box), "this")),
            vec![],
            graph,
        );
        let renamed = body.map(&TypeMapping(|ty: &Type| match ty {
            Type::Named(name) if name == "Old" => Type::named("New"),
            other => other.clone(),
        }));

        let this_ty = &renamed.this_parameter.as_ref().unwrap().ty;
        assert_eq!(this_ty, &Type::named("New").make_pointer(PointerKind::Box));
        let param = renamed.implementation().entry_point().parameters().next().unwrap();
        assert_eq!(&param.ty, this_ty);
        assert_eq!(
            renamed.implementation().get_instruction(&value).instruction().prototype().to_string(),
            "load_field @New.value: i32"
        );
    }
}
