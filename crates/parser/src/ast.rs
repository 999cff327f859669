use ir::{
    inst::{
        AllocaPrototype, BoxPrototype, CallPrototype, ConstantPrototype, CopyPrototype,
        DynamicCastPrototype, GetFieldPointerPrototype, GetStaticFieldPointerPrototype,
        IndirectCallPrototype, IntrinsicPrototype, LoadFieldPrototype, LoadPrototype,
        MethodLookup, NewObjectPrototype, ReinterpretCastPrototype, StoreFieldPrototype,
        StorePrototype, UnboxPrototype,
    },
    Constant, Field, Method, PointerKind, PrototypeKind, Type,
};
use pest::Parser as _;
use smol_str::SmolStr;

use super::{syntax::Node, Error};
use crate::{
    syntax::{FromSyntax, Parser, Rule, Spanned},
    Span,
};

pub fn parse_body(input: &str) -> Result<Body, Vec<Error>> {
    parse(Rule::body_file, Rule::method_body, input)
}

pub fn parse_graph(input: &str) -> Result<Graph, Vec<Error>> {
    parse(Rule::graph_file, Rule::flow_graph, input)
}

fn parse<T: FromSyntax<Error>>(file: Rule, rule: Rule, input: &str) -> Result<T, Vec<Error>> {
    let pairs = Parser::parse(file, input).map_err(|err| vec![Error::SyntaxError(err)])?;
    let mut node = Node::root(file, input, pairs);
    node.descend();
    let parsed = node.single(rule);

    if node.errors.is_empty() {
        Ok(parsed)
    } else {
        Err(node.errors)
    }
}

#[derive(Debug)]
pub struct Body {
    pub this_parameter: Option<ParamDecl>,
    pub parameters: Vec<ParamDecl>,
    pub return_type: Type,
    pub blocks: Vec<Block>,
}

impl FromSyntax<Error> for Body {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        let mut params: Vec<(bool, ParamDecl)> =
            node.descend_into(Rule::body_params, |n| n.multi(Rule::body_param));
        let this_parameter = match params.first() {
            Some((true, _)) => Some(params.remove(0).1),
            _ => None,
        };

        Body {
            this_parameter,
            parameters: params.into_iter().map(|(_, param)| param).collect(),
            return_type: node.single(Rule::type_name),
            blocks: node.multi(Rule::block),
        }
    }
}

#[derive(Debug)]
pub struct ParamDecl {
    pub name: SmolStr,
    pub ty: Type,
}

/// A body parameter together with whether it is marked `this`.
impl FromSyntax<Error> for (bool, ParamDecl) {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        let is_this = node.eat(Rule::this_marker);
        let name = node.get(Rule::param_name).as_str().trim_start_matches('%');
        let name = if name == "_" { "" } else { name };

        let decl = ParamDecl {
            name: name.into(),
            ty: node.single(Rule::type_name),
        };
        (is_this, decl)
    }
}

#[derive(Debug)]
pub struct Graph {
    pub blocks: Vec<Block>,
}

impl FromSyntax<Error> for Graph {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Graph {
            blocks: node.multi(Rule::block),
        }
    }
}

#[derive(Debug)]
pub struct Block {
    pub name: Spanned<BlockName>,
    pub params: Vec<ValueDeclaration>,
    pub stmts: Vec<Stmt>,
    pub flow: Flow,
}

impl FromSyntax<Error> for Block {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Block {
            name: node.single(Rule::block_name),
            params: node
                .descend_into_opt(Rule::block_params, |n| n.multi(Rule::value_declaration))
                .unwrap_or_default(),
            stmts: node.multi(Rule::statement),
            flow: node.single(Rule::flow),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockName(pub SmolStr);

impl FromSyntax<Error> for BlockName {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        BlockName(node.txt.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueName(pub SmolStr);

impl FromSyntax<Error> for ValueName {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        ValueName(node.txt.into())
    }
}

#[derive(Debug)]
pub struct ValueDeclaration {
    pub name: Spanned<ValueName>,
    pub ty: Type,
}

impl FromSyntax<Error> for ValueDeclaration {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        ValueDeclaration {
            name: node.single(Rule::value_name),
            ty: node.single(Rule::type_name),
        }
    }
}

#[derive(Debug)]
pub struct Stmt {
    pub dest: Spanned<ValueName>,
    pub inst: Spanned<Inst>,
}

impl FromSyntax<Error> for Stmt {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Stmt {
            dest: node.single(Rule::value_name),
            inst: node.single(Rule::instruction),
        }
    }
}

#[derive(Debug)]
pub struct Inst {
    pub prototype: PrototypeKind,
    pub args: Vec<Spanned<ValueName>>,
}

impl FromSyntax<Error> for Inst {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Inst {
            prototype: node.single(Rule::prototype),
            args: node
                .descend_into_opt(Rule::arguments, |n| n.multi(Rule::value_name))
                .unwrap_or_default(),
        }
    }
}

impl FromSyntax<Error> for PrototypeKind {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        node.descend();
        match node.rule {
            Rule::const_proto => ConstantPrototype {
                value: node.single(Rule::constant),
                ty: node.single(Rule::type_name),
            }
            .into(),
            Rule::copy_proto => CopyPrototype {
                ty: node.single(Rule::type_name),
            }
            .into(),
            Rule::alloca_proto => AllocaPrototype {
                element: node.single(Rule::type_name),
            }
            .into(),
            Rule::load_proto => LoadPrototype {
                ty: node.single(Rule::type_name),
            }
            .into(),
            Rule::store_proto => StorePrototype {
                ty: node.single(Rule::type_name),
            }
            .into(),
            Rule::get_field_pointer_proto => GetFieldPointerPrototype {
                field: node.single(Rule::field),
            }
            .into(),
            Rule::get_static_field_pointer_proto => GetStaticFieldPointerPrototype {
                field: node.single(Rule::field),
            }
            .into(),
            Rule::call_proto => {
                let lookup = match node.get(Rule::method_lookup).as_str() {
                    "virtual" => MethodLookup::Virtual,
                    _ => MethodLookup::Direct,
                };
                CallPrototype {
                    callee: node.single(Rule::method),
                    lookup,
                }
                .into()
            }
            Rule::new_object_proto => NewObjectPrototype {
                constructor: node.single(Rule::method),
            }
            .into(),
            Rule::indirect_call_proto => IndirectCallPrototype {
                parameter_types: node
                    .descend_into(Rule::type_list, |n| n.multi::<Type>(Rule::type_name))
                    .into_iter()
                    .collect(),
                return_type: node.single(Rule::type_name),
            }
            .into(),
            Rule::reinterpret_cast_proto => ReinterpretCastPrototype {
                target: node.single(Rule::type_name),
            }
            .into(),
            Rule::dynamic_cast_proto => DynamicCastPrototype {
                target: node.single(Rule::type_name),
            }
            .into(),
            Rule::box_proto => BoxPrototype {
                element: node.single(Rule::type_name),
            }
            .into(),
            Rule::unbox_proto => UnboxPrototype {
                element: node.single(Rule::type_name),
            }
            .into(),
            Rule::intrinsic_proto => {
                let name: StringLiteral = node.single(Rule::string_literal);
                let parameter_types: Vec<Type> =
                    node.descend_into(Rule::type_list, |n| n.multi(Rule::type_name));
                IntrinsicPrototype::new(name.0, node.single(Rule::type_name), parameter_types)
                    .into()
            }
            Rule::load_field_proto => LoadFieldPrototype {
                field: node.single(Rule::field),
            }
            .into(),
            Rule::store_field_proto => StoreFieldPrototype {
                field: node.single(Rule::field),
            }
            .into(),
            rule => unreachable!("{rule:?} is not a prototype"),
        }
    }
}

impl FromSyntax<Error> for Type {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        node.descend();
        match node.rule {
            Rule::primitive_type => match node.txt {
                "void" => Type::Void,
                "bool" => Type::Bool,
                "char" => Type::Char,
                "i8" => Type::I8,
                "i16" => Type::I16,
                "i32" => Type::I32,
                "i64" => Type::I64,
                "u8" => Type::U8,
                "u16" => Type::U16,
                "u32" => Type::U32,
                "u64" => Type::U64,
                "f32" => Type::Float32,
                "f64" => Type::Float64,
                txt => unreachable!("unknown primitive type {txt}"),
            },
            Rule::named_type => match node.single_opt::<StringLiteral>(Rule::string_literal) {
                Some(StringLiteral(name)) => Type::Named(name),
                None => Type::named(node.get(Rule::type_ident).as_str()),
            },
            Rule::pointer_type => {
                let kind = match node.get(Rule::pointer_kind).as_str() {
                    "ptr" => PointerKind::Transient,
                    "box" => PointerKind::Box,
                    _ => PointerKind::Reference,
                };
                node.single::<Type>(Rule::type_name).make_pointer(kind)
            }
            rule => unreachable!("{rule:?} is not a type"),
        }
    }
}

impl FromSyntax<Error> for Field {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        let is_static = node.eat(Rule::static_marker);
        let parent = node.single(Rule::type_name);
        let name = node.get(Rule::member_name).as_str();
        let field_type = node.single(Rule::type_name);

        if is_static {
            Field::new_static(parent, name, field_type)
        } else {
            Field::new(parent, name, field_type)
        }
    }
}

impl FromSyntax<Error> for Method {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        let is_static = node.eat(Rule::static_marker);
        let parent = node.single(Rule::type_name);
        let name = node.get(Rule::member_name).as_str();
        let parameter_types: Vec<Type> =
            node.descend_into(Rule::type_list, |n| n.multi(Rule::type_name));
        let return_type = node.single(Rule::type_name);

        Method::new(parent, name, is_static, return_type, parameter_types)
    }
}

impl FromSyntax<Error> for Constant {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        node.descend();
        match node.rule {
            Rule::null_lit => Constant::Null,
            Rule::default_lit => Constant::Default,
            Rule::bool_lit => Constant::Bool(node.txt == "true"),
            Rule::int_lit => match node.txt.parse() {
                Ok(value) => Constant::Int(value),
                Err(_) => {
                    node.error(Error::NumberOutOfBounds(node.span));
                    Constant::Default
                }
            },
            Rule::float_lit => {
                let value = node.get(Rule::float_value).as_str();
                let parsed = match node.get(Rule::float_suffix).as_str() {
                    "f32" => value.parse().map(Constant::float32),
                    _ => value.parse().map(Constant::float64),
                };
                parsed.unwrap_or_else(|_| {
                    node.error(Error::NumberOutOfBounds(node.span));
                    Constant::Default
                })
            }
            Rule::string_literal => Constant::String(
                node.single::<StringLiteral>(Rule::string_body).0,
            ),
            rule => unreachable!("{rule:?} is not a constant"),
        }
    }
}

/// The decoded contents of a quoted string.
#[derive(Debug)]
pub struct StringLiteral(pub SmolStr);

impl FromSyntax<Error> for StringLiteral {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        if node.rule == Rule::string_literal {
            return node.single(Rule::string_body);
        }
        match unescape(node.txt) {
            Some(s) => StringLiteral(s.into()),
            None => {
                node.error(Error::InvalidEscape(node.span));
                StringLiteral(SmolStr::default())
            }
        }
    }
}

/// Undoes the escaping applied by `str`'s `Debug` implementation.
fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let unescaped = match chars.next()? {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            '0' => '\0',
            '\\' => '\\',
            '\'' => '\'',
            '"' => '"',
            'u' => {
                let rest = chars.as_str().strip_prefix('{')?;
                let (hex, tail) = rest.split_once('}')?;
                let c = u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)?;
                chars = tail.chars();
                c
            }
            _ => return None,
        };
        out.push(unescaped);
    }
    Some(out)
}

#[derive(Debug)]
pub enum Flow {
    Unreachable,
    Jump(Branch),
    Return(Spanned<ValueName>),
    Switch {
        value: Spanned<ValueName>,
        cases: Vec<SwitchCase>,
        default: Branch,
    },
    Try {
        inst: Spanned<Inst>,
        success: Branch,
        exception: Branch,
    },
}

impl FromSyntax<Error> for Flow {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        node.descend();
        match node.rule {
            Rule::unreachable_flow => Flow::Unreachable,
            Rule::jump_flow => Flow::Jump(node.single(Rule::branch)),
            Rule::return_flow => Flow::Return(node.single(Rule::value_name)),
            Rule::switch_flow => Flow::Switch {
                value: node.single(Rule::value_name),
                cases: node.multi(Rule::switch_case),
                default: node.descend_into(Rule::default_case, |n| n.single(Rule::branch)),
            },
            Rule::try_flow => Flow::Try {
                inst: node.single(Rule::instruction),
                success: node.single(Rule::branch),
                exception: node.single(Rule::branch),
            },
            rule => unreachable!("{rule:?} is not a flow"),
        }
    }
}

#[derive(Debug)]
pub struct SwitchCase {
    pub values: Vec<Constant>,
    pub branch: Branch,
}

impl FromSyntax<Error> for SwitchCase {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        SwitchCase {
            values: node.multi(Rule::constant),
            branch: node.single(Rule::branch),
        }
    }
}

#[derive(Debug)]
pub struct Branch {
    pub target: Spanned<BlockName>,
    pub args: Vec<BranchArg>,
}

impl FromSyntax<Error> for Branch {
    fn from_syntax(node: &mut Node<Error>) -> Self {
        Branch {
            target: node.single(Rule::block_name),
            args: node
                .descend_into_opt(Rule::branch_args, BranchArg::read_all)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug)]
pub enum BranchArg {
    Value(Spanned<ValueName>),
    TryResult(Span),
    TryException(Span),
}

impl BranchArg {
    /// Reads every argument of a `branch_args` node, in order.
    fn read_all(node: &mut Node<Error>) -> Vec<Self> {
        let mut args = vec![];
        while let Some(rule) = node.peek_rule() {
            let arg = match rule {
                Rule::try_result => BranchArg::TryResult(marker_span(node.get(rule))),
                Rule::try_exception => BranchArg::TryException(marker_span(node.get(rule))),
                _ => BranchArg::Value(node.single(Rule::value_name)),
            };
            args.push(arg);
        }
        args
    }
}

fn marker_span(pair: pest::iterators::Pair<'_, Rule>) -> Span {
    let span = pair.as_span();
    Span::from_range(span.start()..span.end())
}
