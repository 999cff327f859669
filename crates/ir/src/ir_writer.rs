//! The textual form of flow graphs and method bodies.
//!
//! Tags carry no stable textual identity, so the writer numbers blocks and
//! values afresh: the entry block first, the remaining blocks in creation
//! order, and within each block its parameters before its instructions.
use std::io;

use cranelift_entity::{entity_impl, EntityRef};
use rustc_hash::FxHashMap;

use crate::{
    body::{MethodBody, Parameter},
    flow::{BlockFlow, Branch, BranchArgument},
    graph::{BasicBlock, FlowGraph},
    inst::Instruction,
    tag::{BasicBlockTag, ValueTag},
};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef(u32);
entity_impl!(BlockRef, "block");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueRef(u32);
entity_impl!(ValueRef, "v");

pub trait IrWrite<Ctx: ?Sized> {
    fn write<W: io::Write + ?Sized>(&self, w: &mut W, ctx: &Ctx) -> io::Result<()>;

    fn dump_string(&self, ctx: &Ctx) -> String {
        let mut buf = Vec::new();
        // Writing into a `Vec` cannot fail.
        let _ = self.write(&mut buf, ctx);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// The names the writer gives to every block and value of one graph.
pub struct Names {
    blocks: FxHashMap<BasicBlockTag, BlockRef>,
    values: FxHashMap<ValueTag, ValueRef>,
}

impl Names {
    pub fn new(graph: &FlowGraph) -> Self {
        let mut blocks = FxHashMap::default();
        let mut values = FxHashMap::default();
        for block in block_order(graph) {
            blocks.insert(block.tag().clone(), BlockRef::new(blocks.len()));
            let params = block.parameters().map(|param| &param.tag);
            for tag in params.chain(block.instruction_tags()) {
                values.insert(tag.clone(), ValueRef::new(values.len()));
            }
        }
        Self { blocks, values }
    }

    pub fn block(&self, tag: &BasicBlockTag) -> Option<BlockRef> {
        self.blocks.get(tag).copied()
    }

    pub fn value(&self, tag: &ValueTag) -> Option<ValueRef> {
        self.values.get(tag).copied()
    }
}

/// Entry block first, then the rest in creation order.
pub fn block_order(graph: &FlowGraph) -> impl Iterator<Item = BasicBlock<'_>> {
    let entry = graph.entry_point_tag();
    std::iter::once(graph.entry_point())
        .chain(graph.basic_blocks().filter(move |block| block.tag() != entry))
}

impl IrWrite<Names> for ValueTag {
    fn write<W: io::Write + ?Sized>(&self, w: &mut W, names: &Names) -> io::Result<()> {
        match names.value(self) {
            Some(value) => write!(w, "{value}"),
            // Dangling references stay visible in dumps but never parse.
            None => write!(w, "<undefined {self:?}>"),
        }
    }
}

impl IrWrite<Names> for BasicBlockTag {
    fn write<W: io::Write + ?Sized>(&self, w: &mut W, names: &Names) -> io::Result<()> {
        match names.block(self) {
            Some(block) => write!(w, "{block}"),
            None => write!(w, "<undefined {self:?}>"),
        }
    }
}

impl IrWrite<Names> for BranchArgument {
    fn write<W: io::Write + ?Sized>(&self, w: &mut W, names: &Names) -> io::Result<()> {
        match self {
            Self::Value(value) => value.write(w, names),
            Self::TryResult => write!(w, "#result"),
            Self::TryException => write!(w, "#exception"),
        }
    }
}

impl IrWrite<Names> for Branch {
    fn write<W: io::Write + ?Sized>(&self, w: &mut W, names: &Names) -> io::Result<()> {
        self.target.write(w, names)?;
        if !self.arguments.is_empty() {
            write!(w, "(")?;
            write_iter_with_delim(w, self.arguments.iter(), ", ", names)?;
            write!(w, ")")?;
        }
        Ok(())
    }
}

impl IrWrite<Names> for Instruction {
    fn write<W: io::Write + ?Sized>(&self, w: &mut W, names: &Names) -> io::Result<()> {
        write!(w, "{}", self.prototype())?;
        if !self.arguments().is_empty() {
            write!(w, " (")?;
            write_iter_with_delim(w, self.arguments().iter(), ", ", names)?;
            write!(w, ")")?;
        }
        Ok(())
    }
}

impl IrWrite<Names> for Parameter {
    fn write<W: io::Write + ?Sized>(&self, w: &mut W, _: &Names) -> io::Result<()> {
        let name = if self.name.is_empty() { "_" } else { self.name.as_str() };
        write!(w, "%{name}: {}", self.ty)
    }
}

pub fn write_iter_with_delim<'i, W, T, Ctx>(
    w: &mut W,
    iter: impl Iterator<Item = &'i T>,
    delim: &str,
    ctx: &Ctx,
) -> io::Result<()>
where
    W: io::Write + ?Sized,
    T: IrWrite<Ctx> + 'i,
    Ctx: ?Sized,
{
    let mut iter = iter.peekable();
    while let Some(item) = iter.next() {
        item.write(w, ctx)?;
        if iter.peek().is_some() {
            w.write_all(delim.as_bytes())?;
        }
    }
    Ok(())
}

pub struct GraphWriter<'a> {
    graph: &'a FlowGraph,
    names: Names,
    level: u8,
}

impl<'a> GraphWriter<'a> {
    pub fn new(graph: &'a FlowGraph) -> Self {
        Self {
            graph,
            names: Names::new(graph),
            level: 0,
        }
    }

    pub fn names(&self) -> &Names {
        &self.names
    }

    pub fn write(&mut self, w: &mut impl io::Write) -> io::Result<()> {
        writeln!(w, "graph {{")?;
        self.write_blocks(w)?;
        writeln!(w, "}}")
    }

    pub fn dump_string(&mut self) -> String {
        let mut buf = Vec::new();
        // Writing into a `Vec` cannot fail.
        let _ = self.write(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn write_blocks(&mut self, w: &mut impl io::Write) -> io::Result<()> {
        let graph = self.graph;
        self.level += 1;
        for (i, block) in block_order(graph).enumerate() {
            if i > 0 {
                self.newline(w)?;
            }
            self.write_block(block, w)?;
        }
        self.level -= 1;
        Ok(())
    }

    fn write_block(&mut self, block: BasicBlock<'_>, w: &mut impl io::Write) -> io::Result<()> {
        self.indent(w)?;
        block.tag().write(w, &self.names)?;
        if block.parameter_count() > 0 {
            write!(w, "(")?;
            let mut delim = "";
            for param in block.parameters() {
                write!(w, "{delim}")?;
                param.tag.write(w, &self.names)?;
                write!(w, ": {}", param.ty)?;
                delim = ", ";
            }
            write!(w, ")")?;
        }
        writeln!(w, ":")?;

        self.level += 1;
        for inst in block.named_instructions() {
            self.indent(w)?;
            inst.tag().write(w, &self.names)?;
            write!(w, " = ")?;
            inst.instruction().write(w, &self.names)?;
            writeln!(w, ";")?;
        }
        self.write_flow(block.flow(), w)?;
        self.level -= 1;
        Ok(())
    }

    fn write_flow(&mut self, flow: &BlockFlow, w: &mut impl io::Write) -> io::Result<()> {
        self.indent(w)?;
        match flow {
            BlockFlow::Unreachable => writeln!(w, "unreachable;"),
            BlockFlow::Jump(branch) => {
                write!(w, "jump ")?;
                branch.write(w, &self.names)?;
                writeln!(w, ";")
            }
            BlockFlow::Return(value) => {
                write!(w, "return ")?;
                value.write(w, &self.names)?;
                writeln!(w, ";")
            }
            BlockFlow::Switch(switch) => {
                write!(w, "switch ")?;
                switch.value.write(w, &self.names)?;
                writeln!(w, " {{")?;

                self.level += 1;
                for case in &switch.cases {
                    self.indent(w)?;
                    let mut delim = "";
                    for value in &case.values {
                        write!(w, "{delim}{value}")?;
                        delim = ", ";
                    }
                    write!(w, " => ")?;
                    case.branch.write(w, &self.names)?;
                    writeln!(w, ";")?;
                }
                self.indent(w)?;
                write!(w, "default => ")?;
                switch.default_branch.write(w, &self.names)?;
                writeln!(w, ";")?;
                self.level -= 1;

                self.indent(w)?;
                writeln!(w, "}}")
            }
            BlockFlow::Try(try_flow) => {
                write!(w, "try ")?;
                try_flow.instruction.write(w, &self.names)?;
                write!(w, " success ")?;
                try_flow.success_branch.write(w, &self.names)?;
                write!(w, " exception ")?;
                try_flow.exception_branch.write(w, &self.names)?;
                writeln!(w, ";")
            }
        }
    }

    fn indent(&self, w: &mut impl io::Write) -> io::Result<()> {
        w.write_all(" ".repeat(self.level as usize * 4).as_bytes())
    }

    fn newline(&self, w: &mut impl io::Write) -> io::Result<()> {
        w.write_all(b"\n")
    }
}

pub struct BodyWriter<'a> {
    body: &'a MethodBody,
    graph_writer: GraphWriter<'a>,
}

impl<'a> BodyWriter<'a> {
    pub fn new(body: &'a MethodBody) -> Self {
        Self {
            body,
            graph_writer: GraphWriter::new(body.implementation()),
        }
    }

    pub fn write(&mut self, w: &mut impl io::Write) -> io::Result<()> {
        let names = &self.graph_writer.names;
        write!(w, "body(")?;
        let mut delim = "";
        if let Some(this) = &self.body.this_parameter {
            write!(w, "this ")?;
            this.write(w, names)?;
            delim = ", ";
        }
        for param in &self.body.parameters {
            write!(w, "{delim}")?;
            param.write(w, names)?;
            delim = ", ";
        }
        writeln!(w, ") -> {} {{", self.body.return_parameter.ty)?;

        self.graph_writer.write_blocks(w)?;
        writeln!(w, "}}")
    }

    pub fn dump_string(&mut self) -> String {
        let mut buf = Vec::new();
        // Writing into a `Vec` cannot fail.
        let _ = self.write(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}
