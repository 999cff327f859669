use std::fs;

use ember_parser::{parse_flow_graph, parse_method_body};
use ir::{
    ir_writer::{BodyWriter, GraphWriter},
    BlockFlow, BlockParameter, Branch, Constant, FlowGraph, FlowGraphBuilder, Instruction,
    SwitchCase, Type,
};

fn write(graph: &FlowGraph) -> String {
    GraphWriter::new(graph).dump_string()
}

/// An `i32` switch with a multi-value case and a block argument.
fn switch_graph() -> FlowGraph {
    let builder = FlowGraphBuilder::new();
    let entry = builder.entry_point();
    let key = entry.append_parameter(BlockParameter::new(Type::I32, "key"));
    let small = builder.add_basic_block("small");
    let large = builder.add_basic_block("large");
    let value = large.append_parameter(BlockParameter::new(Type::I32, "value"));
    large.set_flow(BlockFlow::Return(value));

    let one = small.append_instruction(Instruction::constant(Constant::Int(1), Type::I32), "one");
    small.set_flow(BlockFlow::jump(large.tag().clone(), [one.tag().clone()]));
    entry.set_flow(BlockFlow::switch(
        key.clone(),
        vec![SwitchCase::new(
            [Constant::Int(0), Constant::Int(1)],
            Branch::new(small.tag().clone(), []),
        )],
        Branch::with_values(large.tag().clone(), [key]),
    ));
    builder.to_immutable()
}

#[test]
fn switch_round_trips() {
    let graph = switch_graph();
    let text = write(&graph);
    let parsed = parse_flow_graph(&text).unwrap();
    assert_eq!(write(&parsed), text);

    assert_eq!(parsed.block_count(), graph.block_count());
    let BlockFlow::Switch(switch) = parsed.entry_point().flow() else {
        panic!("expected a switch:\n{text}");
    };
    assert_eq!(switch.cases.len(), 1);
    assert_eq!(switch.cases[0].values.len(), 2);
    assert_eq!(switch.default_branch.arguments.len(), 1);
    assert_eq!(parsed.get_value_type(&switch.value), Type::I32);
}

#[test]
fn parsed_tags_are_fresh() {
    let graph = switch_graph();
    let parsed = parse_flow_graph(&write(&graph)).unwrap();
    for tag in parsed.value_tags() {
        assert!(!graph.contains_value(tag));
    }
}

#[test]
fn quoted_type_names_round_trip() {
    let list = Type::named("System.List<T>");
    let builder = FlowGraphBuilder::new();
    let entry = builder.entry_point();
    let items = entry.append_parameter(BlockParameter::new(list.clone(), "items"));
    entry.set_flow(BlockFlow::Return(items));

    let text = write(&builder.to_immutable());
    let parsed = parse_flow_graph(&text).unwrap();
    assert_eq!(write(&parsed), text);
    let param = parsed.entry_point().parameters().next().unwrap().clone();
    assert_eq!(param.ty, list);
}

#[test]
fn fixtures_round_trip() {
    let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/test_files/syntax");
    for (subdir, is_body) in [("bodies", true), ("graphs", false)] {
        for entry in fs::read_dir(format!("{dir}/{subdir}")).unwrap() {
            let path = entry.unwrap().path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("ebr") {
                continue;
            }
            let content = fs::read_to_string(&path).unwrap();
            let once = if is_body {
                BodyWriter::new(&parse_method_body(&content).unwrap()).dump_string()
            } else {
                write(&parse_flow_graph(&content).unwrap())
            };
            let twice = if is_body {
                BodyWriter::new(&parse_method_body(&once).unwrap()).dump_string()
            } else {
                write(&parse_flow_graph(&once).unwrap())
            };
            assert_eq!(once, twice, "{}", path.display());
        }
    }
}
