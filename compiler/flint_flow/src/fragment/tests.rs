#![allow(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]

use pretty_assertions::assert_eq;

use flint_ir::{ConstantPool, TokenPos};

use super::*;
use crate::ir::Op;

fn constant(graph: &mut GraphBuilder) -> (Fragment, InstrId) {
    graph.emit(Instr {
        op: Op::Constant(ConstantPool::NULL),
        pos: TokenPos::NO_SOURCE,
        inferred: None,
    })
}

/// An open fragment of one instruction and a closed one returning it.
fn open_and_closed(graph: &mut GraphBuilder) -> (Fragment, Fragment) {
    let (open, _) = constant(graph);
    let (closed, value) = constant(graph);
    let closed = graph.ret(closed, value).unwrap();
    (open, closed)
}

#[test]
fn appending_to_a_closed_fragment_fails() {
    let mut graph = GraphBuilder::new();
    let (open, closed) = open_and_closed(&mut graph);
    assert_eq!(graph.append(closed, open), Err(FragmentError::AppendToClosed));
    assert_eq!(
        graph.append(closed, Fragment::EMPTY),
        Err(FragmentError::AppendToClosed)
    );
}

#[test]
fn block_entries_cannot_be_fallen_into() {
    let mut graph = GraphBuilder::new();
    let (open, _) = constant(&mut graph);
    let target = graph.target();
    assert_eq!(
        graph.append(open, Fragment::at(target)),
        Err(FragmentError::AppendBlockEntry(target))
    );
}

#[test]
fn composition_is_as_open_as_its_second_fragment() {
    let mut graph = GraphBuilder::new();

    let (a, _) = constant(&mut graph);
    let (b, _) = constant(&mut graph);
    assert!(graph.append(a, b).unwrap().is_open());

    let (a, closed) = open_and_closed(&mut graph);
    assert!(graph.append(a, closed).unwrap().is_closed());

    let (_, closed) = open_and_closed(&mut graph);
    assert_eq!(graph.append(Fragment::EMPTY, closed).unwrap(), closed);

    let (a, _) = constant(&mut graph);
    assert_eq!(graph.append(a, Fragment::EMPTY).unwrap(), a);
}

#[test]
fn straight_line_code_is_one_block() {
    let mut graph = GraphBuilder::new();
    let (a, first) = constant(&mut graph);
    let (b, second) = constant(&mut graph);
    let body = graph.append(a, b).unwrap();
    let body = graph.ret(body, second).unwrap();

    let flow = graph.finish(body.entry.unwrap()).unwrap();
    assert_eq!(flow.blocks.len(), 1);
    let entry = flow.block(flow.entry());
    assert_eq!(entry.kind, BlockKind::FunctionEntry);
    assert_eq!(entry.instrs, vec![first, second]);
    assert_eq!(entry.terminator, Terminator::Return(second));
}

#[test]
fn two_open_arms_meet_in_a_join() {
    let mut graph = GraphBuilder::new();
    let (head, cond) = constant(&mut graph);
    let (then_node, else_node) = (graph.target(), graph.target());
    let head = graph.branch(head, cond, then_node, else_node).unwrap();

    let join = graph
        .converge(&[Fragment::at(then_node), Fragment::at(else_node)])
        .unwrap()
        .unwrap();
    let (tail, value) = constant(&mut graph);
    let tail = graph.append(Fragment::at(join), tail).unwrap();
    graph.ret(tail, value).unwrap();

    let flow = graph.finish(head.entry.unwrap()).unwrap();
    assert_eq!(flow.blocks.len(), 4);
    let join = flow.block(BlockId::new(3));
    assert_eq!(join.kind, BlockKind::Join);
    assert_eq!(join.predecessors, vec![BlockId::new(1), BlockId::new(2)]);
}

#[test]
fn a_single_open_arm_needs_no_join() {
    let mut graph = GraphBuilder::new();
    let (value, id) = constant(&mut graph);
    let returning = graph.target();
    let closed = graph.ret(Fragment::at(returning), id).unwrap();
    let open = Fragment::at(graph.target());
    let nodes = graph.node_count();

    assert_eq!(graph.converge(&[closed, open]).unwrap(), open.current);
    assert_eq!(graph.node_count(), nodes);
    assert_eq!(graph.converge(&[closed]).unwrap(), None);
    assert!(value.is_open());
}

#[test]
fn unreachable_nodes_are_dropped() {
    let mut graph = GraphBuilder::new();
    let (entry, value) = constant(&mut graph);
    let entry = graph.ret(entry, value).unwrap();

    // Never jumped to, and never terminated.
    let (orphan, _) = constant(&mut graph);
    let dead = graph.target();
    graph.append(Fragment::at(dead), orphan).unwrap();

    let flow = graph.finish(entry.entry.unwrap()).unwrap();
    assert_eq!(flow.blocks.len(), 1);
    assert_eq!(flow.instrs.len(), 2);
    assert_eq!(flow.placed_instrs().count(), 1);
}

#[test]
fn reachable_nodes_must_be_terminated() {
    let mut graph = GraphBuilder::new();
    let (entry, _) = constant(&mut graph);
    let node = entry.current.unwrap();
    assert_eq!(
        graph.finish(entry.entry.unwrap()).err(),
        Some(FragmentError::Unterminated(node))
    );
}

#[test]
fn jumps_only_reach_block_entries() {
    let mut graph = GraphBuilder::new();
    let (from, _) = constant(&mut graph);
    let (segment, _) = constant(&mut graph);
    let target = segment.entry.unwrap();
    assert_eq!(
        graph.goto(from, target),
        Err(FragmentError::JumpToSegment(target))
    );
}

#[test]
fn handler_entries_are_reached_from_their_try_body() {
    let mut graph = GraphBuilder::new();
    let (entry, _) = constant(&mut graph);
    let handler = graph.add_handler(None);

    graph.set_try_index(Some(handler));
    let body = graph.target();
    let (value, id) = constant(&mut graph);
    let body_fragment = graph.append(Fragment::at(body), value).unwrap();
    graph.ret(body_fragment, id).unwrap();
    graph.set_try_index(None);

    let catch = graph.target();
    let (caught, exception) = graph.emit(Instr {
        op: Op::LoadException,
        pos: TokenPos::NO_SOURCE,
        inferred: None,
    });
    let caught = graph.append(Fragment::at(catch), caught).unwrap();
    graph.throw(caught, exception).unwrap();
    graph.set_handler_entry(handler, catch).unwrap();

    let entry = graph.goto(entry, body).unwrap();
    let flow = graph.finish(entry.entry.unwrap()).unwrap();

    assert_eq!(flow.blocks.len(), 3);
    assert_eq!(flow.block(BlockId::new(1)).try_index, Some(handler));
    let catch = flow.block(BlockId::new(2));
    assert_eq!(catch.kind, BlockKind::Catch { handler });
    assert!(catch.predecessors.is_empty());
    assert_eq!(
        flow.handlers,
        vec![Handler {
            entry: Some(BlockId::new(2)),
            outer: None,
        }]
    );
}

#[test]
fn a_missing_handler_entry_is_reported() {
    let mut graph = GraphBuilder::new();
    let handler = graph.add_handler(None);
    graph.set_try_index(Some(handler));
    let (entry, value) = constant(&mut graph);
    let entry = graph.ret(entry, value).unwrap();
    assert_eq!(
        graph.finish(entry.entry.unwrap()).err(),
        Some(FragmentError::MissingHandler(handler))
    );
}
