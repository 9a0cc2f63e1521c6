use loft_ir::graph::{Graph, NodeId};
use loft_ir::node::{AttrValue, OpKind, OperationNode, TensorKind, TensorNode};
use loft_ir::shape::from_dims;

use crate::error::Error;
use crate::pipeline::{lower_graph, LowerOptions};
use crate::test::{floats, the_loop, trip_count};

const SEQ: usize = 3;
const BATCH: usize = 2;
const INPUT: usize = 4;
const HIDDEN: usize = 4;

fn lstm_graph(direction: Option<&str>) -> (Graph, NodeId, NodeId) {
    let mut graph = Graph::new();
    let x = floats(&mut graph, "x", &[SEQ, BATCH, INPUT], &[0.5; SEQ * BATCH * INPUT]);
    let w = floats(&mut graph, "w", &[1, 4 * HIDDEN, INPUT], &[0.1; 4 * HIDDEN * INPUT]);
    let r = floats(&mut graph, "r", &[1, 4 * HIDDEN, HIDDEN], &[0.1; 4 * HIDDEN * HIDDEN]);

    let mut op = OperationNode::new("cell", OpKind::Lstm)
        .with_attr("hidden_size", AttrValue::Int(HIDDEN as i64))
        .with_params(vec![Some(x), Some(w), Some(r)]);
    if let Some(direction) = direction {
        op = op.with_attr("direction", AttrValue::Str(direction.to_string()));
    }
    let op_id = graph.add_operation(op).unwrap();
    for operand in [x, w, r] {
        graph.add_edge(operand, op_id).unwrap();
    }

    let y = graph.add_tensor(TensorNode::new("y", TensorKind::Intermediate)).unwrap();
    let y_h = graph.add_tensor(TensorNode::new("y_h", TensorKind::Output)).unwrap();
    let y_c = graph.add_tensor(TensorNode::new("y_c", TensorKind::Output)).unwrap();
    for out in [y, y_h, y_c] {
        graph.add_edge(op_id, out).unwrap();
    }
    (graph, y_h, y_c)
}

#[test]
fn forward_lstm_unrolls_into_a_time_loop() {
    let (mut graph, y_h, y_c) = lstm_graph(None);
    lower_graph(&mut graph, &LowerOptions::default()).unwrap();

    // The recurrence is gone; one loop with trip = sequence length remains.
    assert!(graph.node_ids().all(|id| graph.try_operation(id).map_or(true, |op| op.op != OpKind::Lstm)));
    let loop_op = the_loop(&graph);
    assert_eq!(trip_count(&graph, loop_op), SEQ as i64);

    // The unconsumed full-sequence output was cleaned up with the chain.
    assert!(graph.find("y").is_none());

    // Final states are slices of the loop's carry.
    for out in [y_h, y_c] {
        let producer = graph.producer(out).unwrap().unwrap();
        assert_eq!(graph.operation(producer).unwrap().op, OpKind::Slice);
    }
}

#[test]
fn lstm_body_is_tensor_level() {
    let (mut graph, _, _) = lstm_graph(None);
    lower_graph(&mut graph, &LowerOptions::default()).unwrap();

    let loop_op = the_loop(&graph);
    let body_kinds: Vec<OpKind> = graph
        .children(loop_op)
        .into_iter()
        .filter_map(|id| graph.try_operation(id).map(|op| op.op))
        .collect();
    assert!(body_kinds.contains(&OpKind::MatMul));
    assert!(body_kinds.contains(&OpKind::Sigmoid));
    assert!(body_kinds.contains(&OpKind::Concat));
}

#[test]
fn loop_carry_holds_both_state_rows() {
    let (mut graph, _, _) = lstm_graph(None);
    lower_graph(&mut graph, &LowerOptions::default()).unwrap();

    let loop_op = the_loop(&graph);
    let init = graph.operation(loop_op).unwrap().param(2).unwrap();
    assert_eq!(graph.tensor(init).unwrap().shape, Some(from_dims(&[2, BATCH, HIDDEN])));
}

#[test]
fn initial_states_seed_the_carry() {
    let (mut graph, _, _) = {
        let (mut graph, y_h, y_c) = lstm_graph(None);
        let h0 = floats(&mut graph, "h0", &[1, BATCH, HIDDEN], &[1.0; BATCH * HIDDEN]);
        let c0 = floats(&mut graph, "c0", &[1, BATCH, HIDDEN], &[2.0; BATCH * HIDDEN]);
        let op_id = graph.find("cell").unwrap();
        {
            let op = graph.operation_mut(op_id).unwrap();
            op.params.extend([None, None, Some(h0), Some(c0)]);
        }
        graph.add_edge(h0, op_id).unwrap();
        graph.add_edge(c0, op_id).unwrap();
        (graph, y_h, y_c)
    };
    lower_graph(&mut graph, &LowerOptions::default()).unwrap();

    let loop_op = the_loop(&graph);
    let init = graph.operation(loop_op).unwrap().param(2).unwrap();
    let producer = graph.producer(init).unwrap().unwrap();
    assert_eq!(graph.operation(producer).unwrap().op, OpKind::Concat);
}

#[test]
fn hidden_state_only_model_still_lowers() {
    let mut graph = Graph::new();
    let x = floats(&mut graph, "x", &[SEQ, BATCH, INPUT], &[0.5; SEQ * BATCH * INPUT]);
    let w = floats(&mut graph, "w", &[1, 4 * HIDDEN, INPUT], &[0.1; 4 * HIDDEN * INPUT]);
    let r = floats(&mut graph, "r", &[1, 4 * HIDDEN, HIDDEN], &[0.1; 4 * HIDDEN * HIDDEN]);
    let op = OperationNode::new("cell", OpKind::Lstm)
        .with_attr("hidden_size", AttrValue::Int(HIDDEN as i64))
        .with_params(vec![Some(x), Some(w), Some(r)]);
    let op_id = graph.add_operation(op).unwrap();
    for operand in [x, w, r] {
        graph.add_edge(operand, op_id).unwrap();
    }
    // No Y edge at all: the only wired output sits on slot 1, the final
    // hidden state, and must not be mistaken for the sequence history.
    let y_h = graph.add_tensor(TensorNode::new("y_h", TensorKind::Output)).unwrap();
    graph.add_edge_with(op_id, y_h, None, None, Some(1)).unwrap();

    lower_graph(&mut graph, &LowerOptions::default()).unwrap();
    assert_eq!(trip_count(&graph, the_loop(&graph)), SEQ as i64);
    let producer = graph.producer(y_h).unwrap().unwrap();
    assert_eq!(graph.operation(producer).unwrap().op, OpKind::Slice);
}

#[test]
fn reverse_direction_has_no_strategy() {
    let (mut graph, _, _) = lstm_graph(Some("reverse"));
    let err = lower_graph(&mut graph, &LowerOptions::default()).unwrap_err();
    assert!(matches!(err, Error::NoBuilder { op: OpKind::Lstm, .. }));
}

#[test]
fn consumed_sequence_output_has_no_strategy() {
    let (mut graph, _, _) = lstm_graph(None);
    let y = graph.find("y").unwrap();
    let sink = graph.add_operation(OperationNode::new("shape", OpKind::Shape).with_params(vec![Some(y)])).unwrap();
    graph.add_edge(y, sink).unwrap();

    let err = lower_graph(&mut graph, &LowerOptions::default()).unwrap_err();
    assert!(matches!(err, Error::NoBuilder { op: OpKind::Lstm, .. }));
}
