//! Topological ordering of operation nodes.
//!
//! Classic DFS three-color sort over producer edges, preceded by a pre-pass
//! that adds *implicit* dependencies: an operator whose body subgraph reads
//! a tensor produced in the enclosing graph must be ordered after that
//! tensor's producer, even though no direct edge connects the two operators.
//!
//! A detected cycle is reported and the back-edge skipped; ordering is
//! best-effort rather than aborting the sort.

use std::collections::{HashMap, HashSet};

use crate::graph::{Graph, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

/// Order the graph's top-level operation nodes so that every producer
/// precedes every consumer, including producers reachable only through a
/// body subgraph's free variables. Deterministic for a fixed graph.
pub fn toposort(graph: &Graph) -> Vec<NodeId> {
    let ops = graph.top_level_operations();
    let preds = predecessor_map(graph, &ops);

    let mut marks: HashMap<NodeId, Mark> = ops.iter().map(|&id| (id, Mark::White)).collect();
    let mut order = Vec::with_capacity(ops.len());

    for &op in &ops {
        visit(op, &preds, &mut marks, &mut order);
    }
    order
}

/// Order the operation nodes of `owner`'s body subgraph so that every
/// producer precedes every consumer. Only dependencies between body members
/// count; tensors captured from the enclosing graph impose no ordering here.
pub fn toposort_body(graph: &Graph, owner: NodeId) -> Vec<NodeId> {
    let ops: Vec<NodeId> = graph.children(owner).into_iter().filter(|&id| graph.is_operation(id)).collect();

    let mut preds: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for &op in &ops {
        let mut list = Vec::new();
        for tensor in operand_tensors(graph, op) {
            if let Ok(Some(producer)) = graph.producer(tensor) {
                if producer != op && ops.contains(&producer) && !list.contains(&producer) {
                    list.push(producer);
                }
            }
        }
        preds.insert(op, list);
    }

    let mut marks: HashMap<NodeId, Mark> = ops.iter().map(|&id| (id, Mark::White)).collect();
    let mut order = Vec::with_capacity(ops.len());
    for &op in &ops {
        visit(op, &preds, &mut marks, &mut order);
    }
    order
}

fn visit(op: NodeId, preds: &HashMap<NodeId, Vec<NodeId>>, marks: &mut HashMap<NodeId, Mark>, order: &mut Vec<NodeId>) {
    match marks.get(&op) {
        Some(Mark::Black) => return,
        Some(Mark::Gray) => {
            // Back-edge: report and skip rather than aborting the sort.
            tracing::warn!(op = op.0, "cycle detected during topological sort; skipping back-edge");
            return;
        }
        _ => {}
    }

    marks.insert(op, Mark::Gray);
    if let Some(ps) = preds.get(&op) {
        for &p in ps {
            visit(p, preds, marks, order);
        }
    }
    marks.insert(op, Mark::Black);
    order.push(op);
}

/// Direct plus implicit predecessors for each top-level operator.
fn predecessor_map(graph: &Graph, ops: &[NodeId]) -> HashMap<NodeId, Vec<NodeId>> {
    let mut preds: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

    for &op in ops {
        let mut list = Vec::new();

        // Direct producers of operand tensors.
        for tensor in operand_tensors(graph, op) {
            if let Ok(Some(producer)) = graph.producer(tensor) {
                push_pred(graph, &mut list, producer, op);
            }
        }

        // Implicit pre-pass: free tensors read inside the body subgraph.
        let body = descendants(graph, op);
        for &inner in &body {
            if !graph.is_operation(inner) {
                continue;
            }
            for tensor in operand_tensors(graph, inner) {
                if body.contains(&tensor) {
                    continue;
                }
                if let Ok(Some(producer)) = graph.producer(tensor) {
                    push_pred(graph, &mut list, producer, op);
                }
            }
        }

        preds.insert(op, list);
    }
    preds
}

fn push_pred(graph: &Graph, list: &mut Vec<NodeId>, producer: NodeId, op: NodeId) {
    let top_level = graph.parent(producer).ok().flatten().is_none();
    if producer != op && top_level && !list.contains(&producer) {
        list.push(producer);
    }
}

/// Tensor operands of an operation, in edge insertion order.
fn operand_tensors(graph: &Graph, op: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    if let Ok(edges) = graph.incoming(op) {
        for eid in edges {
            if let Ok(edge) = graph.edge(eid) {
                if graph.try_tensor(edge.src).is_some() && !out.contains(&edge.src) {
                    out.push(edge.src);
                }
            }
        }
    }
    out
}

/// All transitive children of a node.
fn descendants(graph: &Graph, root: NodeId) -> HashSet<NodeId> {
    let mut seen = HashSet::new();
    let mut stack = graph.children(root);
    while let Some(id) = stack.pop() {
        if seen.insert(id) {
            stack.extend(graph.children(id));
        }
    }
    seen
}
