//! Inference engine: input resolution, rule dispatch, edge rewiring.

use loft_dtype::DataType;
use loft_ir::graph::{Graph, NodeId};
use loft_ir::node::{Node, OpKind};
use loft_ir::shape::Shape;
use loft_ir::{toposort, toposort_body, TensorData};
use smallvec::SmallVec;

use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::rules;

/// Resolved view of one positional operand.
#[derive(Debug, Clone, Default)]
pub struct InputInfo {
    /// Tensor node backing the operand; `None` for an absent optional slot.
    pub id: Option<NodeId>,
    pub shape: Option<Shape>,
    pub dtype: Option<DataType>,
}

impl InputInfo {
    /// Embedded constant payload of the operand, if any.
    pub fn data<'g>(&self, graph: &'g Graph) -> Option<&'g TensorData> {
        self.id.and_then(|id| graph.try_tensor(id)).and_then(|t| t.data.as_ref())
    }
}

/// One inferred output: (shape, dtype), either half possibly unknown.
pub type OutputInfo = (Option<Shape>, Option<DataType>);

/// Per-operator rule results, positionally matched to the operator's
/// outgoing edges.
pub type Outputs = SmallVec<[OutputInfo; 2]>;

/// Infer shapes and dtypes for every top-level operator, in topological
/// order. Returns the diagnostics collected along the way.
pub fn infer_graph(graph: &mut Graph) -> Result<Diagnostics> {
    let mut diags = Diagnostics::new();
    let order = toposort(graph);
    infer_ops(graph, &order, &mut diags)?;
    Ok(diags)
}

/// Infer shapes for the body subgraph of `owner`, in topological order.
/// Creation order is not trusted: an externally built body may insert a
/// consumer before its producer.
pub fn infer_body(graph: &mut Graph, owner: NodeId, diags: &mut Diagnostics) -> Result<()> {
    let ops = toposort_body(graph, owner);
    infer_ops(graph, &ops, diags)
}

fn infer_ops(graph: &mut Graph, ops: &[NodeId], diags: &mut Diagnostics) -> Result<()> {
    for &op_id in ops {
        infer_one(graph, op_id, diags)?;
    }
    Ok(())
}

/// Resolve inputs, apply the operator rule, rewire outgoing edges.
fn infer_one(graph: &mut Graph, op_id: NodeId, diags: &mut Diagnostics) -> Result<()> {
    let op = graph.operation(op_id)?.clone();
    let inputs: Vec<InputInfo> = op.params.iter().map(|&slot| resolve_input(graph, op_id, slot)).collect();

    let outputs = rules::apply(graph, op_id, &op, &inputs, diags)?;
    rewire_outputs(graph, op_id, &outputs)?;

    // Loop bodies need their own pass once the outer operator's inputs are
    // known; If bodies are opaque to this engine.
    if op.op == OpKind::Loop {
        infer_body(graph, op_id, diags)?;
    }
    Ok(())
}

/// Resolution priority for an operand's (shape, dtype):
/// 1. the operand tensor's own incoming edge (the value written by its
///    producer during this pass),
/// 2. the direct edge from the tensor into this operator,
/// 3. the tensor node's static fields.
///
/// The two halves resolve independently: a producer edge knowing only the
/// dtype does not stop the shape from falling through to a later source.
pub(crate) fn resolve_input(graph: &Graph, op_id: NodeId, slot: Option<NodeId>) -> InputInfo {
    let Some(tensor_id) = slot else {
        return InputInfo::default();
    };

    let mut shape = None;
    let mut dtype = None;

    if let Ok(edges) = graph.incoming(tensor_id) {
        for eid in edges {
            if let Ok(edge) = graph.edge(eid) {
                if shape.is_none() {
                    shape = edge.shape.clone();
                }
                if dtype.is_none() {
                    dtype = edge.dtype;
                }
                if shape.is_some() && dtype.is_some() {
                    break;
                }
            }
        }
    }

    if shape.is_none() || dtype.is_none() {
        if let Ok(edges) = graph.outgoing(tensor_id) {
            for eid in edges {
                if let Ok(edge) = graph.edge(eid) {
                    if edge.dst != op_id {
                        continue;
                    }
                    if shape.is_none() {
                        shape = edge.shape.clone();
                    }
                    if dtype.is_none() {
                        dtype = edge.dtype;
                    }
                    break;
                }
            }
        }
    }

    match graph.node(tensor_id) {
        Ok(Node::Tensor(tensor)) => {
            if shape.is_none() {
                shape = tensor.shape.clone();
            }
            if dtype.is_none() {
                dtype = tensor.dtype;
            }
        }
        // Scalar body nodes are rank-0 values.
        Ok(Node::Variable(var)) => {
            shape = shape.or_else(|| Some(Shape::new()));
            dtype = dtype.or(Some(var.dtype));
        }
        Ok(Node::Constant(lit)) => {
            shape = shape.or_else(|| Some(Shape::new()));
            dtype = dtype.or(Some(lit.value.dtype()));
        }
        _ => {}
    }

    InputInfo { id: Some(tensor_id), shape, dtype }
}

/// Remove all outgoing edges, then recreate them carrying the inferred
/// values. Output tensors still lacking a shape or dtype adopt the inferred
/// ones. Removal completes before any edge is re-added, so no transient
/// duplicate-edge state is observable within the pass.
fn rewire_outputs(graph: &mut Graph, op_id: NodeId, outputs: &Outputs) -> Result<()> {
    let old: Vec<_> = graph.outgoing(op_id)?;
    let mut endpoints = Vec::with_capacity(old.len());
    for eid in old {
        let edge = graph.remove_edge(eid)?;
        endpoints.push((edge.dst, edge.order));
    }

    for (position, (dst, order)) in endpoints.into_iter().enumerate() {
        // An explicit order on an output edge names the operator's output
        // slot; without one the edge's position does. A model wiring only
        // a later output (LSTM's Y_h without Y) needs the explicit slot.
        let slot = order.map(|o| o as usize).unwrap_or(position);
        let (shape, dtype) = outputs
            .get(slot)
            .or_else(|| outputs.last())
            .cloned()
            .unwrap_or((None, None));

        graph.add_edge_with(op_id, dst, dtype, shape.clone(), order)?;

        if let Ok(tensor) = graph.tensor_mut(dst) {
            if tensor.shape.is_none() {
                tensor.shape = shape;
            }
            if tensor.dtype.is_none() {
                tensor.dtype = dtype;
            }
        }
    }
    Ok(())
}
