//! LSTM lowering: time-unrolled, not flat-index based.
//!
//! The cell becomes a Loop with trip count = sequence length whose carry is
//! the `[2, batch, hidden]` (hidden, cell) state pair. The body stays at
//! tensor level: gate pre-activations are two MatMuls against the squeezed
//! and transposed weight matrices, followed by the standard iofc gate
//! activations. With a `sequence_lens` operand, exhausted batch rows blend
//! the previous state back in through a Where mask.
//!
//! Only the final-state outputs (`Y_h`, `Y_c`) are wired; a model that
//! consumes the full `Y` sequence is left for another strategy, so
//! `can_handle` declines it.

use loft_dtype::{DataType, ScalarValue, TensorData};
use loft_ir::graph::{Graph, NodeId};
use loft_ir::node::{
    AttrValue, ConstantNode, OpKind, OperationNode, TensorKind, TensorNode, VariableNode,
};
use loft_ir::shape::{from_dims, Shape};

use crate::builders::{remove_chain, required_param, static_dims, Builder};
use crate::chain::Chain;
use crate::context::LoweringContext;
use crate::error::*;
use crate::pipeline::LowerOptions;

pub struct LstmBuilder;

impl Builder for LstmBuilder {
    fn name(&self) -> &'static str {
        "lstm"
    }

    fn can_handle(&self, graph: &Graph, chain: &Chain) -> bool {
        let Some(op) = graph.try_operation(chain.root()) else {
            return false;
        };
        if op.op != OpKind::Lstm || !matches!(op.attr_str("direction"), None | Some("forward")) {
            return false;
        }
        // This strategy only produces final states; a consumed Y sequence
        // needs a different lowering.
        match classify_outputs(graph, chain.root()) {
            Ok(outputs) => match outputs.sequence {
                Some(y) => graph.consumers(y).map(|c| c.is_empty()).unwrap_or(false),
                None => true,
            },
            Err(_) => false,
        }
    }

    fn build(
        &self,
        graph: &mut Graph,
        chain: &Chain,
        _ctx: &mut LoweringContext,
        _options: &LowerOptions,
    ) -> Result<NodeId> {
        let root = chain.root();
        let op = graph.operation(root)?.clone();

        let x = required_param(graph, root, 0)?;
        let w = required_param(graph, root, 1)?;
        let r = required_param(graph, root, 2)?;
        let bias = op.param(3);
        let seq_lens = op.param(4);
        let initial_h = op.param(5);
        let initial_c = op.param(6);

        let x_dims = static_dims(graph, x)?;
        let hidden = op.attr_i64("hidden_size").unwrap_or(0) as usize;
        if x_dims.len() != 3 || hidden == 0 {
            return UnsupportedSnafu { name: op.name, reason: "LSTM needs rank-3 X and hidden_size" }.fail();
        }
        let (seq, batch) = (x_dims[0], x_dims[1]);
        let dtype = graph.tensor(x)?.dtype.unwrap_or(DataType::Float);

        let outputs = classify_outputs(graph, root)?;

        // Outer constants: trip = sequence length, always-true condition,
        // and the initial (hidden, cell) pair.
        let trip = graph.add_tensor(
            TensorNode::new(graph.fresh_name("trip"), TensorKind::Constant)
                .with_shape(Shape::new())
                .with_data(TensorData::scalar_i64(seq as i64)),
        )?;
        let cond = graph.add_tensor(
            TensorNode::new(graph.fresh_name("keep_going"), TensorKind::Constant)
                .with_shape(Shape::new())
                .with_data(TensorData::scalar_bool(true)),
        )?;
        let init = initial_state(graph, initial_h, initial_c, batch, hidden, dtype)?;

        let mut params = vec![Some(trip), Some(cond), Some(init), Some(x), Some(w), Some(r)];
        params.extend([bias, seq_lens].into_iter().flatten().map(Some));
        let loop_op = graph
            .add_operation(OperationNode::new(graph.fresh_name("time_loop"), OpKind::Loop).with_params(params))?;

        build_body(graph, loop_op, BodyInputs { x, w, r, bias, seq_lens, batch, hidden, dtype })?;

        for input in [Some(trip), Some(cond), Some(init), Some(x), Some(w), Some(r), bias, seq_lens]
            .into_iter()
            .flatten()
        {
            graph.add_edge(input, loop_op)?;
        }

        // Final carry -> (Y_h, Y_c) slices.
        let final_state = graph.add_tensor(
            TensorNode::new(graph.fresh_name("final_state"), TensorKind::Intermediate)
                .with_dtype(dtype)
                .with_shape(from_dims(&[2, batch, hidden])),
        )?;
        let keep: Vec<NodeId> = [outputs.hidden, outputs.cell].into_iter().flatten().collect();
        remove_chain(graph, chain, &keep)?;
        graph.add_edge(loop_op, final_state)?;

        for (row, out) in [(0, outputs.hidden), (1, outputs.cell)] {
            let Some(out) = out else { continue };
            slice_state(graph, final_state, out, row)?;
        }
        Ok(loop_op)
    }
}

/// The LSTM's output tensors sorted into roles.
struct LstmOutputs {
    /// Full per-step history `Y`, rank 4.
    sequence: Option<NodeId>,
    /// Final hidden state `Y_h`, rank 3.
    hidden: Option<NodeId>,
    /// Final cell state `Y_c`, rank 3.
    cell: Option<NodeId>,
}

/// Classify the root's outputs by inferred rank rather than edge position:
/// a model wiring only `Y_h` has no `Y` edge at all, so position alone would
/// mistake the state for the sequence. Among the rank-3 states, edge order
/// still decides `Y_h` versus `Y_c`.
fn classify_outputs(graph: &Graph, root: NodeId) -> Result<LstmOutputs> {
    let mut sequence = None;
    let mut states = Vec::new();
    for eid in graph.outgoing(root)? {
        let edge = graph.edge(eid)?;
        let dst = edge.dst;
        let rank = edge
            .shape
            .as_ref()
            .map(|s| s.len())
            .or_else(|| graph.try_tensor(dst).and_then(|t| t.shape.as_ref()).map(|s| s.len()));
        match rank {
            Some(4) if sequence.is_none() => sequence = Some(dst),
            Some(3) if states.len() < 2 => states.push(dst),
            _ => {
                return UnsupportedSnafu {
                    name: graph.operation(root)?.name.clone(),
                    reason: "LSTM outputs must be one rank-4 sequence and up to two rank-3 states",
                }
                .fail()
            }
        }
    }
    let mut states = states.into_iter();
    Ok(LstmOutputs { sequence, hidden: states.next(), cell: states.next() })
}

/// `[2, batch, hidden]` initial carry: concatenation of the given initial
/// states, or a zero buffer when both are absent.
fn initial_state(
    graph: &mut Graph,
    initial_h: Option<NodeId>,
    initial_c: Option<NodeId>,
    batch: usize,
    hidden: usize,
    dtype: DataType,
) -> Result<NodeId> {
    let zeros = |graph: &mut Graph| -> Result<NodeId> {
        Ok(graph.add_tensor(
            TensorNode::new(graph.fresh_name("state_zero"), TensorKind::Constant)
                .with_shape(from_dims(&[1, batch, hidden]))
                .with_data(TensorData::zeros(dtype, batch * hidden)),
        )?)
    };

    if initial_h.is_none() && initial_c.is_none() {
        return Ok(graph.add_tensor(
            TensorNode::new(graph.fresh_name("state_init"), TensorKind::Constant)
                .with_shape(from_dims(&[2, batch, hidden]))
                .with_data(TensorData::zeros(dtype, 2 * batch * hidden)),
        )?);
    }

    let h = match initial_h {
        Some(h) => h,
        None => zeros(graph)?,
    };
    let c = match initial_c {
        Some(c) => c,
        None => zeros(graph)?,
    };

    let init = graph.add_tensor(
        TensorNode::new(graph.fresh_name("state_init"), TensorKind::Intermediate)
            .with_dtype(dtype)
            .with_shape(from_dims(&[2, batch, hidden])),
    )?;
    let concat = graph.add_operation(
        OperationNode::new(graph.fresh_name("state_concat"), OpKind::Concat)
            .with_attr("axis", AttrValue::Int(0))
            .with_params(vec![Some(h), Some(c)]),
    )?;
    graph.add_edge(h, concat)?;
    graph.add_edge(c, concat)?;
    graph.add_edge(concat, init)?;
    Ok(init)
}

/// `out = final_state[index : index + 1]` along axis 0, shaped `[1, B, H]`.
fn slice_state(graph: &mut Graph, final_state: NodeId, out: NodeId, index: usize) -> Result<()> {
    let starts = const_ints(graph, "slice_start", &[index as i64], None)?;
    let ends = const_ints(graph, "slice_end", &[index as i64 + 1], None)?;
    let axes = const_ints(graph, "slice_axis", &[0], None)?;

    let slice = graph.add_operation(
        OperationNode::new(graph.fresh_name("state_slice"), OpKind::Slice)
            .with_params(vec![Some(final_state), Some(starts), Some(ends), Some(axes)]),
    )?;
    for input in [final_state, starts, ends, axes] {
        graph.add_edge(input, slice)?;
    }
    graph.add_edge(slice, out)?;
    Ok(())
}

fn const_ints(graph: &mut Graph, base: &str, values: &[i64], parent: Option<NodeId>) -> Result<NodeId> {
    let id = graph.add_tensor(
        TensorNode::new(graph.fresh_name(base), TensorKind::Constant)
            .with_shape(from_dims(&[values.len()]))
            .with_data(TensorData::I64(values.to_vec())),
    )?;
    if parent.is_some() {
        graph.set_parent(id, parent)?;
    }
    Ok(id)
}

struct BodyInputs {
    x: NodeId,
    w: NodeId,
    r: NodeId,
    bias: Option<NodeId>,
    seq_lens: Option<NodeId>,
    batch: usize,
    hidden: usize,
    dtype: DataType,
}

/// Tensor-level body plumbing: each operation writes a fresh intermediate
/// tensor, and every edge carries a running `order`.
struct BodyGraph<'g> {
    graph: &'g mut Graph,
    loop_op: NodeId,
    order: u32,
}

impl<'g> BodyGraph<'g> {
    fn next_order(&mut self) -> u32 {
        let order = self.order;
        self.order += 1;
        order
    }

    fn tensor(&mut self, base: &str, dtype: DataType, dims: &[usize], kind: TensorKind) -> Result<NodeId> {
        let id = self.graph.add_tensor(
            TensorNode::new(self.graph.fresh_name(base), kind)
                .with_dtype(dtype)
                .with_shape(from_dims(dims)),
        )?;
        self.graph.set_parent(id, Some(self.loop_op))?;
        Ok(id)
    }

    /// Apply a tensor operator; the result lands in a fresh intermediate.
    fn apply(
        &mut self,
        mut op: OperationNode,
        operands: &[NodeId],
        dtype: DataType,
        out_dims: &[usize],
    ) -> Result<NodeId> {
        op.name = self.graph.fresh_name(&op.name);
        op.params = operands.iter().map(|&id| Some(id)).collect();
        let op_id = self.graph.add_operation(op)?;
        self.graph.set_parent(op_id, Some(self.loop_op))?;
        for &operand in operands {
            let order = self.next_order();
            self.graph.add_edge_with(operand, op_id, None, None, Some(order))?;
        }

        let out = self.tensor("t", dtype, out_dims, TensorKind::Intermediate)?;
        let order = self.next_order();
        self.graph.add_edge_with(op_id, out, Some(dtype), Some(from_dims(out_dims)), Some(order))?;
        Ok(out)
    }

    fn simple(&mut self, name: &str, kind: OpKind, operands: &[NodeId], dtype: DataType, dims: &[usize]) -> Result<NodeId> {
        self.apply(OperationNode::new(name, kind), operands, dtype, dims)
    }
}

fn build_body(graph: &mut Graph, loop_op: NodeId, inputs: BodyInputs) -> Result<()> {
    let BodyInputs { x, w, r, bias, seq_lens, batch, hidden, dtype } = inputs;
    let x_dims = static_dims(graph, x)?;
    let input_width = x_dims[2];

    let mut body = BodyGraph { graph, loop_op, order: 0 };

    let t = body.graph.add_variable(VariableNode {
        name: body.graph.fresh_name("t"),
        dtype: DataType::Int64,
    })?;
    body.graph.set_parent(t, Some(loop_op))?;

    let cond_in = body.tensor("cond_in", DataType::Bool, &[], TensorKind::Input)?;
    let carry_in = body.tensor("state_in", dtype, &[2, batch, hidden], TensorKind::Input)?;

    // x_t: [batch, input]; h/c: [batch, hidden].
    let gather0 = |name: &str| OperationNode::new(name, OpKind::Gather).with_attr("axis", AttrValue::Int(0));
    let x_t = body.apply(gather0("step_input"), &[x, t], dtype, &[batch, input_width])?;

    let zero = body.graph.add_constant(ConstantNode {
        name: body.graph.fresh_name("row_h"),
        value: ScalarValue::Int(0),
    })?;
    body.graph.set_parent(zero, Some(loop_op))?;
    let one = body.graph.add_constant(ConstantNode {
        name: body.graph.fresh_name("row_c"),
        value: ScalarValue::Int(1),
    })?;
    body.graph.set_parent(one, Some(loop_op))?;

    let h = body.apply(gather0("prev_hidden"), &[carry_in, zero], dtype, &[batch, hidden])?;
    let c = body.apply(gather0("prev_cell"), &[carry_in, one], dtype, &[batch, hidden])?;

    // Gate pre-activations: x_t * W^T + h * R^T (+ Wb + Rb).
    let squeeze0 = |name: &str| OperationNode::new(name, OpKind::Squeeze).with_attr("axes", AttrValue::Ints(vec![0]));
    let w2 = body.apply(squeeze0("w_mat"), &[w], dtype, &[4 * hidden, input_width])?;
    let wt = body.simple("w_t", OpKind::Transpose, &[w2], dtype, &[input_width, 4 * hidden])?;
    let r2 = body.apply(squeeze0("r_mat"), &[r], dtype, &[4 * hidden, hidden])?;
    let rt = body.simple("r_t", OpKind::Transpose, &[r2], dtype, &[hidden, 4 * hidden])?;

    let xw = body.simple("gate_x", OpKind::MatMul, &[x_t, wt], dtype, &[batch, 4 * hidden])?;
    let hr = body.simple("gate_h", OpKind::MatMul, &[h, rt], dtype, &[batch, 4 * hidden])?;
    let mut gates = body.simple("gates", OpKind::Add, &[xw, hr], dtype, &[batch, 4 * hidden])?;

    if let Some(bias) = bias {
        let b1 = body.apply(squeeze0("bias_vec"), &[bias], dtype, &[8 * hidden])?;
        let wb = slice_1d(&mut body, b1, 0, 4 * hidden, dtype)?;
        let rb = slice_1d(&mut body, b1, 4 * hidden, 8 * hidden, dtype)?;
        let both = body.simple("bias_sum", OpKind::Add, &[wb, rb], dtype, &[4 * hidden])?;
        gates = body.simple("gates_biased", OpKind::Add, &[gates, both], dtype, &[batch, 4 * hidden])?;
    }

    // iofc slices along the hidden axis.
    let gate = |body: &mut BodyGraph<'_>, slot: usize| -> Result<NodeId> {
        slice_gate(body, gates, slot, hidden, batch, dtype)
    };
    let i_pre = gate(&mut body, 0)?;
    let o_pre = gate(&mut body, 1)?;
    let f_pre = gate(&mut body, 2)?;
    let g_pre = gate(&mut body, 3)?;

    let bh = &[batch, hidden];
    let i = body.simple("gate_i", OpKind::Sigmoid, &[i_pre], dtype, bh)?;
    let o = body.simple("gate_o", OpKind::Sigmoid, &[o_pre], dtype, bh)?;
    let f = body.simple("gate_f", OpKind::Sigmoid, &[f_pre], dtype, bh)?;
    let g = body.simple("gate_g", OpKind::Tanh, &[g_pre], dtype, bh)?;

    let fc = body.simple("keep_cell", OpKind::Mul, &[f, c], dtype, bh)?;
    let ig = body.simple("write_cell", OpKind::Mul, &[i, g], dtype, bh)?;
    let mut c_next = body.simple("cell_next", OpKind::Add, &[fc, ig], dtype, bh)?;
    let ct = body.simple("cell_act", OpKind::Tanh, &[c_next], dtype, bh)?;
    let mut h_next = body.simple("hidden_next", OpKind::Mul, &[o, ct], dtype, bh)?;

    // Rows past their sequence length keep the previous state.
    if let Some(lens) = seq_lens {
        let active = body.simple("row_active", OpKind::Greater, &[lens, t], DataType::Bool, &[batch])?;
        let mask = body.apply(
            OperationNode::new("row_mask", OpKind::Unsqueeze).with_attr("axes", AttrValue::Ints(vec![1])),
            &[active],
            DataType::Bool,
            &[batch, 1],
        )?;
        h_next = body.simple("hidden_masked", OpKind::Where, &[mask, h_next, h], dtype, bh)?;
        c_next = body.simple("cell_masked", OpKind::Where, &[mask, c_next, c], dtype, bh)?;
    }

    let unsqueeze0 =
        |name: &str| OperationNode::new(name, OpKind::Unsqueeze).with_attr("axes", AttrValue::Ints(vec![0]));
    let hu = body.apply(unsqueeze0("hidden_row"), &[h_next], dtype, &[1, batch, hidden])?;
    let cu = body.apply(unsqueeze0("cell_row"), &[c_next], dtype, &[1, batch, hidden])?;

    let concat = body.apply(
        OperationNode::new("state_next", OpKind::Concat).with_attr("axis", AttrValue::Int(0)),
        &[hu, cu],
        dtype,
        &[2, batch, hidden],
    )?;
    // Promote the concat result to the body's carry output.
    body.graph.tensor_mut(concat)?.kind = TensorKind::Output;

    let cond_out = body.simple("keep_going", OpKind::Identity, &[cond_in], DataType::Bool, &[])?;
    body.graph.tensor_mut(cond_out)?.kind = TensorKind::Output;
    Ok(())
}

/// `input[start..end]` along the last axis of a 1-D tensor.
fn slice_1d(body: &mut BodyGraph<'_>, input: NodeId, start: usize, end: usize, dtype: DataType) -> Result<NodeId> {
    let starts = const_ints(body.graph, "b_start", &[start as i64], Some(body.loop_op))?;
    let ends = const_ints(body.graph, "b_end", &[end as i64], Some(body.loop_op))?;
    let axes = const_ints(body.graph, "b_axis", &[0], Some(body.loop_op))?;
    body.simple("bias_slice", OpKind::Slice, &[input, starts, ends, axes], dtype, &[end - start])
}

/// Gate `slot` of the `[batch, 4*hidden]` pre-activation block.
fn slice_gate(
    body: &mut BodyGraph<'_>,
    gates: NodeId,
    slot: usize,
    hidden: usize,
    batch: usize,
    dtype: DataType,
) -> Result<NodeId> {
    let starts = const_ints(body.graph, "g_start", &[(slot * hidden) as i64], Some(body.loop_op))?;
    let ends = const_ints(body.graph, "g_end", &[((slot + 1) * hidden) as i64], Some(body.loop_op))?;
    let axes = const_ints(body.graph, "g_axis", &[1], Some(body.loop_op))?;
    body.simple("gate_pre", OpKind::Slice, &[gates, starts, ends, axes], dtype, &[batch, hidden])
}
