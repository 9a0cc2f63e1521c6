//! Scalar body-graph scaffolding shared by every builder.
//!
//! A body lives in the same arena as the outer graph: every synthesized node
//! is parented under the Loop operator, and reads of outer tensors are plain
//! edges from the outer node into a body operator (the toposort treats those
//! as implicit dependencies of the Loop). Edges inside the body carry a
//! monotonically increasing `order` so the otherwise-unordered graph
//! serializes back into a deterministic instruction sequence.

use loft_dtype::{DataType, ScalarValue};
use loft_ir::graph::{Graph, NodeId};
use loft_ir::indexing::{broadcast_axis_map, strides};
use loft_ir::node::{
    Attributes, ConstantNode, OpKind, OperationNode, TensorKind, TensorNode, VariableNode,
};
use loft_ir::shape::{from_dims, Shape};

use crate::error::Result;

/// The body's closing tensors plus the outer tensors the body reads, wired
/// as Loop inputs/outputs by the orchestrator.
#[derive(Debug, Clone)]
pub struct BodyOutputs {
    pub cond_out: NodeId,
    pub carry_out: NodeId,
    pub captured: Vec<NodeId>,
}

/// Incremental constructor for one Loop body.
pub struct BodyBuilder<'g> {
    graph: &'g mut Graph,
    loop_op: NodeId,
    iter: NodeId,
    cond_in: NodeId,
    carry_in: NodeId,
    carry_len: usize,
    dtype: DataType,
    order: u32,
    captured: Vec<NodeId>,
}

impl<'g> BodyBuilder<'g> {
    /// Create the body scaffolding: the Int64 `iter` counter, the Bool
    /// `cond_in` passthrough input, and the flat 1-D carry input of length
    /// `carry_len` holding the accumulated output buffer.
    pub fn new(graph: &'g mut Graph, loop_op: NodeId, dtype: DataType, carry_len: usize) -> Result<Self> {
        let iter = graph.add_variable(VariableNode {
            name: graph.fresh_name("iter"),
            dtype: DataType::Int64,
        })?;
        graph.set_parent(iter, Some(loop_op))?;

        let cond_in = graph.add_tensor(
            TensorNode::new(graph.fresh_name("cond_in"), TensorKind::Input)
                .with_dtype(DataType::Bool)
                .with_shape(Shape::new()),
        )?;
        graph.set_parent(cond_in, Some(loop_op))?;

        let carry_in = graph.add_tensor(
            TensorNode::new(graph.fresh_name("carry_in"), TensorKind::Input)
                .with_dtype(dtype)
                .with_shape(from_dims(&[carry_len])),
        )?;
        graph.set_parent(carry_in, Some(loop_op))?;

        Ok(Self { graph, loop_op, iter, cond_in, carry_in, carry_len, dtype, order: 0, captured: Vec::new() })
    }

    pub fn iter(&self) -> NodeId {
        self.iter
    }

    pub fn carry_in(&self) -> NodeId {
        self.carry_in
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn graph(&mut self) -> &mut Graph {
        self.graph
    }

    fn next_order(&mut self) -> u32 {
        let order = self.order;
        self.order += 1;
        order
    }

    // =========================================================================
    // Scalar nodes
    // =========================================================================

    /// Literal scalar node.
    pub fn constant(&mut self, value: ScalarValue) -> Result<NodeId> {
        let id = self.graph.add_constant(ConstantNode { name: self.graph.fresh_name("lit"), value })?;
        self.graph.set_parent(id, Some(self.loop_op))?;
        Ok(id)
    }

    pub fn int_const(&mut self, value: i64) -> Result<NodeId> {
        self.constant(ScalarValue::Int(value))
    }

    /// Additive identity matching the body's element type.
    pub fn zero(&mut self) -> Result<NodeId> {
        if self.dtype.is_float() {
            self.constant(ScalarValue::Float(0.0))
        } else {
            self.constant(ScalarValue::Int(0))
        }
    }

    /// Apply a scalar operator over already-built body values, preserving
    /// absent optional operand slots. The result is a fresh `Variable` node
    /// carrying `dtype`.
    pub fn apply_sparse(
        &mut self,
        kind: OpKind,
        attrs: Attributes,
        operands: &[Option<NodeId>],
        dtype: DataType,
    ) -> Result<NodeId> {
        let name = self.graph.fresh_name(&kind.to_string().to_lowercase());
        let mut op = OperationNode::new(name, kind);
        op.attrs = attrs;
        op.params = operands.to_vec();
        let op_id = self.graph.add_operation(op)?;
        self.graph.set_parent(op_id, Some(self.loop_op))?;

        for &operand in operands.iter().flatten() {
            let order = self.next_order();
            self.graph.add_edge_with(operand, op_id, None, None, Some(order))?;
        }

        let result = self.graph.add_variable(VariableNode {
            name: self.graph.fresh_name("v"),
            dtype,
        })?;
        self.graph.set_parent(result, Some(self.loop_op))?;
        let order = self.next_order();
        self.graph.add_edge_with(op_id, result, Some(dtype), None, Some(order))?;
        Ok(result)
    }

    pub fn apply(
        &mut self,
        kind: OpKind,
        attrs: Attributes,
        operands: &[NodeId],
        dtype: DataType,
    ) -> Result<NodeId> {
        let slots: Vec<Option<NodeId>> = operands.iter().map(|&id| Some(id)).collect();
        self.apply_sparse(kind, attrs, &slots, dtype)
    }

    pub fn scalar_op(&mut self, kind: OpKind, operands: &[NodeId], dtype: DataType) -> Result<NodeId> {
        self.apply(kind, Attributes::new(), operands, dtype)
    }

    // =========================================================================
    // Index arithmetic
    // =========================================================================

    /// Mixed-radix decode of `iter` into per-axis index variables
    /// (most-significant first). Extraction runs from the least-significant
    /// axis: `idx_k = rem % d_k; rem = rem / d_k`; the most-significant axis
    /// takes the final quotient directly.
    pub fn axis_indices(&mut self, dims: &[usize]) -> Result<Vec<NodeId>> {
        let mut indices = vec![self.iter; dims.len()];
        let mut rem = self.iter;
        for axis in (1..dims.len()).rev() {
            let radix = self.int_const(dims[axis] as i64)?;
            indices[axis] = self.scalar_op(OpKind::Mod, &[rem, radix], DataType::Int64)?;
            rem = self.scalar_op(OpKind::Div, &[rem, radix], DataType::Int64)?;
        }
        if !dims.is_empty() {
            indices[0] = rem;
        }
        Ok(indices)
    }

    /// Linear composition: dot product of index variables with the
    /// row-major strides of `dims`, built as a Mul/Add chain. Stride-1 terms
    /// skip the multiply.
    pub fn linear_offset(&mut self, indices: &[NodeId], dims: &[usize]) -> Result<NodeId> {
        let strides = strides(dims);
        let mut acc: Option<NodeId> = None;
        for (&index, stride) in indices.iter().zip(strides) {
            let term = if stride == 1 {
                index
            } else {
                let stride = self.int_const(stride)?;
                self.scalar_op(OpKind::Mul, &[index, stride], DataType::Int64)?
            };
            acc = Some(match acc {
                None => term,
                Some(sum) => self.scalar_op(OpKind::Add, &[sum, term], DataType::Int64)?,
            });
        }
        match acc {
            Some(offset) => Ok(offset),
            None => self.int_const(0),
        }
    }

    // =========================================================================
    // Gather / scatter
    // =========================================================================

    /// Record an outer tensor the body reads, so the orchestrator can list
    /// it among the Loop's inputs.
    pub fn note_capture(&mut self, source: NodeId) -> Result<()> {
        if self.graph.parent(source)? != Some(self.loop_op) && !self.captured.contains(&source) {
            self.captured.push(source);
        }
        Ok(())
    }

    /// Read one scalar from `source` at a precomputed flat offset.
    pub fn gather_flat(&mut self, source: NodeId, offset: NodeId, dtype: DataType) -> Result<NodeId> {
        self.note_capture(source)?;
        self.scalar_op(OpKind::Gather, &[source, offset], dtype)
    }

    /// Read one scalar from `source` at explicit per-axis indices.
    pub fn gather_at(
        &mut self,
        source: NodeId,
        indices: &[NodeId],
        src_dims: &[usize],
        dtype: DataType,
    ) -> Result<NodeId> {
        let offset = self.linear_offset(indices, src_dims)?;
        self.gather_flat(source, offset, dtype)
    }

    /// Broadcast-aware read: map the output-space indices onto `src_shape`
    /// right-aligned; absent and size-1 source axes index 0.
    pub fn gather_broadcast(
        &mut self,
        source: NodeId,
        out_indices: &[NodeId],
        src_shape: &Shape,
        src_dims: &[usize],
        dtype: DataType,
    ) -> Result<NodeId> {
        let map = broadcast_axis_map(out_indices.len(), src_shape);
        let mut src_indices = vec![None; src_dims.len()];
        for (out_axis, mapped) in map.iter().enumerate() {
            if let Some(src_axis) = mapped {
                src_indices[*src_axis] = Some(out_indices[out_axis]);
            }
        }

        let mut zero = None;
        let mut resolved = Vec::with_capacity(src_dims.len());
        for index in src_indices {
            let id = match (index, zero) {
                (Some(id), _) => id,
                (None, Some(z)) => z,
                (None, None) => {
                    let z = self.int_const(0)?;
                    zero = Some(z);
                    z
                }
            };
            resolved.push(id);
        }
        self.gather_at(source, &resolved, src_dims, dtype)
    }

    /// Scatter the computed scalar into the carry at `offset` and close the
    /// body: `carry_out` and the `cond_in -> cond_out` passthrough.
    pub fn finish(mut self, value: NodeId, offset: NodeId) -> Result<BodyOutputs> {
        let name = self.graph.fresh_name("scatter");
        let mut scatter = OperationNode::new(name, OpKind::ScatterElements);
        scatter.params = vec![Some(self.carry_in), Some(offset), Some(value)];
        let scatter_op = self.graph.add_operation(scatter)?;
        self.graph.set_parent(scatter_op, Some(self.loop_op))?;
        for operand in [self.carry_in, offset, value] {
            let order = self.next_order();
            self.graph.add_edge_with(operand, scatter_op, None, None, Some(order))?;
        }

        let carry_out = self.graph.add_tensor(
            TensorNode::new(self.graph.fresh_name("carry_out"), TensorKind::Output)
                .with_dtype(self.dtype)
                .with_shape(from_dims(&[self.carry_len])),
        )?;
        self.graph.set_parent(carry_out, Some(self.loop_op))?;
        let order = self.next_order();
        self.graph.add_edge_with(scatter_op, carry_out, Some(self.dtype), Some(from_dims(&[self.carry_len])), Some(order))?;

        let cond_op = {
            let name = self.graph.fresh_name("keep_going");
            let mut op = OperationNode::new(name, OpKind::Identity);
            op.params = vec![Some(self.cond_in)];
            let id = self.graph.add_operation(op)?;
            self.graph.set_parent(id, Some(self.loop_op))?;
            let order = self.next_order();
            self.graph.add_edge_with(self.cond_in, id, None, None, Some(order))?;
            id
        };
        let cond_out = self.graph.add_tensor(
            TensorNode::new(self.graph.fresh_name("cond_out"), TensorKind::Output)
                .with_dtype(DataType::Bool)
                .with_shape(Shape::new()),
        )?;
        self.graph.set_parent(cond_out, Some(self.loop_op))?;
        let order = self.next_order();
        self.graph.add_edge_with(cond_op, cond_out, Some(DataType::Bool), Some(Shape::new()), Some(order))?;

        Ok(BodyOutputs { cond_out, carry_out, captured: self.captured })
    }
}
