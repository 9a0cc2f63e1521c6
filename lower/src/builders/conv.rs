//! Convolution lowering.
//!
//! One iteration per output element `(n, m, *out_spatial)`. The body
//! accumulates over the input channels of the feature's group and the
//! kernel window, computing each tap's input position from stride, padding,
//! and dilation. Padded positions are gated per tap: the read is redirected
//! to offset 0 and the tap's contribution replaced by zero.

use itertools::Itertools;
use loft_ir::graph::{Graph, NodeId};
use loft_ir::node::{OpKind, OperationNode};

use crate::body::BodyBuilder;
use crate::builders::{close_loop, open_loop, required_param, root_output, static_dims, Builder};
use crate::chain::Chain;
use crate::context::LoweringContext;
use crate::error::*;
use crate::pipeline::LowerOptions;

pub struct ConvBuilder;

impl Builder for ConvBuilder {
    fn name(&self) -> &'static str {
        "conv"
    }

    fn can_handle(&self, graph: &Graph, chain: &Chain) -> bool {
        graph.try_operation(chain.root()).is_some_and(|op| op.op == OpKind::Conv)
    }

    fn build(
        &self,
        graph: &mut Graph,
        chain: &Chain,
        _ctx: &mut LoweringContext,
        _options: &LowerOptions,
    ) -> Result<NodeId> {
        let root = chain.root();
        let (out_tensor, out_dims, dtype) = root_output(graph, root)?;
        let total: usize = out_dims.iter().product();

        let op = graph.operation(root)?.clone();
        let x = required_param(graph, root, 0)?;
        let w = required_param(graph, root, 1)?;
        let bias = op.param(2);
        let x_dims = static_dims(graph, x)?;
        let w_dims = static_dims(graph, w)?;

        if x_dims.len() < 3 || w_dims.len() != x_dims.len() {
            return UnsupportedSnafu { name: op.name, reason: "conv needs matching operand ranks >= 3" }
                .fail();
        }
        let spatial = x_dims.len() - 2;
        let geom = ConvGeometry::resolve(&op, &x_dims, &w_dims, spatial)?;

        let shell = open_loop(graph, total, total, dtype)?;
        let mut body = BodyBuilder::new(graph, shell.loop_op, dtype, total)?;

        let idxs = body.axis_indices(&out_dims)?;
        let (n, m) = (idxs[0], idxs[1]);
        let out_sp = idxs[2..].to_vec();

        // Channel base of this feature's group: (m / features_per_group) * channels_per_group.
        let mg = body.int_const(geom.features_per_group as i64)?;
        let cg = body.int_const(geom.channels_per_group as i64)?;
        let group_idx = body.scalar_op(OpKind::Div, &[m, mg], loft_dtype::DataType::Int64)?;
        let base_c = body.scalar_op(OpKind::Mul, &[group_idx, cg], loft_dtype::DataType::Int64)?;

        let mut acc = None;
        for c in 0..geom.channels_per_group {
            for tap in geom.kernel.iter().map(|&k| 0..k).multi_cartesian_product() {
                let contribution =
                    conv_tap(&mut body, &geom, x, &x_dims, w, &w_dims, n, m, base_c, c, &out_sp, &tap, dtype)?;
                acc = Some(match acc {
                    None => contribution,
                    Some(prev) => body.scalar_op(OpKind::Add, &[prev, contribution], dtype)?,
                });
            }
        }

        let mut value = match acc {
            Some(v) => v,
            None => body.zero()?,
        };
        if let Some(bias) = bias {
            let bias_dims = static_dims(body.graph(), bias)?;
            let bv = body.gather_at(bias, &[m], &bias_dims, dtype)?;
            value = body.scalar_op(OpKind::Add, &[value, bv], dtype)?;
        }

        let offset = body.iter();
        let outputs = body.finish(value, offset)?;

        let id = shell.loop_op;
        close_loop(graph, shell, &outputs, chain, out_tensor, &out_dims, dtype)?;
        Ok(id)
    }
}

/// Static window geometry shared by every tap.
struct ConvGeometry {
    kernel: Vec<usize>,
    strides: Vec<i64>,
    dilations: Vec<i64>,
    pads_begin: Vec<i64>,
    input_spatial: Vec<i64>,
    channels_per_group: usize,
    features_per_group: usize,
    padded: bool,
}

impl ConvGeometry {
    fn resolve(op: &OperationNode, x_dims: &[usize], w_dims: &[usize], spatial: usize) -> Result<Self> {
        let channels = x_dims[1];
        let features = w_dims[0];
        let group = op.attr_i64("group").unwrap_or(1).max(1) as usize;
        if channels % group != 0 || features % group != 0 || w_dims[1] != channels / group {
            return GroupChannelMismatchSnafu { name: op.name.clone(), group, channels, features }.fail();
        }

        let kernel = w_dims[2..].to_vec();
        let strides = op.attr_ints("strides").map(<[i64]>::to_vec).unwrap_or_else(|| vec![1; spatial]);
        let dilations = op.attr_ints("dilations").map(<[i64]>::to_vec).unwrap_or_else(|| vec![1; spatial]);
        let pads = op.attr_ints("pads").map(<[i64]>::to_vec).unwrap_or_else(|| vec![0; 2 * spatial]);
        if strides.len() != spatial || dilations.len() != spatial || pads.len() != 2 * spatial {
            return UnsupportedSnafu {
                name: op.name.clone(),
                reason: "strides/dilations/pads length does not match the spatial rank",
            }
            .fail();
        }

        let padded = pads.iter().any(|&p| p != 0);
        Ok(Self {
            kernel,
            strides,
            dilations,
            pads_begin: pads[..spatial].to_vec(),
            input_spatial: x_dims[2..].iter().map(|&d| d as i64).collect(),
            channels_per_group: channels / group,
            features_per_group: features / group,
            padded,
        })
    }
}

/// One multiply of `x[n, base_c + c, pos...] * w[m, c, tap...]`, gated to
/// zero when any position falls outside the (padded) input.
#[allow(clippy::too_many_arguments)]
fn conv_tap(
    body: &mut BodyBuilder<'_>,
    geom: &ConvGeometry,
    x: NodeId,
    x_dims: &[usize],
    w: NodeId,
    w_dims: &[usize],
    n: NodeId,
    m: NodeId,
    base_c: NodeId,
    c: usize,
    out_sp: &[NodeId],
    tap: &[usize],
    dtype: loft_dtype::DataType,
) -> Result<NodeId> {
    use loft_dtype::DataType::{Bool, Int64};

    let c_const = body.int_const(c as i64)?;
    let channel = body.scalar_op(OpKind::Add, &[base_c, c_const], Int64)?;

    let mut positions = Vec::with_capacity(out_sp.len());
    let mut inbounds: Option<NodeId> = None;
    for (axis, (&out_idx, &k)) in out_sp.iter().zip(tap).enumerate() {
        // pos = out * stride + k * dilation - pad_begin
        let stride = body.int_const(geom.strides[axis])?;
        let scaled = body.scalar_op(OpKind::Mul, &[out_idx, stride], Int64)?;
        let shift = k as i64 * geom.dilations[axis] - geom.pads_begin[axis];
        let pos = if shift == 0 {
            scaled
        } else {
            let shift = body.int_const(shift)?;
            body.scalar_op(OpKind::Add, &[scaled, shift], Int64)?
        };

        if geom.padded {
            let zero = body.int_const(0)?;
            let extent = body.int_const(geom.input_spatial[axis])?;
            let low = body.scalar_op(OpKind::GreaterOrEqual, &[pos, zero], Bool)?;
            let high = body.scalar_op(OpKind::Less, &[pos, extent], Bool)?;
            let ok = body.scalar_op(OpKind::And, &[low, high], Bool)?;
            inbounds = Some(match inbounds {
                None => ok,
                Some(prev) => body.scalar_op(OpKind::And, &[prev, ok], Bool)?,
            });
            positions.push(body.scalar_op(OpKind::Where, &[ok, pos, zero], Int64)?);
        } else {
            positions.push(pos);
        }
    }

    let mut x_idx = vec![n, channel];
    x_idx.extend(&positions);
    let x_val = body.gather_at(x, &x_idx, x_dims, dtype)?;

    let mut w_idx = vec![m, c_const];
    for &k in tap {
        w_idx.push(body.int_const(k as i64)?);
    }
    let w_val = body.gather_at(w, &w_idx, w_dims, dtype)?;

    let product = body.scalar_op(OpKind::Mul, &[x_val, w_val], dtype)?;
    match inbounds {
        Some(ok) => {
            let zero = body.zero()?;
            body.scalar_op(OpKind::Where, &[ok, product, zero], dtype)
        }
        None => Ok(product),
    }
}
