//! Average-pooling lowering (AveragePool and GlobalAveragePool).
//!
//! Same window walk as convolution but per channel. The divisor is the
//! fixed kernel size, or the dynamically counted in-bounds taps when
//! `count_include_pad` is unset on a padded pool.

use itertools::Itertools;
use loft_dtype::{DataType, ScalarValue};
use loft_ir::graph::{Graph, NodeId};
use loft_ir::node::OpKind;

use crate::body::BodyBuilder;
use crate::builders::{close_loop, open_loop, required_param, root_output, static_dims, Builder};
use crate::chain::Chain;
use crate::context::LoweringContext;
use crate::error::*;
use crate::pipeline::LowerOptions;

pub struct AveragePoolBuilder;

impl Builder for AveragePoolBuilder {
    fn name(&self) -> &'static str {
        "avgpool"
    }

    fn can_handle(&self, graph: &Graph, chain: &Chain) -> bool {
        graph
            .try_operation(chain.root())
            .is_some_and(|op| matches!(op.op, OpKind::AveragePool | OpKind::GlobalAveragePool))
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
        let x_dims = static_dims(graph, x)?;
        if x_dims.len() < 3 {
            return UnsupportedSnafu { name: op.name, reason: "pooling needs input rank >= 3" }.fail();
        }
        let spatial = x_dims.len() - 2;

        // GlobalAveragePool is a full-extent window with no padding.
        let (kernel, strides, pads, count_include_pad) = if op.op == OpKind::GlobalAveragePool {
            (x_dims[2..].to_vec(), vec![1i64; spatial], vec![0i64; 2 * spatial], true)
        } else {
            let kernel = op
                .attr_ints("kernel_shape")
                .ok_or_else(|| Error::Unsupported {
                    name: op.name.clone(),
                    reason: "pooling requires the kernel_shape attribute".into(),
                })?
                .iter()
                .map(|&k| k as usize)
                .collect();
            let strides = op.attr_ints("strides").map(<[i64]>::to_vec).unwrap_or_else(|| vec![1; spatial]);
            let pads = op.attr_ints("pads").map(<[i64]>::to_vec).unwrap_or_else(|| vec![0; 2 * spatial]);
            (kernel, strides, pads, op.attr_i64("count_include_pad").unwrap_or(0) != 0)
        };
        if kernel.len() != spatial || strides.len() != spatial || pads.len() != 2 * spatial {
            return UnsupportedSnafu {
                name: op.name,
                reason: "kernel/strides/pads length does not match the spatial rank",
            }
            .fail();
        }
        let padded = pads.iter().any(|&p| p != 0);

        let shell = open_loop(graph, total, total, dtype)?;
        let mut body = BodyBuilder::new(graph, shell.loop_op, dtype, total)?;

        let idxs = body.axis_indices(&out_dims)?;
        let (n, c) = (idxs[0], idxs[1]);
        let out_sp = idxs[2..].to_vec();

        let mut sum = None;
        let mut tap_count = None;
        for tap in kernel.iter().map(|&k| 0..k).multi_cartesian_product() {
            let mut positions = Vec::with_capacity(spatial);
            let mut inbounds: Option<NodeId> = None;
            for (axis, (&out_idx, &k)) in out_sp.iter().zip(&tap).enumerate() {
                let stride = body.int_const(strides[axis])?;
                let scaled = body.scalar_op(OpKind::Mul, &[out_idx, stride], DataType::Int64)?;
                let shift = k as i64 - pads[axis];
                let pos = if shift == 0 {
                    scaled
                } else {
                    let shift = body.int_const(shift)?;
                    body.scalar_op(OpKind::Add, &[scaled, shift], DataType::Int64)?
                };

                if padded {
                    let zero = body.int_const(0)?;
                    let extent = body.int_const(x_dims[axis + 2] as i64)?;
                    let low = body.scalar_op(OpKind::GreaterOrEqual, &[pos, zero], DataType::Bool)?;
                    let high = body.scalar_op(OpKind::Less, &[pos, extent], DataType::Bool)?;
                    let ok = body.scalar_op(OpKind::And, &[low, high], DataType::Bool)?;
                    inbounds = Some(match inbounds {
                        None => ok,
                        Some(prev) => body.scalar_op(OpKind::And, &[prev, ok], DataType::Bool)?,
                    });
                    positions.push(body.scalar_op(OpKind::Where, &[ok, pos, zero], DataType::Int64)?);
                } else {
                    positions.push(pos);
                }
            }

            let mut x_idx = vec![n, c];
            x_idx.extend(&positions);
            let mut value = body.gather_at(x, &x_idx, &x_dims, dtype)?;
            if let Some(ok) = inbounds {
                let zero = body.zero()?;
                value = body.scalar_op(OpKind::Where, &[ok, value, zero], dtype)?;

                if !count_include_pad {
                    let one = body.constant(ScalarValue::Float(1.0))?;
                    let none = body.constant(ScalarValue::Float(0.0))?;
                    let counted = body.scalar_op(OpKind::Where, &[ok, one, none], dtype)?;
                    tap_count = Some(match tap_count {
                        None => counted,
                        Some(prev) => body.scalar_op(OpKind::Add, &[prev, counted], dtype)?,
                    });
                }
            }

            sum = Some(match sum {
                None => value,
                Some(prev) => body.scalar_op(OpKind::Add, &[prev, value], dtype)?,
            });
        }

        let sum = match sum {
            Some(v) => v,
            None => body.zero()?,
        };
        let divisor = match tap_count {
            // Unpadded pools (and count_include_pad) divide by the window size.
            None => body.constant(ScalarValue::Float(kernel.iter().product::<usize>() as f64))?,
            Some(counted) => counted,
        };
        let value = body.scalar_op(OpKind::Div, &[sum, divisor], dtype)?;

        let offset = body.iter();
        let outputs = body.finish(value, offset)?;

        let id = shell.loop_op;
        close_loop(graph, shell, &outputs, chain, out_tensor, &out_dims, dtype)?;
        Ok(id)
    }
}
