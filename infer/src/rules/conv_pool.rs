//! Convolution and pooling shape rules.
//!
//! Spatial extents follow the ONNX formula: with `i` the padded input
//! extent, `k` the dilated kernel extent and `s` the stride,
//! `out = floor((i - k) / s) + 1`, or `ceil` when `ceil_mode` is set.

use loft_ir::node::OperationNode;
use loft_ir::shape::Shape;
use loft_ir::Dim;

use crate::engine::{InputInfo, Outputs};
use crate::error::*;
use crate::rules::{first_dtype, single};

/// Conv: `[N, C, *spatial] x [M, C/group, *kernel] -> [N, M, *out]`.
pub(crate) fn conv(op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let (Some(input), Some(weight)) = (
        inputs.first().and_then(|i| i.shape.clone()),
        inputs.get(1).and_then(|i| i.shape.clone()),
    ) else {
        return Ok(single(None, dtype));
    };

    if input.len() < 3 || weight.len() != input.len() {
        return InvalidAttributeSnafu {
            op: op.name.clone(),
            attr: "kernel_shape",
            reason: format!("conv expects matching ranks >= 3, got {} and {}", input.len(), weight.len()),
        }
        .fail();
    }

    let spatial = input.len() - 2;
    let kernel: Vec<i64> = match op.attr_ints("kernel_shape") {
        Some(k) => k.to_vec(),
        // Kernel extents default to the weight's trailing dims.
        None => weight[2..]
            .iter()
            .map(|d| d.as_known().map(|n| n as i64))
            .collect::<Option<Vec<i64>>>()
            .ok_or_else(|| Error::InvalidAttribute {
                op: op.name.clone(),
                attr: "kernel_shape".into(),
                reason: "kernel extents are neither an attribute nor static weight dims".into(),
            })?,
    };

    let mut out = Shape::new();
    out.push(input[0].clone());
    out.push(weight[0].clone());
    spatial_extents(op, &input, &kernel, spatial, false, &mut out)?;
    Ok(single(Some(out), dtype))
}

/// MaxPool / AveragePool: channels pass through, spatial dims shrink by the
/// kernel window. `ceil_mode` rounds partial windows up.
pub(crate) fn pool(op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let Some(input) = inputs.first().and_then(|i| i.shape.clone()) else {
        return Ok(single(None, dtype));
    };

    if input.len() < 3 {
        return InvalidAttributeSnafu {
            op: op.name.clone(),
            attr: "kernel_shape",
            reason: format!("pooling expects rank >= 3, got {}", input.len()),
        }
        .fail();
    }

    let spatial = input.len() - 2;
    let kernel = op
        .attr_ints("kernel_shape")
        .ok_or_else(|| Error::InvalidAttribute {
            op: op.name.clone(),
            attr: "kernel_shape".into(),
            reason: "pooling requires the kernel_shape attribute".into(),
        })?
        .to_vec();
    let ceil = op.attr_i64("ceil_mode").unwrap_or(0) != 0;

    let mut out = Shape::new();
    out.push(input[0].clone());
    out.push(input[1].clone());
    spatial_extents(op, &input, &kernel, spatial, ceil, &mut out)?;
    Ok(single(Some(out), dtype))
}

/// GlobalAveragePool: every spatial dim collapses to 1.
pub(crate) fn global_pool(op: &OperationNode, inputs: &[InputInfo]) -> Result<Outputs> {
    let dtype = first_dtype(inputs);
    let Some(input) = inputs.first().and_then(|i| i.shape.clone()) else {
        return Ok(single(None, dtype));
    };

    if input.len() < 3 {
        return InvalidAttributeSnafu {
            op: op.name.clone(),
            attr: "input",
            reason: format!("global pooling expects rank >= 3, got {}", input.len()),
        }
        .fail();
    }

    let mut out = Shape::new();
    out.push(input[0].clone());
    out.push(input[1].clone());
    for _ in 2..input.len() {
        out.push(Dim::Known(1));
    }
    Ok(single(Some(out), dtype))
}

fn spatial_extents(
    op: &OperationNode,
    input: &Shape,
    kernel: &[i64],
    spatial: usize,
    ceil: bool,
    out: &mut Shape,
) -> Result<()> {
    if kernel.len() != spatial {
        return InvalidAttributeSnafu {
            op: op.name.clone(),
            attr: "kernel_shape",
            reason: format!("expected {spatial} kernel extents, got {}", kernel.len()),
        }
        .fail();
    }

    let strides = op.attr_ints("strides").map(<[i64]>::to_vec).unwrap_or_else(|| vec![1; spatial]);
    let dilations = op.attr_ints("dilations").map(<[i64]>::to_vec).unwrap_or_else(|| vec![1; spatial]);
    let pads = op.attr_ints("pads").map(<[i64]>::to_vec).unwrap_or_else(|| vec![0; 2 * spatial]);
    if strides.len() != spatial || dilations.len() != spatial || pads.len() != 2 * spatial {
        return InvalidAttributeSnafu {
            op: op.name.clone(),
            attr: "strides",
            reason: "strides/dilations/pads length does not match the spatial rank",
        }
        .fail();
    }

    for axis in 0..spatial {
        let Some(extent) = input[axis + 2].as_known() else {
            out.push(input[axis + 2].clone());
            continue;
        };
        let padded = extent as i64 + pads[axis] + pads[axis + spatial];
        let window = dilations[axis] * (kernel[axis] - 1) + 1;
        let span = padded - window;
        if span < 0 || strides[axis] <= 0 {
            return InvalidAttributeSnafu {
                op: op.name.clone(),
                attr: "kernel_shape",
                reason: format!("window {window} does not fit padded extent {padded} on axis {axis}"),
            }
            .fail();
        }
        let len = if ceil { (span + strides[axis] - 1) / strides[axis] } else { span / strides[axis] } + 1;
        out.push(Dim::Known(len as usize));
    }
    Ok(())
}
