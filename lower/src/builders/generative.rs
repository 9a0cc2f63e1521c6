//! Range lowering: `value = start + iter * delta`.

use loft_dtype::ScalarValue;
use loft_ir::graph::{Graph, NodeId};
use loft_ir::node::OpKind;

use crate::body::BodyBuilder;
use crate::builders::{close_loop, open_loop, required_param, root_output, Builder};
use crate::chain::Chain;
use crate::context::LoweringContext;
use crate::error::*;
use crate::pipeline::LowerOptions;

pub struct GenerativeBuilder;

impl Builder for GenerativeBuilder {
    fn name(&self) -> &'static str {
        "generative"
    }

    fn can_handle(&self, graph: &Graph, chain: &Chain) -> bool {
        graph.try_operation(chain.root()).is_some_and(|op| op.op == OpKind::Range)
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

        let start = scalar_operand(graph, root, 0)?;
        let delta = scalar_operand(graph, root, 2)?;

        let shell = open_loop(graph, total, total, dtype)?;
        let mut body = BodyBuilder::new(graph, shell.loop_op, dtype, total)?;

        let start = body.constant(start)?;
        let delta = body.constant(delta)?;
        let step = body.scalar_op(OpKind::Mul, &[body.iter(), delta], dtype)?;
        let value = body.scalar_op(OpKind::Add, &[start, step], dtype)?;

        let offset = body.iter();
        let outputs = body.finish(value, offset)?;

        let id = shell.loop_op;
        close_loop(graph, shell, &outputs, chain, out_tensor, &out_dims, dtype)?;
        Ok(id)
    }
}

/// The embedded scalar payload of a constant operand.
fn scalar_operand(graph: &Graph, op: NodeId, index: usize) -> Result<ScalarValue> {
    let tensor = required_param(graph, op, index)?;
    let name = graph.operation(op)?.name.clone();
    graph
        .tensor(tensor)?
        .data
        .as_ref()
        .and_then(|d| d.as_scalar())
        .ok_or_else(|| Error::Unsupported {
            name,
            reason: format!("range operand {index} is not a constant scalar"),
        })
}
