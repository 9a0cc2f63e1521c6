//! Mutable state threaded through the builder call tree.

use std::collections::HashMap;

use loft_ir::graph::NodeId;

/// Per-chain lowering state, passed by reference instead of living in a
/// shared cache so a single builder stays reentrant and testable.
#[derive(Debug, Default)]
pub struct LoweringContext {
    /// Operator -> scalar value node already computed for the current
    /// iteration. A fused upstream operator's contribution is built once and
    /// reused by every consumer inside the same body.
    fused: HashMap<NodeId, NodeId>,
}

impl LoweringContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fused_value(&self, op: NodeId) -> Option<NodeId> {
        self.fused.get(&op).copied()
    }

    pub fn memoize(&mut self, op: NodeId, value: NodeId) {
        self.fused.insert(op, value);
    }
}
