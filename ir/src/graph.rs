//! The arena graph.
//!
//! Nodes and edges live in slot arenas addressed by stable integer handles.
//! Removal frees a slot instead of shifting data, so handles held elsewhere
//! stay valid until their slot is reused; touching a freed slot is a defined
//! [`Error::NodeNotFound`]/[`Error::EdgeNotFound`], never undefined behavior.
//!
//! Invariants enforced at mutation time:
//! - edge endpoints must exist when the edge is created;
//! - node names are unique within the graph;
//! - the parent relation is acyclic (`set_parent` rejects descendants).

use std::collections::HashMap;

use loft_dtype::DataType;
use snafu::ensure;

use crate::error::*;
use crate::node::{ConstantNode, Node, OperationNode, TensorNode, VariableNode};
use crate::shape::Shape;

/// Stable handle to a node slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

/// Stable handle to an edge slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub(crate) u32);

/// Directed edge. The carried (dtype, shape) pair is the authoritative
/// propagation channel during shape inference; `order` serializes otherwise
/// unordered body wiring into a deterministic instruction sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub src: NodeId,
    pub dst: NodeId,
    pub dtype: Option<DataType>,
    pub shape: Option<Shape>,
    pub order: Option<u32>,
}

#[derive(Debug, Clone)]
struct NodeSlot {
    node: Node,
    parent: Option<NodeId>,
    incoming: Vec<EdgeId>,
    outgoing: Vec<EdgeId>,
}

/// Owner of the node and edge arenas plus the containment relation.
#[derive(Debug, Default, Clone)]
pub struct Graph {
    nodes: Vec<Option<NodeSlot>>,
    edges: Vec<Option<Edge>>,
    names: HashMap<String, NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Node creation
    // =========================================================================

    /// Insert a node. Fails if another live node already carries the name.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId> {
        let name = node.name().to_string();
        ensure!(!self.names.contains_key(&name), DuplicateNameSnafu { name });

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(NodeSlot { node, parent: None, incoming: Vec::new(), outgoing: Vec::new() }));
        self.names.insert(name, id);
        Ok(id)
    }

    pub fn add_tensor(&mut self, tensor: TensorNode) -> Result<NodeId> {
        self.add_node(Node::Tensor(tensor))
    }

    pub fn add_operation(&mut self, op: OperationNode) -> Result<NodeId> {
        self.add_node(Node::Operation(op))
    }

    pub fn add_constant(&mut self, constant: ConstantNode) -> Result<NodeId> {
        self.add_node(Node::Constant(constant))
    }

    pub fn add_variable(&mut self, variable: VariableNode) -> Result<NodeId> {
        self.add_node(Node::Variable(variable))
    }

    // =========================================================================
    // Node access
    // =========================================================================

    fn slot(&self, id: NodeId) -> Result<&NodeSlot> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref).ok_or(Error::NodeNotFound { id })
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut NodeSlot> {
        self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut).ok_or(Error::NodeNotFound { id })
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        Ok(&self.slot(id)?.node)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        Ok(&mut self.slot_mut(id)?.node)
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.nodes.get(id.0 as usize).is_some_and(Option::is_some)
    }

    /// Narrow to a tensor node; a wrong variant is a defined error.
    pub fn tensor(&self, id: NodeId) -> Result<&TensorNode> {
        match self.node(id)? {
            Node::Tensor(t) => Ok(t),
            other => NotATensorSnafu { name: other.name() }.fail(),
        }
    }

    pub fn tensor_mut(&mut self, id: NodeId) -> Result<&mut TensorNode> {
        match self.node_mut(id)? {
            Node::Tensor(t) => Ok(t),
            other => NotATensorSnafu { name: other.name() }.fail(),
        }
    }

    pub fn try_tensor(&self, id: NodeId) -> Option<&TensorNode> {
        self.node(id).ok().and_then(Node::as_tensor)
    }

    pub fn operation(&self, id: NodeId) -> Result<&OperationNode> {
        match self.node(id)? {
            Node::Operation(o) => Ok(o),
            other => NotAnOperationSnafu { name: other.name() }.fail(),
        }
    }

    pub fn operation_mut(&mut self, id: NodeId) -> Result<&mut OperationNode> {
        match self.node_mut(id)? {
            Node::Operation(o) => Ok(o),
            other => NotAnOperationSnafu { name: other.name() }.fail(),
        }
    }

    pub fn try_operation(&self, id: NodeId) -> Option<&OperationNode> {
        self.node(id).ok().and_then(Node::as_operation)
    }

    pub fn constant(&self, id: NodeId) -> Result<&ConstantNode> {
        match self.node(id)? {
            Node::Constant(c) => Ok(c),
            other => NotAConstantSnafu { name: other.name() }.fail(),
        }
    }

    pub fn is_operation(&self, id: NodeId) -> bool {
        self.try_operation(id).is_some()
    }

    /// Look a node up by name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// All live node ids in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, slot)| slot.as_ref().map(|_| NodeId(i as u32)))
    }

    /// Live operation nodes without a parent, in creation order.
    pub fn top_level_operations(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| {
                self.is_operation(id) && self.parent(id).ok().flatten().is_none()
            })
            .collect()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.iter().filter(|s| s.is_some()).count()
    }

    /// Probe `base`, `base_1`, `base_2`, ... until an unused name is found.
    /// Synthesized names must be collision-free across passes.
    pub fn fresh_name(&self, base: &str) -> String {
        if !self.names.contains_key(base) {
            return base.to_string();
        }
        let mut n = 1usize;
        loop {
            let candidate = format!("{base}_{n}");
            if !self.names.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    // =========================================================================
    // Edges
    // =========================================================================

    /// Create an edge. Both endpoints must exist.
    pub fn add_edge(&mut self, src: NodeId, dst: NodeId) -> Result<EdgeId> {
        self.add_edge_with(src, dst, None, None, None)
    }

    pub fn add_edge_with(
        &mut self,
        src: NodeId,
        dst: NodeId,
        dtype: Option<DataType>,
        shape: Option<Shape>,
        order: Option<u32>,
    ) -> Result<EdgeId> {
        ensure!(self.has_node(src) && self.has_node(dst), EndpointMissingSnafu { src, dst });

        let id = EdgeId(self.edges.len() as u32);
        self.edges.push(Some(Edge { src, dst, dtype, shape, order }));
        self.slot_mut(src)?.outgoing.push(id);
        self.slot_mut(dst)?.incoming.push(id);
        Ok(id)
    }

    pub fn edge(&self, id: EdgeId) -> Result<&Edge> {
        self.edges.get(id.0 as usize).and_then(Option::as_ref).ok_or(Error::EdgeNotFound { id })
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Result<&mut Edge> {
        self.edges.get_mut(id.0 as usize).and_then(Option::as_mut).ok_or(Error::EdgeNotFound { id })
    }

    /// Remove an edge and detach it from both endpoint slots.
    pub fn remove_edge(&mut self, id: EdgeId) -> Result<Edge> {
        let edge = self.edges.get_mut(id.0 as usize).and_then(Option::take).ok_or(Error::EdgeNotFound { id })?;
        if let Ok(slot) = self.slot_mut(edge.src) {
            slot.outgoing.retain(|&e| e != id);
        }
        if let Ok(slot) = self.slot_mut(edge.dst) {
            slot.incoming.retain(|&e| e != id);
        }
        Ok(edge)
    }

    /// Edges into `id`, in insertion order.
    pub fn incoming(&self, id: NodeId) -> Result<Vec<EdgeId>> {
        Ok(self.slot(id)?.incoming.clone())
    }

    /// Edges out of `id`, in insertion order.
    pub fn outgoing(&self, id: NodeId) -> Result<Vec<EdgeId>> {
        Ok(self.slot(id)?.outgoing.clone())
    }

    /// The operation node producing a tensor, if any: the source of the
    /// tensor's incoming edge from an operation.
    pub fn producer(&self, tensor: NodeId) -> Result<Option<NodeId>> {
        for eid in &self.slot(tensor)?.incoming {
            let edge = self.edge(*eid)?;
            if self.is_operation(edge.src) {
                return Ok(Some(edge.src));
            }
        }
        Ok(None)
    }

    /// Operation nodes consuming a tensor.
    pub fn consumers(&self, tensor: NodeId) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        for eid in &self.slot(tensor)?.outgoing {
            let edge = self.edge(*eid)?;
            if self.is_operation(edge.dst) && !out.contains(&edge.dst) {
                out.push(edge.dst);
            }
        }
        Ok(out)
    }

    // =========================================================================
    // Node removal
    // =========================================================================

    /// Remove a node, all its incident edges, and its name-index entry.
    /// Children of the removed node are reattached to its parent.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        let incident: Vec<EdgeId> = {
            let slot = self.slot(id)?;
            slot.incoming.iter().chain(slot.outgoing.iter()).copied().collect()
        };
        for eid in incident {
            // An edge may appear in both lists (self-edge); removal of a
            // removed edge is not an error here.
            let _ = self.remove_edge(eid);
        }

        let grandparent = self.slot(id)?.parent;
        let orphans: Vec<NodeId> = self.children(id);
        for child in orphans {
            self.slot_mut(child)?.parent = grandparent;
        }

        let slot = self.nodes.get_mut(id.0 as usize).and_then(Option::take).ok_or(Error::NodeNotFound { id })?;
        self.names.remove(slot.node.name());
        Ok(slot.node)
    }

    // =========================================================================
    // Containment
    // =========================================================================

    /// Attach `child` under `parent` (or detach with `None`). Rejects
    /// making a node the child of its own descendant.
    pub fn set_parent(&mut self, child: NodeId, parent: Option<NodeId>) -> Result<()> {
        if let Some(parent) = parent {
            ensure!(self.has_node(parent), NodeNotFoundSnafu { id: parent });
            // Walk up from the prospective parent; hitting `child` means the
            // new link would close a containment cycle.
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                ensure!(current != child, ContainmentCycleSnafu { child, parent });
                cursor = self.slot(current)?.parent;
            }
        }
        self.slot_mut(child)?.parent = parent;
        Ok(())
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.slot(id)?.parent)
    }

    /// Direct children of a node, in creation order.
    pub fn children(&self, parent: NodeId) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| self.slot(id).is_ok_and(|s| s.parent == Some(parent)))
            .collect()
    }
}
