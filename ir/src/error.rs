use snafu::Snafu;

use crate::graph::{EdgeId, NodeId};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Handle refers to a node that never existed or was removed.
    #[snafu(display("node {id:?} does not exist in the graph"))]
    NodeNotFound { id: NodeId },

    /// Handle refers to an edge that never existed or was removed.
    #[snafu(display("edge {id:?} does not exist in the graph"))]
    EdgeNotFound { id: EdgeId },

    /// Node names must be unique within a graph.
    #[snafu(display("a node named {name:?} already exists"))]
    DuplicateName { name: String },

    /// Edge endpoints must exist before the edge is created.
    #[snafu(display("edge endpoint missing: {src:?} -> {dst:?}"))]
    EndpointMissing { src: NodeId, dst: NodeId },

    /// Variant narrowing failed: expected a tensor node.
    #[snafu(display("node {name:?} is not a tensor node"))]
    NotATensor { name: String },

    /// Variant narrowing failed: expected an operation node.
    #[snafu(display("node {name:?} is not an operation node"))]
    NotAnOperation { name: String },

    /// Variant narrowing failed: expected a scalar constant node.
    #[snafu(display("node {name:?} is not a constant node"))]
    NotAConstant { name: String },

    /// Setting this parent would make a node contain its own ancestor.
    #[snafu(display("containment cycle: {child:?} is an ancestor of {parent:?}"))]
    ContainmentCycle { child: NodeId, parent: NodeId },

    /// Positional operand slot is absent or out of range.
    #[snafu(display("operation {name:?} is missing operand {index}"))]
    MissingOperand { name: String, index: usize },
}
