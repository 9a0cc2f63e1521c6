//! Graph intermediate representation for the loft compiler.
//!
//! The IR is an arena of typed nodes and directed edges. Tensor nodes carry
//! values, operation nodes carry computations, and the lightweight
//! constant/variable nodes appear inside lowered loop bodies. Nested
//! subgraphs (Loop/If bodies) are expressed through an acyclic parent
//! relation on the arena entries rather than through separately owned graph
//! objects.
//!
//! # Module Organization
//!
//! - [`shape`] - Dimension and shape types
//! - [`node`] - Node variants, operator kinds, attributes
//! - [`graph`] - The arena graph and its mutation API
//! - [`topo`] - Topological sort with implicit body-capture dependencies
//! - [`indexing`] - Mixed-radix flat-index arithmetic
//! - [`error`] - Error types and result handling

pub mod error;
pub mod graph;
pub mod indexing;
pub mod node;
pub mod shape;
pub mod topo;


pub use error::{Error, Result};
pub use graph::{Edge, EdgeId, Graph, NodeId};
pub use node::{
    AttrValue, Attributes, ConstantNode, Node, OpKind, OperationNode, TensorKind, TensorNode, VariableNode,
};
pub use shape::{Dim, Shape};
pub use topo::{toposort, toposort_body};

// Re-export external types for convenience
pub use loft_dtype::{DataType, ScalarValue, TensorData};
