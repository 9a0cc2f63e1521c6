//! Loop lowering: rewrites whole-tensor operators into a single bounded
//! [`Loop`](loft_ir::OpKind::Loop) node with a scalar body graph.
//!
//! The pipeline walks operator chains in topological order, picks the first
//! builder strategy that accepts each chain, and replaces the chain with a
//! Loop whose body decodes the flat iteration counter into per-axis indices,
//! gathers scalars from the operand tensors, computes the chain's scalar
//! contribution, and scatters it into the loop-carried output buffer. Shape
//! inference re-runs after every rewrite so downstream chains see the
//! lowered graph.
//!
//! # Module Organization
//!
//! - [`chain`] - Fusable operator chain discovery
//! - [`context`] - Mutable lowering context threaded through builders
//! - [`body`] - Scalar body-graph scaffolding shared by all builders
//! - [`builders`] - Per-operator-class builder strategies
//! - [`pipeline`] - The orchestrator
//! - [`error`] - Error types and result handling

pub mod body;
pub mod builders;
pub mod chain;
pub mod context;
pub mod error;
pub mod pipeline;


pub use chain::Chain;
pub use context::LoweringContext;
pub use error::{Error, Result};
pub use pipeline::{lower_graph, LowerOptions};
