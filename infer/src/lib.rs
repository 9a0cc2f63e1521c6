//! Shape and dtype inference.
//!
//! Walks operator nodes in topological order, resolves every input's
//! (shape, dtype) from the edges feeding it, applies a per-operator
//! geometric rule mirroring the ONNX semantics, and rewires the operator's
//! outgoing edges with the inferred values. Recoverable conditions
//! (broadcast mismatches, missing shapes) are recorded in a [`Diagnostics`]
//! collector and logged; genuinely malformed constructs (a Reshape with two
//! inferred dims) abort the pass with an error.

pub mod broadcast;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod rules;

#[cfg(test)]
mod test;

pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use engine::{infer_body, infer_graph};
pub use error::{Error, Result};
