use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Reshape target may contain at most one -1.
    #[snafu(display("reshape target {target:?} contains more than one inferred (-1) dimension"))]
    ReshapeMultipleInferred { target: Vec<i64> },

    /// Reshape must conserve the total element count.
    #[snafu(display("reshape size mismatch: input has {input_size} elements, target {target:?} resolves to {target_size}"))]
    ReshapeSizeMismatch { input_size: usize, target: Vec<i64>, target_size: usize },

    /// Reshape target dimensions must be >= -1.
    #[snafu(display("reshape target {target:?} contains an invalid dimension"))]
    ReshapeInvalidDimension { target: Vec<i64> },

    /// Operator is missing a required operand.
    #[snafu(display("operator {op:?} is missing required operand {index}"))]
    MissingOperand { op: String, index: usize },

    /// Attribute has the wrong type or an out-of-range value.
    #[snafu(display("operator {op:?} has invalid attribute {attr:?}: {reason}"))]
    InvalidAttribute { op: String, attr: String, reason: String },

    /// Axis outside the valid range for the operand rank.
    #[snafu(display("operator {op:?}: axis {axis} is out of range for rank {rank}"))]
    AxisOutOfRange { op: String, axis: i64, rank: usize },

    /// Underlying graph error.
    #[snafu(context(false), display("graph error: {source}"))]
    Graph { source: loft_ir::Error },
}
