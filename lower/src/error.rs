use loft_ir::node::OpKind;
use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// No builder strategy accepted the chain rooted at this operator.
    #[snafu(display("no lowering builder handles operator {op} ({name:?})"))]
    NoBuilder { op: OpKind, name: String },

    /// Lowering needs fully static extents.
    #[snafu(display("operator {name:?} has no static shape for {what}"))]
    DynamicShape { name: String, what: &'static str },

    /// Grouped convolution with a channel count the group does not divide.
    #[snafu(display("conv {name:?}: group {group} does not divide channels {channels}/{features}"))]
    GroupChannelMismatch { name: String, group: usize, channels: usize, features: usize },

    /// Operator is missing a required operand.
    #[snafu(display("operator {name:?} is missing required operand {index}"))]
    MissingOperand { name: String, index: usize },

    /// Attribute or operand has an unsupported value for lowering.
    #[snafu(display("operator {name:?} cannot be lowered: {reason}"))]
    Unsupported { name: String, reason: String },

    /// Underlying graph error.
    #[snafu(context(false), display("graph error: {source}"))]
    Graph { source: loft_ir::Error },

    /// Re-inference after a lowering step failed.
    #[snafu(context(false), display("inference error: {source}"))]
    Infer { source: loft_infer::Error },
}
