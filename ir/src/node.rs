//! Node variants and operator kinds.
//!
//! [`Node`] is a closed sum type: every pass narrows it with the typed
//! accessors on [`Graph`](crate::graph::Graph) and matches [`OpKind`]
//! exhaustively, so an unhandled operator is a compile error rather than a
//! silently taken default branch.

use std::collections::BTreeMap;

use loft_dtype::{DataType, ScalarValue, TensorData};

use crate::graph::NodeId;
use crate::shape::Shape;

/// What role a tensor node plays in its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorKind {
    /// Graph input (or body-graph input such as `iter`/`cond`/`carry`).
    Input,
    /// Graph output (or body-graph output).
    Output,
    /// Value produced and consumed inside the graph.
    Intermediate,
    /// Constant produced by a `Constant` operator or synthesized by a pass.
    Constant,
    /// Weight tensor carried by the model.
    Initializer,
}

/// A value-carrying node.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorNode {
    pub name: String,
    pub kind: TensorKind,
    pub dtype: Option<DataType>,
    pub shape: Option<Shape>,
    /// Embedded payload for constants and initializers.
    pub data: Option<TensorData>,
}

impl TensorNode {
    pub fn new(name: impl Into<String>, kind: TensorKind) -> Self {
        Self { name: name.into(), kind, dtype: None, shape: None, data: None }
    }

    pub fn with_dtype(mut self, dtype: DataType) -> Self {
        self.dtype = Some(dtype);
        self
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn with_data(mut self, data: TensorData) -> Self {
        self.dtype = Some(data.dtype());
        self.data = Some(data);
        self
    }
}

/// Operator type tag.
///
/// Covers the whole-tensor operators the inference and lowering passes
/// understand, plus the scalar-level operators that appear inside lowered
/// loop bodies (the arithmetic/comparison kinds double as both).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum OpKind {
    // Elementwise binary arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Mod,
    Min,
    Max,

    // Comparisons and logic
    Equal,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    And,
    Or,
    Xor,
    Not,
    Where,

    // Elementwise unary
    Neg,
    Abs,
    Sqrt,
    Exp,
    Log,
    Floor,
    Ceil,
    Erf,
    Reciprocal,
    Relu,
    LeakyRelu,
    Sigmoid,
    Tanh,
    Softplus,
    Clip,
    Cast,
    Identity,

    // Matrix
    MatMul,
    Gemm,

    // Movement / geometry
    Transpose,
    Reshape,
    Squeeze,
    Unsqueeze,
    Flatten,
    Expand,
    Concat,
    Slice,
    Pad,
    Gather,
    ScatterElements,

    // Convolution and pooling
    Conv,
    MaxPool,
    AveragePool,
    GlobalAveragePool,

    // Reductions
    ReduceSum,
    ReduceMean,
    ReduceMax,
    ReduceMin,
    ReduceProd,
    ArgMax,
    ArgMin,

    // Generators and metadata
    Shape,
    ConstantOfShape,
    OneHot,
    Range,
    Constant,

    // Control flow and recurrence
    Loop,
    If,
    #[strum(serialize = "LSTM")]
    Lstm,
}

impl OpKind {
    /// Binary operators with elementwise broadcast semantics.
    pub fn is_elementwise_binary(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Sub
                | Self::Mul
                | Self::Div
                | Self::Pow
                | Self::Mod
                | Self::Min
                | Self::Max
                | Self::Equal
                | Self::Less
                | Self::LessOrEqual
                | Self::Greater
                | Self::GreaterOrEqual
                | Self::And
                | Self::Or
                | Self::Xor
        )
    }

    /// Comparison operators (result dtype is Bool).
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Equal | Self::Less | Self::LessOrEqual | Self::Greater | Self::GreaterOrEqual
        )
    }

    /// Unary operators that preserve shape.
    pub fn is_elementwise_unary(self) -> bool {
        matches!(
            self,
            Self::Neg
                | Self::Abs
                | Self::Sqrt
                | Self::Exp
                | Self::Log
                | Self::Floor
                | Self::Ceil
                | Self::Erf
                | Self::Reciprocal
                | Self::Relu
                | Self::LeakyRelu
                | Self::Sigmoid
                | Self::Tanh
                | Self::Softplus
                | Self::Clip
                | Self::Not
                | Self::Cast
                | Self::Identity
        )
    }

    /// Axis reductions lowered by the Reduces builder.
    pub fn is_reduce(self) -> bool {
        matches!(
            self,
            Self::ReduceSum | Self::ReduceMean | Self::ReduceMax | Self::ReduceMin | Self::ReduceProd
        )
    }

    /// Operators that survive lowering: the scalar vocabulary of loop
    /// bodies plus the Loop construct itself.
    pub fn is_scalar_level(self) -> bool {
        self.is_elementwise_binary()
            || self.is_elementwise_unary()
            || matches!(
                self,
                Self::Where | Self::Gather | Self::ScatterElements | Self::Loop | Self::Reshape | Self::Constant
            )
    }
}

/// Attribute value, mirroring the ONNX attribute model.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Ints(Vec<i64>),
    Float(f32),
    Floats(Vec<f32>),
    Str(String),
    Tensor(TensorData),
}

/// Attribute map. `BTreeMap` keeps iteration deterministic.
pub type Attributes = BTreeMap<String, AttrValue>;

/// A computation-carrying node.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationNode {
    pub name: String,
    pub op: OpKind,
    pub attrs: Attributes,
    /// Ordered positional operand slots. `None` marks an absent optional
    /// operand (e.g. Conv without bias, Clip without bounds).
    pub params: Vec<Option<NodeId>>,
}

impl OperationNode {
    pub fn new(name: impl Into<String>, op: OpKind) -> Self {
        Self { name: name.into(), op, attrs: Attributes::new(), params: Vec::new() }
    }

    pub fn with_params(mut self, params: Vec<Option<NodeId>>) -> Self {
        self.params = params;
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    /// Operand at positional slot `index`, if present.
    pub fn param(&self, index: usize) -> Option<NodeId> {
        self.params.get(index).copied().flatten()
    }

    /// All present operands in positional order.
    pub fn present_params(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.params.iter().filter_map(|p| *p)
    }

    pub fn attr_i64(&self, key: &str) -> Option<i64> {
        match self.attrs.get(key) {
            Some(AttrValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn attr_ints(&self, key: &str) -> Option<&[i64]> {
        match self.attrs.get(key) {
            Some(AttrValue::Ints(v)) => Some(v),
            _ => None,
        }
    }

    pub fn attr_f32(&self, key: &str) -> Option<f32> {
        match self.attrs.get(key) {
            Some(AttrValue::Float(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        match self.attrs.get(key) {
            Some(AttrValue::Str(v)) => Some(v),
            _ => None,
        }
    }

    pub fn attr_tensor(&self, key: &str) -> Option<&TensorData> {
        match self.attrs.get(key) {
            Some(AttrValue::Tensor(v)) => Some(v),
            _ => None,
        }
    }
}

/// Scalar literal node, synthesized only inside lowered loop bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantNode {
    pub name: String,
    pub value: ScalarValue,
}

/// Named scalar variable node (loop counter, decomposed axis index),
/// synthesized only inside lowered loop bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableNode {
    pub name: String,
    pub dtype: DataType,
}

/// A graph node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Tensor(TensorNode),
    Operation(OperationNode),
    Constant(ConstantNode),
    Variable(VariableNode),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Self::Tensor(t) => &t.name,
            Self::Operation(o) => &o.name,
            Self::Constant(c) => &c.name,
            Self::Variable(v) => &v.name,
        }
    }

    pub fn as_tensor(&self) -> Option<&TensorNode> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_operation(&self) -> Option<&OperationNode> {
        match self {
            Self::Operation(o) => Some(o),
            _ => None,
        }
    }
}
