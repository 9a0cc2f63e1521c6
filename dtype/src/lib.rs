//! ONNX element types and constant payloads.
//!
//! This crate defines the [`DataType`] enumeration mirroring the ONNX
//! `TensorProto.DataType` wire values, dtype promotion for binary operators,
//! and [`TensorData`], the typed payload embedded in constant and initializer
//! tensors.

pub mod data;

pub use data::{ScalarValue, TensorData};

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Unknown ONNX DataType wire value.
    #[snafu(display("unknown ONNX element type code {code}"))]
    UnknownElementType { code: i32 },

    /// No common promotion type exists.
    #[snafu(display("no common type for {lhs} and {rhs}"))]
    NoCommonType { lhs: DataType, rhs: DataType },
}

/// Tensor element type, with discriminants matching the ONNX
/// `TensorProto.DataType` enumeration (FLOAT=1, UINT8=2, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumIter, strum::FromRepr)]
#[repr(i32)]
pub enum DataType {
    Float = 1,
    Uint8 = 2,
    Int8 = 3,
    Uint16 = 4,
    Int16 = 5,
    Int32 = 6,
    Int64 = 7,
    String = 8,
    Bool = 9,
    Float16 = 10,
    Double = 11,
    Uint32 = 12,
    Uint64 = 13,
}

impl DataType {
    /// Decode an ONNX wire value.
    pub fn from_onnx(code: i32) -> Result<Self> {
        Self::from_repr(code).ok_or(Error::UnknownElementType { code })
    }

    /// The ONNX wire value of this type.
    pub const fn onnx_code(self) -> i32 {
        self as i32
    }

    pub const fn bytes(self) -> usize {
        match self {
            Self::Bool | Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 | Self::Float16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float => 4,
            Self::Int64 | Self::Uint64 | Self::Double => 8,
            Self::String => 0,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Float16 | Self::Double)
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub const fn is_unsigned(self) -> bool {
        matches!(self, Self::Uint8 | Self::Uint16 | Self::Uint32 | Self::Uint64)
    }

    pub const fn is_int(self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    /// Promotion rank: higher rank wins in binary-operator promotion.
    /// Floats outrank integers of any width, wider outranks narrower,
    /// signed outranks unsigned at equal width.
    const fn rank(self) -> u8 {
        match self {
            Self::Bool => 0,
            Self::Uint8 => 1,
            Self::Int8 => 2,
            Self::Uint16 => 3,
            Self::Int16 => 4,
            Self::Uint32 => 5,
            Self::Int32 => 6,
            Self::Uint64 => 7,
            Self::Int64 => 8,
            Self::Float16 => 9,
            Self::Float => 10,
            Self::Double => 11,
            Self::String => 12,
        }
    }

    /// Result type of a binary arithmetic operator on `lhs` and `rhs`.
    pub fn promote(lhs: Self, rhs: Self) -> Result<Self> {
        if lhs == Self::String || rhs == Self::String {
            return if lhs == rhs { Ok(lhs) } else { NoCommonTypeSnafu { lhs, rhs }.fail() };
        }
        Ok(if lhs.rank() >= rhs.rank() { lhs } else { rhs })
    }
}
