//! Typed constant payloads embedded in tensor nodes.

use crate::DataType;

/// A single scalar literal, as carried by the lightweight constant nodes
/// synthesized inside lowered loop bodies.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ScalarValue {
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Int(_) => DataType::Int64,
            Self::Float(_) => DataType::Float,
            Self::Bool(_) => DataType::Bool,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// Raw typed data embedded in constant/initializer tensors.
///
/// Shape inference reads integer payloads through [`TensorData::as_i64s`]
/// (Reshape targets, Slice starts/ends, axes lists); lowering reads scalar
/// bounds through the same view (Range start/limit/delta).
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl TensorData {
    pub fn dtype(&self) -> DataType {
        match self {
            Self::F32(_) => DataType::Float,
            Self::F64(_) => DataType::Double,
            Self::I32(_) => DataType::Int32,
            Self::I64(_) => DataType::Int64,
            Self::U8(_) => DataType::Uint8,
            Self::Bool(_) => DataType::Bool,
            Self::Str(_) => DataType::String,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widening integer view of the payload. `None` for float/string data:
    /// callers that need geometry (shapes, axes, indices) must not silently
    /// round floats.
    pub fn as_i64s(&self) -> Option<Vec<i64>> {
        match self {
            Self::I64(v) => Some(v.clone()),
            Self::I32(v) => Some(v.iter().map(|&x| i64::from(x)).collect()),
            Self::U8(v) => Some(v.iter().map(|&x| i64::from(x)).collect()),
            Self::Bool(v) => Some(v.iter().map(|&x| i64::from(x)).collect()),
            Self::F32(_) | Self::F64(_) | Self::Str(_) => None,
        }
    }

    /// Lossy float view of numeric payloads.
    pub fn as_f32s(&self) -> Option<Vec<f32>> {
        match self {
            Self::F32(v) => Some(v.clone()),
            Self::F64(v) => Some(v.iter().map(|&x| x as f32).collect()),
            Self::I32(v) => Some(v.iter().map(|&x| x as f32).collect()),
            Self::I64(v) => Some(v.iter().map(|&x| x as f32).collect()),
            Self::U8(v) => Some(v.iter().map(|&x| f32::from(x)).collect()),
            Self::Bool(_) | Self::Str(_) => None,
        }
    }

    /// First element as a scalar, if the payload is a singleton.
    pub fn as_scalar(&self) -> Option<ScalarValue> {
        if self.len() != 1 {
            return None;
        }
        Some(match self {
            Self::F32(v) => ScalarValue::Float(f64::from(v[0])),
            Self::F64(v) => ScalarValue::Float(v[0]),
            Self::I32(v) => ScalarValue::Int(i64::from(v[0])),
            Self::I64(v) => ScalarValue::Int(v[0]),
            Self::U8(v) => ScalarValue::Int(i64::from(v[0])),
            Self::Bool(v) => ScalarValue::Bool(v[0]),
            Self::Str(_) => return None,
        })
    }

    pub fn scalar_i64(value: i64) -> Self {
        Self::I64(vec![value])
    }

    pub fn scalar_f32(value: f32) -> Self {
        Self::F32(vec![value])
    }

    pub fn scalar_bool(value: bool) -> Self {
        Self::Bool(vec![value])
    }

    /// Zero-filled buffer of `len` elements. Non-numeric types get their
    /// additive identity equivalents (false / empty string).
    pub fn zeros(dtype: DataType, len: usize) -> Self {
        match dtype {
            DataType::Float | DataType::Float16 => Self::F32(vec![0.0; len]),
            DataType::Double => Self::F64(vec![0.0; len]),
            DataType::Int32 | DataType::Int16 | DataType::Int8 | DataType::Uint16 | DataType::Uint32 => {
                Self::I32(vec![0; len])
            }
            DataType::Int64 | DataType::Uint64 => Self::I64(vec![0; len]),
            DataType::Uint8 => Self::U8(vec![0; len]),
            DataType::Bool => Self::Bool(vec![false; len]),
            DataType::String => Self::Str(vec![String::new(); len]),
        }
    }
}
