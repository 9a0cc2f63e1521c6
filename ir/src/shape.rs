//! Dimension and shape types.
//!
//! A dimension is either a known non-negative extent or a symbolic marker
//! (named batch dims, unresolved dims). Shapes use `SmallVec` with inline
//! capacity of 4: tensor ranks 1-4 cover almost all model graphs.

use smallvec::SmallVec;

/// One tensor dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Dim {
    /// Statically known extent.
    Known(usize),
    /// Symbolic or unknown extent, carrying the model's marker name
    /// (e.g. `"batch_size"`, or an empty string for fully unknown dims).
    Symbolic(String),
}

impl Dim {
    pub fn as_known(&self) -> Option<usize> {
        match self {
            Self::Known(n) => Some(*n),
            Self::Symbolic(_) => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

impl From<usize> for Dim {
    fn from(n: usize) -> Self {
        Self::Known(n)
    }
}

impl std::fmt::Display for Dim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Known(n) => write!(f, "{n}"),
            Self::Symbolic(name) if name.is_empty() => write!(f, "?"),
            Self::Symbolic(name) => write!(f, "{name}"),
        }
    }
}

/// Shape type - ordered sequence of dimensions.
pub type Shape = SmallVec<[Dim; 4]>;

/// Build a fully known shape from extents.
pub fn from_dims(dims: &[usize]) -> Shape {
    dims.iter().map(|&d| Dim::Known(d)).collect()
}

/// Check if every dimension is statically known.
pub fn is_static(shape: &Shape) -> bool {
    shape.iter().all(Dim::is_known)
}

/// Concrete extents if the shape is fully static.
pub fn to_static(shape: &Shape) -> Option<SmallVec<[usize; 4]>> {
    shape.iter().map(Dim::as_known).collect()
}

/// Total element count if the shape is fully static. A rank-0 shape has
/// one element.
pub fn numel(shape: &Shape) -> Option<usize> {
    shape.iter().map(Dim::as_known).try_fold(1usize, |acc, d| d.map(|d| acc * d))
}

/// Render a shape as `[2, 3, ?]` for diagnostics.
pub fn display(shape: &Shape) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    format!("[{}]", dims.join(", "))
}
