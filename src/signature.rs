//! Argument type signatures
//!
//! A [`TypeSignature`] is what the compiler specializes on: element kind,
//! rank and memory layout. Shapes are deliberately not part of it, so one
//! compiled kernel serves every shape of the same rank.

use crate::ast::ElementKind;
use crate::error::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Memory order of an array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Layout {
    /// C order: the last axis varies fastest
    RowMajor,
    /// Fortran order: the first axis varies fastest
    ColumnMajor,
}

impl Layout {
    /// Single-letter code (`C` / `F`)
    pub fn code(&self) -> char {
        match self {
            Layout::RowMajor => 'C',
            Layout::ColumnMajor => 'F',
        }
    }

    /// Element strides (not bytes) of a contiguous array of `shape` in this layout
    pub fn strides(&self, shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![0; shape.len()];
        let mut acc = 1;
        match self {
            Layout::RowMajor => {
                for (stride, dim) in strides.iter_mut().zip(shape).rev() {
                    *stride = acc;
                    acc *= *dim;
                }
            }
            Layout::ColumnMajor => {
                for (stride, dim) in strides.iter_mut().zip(shape) {
                    *stride = acc;
                    acc *= *dim;
                }
            }
        }
        strides
    }
}

/// Element kind, rank and layout of one kernel argument.
///
/// Immutable once built. Scalars have rank 0 and no layout; rank-1 arrays
/// are always row-major since both orders coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeSignature {
    kind: ElementKind,
    rank: usize,
    layout: Option<Layout>,
}

impl TypeSignature {
    pub fn scalar(kind: ElementKind) -> Self {
        Self {
            kind,
            rank: 0,
            layout: None,
        }
    }

    /// An array signature. `rank == 0` yields the scalar signature.
    pub fn array(kind: ElementKind, rank: usize, layout: Layout) -> Self {
        let layout = match rank {
            0 => None,
            1 => Some(Layout::RowMajor),
            _ => Some(layout),
        };
        Self { kind, rank, layout }
    }

    /// Describe a native value from its shape and element strides.
    ///
    /// Contiguous row-major data is `C`, contiguous column-major data is `F`.
    /// Anything else is rejected; callers gather such data first.
    pub fn describe(
        kind: ElementKind,
        shape: &[usize],
        strides: &[isize],
    ) -> Result<Self, TypeError> {
        if shape.len() != strides.len() {
            return Err(TypeError::InvalidShape {
                shape: shape.to_vec(),
                reason: format!("{} strides for {} dimensions", strides.len(), shape.len()),
            });
        }
        if shape.is_empty() {
            return Ok(Self::scalar(kind));
        }
        for layout in [Layout::RowMajor, Layout::ColumnMajor] {
            if strides_match(shape, strides, &layout.strides(shape)) {
                return Ok(Self::array(kind, shape.len(), layout));
            }
        }
        Err(TypeError::InvalidShape {
            shape: shape.to_vec(),
            reason: format!("strides {:?} are not contiguous", strides),
        })
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn layout(&self) -> Option<Layout> {
        self.layout
    }

    pub fn is_scalar(&self) -> bool {
        self.rank == 0
    }

    pub fn is_array(&self) -> bool {
        self.rank > 0
    }
}

// Axes of length 1 may carry any stride.
fn strides_match(shape: &[usize], actual: &[isize], expected: &[usize]) -> bool {
    shape
        .iter()
        .zip(actual.iter().zip(expected))
        .all(|(&dim, (&a, &e))| dim <= 1 || a == e as isize)
}

impl fmt::Display for TypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.layout {
            None => write!(f, "{}", self.kind),
            Some(layout) => write!(f, "array({}, {}d, {})", self.kind, self.rank, layout.code()),
        }
    }
}

/// Render a signature list as `(sig, sig, ...)`
pub fn format_signatures(signatures: &[TypeSignature]) -> String {
    let parts: Vec<String> = signatures.iter().map(|s| s.to_string()).collect();
    format!("({})", parts.join(", "))
}
