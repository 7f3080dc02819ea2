//! Element kinds for kernel parameters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Element type of a kernel parameter.
///
/// Complex kinds are stored interleaved (real part first), so a `C64`
/// element occupies two consecutive `f32` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementKind {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    /// complex64: two `f32`
    C64,
    /// complex128: two `f64`
    C128,
}

impl ElementKind {
    /// All element kinds, integers first.
    pub const ALL: [ElementKind; 12] = [
        ElementKind::I8,
        ElementKind::I16,
        ElementKind::I32,
        ElementKind::I64,
        ElementKind::U8,
        ElementKind::U16,
        ElementKind::U32,
        ElementKind::U64,
        ElementKind::F32,
        ElementKind::F64,
        ElementKind::C64,
        ElementKind::C128,
    ];

    /// Size of one element in bytes
    pub fn size_in_bytes(&self) -> usize {
        match self {
            ElementKind::I8 | ElementKind::U8 => 1,
            ElementKind::I16 | ElementKind::U16 => 2,
            ElementKind::I32 | ElementKind::U32 | ElementKind::F32 => 4,
            ElementKind::I64 | ElementKind::U64 | ElementKind::F64 | ElementKind::C64 => 8,
            ElementKind::C128 => 16,
        }
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(
            self,
            ElementKind::I8 | ElementKind::I16 | ElementKind::I32 | ElementKind::I64
        )
    }

    pub fn is_unsigned_integer(&self) -> bool {
        matches!(
            self,
            ElementKind::U8 | ElementKind::U16 | ElementKind::U32 | ElementKind::U64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, ElementKind::F32 | ElementKind::F64)
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, ElementKind::C64 | ElementKind::C128)
    }

    /// Whether values of this kind fit a 32-bit float lane without widening.
    ///
    /// Integers always widen to 64-bit floats.
    pub fn is_single_precision(&self) -> bool {
        matches!(self, ElementKind::F32 | ElementKind::C64)
    }

    /// The real component kind of a complex kind; other kinds map to themselves.
    pub fn real_component(&self) -> ElementKind {
        match self {
            ElementKind::C64 => ElementKind::F32,
            ElementKind::C128 => ElementKind::F64,
            other => *other,
        }
    }

    /// Half-open value range `[min, max + 1)` of an integer kind as `f64`.
    ///
    /// The upper limit is exclusive because `i64::MAX` and `u64::MAX` round up
    /// to the next power of two in `f64`. Returns `None` for float and complex
    /// kinds.
    pub fn integer_bounds(&self) -> Option<(f64, f64)> {
        const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
        const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;
        let bounds = match self {
            ElementKind::I8 => (i8::MIN as f64, i8::MAX as f64 + 1.0),
            ElementKind::I16 => (i16::MIN as f64, i16::MAX as f64 + 1.0),
            ElementKind::I32 => (i32::MIN as f64, i32::MAX as f64 + 1.0),
            ElementKind::I64 => (-TWO_POW_63, TWO_POW_63),
            ElementKind::U8 => (0.0, u8::MAX as f64 + 1.0),
            ElementKind::U16 => (0.0, u16::MAX as f64 + 1.0),
            ElementKind::U32 => (0.0, u32::MAX as f64 + 1.0),
            ElementKind::U64 => (0.0, TWO_POW_64),
            _ => return None,
        };
        Some(bounds)
    }

    /// Conventional lowercase name (`float64`, `complex128`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            ElementKind::I8 => "int8",
            ElementKind::I16 => "int16",
            ElementKind::I32 => "int32",
            ElementKind::I64 => "int64",
            ElementKind::U8 => "uint8",
            ElementKind::U16 => "uint16",
            ElementKind::U32 => "uint32",
            ElementKind::U64 => "uint64",
            ElementKind::F32 => "float32",
            ElementKind::F64 => "float64",
            ElementKind::C64 => "complex64",
            ElementKind::C128 => "complex128",
        }
    }

    /// Type name used in rendered kernel listings
    pub fn c_type(&self) -> &'static str {
        match self {
            ElementKind::I8 => "int8_t",
            ElementKind::I16 => "int16_t",
            ElementKind::I32 => "int32_t",
            ElementKind::I64 => "int64_t",
            ElementKind::U8 => "uint8_t",
            ElementKind::U16 => "uint16_t",
            ElementKind::U32 => "uint32_t",
            ElementKind::U64 => "uint64_t",
            ElementKind::F32 => "float",
            ElementKind::F64 => "double",
            ElementKind::C64 => "cfloat",
            ElementKind::C128 => "cdouble",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ElementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ElementKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| format!("unknown element kind '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(ElementKind::I8.size_in_bytes(), 1);
        assert_eq!(ElementKind::U16.size_in_bytes(), 2);
        assert_eq!(ElementKind::F32.size_in_bytes(), 4);
        assert_eq!(ElementKind::C64.size_in_bytes(), 8);
        assert_eq!(ElementKind::C128.size_in_bytes(), 16);
    }

    #[test]
    fn test_classification() {
        assert!(ElementKind::I32.is_integer());
        assert!(ElementKind::U64.is_unsigned_integer());
        assert!(!ElementKind::F64.is_integer());
        assert!(ElementKind::C64.is_complex());
        assert!(ElementKind::C64.is_single_precision());
        assert!(!ElementKind::I8.is_single_precision());
        assert_eq!(ElementKind::C128.real_component(), ElementKind::F64);
    }

    #[test]
    fn test_name_round_trip() {
        for kind in ElementKind::ALL {
            assert_eq!(kind.name().parse::<ElementKind>().unwrap(), kind);
        }
        assert!("float16".parse::<ElementKind>().is_err());
    }

    #[test]
    fn test_integer_bounds() {
        assert_eq!(ElementKind::U8.integer_bounds(), Some((0.0, 256.0)));
        assert_eq!(ElementKind::I16.integer_bounds(), Some((-32768.0, 32768.0)));
        assert_eq!(ElementKind::I64.integer_bounds(), Some((-(2f64.powi(63)), 2f64.powi(63))));
        assert_eq!(ElementKind::U64.integer_bounds(), Some((0.0, 2f64.powi(64))));
        assert_eq!(ElementKind::F32.integer_bounds(), None);
    }
}
