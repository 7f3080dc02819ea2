//! The transcendental function family a kernel may call

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad domain class of a [`MathFn`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FnClass {
    Trigonometric,
    InverseTrigonometric,
    Hyperbolic,
    InverseHyperbolic,
    /// Two-argument real functions (`arctan2`, `hypot`)
    BinaryReal,
    AngleConversion,
}

/// Elementwise math function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MathFn {
    Sin,
    Cos,
    Tan,
    Arcsin,
    Arccos,
    Arctan,
    Arctan2,
    Hypot,
    Sinh,
    Cosh,
    Tanh,
    Arcsinh,
    Arccosh,
    Arctanh,
    Deg2rad,
    Rad2deg,
    Degrees,
    Radians,
}

impl MathFn {
    pub const ALL: [MathFn; 18] = [
        MathFn::Sin,
        MathFn::Cos,
        MathFn::Tan,
        MathFn::Arcsin,
        MathFn::Arccos,
        MathFn::Arctan,
        MathFn::Arctan2,
        MathFn::Hypot,
        MathFn::Sinh,
        MathFn::Cosh,
        MathFn::Tanh,
        MathFn::Arcsinh,
        MathFn::Arccosh,
        MathFn::Arctanh,
        MathFn::Deg2rad,
        MathFn::Rad2deg,
        MathFn::Degrees,
        MathFn::Radians,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
            MathFn::Tan => "tan",
            MathFn::Arcsin => "arcsin",
            MathFn::Arccos => "arccos",
            MathFn::Arctan => "arctan",
            MathFn::Arctan2 => "arctan2",
            MathFn::Hypot => "hypot",
            MathFn::Sinh => "sinh",
            MathFn::Cosh => "cosh",
            MathFn::Tanh => "tanh",
            MathFn::Arcsinh => "arcsinh",
            MathFn::Arccosh => "arccosh",
            MathFn::Arctanh => "arctanh",
            MathFn::Deg2rad => "deg2rad",
            MathFn::Rad2deg => "rad2deg",
            MathFn::Degrees => "degrees",
            MathFn::Radians => "radians",
        }
    }

    /// Look up a function by name. The short C spellings (`asin`, `atan2`, ...)
    /// are accepted as aliases.
    pub fn from_name(name: &str) -> Option<MathFn> {
        if let Some(f) = MathFn::ALL.iter().find(|f| f.name() == name) {
            return Some(*f);
        }
        let f = match name {
            "asin" => MathFn::Arcsin,
            "acos" => MathFn::Arccos,
            "atan" => MathFn::Arctan,
            "atan2" => MathFn::Arctan2,
            "asinh" => MathFn::Arcsinh,
            "acosh" => MathFn::Arccosh,
            "atanh" => MathFn::Arctanh,
            _ => return None,
        };
        Some(f)
    }

    pub fn arity(&self) -> usize {
        match self {
            MathFn::Arctan2 | MathFn::Hypot => 2,
            _ => 1,
        }
    }

    pub fn class(&self) -> FnClass {
        match self {
            MathFn::Sin | MathFn::Cos | MathFn::Tan => FnClass::Trigonometric,
            MathFn::Arcsin | MathFn::Arccos | MathFn::Arctan => FnClass::InverseTrigonometric,
            MathFn::Arctan2 | MathFn::Hypot => FnClass::BinaryReal,
            MathFn::Sinh | MathFn::Cosh | MathFn::Tanh => FnClass::Hyperbolic,
            MathFn::Arcsinh | MathFn::Arccosh | MathFn::Arctanh => FnClass::InverseHyperbolic,
            MathFn::Deg2rad | MathFn::Rad2deg | MathFn::Degrees | MathFn::Radians => {
                FnClass::AngleConversion
            }
        }
    }

    /// Whether a complex overload exists
    pub fn supports_complex(&self) -> bool {
        !matches!(
            self.class(),
            FnClass::BinaryReal | FnClass::AngleConversion
        )
    }

    /// Whether results may be infinite on the integer domain, making a
    /// narrowing store to an integer kind undefined.
    pub fn unbounded_on_integers(&self) -> bool {
        matches!(self, MathFn::Arctanh)
    }
}

impl fmt::Display for MathFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
