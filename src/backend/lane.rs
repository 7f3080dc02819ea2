//! Scalar arithmetic a kernel computes in
//!
//! Every compiled kernel runs in exactly one lane, chosen at compile time.
//! Executors are monomorphized over [`Lane`], so the per-element loop has no
//! kind dispatch beyond the loads and the final store.

use crate::ast::{ElementKind, MathFn};
use crate::host::{decode, encode};
use num_complex::Complex;
use std::fmt::Debug;

pub(crate) trait Lane: Copy + Debug + Send + Sync + 'static {
    /// Type name in rendered listings
    const C_TYPE: &'static str;

    fn from_f64(value: f64) -> Self;

    /// Load one element of `kind`, widening integers and reals
    fn load(kind: ElementKind, bytes: &[u8]) -> Self;

    /// Store into an element of `kind`
    fn store(self, kind: ElementKind, out: &mut [u8]) -> Result<(), String>;

    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn div(self, rhs: Self) -> Self;
    fn neg(self) -> Self;

    fn unary(self, func: MathFn) -> Self;
    fn binary(self, func: MathFn, rhs: Self) -> Self;
}

macro_rules! impl_real_lane {
    ($ty:ty, $c_type:expr) => {
        impl Lane for $ty {
            const C_TYPE: &'static str = $c_type;

            fn from_f64(value: f64) -> Self {
                value as $ty
            }

            fn load(kind: ElementKind, bytes: &[u8]) -> Self {
                decode(kind, bytes).re as $ty
            }

            fn store(self, kind: ElementKind, out: &mut [u8]) -> Result<(), String> {
                encode(kind, Complex::new(self as f64, 0.0), out)
            }

            fn add(self, rhs: Self) -> Self {
                self + rhs
            }

            fn sub(self, rhs: Self) -> Self {
                self - rhs
            }

            fn mul(self, rhs: Self) -> Self {
                self * rhs
            }

            fn div(self, rhs: Self) -> Self {
                self / rhs
            }

            fn neg(self) -> Self {
                -self
            }

            fn unary(self, func: MathFn) -> Self {
                match func {
                    MathFn::Sin => self.sin(),
                    MathFn::Cos => self.cos(),
                    MathFn::Tan => self.tan(),
                    MathFn::Arcsin => self.asin(),
                    MathFn::Arccos => self.acos(),
                    MathFn::Arctan => self.atan(),
                    MathFn::Sinh => self.sinh(),
                    MathFn::Cosh => self.cosh(),
                    MathFn::Tanh => self.tanh(),
                    MathFn::Arcsinh => self.asinh(),
                    MathFn::Arccosh => self.acosh(),
                    MathFn::Arctanh => self.atanh(),
                    MathFn::Deg2rad | MathFn::Radians => self.to_radians(),
                    MathFn::Rad2deg | MathFn::Degrees => self.to_degrees(),
                    // Binary functions never reach here after compilation.
                    MathFn::Arctan2 | MathFn::Hypot => self.binary(func, 1.0),
                }
            }

            fn binary(self, func: MathFn, rhs: Self) -> Self {
                match func {
                    MathFn::Arctan2 => self.atan2(rhs),
                    MathFn::Hypot => self.hypot(rhs),
                    other => self.unary(other),
                }
            }
        }
    };
}

macro_rules! impl_complex_lane {
    ($ty:ty, $c_type:expr) => {
        impl Lane for Complex<$ty> {
            const C_TYPE: &'static str = $c_type;

            fn from_f64(value: f64) -> Self {
                Complex::new(value as $ty, 0.0)
            }

            fn load(kind: ElementKind, bytes: &[u8]) -> Self {
                let c = decode(kind, bytes);
                Complex::new(c.re as $ty, c.im as $ty)
            }

            fn store(self, kind: ElementKind, out: &mut [u8]) -> Result<(), String> {
                encode(kind, Complex::new(self.re as f64, self.im as f64), out)
            }

            fn add(self, rhs: Self) -> Self {
                self + rhs
            }

            fn sub(self, rhs: Self) -> Self {
                self - rhs
            }

            fn mul(self, rhs: Self) -> Self {
                self * rhs
            }

            fn div(self, rhs: Self) -> Self {
                self / rhs
            }

            fn neg(self) -> Self {
                -self
            }

            fn unary(self, func: MathFn) -> Self {
                match func {
                    MathFn::Sin => self.sin(),
                    MathFn::Cos => self.cos(),
                    MathFn::Tan => self.tan(),
                    MathFn::Arcsin => self.asin(),
                    MathFn::Arccos => self.acos(),
                    MathFn::Arctan => self.atan(),
                    MathFn::Sinh => self.sinh(),
                    MathFn::Cosh => self.cosh(),
                    MathFn::Tanh => self.tanh(),
                    MathFn::Arcsinh => self.asinh(),
                    MathFn::Arccosh => self.acosh(),
                    MathFn::Arctanh => self.atanh(),
                    // Real-only functions are rejected for complex kernels at
                    // compile time; evaluate on the real part.
                    real_only => Complex::new(self.re.unary(real_only), 0.0),
                }
            }

            fn binary(self, func: MathFn, rhs: Self) -> Self {
                Complex::new(self.re.binary(func, rhs.re), 0.0)
            }
        }
    };
}

impl_real_lane!(f32, "float");
impl_real_lane!(f64, "double");
impl_complex_lane!(f32, "cfloat");
impl_complex_lane!(f64, "cdouble");
