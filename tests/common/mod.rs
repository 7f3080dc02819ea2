//! Common utilities for dispatch integration tests: input fixtures and a
//! reference oracle computed in double precision.

#![allow(dead_code)]

use kernjit::prelude::*;
use ndarray::{Array, Array1, IntoDimension, ShapeBuilder};
use num_complex::Complex;

pub const SINGLE_EPSILON: f64 = 2e-5;
pub const DOUBLE_EPSILON: f64 = 1e-12;

/// Dispatcher with both dispatch warnings disabled
pub fn quiet_dispatcher() -> Dispatcher {
    let _ = env_logger::builder().is_test(true).try_init();
    Dispatcher::new(Config::quiet()).unwrap()
}

/// Scalars and arrays of every supported kind, the 2D/3D C arrays, F-ordered
/// 2D/3D arrays and an interleaved complex 2D array
pub fn ufunc_inputs() -> Vec<KernelArg> {
    let mut inputs: Vec<KernelArg> = vec![
        0u32.into(),
        1u32.into(),
        (-1i32).into(),
        0i32.into(),
        1i32.into(),
        0u64.into(),
        1u64.into(),
        (-1i64).into(),
        0i64.into(),
        1i64.into(),
        (-0.5f32).into(),
        0.0f32.into(),
        0.5f32.into(),
        (-0.5f64).into(),
        0.0f64.into(),
        0.5f64.into(),
    ];
    inputs.extend([
        host(Array1::from(vec![0u32, 1])),
        host(Array1::from(vec![-1i32, 0, 1])),
        host(Array1::from(vec![0u64, 1])),
        host(Array1::from(vec![-1i64, 0, 1])),
        host(Array1::from(vec![-0.5f32, 0.0, 0.5])),
        host(Array1::from(vec![-0.5f64, 0.0, 0.5])),
    ]);

    let zs: [Complex<f64>; 3] = [
        Complex::new(-0.5, -0.5),
        Complex::new(0.0, 0.0),
        Complex::new(0.5, 0.5),
    ];
    for z in zs {
        inputs.push(Complex::new(z.re as f32, z.im as f32).into());
        inputs.push(z.into());
    }
    inputs.push(host(Array1::from(
        zs.iter()
            .map(|z| Complex::new(z.re as f32, z.im as f32))
            .collect::<Vec<_>>(),
    )));
    inputs.push(host(Array1::from(zs.to_vec())));

    inputs.push(host(linspace(0.0, 1.0, 50).into_shape_with_order((5, 10)).unwrap()));
    inputs.push(host(linspace(0.0, 1.0, 50).into_shape_with_order((2, 5, 5)).unwrap()));
    let complex: Vec<Complex<f64>> = (0..50)
        .map(|i| {
            let t = i as f64 / 49.0;
            Complex::new(t, t)
        })
        .collect();
    inputs.push(host(Array::from_shape_vec((5, 10), complex).unwrap()));
    inputs.push(host(fortran(linspace(0.0, 1.0, 50), (5, 10))));
    inputs.push(host(fortran(linspace(0.0, 1.0, 50), (2, 5, 5))));
    inputs
}

pub fn linspace(start: f64, end: f64, n: usize) -> Array1<f64> {
    Array1::linspace(start, end, n)
}

/// `values` (logical C order) laid out in column-major memory
pub fn fortran<Sh>(values: Array1<f64>, shape: Sh) -> Array<f64, Sh::Dim>
where
    Sh: IntoDimension + Copy,
{
    let c = values.into_shape_with_order(shape.into_dimension()).unwrap();
    let mut f = Array::zeros(shape.f());
    f.assign(&c);
    f
}

pub fn host<T, D>(array: Array<T, D>) -> KernelArg
where
    T: Element,
    D: ndarray::Dimension,
{
    KernelArg::Host(HostArray::from_ndarray(&array))
}

/// Elements of `array` in logical (row-major index) order, widened
pub fn logical_values(array: &HostArray) -> Vec<Complex<f64>> {
    macro_rules! real {
        ($t:ty) => {
            array
                .to_ndarray::<$t>()
                .unwrap()
                .iter()
                .map(|v| Complex::new(*v as f64, 0.0))
                .collect()
        };
    }
    match array.kind() {
        ElementKind::I8 => real!(i8),
        ElementKind::I16 => real!(i16),
        ElementKind::I32 => real!(i32),
        ElementKind::I64 => real!(i64),
        ElementKind::U8 => real!(u8),
        ElementKind::U16 => real!(u16),
        ElementKind::U32 => real!(u32),
        ElementKind::U64 => real!(u64),
        ElementKind::F32 => real!(f32),
        ElementKind::F64 => real!(f64),
        ElementKind::C64 => array
            .to_ndarray::<Complex<f32>>()
            .unwrap()
            .iter()
            .map(|z| Complex::new(z.re as f64, z.im as f64))
            .collect(),
        ElementKind::C128 => array.to_ndarray::<Complex<f64>>().unwrap().iter().copied().collect(),
    }
}

/// Widened value of a scalar or the logical elements of an array
pub fn arg_values(arg: &KernelArg) -> Vec<Complex<f64>> {
    match arg {
        KernelArg::Scalar(s) => vec![scalar_value(*s)],
        KernelArg::Host(a) => logical_values(a),
        KernelArg::Device(a) => logical_values(&a.copy_to_host().unwrap()),
    }
}

fn scalar_value(s: Scalar) -> Complex<f64> {
    let re = |v: f64| Complex::new(v, 0.0);
    match s {
        Scalar::I8(v) => re(v as f64),
        Scalar::I16(v) => re(v as f64),
        Scalar::I32(v) => re(v as f64),
        Scalar::I64(v) => re(v as f64),
        Scalar::U8(v) => re(v as f64),
        Scalar::U16(v) => re(v as f64),
        Scalar::U32(v) => re(v as f64),
        Scalar::U64(v) => re(v as f64),
        Scalar::F32(v) => re(v as f64),
        Scalar::F64(v) => re(v),
        Scalar::C64(z) => Complex::new(z.re as f64, z.im as f64),
        Scalar::C128(z) => z,
    }
}

/// Double-precision reference for `func`. Real functions use the real parts.
pub fn reference(func: MathFn, args: &[Complex<f64>], complex: bool) -> Complex<f64> {
    let z = args[0];
    if complex {
        return match func {
            MathFn::Sin => z.sin(),
            MathFn::Cos => z.cos(),
            MathFn::Tan => z.tan(),
            MathFn::Arcsin => z.asin(),
            MathFn::Arccos => z.acos(),
            MathFn::Arctan => z.atan(),
            MathFn::Sinh => z.sinh(),
            MathFn::Cosh => z.cosh(),
            MathFn::Tanh => z.tanh(),
            MathFn::Arcsinh => z.asinh(),
            MathFn::Arccosh => z.acosh(),
            MathFn::Arctanh => z.atanh(),
            other => panic!("{} has no complex reference", other),
        };
    }
    let x = z.re;
    let value = match func {
        MathFn::Sin => x.sin(),
        MathFn::Cos => x.cos(),
        MathFn::Tan => x.tan(),
        MathFn::Arcsin => x.asin(),
        MathFn::Arccos => x.acos(),
        MathFn::Arctan => x.atan(),
        MathFn::Arctan2 => x.atan2(args[1].re),
        MathFn::Hypot => x.hypot(args[1].re),
        MathFn::Sinh => x.sinh(),
        MathFn::Cosh => x.cosh(),
        MathFn::Tanh => x.tanh(),
        MathFn::Arcsinh => x.asinh(),
        MathFn::Arccosh => x.acosh(),
        MathFn::Arctanh => x.atanh(),
        MathFn::Deg2rad | MathFn::Radians => x.to_radians(),
        MathFn::Rad2deg | MathFn::Degrees => x.to_degrees(),
    };
    Complex::new(value, 0.0)
}

/// Compare component-wise with a relative tolerance; NaN matches NaN and
/// infinities must match exactly
pub fn assert_close(actual: Complex<f64>, expected: Complex<f64>, epsilon: f64, context: &str) {
    for (a, e) in [(actual.re, expected.re), (actual.im, expected.im)] {
        if e.is_nan() {
            assert!(a.is_nan(), "{}: expected NaN, got {}", context, actual);
        } else if e.is_infinite() {
            assert_eq!(a, e, "{}: expected {}, got {}", context, expected, actual);
        } else {
            assert!(
                (a - e).abs() <= epsilon * e.abs().max(1.0),
                "{}: expected {}, got {}",
                context,
                expected,
                actual
            );
        }
    }
}
