//! Host-resident values and the argument list of a dispatch

use crate::ast::ElementKind;
use crate::backend::DeviceArray;
use crate::error::TypeError;
use crate::signature::{Layout, TypeSignature};
use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn, ShapeBuilder};
use num_complex::Complex;

/// A numeric type that can be stored in kernel arguments
pub trait Element: Copy + Send + Sync + 'static {
    const KIND: ElementKind;

    /// Write the little-endian encoding into `out` (exactly `KIND.size_in_bytes()` long)
    fn write_le(&self, out: &mut [u8]);

    /// Decode from the first `KIND.size_in_bytes()` bytes
    fn read_le(bytes: &[u8]) -> Self;

    fn into_scalar(self) -> Scalar;
}

macro_rules! impl_element {
    ($ty:ty, $kind:ident) => {
        impl Element for $ty {
            const KIND: ElementKind = ElementKind::$kind;

            fn write_le(&self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(buf)
            }

            fn into_scalar(self) -> Scalar {
                Scalar::$kind(self)
            }
        }

        impl From<$ty> for Scalar {
            fn from(value: $ty) -> Self {
                Scalar::$kind(value)
            }
        }
    };
}

macro_rules! impl_complex_element {
    ($ty:ty, $kind:ident) => {
        impl Element for Complex<$ty> {
            const KIND: ElementKind = ElementKind::$kind;

            fn write_le(&self, out: &mut [u8]) {
                let half = std::mem::size_of::<$ty>();
                self.re.write_le(&mut out[..half]);
                self.im.write_le(&mut out[half..2 * half]);
            }

            fn read_le(bytes: &[u8]) -> Self {
                let half = std::mem::size_of::<$ty>();
                Complex::new(<$ty>::read_le(bytes), <$ty>::read_le(&bytes[half..]))
            }

            fn into_scalar(self) -> Scalar {
                Scalar::$kind(self)
            }
        }

        impl From<Complex<$ty>> for Scalar {
            fn from(value: Complex<$ty>) -> Self {
                Scalar::$kind(value)
            }
        }
    };
}

impl_element!(i8, I8);
impl_element!(i16, I16);
impl_element!(i32, I32);
impl_element!(i64, I64);
impl_element!(u8, U8);
impl_element!(u16, U16);
impl_element!(u32, U32);
impl_element!(u64, U64);
impl_element!(f32, F32);
impl_element!(f64, F64);
impl_complex_element!(f32, C64);
impl_complex_element!(f64, C128);

/// Decode one element of `kind` as a complex double. Real kinds get `im = 0`.
pub(crate) fn decode(kind: ElementKind, bytes: &[u8]) -> Complex<f64> {
    let re = match kind {
        ElementKind::I8 => i8::read_le(bytes) as f64,
        ElementKind::I16 => i16::read_le(bytes) as f64,
        ElementKind::I32 => i32::read_le(bytes) as f64,
        ElementKind::I64 => i64::read_le(bytes) as f64,
        ElementKind::U8 => u8::read_le(bytes) as f64,
        ElementKind::U16 => u16::read_le(bytes) as f64,
        ElementKind::U32 => u32::read_le(bytes) as f64,
        ElementKind::U64 => u64::read_le(bytes) as f64,
        ElementKind::F32 => f32::read_le(bytes) as f64,
        ElementKind::F64 => f64::read_le(bytes),
        ElementKind::C64 => {
            let c = Complex::<f32>::read_le(bytes);
            return Complex::new(c.re as f64, c.im as f64);
        }
        ElementKind::C128 => return Complex::<f64>::read_le(bytes),
    };
    Complex::new(re, 0.0)
}

/// Encode `value` as `kind`, narrowing as needed.
///
/// Integer kinds truncate toward zero and reject non-finite or out-of-range
/// values. Real kinds drop the imaginary part, so callers must not pass
/// complex values with a non-zero imaginary part to them.
pub(crate) fn encode(kind: ElementKind, value: Complex<f64>, out: &mut [u8]) -> Result<(), String> {
    if let Some((lo, hi)) = kind.integer_bounds() {
        let v = value.re;
        if !v.is_finite() {
            return Err(format!("cannot store {} into {}", v, kind));
        }
        let t = v.trunc();
        if t < lo || t >= hi {
            return Err(format!("{} is out of range for {}", v, kind));
        }
        match kind {
            ElementKind::I8 => (t as i8).write_le(out),
            ElementKind::I16 => (t as i16).write_le(out),
            ElementKind::I32 => (t as i32).write_le(out),
            ElementKind::I64 => (t as i64).write_le(out),
            ElementKind::U8 => (t as u8).write_le(out),
            ElementKind::U16 => (t as u16).write_le(out),
            ElementKind::U32 => (t as u32).write_le(out),
            _ => (t as u64).write_le(out),
        }
        return Ok(());
    }
    match kind {
        ElementKind::F32 => (value.re as f32).write_le(out),
        ElementKind::C64 => Complex::new(value.re as f32, value.im as f32).write_le(out),
        ElementKind::C128 => value.write_le(out),
        _ => value.re.write_le(out),
    }
    Ok(())
}

/// A single host value of any element kind
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    C64(Complex<f32>),
    C128(Complex<f64>),
}

impl Scalar {
    pub fn kind(&self) -> ElementKind {
        match self {
            Scalar::I8(_) => ElementKind::I8,
            Scalar::I16(_) => ElementKind::I16,
            Scalar::I32(_) => ElementKind::I32,
            Scalar::I64(_) => ElementKind::I64,
            Scalar::U8(_) => ElementKind::U8,
            Scalar::U16(_) => ElementKind::U16,
            Scalar::U32(_) => ElementKind::U32,
            Scalar::U64(_) => ElementKind::U64,
            Scalar::F32(_) => ElementKind::F32,
            Scalar::F64(_) => ElementKind::F64,
            Scalar::C64(_) => ElementKind::C64,
            Scalar::C128(_) => ElementKind::C128,
        }
    }

    pub fn signature(&self) -> TypeSignature {
        TypeSignature::scalar(self.kind())
    }

    /// Little-endian encoding of the value
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.kind().size_in_bytes()];
        match self {
            Scalar::I8(v) => v.write_le(&mut out),
            Scalar::I16(v) => v.write_le(&mut out),
            Scalar::I32(v) => v.write_le(&mut out),
            Scalar::I64(v) => v.write_le(&mut out),
            Scalar::U8(v) => v.write_le(&mut out),
            Scalar::U16(v) => v.write_le(&mut out),
            Scalar::U32(v) => v.write_le(&mut out),
            Scalar::U64(v) => v.write_le(&mut out),
            Scalar::F32(v) => v.write_le(&mut out),
            Scalar::F64(v) => v.write_le(&mut out),
            Scalar::C64(v) => v.write_le(&mut out),
            Scalar::C128(v) => v.write_le(&mut out),
        }
        out
    }
}

/// A dense host array in C or F order.
///
/// Elements are kept as raw little-endian bytes in memory order so that
/// staging to the device is a plain copy.
#[derive(Debug, Clone, PartialEq)]
pub struct HostArray {
    kind: ElementKind,
    shape: Vec<usize>,
    layout: Layout,
    bytes: Vec<u8>,
}

impl HostArray {
    pub fn zeros(kind: ElementKind, shape: &[usize], layout: Layout) -> Self {
        let len: usize = shape.iter().product();
        Self {
            kind,
            shape: shape.to_vec(),
            layout: normalize_layout(shape, layout),
            bytes: vec![0u8; len * kind.size_in_bytes()],
        }
    }

    /// Wrap raw bytes laid out in `layout` order
    pub fn from_bytes(
        kind: ElementKind,
        shape: &[usize],
        layout: Layout,
        bytes: Vec<u8>,
    ) -> Result<Self, TypeError> {
        let expected = shape.iter().product::<usize>() * kind.size_in_bytes();
        if bytes.len() != expected {
            return Err(TypeError::ByteLength {
                shape: shape.to_vec(),
                expected,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            kind,
            shape: shape.to_vec(),
            layout: normalize_layout(shape, layout),
            bytes,
        })
    }

    /// Build from values already in `layout` memory order
    pub fn from_vec<T: Element>(
        shape: &[usize],
        layout: Layout,
        values: Vec<T>,
    ) -> Result<Self, TypeError> {
        let bytes = encode_values(values.iter());
        Self::from_bytes(T::KIND, shape, layout, bytes)
    }

    /// Copy an `ndarray` array, keeping its memory order.
    ///
    /// Standard-layout arrays become C arrays and transposed standard-layout
    /// arrays become F arrays. Any other stride pattern is gathered into C order.
    pub fn from_ndarray<T, S, D>(array: &ArrayBase<S, D>) -> Self
    where
        T: Element,
        S: Data<Elem = T>,
        D: Dimension,
    {
        let shape = array.shape().to_vec();
        let (layout, bytes) = if array.is_standard_layout() {
            (Layout::RowMajor, encode_values(array.iter()))
        } else if array.t().is_standard_layout() {
            (Layout::ColumnMajor, encode_values(array.t().iter()))
        } else {
            (Layout::RowMajor, encode_values(array.iter()))
        };
        Self {
            kind: T::KIND,
            layout: normalize_layout(&shape, layout),
            shape,
            bytes,
        }
    }

    /// Convert back to an `ndarray` array with the same shape and memory order
    pub fn to_ndarray<T: Element>(&self) -> Result<ArrayD<T>, TypeError> {
        let values = self.values::<T>()?;
        let shape = IxDyn(&self.shape);
        let result = match self.layout {
            Layout::RowMajor => ArrayD::from_shape_vec(shape, values),
            Layout::ColumnMajor => ArrayD::from_shape_vec(shape.f(), values),
        };
        result.map_err(|e| TypeError::InvalidShape {
            shape: self.shape.clone(),
            reason: e.to_string(),
        })
    }

    /// Elements in memory order
    pub fn values<T: Element>(&self) -> Result<Vec<T>, TypeError> {
        if T::KIND != self.kind {
            return Err(TypeError::KindMismatch {
                requested: T::KIND,
                actual: self.kind,
            });
        }
        Ok(self
            .bytes
            .chunks_exact(self.kind.size_in_bytes())
            .map(T::read_le)
            .collect())
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Rank-0 arrays describe as scalars
    pub fn signature(&self) -> TypeSignature {
        TypeSignature::array(self.kind, self.rank(), self.layout)
    }
}

fn normalize_layout(shape: &[usize], layout: Layout) -> Layout {
    if shape.len() <= 1 {
        Layout::RowMajor
    } else {
        layout
    }
}

fn encode_values<'a, T: Element>(values: impl Iterator<Item = &'a T>) -> Vec<u8> {
    let size = T::KIND.size_in_bytes();
    let mut bytes = Vec::new();
    for value in values {
        let start = bytes.len();
        bytes.resize(start + size, 0);
        value.write_le(&mut bytes[start..]);
    }
    bytes
}

/// One argument of a dispatch: inputs first, the output last
#[derive(Debug, Clone)]
pub enum KernelArg {
    Scalar(Scalar),
    /// Staged to the device for the dispatch; an output is copied back in place
    Host(HostArray),
    /// Already resident on the device; used directly
    Device(DeviceArray),
}

impl KernelArg {
    pub fn signature(&self) -> TypeSignature {
        match self {
            KernelArg::Scalar(s) => s.signature(),
            KernelArg::Host(a) => a.signature(),
            KernelArg::Device(a) => a.signature(),
        }
    }

    /// Scalars have the empty shape
    pub fn shape(&self) -> &[usize] {
        match self {
            KernelArg::Scalar(_) => &[],
            KernelArg::Host(a) => a.shape(),
            KernelArg::Device(a) => a.shape(),
        }
    }

    pub fn kind(&self) -> ElementKind {
        self.signature().kind()
    }

    pub fn as_host(&self) -> Option<&HostArray> {
        match self {
            KernelArg::Host(a) => Some(a),
            _ => None,
        }
    }

    pub fn into_host(self) -> Option<HostArray> {
        match self {
            KernelArg::Host(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_device(&self) -> Option<&DeviceArray> {
        match self {
            KernelArg::Device(a) => Some(a),
            _ => None,
        }
    }
}

impl From<Scalar> for KernelArg {
    fn from(value: Scalar) -> Self {
        KernelArg::Scalar(value)
    }
}

impl From<HostArray> for KernelArg {
    fn from(value: HostArray) -> Self {
        KernelArg::Host(value)
    }
}

impl From<DeviceArray> for KernelArg {
    fn from(value: DeviceArray) -> Self {
        KernelArg::Device(value)
    }
}

macro_rules! impl_arg_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for KernelArg {
                fn from(value: $ty) -> Self {
                    KernelArg::Scalar(Scalar::from(value))
                }
            }
        )*
    };
}

impl_arg_from_scalar!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, Complex<f32>, Complex<f64>);

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3, array};

    #[test]
    fn test_scalar_encoding() {
        let s = Scalar::from(Complex::new(-0.5f32, 0.5));
        assert_eq!(s.kind(), ElementKind::C64);
        let bytes = s.to_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(decode(ElementKind::C64, &bytes), Complex::new(-0.5, 0.5));
    }

    #[test]
    fn test_from_ndarray_row_major() {
        let a: Array2<f64> = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let host = HostArray::from_ndarray(&a);
        assert_eq!(host.layout(), Layout::RowMajor);
        assert_eq!(host.values::<f64>().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(host.to_ndarray::<f64>().unwrap(), a.into_dyn());
    }

    #[test]
    fn test_from_ndarray_column_major() {
        let a = Array2::from_shape_vec((2, 3).f(), vec![1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0]).unwrap();
        let host = HostArray::from_ndarray(&a);
        assert_eq!(host.layout(), Layout::ColumnMajor);
        assert_eq!(host.signature().to_string(), "array(float32, 2d, F)");
        assert_eq!(host.values::<f32>().unwrap(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        let back = host.to_ndarray::<f32>().unwrap();
        assert_eq!(back, a.into_dyn());
        assert!(!back.is_standard_layout());
    }

    #[test]
    fn test_strided_view_is_gathered() {
        let a = Array3::from_shape_fn((2, 3, 4), |(i, j, k)| (i * 100 + j * 10 + k) as i32);
        let view = a.slice(ndarray::s![.., ..;2, ..]);
        let host = HostArray::from_ndarray(&view);
        assert_eq!(host.layout(), Layout::RowMajor);
        assert_eq!(host.shape(), &[2, 2, 4]);
        assert_eq!(host.to_ndarray::<i32>().unwrap(), view.to_owned().into_dyn());
    }

    #[test]
    fn test_kind_mismatch() {
        let host = HostArray::zeros(ElementKind::F64, &[3], Layout::RowMajor);
        assert!(matches!(
            host.to_ndarray::<f32>(),
            Err(TypeError::KindMismatch { .. })
        ));
    }

    #[test]
    fn test_byte_length_checked() {
        let err = HostArray::from_bytes(ElementKind::F32, &[2, 2], Layout::RowMajor, vec![0; 12]);
        assert!(matches!(err, Err(TypeError::ByteLength { expected: 16, .. })));
    }

    #[test]
    fn test_zero_dim_describes_as_scalar() {
        let host = HostArray::zeros(ElementKind::F64, &[], Layout::ColumnMajor);
        assert!(host.signature().is_scalar());
        assert_eq!(host.len(), 1);
    }

    #[test]
    fn test_encode_integer_narrowing() {
        let mut out = [0u8; 1];
        assert!(encode(ElementKind::I8, Complex::new(-3.7, 0.0), &mut out).is_ok());
        assert_eq!(i8::read_le(&out), -3);
        assert!(encode(ElementKind::U8, Complex::new(300.0, 0.0), &mut out).is_err());
        assert!(encode(ElementKind::I8, Complex::new(f64::INFINITY, 0.0), &mut out).is_err());
        assert!(encode(ElementKind::U8, Complex::new(255.9, 0.0), &mut out).is_ok());
        assert_eq!(u8::read_le(&out), 255);
    }

    #[test]
    fn test_encode_64_bit_limits() {
        let mut out = [0u8; 8];
        let two_pow_63 = 2f64.powi(63);
        assert!(encode(ElementKind::I64, Complex::new(two_pow_63, 0.0), &mut out).is_err());
        assert!(encode(ElementKind::I64, Complex::new(-two_pow_63, 0.0), &mut out).is_ok());
        assert_eq!(i64::read_le(&out), i64::MIN);
        assert!(encode(ElementKind::U64, Complex::new(2f64.powi(64), 0.0), &mut out).is_err());
        let below = 2f64.powi(64) - 2048.0;
        assert!(encode(ElementKind::U64, Complex::new(below, 0.0), &mut out).is_ok());
        assert_eq!(u64::read_le(&out), below as u64);
    }
}
