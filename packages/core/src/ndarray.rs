//! N-dimensional byte buffers with shape and dtype metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Element type of an [`NdArray`].
///
/// The serialized names match the dtype names used on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int32,
    Float32,
    Uint16,
    Uint8,
}

impl DType {
    /// Size of one element in bytes.
    pub fn element_size(self) -> usize {
        match self {
            DType::Int32 | DType::Float32 => 4,
            DType::Uint16 => 2,
            DType::Uint8 => 1,
        }
    }

    /// Wire name of the dtype.
    pub fn name(self) -> &'static str {
        match self {
            DType::Int32 => "int32",
            DType::Float32 => "float32",
            DType::Uint16 => "uint16",
            DType::Uint8 => "uint8",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "int32" => Ok(DType::Int32),
            "float32" => Ok(DType::Float32),
            "uint16" => Ok(DType::Uint16),
            "uint8" => Ok(DType::Uint8),
            other => Err(Error::protocol(format!("unsupported dtype: {}", other))),
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for i32 {}
    impl Sealed for f32 {}
    impl Sealed for u16 {}
    impl Sealed for u8 {}
}

/// A native element type that can back an [`NdArray`].
pub trait Element: sealed::Sealed + Copy {
    /// The dtype tag for this element type.
    const DTYPE: DType;

    fn write_le(self, out: &mut Vec<u8>);

    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: DType = $dtype;

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                <$ty>::from_le_bytes(raw)
            }
        }
    };
}

impl_element!(i32, DType::Int32);
impl_element!(f32, DType::Float32);
impl_element!(u16, DType::Uint16);
impl_element!(u8, DType::Uint8);

/// Number of elements described by a shape. An empty shape has zero elements.
pub fn element_count(shape: &[usize]) -> usize {
    if shape.is_empty() {
        return 0;
    }
    shape.iter().product()
}

/// Elements and bytes described by `shape`, or a protocol error when either
/// count overflows `usize`.
fn checked_len(shape: &[usize], dtype: DType) -> Result<(usize, usize)> {
    let count = if shape.is_empty() {
        Some(0)
    } else {
        shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    };
    count
        .and_then(|count| Some((count, count.checked_mul(dtype.element_size())?)))
        .ok_or_else(|| Error::protocol(format!("ndarray shape {:?} overflows", shape)))
}

/// A raw little-endian element buffer with shape and dtype.
///
/// Invariant: `data.len() == element_count(shape) * dtype.element_size()`.
/// Every constructor checks it, so a value of this type is always consistent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NdArray {
    data: Vec<u8>,
    shape: Vec<usize>,
    dtype: DType,
}

impl NdArray {
    /// Build an array from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the byte length does not match the shape
    /// and dtype.
    pub fn from_bytes(data: Vec<u8>, shape: Vec<usize>, dtype: DType) -> Result<Self> {
        let (_, expected) = checked_len(&shape, dtype)?;
        if data.len() != expected {
            return Err(Error::protocol(format!(
                "ndarray of shape {:?} and dtype {} needs {} bytes, got {}",
                shape,
                dtype,
                expected,
                data.len()
            )));
        }
        Ok(Self { data, shape, dtype })
    }

    /// Build an array from typed elements.
    pub fn from_elements<T: Element>(elements: &[T], shape: Vec<usize>) -> Result<Self> {
        let (count, _) = checked_len(&shape, T::DTYPE)?;
        if elements.len() != count {
            return Err(Error::size_mismatch("ndarray elements", count, elements.len()));
        }
        let mut data = Vec::with_capacity(count * T::DTYPE.element_size());
        for element in elements {
            element.write_le(&mut data);
        }
        Ok(Self {
            data,
            shape,
            dtype: T::DTYPE,
        })
    }

    /// A one-dimensional array over the given elements.
    pub fn from_vec<T: Element>(elements: Vec<T>) -> Self {
        let shape = vec![elements.len()];
        let mut data = Vec::with_capacity(elements.len() * T::DTYPE.element_size());
        for element in elements {
            element.write_le(&mut data);
        }
        Self {
            data,
            shape,
            dtype: T::DTYPE,
        }
    }

    /// An array with no elements.
    pub fn empty(dtype: DType) -> Self {
        Self {
            data: Vec::new(),
            shape: Vec::new(),
            dtype,
        }
    }

    /// Copy the elements out as a typed vector.
    ///
    /// # Errors
    ///
    /// Returns a type mismatch if `T` does not match the array's dtype.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if self.dtype != T::DTYPE {
            return Err(Error::type_mismatch(T::DTYPE.name(), self.dtype.name()));
        }
        Ok(self
            .data
            .chunks_exact(self.dtype.element_size())
            .map(T::read_le)
            .collect())
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        element_count(&self.shape)
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// The raw little-endian bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consume the array, returning its raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_names_parse_back() {
        for dtype in [DType::Int32, DType::Float32, DType::Uint16, DType::Uint8] {
            assert_eq!(dtype.name().parse::<DType>().unwrap(), dtype);
        }
        assert!(matches!(
            "float64".parse::<DType>(),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn dtype_serde_uses_wire_names() {
        assert_eq!(
            serde_json::to_value(DType::Uint16).unwrap(),
            serde_json::json!("uint16")
        );
        let parsed: DType = serde_json::from_value(serde_json::json!("float32")).unwrap();
        assert_eq!(parsed, DType::Float32);
    }

    #[test]
    fn byte_length_matches_shape_and_dtype() {
        let shapes: [&[usize]; 4] = [&[], &[7], &[2, 3], &[2, 0, 4]];
        for shape in shapes {
            for dtype in [DType::Int32, DType::Float32, DType::Uint16, DType::Uint8] {
                let len = element_count(shape) * dtype.element_size();
                let array = NdArray::from_bytes(vec![0; len], shape.to_vec(), dtype).unwrap();
                assert_eq!(array.as_bytes().len(), array.len() * dtype.element_size());
            }
        }
    }

    #[test]
    fn wrong_byte_length_is_rejected() {
        let result = NdArray::from_bytes(vec![0; 5], vec![2], DType::Int32);
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[test]
    fn empty_shape_means_no_elements() {
        assert_eq!(element_count(&[]), 0);
        let array = NdArray::empty(DType::Float32);
        assert!(array.is_empty());
        assert!(NdArray::from_bytes(vec![0; 4], vec![], DType::Float32).is_err());
    }

    #[test]
    fn typed_elements_are_little_endian() {
        let array = NdArray::from_elements(&[1u16, 0x0203], vec![2]).unwrap();
        assert_eq!(array.as_bytes(), &[1, 0, 3, 2]);
        assert_eq!(array.to_vec::<u16>().unwrap(), vec![1, 0x0203]);
    }

    #[test]
    fn float_elements_survive() {
        let values = [1.5f32, -2.25, 0.0, 1e-3, 8.0, 9.5];
        let array = NdArray::from_elements(&values, vec![2, 3]).unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array.to_vec::<f32>().unwrap(), values.to_vec());
    }

    #[test]
    fn to_vec_checks_dtype() {
        let array = NdArray::from_vec(vec![1i32, 2, 3]);
        assert!(matches!(
            array.to_vec::<f32>(),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        let huge = vec![1usize << 32, 1usize << 32];
        assert!(matches!(
            NdArray::from_bytes(Vec::new(), huge.clone(), DType::Uint8),
            Err(Error::Protocol { .. })
        ));
        assert!(matches!(
            NdArray::from_elements::<u8>(&[], huge),
            Err(Error::Protocol { .. })
        ));
        // The element count fits, the byte count does not.
        assert!(matches!(
            NdArray::from_bytes(Vec::new(), vec![usize::MAX / 2], DType::Int32),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn element_count_mismatch() {
        let result = NdArray::from_elements(&[1u8, 2, 3], vec![2, 2]);
        assert!(matches!(result, Err(Error::SizeMismatch { .. })));
    }
}
