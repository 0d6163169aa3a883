//! Concrete tensor values fetched from a workspace or supplied as constants.

use std::error::Error;
use std::fmt;
use std::fmt::Display;

use dragon_onnx_proto::onnx;

/// Enum specifying the element type of a tensor.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum DataType {
    Float,
    Double,
    Int8,
    UInt8,
    Int32,
    Int64,
    Bool,
}

impl DataType {
    /// Return the size of elements of this type in bytes.
    pub fn size(self) -> u8 {
        match self {
            DataType::Int8 | DataType::UInt8 | DataType::Bool => 1,
            DataType::Float | DataType::Int32 => 4,
            DataType::Double | DataType::Int64 => 8,
        }
    }

    /// Return the `TensorProto.DataType` that corresponds to this type.
    pub fn to_onnx(self) -> onnx::DataType {
        match self {
            DataType::Float => onnx::DataType::FLOAT,
            DataType::Double => onnx::DataType::DOUBLE,
            DataType::Int8 => onnx::DataType::INT8,
            DataType::UInt8 => onnx::DataType::UINT8,
            DataType::Int32 => onnx::DataType::INT32,
            DataType::Int64 => onnx::DataType::INT64,
            DataType::Bool => onnx::DataType::BOOL,
        }
    }

    /// Return the data type which corresponds to an ONNX `elem_type`, or
    /// `None` if the type cannot be exported.
    pub fn from_onnx(dtype: onnx::DataType) -> Option<DataType> {
        let dtype = match dtype {
            onnx::DataType::FLOAT => DataType::Float,
            onnx::DataType::DOUBLE => DataType::Double,
            onnx::DataType::INT8 => DataType::Int8,
            onnx::DataType::UINT8 => DataType::UInt8,
            onnx::DataType::INT32 => DataType::Int32,
            onnx::DataType::INT64 => DataType::Int64,
            onnx::DataType::BOOL => DataType::Bool,
            _ => return None,
        };
        Some(dtype)
    }
}

impl Display for DataType {
    /// Format this enum value in the style of the corresponding Rust type (eg.
    /// "i32" for `DataType::Int32`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                DataType::Float => "f32",
                DataType::Double => "f64",
                DataType::Int8 => "i8",
                DataType::UInt8 => "u8",
                DataType::Int32 => "i32",
                DataType::Int64 => "i64",
                DataType::Bool => "bool",
            }
        )
    }
}

/// Element storage for a [`Tensor`].
#[derive(Clone, Debug, PartialEq)]
pub enum TensorData {
    Float(Vec<f32>),
    Double(Vec<f64>),
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Bool(Vec<bool>),
}

impl TensorData {
    pub fn dtype(&self) -> DataType {
        match self {
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::Int8(_) => DataType::Int8,
            Self::UInt8(_) => DataType::UInt8,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Bool(_) => DataType::Bool,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Int8(v) => v.len(),
            Self::UInt8(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert `f32` values to elements of type `dtype`.
    ///
    /// Integer types are rounded towards zero and saturate at the limits of
    /// the type. Booleans are true for any non-zero value.
    pub fn from_f32(values: &[f32], dtype: DataType) -> TensorData {
        match dtype {
            DataType::Float => Self::Float(values.to_vec()),
            DataType::Double => Self::Double(values.iter().map(|&x| x as f64).collect()),
            DataType::Int8 => Self::Int8(values.iter().map(|&x| x as i8).collect()),
            DataType::UInt8 => Self::UInt8(values.iter().map(|&x| x as u8).collect()),
            DataType::Int32 => Self::Int32(values.iter().map(|&x| x as i32).collect()),
            DataType::Int64 => Self::Int64(values.iter().map(|&x| x as i64).collect()),
            DataType::Bool => Self::Bool(values.iter().map(|&x| x != 0.).collect()),
        }
    }

    /// Return the elements in packed little-endian order, as used by
    /// `TensorProto.raw_data`.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        fn flatten<const N: usize>(bytes: impl Iterator<Item = [u8; N]>) -> Vec<u8> {
            bytes.flatten().collect()
        }

        match self {
            Self::Float(v) => flatten(v.iter().map(|x| x.to_le_bytes())),
            Self::Double(v) => flatten(v.iter().map(|x| x.to_le_bytes())),
            Self::Int8(v) => flatten(v.iter().map(|x| x.to_le_bytes())),
            Self::UInt8(v) => v.clone(),
            Self::Int32(v) => flatten(v.iter().map(|x| x.to_le_bytes())),
            Self::Int64(v) => flatten(v.iter().map(|x| x.to_le_bytes())),
            Self::Bool(v) => v.iter().map(|&x| x as u8).collect(),
        }
    }
}

macro_rules! impl_tensor_data_from {
    ($type:ty, $variant:ident) => {
        impl From<Vec<$type>> for TensorData {
            fn from(val: Vec<$type>) -> Self {
                Self::$variant(val)
            }
        }
    };
}

impl_tensor_data_from!(f32, Float);
impl_tensor_data_from!(f64, Double);
impl_tensor_data_from!(i8, Int8);
impl_tensor_data_from!(u8, UInt8);
impl_tensor_data_from!(i32, Int32);
impl_tensor_data_from!(i64, Int64);
impl_tensor_data_from!(bool, Bool);

/// Error when the number of elements in a tensor does not match its shape.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShapeError {
    shape: Vec<usize>,
    len: usize,
}

impl Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "data length {} does not match shape {:?}",
            self.len, self.shape
        )
    }
}

impl Error for ShapeError {}

/// A tensor with a shape and element data in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// Create a tensor from a shape and data.
    ///
    /// Fails if the number of elements in `data` is not the product of
    /// `shape`.
    pub fn new(shape: Vec<usize>, data: impl Into<TensorData>) -> Result<Tensor, ShapeError> {
        let data = data.into();
        let numel: usize = shape.iter().product();
        if numel != data.len() {
            return Err(ShapeError {
                shape,
                len: data.len(),
            });
        }
        Ok(Tensor { shape, data })
    }

    /// Create a 1D tensor from a vector.
    pub fn from_vec(data: impl Into<TensorData>) -> Tensor {
        let data = data.into();
        Tensor {
            shape: vec![data.len()],
            data,
        }
    }

    /// Create a tensor of type `dtype` with elements produced by calling `f`
    /// and converting the result.
    pub fn from_simple_fn(shape: &[usize], dtype: DataType, mut f: impl FnMut() -> f32) -> Tensor {
        let numel = shape.iter().product();
        let values: Vec<f32> = (0..numel).map(|_| f()).collect();
        Tensor {
            shape: shape.to_vec(),
            data: TensorData::from_f32(&values, dtype),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn dtype(&self) -> DataType {
        self.data.dtype()
    }

    pub fn meta(&self) -> ValueMeta {
        ValueMeta {
            dtype: self.dtype(),
            shape: self.shape.clone(),
        }
    }

    /// Convert this tensor to a named ONNX initializer.
    ///
    /// The elements are stored in `raw_data`.
    pub fn to_proto(&self, name: &str) -> onnx::TensorProto {
        onnx::TensorProto {
            dims: self.shape.iter().map(|&d| d as i64).collect(),
            data_type: Some(self.dtype().to_onnx()),
            name: Some(name.to_string()),
            raw_data: Some(self.data.to_le_bytes()),
            ..Default::default()
        }
    }
}

/// Metadata about a tensor.
///
/// This is used in logs and errors which need to describe a tensor but not
/// its content.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValueMeta {
    pub dtype: DataType,
    pub shape: Vec<usize>,
}

impl Display for ValueMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Produces strings such as "f32 [1, 16, 256]"
        write!(f, "{} {:?}", self.dtype, self.shape)
    }
}

#[cfg(test)]
mod tests {
    use dragon_onnx_proto::onnx;
    use dragon_onnx_testing::TestCases;

    use super::{DataType, Tensor, TensorData};

    #[test]
    fn test_data_type_onnx_mapping() {
        #[derive(Debug)]
        struct Case {
            dtype: DataType,
            elem_type: i32,
        }

        let cases = [
            Case {
                dtype: DataType::Float,
                elem_type: 1,
            },
            Case {
                dtype: DataType::UInt8,
                elem_type: 2,
            },
            Case {
                dtype: DataType::Int8,
                elem_type: 3,
            },
            Case {
                dtype: DataType::Int32,
                elem_type: 6,
            },
            Case {
                dtype: DataType::Int64,
                elem_type: 7,
            },
            Case {
                dtype: DataType::Bool,
                elem_type: 9,
            },
            Case {
                dtype: DataType::Double,
                elem_type: 11,
            },
        ];

        cases.test_each(|case| {
            assert_eq!(case.dtype.to_onnx(), onnx::DataType(case.elem_type));
            assert_eq!(
                DataType::from_onnx(onnx::DataType(case.elem_type)),
                Some(case.dtype)
            );
        });
        assert_eq!(DataType::from_onnx(onnx::DataType::STRING), None);
    }

    #[test]
    fn test_tensor_new_checks_shape() {
        assert!(Tensor::new(vec![2, 3], vec![0f32; 6]).is_ok());

        let err = Tensor::new(vec![2, 3], vec![0f32; 5]).unwrap_err();
        assert_eq!(err.to_string(), "data length 5 does not match shape [2, 3]");

        // A scalar has one element.
        assert!(Tensor::new(vec![], vec![1i64]).is_ok());
    }

    #[test]
    fn test_tensor_to_proto() {
        let tensor = Tensor::new(vec![2], vec![1.0f32, -2.0]).unwrap();
        let proto = tensor.to_proto("w");

        assert_eq!(proto.name.as_deref(), Some("w"));
        assert_eq!(proto.dims, [2]);
        assert_eq!(proto.data_type, Some(onnx::DataType::FLOAT));
        assert_eq!(
            proto.raw_data.as_deref(),
            Some([0x00, 0x00, 0x80, 0x3f, 0x00, 0x00, 0x00, 0xc0].as_slice())
        );
        assert_eq!(proto.numel(), Some(2));
    }

    #[test]
    fn test_tensor_data_from_f32() {
        let values = [1.7, -0.5, 0.0];
        assert_eq!(
            TensorData::from_f32(&values, DataType::Int32),
            TensorData::Int32(vec![1, 0, 0])
        );
        assert_eq!(
            TensorData::from_f32(&values, DataType::Bool),
            TensorData::Bool(vec![true, true, false])
        );
        assert_eq!(
            TensorData::from_f32(&values, DataType::UInt8),
            TensorData::UInt8(vec![1, 0, 0])
        );
    }

    #[test]
    fn test_meta_display() {
        let tensor = Tensor::new(vec![1, 3], vec![1i64, 2, 3]).unwrap();
        assert_eq!(tensor.meta().to_string(), "i64 [1, 3]");
    }
}
