//! Type and shape descriptions of tensors.

use std::fmt;

use dragon_onnx_proto::{helper, onnx};
use rustc_hash::FxHashMap;

use crate::value::{DataType, Tensor, ValueMeta};

/// Size of a tensor dimension.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Dimension {
    Fixed(usize),
    Symbolic(String),
}

impl Dimension {
    pub fn fixed(&self) -> Option<usize> {
        match self {
            Self::Fixed(size) => Some(*size),
            Self::Symbolic(_) => None,
        }
    }

    fn to_proto(&self) -> onnx::Dimension {
        match self {
            Self::Fixed(size) => onnx::Dimension::value(*size as i64),
            Self::Symbolic(name) => onnx::Dimension::param(name),
        }
    }
}

impl From<usize> for Dimension {
    fn from(val: usize) -> Self {
        Self::Fixed(val)
    }
}

impl From<&str> for Dimension {
    fn from(val: &str) -> Self {
        Self::Symbolic(val.to_string())
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(size) => write!(f, "{}", size),
            Self::Symbolic(name) => write!(f, "{}", name),
        }
    }
}

/// Convert a concrete shape into dimensions.
pub fn fixed_shape(shape: &[usize]) -> Vec<Dimension> {
    shape.iter().copied().map(Dimension::Fixed).collect()
}

/// Element type and shape of a tensor.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TensorInfo {
    pub dtype: DataType,
    pub shape: Vec<Dimension>,
}

impl TensorInfo {
    pub fn new(dtype: DataType, shape: impl IntoIterator<Item = impl Into<Dimension>>) -> Self {
        TensorInfo {
            dtype,
            shape: shape.into_iter().map(|d| d.into()).collect(),
        }
    }

    /// Return the type and shape of a concrete tensor.
    pub fn of_tensor(tensor: &Tensor) -> Self {
        TensorInfo {
            dtype: tensor.dtype(),
            shape: fixed_shape(tensor.shape()),
        }
    }

    /// Return the type and shape described by `meta`.
    pub fn of_meta(meta: &ValueMeta) -> Self {
        TensorInfo {
            dtype: meta.dtype,
            shape: fixed_shape(&meta.shape),
        }
    }

    /// Return the type and shape of an initializer.
    ///
    /// Returns `None` if the initializer has an element type or dims which
    /// cannot be represented.
    pub fn of_proto(tensor: &onnx::TensorProto) -> Option<Self> {
        let dtype = DataType::from_onnx(tensor.data_type?)?;
        let shape = tensor
            .dims
            .iter()
            .map(|&d| usize::try_from(d).ok().map(Dimension::Fixed))
            .collect::<Option<Vec<_>>>()?;
        Some(TensorInfo { dtype, shape })
    }

    /// Create an ONNX `ValueInfoProto` for a tensor with this type and shape.
    pub fn to_proto(&self, name: &str) -> onnx::ValueInfoProto {
        let dims: Vec<_> = self.shape.iter().map(|d| d.to_proto()).collect();
        helper::make_tensor_value_info(name, self.dtype.to_onnx(), Some(&dims))
    }
}

/// Map of tensor name to type and shape.
///
/// Iteration follows insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueInfo {
    entries: Vec<(String, TensorInfo)>,
    index: FxHashMap<String, usize>,
}

impl ValueInfo {
    pub fn new() -> ValueInfo {
        Self::default()
    }

    /// Add or replace the entry for `name`.
    ///
    /// Replacing an entry keeps its original position.
    pub fn insert(&mut self, name: &str, info: TensorInfo) {
        if let Some(&idx) = self.index.get(name) {
            self.entries[idx].1 = info;
        } else {
            self.index.insert(name.to_string(), self.entries.len());
            self.entries.push((name.to_string(), info));
        }
    }

    pub fn with(mut self, name: &str, info: TensorInfo) -> Self {
        self.insert(name, info);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TensorInfo> {
        self.index.get(name).map(|&idx| &self.entries[idx].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TensorInfo)> {
        self.entries.iter().map(|(name, info)| (name.as_str(), info))
    }

    /// Parse value info from a JSON object of the form
    /// `{"name": [elem_type, [dim, ...]], ...}`.
    ///
    /// `elem_type` is an ONNX `TensorProto.DataType` value. Dims are either
    /// non-negative integers or strings naming a symbolic dimension.
    ///
    /// ```
    /// use dragon_onnx::{DataType, Dimension, ValueInfo};
    ///
    /// let json = serde_json::json!({"x": [1, ["batch", 3, 224, 224]]});
    /// let info = ValueInfo::from_json(&json).unwrap();
    /// let x = info.get("x").unwrap();
    /// assert_eq!(x.dtype, DataType::Float);
    /// assert_eq!(x.shape[0], Dimension::Symbolic("batch".into()));
    /// ```
    #[cfg(feature = "serde")]
    pub fn from_json(value: &serde_json::Value) -> Result<ValueInfo, crate::ExportError> {
        use crate::error::ExportErrorImpl;

        let invalid = |msg: String| crate::ExportError::new(ExportErrorImpl::InvalidValueInfo(msg));

        let entries = value.as_object().ok_or_else(|| {
            invalid("value info must be a name -> (type, shape) mapping".to_string())
        })?;

        let mut info = ValueInfo::new();
        for (name, entry) in entries {
            let (elem_type, shape) = match entry.as_array().map(|a| a.as_slice()) {
                Some([elem_type, shape]) => (elem_type, shape),
                _ => {
                    return Err(invalid(format!(
                        "entry \"{}\" must be an [elem_type, shape] pair",
                        name
                    )))
                }
            };
            let dtype = elem_type
                .as_i64()
                .and_then(|t| i32::try_from(t).ok())
                .and_then(|t| DataType::from_onnx(onnx::DataType(t)))
                .ok_or_else(|| {
                    invalid(format!(
                        "entry \"{}\" has unsupported elem_type {}",
                        name, elem_type
                    ))
                })?;
            let dims = shape
                .as_array()
                .ok_or_else(|| invalid(format!("shape of \"{}\" must be an array", name)))?;
            let shape = dims
                .iter()
                .map(|dim| match dim {
                    serde_json::Value::String(param) => Some(Dimension::Symbolic(param.clone())),
                    _ => dim
                        .as_u64()
                        .and_then(|size| usize::try_from(size).ok())
                        .map(Dimension::Fixed),
                })
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid(format!("shape of \"{}\" has an invalid dim", name)))?;
            info.insert(name, TensorInfo { dtype, shape });
        }
        Ok(info)
    }
}

impl<'a> FromIterator<(&'a str, TensorInfo)> for ValueInfo {
    fn from_iter<I: IntoIterator<Item = (&'a str, TensorInfo)>>(iter: I) -> Self {
        let mut info = ValueInfo::new();
        for (name, entry) in iter {
            info.insert(name, entry);
        }
        info
    }
}
