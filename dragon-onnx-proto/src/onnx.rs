//! ONNX model Protocol Buffers types.
//!
//! The types in this module correspond to Protocol Buffers messages defined
//! in [onnx.proto](https://github.com/onnx/onnx/blob/main/onnx/onnx.proto).
//! See the `.proto` file for detailed information on each type and field.
//!
//! These types are not complete. They only contain messages and fields which
//! the exporter writes. Repeated numeric fields are encoded packed or unpacked
//! following their declaration in `onnx.proto`, so the output matches the
//! reference serializer byte for byte.

use crate::protobuf::{EncodeMessage, FieldWriter};

/// IR version written into exported models.
///
/// Version 4 is the IR version which accompanies operator set 9.
pub const IR_VERSION: i64 = 4;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct AttributeType(pub i32);

impl AttributeType {
    pub const UNDEFINED: Self = Self(0);
    pub const FLOAT: Self = Self(1);
    pub const INT: Self = Self(2);
    pub const STRING: Self = Self(3);
    pub const TENSOR: Self = Self(4);
    pub const GRAPH: Self = Self(5);
    pub const FLOATS: Self = Self(6);
    pub const INTS: Self = Self(7);
    pub const STRINGS: Self = Self(8);
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeProto {
    pub name: Option<String>,
    pub f: Option<f32>,
    pub i: Option<i64>,
    pub s: Option<String>,
    pub t: Option<TensorProto>,
    pub g: Option<GraphProto>,
    pub floats: Vec<f32>,
    pub ints: Vec<i64>,
    pub strings: Vec<String>,
    pub r#type: Option<AttributeType>,
}

impl AttributeProto {
    const NAME: u64 = 1;
    const F: u64 = 2;
    const I: u64 = 3;
    const S: u64 = 4;
    const T: u64 = 5;
    const G: u64 = 6;
    const FLOATS: u64 = 7;
    const INTS: u64 = 8;
    const STRINGS: u64 = 9;
    const TYPE: u64 = 20;
}

impl EncodeMessage for AttributeProto {
    fn encode_fields(&self, writer: &mut FieldWriter) {
        if let Some(name) = &self.name {
            writer.write_string(Self::NAME, name);
        }
        if let Some(f) = self.f {
            writer.write_float(Self::F, f);
        }
        if let Some(i) = self.i {
            writer.write_int64(Self::I, i);
        }
        if let Some(s) = &self.s {
            writer.write_bytes(Self::S, s.as_bytes());
        }
        if let Some(t) = &self.t {
            writer.write_message(Self::T, t);
        }
        if let Some(g) = &self.g {
            writer.write_message(Self::G, g);
        }
        writer.write_repeated_float(Self::FLOATS, &self.floats);
        writer.write_repeated_int64(Self::INTS, &self.ints);
        for s in &self.strings {
            writer.write_bytes(Self::STRINGS, s.as_bytes());
        }
        if let Some(ty) = self.r#type {
            writer.write_enum(Self::TYPE, ty.0);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeProto {
    pub input: Vec<String>,
    pub output: Vec<String>,
    pub name: Option<String>,
    pub op_type: Option<String>,
    pub attribute: Vec<AttributeProto>,
    pub doc_string: Option<String>,
    pub domain: Option<String>,
}

impl NodeProto {
    const INPUT: u64 = 1;
    const OUTPUT: u64 = 2;
    const NAME: u64 = 3;
    const OP_TYPE: u64 = 4;
    const ATTRIBUTE: u64 = 5;
    const DOC_STRING: u64 = 6;
    const DOMAIN: u64 = 7;

    /// Return the value of the attribute called `name`, if present.
    pub fn get_attr(&self, name: &str) -> Option<&AttributeProto> {
        self.attribute
            .iter()
            .find(|attr| attr.name.as_deref() == Some(name))
    }
}

impl EncodeMessage for NodeProto {
    fn encode_fields(&self, writer: &mut FieldWriter) {
        writer.write_strings(Self::INPUT, &self.input);
        writer.write_strings(Self::OUTPUT, &self.output);
        if let Some(name) = &self.name {
            writer.write_string(Self::NAME, name);
        }
        if let Some(op_type) = &self.op_type {
            writer.write_string(Self::OP_TYPE, op_type);
        }
        writer.write_messages(Self::ATTRIBUTE, &self.attribute);
        if let Some(doc) = &self.doc_string {
            writer.write_string(Self::DOC_STRING, doc);
        }
        if let Some(domain) = &self.domain {
            writer.write_string(Self::DOMAIN, domain);
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DataType(pub i32);

impl DataType {
    pub const UNDEFINED: Self = Self(0);
    pub const FLOAT: Self = Self(1);
    pub const UINT8: Self = Self(2);
    pub const INT8: Self = Self(3);
    pub const UINT16: Self = Self(4);
    pub const INT16: Self = Self(5);
    pub const INT32: Self = Self(6);
    pub const INT64: Self = Self(7);
    pub const STRING: Self = Self(8);
    pub const BOOL: Self = Self(9);
    pub const FLOAT16: Self = Self(10);
    pub const DOUBLE: Self = Self(11);
    pub const UINT32: Self = Self(12);
    pub const UINT64: Self = Self(13);

    /// Return the upper-case name used for this type in `onnx.proto`.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::FLOAT => "FLOAT",
            Self::UINT8 => "UINT8",
            Self::INT8 => "INT8",
            Self::UINT16 => "UINT16",
            Self::INT16 => "INT16",
            Self::INT32 => "INT32",
            Self::INT64 => "INT64",
            Self::STRING => "STRING",
            Self::BOOL => "BOOL",
            Self::FLOAT16 => "FLOAT16",
            Self::DOUBLE => "DOUBLE",
            Self::UINT32 => "UINT32",
            Self::UINT64 => "UINT64",
            _ => return None,
        };
        Some(name)
    }

    /// Return the size in bytes of one element of this type in
    /// `TensorProto.raw_data`, or `None` for variable-size or unknown types.
    pub fn element_size(self) -> Option<usize> {
        let size = match self {
            Self::UINT8 | Self::INT8 | Self::BOOL => 1,
            Self::UINT16 | Self::INT16 | Self::FLOAT16 => 2,
            Self::FLOAT | Self::INT32 | Self::UINT32 => 4,
            Self::INT64 | Self::DOUBLE | Self::UINT64 => 8,
            _ => return None,
        };
        Some(size)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DataLocation(pub i32);

impl DataLocation {
    pub const DEFAULT: Self = Self(0);
    pub const EXTERNAL: Self = Self(1);
}

#[derive(Clone, Default, PartialEq)]
pub struct TensorProto {
    pub dims: Vec<i64>,
    pub data_type: Option<DataType>,
    pub float_data: Vec<f32>,
    pub int32_data: Vec<i32>,
    pub int64_data: Vec<i64>,
    pub name: Option<String>,

    /// Field containing tensor data as bytes in packed little-endian order.
    pub raw_data: Option<Vec<u8>>,

    pub double_data: Vec<f64>,
    pub data_location: Option<DataLocation>,
}

impl TensorProto {
    const DIMS: u64 = 1;
    const DATA_TYPE: u64 = 2;
    const FLOAT_DATA: u64 = 4;
    const INT32_DATA: u64 = 5;
    const INT64_DATA: u64 = 7;
    const NAME: u64 = 8;
    const RAW_DATA: u64 = 9;
    const DOUBLE_DATA: u64 = 10;
    const DATA_LOCATION: u64 = 14;

    /// Return the number of elements implied by `dims`.
    ///
    /// A tensor with no dims is a scalar and has one element.
    pub fn numel(&self) -> Option<usize> {
        self.dims.iter().try_fold(1usize, |acc, &dim| {
            let dim: usize = dim.try_into().ok()?;
            acc.checked_mul(dim)
        })
    }
}

impl std::fmt::Debug for TensorProto {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_struct("TensorProto")
            .field("dims", &self.dims)
            .field("data_type", &self.data_type)
            .field("name", &self.name)
            .field("raw_data_len", &self.raw_data.as_ref().map(|d| d.len()))
            .finish()
    }
}

impl EncodeMessage for TensorProto {
    fn encode_fields(&self, writer: &mut FieldWriter) {
        writer.write_repeated_int64(Self::DIMS, &self.dims);
        if let Some(dtype) = self.data_type {
            writer.write_int32(Self::DATA_TYPE, dtype.0);
        }
        writer.write_packed_float(Self::FLOAT_DATA, &self.float_data);
        writer.write_packed_int32(Self::INT32_DATA, &self.int32_data);
        writer.write_packed_int64(Self::INT64_DATA, &self.int64_data);
        if let Some(name) = &self.name {
            writer.write_string(Self::NAME, name);
        }
        if let Some(raw) = &self.raw_data {
            writer.write_bytes(Self::RAW_DATA, raw);
        }
        writer.write_packed_double(Self::DOUBLE_DATA, &self.double_data);
        if let Some(loc) = self.data_location {
            writer.write_enum(Self::DATA_LOCATION, loc.0);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dimension {
    pub dim_value: Option<i64>,
    pub dim_param: Option<String>,
}

impl Dimension {
    const DIM_VALUE: u64 = 1;
    const DIM_PARAM: u64 = 2;

    /// Create a dimension with a fixed size.
    pub fn value(size: i64) -> Self {
        Self {
            dim_value: Some(size),
            dim_param: None,
        }
    }

    /// Create a dimension whose size is given by a named parameter.
    pub fn param(name: &str) -> Self {
        Self {
            dim_value: None,
            dim_param: Some(name.to_string()),
        }
    }
}

impl EncodeMessage for Dimension {
    fn encode_fields(&self, writer: &mut FieldWriter) {
        if let Some(value) = self.dim_value {
            writer.write_int64(Self::DIM_VALUE, value);
        }
        if let Some(param) = &self.dim_param {
            writer.write_string(Self::DIM_PARAM, param);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TensorShapeProto {
    pub dim: Vec<Dimension>,
}

impl TensorShapeProto {
    const DIM: u64 = 1;
}

impl EncodeMessage for TensorShapeProto {
    fn encode_fields(&self, writer: &mut FieldWriter) {
        writer.write_messages(Self::DIM, &self.dim);
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeProtoTensor {
    pub elem_type: Option<DataType>,
    pub shape: Option<TensorShapeProto>,
}

impl TypeProtoTensor {
    const ELEM_TYPE: u64 = 1; // DataType
    const SHAPE: u64 = 2; // TensorShapeProto
}

impl EncodeMessage for TypeProtoTensor {
    fn encode_fields(&self, writer: &mut FieldWriter) {
        if let Some(elem_type) = self.elem_type {
            writer.write_int32(Self::ELEM_TYPE, elem_type.0);
        }
        if let Some(shape) = &self.shape {
            writer.write_message(Self::SHAPE, shape);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TypeProto {
    pub tensor_type: Option<TypeProtoTensor>,
}

impl TypeProto {
    const TENSOR_TYPE: u64 = 1;
}

impl EncodeMessage for TypeProto {
    fn encode_fields(&self, writer: &mut FieldWriter) {
        if let Some(tensor_type) = &self.tensor_type {
            writer.write_message(Self::TENSOR_TYPE, tensor_type);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValueInfoProto {
    pub name: Option<String>,
    pub r#type: Option<TypeProto>,
}

impl ValueInfoProto {
    const NAME: u64 = 1;
    const TYPE: u64 = 2;

    /// Return the tensor element type, if specified.
    pub fn elem_type(&self) -> Option<DataType> {
        self.r#type.as_ref()?.tensor_type.as_ref()?.elem_type
    }

    /// Return the tensor shape, if specified.
    pub fn shape(&self) -> Option<&TensorShapeProto> {
        self.r#type.as_ref()?.tensor_type.as_ref()?.shape.as_ref()
    }
}

impl EncodeMessage for ValueInfoProto {
    fn encode_fields(&self, writer: &mut FieldWriter) {
        if let Some(name) = &self.name {
            writer.write_string(Self::NAME, name);
        }
        if let Some(ty) = &self.r#type {
            writer.write_message(Self::TYPE, ty);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphProto {
    pub node: Vec<NodeProto>,
    pub name: Option<String>,
    pub initializer: Vec<TensorProto>,
    pub doc_string: Option<String>,
    pub input: Vec<ValueInfoProto>,
    pub output: Vec<ValueInfoProto>,
    pub value_info: Vec<ValueInfoProto>,
}

impl GraphProto {
    const NODE: u64 = 1;
    const NAME: u64 = 2;
    const INITIALIZER: u64 = 5;
    const DOC_STRING: u64 = 10;
    const INPUT: u64 = 11;
    const OUTPUT: u64 = 12;
    const VALUE_INFO: u64 = 13;
}

impl EncodeMessage for GraphProto {
    fn encode_fields(&self, writer: &mut FieldWriter) {
        writer.write_messages(Self::NODE, &self.node);
        if let Some(name) = &self.name {
            writer.write_string(Self::NAME, name);
        }
        writer.write_messages(Self::INITIALIZER, &self.initializer);
        if let Some(doc) = &self.doc_string {
            writer.write_string(Self::DOC_STRING, doc);
        }
        writer.write_messages(Self::INPUT, &self.input);
        writer.write_messages(Self::OUTPUT, &self.output);
        writer.write_messages(Self::VALUE_INFO, &self.value_info);
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct OperatorSetIdProto {
    pub domain: Option<String>,
    pub version: Option<i64>,
}

impl OperatorSetIdProto {
    const DOMAIN: u64 = 1;
    const VERSION: u64 = 2;
}

impl EncodeMessage for OperatorSetIdProto {
    fn encode_fields(&self, writer: &mut FieldWriter) {
        if let Some(domain) = &self.domain {
            writer.write_string(Self::DOMAIN, domain);
        }
        if let Some(version) = self.version {
            writer.write_int64(Self::VERSION, version);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelProto {
    pub ir_version: Option<i64>,
    pub producer_name: Option<String>,
    pub producer_version: Option<String>,
    pub domain: Option<String>,
    pub model_version: Option<i64>,
    pub doc_string: Option<String>,
    pub graph: Option<GraphProto>,
    pub opset_import: Vec<OperatorSetIdProto>,
}

impl ModelProto {
    const IR_VERSION: u64 = 1;
    const PRODUCER_NAME: u64 = 2;
    const PRODUCER_VERSION: u64 = 3;
    const DOMAIN: u64 = 4;
    const MODEL_VERSION: u64 = 5;
    const DOC_STRING: u64 = 6;
    const GRAPH: u64 = 7;
    const OPSET_IMPORT: u64 = 8;
}

impl EncodeMessage for ModelProto {
    fn encode_fields(&self, writer: &mut FieldWriter) {
        if let Some(ir_version) = self.ir_version {
            writer.write_int64(Self::IR_VERSION, ir_version);
        }
        if let Some(name) = &self.producer_name {
            writer.write_string(Self::PRODUCER_NAME, name);
        }
        if let Some(version) = &self.producer_version {
            writer.write_string(Self::PRODUCER_VERSION, version);
        }
        if let Some(domain) = &self.domain {
            writer.write_string(Self::DOMAIN, domain);
        }
        if let Some(version) = self.model_version {
            writer.write_int64(Self::MODEL_VERSION, version);
        }
        if let Some(doc) = &self.doc_string {
            writer.write_string(Self::DOC_STRING, doc);
        }
        if let Some(graph) = &self.graph {
            writer.write_message(Self::GRAPH, graph);
        }
        writer.write_messages(Self::OPSET_IMPORT, &self.opset_import);
    }
}
