//! Utilities for building ONNX protobuf messages.
//!
//! These correspond to the `make_*` functions in the `onnx.helper` Python
//! module.

use std::fmt::Write;

use crate::onnx;

#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Float(f32),
    Int(i64),
    String(String),
    Tensor(onnx::TensorProto),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
}

macro_rules! attr_value_from {
    ($variant:ident, $from:ty) => {
        impl From<$from> for AttrValue {
            fn from(val: $from) -> Self {
                Self::$variant(val)
            }
        }
    };
}

attr_value_from!(Float, f32);
attr_value_from!(Int, i64);
attr_value_from!(String, String);
attr_value_from!(Tensor, onnx::TensorProto);
attr_value_from!(Floats, Vec<f32>);
attr_value_from!(Ints, Vec<i64>);
attr_value_from!(Strings, Vec<String>);

impl From<bool> for AttrValue {
    fn from(val: bool) -> Self {
        Self::Int(val as i64)
    }
}

impl From<&str> for AttrValue {
    fn from(val: &str) -> Self {
        Self::String(val.to_string())
    }
}

/// Create an attribute with the `type` field set to match `value`.
pub fn make_attribute(name: &str, value: impl Into<AttrValue>) -> onnx::AttributeProto {
    let mut attr = onnx::AttributeProto {
        name: Some(name.to_string()),
        ..Default::default()
    };
    let attr_type = match value.into() {
        AttrValue::Float(val) => {
            attr.f = Some(val);
            onnx::AttributeType::FLOAT
        }
        AttrValue::Int(val) => {
            attr.i = Some(val);
            onnx::AttributeType::INT
        }
        AttrValue::String(val) => {
            attr.s = Some(val);
            onnx::AttributeType::STRING
        }
        AttrValue::Tensor(val) => {
            attr.t = Some(val);
            onnx::AttributeType::TENSOR
        }
        AttrValue::Floats(val) => {
            attr.floats = val;
            onnx::AttributeType::FLOATS
        }
        AttrValue::Ints(val) => {
            attr.ints = val;
            onnx::AttributeType::INTS
        }
        AttrValue::Strings(val) => {
            attr.strings = val;
            onnx::AttributeType::STRINGS
        }
    };
    attr.r#type = Some(attr_type);
    attr
}

/// Create a node in the default ONNX domain.
pub fn make_node<I, O>(op_type: &str, inputs: I, outputs: O) -> onnx::NodeProto
where
    I: IntoIterator,
    I::Item: Into<String>,
    O: IntoIterator,
    O::Item: Into<String>,
{
    onnx::NodeProto {
        input: inputs.into_iter().map(|s| s.into()).collect(),
        output: outputs.into_iter().map(|s| s.into()).collect(),
        op_type: Some(op_type.to_string()),
        ..Default::default()
    }
}

/// Fluent methods for building an [`onnx::NodeProto`].
pub trait NodeProtoExt {
    fn with_attr(self, name: &str, value: impl Into<AttrValue>) -> Self;
    fn with_name(self, name: &str) -> Self;
}

impl NodeProtoExt for onnx::NodeProto {
    fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attribute.push(make_attribute(name, value));
        self
    }

    /// Set the node name. Empty names are left unset.
    fn with_name(mut self, name: &str) -> Self {
        if !name.is_empty() {
            self.name = Some(name.to_string());
        }
        self
    }
}

/// Create a `ValueInfoProto` describing a tensor.
///
/// If `shape` is `None`, the value has a known element type but unknown rank.
pub fn make_tensor_value_info(
    name: &str,
    elem_type: onnx::DataType,
    shape: Option<&[onnx::Dimension]>,
) -> onnx::ValueInfoProto {
    let shape = shape.map(|dims| onnx::TensorShapeProto { dim: dims.to_vec() });
    onnx::ValueInfoProto {
        name: Some(name.to_string()),
        r#type: Some(onnx::TypeProto {
            tensor_type: Some(onnx::TypeProtoTensor {
                elem_type: Some(elem_type),
                shape,
            }),
        }),
    }
}

/// Create a `ValueInfoProto` describing an initializer, using its data type
/// and dims.
pub fn value_info_of_tensor(tensor: &onnx::TensorProto) -> onnx::ValueInfoProto {
    let dims: Vec<_> = tensor
        .dims
        .iter()
        .copied()
        .map(onnx::Dimension::value)
        .collect();
    make_tensor_value_info(
        tensor.name.as_deref().unwrap_or_default(),
        tensor.data_type.unwrap_or(onnx::DataType::UNDEFINED),
        Some(&dims),
    )
}

pub fn make_graph(
    nodes: Vec<onnx::NodeProto>,
    name: &str,
    inputs: Vec<onnx::ValueInfoProto>,
    outputs: Vec<onnx::ValueInfoProto>,
    initializer: Vec<onnx::TensorProto>,
) -> onnx::GraphProto {
    onnx::GraphProto {
        node: nodes,
        name: Some(name.to_string()),
        initializer,
        input: inputs,
        output: outputs,
        ..Default::default()
    }
}

pub fn make_opset_id(domain: &str, version: i64) -> onnx::OperatorSetIdProto {
    onnx::OperatorSetIdProto {
        domain: Some(domain.to_string()),
        version: Some(version),
    }
}

/// Wrap a graph in a model with the current [`IR_VERSION`](onnx::IR_VERSION).
pub fn make_model(
    graph: onnx::GraphProto,
    opset_imports: Vec<onnx::OperatorSetIdProto>,
    producer_name: &str,
) -> onnx::ModelProto {
    onnx::ModelProto {
        ir_version: Some(onnx::IR_VERSION),
        producer_name: Some(producer_name.to_string()),
        graph: Some(graph),
        opset_import: opset_imports,
        ..Default::default()
    }
}

fn format_value_info(out: &mut String, value: &onnx::ValueInfoProto) {
    let name = value.name.as_deref().unwrap_or_default();
    let elem_type = value
        .elem_type()
        .and_then(|dt| dt.name())
        .unwrap_or("UNDEFINED");
    let _ = write!(out, "%{}[{}", name, elem_type);
    if let Some(shape) = value.shape() {
        let dims: Vec<String> = shape
            .dim
            .iter()
            .map(|dim| match (&dim.dim_value, &dim.dim_param) {
                (Some(value), _) => value.to_string(),
                (None, Some(param)) => param.clone(),
                (None, None) => "?".to_string(),
            })
            .collect();
        let _ = write!(out, ", {}", dims.join("x"));
    }
    out.push(']');
}

fn format_attr(out: &mut String, attr: &onnx::AttributeProto) {
    let name = attr.name.as_deref().unwrap_or_default();
    let _ = write!(out, "{} = ", name);
    match attr.r#type {
        Some(onnx::AttributeType::FLOAT) => {
            let _ = write!(out, "{:?}", attr.f.unwrap_or_default());
        }
        Some(onnx::AttributeType::INT) => {
            let _ = write!(out, "{}", attr.i.unwrap_or_default());
        }
        Some(onnx::AttributeType::STRING) => {
            let _ = write!(out, "'{}'", attr.s.as_deref().unwrap_or_default());
        }
        Some(onnx::AttributeType::FLOATS) => {
            let _ = write!(out, "{:?}", attr.floats);
        }
        Some(onnx::AttributeType::INTS) => {
            let _ = write!(out, "{:?}", attr.ints);
        }
        Some(onnx::AttributeType::STRINGS) => {
            let _ = write!(out, "{:?}", attr.strings);
        }
        Some(onnx::AttributeType::TENSOR) => out.push_str("<Tensor>"),
        Some(onnx::AttributeType::GRAPH) => out.push_str("<Graph>"),
        _ => out.push_str("<Unknown>"),
    }
}

/// Format a graph as human readable text, in the style of
/// `onnx.helper.printable_graph`.
///
/// ```text
/// graph main (
///   %x[FLOAT, 1x3]
/// ) initializers (
///   %w[FLOAT, 3x4]
/// ) {
///   %y = MatMul(%x, %w)
///   return %y
/// }
/// ```
pub fn printable_graph(graph: &onnx::GraphProto) -> String {
    let mut out = String::new();
    let name = graph.name.as_deref().unwrap_or_default();
    let initializer_names: rustc_hash::FxHashSet<&str> = graph
        .initializer
        .iter()
        .filter_map(|init| init.name.as_deref())
        .collect();

    let _ = writeln!(out, "graph {} (", name);
    let (inits, inputs): (Vec<_>, Vec<_>) = graph.input.iter().partition(|input| {
        input
            .name
            .as_deref()
            .is_some_and(|name| initializer_names.contains(name))
    });
    for input in inputs {
        out.push_str("  ");
        format_value_info(&mut out, input);
        out.push('\n');
    }
    if inits.is_empty() {
        out.push_str(") {\n");
    } else {
        out.push_str(") initializers (\n");
        for init in inits {
            out.push_str("  ");
            format_value_info(&mut out, init);
            out.push('\n');
        }
        out.push_str(") {\n");
    }

    for node in &graph.node {
        let outputs: Vec<String> = node.output.iter().map(|o| format!("%{}", o)).collect();
        let inputs: Vec<String> = node.input.iter().map(|i| format!("%{}", i)).collect();
        let _ = write!(
            out,
            "  {} = {}",
            outputs.join(", "),
            node.op_type.as_deref().unwrap_or_default()
        );
        if !node.attribute.is_empty() {
            out.push('[');
            for (i, attr) in node.attribute.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                format_attr(&mut out, attr);
            }
            out.push(']');
        }
        let _ = writeln!(out, "({})", inputs.join(", "));
    }

    let outputs: Vec<String> = graph
        .output
        .iter()
        .map(|o| format!("%{}", o.name.as_deref().unwrap_or_default()))
        .collect();
    let _ = writeln!(out, "  return {}", outputs.join(", "));
    out.push('}');
    out
}
