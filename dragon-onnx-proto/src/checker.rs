//! Structural validation of ONNX models.
//!
//! This performs the checks from `onnx.checker.check_model` which do not
//! require operator schemas: model and graph metadata, SSA form, topological
//! order, and consistency of attribute and tensor payloads.

use std::error::Error;
use std::fmt;

use rustc_hash::FxHashSet;

use crate::onnx;

/// Error returned when a model fails validation.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckError {
    node: Option<String>,
    message: String,
}

impl CheckError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            node: None,
            message: message.into(),
        }
    }

    fn for_node(node: &onnx::NodeProto, index: usize, message: impl Into<String>) -> Self {
        let desc = match node.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!(
                "#{} ({})",
                index,
                node.op_type.as_deref().unwrap_or_default()
            ),
        };
        Self {
            node: Some(desc),
            message: message.into(),
        }
    }

    /// Return a description of the node which failed validation, if the
    /// failure is associated with a node.
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Some(node) => write!(f, "node {}: {}", node, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl Error for CheckError {}

/// Check that `model` is a well-formed ONNX model.
pub fn check_model(model: &onnx::ModelProto) -> Result<(), CheckError> {
    if model.ir_version.is_none() {
        return Err(CheckError::new("model has no ir_version"));
    }
    if model.opset_import.is_empty() {
        return Err(CheckError::new("model has no opset_import"));
    }
    for opset in &model.opset_import {
        if opset.version.is_none() {
            return Err(CheckError::new("opset_import entry has no version"));
        }
    }
    let graph = model
        .graph
        .as_ref()
        .ok_or_else(|| CheckError::new("model has no graph"))?;
    check_graph(graph)
}

/// Check that `graph` is in SSA form and topologically sorted, and that its
/// inputs, outputs and initializers are well-formed.
pub fn check_graph(graph: &onnx::GraphProto) -> Result<(), CheckError> {
    if graph.name.as_deref().unwrap_or_default().is_empty() {
        return Err(CheckError::new("graph has no name"));
    }

    let mut defined: FxHashSet<&str> = FxHashSet::default();

    let mut initializers: FxHashSet<&str> = FxHashSet::default();
    for init in &graph.initializer {
        check_tensor(init)?;
        let name = init.name.as_deref().unwrap_or_default();
        if !initializers.insert(name) {
            return Err(CheckError::new(format!(
                "duplicate initializer \"{}\"",
                name
            )));
        }
    }

    for input in &graph.input {
        check_value_info(input)?;
        let name = input.name.as_deref().unwrap_or_default();
        if !defined.insert(name) {
            return Err(CheckError::new(format!("duplicate graph input \"{}\"", name)));
        }
    }
    // IR version 4 allows initializers which are not also graph inputs.
    defined.extend(initializers.iter().copied());

    for (index, node) in graph.node.iter().enumerate() {
        check_node(node, index)?;
        for input in &node.input {
            // An empty name denotes an omitted optional input.
            if !input.is_empty() && !defined.contains(input.as_str()) {
                return Err(CheckError::for_node(
                    node,
                    index,
                    format!("input \"{}\" is not defined by a preceding node", input),
                ));
            }
        }
        for output in &node.output {
            if output.is_empty() {
                continue;
            }
            if !defined.insert(output.as_str()) {
                return Err(CheckError::for_node(
                    node,
                    index,
                    format!(
                        "output \"{}\" is already defined. Graph must be in SSA form",
                        output
                    ),
                ));
            }
        }
    }

    for output in &graph.output {
        check_value_info(output)?;
        let name = output.name.as_deref().unwrap_or_default();
        if !defined.contains(name) {
            return Err(CheckError::new(format!(
                "graph output \"{}\" is not produced by any node",
                name
            )));
        }
    }

    Ok(())
}

fn check_value_info(value: &onnx::ValueInfoProto) -> Result<(), CheckError> {
    let name = value.name.as_deref().unwrap_or_default();
    if name.is_empty() {
        return Err(CheckError::new("value info has no name"));
    }
    if value.elem_type().is_none() {
        return Err(CheckError::new(format!(
            "value info \"{}\" has no element type",
            name
        )));
    }
    Ok(())
}

fn check_node(node: &onnx::NodeProto, index: usize) -> Result<(), CheckError> {
    if node.op_type.as_deref().unwrap_or_default().is_empty() {
        return Err(CheckError::for_node(node, index, "node has no op_type"));
    }

    let mut attr_names = FxHashSet::default();
    for attr in &node.attribute {
        let name = attr.name.as_deref().unwrap_or_default();
        if name.is_empty() {
            return Err(CheckError::for_node(node, index, "attribute has no name"));
        }
        if !attr_names.insert(name) {
            return Err(CheckError::for_node(
                node,
                index,
                format!("duplicate attribute \"{}\"", name),
            ));
        }
        check_attribute(attr).map_err(|msg| {
            CheckError::for_node(node, index, format!("attribute \"{}\": {}", name, msg))
        })?;
    }
    Ok(())
}

/// Check that exactly the field selected by the attribute's `type` is set.
fn check_attribute(attr: &onnx::AttributeProto) -> Result<(), String> {
    let set_fields = [
        (onnx::AttributeType::FLOAT, attr.f.is_some()),
        (onnx::AttributeType::INT, attr.i.is_some()),
        (onnx::AttributeType::STRING, attr.s.is_some()),
        (onnx::AttributeType::TENSOR, attr.t.is_some()),
        (onnx::AttributeType::GRAPH, attr.g.is_some()),
        (onnx::AttributeType::FLOATS, !attr.floats.is_empty()),
        (onnx::AttributeType::INTS, !attr.ints.is_empty()),
        (onnx::AttributeType::STRINGS, !attr.strings.is_empty()),
    ];

    let Some(attr_type) = attr.r#type else {
        return Err("type is not set".to_string());
    };
    let is_list = matches!(
        attr_type,
        onnx::AttributeType::FLOATS | onnx::AttributeType::INTS | onnx::AttributeType::STRINGS
    );

    for (field_type, is_set) in set_fields {
        if field_type == attr_type {
            // Lists may legitimately be empty.
            if !is_set && !is_list {
                return Err(format!("type is {:?} but the value is not set", attr_type));
            }
        } else if is_set {
            return Err(format!(
                "type is {:?} but a value of type {:?} is set",
                attr_type, field_type
            ));
        }
    }

    if let Some(tensor) = &attr.t {
        check_tensor(tensor).map_err(|err| err.message)?;
    }
    if let Some(graph) = &attr.g {
        check_graph(graph).map_err(|err| err.to_string())?;
    }
    Ok(())
}

/// Check that a tensor's payload matches its type and dims.
fn check_tensor(tensor: &onnx::TensorProto) -> Result<(), CheckError> {
    let name = tensor.name.as_deref().unwrap_or_default();
    let Some(dtype) = tensor.data_type.filter(|dt| *dt != onnx::DataType::UNDEFINED) else {
        return Err(CheckError::new(format!(
            "tensor \"{}\" has no data type",
            name
        )));
    };
    let numel = tensor.numel().ok_or_else(|| {
        CheckError::new(format!(
            "tensor \"{}\" has invalid dims {:?}",
            name, tensor.dims
        ))
    })?;

    if tensor.data_location == Some(onnx::DataLocation::EXTERNAL) {
        return Ok(());
    }

    let mismatch = |actual: usize, expected: usize| {
        CheckError::new(format!(
            "tensor \"{}\" has {} data elements but dims {:?} require {}",
            name, actual, tensor.dims, expected
        ))
    };

    if let Some(raw) = &tensor.raw_data {
        let elt_size = dtype.element_size().ok_or_else(|| {
            CheckError::new(format!(
                "tensor \"{}\" of type {:?} cannot use raw_data",
                name, dtype
            ))
        })?;
        if raw.len() != numel * elt_size {
            return Err(mismatch(raw.len() / elt_size, numel));
        }
        return Ok(());
    }

    let len = match dtype {
        onnx::DataType::FLOAT => tensor.float_data.len(),
        onnx::DataType::DOUBLE => tensor.double_data.len(),
        onnx::DataType::INT64 => tensor.int64_data.len(),
        onnx::DataType::INT32
        | onnx::DataType::INT16
        | onnx::DataType::INT8
        | onnx::DataType::UINT16
        | onnx::DataType::UINT8
        | onnx::DataType::BOOL
        | onnx::DataType::FLOAT16 => tensor.int32_data.len(),
        _ => return Ok(()),
    };
    if len != numel {
        return Err(mismatch(len, numel));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use dragon_onnx_testing::TestCases;

    use super::check_model;
    use crate::helper::{
        make_graph, make_model, make_node, make_opset_id, make_tensor_value_info,
        NodeProtoExt,
    };
    use crate::onnx;

    fn float_input(name: &str) -> onnx::ValueInfoProto {
        make_tensor_value_info(name, onnx::DataType::FLOAT, Some(&[onnx::Dimension::value(2)]))
    }

    fn float_tensor(name: &str, dims: Vec<i64>, data: Vec<f32>) -> onnx::TensorProto {
        onnx::TensorProto {
            name: Some(name.to_string()),
            dims,
            data_type: Some(onnx::DataType::FLOAT),
            float_data: data,
            ..Default::default()
        }
    }

    fn model(graph: onnx::GraphProto) -> onnx::ModelProto {
        make_model(graph, vec![make_opset_id("", 9)], "test")
    }

    #[test]
    fn test_check_valid_model() {
        let graph = make_graph(
            vec![
                make_node("Add", ["a", "w"], ["c"]),
                make_node("Relu", ["c"], ["c/Version_1"]).with_name("relu"),
            ],
            "main",
            vec![float_input("a"), float_input("w")],
            vec![float_input("c/Version_1")],
            vec![float_tensor("w", vec![2], vec![1., 2.])],
        );
        assert_eq!(check_model(&model(graph)), Ok(()));
    }

    #[test]
    fn test_check_invalid_model() {
        #[derive(Debug)]
        struct Case {
            graph: onnx::GraphProto,
            expected: &'static str,
        }

        let cases = [
            Case {
                graph: make_graph(vec![], "", vec![], vec![], vec![]),
                expected: "graph has no name",
            },
            Case {
                graph: make_graph(
                    vec![make_node("Relu", ["x"], ["y"])],
                    "g",
                    vec![],
                    vec![],
                    vec![],
                ),
                expected: "node #0 (Relu): input \"x\" is not defined by a preceding node",
            },
            Case {
                graph: make_graph(
                    vec![
                        make_node("Relu", ["x"], ["y"]),
                        make_node("Relu", ["y"], ["y"]).with_name("second"),
                    ],
                    "g",
                    vec![float_input("x")],
                    vec![],
                    vec![],
                ),
                expected: "node second: output \"y\" is already defined. Graph must be in SSA form",
            },
            Case {
                graph: make_graph(vec![], "g", vec![], vec![float_input("y")], vec![]),
                expected: "graph output \"y\" is not produced by any node",
            },
            Case {
                graph: make_graph(
                    vec![],
                    "g",
                    vec![],
                    vec![],
                    vec![float_tensor("w", vec![2, 2], vec![1., 2.])],
                ),
                expected: "tensor \"w\" has 2 data elements but dims [2, 2] require 4",
            },
            Case {
                graph: make_graph(
                    vec![],
                    "g",
                    vec![],
                    vec![],
                    vec![
                        float_tensor("w", vec![1], vec![1.]),
                        float_tensor("w", vec![1], vec![1.]),
                    ],
                ),
                expected: "duplicate initializer \"w\"",
            },
        ];

        cases.test_each(|case| {
            let err = check_model(&model(case.graph.clone())).unwrap_err();
            assert_eq!(err.to_string(), case.expected);
        })
    }

    #[test]
    fn test_check_attribute_consistency() {
        let mut node = make_node("Concat", ["x"], ["y"]).with_attr("axis", 1i64);
        node.attribute[0].f = Some(1.0);
        let graph = make_graph(vec![node], "g", vec![float_input("x")], vec![], vec![]);

        let err = check_model(&model(graph)).unwrap_err();
        assert_eq!(err.node(), Some("#0 (Concat)"));
        assert!(err.message().starts_with("attribute \"axis\""));
    }

    #[test]
    fn test_check_raw_data_size() {
        let mut tensor = float_tensor("w", vec![2], vec![]);
        tensor.raw_data = Some(vec![0; 8]);
        let graph = make_graph(vec![], "g", vec![], vec![], vec![tensor.clone()]);
        assert_eq!(check_model(&model(graph)), Ok(()));

        tensor.raw_data = Some(vec![0; 4]);
        let graph = make_graph(vec![], "g", vec![], vec![], vec![tensor]);
        assert!(check_model(&model(graph)).is_err());
    }

    #[test]
    fn test_check_model_metadata() {
        let graph = make_graph(vec![], "g", vec![], vec![], vec![]);
        let mut model = model(graph);
        model.opset_import.clear();
        assert_eq!(
            check_model(&model).unwrap_err().to_string(),
            "model has no opset_import"
        );
    }
}
