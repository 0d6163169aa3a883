//! Assembly of translated nodes, initializers and boundary value info into
//! an ONNX graph.

use dragon_onnx_proto::helper::{make_graph, value_info_of_tensor};
use dragon_onnx_proto::onnx;
use rustc_hash::FxHashSet;

use crate::error::{ExportError, ExportErrorImpl};
use crate::resolve::Resolved;
use crate::ssa::SsaState;
use crate::value_info::TensorInfo;
use crate::workspace::Workspace;

/// Build an ONNX graph.
///
/// `constants` are the caller's constants followed by constants created
/// while translating operators. Each becomes an initializer and, unless a
/// graph input of the same name already exists, a graph input.
///
/// Graph outputs are listed in the order of `outputs` with duplicates
/// removed, and refer to the final version of each tensor in `ssa`.
pub(crate) fn assemble_graph(
    name: &str,
    resolved: Resolved,
    constants: Vec<onnx::TensorProto>,
    nodes: Vec<onnx::NodeProto>,
    outputs: &[String],
    ssa: &SsaState,
    ws: Option<&dyn Workspace>,
) -> Result<onnx::GraphProto, ExportError> {
    let Resolved {
        value_info,
        leaves,
        initializers: mut initializer,
        ..
    } = resolved;

    let mut inputs = Vec::with_capacity(leaves.len() + constants.len());
    let mut declared: FxHashSet<String> = FxHashSet::default();
    for leaf in &leaves {
        let input = if let Some(info) = value_info.get(leaf) {
            info.to_proto(leaf)
        } else if let Some(init) = initializer
            .iter()
            .find(|init| init.name.as_deref() == Some(leaf.as_str()))
        {
            value_info_of_tensor(init)
        } else {
            return Err(ExportErrorImpl::MissingShape(leaf.clone()).into());
        };
        inputs.push(input);
        declared.insert(leaf.clone());
    }

    for constant in &constants {
        let name = constant.name.as_deref().unwrap_or_default();
        if declared.insert(name.to_string()) {
            inputs.push(value_info_of_tensor(constant));
        }
    }
    initializer.extend(constants);

    let mut seen = FxHashSet::default();
    let mut graph_outputs = Vec::new();
    for output in outputs {
        if !seen.insert(output.as_str()) {
            continue;
        }
        let info = match value_info.get(output) {
            Some(info) => info.clone(),
            None => ws
                .and_then(|ws| ws.tensor_meta(output))
                .map(|meta| TensorInfo::of_meta(&meta))
                .ok_or_else(|| ExportErrorImpl::MissingShape(output.clone()))?,
        };
        graph_outputs.push(info.to_proto(ssa.current_name(output)));
    }

    Ok(make_graph(nodes, name, inputs, graph_outputs, initializer))
}

#[cfg(test)]
mod tests {
    use dragon_onnx_proto::helper::make_node;
    use dragon_onnx_proto::onnx;

    use super::assemble_graph;
    use crate::error::ExportErrorKind;
    use crate::graph_def::OperatorDef;
    use crate::resolve::Resolved;
    use crate::ssa::SsaState;
    use crate::value::{DataType, Tensor};
    use crate::value_info::{TensorInfo, ValueInfo};

    fn names(values: &[onnx::ValueInfoProto]) -> Vec<&str> {
        values
            .iter()
            .map(|v| v.name.as_deref().unwrap_or_default())
            .collect()
    }

    fn resolved(value_info: ValueInfo, leaves: &[&str]) -> Resolved {
        Resolved {
            value_info,
            leaves: leaves.iter().map(|s| s.to_string()).collect(),
            initializers: vec![Tensor::from_vec(vec![1f32, 2.]).to_proto("b")],
            has_run: false,
        }
    }

    #[test]
    fn test_assemble_graph() {
        let info = TensorInfo::new(DataType::Float, [2usize]);
        let value_info = ValueInfo::new()
            .with("a", info.clone())
            .with("c", info.clone());

        let mut ssa = SsaState::new();
        let first = ssa.rewrite(&OperatorDef::new("Add").with_inputs(&["a", "b"]).with_output("c"));
        let second = ssa.rewrite(&OperatorDef::new("Add").with_inputs(&["c", "a"]).with_output("c"));
        let nodes = vec![
            make_node("Add", &first.input, &first.output),
            make_node("Add", &second.input, &second.output),
        ];
        let constants = vec![
            Tensor::from_vec(vec![0f32]).to_proto("k"),
            Tensor::from_vec(vec![1i64]).to_proto("a"),
        ];
        let outputs = ["c".to_string(), "c".to_string()];

        let graph = assemble_graph(
            "g",
            resolved(value_info, &["a", "b"]),
            constants,
            nodes,
            &outputs,
            &ssa,
            None,
        )
        .unwrap();

        assert_eq!(graph.name.as_deref(), Some("g"));
        assert_eq!(names(&graph.input), ["a", "b", "k"]);
        assert_eq!(names(&graph.output), ["c/Version_1"]);
        let init_names: Vec<_> = graph
            .initializer
            .iter()
            .map(|init| init.name.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(init_names, ["b", "k", "a"]);
        assert_eq!(graph.node.len(), 2);

        // `b` has no supplied value info, so its type comes from the
        // initializer.
        assert_eq!(graph.input[1].elem_type(), Some(onnx::DataType::FLOAT));
    }

    #[test]
    fn test_assemble_graph_missing_output_info() {
        let value_info =
            ValueInfo::new().with("a", TensorInfo::new(DataType::Float, [2usize]));
        let err = assemble_graph(
            "g",
            resolved(value_info, &["a"]),
            Vec::new(),
            Vec::new(),
            &["y".to_string()],
            &SsaState::new(),
            None,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ExportErrorKind::MissingValueInfo);
        assert_eq!(err.to_string(), "shape of \"y\" is unknown");
    }
}
