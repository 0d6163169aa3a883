//! Determine the type and shape of every tensor a graph uses, running the
//! graph if necessary.

use dragon_onnx_proto::onnx;
use rustc_hash::FxHashSet;

use crate::error::{ExportError, ExportErrorImpl};
use crate::frontend::ExportOptions;
use crate::graph_def::GraphDef;
use crate::value_info::{TensorInfo, ValueInfo};
use crate::workspace::{fetch_initializer, native_run_graph, RandomInputs, Workspace};

/// Type and shape information gathered before translating a graph.
#[derive(Debug)]
pub(crate) struct Resolved {
    /// Types and shapes of graph inputs and outputs, initializers and
    /// constants.
    pub value_info: ValueInfo,

    /// Tensors consumed but not produced by the graph, in order of first use.
    pub leaves: Vec<String>,

    /// Values of leaves which are parameters held by the workspace.
    pub initializers: Vec<onnx::TensorProto>,

    /// True if the workspace holds the values computed by a run of the
    /// graph, and can be used to fold operators to constants.
    pub has_run: bool,
}

/// Return the names of leaves which are initializers.
///
/// These are leaves without supplied value info which the workspace holds a
/// value for.
pub(crate) fn extract_initializer(
    leaves: &[String],
    value_info: &ValueInfo,
    ws: &dyn Workspace,
) -> Vec<String> {
    leaves
        .iter()
        .filter(|name| !value_info.contains(name) && ws.has_tensor(name))
        .cloned()
        .collect()
}

/// Gather the value info needed to translate `graph`.
///
/// Fails if the type and shape of a graph input cannot be determined. If
/// any operator uses a tensor whose type and shape are unknown, the graph is
/// run once in `ws` with random inputs, unless the options say the graph has
/// already been run.
pub(crate) fn resolve(
    graph: &GraphDef,
    ws: &mut dyn Workspace,
    opts: &ExportOptions,
) -> Result<Resolved, ExportError> {
    let mut value_info = opts.value_info.clone();
    let leaves: Vec<String> = graph
        .leaf_tensors()
        .into_iter()
        .map(String::from)
        .collect();
    let initializer_names = extract_initializer(&leaves, &value_info, ws);

    let constants: FxHashSet<&str> = opts.constants.iter().map(|(name, _)| name.as_str()).collect();
    if let Some(name) = initializer_names.iter().find(|name| constants.contains(name.as_str())) {
        return Err(ExportErrorImpl::DuplicateConstant(name.clone()).into());
    }

    let initializer_set: FxHashSet<&str> = initializer_names.iter().map(String::as_str).collect();
    let is_known = |name: &str| {
        value_info.contains(name) || initializer_set.contains(name) || constants.contains(name)
    };

    let missing: Vec<String> = leaves
        .iter()
        .filter(|name| !is_known(name.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ExportErrorImpl::MissingInputInfo(missing).into());
    }

    let needs_execution = graph
        .op
        .iter()
        .flat_map(|op| op.input.iter().chain(&op.output))
        .any(|name| !name.is_empty() && !is_known(name.as_str()));

    let (initializers, has_run) = if needs_execution && !opts.enforce_no_running {
        log::debug!("Value info is incomplete. Running graph \"{}\"", graph.name);

        let mut rng = RandomInputs::new(opts.seed);
        let mut inputs: Vec<_> = leaves
            .iter()
            .filter_map(|name| {
                let info = value_info.get(name)?;
                Some((name.clone(), rng.generate(info)))
            })
            .collect();
        inputs.extend(opts.constants.iter().cloned());

        let run = native_run_graph(
            ws,
            graph,
            inputs,
            &initializer_names,
            opts.init_func.as_deref(),
        )?;
        for (name, value) in &run.outputs {
            value_info.insert(name, TensorInfo::of_tensor(value));
        }
        (run.initializers, true)
    } else {
        if opts.enforce_no_running {
            log::debug!("Using values from the existing run of \"{}\"", graph.name);
        }
        (
            fetch_initializer(ws, &initializer_names)?,
            opts.enforce_no_running,
        )
    };

    for init in &initializers {
        if let (Some(name), Some(info)) = (init.name.as_deref(), TensorInfo::of_proto(init)) {
            value_info.insert(name, info);
        }
    }
    for (name, value) in &opts.constants {
        value_info.insert(name, TensorInfo::of_tensor(value));
    }

    Ok(Resolved {
        value_info,
        leaves,
        initializers,
        has_run,
    })
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashMap;

    use super::{extract_initializer, resolve};
    use crate::error::{ExecutionError, ExportErrorKind};
    use crate::frontend::ExportOptions;
    use crate::graph_def::{GraphDef, OperatorDef};
    use crate::value::{DataType, Tensor, ValueMeta};
    use crate::value_info::{TensorInfo, ValueInfo};
    use crate::workspace::{EmptyWorkspace, Workspace};

    /// Workspace whose engine copies the first input of each operator to its
    /// outputs.
    #[derive(Default)]
    struct CopyWorkspace {
        tensors: FxHashMap<String, Tensor>,
        runs: usize,
    }

    impl CopyWorkspace {
        fn with_tensor(mut self, name: &str, value: Tensor) -> Self {
            self.tensors.insert(name.to_string(), value);
            self
        }
    }

    impl Workspace for CopyWorkspace {
        fn has_tensor(&self, name: &str) -> bool {
            self.tensors.contains_key(name)
        }

        fn fetch_tensor(&self, name: &str) -> Option<Tensor> {
            self.tensors.get(name).cloned()
        }

        fn tensor_meta(&self, name: &str) -> Option<ValueMeta> {
            self.tensors.get(name).map(Tensor::meta)
        }

        fn feed_tensor(&mut self, name: &str, value: Tensor) -> Result<(), ExecutionError> {
            self.tensors.insert(name.to_string(), value);
            Ok(())
        }

        fn run_graph(&mut self, graph: &GraphDef) -> Result<(), ExecutionError> {
            self.runs += 1;
            for op in &graph.op {
                let value = self
                    .fetch_tensor(&op.input[0])
                    .ok_or_else(|| ExecutionError::TensorNotFound(op.input[0].clone()))?;
                for output in &op.output {
                    self.tensors.insert(output.clone(), value.clone());
                }
            }
            Ok(())
        }
    }

    fn fc_graph() -> GraphDef {
        GraphDef::new("fc")
            .with_op(
                OperatorDef::new("FullyConnected")
                    .with_inputs(&["x", "w"])
                    .with_output("y"),
            )
            .with_output("y")
    }

    fn x_info() -> ValueInfo {
        ValueInfo::new().with("x", TensorInfo::new(DataType::Float, [2usize, 3]))
    }

    #[test]
    fn test_extract_initializer() {
        let ws = CopyWorkspace::default().with_tensor("w", Tensor::from_vec(vec![1f32, 2.]));
        let leaves = ["x".to_string(), "w".to_string(), "b".to_string()];
        assert_eq!(extract_initializer(&leaves, &x_info(), &ws), ["w"]);
    }

    #[test]
    fn test_resolve_missing_leaf() {
        let mut ws = CopyWorkspace::default();
        let mut opts = ExportOptions::with_all_ops();
        opts.value_info(x_info());

        let err = resolve(&fc_graph(), &mut ws, &opts).unwrap_err();
        assert_eq!(err.kind(), ExportErrorKind::MissingValueInfo);
        assert_eq!(err.to_string(), "could not find value info of inputs: w");
        assert_eq!(ws.runs, 0);
    }

    #[test]
    fn test_resolve_runs_graph() {
        let w = Tensor::new(vec![3, 4], vec![0.5f32; 12]).unwrap();
        let mut ws = CopyWorkspace::default().with_tensor("w", w);
        let mut opts = ExportOptions::with_all_ops();
        opts.value_info(x_info()).seed(1);

        let resolved = resolve(&fc_graph(), &mut ws, &opts).unwrap();

        assert_eq!(ws.runs, 1);
        assert!(resolved.has_run);
        assert_eq!(resolved.leaves, ["x", "w"]);
        assert_eq!(resolved.initializers.len(), 1);
        assert_eq!(resolved.initializers[0].name.as_deref(), Some("w"));
        assert_eq!(
            resolved.value_info.get("w"),
            Some(&TensorInfo::new(DataType::Float, [3usize, 4]))
        );
        // The fake engine copies `x` to `y`.
        assert_eq!(
            resolved.value_info.get("y"),
            Some(&TensorInfo::new(DataType::Float, [2usize, 3]))
        );
    }

    #[test]
    fn test_resolve_complete_value_info() {
        let mut ws = EmptyWorkspace;
        let mut opts = ExportOptions::with_all_ops();
        let info = TensorInfo::new(DataType::Float, [2usize, 3]);
        opts.value_info(
            x_info()
                .with("w", info.clone())
                .with("y", info.clone()),
        );

        let resolved = resolve(&fc_graph(), &mut ws, &opts).unwrap();
        assert!(!resolved.has_run);
        assert!(resolved.initializers.is_empty());
        assert_eq!(resolved.value_info.len(), 3);
    }

    #[test]
    fn test_resolve_omitted_optional_input() {
        let graph = GraphDef::new("clip")
            .with_op(OperatorDef::new("Clip").with_inputs(&["x", ""]).with_output("y"))
            .with_output("y");
        let mut opts = ExportOptions::with_all_ops();
        opts.value_info(x_info().with("y", TensorInfo::new(DataType::Float, [2usize, 3])));

        let resolved = resolve(&graph, &mut EmptyWorkspace, &opts).unwrap();
        assert!(!resolved.has_run);
        assert_eq!(resolved.leaves, ["x"]);
    }

    #[test]
    fn test_resolve_enforce_no_running() {
        let w = Tensor::new(vec![3, 4], vec![0.5f32; 12]).unwrap();
        let mut ws = CopyWorkspace::default().with_tensor("w", w);
        let mut opts = ExportOptions::with_all_ops();
        opts.value_info(x_info()).enforce_no_running(true);

        let resolved = resolve(&fc_graph(), &mut ws, &opts).unwrap();
        assert_eq!(ws.runs, 0);
        assert!(resolved.has_run);
        assert_eq!(resolved.initializers.len(), 1);
        assert!(resolved.value_info.get("y").is_none());
    }

    #[test]
    fn test_resolve_constants() {
        let mut ws = EmptyWorkspace;
        let mut opts = ExportOptions::with_all_ops();
        let info = TensorInfo::new(DataType::Float, [2usize, 3]);
        opts.value_info(x_info().with("y", info))
            .constants(vec![("w".to_string(), Tensor::from_vec(vec![1f32; 4]))]);

        let resolved = resolve(&fc_graph(), &mut ws, &opts).unwrap();
        assert!(!resolved.has_run);
        assert_eq!(
            resolved.value_info.get("w"),
            Some(&TensorInfo::new(DataType::Float, [4usize]))
        );
    }

    #[test]
    fn test_resolve_duplicate_constant() {
        let w = Tensor::from_vec(vec![1f32; 4]);
        let mut ws = CopyWorkspace::default().with_tensor("w", w.clone());
        let mut opts = ExportOptions::with_all_ops();
        opts.value_info(x_info()).constants(vec![("w".to_string(), w)]);

        let err = resolve(&fc_graph(), &mut ws, &opts).unwrap_err();
        assert_eq!(err.kind(), ExportErrorKind::InvalidArgument);
    }

    #[test]
    fn test_resolve_without_engine() {
        let w = Tensor::from_vec(vec![1f32; 4]);
        let mut ws = EmptyWorkspace;
        let mut opts = ExportOptions::with_all_ops();
        opts.value_info(x_info()).constants(vec![("w".to_string(), w)]);

        // The type and shape of `y` is unknown, so the graph must be run.
        let err = resolve(&fc_graph(), &mut ws, &opts).unwrap_err();
        assert_eq!(err.kind(), ExportErrorKind::ExecutionFailure);
    }
}
