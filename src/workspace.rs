//! Interface to the engine which runs Dragon graphs.

use dragon_onnx_proto::onnx;
use fastrand::Rng;
use fastrand_contrib::RngExt;

use crate::error::ExecutionError;
use crate::graph_def::GraphDef;
use crate::value::{Tensor, ValueMeta};
use crate::value_info::{Dimension, TensorInfo};

/// Storage for named tensors together with an engine that can run graphs.
///
/// The exporter uses a workspace to read the values of parameters, and to run
/// a graph once when the types and shapes of some of its tensors are not
/// known.
pub trait Workspace {
    /// Return true if the workspace holds a value for `name`.
    fn has_tensor(&self, name: &str) -> bool;

    /// Return a copy of the value for `name`.
    fn fetch_tensor(&self, name: &str) -> Option<Tensor>;

    /// Return the element type and shape of the value for `name`, without
    /// copying its data.
    fn tensor_meta(&self, name: &str) -> Option<ValueMeta>;

    /// Set the value for `name`, replacing any existing value.
    fn feed_tensor(&mut self, name: &str, value: Tensor) -> Result<(), ExecutionError>;

    /// Run all operators in `graph`, updating the stored values of their
    /// outputs.
    fn run_graph(&mut self, graph: &GraphDef) -> Result<(), ExecutionError>;
}

/// A workspace that holds no tensors and cannot run graphs.
///
/// This is used when exporting a graph whose value info is complete.
#[derive(Debug, Default)]
pub struct EmptyWorkspace;

impl Workspace for EmptyWorkspace {
    fn has_tensor(&self, _name: &str) -> bool {
        false
    }

    fn fetch_tensor(&self, _name: &str) -> Option<Tensor> {
        None
    }

    fn tensor_meta(&self, _name: &str) -> Option<ValueMeta> {
        None
    }

    fn feed_tensor(&mut self, _name: &str, _value: Tensor) -> Result<(), ExecutionError> {
        Err(ExecutionError::NoEngine)
    }

    fn run_graph(&mut self, _graph: &GraphDef) -> Result<(), ExecutionError> {
        Err(ExecutionError::NoEngine)
    }
}

/// Function called after inputs are fed and before a graph is run, used to
/// initialize parameters in the workspace.
pub type InitFunc = dyn Fn(&mut dyn Workspace) -> Result<(), ExecutionError>;

/// Values read back after running a graph with [`native_run_graph`].
#[derive(Debug)]
pub struct RunOutputs {
    /// Value of each output of the graph, in the order the graph declares
    /// them.
    pub outputs: Vec<(String, Tensor)>,

    /// Values of the graph's initializers.
    pub initializers: Vec<onnx::TensorProto>,
}

impl RunOutputs {
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.outputs
            .iter()
            .find(|(output, _)| output == name)
            .map(|(_, tensor)| tensor)
    }
}

fn fetch(ws: &dyn Workspace, name: &str) -> Result<Tensor, ExecutionError> {
    ws.fetch_tensor(name)
        .ok_or_else(|| ExecutionError::TensorNotFound(name.to_string()))
}

/// Feed `inputs` into `ws`, run `graph` once and fetch its outputs and
/// initializers.
pub fn native_run_graph(
    ws: &mut dyn Workspace,
    graph: &GraphDef,
    inputs: Vec<(String, Tensor)>,
    initializers: &[String],
    init_func: Option<&InitFunc>,
) -> Result<RunOutputs, ExecutionError> {
    for (name, value) in inputs {
        log::debug!("Feeding {} {}", name, value.meta());
        ws.feed_tensor(&name, value)?;
    }
    if let Some(init) = init_func {
        init(&mut *ws)?;
    }

    ws.run_graph(graph)?;

    let mut outputs = Vec::with_capacity(graph.output.len());
    for name in &graph.output {
        if outputs.iter().any(|(output, _)| output == name) {
            continue;
        }
        outputs.push((name.clone(), fetch(ws, name)?));
    }
    let initializers = fetch_initializer(ws, initializers)?;

    Ok(RunOutputs {
        outputs,
        initializers,
    })
}

/// Read the current values of initializers from `ws`.
pub fn fetch_initializer(
    ws: &dyn Workspace,
    names: &[String],
) -> Result<Vec<onnx::TensorProto>, ExecutionError> {
    names
        .iter()
        .map(|name| fetch(ws, name).map(|tensor| tensor.to_proto(name)))
        .collect()
}

/// Guess a size for a symbolic input dimension based on its name.
fn guess_dim_size(dim: &Dimension) -> usize {
    match dim {
        Dimension::Fixed(size) => *size,
        Dimension::Symbolic(name) => match name.as_str() {
            "batch" | "batch_size" => 1,
            "sequence" | "sequence_length" => 128,
            _ => 256,
        },
    }
}

/// Generates random graph inputs matching a type and shape.
///
/// Values are drawn from a standard normal distribution and then converted
/// to the input's element type.
pub struct RandomInputs {
    rng: Rng,
}

impl RandomInputs {
    /// Create a generator. If `seed` is `None` the generator is seeded
    /// randomly.
    pub fn new(seed: Option<u64>) -> RandomInputs {
        let rng = if let Some(seed) = seed {
            Rng::with_seed(seed)
        } else {
            Rng::new()
        };
        RandomInputs { rng }
    }

    pub fn generate(&mut self, info: &TensorInfo) -> Tensor {
        let shape: Vec<usize> = info.shape.iter().map(guess_dim_size).collect();
        let rng = &mut self.rng;
        Tensor::from_simple_fn(&shape, info.dtype, || rng.f32_normal(0., 1.))
    }
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashMap;

    use super::{
        fetch_initializer, native_run_graph, EmptyWorkspace, ExecutionError, RandomInputs,
        Workspace,
    };
    use crate::graph_def::{GraphDef, OperatorDef};
    use crate::value::{DataType, Tensor, ValueMeta};
    use crate::value_info::{Dimension, TensorInfo};

    /// Workspace whose "engine" copies the first input of each operator to
    /// its outputs.
    #[derive(Default)]
    struct CopyWorkspace {
        tensors: FxHashMap<String, Tensor>,
        runs: usize,
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

    #[test]
    fn test_native_run_graph() {
        let graph = GraphDef::new("g")
            .with_op(OperatorDef::new("Copy").with_input("x").with_output("y"))
            .with_output("y")
            .with_output("y");
        let mut ws = CopyWorkspace::default();
        let x = Tensor::new(vec![2], vec![1.0f32, 2.0]).unwrap();
        let w = Tensor::new(vec![1], vec![3i64]).unwrap();

        let w_init = w.clone();
        let init = move |ws: &mut dyn Workspace| ws.feed_tensor("w", w_init.clone());
        let outputs = native_run_graph(
            &mut ws,
            &graph,
            vec![("x".to_string(), x.clone())],
            &["w".to_string()],
            Some(&init),
        )
        .unwrap();

        assert_eq!(ws.runs, 1);
        assert_eq!(outputs.outputs.len(), 1);
        assert_eq!(outputs.get("y"), Some(&x));
        assert_eq!(outputs.initializers, [w.to_proto("w")]);
    }

    #[test]
    fn test_fetch_missing_initializer() {
        let ws = CopyWorkspace::default();
        let err = fetch_initializer(&ws, &["w".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "tensor \"w\" not found in workspace");
    }

    #[test]
    fn test_empty_workspace() {
        let mut ws = EmptyWorkspace;
        assert!(!ws.has_tensor("x"));
        assert!(ws.fetch_tensor("x").is_none());
        assert!(matches!(
            ws.run_graph(&GraphDef::new("g")),
            Err(ExecutionError::NoEngine)
        ));
    }

    #[test]
    fn test_random_inputs() {
        let info = TensorInfo {
            dtype: DataType::Float,
            shape: vec![
                Dimension::Symbolic("batch".into()),
                Dimension::Fixed(3),
                Dimension::Symbolic("sequence_length".into()),
            ],
        };
        let a = RandomInputs::new(Some(1234)).generate(&info);
        let b = RandomInputs::new(Some(1234)).generate(&info);
        assert_eq!(a.shape(), [1, 3, 128]);
        assert_eq!(a.dtype(), DataType::Float);
        assert_eq!(a, b);

        let info = TensorInfo::new(DataType::Int64, [Dimension::Symbolic("n".into())]);
        let ids = RandomInputs::new(None).generate(&info);
        assert_eq!(ids.shape(), [256]);
        assert_eq!(ids.dtype(), DataType::Int64);
    }
}
