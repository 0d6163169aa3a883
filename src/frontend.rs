//! Conversion of Dragon graphs to ONNX graphs and models.

use dragon_onnx_proto::checker::check_model;
use dragon_onnx_proto::helper::{make_model, make_opset_id, printable_graph};
use dragon_onnx_proto::onnx;
use rustc_hash::FxHashMap;

use crate::assemble::assemble_graph;
use crate::error::{ExecutionError, ExportError, ExportErrorImpl};
use crate::graph_def::GraphDef;
use crate::node_registry::{ExportContext, NodeRegistry, Translation};
use crate::resolve::resolve;
use crate::ssa::SsaState;
use crate::value::Tensor;
use crate::value_info::{TensorInfo, ValueInfo};
use crate::workspace::{InitFunc, Workspace};

/// Version of the default ONNX operator set that exported models use.
pub const TARGET_OPSET_VERSION: i64 = 9;

/// Value of `ModelProto.producer_name` in exported models.
pub const PRODUCER_NAME: &str = "onnx-dragon";

/// Options which customize how a graph is exported.
pub struct ExportOptions {
    registry: NodeRegistry,
    pub(crate) value_info: ValueInfo,
    pub(crate) constants: Vec<(String, Tensor)>,
    graph_name: Option<String>,
    verbose: bool,
    pub(crate) enforce_no_running: bool,
    pub(crate) init_func: Option<Box<InitFunc>>,
    pub(crate) seed: Option<u64>,
}

impl ExportOptions {
    /// Create a set of options with all built-in translations enabled.
    pub fn with_all_ops() -> ExportOptions {
        Self::with_ops(NodeRegistry::with_all_ops())
    }

    /// Create a set of options with a custom set of translations.
    pub fn with_ops(ops: NodeRegistry) -> ExportOptions {
        ExportOptions {
            registry: ops,
            value_info: ValueInfo::new(),
            constants: Vec::new(),
            graph_name: None,
            verbose: false,
            enforce_no_running: false,
            init_func: None,
            seed: None,
        }
    }

    /// Set the known types and shapes of tensors.
    ///
    /// Every graph input which is not a parameter held by the workspace or a
    /// constant must have an entry.
    pub fn value_info(&mut self, value_info: ValueInfo) -> &mut Self {
        self.value_info = value_info;
        self
    }

    /// Set constants which are added to the exported graph as initializers.
    pub fn constants(&mut self, constants: Vec<(String, Tensor)>) -> &mut Self {
        self.constants = constants;
        self
    }

    /// Set the name of the exported graph. Defaults to the Dragon graph's
    /// name.
    pub fn graph_name(&mut self, name: &str) -> &mut Self {
        self.graph_name = Some(name.to_string());
        self
    }

    /// Set whether to log a text dump of the exported graph.
    pub fn verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Set whether the graph has already been run in the workspace.
    ///
    /// If true, the workspace is never asked to run the graph. Instead
    /// shapes and constant values are read from the tensors it holds.
    pub fn enforce_no_running(&mut self, enforce: bool) -> &mut Self {
        self.enforce_no_running = enforce;
        self
    }

    /// Set a function which is called before the graph is run, after random
    /// inputs have been fed.
    pub fn init_func(
        &mut self,
        init: impl Fn(&mut dyn Workspace) -> Result<(), ExecutionError> + 'static,
    ) -> &mut Self {
        self.init_func = Some(Box::new(init));
        self
    }

    /// Seed the generator for random inputs, making runs reproducible.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    /// Convert `graph` to an ONNX graph.
    ///
    /// `ws` supplies the values of parameters, and runs the graph if the
    /// types and shapes of some tensors are not known.
    pub fn export_graph(
        &self,
        graph: &GraphDef,
        ws: &mut dyn Workspace,
    ) -> Result<onnx::GraphProto, ExportError> {
        let resolved = resolve(graph, ws, self)?;
        let ws: &dyn Workspace = ws;
        let context = resolved.has_run.then_some(ws);

        let mut write_counts: FxHashMap<&str, usize> = FxHashMap::default();
        for name in graph.op.iter().flat_map(|op| &op.output) {
            *write_counts.entry(name.as_str()).or_insert(0) += 1;
        }

        let mut ssa = SsaState::new();
        let mut nodes = Vec::new();
        let mut constants: Vec<_> = self
            .constants
            .iter()
            .map(|(name, value)| value.to_proto(name))
            .collect();

        for op in &graph.op {
            for name in op.input.iter().chain(&op.output) {
                if name.is_empty() {
                    continue;
                }
                let info = match context.and_then(|ws| ws.tensor_meta(name)) {
                    Some(meta) => TensorInfo::of_meta(&meta),
                    None => resolved.value_info.get(name).cloned().ok_or_else(|| {
                        ExportError::for_node(&op.name, ExportErrorImpl::MissingShape(name.clone()))
                    })?,
                };
                ssa.value_info.insert(name.clone(), info);
            }

            let ssa_op = ssa.rewrite(op);
            let unsupported = |error| {
                ExportError::for_node(
                    &op.name,
                    ExportErrorImpl::UnsupportedOperator {
                        op_type: op.op_type.clone(),
                        outputs: ssa_op.output.clone(),
                        error,
                    },
                )
            };

            let ctx = ExportContext::new(&ssa_op, &ssa.value_info, context);
            let translation = match self.registry.export_op(&ctx) {
                Some(Ok(translation)) => translation,
                Some(Err(err)) => return Err(unsupported(Some(err))),
                None if context.is_some() => {
                    log::warn!(
                        "No translation for operator {}. Outputs will be folded to constants",
                        op.op_type
                    );
                    Translation::Fold
                }
                None => return Err(unsupported(None)),
            };

            match translation {
                Translation::Nodes {
                    nodes: op_nodes,
                    constants: op_constants,
                } => {
                    log::debug!(
                        "Translated {} \"{}\" into {} nodes",
                        op.op_type,
                        op.name,
                        op_nodes.len()
                    );
                    nodes.extend(op_nodes);
                    constants.extend(op_constants);
                }
                Translation::Fold => {
                    let Some(ws) = context else {
                        return Err(ExportError::for_node(
                            &op.name,
                            ExportErrorImpl::FoldWithoutContext {
                                op_type: op.op_type.clone(),
                                outputs: ssa_op.output.clone(),
                            },
                        ));
                    };
                    // The workspace holds only the value of the last write to
                    // each name.
                    for (name, ssa_name) in op.output.iter().zip(&ssa_op.output) {
                        let writes = write_counts.get(name.as_str()).copied().unwrap_or(0);
                        if ssa.version_count(name) < writes {
                            return Err(ExportError::for_node(
                                &op.name,
                                ExportErrorImpl::FoldOverwritten {
                                    op_type: op.op_type.clone(),
                                    output: name.clone(),
                                },
                            ));
                        }
                        let value = ws
                            .fetch_tensor(name)
                            .ok_or_else(|| ExecutionError::TensorNotFound(name.clone()))?;
                        log::debug!("Folding \"{}\" to constant {}", ssa_name, value.meta());
                        constants.push(value.to_proto(ssa_name));
                    }
                }
            }
        }

        let name = self.graph_name.as_deref().unwrap_or(&graph.name);
        let onnx_graph = assemble_graph(
            name,
            resolved,
            constants,
            nodes,
            &graph.output,
            &ssa,
            context,
        )?;

        if self.verbose {
            log::info!("{}", printable_graph(&onnx_graph));
        }

        Ok(onnx_graph)
    }

    /// Convert `graph` to an ONNX model and check that the result is valid.
    ///
    /// See [`export_graph`](ExportOptions::export_graph).
    pub fn export_model(
        &self,
        graph: &GraphDef,
        ws: &mut dyn Workspace,
    ) -> Result<onnx::ModelProto, ExportError> {
        let onnx_graph = self.export_graph(graph, ws)?;
        let model = make_model(
            onnx_graph,
            vec![make_opset_id("", TARGET_OPSET_VERSION)],
            PRODUCER_NAME,
        );
        check_model(&model)?;
        Ok(model)
    }
}

/// Convert `graph` to an ONNX graph using the built-in translations.
///
/// See [`ExportOptions::export_graph`].
pub fn graph_def_to_onnx_graph(
    graph: &GraphDef,
    ws: &mut dyn Workspace,
    value_info: ValueInfo,
) -> Result<onnx::GraphProto, ExportError> {
    ExportOptions::with_all_ops()
        .value_info(value_info)
        .export_graph(graph, ws)
}

/// Convert `graph` to a checked ONNX model using the built-in translations.
///
/// See [`ExportOptions::export_model`].
pub fn graph_def_to_onnx_model(
    graph: &GraphDef,
    ws: &mut dyn Workspace,
    value_info: ValueInfo,
) -> Result<onnx::ModelProto, ExportError> {
    ExportOptions::with_all_ops()
        .value_info(value_info)
        .export_model(graph, ws)
}
