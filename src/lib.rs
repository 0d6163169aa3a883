//! dragon-onnx converts Dragon computation graphs into [ONNX](https://onnx.ai)
//! models.
//!
//! # Exporting graphs
//!
//! The basic workflow is:
//!
//! 1. Build or deserialize a [`GraphDef`], the list of Dragon operators in
//!    execution order plus the names of the graph outputs.
//! 2. Describe the element type and shape of each graph input in a
//!    [`ValueInfo`]. Parameters such as weights don't need an entry when the
//!    [`Workspace`] holds their values. These are exported as initializers.
//! 3. Call [`ExportOptions::export_model`] or [`graph_def_to_onnx_model`],
//!    then serialize the result with
//!    [`EncodeMessage::encode`](dragon_onnx_proto::protobuf::EncodeMessage::encode).
//!
//! ```
//! use dragon_onnx::{
//!     graph_def_to_onnx_model, DataType, EmptyWorkspace, GraphDef, OperatorDef, TensorInfo,
//!     ValueInfo,
//! };
//! use dragon_onnx_proto::protobuf::EncodeMessage;
//!
//! let graph = GraphDef::new("net")
//!     .with_op(OperatorDef::new("Relu").with_input("x").with_output("y"))
//!     .with_output("y");
//! let info = TensorInfo::new(DataType::Float, [1usize, 16]);
//! let value_info = ValueInfo::new().with("x", info.clone()).with("y", info);
//!
//! let model = graph_def_to_onnx_model(&graph, &mut EmptyWorkspace, value_info).unwrap();
//! let bytes = model.encode();
//! assert!(!bytes.is_empty());
//! ```
//!
//! # Value info and running graphs
//!
//! ONNX graphs declare the type and shape of their inputs and outputs. If the
//! supplied value info does not cover every tensor the graph's operators use,
//! the exporter runs the graph once in the workspace, with random inputs
//! matching the value info, and reads back the types and shapes of the
//! outputs. Symbolic input dimensions are given a guessed size for this run.
//!
//! Callers which have already run the graph can use
//! [`ExportOptions::enforce_no_running`] to read shapes and values from the
//! workspace instead.
//!
//! # Operators
//!
//! Dragon operators are translated into ONNX nodes by a [`NodeRegistry`].
//! Operators without a translation, such as those which fill tensors with
//! generated values, have their outputs replaced by constants holding their
//! values in the workspace. This requires the graph to have been run.
//!
//! Dragon allows an operator to overwrite a tensor which an earlier operator
//! produced. ONNX requires each value to be written once, so repeated writes
//! are renamed to `{name}/Version_{n}`.

mod assemble;
mod error;
mod frontend;
mod graph_def;
mod resolve;
mod ssa;
mod value;
mod value_info;
mod workspace;

pub mod node_registry;

pub use error::{ExecutionError, ExportError, ExportErrorKind};
pub use frontend::{
    graph_def_to_onnx_graph, graph_def_to_onnx_model, ExportOptions, PRODUCER_NAME,
    TARGET_OPSET_VERSION,
};
pub use graph_def::{ArgTypeError, ArgValue, Argument, GraphDef, OperatorDef};
pub use node_registry::NodeRegistry;
pub use ssa::versioned_name;
pub use value::{DataType, ShapeError, Tensor, TensorData, ValueMeta};
pub use value_info::{fixed_shape, Dimension, TensorInfo, ValueInfo};
pub use workspace::{
    fetch_initializer, native_run_graph, EmptyWorkspace, InitFunc, RandomInputs, RunOutputs,
    Workspace,
};
