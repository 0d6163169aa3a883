use std::error::Error;
use std::fmt::{Display, Formatter};

use dragon_onnx_proto::helper::{self, NodeProtoExt};
use dragon_onnx_proto::onnx;
use rustc_hash::FxHashMap;

use crate::graph_def::{ArgTypeError, OperatorDef};
use crate::value::{DataType, Tensor};
use crate::value_info::{Dimension, TensorInfo};
use crate::workspace::Workspace;

mod array;
mod elementwise;
mod nn;

pub use array::{
    ArgReduce, Concat, ExpandDims, Flatten, Reduce, Reshape, Shape, Squeeze, Transpose,
};
pub use elementwise::{
    Abs, Add, Clip, Copy, Div, Dropout, Elu, Exp, Log, Maximum, Minimum, Mul, Pow, Relu,
    Sigmoid, Softmax, Sqrt, Sub, Tanh,
};
pub use nn::{BatchNorm, Conv2d, FullyConnected, FusedBatchNorm, InnerProduct, Matmul, Pool2d};

/// Translates Dragon operators into ONNX nodes.
///
/// New registries have no operators registered by default. To create a
/// registry with all built-in translations pre-registered, use
/// [`NodeRegistry::with_all_ops`]. Alternatively create a new registry and
/// selectively register translations using [`NodeRegistry::register_op`].
#[derive(Default)]
pub struct NodeRegistry {
    /// Map from Dragon operator type (the `OperatorDef.op_type` field) to
    /// translation function.
    ops: FxHashMap<&'static str, Box<ExportFunction>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        NodeRegistry {
            ops: FxHashMap::default(),
        }
    }

    /// Register the built-in translation of an operator.
    ///
    /// ```
    /// use dragon_onnx::node_registry::{Add, Conv2d, NodeRegistry, Relu};
    ///
    /// let mut reg = NodeRegistry::new();
    /// reg.register_op::<Add>();
    /// reg.register_op::<Conv2d>();
    /// reg.register_op::<Relu>();
    /// assert!(reg.contains("Conv2d"));
    /// ```
    pub fn register_op<Op: ExportOp + 'static>(&mut self) {
        self.register_fn(Op::op_type(), Op::export);
    }

    /// Register a custom translation function for an operator type.
    pub fn register_fn<F>(&mut self, op_type: &'static str, export: F)
    where
        F: Fn(&ExportContext) -> Result<Translation, TranslateError> + 'static,
    {
        self.ops.insert(op_type, Box::new(export));
    }

    /// Register an operator type whose outputs are always replaced by
    /// constants holding their values.
    pub fn register_fold(&mut self, op_type: &'static str) {
        self.register_fn(op_type, |_ctx| Ok(Translation::Fold));
    }

    /// Return true if there is a translation for `op_type`.
    pub fn contains(&self, op_type: &str) -> bool {
        self.ops.contains_key(op_type)
    }

    /// Translate an operator using the functions in the registry.
    ///
    /// Returns `None` if there is no translation for the operator type.
    pub(crate) fn export_op(
        &self,
        ctx: &ExportContext,
    ) -> Option<Result<Translation, TranslateError>> {
        let export_fn = self.ops.get(ctx.op().op_type.as_str())?;
        Some(export_fn(ctx))
    }

    /// Create a new registry with all built-in translations registered.
    pub fn with_all_ops() -> Self {
        let mut reg = NodeRegistry::new();

        macro_rules! register_op {
            ($op:ident) => {
                reg.register_op::<$op>()
            };
        }

        register_op!(Abs);
        register_op!(Add);
        register_op!(ArgReduce);
        register_op!(BatchNorm);
        register_op!(Clip);
        register_op!(Concat);
        register_op!(Conv2d);
        register_op!(Copy);
        register_op!(Div);
        register_op!(Dropout);
        register_op!(Elu);
        register_op!(Exp);
        register_op!(ExpandDims);
        register_op!(Flatten);
        register_op!(FullyConnected);
        register_op!(FusedBatchNorm);
        register_op!(InnerProduct);
        register_op!(Log);
        register_op!(Matmul);
        register_op!(Maximum);
        register_op!(Minimum);
        register_op!(Mul);
        register_op!(Pool2d);
        register_op!(Pow);
        register_op!(Reduce);
        register_op!(Relu);
        register_op!(Reshape);
        register_op!(Shape);
        register_op!(Sigmoid);
        register_op!(Softmax);
        register_op!(Sqrt);
        register_op!(Squeeze);
        register_op!(Sub);
        register_op!(Tanh);
        register_op!(Transpose);

        // Operators which generate data have no inputs in the graph, so their
        // outputs are exported as initializers.
        for op_type in [
            "Arange",
            "Fill",
            "GivenTensorFill",
            "RandomNormal",
            "RandomUniform",
            "TruncatedNormal",
        ] {
            reg.register_fold(op_type);
        }

        reg
    }
}

type ExportFunction = dyn Fn(&ExportContext) -> Result<Translation, TranslateError>;

/// Translation of a Dragon operator into ONNX.
pub trait ExportOp {
    /// Return the Dragon operator type from the `OperatorDef.op_type` field.
    fn op_type() -> &'static str;

    /// Translate the operator in `ctx` into ONNX nodes.
    fn export(ctx: &ExportContext) -> Result<Translation, TranslateError>;
}

/// Result of translating an operator.
#[derive(Clone, Debug, PartialEq)]
pub enum Translation {
    /// ONNX nodes which compute the operator's outputs, plus constants which
    /// the nodes use.
    Nodes {
        nodes: Vec<onnx::NodeProto>,
        constants: Vec<onnx::TensorProto>,
    },

    /// The operator cannot be expressed in ONNX. Each of its outputs should
    /// be replaced by a constant with its current value.
    Fold,
}

impl Translation {
    pub fn nodes(nodes: Vec<onnx::NodeProto>) -> Self {
        Self::Nodes {
            nodes,
            constants: Vec::new(),
        }
    }
}

impl From<onnx::NodeProto> for Translation {
    fn from(node: onnx::NodeProto) -> Self {
        Self::nodes(vec![node])
    }
}

/// Information available to [`ExportOp::export`] implementations.
pub struct ExportContext<'a> {
    op: &'a OperatorDef,
    value_info: &'a FxHashMap<String, TensorInfo>,
    workspace: Option<&'a dyn Workspace>,
}

impl<'a> ExportContext<'a> {
    /// Create a context for translating `op`, which must already be in SSA
    /// form. `value_info` is keyed by versioned tensor name.
    pub fn new(
        op: &'a OperatorDef,
        value_info: &'a FxHashMap<String, TensorInfo>,
        workspace: Option<&'a dyn Workspace>,
    ) -> Self {
        ExportContext {
            op,
            value_info,
            workspace,
        }
    }

    /// The operator being translated.
    pub fn op(&self) -> &'a OperatorDef {
        self.op
    }

    /// Return the shape of a tensor, if known.
    pub fn shape(&self, name: &str) -> Option<&'a [Dimension]> {
        self.value_info.get(name).map(|info| info.shape.as_slice())
    }

    /// Return the element type of a tensor, if known.
    pub fn dtype(&self, name: &str) -> Option<DataType> {
        self.value_info.get(name).map(|info| info.dtype)
    }

    /// Return the workspace, if the graph has been run.
    pub fn workspace(&self) -> Option<&'a dyn Workspace> {
        self.workspace
    }

    /// Return the name of the `index`th input.
    pub fn input(&self, index: usize) -> Result<&'a str, TranslateError> {
        self.op
            .input
            .get(index)
            .map(|s| s.as_str())
            .ok_or(TranslateError::MissingInput { index })
    }

    /// Return the name of the `index`th output.
    pub fn output(&self, index: usize) -> Result<&'a str, TranslateError> {
        self.op
            .output
            .get(index)
            .map(|s| s.as_str())
            .ok_or(TranslateError::MissingOutput { index })
    }

    /// Create a node of type `op_type` with the same name, inputs and
    /// outputs as the operator.
    pub fn node(&self, op_type: &str) -> onnx::NodeProto {
        helper::make_node(op_type, &self.op.input, &self.op.output).with_name(&self.op.name)
    }

    /// Create a named INT64 tensor constant.
    pub fn int64_constant(&self, name: &str, values: Vec<i64>) -> onnx::TensorProto {
        Tensor::from_vec(values).to_proto(name)
    }
}

/// Error type for errors that occur when translating an operator.
#[derive(Clone, Debug, PartialEq)]
pub enum TranslateError {
    /// An argument has an unsupported or invalid value.
    AttrError {
        /// Name of the argument.
        attr: String,
        /// Description of the argument error.
        error: String,
    },

    /// The operator has fewer inputs than the translation requires.
    MissingInput { index: usize },

    /// The operator has fewer outputs than the translation requires.
    MissingOutput { index: usize },
}

impl TranslateError {
    pub fn attr_error(attr: impl AsRef<str>, error: impl AsRef<str>) -> Self {
        Self::AttrError {
            attr: attr.as_ref().to_string(),
            error: error.as_ref().to_string(),
        }
    }
}

impl From<ArgTypeError> for TranslateError {
    fn from(val: ArgTypeError) -> Self {
        Self::attr_error(&val.name, format!("expected {} value", val.expected))
    }
}

impl Display for TranslateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslateError::AttrError { attr, error } => {
                write!(f, "error in argument \"{}\": {}", attr, error)
            }
            TranslateError::MissingInput { index } => write!(f, "missing input {}", index),
            TranslateError::MissingOutput { index } => write!(f, "missing output {}", index),
        }
    }
}

impl Error for TranslateError {}

/// Define a unit struct that implements [`ExportOp`].
///
/// The one-argument form maps a Dragon operator to the ONNX operator of the
/// same name, copying inputs and outputs.
macro_rules! export_op {
    ($op:ident) => {
        export_op!($op => stringify!($op));
    };

    ($op:ident => $onnx_op:expr) => {
        export_op!(@impl $op, stringify!($op), |ctx: &ExportContext| Ok(ctx
            .node($onnx_op)
            .into()));
    };

    ($op:ident, $export:expr) => {
        export_op!(@impl $op, stringify!($op), $export);
    };

    (@impl $op:ident, $op_type:expr, $export:expr) => {
        #[derive(Debug)]
        pub struct $op;

        impl ExportOp for $op {
            fn op_type() -> &'static str {
                $op_type
            }

            fn export(ctx: &ExportContext) -> Result<Translation, TranslateError> {
                let export: fn(&ExportContext) -> Result<Translation, TranslateError> = $export;
                export(ctx)
            }
        }
    };
}

pub(crate) use export_op;
