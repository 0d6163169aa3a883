use std::error::Error;
use std::fmt::{Display, Formatter};

use dragon_onnx_proto::checker::CheckError;

use crate::node_registry::TranslateError;

/// Errors that occur when exporting a graph.
#[derive(Debug)]
pub struct ExportError {
    inner: ExportErrorImpl,
    node: Option<String>,
}

impl ExportError {
    pub(crate) fn new(kind: ExportErrorImpl) -> Self {
        Self {
            inner: kind,
            node: None,
        }
    }

    pub(crate) fn for_node(node: &str, kind: ExportErrorImpl) -> Self {
        Self {
            inner: kind,
            node: (!node.is_empty()).then(|| node.to_string()),
        }
    }

    /// The name of the operator that this error relates to.
    ///
    /// This can be `None` if the error is not about a specific operator, or
    /// if that operator doesn't have a name.
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// Return the category of error.
    pub fn kind(&self) -> ExportErrorKind {
        self.inner.kind()
    }
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(node) = self.node.as_deref() {
            write!(f, "in operator \"{}\": {}", node, self.inner)
        } else {
            self.inner.fmt(f)
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source()
    }
}

impl From<ExportErrorImpl> for ExportError {
    fn from(val: ExportErrorImpl) -> Self {
        Self::new(val)
    }
}

impl From<ExecutionError> for ExportError {
    fn from(val: ExecutionError) -> Self {
        Self::new(ExportErrorImpl::ExecutionFailed(val))
    }
}

impl From<CheckError> for ExportError {
    fn from(val: CheckError) -> Self {
        Self::new(ExportErrorImpl::InvalidModel(val))
    }
}

/// Categories of error when exporting a graph.
///
/// See [`ExportError::kind`].
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum ExportErrorKind {
    /// The exporter was called with malformed arguments.
    InvalidArgument,

    /// The type or shape of a tensor could not be determined.
    MissingValueInfo,

    /// An operator could neither be translated nor folded to a constant.
    UnsupportedOperator,

    /// Running the graph in the workspace failed.
    ExecutionFailure,

    /// The exported model failed validation.
    ValidationFailure,
}

/// The internal implementation of [`ExportError`].
#[derive(Debug)]
pub(crate) enum ExportErrorImpl {
    /// The value info description is malformed.
    InvalidValueInfo(String),

    /// A constant has the same name as an initializer found in the graph.
    DuplicateConstant(String),

    /// The types and shapes of some graph inputs are unknown.
    MissingInputInfo(Vec<String>),

    /// The shape of a tensor used by an operator is unknown.
    MissingShape(String),

    /// No translation exists for an operator type, or the translation
    /// rejected the operator.
    UnsupportedOperator {
        op_type: String,
        outputs: Vec<String>,
        error: Option<TranslateError>,
    },

    /// An operator needs to be folded to a constant, but the graph has not
    /// been run.
    FoldWithoutContext { op_type: String, outputs: Vec<String> },

    /// An operator needs to be folded to a constant, but a later operator
    /// writes to the same output name, so its value is not available.
    FoldOverwritten { op_type: String, output: String },

    /// The workspace failed to run the graph or fetch a value.
    ExecutionFailed(ExecutionError),

    /// The assembled model failed the structural checker.
    InvalidModel(CheckError),
}

impl ExportErrorImpl {
    fn kind(&self) -> ExportErrorKind {
        type Kind = ExportErrorKind;

        match self {
            Self::InvalidValueInfo(_) => Kind::InvalidArgument,
            Self::DuplicateConstant(_) => Kind::InvalidArgument,
            Self::MissingInputInfo(_) => Kind::MissingValueInfo,
            Self::MissingShape(_) => Kind::MissingValueInfo,
            Self::UnsupportedOperator { .. } => Kind::UnsupportedOperator,
            Self::FoldWithoutContext { .. } => Kind::UnsupportedOperator,
            Self::FoldOverwritten { .. } => Kind::UnsupportedOperator,
            Self::ExecutionFailed(_) => Kind::ExecutionFailure,
            Self::InvalidModel(_) => Kind::ValidationFailure,
        }
    }

    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::UnsupportedOperator {
                error: Some(err), ..
            } => Some(err),
            Self::ExecutionFailed(err) => Some(err),
            Self::InvalidModel(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for ExportErrorImpl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValueInfo(e) => write!(f, "invalid value info: {e}"),
            Self::DuplicateConstant(name) => {
                write!(f, "constant \"{name}\" conflicts with an initializer")
            }
            Self::MissingInputInfo(names) => {
                write!(
                    f,
                    "could not find value info of inputs: {}",
                    names.join(", ")
                )
            }
            Self::MissingShape(name) => write!(f, "shape of \"{name}\" is unknown"),
            Self::UnsupportedOperator {
                op_type,
                outputs,
                error,
            } => {
                write!(
                    f,
                    "operator {op_type} with outputs [{}] is not supported",
                    outputs.join(", ")
                )?;
                if let Some(error) = error {
                    write!(f, ": {error}")?;
                }
                Ok(())
            }
            Self::FoldWithoutContext { op_type, outputs } => write!(
                f,
                "operator {op_type} with outputs [{}] must be folded to constants, but the graph has not been run",
                outputs.join(", ")
            ),
            Self::FoldOverwritten { op_type, output } => write!(
                f,
                "operator {op_type} must be folded to constants, but its output \"{output}\" is overwritten by a later operator"
            ),
            Self::ExecutionFailed(e) => write!(f, "execution failed: {e}"),
            Self::InvalidModel(e) => write!(f, "{e}"),
        }
    }
}

/// Errors reported by a [`Workspace`](crate::Workspace).
#[derive(Debug)]
#[non_exhaustive]
pub enum ExecutionError {
    /// The workspace has no engine which can run graphs.
    NoEngine,

    /// A tensor which the exporter needs was not found in the workspace.
    TensorNotFound(String),

    /// An error reported by the engine.
    Engine(Box<dyn Error + Send + Sync>),
}

impl Display for ExecutionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoEngine => write!(f, "workspace cannot run graphs"),
            Self::TensorNotFound(name) => write!(f, "tensor \"{name}\" not found in workspace"),
            Self::Engine(e) => write!(f, "{e}"),
        }
    }
}

impl Error for ExecutionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Engine(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}
