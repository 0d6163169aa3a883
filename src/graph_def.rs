//! Dragon graph definitions which are the input to the exporter.

use std::error::Error;
use std::fmt;

/// Value of an operator argument.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ArgValue {
    Int(i64),
    Float(f32),
    String(String),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    Strings(Vec<String>),
}

impl ArgValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Ints(_) => "ints",
            Self::Floats(_) => "floats",
            Self::Strings(_) => "strings",
        }
    }
}

macro_rules! arg_value_from {
    ($from:ty, $variant:ident) => {
        impl From<$from> for ArgValue {
            fn from(val: $from) -> Self {
                Self::$variant(val)
            }
        }
    };
}

arg_value_from!(i64, Int);
arg_value_from!(f32, Float);
arg_value_from!(String, String);
arg_value_from!(Vec<i64>, Ints);
arg_value_from!(Vec<f32>, Floats);
arg_value_from!(Vec<String>, Strings);

impl From<&str> for ArgValue {
    fn from(val: &str) -> Self {
        Self::String(val.to_string())
    }
}

impl From<bool> for ArgValue {
    fn from(val: bool) -> Self {
        Self::Int(val as i64)
    }
}

/// A named operator argument.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Argument {
    pub name: String,
    pub value: ArgValue,
}

/// Error when reading an argument with the wrong value type.
#[derive(Clone, Debug, PartialEq)]
pub struct ArgTypeError {
    pub name: String,
    pub expected: &'static str,
    pub actual: &'static str,
}

impl fmt::Display for ArgTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "argument \"{}\" has type {} but {} was expected",
            self.name, self.actual, self.expected
        )
    }
}

impl Error for ArgTypeError {}

/// An operator in a Dragon graph.
///
/// Inputs and outputs refer to tensors by name. Unlike ONNX nodes, several
/// operators in the same graph may write to the same output name.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OperatorDef {
    pub op_type: String,
    pub name: String,
    pub input: Vec<String>,
    pub output: Vec<String>,
    pub arg: Vec<Argument>,
}

macro_rules! typed_arg_getter {
    ($fn:ident, $variant:ident, $type:ty, $type_name:literal) => {
        /// Get an argument value, or `None` if the argument is not set.
        ///
        /// Fails if the argument has a different type.
        pub fn $fn(&self, name: &str) -> Result<Option<$type>, ArgTypeError> {
            match self.get_arg(name) {
                None => Ok(None),
                Some(ArgValue::$variant(val)) => Ok(Some(val)),
                Some(other) => Err(ArgTypeError {
                    name: name.to_string(),
                    expected: $type_name,
                    actual: other.type_name(),
                }),
            }
        }
    };
}

impl OperatorDef {
    pub fn new(op_type: &str) -> OperatorDef {
        OperatorDef {
            op_type: op_type.to_string(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_input(mut self, name: &str) -> Self {
        self.input.push(name.to_string());
        self
    }

    pub fn with_inputs(mut self, names: &[&str]) -> Self {
        self.input.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn with_output(mut self, name: &str) -> Self {
        self.output.push(name.to_string());
        self
    }

    pub fn with_arg(mut self, name: &str, value: impl Into<ArgValue>) -> Self {
        self.arg.push(Argument {
            name: name.to_string(),
            value: value.into(),
        });
        self
    }

    /// Return the value of the first argument called `name`.
    pub fn get_arg(&self, name: &str) -> Option<&ArgValue> {
        self.arg
            .iter()
            .find(|arg| arg.name == name)
            .map(|arg| &arg.value)
    }

    typed_arg_getter!(get_int, Int, &i64, "int");
    typed_arg_getter!(get_float, Float, &f32, "float");
    typed_arg_getter!(get_string, String, &String, "string");
    typed_arg_getter!(get_ints, Ints, &Vec<i64>, "ints");
    typed_arg_getter!(get_floats, Floats, &Vec<f32>, "floats");
    typed_arg_getter!(get_strings, Strings, &Vec<String>, "strings");
}

/// A Dragon graph definition.
///
/// Operators are listed in execution order.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GraphDef {
    pub name: String,
    pub op: Vec<OperatorDef>,
    pub output: Vec<String>,
}

impl GraphDef {
    pub fn new(name: &str) -> GraphDef {
        GraphDef {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_op(mut self, op: OperatorDef) -> Self {
        self.op.push(op);
        self
    }

    pub fn with_output(mut self, name: &str) -> Self {
        self.output.push(name.to_string());
        self
    }

    /// Return the names of tensors consumed by some operator but not
    /// produced by any operator, in order of first use.
    ///
    /// Empty names denote omitted optional inputs and are skipped.
    pub fn leaf_tensors(&self) -> Vec<&str> {
        let produced: rustc_hash::FxHashSet<&str> = self
            .op
            .iter()
            .flat_map(|op| op.output.iter().map(String::as_str))
            .collect();
        let mut seen = rustc_hash::FxHashSet::default();
        self.op
            .iter()
            .flat_map(|op| op.input.iter().map(String::as_str))
            .filter(|name| !name.is_empty() && !produced.contains(name) && seen.insert(*name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{ArgValue, GraphDef, OperatorDef};

    #[test]
    fn test_typed_arg_getters() {
        let op = OperatorDef::new("Conv2d")
            .with_arg("group", 2i64)
            .with_arg("strides", vec![1i64, 1])
            .with_arg("padding", "SAME")
            .with_arg("group", 4i64);

        // The first argument with a given name wins.
        assert_eq!(op.get_int("group"), Ok(Some(&2)));
        assert_eq!(op.get_ints("strides"), Ok(Some(&vec![1, 1])));
        assert_eq!(op.get_string("padding").unwrap().map(|s| s.as_str()), Some("SAME"));
        assert_eq!(op.get_float("missing"), Ok(None));

        let err = op.get_float("group").unwrap_err();
        assert_eq!(
            err.to_string(),
            "argument \"group\" has type int but float was expected"
        );
        assert_eq!(op.get_arg("padding"), Some(&ArgValue::String("SAME".into())));
    }

    #[test]
    fn test_leaf_tensors() {
        let graph = GraphDef::new("g")
            .with_op(OperatorDef::new("Add").with_inputs(&["a", "b"]).with_output("c"))
            .with_op(OperatorDef::new("Add").with_inputs(&["c", "a"]).with_output("c"))
            .with_op(OperatorDef::new("Mul").with_inputs(&["c", "w"]).with_output("d"))
            .with_op(OperatorDef::new("Clip").with_inputs(&["d", ""]).with_output("e"));

        assert_eq!(graph.leaf_tensors(), ["a", "b", "w"]);
    }
}
