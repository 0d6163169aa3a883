//! Conversion of Dragon graphs to static single-assignment form.
//!
//! Dragon operators may write to a tensor name which an earlier operator
//! already wrote, but in ONNX each value has exactly one producer. Repeated
//! writes are disambiguated by appending a version suffix to the name.

use rustc_hash::FxHashMap;

use crate::graph_def::OperatorDef;
use crate::value_info::TensorInfo;

/// Return the name of version `version` of tensor `name`.
///
/// Version 0 is the original name.
pub fn versioned_name(name: &str, version: usize) -> String {
    if version == 0 {
        name.to_string()
    } else {
        format!("{}/Version_{}", name, version)
    }
}

/// State threaded through the SSA rewrite of a graph.
#[derive(Clone, Debug, Default)]
pub struct SsaState {
    /// Type and shape of each tensor, keyed by versioned name.
    pub value_info: FxHashMap<String, TensorInfo>,

    /// Map of original tensor name to its latest versioned name.
    names: FxHashMap<String, String>,

    /// Number of times each original tensor name has been written.
    versions: FxHashMap<String, usize>,
}

impl SsaState {
    pub fn new() -> SsaState {
        Self::default()
    }

    /// Return the versioned name which currently refers to `name`.
    ///
    /// Names which have not been written by any operator are returned
    /// unchanged.
    pub fn current_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.names.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Return the number of times `name` has been written.
    pub fn version_count(&self, name: &str) -> usize {
        self.versions.get(name).copied().unwrap_or(0)
    }

    /// Return a copy of `op` in SSA form.
    ///
    /// Each input is replaced by the latest version of that name. Each output
    /// is given a new version, and the type and shape recorded for the unversioned
    /// name is copied to the new name. Operators must be rewritten in
    /// program order.
    pub fn rewrite(&mut self, op: &OperatorDef) -> OperatorDef {
        let input = op
            .input
            .iter()
            .map(|name| self.current_name(name).to_string())
            .collect();

        let output = op
            .output
            .iter()
            .map(|name| {
                let version = self.versions.entry(name.clone()).or_insert(0);
                let new_name = versioned_name(name, *version);
                *version += 1;

                self.names.insert(name.clone(), new_name.clone());
                if let Some(info) = self.value_info.get(name).cloned() {
                    self.value_info.insert(new_name.clone(), info);
                }
                new_name
            })
            .collect();

        OperatorDef {
            op_type: op.op_type.clone(),
            name: op.name.clone(),
            input,
            output,
            arg: op.arg.clone(),
        }
    }
}
