//! Types and serialization for ONNX models.
//!
//! This crate contains the subset of the ONNX Protocol Buffers schema needed
//! to write models, along with a message encoder, helpers for building
//! messages and a structural model checker.
//!
//! ```
//! use dragon_onnx_proto::{checker, helper, onnx, protobuf::EncodeMessage};
//!
//! let x = helper::make_tensor_value_info("x", onnx::DataType::FLOAT, None);
//! let y = helper::make_tensor_value_info("y", onnx::DataType::FLOAT, None);
//! let node = helper::make_node("Relu", ["x"], ["y"]);
//! let graph = helper::make_graph(vec![node], "main", vec![x], vec![y], vec![]);
//! let model = helper::make_model(graph, vec![helper::make_opset_id("", 9)], "example");
//!
//! checker::check_model(&model).unwrap();
//! let bytes = model.encode();
//! assert!(!bytes.is_empty());
//! ```

#![forbid(unsafe_code)]

pub mod checker;
pub mod helper;
pub mod onnx;
pub mod protobuf;
