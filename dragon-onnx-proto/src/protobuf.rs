//! Low-level Protocol Buffers message encoder.
//!
//! This module provides the building blocks used to serialize the ONNX
//! message types in [`crate::onnx`]. Message types implement
//! [`EncodeMessage`] by writing each of their fields, in ascending order of
//! field number, to a [`FieldWriter`].
//!
//! See <https://protobuf.dev/programming-guides/encoding/> for a description
//! of the wire format.

mod message;
pub mod varint;
mod writer;

pub use message::EncodeMessage;
pub use writer::{FieldWriter, WireType};
