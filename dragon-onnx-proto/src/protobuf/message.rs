use crate::protobuf::FieldWriter;

/// Defines how to serialize a type as a Protocol Buffers message.
///
/// # Usage
///
/// Given the Protocol Buffers schema:
///
/// ```proto
/// message Message {
///     int32 int_field = 1;
///     string string_field = 2;
///     bytes bytes_field = 3;
/// }
/// ```
///
/// An encoder could be written as follows:
///
/// ```
/// use dragon_onnx_proto::protobuf::{EncodeMessage, FieldWriter};
///
/// struct Message {
///     int_field: i32,
///     string_field: Option<String>,
///     bytes_field: Option<Vec<u8>>,
/// }
///
/// impl Message {
///     const INT_FIELD: u64 = 1;
///     const STRING_FIELD: u64 = 2;
///     const BYTES_FIELD: u64 = 3;
/// }
///
/// impl EncodeMessage for Message {
///     fn encode_fields(&self, writer: &mut FieldWriter) {
///         writer.write_int32(Self::INT_FIELD, self.int_field);
///         if let Some(s) = &self.string_field {
///             writer.write_string(Self::STRING_FIELD, s);
///         }
///         if let Some(bytes) = &self.bytes_field {
///             writer.write_bytes(Self::BYTES_FIELD, bytes);
///         }
///     }
/// }
///
/// let msg = Message {
///     int_field: 150,
///     string_field: Some("hi".to_string()),
///     bytes_field: Some(vec![0x01, 0x02]),
/// };
/// assert_eq!(
///     msg.encode(),
///     [
///         0x08, 0x96, 0x01, // int_field = 150
///         0x12, 0x02, 0x68, 0x69, // string_field = "hi"
///         0x1A, 0x02, 0x01, 0x02, // bytes_field = [0x01, 0x02]
///     ]
/// );
/// ```
///
/// Fields should be written in ascending order of field number. This is the
/// order used by the reference serializers, and makes the output of
/// [`encode`](EncodeMessage::encode) canonical.
pub trait EncodeMessage {
    /// Write the fields of this message to `writer`.
    fn encode_fields(&self, writer: &mut FieldWriter);

    /// Serialize this message into a new buffer.
    fn encode(&self) -> Vec<u8> {
        let mut writer = FieldWriter::new();
        self.encode_fields(&mut writer);
        writer.into_bytes()
    }

    /// Serialize this message and write it to `dest`.
    fn write_to<W: std::io::Write>(&self, mut dest: W) -> std::io::Result<()> {
        dest.write_all(&self.encode())
    }
}
