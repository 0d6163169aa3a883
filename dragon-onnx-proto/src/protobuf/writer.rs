use crate::protobuf::varint::encode_varint;
use crate::protobuf::EncodeMessage;

/// Wire types of encoded fields.
///
/// See <https://protobuf.dev/programming-guides/encoding/#structure>.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum WireType {
    /// Integer value encoded as a varint.
    Varint = 0,

    /// 64-bit fixed-width value.
    I64 = 1,

    /// A variable-length value prefixed with its size in bytes.
    Len = 2,

    /// 32-bit fixed-width value.
    I32 = 5,
}

/// Writes the fields of a message into a byte buffer.
///
/// Each `write_*` method writes a tag (field number and wire type) followed by
/// the encoded value. Embedded messages are encoded into a separate buffer
/// first so that their length prefix can be written.
///
/// Methods for repeated fields come in two variants. `write_packed_*` writes
/// all values into a single length-delimited block, which is how fields marked
/// `[packed = true]` are encoded. `write_repeated_*` writes one tagged field
/// per value, which is the encoding of unpacked `proto2` fields. Neither
/// writes anything if the value list is empty.
#[derive(Default)]
pub struct FieldWriter {
    buf: Vec<u8>,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Return the number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn write_tag(&mut self, number: u64, wire_type: WireType) {
        encode_varint((number << 3) | wire_type as u64, &mut self.buf);
    }

    fn write_len_prefixed(&mut self, number: u64, data: &[u8]) {
        self.write_tag(number, WireType::Len);
        encode_varint(data.len() as u64, &mut self.buf);
        self.buf.extend_from_slice(data);
    }

    /// Write a field with schema type `int64`.
    pub fn write_int64(&mut self, number: u64, val: i64) {
        self.write_tag(number, WireType::Varint);
        encode_varint(val as u64, &mut self.buf);
    }

    /// Write a field with schema type `int32`.
    ///
    /// Negative values are sign-extended to 64 bits, so they always occupy
    /// ten bytes.
    pub fn write_int32(&mut self, number: u64, val: i32) {
        self.write_int64(number, val as i64);
    }

    /// Write a field where the schema type is an enum.
    pub fn write_enum(&mut self, number: u64, val: i32) {
        self.write_int32(number, val);
    }

    /// Write a field with schema type `float`.
    pub fn write_float(&mut self, number: u64, val: f32) {
        self.write_tag(number, WireType::I32);
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    /// Write a field with schema type `double`.
    pub fn write_double(&mut self, number: u64, val: f64) {
        self.write_tag(number, WireType::I64);
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    /// Write a field with schema type `string`.
    pub fn write_string(&mut self, number: u64, val: &str) {
        self.write_len_prefixed(number, val.as_bytes());
    }

    /// Write a field with schema type `bytes`.
    pub fn write_bytes(&mut self, number: u64, val: &[u8]) {
        self.write_len_prefixed(number, val);
    }

    /// Write an embedded message.
    pub fn write_message<M: EncodeMessage>(&mut self, number: u64, msg: &M) {
        let mut inner = FieldWriter::new();
        msg.encode_fields(&mut inner);
        self.write_len_prefixed(number, &inner.buf);
    }

    /// Write one embedded message field for each item in `msgs`.
    pub fn write_messages<M: EncodeMessage>(&mut self, number: u64, msgs: &[M]) {
        for msg in msgs {
            self.write_message(number, msg);
        }
    }

    /// Write one string field for each item in `vals`.
    pub fn write_strings<S: AsRef<str>>(&mut self, number: u64, vals: &[S]) {
        for val in vals {
            self.write_string(number, val.as_ref());
        }
    }

    /// Write an unpacked repeated `int64` field.
    pub fn write_repeated_int64(&mut self, number: u64, vals: &[i64]) {
        for &val in vals {
            self.write_int64(number, val);
        }
    }

    /// Write an unpacked repeated `float` field.
    pub fn write_repeated_float(&mut self, number: u64, vals: &[f32]) {
        for &val in vals {
            self.write_float(number, val);
        }
    }

    /// Write a packed repeated `int64` field.
    pub fn write_packed_int64(&mut self, number: u64, vals: &[i64]) {
        if vals.is_empty() {
            return;
        }
        let mut block = Vec::with_capacity(vals.len());
        for &val in vals {
            encode_varint(val as u64, &mut block);
        }
        self.write_len_prefixed(number, &block);
    }

    /// Write a packed repeated `int32` field.
    pub fn write_packed_int32(&mut self, number: u64, vals: &[i32]) {
        if vals.is_empty() {
            return;
        }
        let mut block = Vec::with_capacity(vals.len());
        for &val in vals {
            encode_varint(val as i64 as u64, &mut block);
        }
        self.write_len_prefixed(number, &block);
    }

    /// Write a packed repeated `float` field.
    pub fn write_packed_float(&mut self, number: u64, vals: &[f32]) {
        if vals.is_empty() {
            return;
        }
        let block: Vec<u8> = vals.iter().flat_map(|x| x.to_le_bytes()).collect();
        self.write_len_prefixed(number, &block);
    }

    /// Write a packed repeated `double` field.
    pub fn write_packed_double(&mut self, number: u64, vals: &[f64]) {
        if vals.is_empty() {
            return;
        }
        let block: Vec<u8> = vals.iter().flat_map(|x| x.to_le_bytes()).collect();
        self.write_len_prefixed(number, &block);
    }
}

#[cfg(test)]
mod tests {
    use dragon_onnx_testing::TestCases;

    use super::FieldWriter;
    use crate::protobuf::EncodeMessage;

    struct Inner {
        value: i64,
    }

    impl EncodeMessage for Inner {
        fn encode_fields(&self, writer: &mut FieldWriter) {
            writer.write_int64(1, self.value);
        }
    }

    #[test]
    fn test_write_scalars() {
        struct Case {
            desc: &'static str,
            write: fn(&mut FieldWriter),
            expected: &'static [u8],
        }

        impl std::fmt::Debug for Case {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.desc)
            }
        }

        let cases = [
            Case {
                desc: "int64",
                write: |w| w.write_int64(1, 150),
                expected: &[0x08, 0x96, 0x01],
            },
            Case {
                desc: "negative int32",
                write: |w| w.write_int32(2, -1),
                expected: &[
                    0x10, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01,
                ],
            },
            Case {
                desc: "float",
                write: |w| w.write_float(2, 1.0),
                expected: &[0x15, 0x00, 0x00, 0x80, 0x3f],
            },
            Case {
                desc: "double",
                write: |w| w.write_double(10, 0.0),
                expected: &[0x51, 0, 0, 0, 0, 0, 0, 0, 0],
            },
            Case {
                desc: "string",
                write: |w| w.write_string(4, "Add"),
                expected: &[0x22, 0x03, b'A', b'd', b'd'],
            },
            // Field numbers >= 16 need a two byte tag.
            Case {
                desc: "two byte tag",
                write: |w| w.write_enum(20, 7),
                expected: &[0xa0, 0x01, 0x07],
            },
        ];

        cases.test_each(|case| {
            let mut writer = FieldWriter::new();
            (case.write)(&mut writer);
            assert_eq!(writer.into_bytes(), case.expected);
        })
    }

    #[test]
    fn test_write_packed_and_repeated() {
        let mut writer = FieldWriter::new();
        writer.write_packed_int64(7, &[1, 2, 300]);
        assert_eq!(writer.into_bytes(), [0x3a, 0x04, 0x01, 0x02, 0xac, 0x02]);

        let mut writer = FieldWriter::new();
        writer.write_repeated_int64(1, &[1, 2]);
        assert_eq!(writer.into_bytes(), [0x08, 0x01, 0x08, 0x02]);

        // Empty repeated fields are omitted entirely.
        let mut writer = FieldWriter::new();
        writer.write_packed_float(4, &[]);
        writer.write_repeated_int64(1, &[]);
        assert!(writer.is_empty());
    }

    #[test]
    fn test_write_message() {
        let mut writer = FieldWriter::new();
        writer.write_messages(3, &[Inner { value: 1 }, Inner { value: 150 }]);
        assert_eq!(
            writer.into_bytes(),
            [0x1a, 0x02, 0x08, 0x01, 0x1a, 0x03, 0x08, 0x96, 0x01]
        );

        // An empty embedded message is still written, with a zero length.
        let mut writer = FieldWriter::new();
        writer.write_message(1, &Inner { value: 0 });
        assert_eq!(writer.len(), 4);
    }
}
