//! Write varints to byte buffers.
//!
//! Variable length integers (_varints_) are the default encoding of integers
//! in Protocol Buffers messages, including field tags and numbers.
//!
//! See <https://protobuf.dev/programming-guides/encoding/#varints>.

/// Maximum number of bytes for an encoded varint.
///
/// An encoded varint is a u64 value. Each byte contains 7 value bits and one
/// continuation bit. Hence we need 9 "full" bytes plus one bit from the 10th byte.
pub const MAX_VARINT_LEN: usize = 10;

/// Append the LEB128 encoding of `val` to `buf`.
///
/// This writes between one and ten bytes.
pub fn encode_varint(mut val: u64, buf: &mut Vec<u8>) {
    loop {
        // High bit is continuation bit. Low 7 bits are the payload.
        let byte = (val & 0x7f) as u8;
        if val <= 0x7f {
            buf.push(byte);
            break;
        }
        buf.push(byte | 0x80);
        val >>= 7;
    }
}

/// Return the number of bytes that [`encode_varint`] writes for `val`.
pub fn varint_len(val: u64) -> usize {
    let bits = 64 - val.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Decode a varint from the start of `buf`, returning the value and the
/// number of bytes consumed.
#[cfg(test)]
pub(crate) fn decode_varint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0;
    for (i, byte) in buf.iter().copied().take(MAX_VARINT_LEN).enumerate() {
        value |= ((byte & 0x7f) as u64) << (i * 7);
        if byte <= 0x7f {
            return Some((value, i + 1));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{MAX_VARINT_LEN, decode_varint, encode_varint, varint_len};

    fn encode(val: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_varint(val, &mut buf);
        buf
    }

    #[test]
    fn test_encode_varint() {
        // Examples from https://protobuf.dev/programming-guides/encoding/#varints.
        assert_eq!(encode(1), [0x01]);
        assert_eq!(encode(150), [0x96, 0x01]);
        assert_eq!(encode(0), [0x00]);
        assert_eq!(encode(u64::MAX).len(), MAX_VARINT_LEN);
    }

    #[test]
    fn test_varint_len() {
        for val in [0, 1, 127, 128, 16_383, 16_384, 1 << 35, u64::MAX] {
            assert_eq!(varint_len(val), encode(val).len(), "length of {}", val);
        }
    }

    #[test]
    fn test_negative_int_uses_ten_bytes() {
        // Negative `int32` / `int64` values are sign-extended to 64 bits.
        let buf = encode(-1i64 as u64);
        assert_eq!(buf.len(), MAX_VARINT_LEN);
        assert_eq!(decode_varint(&buf), Some((u64::MAX, MAX_VARINT_LEN)));
    }
}
