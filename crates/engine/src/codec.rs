//! Order-preserving key codec.
//!
//! User keys are arbitrary bytes, including `0x00` and `0xFF`, so the codec
//! uses the block-padded memcomparable scheme: the key is written in 8-byte
//! groups padded with `0x00`, each group followed by a marker byte
//! `0xFF - pad_count`. Byte order of the encoding equals byte order of the
//! original keys, and the encoding is self-delimiting, which lets a 16-byte
//! `(row_id, offset)` suffix ride behind it as a tie-breaker.

use snafu::Snafu;

const ENC_GROUP_SIZE: usize = 8;
const ENC_MARKER: u8 = 0xFF;
const ENC_PAD: u8 = 0x00;
const SUFFIX_LEN: usize = 16;

/// Smallest possible suffixed encoding: an empty key plus the 16-byte suffix.
pub const MIN_ENCODED_KEY_LEN: usize = (ENC_GROUP_SIZE + 1) + SUFFIX_LEN;

/// Errors from decoding an encoded key.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum CodecError {
    /// The input ends before the encoding does.
    #[snafu(display("encoded key is too short: {len} bytes"))]
    ShortInput {
        /// Observed input length.
        len: usize,
    },

    /// A group marker or padding byte is invalid.
    #[snafu(display("corrupt key encoding at offset {offset}: marker {marker:#04x}"))]
    CorruptEncoding {
        /// Offset of the offending group.
        offset: usize,
        /// The marker byte observed for that group.
        marker: u8,
    },
}

/// Length of [`encode_bytes`]' output for a key of `key_len` bytes.
pub fn encoded_bytes_len(key_len: usize) -> usize {
    (key_len / ENC_GROUP_SIZE + 1) * (ENC_GROUP_SIZE + 1)
}

/// Encodes `key` into the memcomparable form, reusing `buf`'s allocation.
///
/// A full group carries the marker `0xFF`; the final (possibly empty) group
/// is padded with `0x00` and marked with `0xFF - pad_count`, so decoding
/// knows where the key ends without a length prefix.
pub fn encode_bytes(mut buf: Vec<u8>, key: &[u8]) -> Vec<u8> {
    buf.clear();
    buf.reserve(encoded_bytes_len(key.len()));
    let mut idx = 0;
    while idx <= key.len() {
        let remain = key.len() - idx;
        if remain >= ENC_GROUP_SIZE {
            buf.extend_from_slice(&key[idx..idx + ENC_GROUP_SIZE]);
            buf.push(ENC_MARKER);
        } else {
            let pad = ENC_GROUP_SIZE - remain;
            buf.extend_from_slice(&key[idx..]);
            buf.extend(std::iter::repeat(ENC_PAD).take(pad));
            buf.push(ENC_MARKER - pad as u8);
        }
        idx += ENC_GROUP_SIZE;
    }
    buf
}

/// Decodes a key written by [`encode_bytes`].
///
/// Returns the number of input bytes consumed and the original key.
pub fn decode_bytes(data: &[u8]) -> Result<(usize, Vec<u8>), CodecError> {
    let mut key = Vec::with_capacity(data.len() / (ENC_GROUP_SIZE + 1) * ENC_GROUP_SIZE);
    let mut offset = 0;
    loop {
        let group = data
            .get(offset..offset + ENC_GROUP_SIZE + 1)
            .ok_or(CodecError::ShortInput { len: data.len() })?;
        let marker = group[ENC_GROUP_SIZE];
        let pad = ENC_MARKER.wrapping_sub(marker) as usize;
        if pad > ENC_GROUP_SIZE {
            return Err(CodecError::CorruptEncoding { offset, marker });
        }
        let real = ENC_GROUP_SIZE - pad;
        if group[real..ENC_GROUP_SIZE].iter().any(|b| *b != ENC_PAD) {
            return Err(CodecError::CorruptEncoding { offset, marker });
        }
        key.extend_from_slice(&group[..real]);
        offset += ENC_GROUP_SIZE + 1;
        if pad != 0 {
            return Ok((offset, key));
        }
    }
}

/// Encodes `key` and appends the `(row_id, offset)` suffix.
///
/// The suffix is big-endian so that byte order on the whole encoding equals
/// order on the user key with ties broken by `(row_id, offset)` treated as
/// unsigned. `buf`'s allocation is reused when capacity permits.
pub fn encode_key_suffix(buf: Vec<u8>, key: &[u8], row_id: i64, offset: i64) -> Vec<u8> {
    let mut buf = encode_bytes(buf, key);
    buf.extend_from_slice(&(row_id as u64).to_be_bytes());
    buf.extend_from_slice(&(offset as u64).to_be_bytes());
    buf
}

/// Decodes an encoding produced by [`encode_key_suffix`].
pub fn decode_key_suffix(data: &[u8]) -> Result<(Vec<u8>, i64, i64), CodecError> {
    if data.len() < MIN_ENCODED_KEY_LEN {
        return Err(CodecError::ShortInput { len: data.len() });
    }
    let split = data.len() - SUFFIX_LEN;
    let (consumed, key) = decode_bytes(&data[..split])?;
    if consumed != split {
        // Bytes between the key terminator and the suffix: not our encoding.
        return Err(CodecError::CorruptEncoding { offset: consumed, marker: data[consumed - 1] });
    }
    let mut word = [0u8; 8];
    word.copy_from_slice(&data[split..split + 8]);
    let row_id = u64::from_be_bytes(word) as i64;
    word.copy_from_slice(&data[split + 8..]);
    let offset = u64::from_be_bytes(word) as i64;
    Ok((key, row_id, offset))
}

#[cfg(test)]
mod tests {
    use rand::{Rng, RngCore};

    use super::*;

    fn rand_bytes(len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }

    #[test]
    fn round_trip_random_keys() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let key = rand_bytes(rng.gen_range(0..4096));
            let row_id = rng.gen::<i64>();
            let offset = rng.gen::<i64>();
            let encoded = encode_key_suffix(Vec::new(), &key, row_id, offset);
            assert_eq!(encoded.len(), encoded_bytes_len(key.len()) + 16);
            let (decoded, r, o) = decode_key_suffix(&encoded).unwrap();
            assert_eq!(decoded, key);
            assert_eq!(r, row_id);
            assert_eq!(o, offset);
        }
    }

    #[test]
    fn round_trip_group_boundaries() {
        for len in [0, 1, 7, 8, 9, 15, 16, 17] {
            let key = vec![0xAB; len];
            let encoded = encode_key_suffix(Vec::new(), &key, -1, i64::MIN);
            let (decoded, r, o) = decode_key_suffix(&encoded).unwrap();
            assert_eq!(decoded, key, "len {len}");
            assert_eq!((r, o), (-1, i64::MIN));
        }
    }

    #[test]
    fn encoding_preserves_key_order() {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let a = rand_bytes(rng.gen_range(0..64));
            let b = rand_bytes(rng.gen_range(0..64));
            let ea = encode_key_suffix(Vec::new(), &a, 0, 0);
            let eb = encode_key_suffix(Vec::new(), &b, 0, 0);
            assert_eq!(a.cmp(&b), ea.cmp(&eb), "keys {a:02x?} vs {b:02x?}");
        }
    }

    #[test]
    fn equal_keys_order_by_suffix() {
        let key = b"same-user-key";
        let a = encode_key_suffix(Vec::new(), key, 1, 5);
        let b = encode_key_suffix(Vec::new(), key, 1, 6);
        let c = encode_key_suffix(Vec::new(), key, 2, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn zero_and_ff_bytes_keep_order() {
        // The padded scheme must not confuse user 0x00/0xFF bytes with
        // padding or markers.
        let a = encode_key_suffix(Vec::new(), &[0x00], 0, 0);
        let b = encode_key_suffix(Vec::new(), &[0x00, 0x00], 0, 0);
        let c = encode_key_suffix(Vec::new(), &[0xFF; 8], 0, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn short_input_is_rejected() {
        let err = decode_key_suffix(&[0u8; MIN_ENCODED_KEY_LEN - 1]).unwrap_err();
        assert!(matches!(err, CodecError::ShortInput { .. }));
    }

    #[test]
    fn corrupt_marker_is_rejected() {
        let mut encoded = encode_key_suffix(Vec::new(), b"key", 1, 2);
        // The final group's marker sits 17 bytes from the end.
        let marker_idx = encoded.len() - 17;
        encoded[marker_idx] = 0x00;
        let err = decode_key_suffix(&encoded).unwrap_err();
        assert!(matches!(err, CodecError::CorruptEncoding { .. }));
    }

    #[test]
    fn nonzero_padding_is_rejected() {
        let mut encoded = encode_key_suffix(Vec::new(), b"key", 1, 2);
        // Byte right after the 3-byte key inside the padded group.
        encoded[3] = 0x01;
        let err = decode_key_suffix(&encoded).unwrap_err();
        assert!(matches!(err, CodecError::CorruptEncoding { .. }));
    }

    #[test]
    fn buffer_allocation_is_reused() {
        let buf = Vec::with_capacity(256);
        let ptr = buf.as_ptr();
        let encoded = encode_key_suffix(buf, b"short", 0, 0);
        assert_eq!(encoded.as_ptr(), ptr);
    }
}
