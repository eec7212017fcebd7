//! Handle encoder for integer-row-id index layouts.

use ingot_types::keys;
use ingot_types::{
    Handle, HandleDecodeError, HandleEncoder, IndexInfo, TableId,
};

/// Encoder for the common layout where an index entry's value carries the
/// owning row's integer id in its final 8 bytes (big-endian).
pub struct RowIdSuffixEncoder {
    /// Table the encoder is bound to.
    pub table_id: TableId,
}

impl HandleEncoder for RowIdSuffixEncoder {
    fn decode_handle_from_index(
        &self,
        index: &IndexInfo,
        _key: &[u8],
        value: &[u8],
    ) -> Result<Handle, HandleDecodeError> {
        if value.len() < 8 {
            return Err(HandleDecodeError::ShortIndexValue {
                index_id: index.id,
                len: value.len(),
            });
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&value[value.len() - 8..]);
        Ok(Handle::Int(i64::from_be_bytes(word)))
    }

    fn encode_handle_key(&self, handle: &Handle) -> Vec<u8> {
        match handle {
            Handle::Int(row_id) => keys::record_key(self.table_id, *row_id),
            Handle::Common(bytes) => {
                let mut key = keys::record_prefix(self.table_id);
                key.extend_from_slice(bytes);
                key
            }
        }
    }
}

/// Appends a row id to an index value the way [`RowIdSuffixEncoder`] expects
/// to find it.
pub fn index_value_with_row_id(payload: &[u8], row_id: i64) -> Vec<u8> {
    let mut value = payload.to_vec();
    value.extend_from_slice(&row_id.to_be_bytes());
    value
}

#[cfg(test)]
mod tests {
    use ingot_types::IndexState;

    use super::*;

    fn index() -> IndexInfo {
        IndexInfo { id: 3, name: "uk".into(), state: IndexState::Public, unique: true }
    }

    #[test]
    fn round_trips_through_record_key() {
        let encoder = RowIdSuffixEncoder { table_id: 12 };
        let value = index_value_with_row_id(b"payload", 77);
        let handle = encoder.decode_handle_from_index(&index(), b"ignored", &value).unwrap();
        assert_eq!(handle, Handle::Int(77));
        assert_eq!(encoder.encode_handle_key(&handle), keys::record_key(12, 77));
    }

    #[test]
    fn short_value_is_rejected() {
        let encoder = RowIdSuffixEncoder { table_id: 12 };
        let err = encoder.decode_handle_from_index(&index(), b"k", b"tiny").unwrap_err();
        assert!(matches!(err, HandleDecodeError::ShortIndexValue { len: 4, .. }));
    }
}
