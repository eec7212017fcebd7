//! Ingested key-value pairs.

/// One encoded row or index entry produced by the ingestion path.
///
/// `row_id` and `offset` identify where in the source the pair came from;
/// together they disambiguate pairs sharing one user key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvPair {
    /// Opaque user key.
    pub key: Vec<u8>,
    /// Value bytes.
    pub val: Vec<u8>,
    /// Source row identifier.
    pub row_id: i64,
    /// Byte offset of the row in its source file.
    pub offset: i64,
    /// Commit timestamp, when observed from the remote store.
    pub commit_ts: Option<u64>,
}
